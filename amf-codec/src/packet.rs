//! Packet Framer (§4.F): the envelope wrapping an arbitrary number of typed
//! payloads behind a header-count/body-count preamble. Reference tables
//! reset between every header and every body — each one is encoded/decoded
//! through its own fresh call into [`crate::codec::Codec::encode_value`] /
//! [`crate::codec::Codec::decode_value_prefix`], which already allocates a
//! brand new per-session encoder/decoder per §4.B, so there is no explicit
//! "reset" step to write.

use cookie_factory::bytes::{be_u16, be_u32, be_u8};
use cookie_factory::combinator::slice;
use cookie_factory::{gen_simple, GenError};
use nom::bytes::complete::take;
use nom::number::complete::{be_u16 as nom_be_u16, be_u32 as nom_be_u32, be_u8 as nom_be_u8};
use std::collections::HashMap;
use std::io::Write;

use crate::codec::{AmfVersion, Codec};
use crate::error::AmfError;
use crate::nom_utils::{fail, to_amf_error, AMFResult, AmfParseErrorKind};
use crate::value::Value;

/// Sentinel `payload_len` meaning "length not declared" (§4.F).
pub const UNKNOWN_LENGTH: u32 = 0xFFFF_FFFF;

/// One packet header: a name, a must-understand flag, and a payload (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct PacketHeader {
    pub name: String,
    pub must_understand: bool,
    pub value: Value,
}

/// One packet body: target/response URIs and a payload (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct PacketMessage {
    pub target_uri: String,
    pub response_uri: String,
    pub value: Value,
}

/// The envelope itself: a version, a header mapping (later-same-name wins on
/// decode, §3), and an ordered sequence of messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub version: AmfVersion,
    pub headers: Vec<PacketHeader>,
    pub messages: Vec<PacketMessage>,
}

impl Packet {
    /// An empty packet for the given wire version.
    pub fn new(version: AmfVersion) -> Self {
        Self {
            version,
            headers: Vec::new(),
            messages: Vec::new(),
        }
    }
}

fn gen_err(e: GenError) -> AmfError {
    match e {
        GenError::IoError(io) => AmfError::Io(io),
        other => AmfError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("serialization error: {:?}", other),
        )),
    }
}

fn w_u8<W: Write>(w: W, v: u8) -> Result<W, AmfError> {
    gen_simple(be_u8(v), w).map_err(gen_err)
}

fn w_u16<W: Write>(w: W, v: u16) -> Result<W, AmfError> {
    gen_simple(be_u16(v), w).map_err(gen_err)
}

fn w_u32<W: Write>(w: W, v: u32) -> Result<W, AmfError> {
    gen_simple(be_u32(v), w).map_err(gen_err)
}

fn w_string<W: Write>(w: W, s: &str) -> Result<W, AmfError> {
    let bytes = s.as_bytes();
    let w = w_u16(w, bytes.len() as u16)?;
    gen_simple(slice(bytes), w).map_err(gen_err)
}

/// Encode `packet` through `codec`, writing the full envelope to `sink`.
pub(crate) fn encode_packet<W: Write>(codec: &Codec, packet: &Packet, sink: W) -> Result<W, AmfError> {
    let version_code: u16 = match packet.version {
        AmfVersion::Amf0 => 0,
        AmfVersion::Amf3 => 3,
    };
    let mut w = w_u16(sink, version_code)?;

    w = w_u16(w, packet.headers.len() as u16)?;
    for header in &packet.headers {
        log::trace!("encoding packet header `{}`", header.name);
        w = w_string(w, &header.name)?;
        w = w_u8(w, header.must_understand as u8)?;
        let body = codec.encode_value(&header.value, Vec::new())?;
        w = w_u32(w, body.len() as u32)?;
        w = gen_simple(slice(body.as_slice()), w).map_err(gen_err)?;
    }

    w = w_u16(w, packet.messages.len() as u16)?;
    for message in &packet.messages {
        log::trace!("encoding packet message `{}`", message.target_uri);
        w = w_string(w, &message.target_uri)?;
        w = w_string(w, &message.response_uri)?;
        let body = codec.encode_value(&message.value, Vec::new())?;
        w = w_u32(w, body.len() as u32)?;
        w = gen_simple(slice(body.as_slice()), w).map_err(gen_err)?;
    }

    Ok(w)
}

fn read_string(i: &[u8]) -> AMFResult<'_, String> {
    let (i, len) = nom_be_u16(i)?;
    let (i, bytes) = take(len as usize)(i)?;
    match String::from_utf8(bytes.to_vec()) {
        Ok(s) => Ok((i, s)),
        Err(_) => fail(i, AmfParseErrorKind::InvalidUtf8),
    }
}

/// Decode one length-prefixed payload at `i`, verifying `payload_len` when
/// it isn't [`UNKNOWN_LENGTH`] (§4.F "Framing length honesty").
fn decode_payload<'a>(codec: &Codec, i: &'a [u8]) -> Result<(&'a [u8], Value), AmfError> {
    let (i, payload_len) = nom_be_u32(i).map_err(to_amf_error)?;
    let (value, rest) = codec.decode_value_prefix(i)?;
    if payload_len != UNKNOWN_LENGTH {
        let consumed = (i.len() - rest.len()) as u32;
        if consumed != payload_len {
            return Err(AmfError::LengthMismatch {
                declared: payload_len,
                actual: consumed,
            });
        }
    }
    Ok((rest, value))
}

/// Collapse duplicate header names, keeping each name's first-seen position
/// but its last-seen value (§3 "Headers form a mapping keyed by name").
fn dedupe_headers(raw: Vec<PacketHeader>) -> Vec<PacketHeader> {
    let mut order: Vec<String> = Vec::new();
    let mut by_name: HashMap<String, PacketHeader> = HashMap::new();
    for header in raw {
        if !by_name.contains_key(&header.name) {
            order.push(header.name.clone());
        }
        by_name.insert(header.name.clone(), header);
    }
    order
        .into_iter()
        .map(|name| by_name.remove(&name).expect("just inserted"))
        .collect()
}

/// Decode a full packet envelope from `source` through `codec`.
pub(crate) fn decode_packet(codec: &Codec, source: &[u8]) -> Result<Packet, AmfError> {
    let (i, version_raw) = nom_be_u16(source).map_err(to_amf_error)?;
    let version = match version_raw {
        0 => AmfVersion::Amf0,
        3 => AmfVersion::Amf3,
        other => return Err(AmfError::Unsupported(format!("packet version {}", other))),
    };

    let (i, header_count) = nom_be_u16(i).map_err(to_amf_error)?;
    let mut raw_headers = Vec::with_capacity(header_count as usize);
    let mut i = i;
    for _ in 0..header_count {
        let (j, name) = read_string(i).map_err(to_amf_error)?;
        let (j, must_understand) = nom_be_u8(j).map_err(to_amf_error)?;
        let (j, value) = decode_payload(codec, j)?;
        log::trace!("decoded packet header `{}`", name);
        raw_headers.push(PacketHeader {
            name,
            must_understand: must_understand != 0,
            value,
        });
        i = j;
    }

    let (j, message_count) = nom_be_u16(i).map_err(to_amf_error)?;
    i = j;
    let mut messages = Vec::with_capacity(message_count as usize);
    for _ in 0..message_count {
        let (j, target_uri) = read_string(i).map_err(to_amf_error)?;
        let (j, response_uri) = read_string(j).map_err(to_amf_error)?;
        let (j, value) = decode_payload(codec, j)?;
        log::trace!("decoded packet message `{}`", target_uri);
        messages.push(PacketMessage {
            target_uri,
            response_uri,
            value,
        });
        i = j;
    }

    Ok(Packet {
        version,
        headers: dedupe_headers(raw_headers),
        messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AmfVersion, Codec, Options};

    #[test]
    fn dedupe_headers_keeps_first_position_last_value() {
        let raw = vec![
            PacketHeader {
                name: "a".to_string(),
                must_understand: false,
                value: Value::Int(1),
            },
            PacketHeader {
                name: "b".to_string(),
                must_understand: false,
                value: Value::Int(2),
            },
            PacketHeader {
                name: "a".to_string(),
                must_understand: true,
                value: Value::Int(3),
            },
        ];
        let deduped = dedupe_headers(raw);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].name, "a");
        assert_eq!(deduped[0].value, Value::Int(3));
        assert_eq!(deduped[1].name, "b");
    }

    #[test]
    fn declared_length_mismatch_is_rejected() {
        let codec = Codec::anonymous(Options {
            version: AmfVersion::Amf3,
            allow_version_switch: false,
        });
        let packet = Packet {
            version: AmfVersion::Amf3,
            headers: vec![],
            messages: vec![PacketMessage {
                target_uri: "t".to_string(),
                response_uri: "r".to_string(),
                value: Value::Int(1),
            }],
        };
        let mut bytes = codec.encode_packet(&packet, Vec::new()).unwrap();
        // Corrupt the declared payload length of the one message body.
        let len_offset = bytes.len() - 2 /* Integer(1) body */ - 4 /* u32 length */;
        bytes[len_offset..len_offset + 4].copy_from_slice(&99u32.to_be_bytes());
        let err = codec.decode_packet(&bytes).unwrap_err();
        assert!(matches!(err, AmfError::LengthMismatch { .. }));
    }

    #[test]
    fn unknown_length_sentinel_skips_the_check() {
        let codec = Codec::anonymous(Options {
            version: AmfVersion::Amf3,
            allow_version_switch: false,
        });
        let value_bytes = codec.encode_value(&Value::Int(7), Vec::new()).unwrap();
        let mut bytes = UNKNOWN_LENGTH.to_be_bytes().to_vec();
        bytes.extend_from_slice(&value_bytes);
        let (rest, value) = decode_payload(&codec, &bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(value, Value::Int(7));
    }

    #[test]
    fn empty_packet_round_trips() {
        let codec = Codec::anonymous(Options {
            version: AmfVersion::Amf0,
            allow_version_switch: false,
        });
        let packet = Packet::new(AmfVersion::Amf0);
        let bytes = codec.encode_packet(&packet, Vec::new()).unwrap();
        let decoded = codec.decode_packet(&bytes).unwrap();
        assert!(decoded.headers.is_empty());
        assert!(decoded.messages.is_empty());
    }
}
