//! The top-level codec (§6): version dispatch and the single-value/packet
//! encode & decode entry points tying the Registry (§4.A), per-payload AMF0/
//! AMF3 codecs (§4.C/D), Version Bridge (§4.E), Framer (§4.F) and Binder
//! (§4.G) together into one object.

use std::any::Any;
use std::convert::TryFrom;
use std::io::Write;
use std::rc::Rc;

use crate::amf0::{Amf0Decoder, Amf0Encoder, TypeMarker as Amf0Marker};
use crate::amf3::{Amf3Decoder, Amf3Encoder, TypeMarker as Amf3Marker};
use crate::binder::{Binder, Bound};
use crate::error::AmfError;
use crate::nom_utils::to_amf_error;
use crate::packet::{decode_packet, encode_packet, Packet};
use crate::registry::{DataContract, Registry, RegistryBuilder};
use crate::value::Value;

/// Which AMF wire version a codec instance targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmfVersion {
    Amf0,
    Amf3,
}

/// Construction-time behaviour knobs (§6 `new`'s `options`).
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// The wire version this codec reads and writes top-level payloads as.
    pub version: AmfVersion,
    /// Whether an AMF0 encode may fall through to the AMF3 bridge (§4.E)
    /// for values with no AMF0 representation. Ignored when `version` is
    /// already `Amf3`.
    pub allow_version_switch: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            version: AmfVersion::Amf3,
            allow_version_switch: false,
        }
    }
}

/// One codec instance: an immutable [`Registry`] plus [`Options`]. Safe to
/// share across threads (§5) — every `encode`/`decode` call allocates its
/// own decoder/encoder, and thus its own session state, fresh.
pub struct Codec {
    registry: Registry,
    options: Options,
}

/// Builds a [`Codec`]'s [`Registry`] one type at a time, mirroring §4.A's
/// "root type plus known types" constructor inputs.
#[derive(Default)]
pub struct CodecBuilder {
    registry: RegistryBuilder,
}

impl CodecBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a data-contract type (the root type and every other known
    /// type are registered the same way; the registry treats them uniformly).
    pub fn register<T: DataContract + 'static>(mut self) -> Self {
        self.registry = self.registry.register::<T>();
        self
    }

    /// Freeze the builder into a [`Codec`] with the given options.
    pub fn build(self, options: Options) -> Codec {
        Codec {
            registry: self.registry.build(),
            options,
        }
    }
}

impl Codec {
    /// Start building a codec.
    pub fn builder() -> CodecBuilder {
        CodecBuilder::new()
    }

    /// An anonymous codec: no registered types, just raw `Value` trees.
    /// Used by the CLI harness (§4.J), which never binds to a Rust type.
    pub fn anonymous(options: Options) -> Self {
        CodecBuilder::new().build(options)
    }

    /// Encode a registered value as a single AMF payload (§6 `encode`).
    pub fn encode<T: Any, W: Write>(&self, value: &T, sink: W) -> Result<W, AmfError> {
        let wire_value = Binder::new(&self.registry).encode(value)?;
        self.encode_value(&wire_value, sink)
    }

    /// Encode an already-built [`Value`] (used by the Framer, and by callers
    /// working with anonymous property bags directly).
    pub fn encode_value<W: Write>(&self, value: &Value, sink: W) -> Result<W, AmfError> {
        let rc = Rc::new(value.clone());
        match self.options.version {
            AmfVersion::Amf3 => {
                log::trace!("encoding one value as amf3");
                Amf3Encoder::new().write_value(sink, &rc)
            }
            AmfVersion::Amf0 => {
                log::trace!("encoding one value as amf0");
                Amf0Encoder::with_version_switch(self.options.allow_version_switch).write_value(sink, &rc)
            }
        }
    }

    /// Decode a single AMF payload into a registered value of type `T`
    /// (§6 `decode`).
    pub fn decode<T: DataContract + 'static>(&self, source: &[u8]) -> Result<T, AmfError> {
        let value = self.decode_value(source)?;
        Binder::new(&self.registry).decode_as(&value)
    }

    /// Decode a single AMF payload into the raw [`Value`] tree, without
    /// binding to any registered type.
    pub fn decode_value(&self, source: &[u8]) -> Result<Value, AmfError> {
        self.decode_value_prefix(source).map(|(value, _rest)| value)
    }

    /// Decode exactly one value, returning the unconsumed remainder of
    /// `source`. Used by the Framer (§4.F) to verify payload-length honesty.
    pub fn decode_value_prefix<'a>(&self, source: &'a [u8]) -> Result<(Value, &'a [u8]), AmfError> {
        match self.options.version {
            AmfVersion::Amf3 => {
                log::trace!("decoding one value as amf3");
                let (rest, v) = Amf3Decoder::new()
                    .parse_single_element(source)
                    .map_err(to_amf_error)?;
                Ok(((*v).clone(), rest))
            }
            AmfVersion::Amf0 => {
                log::trace!("decoding one value as amf0");
                let (rest, v) = Amf0Decoder::new()
                    .parse_single_element(source)
                    .map_err(to_amf_error)?;
                Ok(((*v).clone(), rest))
            }
        }
    }

    /// Decode a value generically, resolving its wire alias against the
    /// registry when present (§4.G). Unlike [`Codec::decode`], an
    /// unregistered alias degrades to an anonymous bag rather than failing.
    pub fn decode_bound(&self, source: &[u8]) -> Result<Bound, AmfError> {
        let value = self.decode_value(source)?;
        Binder::new(&self.registry).decode(&value)
    }

    /// Peek without consuming: whether `source` begins with a marker
    /// recognised by this codec's configured version (§6 `is_start_marker`).
    pub fn is_start_marker(&self, source: &[u8]) -> bool {
        match (self.options.version, source.first()) {
            (_, None) => false,
            (AmfVersion::Amf0, Some(b)) => Amf0Marker::try_from(*b).is_ok(),
            (AmfVersion::Amf3, Some(b)) => Amf3Marker::try_from(*b).is_ok(),
        }
    }

    /// Encode a full packet envelope (§4.F).
    pub fn encode_packet<W: Write>(&self, packet: &Packet, sink: W) -> Result<W, AmfError> {
        encode_packet(self, packet, sink)
    }

    /// Decode a full packet envelope (§4.F).
    pub fn decode_packet(&self, source: &[u8]) -> Result<Packet, AmfError> {
        decode_packet(self, source)
    }
}
