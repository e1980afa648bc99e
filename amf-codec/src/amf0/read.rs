//! AMF0 decoding (§4.C), following the same recursive-descent-over-`nom`
//! shape as the teacher's `amf3::read::AMF3Decoder`: a small struct owning
//! the session's reference table, with one method per marker.

use crate::amf0::marker::TypeMarker;
use crate::amf3::read::Amf3Decoder;
use crate::error::RefTable as ErrRefTable;
use crate::nom_utils::{fail, AMFResult, AmfParseErrorKind};
use crate::session::{DepthBudget, ObjectRefTable};
use crate::value::{Element, Trait, Value};
use nom::bytes::complete::take;
use nom::number::complete::{be_f64, be_i16, be_u16, be_u32, be_u8};
use std::convert::TryFrom;
use std::rc::Rc;

/// Handles decoding AMF0. Bridges into a fresh [`Amf3Decoder`] whenever it
/// encounters the `AvmPlus` marker (§4.E); that sub-session's tables are
/// entirely separate from this one's.
#[derive(Default)]
pub struct Amf0Decoder {
    /// AMF0's sole reference table: previously decoded complex values.
    pub object_reference_table: ObjectRefTable,
    depth: DepthBudget,
}

impl Amf0Decoder {
    /// A fresh decoder with an empty reference table.
    pub fn new() -> Self {
        Self::default()
    }

    fn read_type_marker<'a>(&self, i: &'a [u8]) -> AMFResult<'a, TypeMarker> {
        let (i, t) = be_u8(i)?;
        match TypeMarker::try_from(t) {
            Ok(marker) => Ok((i, marker)),
            Err(_) => fail(i, AmfParseErrorKind::UnknownMarker(t)),
        }
    }

    fn read_utf8<'a>(&self, i: &'a [u8], len: usize) -> AMFResult<'a, String> {
        let (i, bytes) = take(len)(i)?;
        match String::from_utf8(bytes.to_vec()) {
            Ok(s) => Ok((i, s)),
            Err(_) => fail(i, AmfParseErrorKind::InvalidUtf8),
        }
    }

    fn read_short_string<'a>(&self, i: &'a [u8]) -> AMFResult<'a, String> {
        let (i, len) = be_u16(i)?;
        self.read_utf8(i, len as usize)
    }

    fn read_long_string<'a>(&self, i: &'a [u8]) -> AMFResult<'a, String> {
        let (i, len) = be_u32(i)?;
        self.read_utf8(i, len as usize)
    }

    /// Reads the shared body of `Object`/`TypedObject`/`EcmaArray`: a run of
    /// `(short-string key, value)` pairs terminated by the empty-key +
    /// `ObjectEnd` sentinel (§4.C).
    fn read_pairs<'a>(&mut self, i: &'a [u8]) -> AMFResult<'a, Vec<Element>> {
        let mut elements = Vec::new();
        let mut i = i;
        loop {
            let (j, key_len) = be_u16(i)?;
            if key_len == 0 {
                let (j, marker) = be_u8(j)?;
                if marker != TypeMarker::ObjectEnd as u8 {
                    return fail(j, AmfParseErrorKind::UnknownMarker(marker));
                }
                i = j;
                break;
            }
            let (j, key) = self.read_utf8(j, key_len as usize)?;
            let (j, value) = self.parse_single_element(j)?;
            elements.push(Element { name: key, value });
            i = j;
        }
        Ok((i, elements))
    }

    fn parse_object<'a>(&mut self, i: &'a [u8], type_alias: Option<String>) -> AMFResult<'a, Rc<Value>> {
        self.depth.enter().map_err(|_| {
            nom::Err::Error(crate::nom_utils::AmfParseError {
                input: i,
                kind: AmfParseErrorKind::DepthExceeded,
            })
        })?;
        let index = self.object_reference_table.reserve();
        let (i, elements) = self.read_pairs(i)?;
        self.depth.exit();
        let trt = type_alias.map(|name| Trait {
            type_alias: name,
            flags: enumset::EnumSet::only(crate::value::TraitFlag::Dynamic),
            members: Vec::new(),
        });
        let value = Value::Object(elements, trt);
        self.object_reference_table
            .patch(index, value)
            .expect("reserved slot must exist");
        Ok((i, self.object_reference_table.get(index).expect("patched slot")))
    }

    fn parse_strict_array<'a>(&mut self, i: &'a [u8]) -> AMFResult<'a, Rc<Value>> {
        self.depth.enter().map_err(|_| {
            nom::Err::Error(crate::nom_utils::AmfParseError {
                input: i,
                kind: AmfParseErrorKind::DepthExceeded,
            })
        })?;
        let (i, count) = be_u32(i)?;
        let index = self.object_reference_table.reserve();
        let mut elements = Vec::with_capacity(count as usize);
        let mut i = i;
        for _ in 0..count {
            let (j, v) = self.parse_single_element(i)?;
            elements.push(v);
            i = j;
        }
        self.depth.exit();
        self.object_reference_table
            .patch(index, Value::Array(elements))
            .expect("reserved slot must exist");
        Ok((i, self.object_reference_table.get(index).expect("patched slot")))
    }

    fn parse_date<'a>(&mut self, i: &'a [u8]) -> AMFResult<'a, Rc<Value>> {
        let index = self.object_reference_table.reserve();
        let (i, millis) = be_f64(i)?;
        // timezone offset: always zero on emit, ignored on read (§4.C).
        let (i, _timezone) = be_i16(i)?;
        self.object_reference_table
            .patch(index, Value::Date(millis))
            .expect("reserved slot must exist");
        Ok((i, self.object_reference_table.get(index).expect("patched slot")))
    }

    /// Parse a single AMF0 element from the input.
    pub fn parse_single_element<'a>(&mut self, i: &'a [u8]) -> AMFResult<'a, Rc<Value>> {
        let (i, marker) = self.read_type_marker(i)?;
        match marker {
            TypeMarker::Number => {
                let (i, n) = be_f64(i)?;
                Ok((i, Rc::new(Value::Double(n))))
            }
            TypeMarker::Boolean => {
                let (i, b) = be_u8(i)?;
                Ok((i, Rc::new(Value::Bool(b != 0))))
            }
            TypeMarker::String => {
                let (i, s) = self.read_short_string(i)?;
                Ok((i, Rc::new(Value::String(s))))
            }
            TypeMarker::LongString => {
                let (i, s) = self.read_long_string(i)?;
                Ok((i, Rc::new(Value::String(s))))
            }
            TypeMarker::Object => self.parse_object(i, None),
            TypeMarker::TypedObject => {
                let (i, name) = self.read_short_string(i)?;
                self.parse_object(i, Some(name))
            }
            TypeMarker::Null => Ok((i, Rc::new(Value::Null))),
            TypeMarker::Undefined => Ok((i, Rc::new(Value::Undefined))),
            TypeMarker::Reference => {
                let (i, index) = be_u16(i)?;
                match self.object_reference_table.get(index as usize) {
                    Some(v) => Ok((i, v)),
                    None => fail(
                        i,
                        AmfParseErrorKind::ReferenceOutOfRange(ErrRefTable::Object, index as usize),
                    ),
                }
            }
            TypeMarker::EcmaArray => {
                let (i, _advisory_count) = be_u32(i)?;
                // An EcmaArray is wire-identical to an untyped Object's body.
                self.parse_object(i, None)
            }
            TypeMarker::ObjectEnd => fail(i, AmfParseErrorKind::UnknownMarker(TypeMarker::ObjectEnd as u8)),
            TypeMarker::StrictArray => self.parse_strict_array(i),
            TypeMarker::Date => self.parse_date(i),
            TypeMarker::XmlDocument => {
                let (i, xml) = self.read_long_string(i)?;
                Ok((i, Rc::new(Value::XmlDoc(xml))))
            }
            TypeMarker::AvmPlus => {
                // Version Bridge (§4.E): a fresh, independent AMF3 session
                // decodes exactly one value, then control returns here.
                let mut bridge = Amf3Decoder::default();
                bridge.parse_single_element(i)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_round_trips() {
        let mut bytes = vec![TypeMarker::Number as u8];
        bytes.extend_from_slice(&42.5f64.to_be_bytes());
        let (rest, v) = Amf0Decoder::new().parse_single_element(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(*v, Value::Double(42.5));
    }

    #[test]
    fn short_string_round_trips() {
        let mut bytes = vec![TypeMarker::String as u8, 0x00, 0x02];
        bytes.extend_from_slice(b"hi");
        let (rest, v) = Amf0Decoder::new().parse_single_element(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(*v, Value::String("hi".to_string()));
    }

    #[test]
    fn repeated_array_uses_reference_marker() {
        // [ [], reference-to-index-0 ]: outer strict array of two elements,
        // first is an empty nested array, second is a Reference to index 0
        // (the outer array itself, since it was reserved before the inner
        // elements are parsed).
        let mut bytes = vec![TypeMarker::StrictArray as u8];
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.push(TypeMarker::StrictArray as u8);
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.push(TypeMarker::Reference as u8);
        bytes.extend_from_slice(&0u16.to_be_bytes());

        let (rest, v) = Amf0Decoder::new().parse_single_element(&bytes).unwrap();
        assert!(rest.is_empty());
        match v.as_ref() {
            Value::Array(elements) => {
                assert_eq!(elements.len(), 2);
                assert!(Rc::ptr_eq(&elements[1], &v));
            }
            other => panic!("expected an array, got {:?}", other),
        }
    }

    #[test]
    fn typed_object_carries_class_name_and_dynamic_flag() {
        let mut bytes = vec![TypeMarker::TypedObject as u8, 0x00, 0x01, b'X'];
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.push(TypeMarker::ObjectEnd as u8);

        let (rest, v) = Amf0Decoder::new().parse_single_element(&bytes).unwrap();
        assert!(rest.is_empty());
        match v.as_ref() {
            Value::Object(elements, Some(trt)) => {
                assert_eq!(trt.type_alias, "X");
                assert!(trt.is_dynamic());
                assert!(elements.is_empty());
            }
            other => panic!("expected a typed object, got {:?}", other),
        }
    }

    #[test]
    fn ecma_array_decodes_as_untyped_object() {
        let mut bytes = vec![TypeMarker::EcmaArray as u8];
        bytes.extend_from_slice(&0u32.to_be_bytes()); // advisory count, ignored
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.push(TypeMarker::ObjectEnd as u8);

        let (rest, v) = Amf0Decoder::new().parse_single_element(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(*v, Value::Object(vec![], None));
    }

    #[test]
    fn s6_avmplus_bridges_into_amf3() {
        // AvmPlus marker followed by an inline AMF3 Integer(127).
        let bytes: &[u8] = &[TypeMarker::AvmPlus as u8, 0x04, 0x7F];
        let (rest, v) = Amf0Decoder::new().parse_single_element(bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(*v, Value::Int(127));
    }

    #[test]
    fn out_of_range_reference_is_an_error() {
        let mut bytes = vec![TypeMarker::Reference as u8];
        bytes.extend_from_slice(&0u16.to_be_bytes());
        let err = Amf0Decoder::new().parse_single_element(&bytes).unwrap_err();
        match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                assert_eq!(
                    e.kind,
                    AmfParseErrorKind::ReferenceOutOfRange(ErrRefTable::Object, 0)
                );
            }
            nom::Err::Incomplete(_) => panic!("expected a definite error"),
        }
    }
}
