//! AMF3 encoding (§4.D), the mirror of [`crate::amf3::read::Amf3Decoder`]:
//! same U29 routine, same three reference tables, same packed trait header,
//! driven through `cookie_factory` primitives a field at a time (as
//! [`crate::amf0::write`] does for AMF0).

use crate::amf3::length::{encode_reference, encode_size};
use crate::amf3::marker::TypeMarker;
use crate::error::AmfError;
use crate::session::{DepthBudget, ObjectRefTable, RefTable};
use crate::value::{Element, Trait, TraitFlag, Value};
use cookie_factory::bytes::{be_f64, be_u8};
use cookie_factory::combinator::slice;
use cookie_factory::{gen_simple, GenError};
use enumset::EnumSet;
use std::io::Write;
use std::rc::Rc;

const REFERENCE_FLAG: u32 = 0x01;

fn gen_err(e: GenError) -> AmfError {
    match e {
        GenError::IoError(io) => AmfError::Io(io),
        other => AmfError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("serialization error: {:?}", other),
        )),
    }
}

/// Handles encoding AMF3. Owns all three reference tables (§3), so reuse of
/// a string, trait, or complex value within a session collapses to a
/// back-reference instead of a second inline body.
#[derive(Default)]
pub struct Amf3Encoder {
    /// Interned non-empty strings, in first-seen order.
    pub string_reference_table: RefTable<String>,
    /// Interned trait records, in first-seen order.
    pub trait_reference_table: RefTable<Trait>,
    /// Interned complex values, in first-seen order.
    pub object_reference_table: ObjectRefTable,
    depth: DepthBudget,
}

impl Amf3Encoder {
    /// A fresh encoder with empty reference tables.
    pub fn new() -> Self {
        Self::default()
    }

    fn w_u8<W: Write>(&self, w: W, v: u8) -> Result<W, AmfError> {
        gen_simple(be_u8(v), w).map_err(gen_err)
    }

    fn w_f64<W: Write>(&self, w: W, v: f64) -> Result<W, AmfError> {
        gen_simple(be_f64(v), w).map_err(gen_err)
    }

    fn w_bytes<'a, W: Write + 'a>(&self, w: W, data: &'a [u8]) -> Result<W, AmfError> {
        gen_simple(slice(data), w).map_err(gen_err)
    }

    fn w_marker<W: Write>(&self, w: W, marker: TypeMarker) -> Result<W, AmfError> {
        self.w_u8(w, marker as u8)
    }

    /// Write a raw U29: 1–4 bytes, MSB-continuation on all but the last (§4.D).
    fn w_u29<W: Write>(&self, mut w: W, value: u32) -> Result<W, AmfError> {
        let value = value & 0x1FFF_FFFF;
        if value <= 0x7F {
            self.w_u8(w, value as u8)
        } else if value <= 0x3FFF {
            w = self.w_u8(w, (value >> 7) as u8 | 0x80)?;
            self.w_u8(w, (value & 0x7F) as u8)
        } else if value <= 0x1F_FFFF {
            w = self.w_u8(w, (value >> 14) as u8 | 0x80)?;
            w = self.w_u8(w, ((value >> 7) & 0x7F) as u8 | 0x80)?;
            self.w_u8(w, (value & 0x7F) as u8)
        } else {
            w = self.w_u8(w, (value >> 22) as u8 | 0x80)?;
            w = self.w_u8(w, ((value >> 15) & 0x7F) as u8 | 0x80)?;
            w = self.w_u8(w, ((value >> 8) & 0x7F) as u8 | 0x80)?;
            self.w_u8(w, (value & 0xFF) as u8)
        }
    }

    fn w_size<W: Write>(&self, w: W, size: u32) -> Result<W, AmfError> {
        self.w_u29(w, encode_size(size))
    }

    fn w_reference<W: Write>(&self, w: W, index: u32) -> Result<W, AmfError> {
        self.w_u29(w, encode_reference(index))
    }

    /// Write `Int(i)` as a signed U29, falling back to `Double` when it
    /// doesn't fit the 29-bit signed range (§4.D "U29 variable-length integer").
    fn write_number<W: Write>(&self, w: W, i: i32) -> Result<W, AmfError> {
        const MIN: i32 = -(1 << 28);
        const MAX: i32 = (1 << 28) - 1;
        if (MIN..=MAX).contains(&i) {
            let w = self.w_marker(w, TypeMarker::Integer)?;
            self.w_u29(w, (i as u32) & 0x1FFF_FFFF)
        } else {
            let w = self.w_marker(w, TypeMarker::Double)?;
            self.w_f64(w, i as f64)
        }
    }

    fn write_inline_bytes<W: Write>(&self, w: W, data: &[u8]) -> Result<W, AmfError> {
        let w = self.w_size(w, data.len() as u32)?;
        self.w_bytes(w, data)
    }

    /// Write a byte-stream payload, applying the string table's reference and
    /// intern rules. The empty string is always inline and never interned
    /// (§4.D "String payload", invariant 4 in §8).
    fn write_byte_stream<W: Write>(&mut self, w: W, s: &str) -> Result<W, AmfError> {
        if s.is_empty() {
            return self.w_size(w, 0);
        }
        if let Some(index) = self.string_reference_table.find_existing(&s.to_string()) {
            return self.w_reference(w, index as u32);
        }
        self.string_reference_table.intern(s.to_string());
        self.write_inline_bytes(w, s.as_bytes())
    }

    fn write_string_value<W: Write>(&mut self, w: W, s: &str) -> Result<W, AmfError> {
        let w = self.w_marker(w, TypeMarker::String)?;
        self.write_byte_stream(w, s)
    }

    /// If `v` has already been interned in this session's object table, emit
    /// its reference form and report `true`; otherwise report `false`,
    /// leaving the caller to intern and write the inline body.
    fn try_write_object_reference<W: Write>(&mut self, w: W, v: &Rc<Value>) -> Result<(W, bool), AmfError> {
        if let Some(index) = self.object_reference_table.find_existing(v) {
            let w = self.w_reference(w, index as u32)?;
            Ok((w, true))
        } else {
            Ok((w, false))
        }
    }

    fn write_date<W: Write>(&self, w: W, millis: f64) -> Result<W, AmfError> {
        let w = self.w_size(w, 0)?;
        self.w_f64(w, millis)
    }

    fn write_array<W: Write>(&mut self, mut w: W, items: &[Rc<Value>]) -> Result<W, AmfError> {
        self.depth.enter()?;
        w = self.w_size(w, items.len() as u32)?;
        // Empty associative-portion terminator: this codec never emits a
        // non-empty associative run (§4.D "Array payload").
        w = self.write_byte_stream(w, "")?;
        for item in items {
            w = self.write_value(w, item)?;
        }
        self.depth.exit();
        Ok(w)
    }

    /// Pack a trait's inline header bits: bit 0 set (trait inline, as opposed
    /// to by-reference), bit 1 externalizable, bit 2 dynamic, remaining high
    /// bits the sealed member count (§4.D "Object payload").
    fn trait_header_bits(trt: &Trait) -> u32 {
        let mut packed = 0b1u32;
        if trt.is_externalizable() {
            packed |= 0b10;
        }
        if trt.is_dynamic() {
            packed |= 0b100;
        }
        packed |= (trt.members.len() as u32) << 3;
        packed
    }

    /// Combine a trait-header `packed` value with the object's own inline bit
    /// and write the resulting U29 (§4.D).
    fn write_object_header<W: Write>(&self, w: W, packed: u32) -> Result<W, AmfError> {
        self.w_u29(w, (packed << 1) | REFERENCE_FLAG)
    }

    fn write_object<W: Write>(
        &mut self,
        mut w: W,
        elements: &[Element],
        trt: &Option<Trait>,
    ) -> Result<W, AmfError> {
        self.depth.enter()?;
        let trt = trt.clone().unwrap_or_else(|| Trait {
            type_alias: String::new(),
            flags: EnumSet::only(TraitFlag::Dynamic),
            members: Vec::new(),
        });

        if trt.is_externalizable() {
            self.depth.exit();
            return Err(AmfError::Unsupported("externalizable trait".to_string()));
        }

        if let Some(index) = self.trait_reference_table.find_existing(&trt) {
            w = self.write_object_header(w, index << 1)?;
        } else {
            w = self.write_object_header(w, Self::trait_header_bits(&trt))?;
            w = self.write_byte_stream(w, &trt.type_alias)?;
            for member in &trt.members {
                w = self.write_byte_stream(w, member)?;
            }
            self.trait_reference_table.intern(trt.clone());
        }

        for member_name in &trt.members {
            let element = elements.iter().find(|e| &e.name == member_name).ok_or_else(|| {
                AmfError::ContractViolation {
                    field: member_name.clone(),
                    reason: "missing sealed member value".to_string(),
                }
            })?;
            w = self.write_value(w, &element.value)?;
        }

        if trt.is_dynamic() {
            for element in elements.iter().filter(|e| !trt.members.contains(&e.name)) {
                w = self.write_byte_stream(w, &element.name)?;
                w = self.write_value(w, &element.value)?;
            }
            w = self.write_byte_stream(w, "")?;
        }

        self.depth.exit();
        Ok(w)
    }

    /// Write a single value using AMF3's rules: the marker always comes
    /// first, then (for complex values) a reference-or-inline U29, then the
    /// body if inline.
    pub fn write_value<W: Write>(&mut self, w: W, v: &Rc<Value>) -> Result<W, AmfError> {
        match v.as_ref() {
            Value::Undefined => self.w_marker(w, TypeMarker::Undefined),
            Value::Null => self.w_marker(w, TypeMarker::Null),
            Value::Bool(true) => self.w_marker(w, TypeMarker::True),
            Value::Bool(false) => self.w_marker(w, TypeMarker::False),
            Value::Int(i) => self.write_number(w, *i),
            Value::Double(n) => {
                let w = self.w_marker(w, TypeMarker::Double)?;
                self.w_f64(w, *n)
            }
            Value::String(s) => self.write_string_value(w, s),
            Value::Date(millis) => {
                let w = self.w_marker(w, TypeMarker::Date)?;
                let (w, wrote) = self.try_write_object_reference(w, v)?;
                if wrote {
                    return Ok(w);
                }
                self.object_reference_table.intern(Rc::clone(v));
                self.write_date(w, *millis)
            }
            Value::ByteArray(bytes) => {
                let w = self.w_marker(w, TypeMarker::ByteArray)?;
                let (w, wrote) = self.try_write_object_reference(w, v)?;
                if wrote {
                    return Ok(w);
                }
                self.object_reference_table.intern(Rc::clone(v));
                self.write_inline_bytes(w, bytes)
            }
            Value::XmlDoc(text) => {
                let w = self.w_marker(w, TypeMarker::Xml)?;
                let (w, wrote) = self.try_write_object_reference(w, v)?;
                if wrote {
                    return Ok(w);
                }
                self.object_reference_table.intern(Rc::clone(v));
                self.write_inline_bytes(w, text.as_bytes())
            }
            Value::Array(items) => {
                let w = self.w_marker(w, TypeMarker::Array)?;
                let (w, wrote) = self.try_write_object_reference(w, v)?;
                if wrote {
                    return Ok(w);
                }
                self.object_reference_table.intern(Rc::clone(v));
                self.write_array(w, items)
            }
            Value::Object(elements, trt) => {
                let w = self.w_marker(w, TypeMarker::Object)?;
                let (w, wrote) = self.try_write_object_reference(w, v)?;
                if wrote {
                    return Ok(w);
                }
                self.object_reference_table.intern(Rc::clone(v));
                self.write_object(w, elements, trt)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(v: Value) -> Vec<u8> {
        Amf3Encoder::new().write_value(Vec::new(), &Rc::new(v)).unwrap()
    }

    #[test]
    fn integer_127_matches_s1() {
        assert_eq!(encode(Value::Int(127)), vec![0x04, 0x7F]);
    }

    #[test]
    fn integer_128_matches_s2() {
        assert_eq!(encode(Value::Int(128)), vec![0x04, 0x81, 0x00]);
    }

    #[test]
    fn out_of_range_integer_promotes_to_double() {
        let bytes = encode(Value::Int(1 << 28));
        assert_eq!(bytes[0], TypeMarker::Double as u8);
        assert_eq!(bytes.len(), 9);
    }

    #[test]
    fn repeated_string_in_array_uses_reference_matches_s3() {
        let items = vec![Rc::new(Value::from("hi")), Rc::new(Value::from("hi"))];
        let bytes = encode(Value::Array(items));
        assert_eq!(bytes, vec![0x09, 0x05, 0x01, 0x06, 0x05, b'h', b'i', 0x06, 0x00]);
    }

    #[test]
    fn empty_string_never_interned() {
        let items = vec![Rc::new(Value::from("")), Rc::new(Value::from(""))];
        let bytes = encode(Value::Array(items));
        // Both elements are inline (size 0), never a reference back to the first.
        assert_eq!(&bytes[bytes.len() - 4..], &[0x06, 0x01, 0x06, 0x01]);
    }

    #[test]
    fn repeated_object_round_trips_with_shared_identity() {
        let trt = Trait::named("X");
        let a = Rc::new(Value::Object(vec![], Some(trt)));
        let items = vec![Rc::clone(&a), Rc::clone(&a)];
        let bytes = encode(Value::Array(items));

        let mut decoder = crate::amf3::read::Amf3Decoder::new();
        let (_, decoded) = decoder.parse_single_element(&bytes).unwrap();
        match decoded.as_ref() {
            Value::Array(elements) => {
                assert_eq!(elements.len(), 2);
                assert!(Rc::ptr_eq(&elements[0], &elements[1]));
            }
            other => panic!("expected an array, got {:?}", other),
        }
    }

    #[test]
    fn externalizable_trait_is_unsupported() {
        let mut trt = Trait::named("X");
        trt.flags |= TraitFlag::Externalizable;
        let v = Rc::new(Value::Object(vec![], Some(trt)));
        let err = Amf3Encoder::new().write_value(Vec::new(), &v).unwrap_err();
        assert!(matches!(err, AmfError::Unsupported(_)));
    }

    #[test]
    fn missing_sealed_member_is_contract_violation() {
        let trt = Trait {
            type_alias: "X".to_string(),
            flags: EnumSet::empty(),
            members: vec!["a".to_string()],
        };
        let v = Rc::new(Value::Object(vec![], Some(trt)));
        let err = Amf3Encoder::new().write_value(Vec::new(), &v).unwrap_err();
        assert!(matches!(err, AmfError::ContractViolation { .. }));
    }
}
