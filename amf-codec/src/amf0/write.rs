//! AMF0 encoding (§4.C), built on `cookie-factory`'s primitive serializers.
//!
//! Recursive tree encoders don't compose well as `impl SerializeFn` chains
//! (the type would have to be infinitely recursive), so each write call
//! threads the writer `W` through imperatively, invoking `cookie_factory`'s
//! primitive generators (`be_u8`, `be_u16`, ...) one field at a time via
//! `gen_simple` — the same primitives the teacher's dependency provides, just
//! driven a statement at a time instead of through nested combinators.

use crate::amf0::marker::TypeMarker;
use crate::amf3::write::Amf3Encoder;
use crate::error::AmfError;
use crate::session::{DepthBudget, ObjectRefTable};
use crate::value::{Element, Trait, Value};
use cookie_factory::bytes::{be_f64, be_i16, be_u16, be_u32, be_u8};
use cookie_factory::combinator::slice;
use cookie_factory::{gen_simple, GenError};
use std::io::Write;
use std::rc::Rc;

fn gen_err(e: GenError) -> AmfError {
    match e {
        GenError::IoError(io) => AmfError::Io(io),
        other => AmfError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("serialization error: {:?}", other),
        )),
    }
}

/// Handles encoding AMF0. Owns the object-reference table used to decide
/// when a repeated complex value becomes a `Reference` marker instead of
/// being re-emitted inline.
#[derive(Default)]
pub struct Amf0Encoder {
    /// AMF0's sole reference table.
    pub object_reference_table: ObjectRefTable,
    depth: DepthBudget,
    /// Whether a value with no AMF0 wire form may be emitted via the
    /// `AvmPlus` version bridge (§4.E) instead of failing with `Unsupported`.
    allow_version_switch: bool,
}

impl Amf0Encoder {
    /// A fresh encoder with an empty reference table and bridging disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh encoder that may fall through to the AMF3 bridge (§4.E) for
    /// values with no AMF0 representation, when asked to at the top level of
    /// a payload.
    pub fn with_version_switch(allow_version_switch: bool) -> Self {
        Self {
            allow_version_switch,
            ..Self::default()
        }
    }

    fn w_u8<W: Write>(&self, w: W, v: u8) -> Result<W, AmfError> {
        gen_simple(be_u8(v), w).map_err(gen_err)
    }

    fn w_u16<W: Write>(&self, w: W, v: u16) -> Result<W, AmfError> {
        gen_simple(be_u16(v), w).map_err(gen_err)
    }

    fn w_u32<W: Write>(&self, w: W, v: u32) -> Result<W, AmfError> {
        gen_simple(be_u32(v), w).map_err(gen_err)
    }

    fn w_i16<W: Write>(&self, w: W, v: i16) -> Result<W, AmfError> {
        gen_simple(be_i16(v), w).map_err(gen_err)
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

    /// Write a string, choosing `String`/`LongString` by byte length (§4.C).
    fn write_string<W: Write>(&self, w: W, s: &str) -> Result<W, AmfError> {
        let bytes = s.as_bytes();
        if bytes.len() < 0xFFFF {
            let w = self.w_marker(w, TypeMarker::String)?;
            let w = self.w_u16(w, bytes.len() as u16)?;
            self.w_bytes(w, bytes)
        } else {
            let w = self.w_marker(w, TypeMarker::LongString)?;
            let w = self.w_u32(w, bytes.len() as u32)?;
            self.w_bytes(w, bytes)
        }
    }

    fn write_short_string<W: Write>(&self, w: W, s: &str) -> Result<W, AmfError> {
        let bytes = s.as_bytes();
        let w = self.w_u16(w, bytes.len() as u16)?;
        self.w_bytes(w, bytes)
    }

    fn write_long_string<W: Write>(&self, w: W, s: &str) -> Result<W, AmfError> {
        let bytes = s.as_bytes();
        let w = self.w_u32(w, bytes.len() as u32)?;
        self.w_bytes(w, bytes)
    }

    /// If `v` has already been written in this session, emit a `Reference`
    /// marker and return `true`; otherwise return `false` without writing
    /// anything, leaving the caller to intern and write it inline.
    fn try_write_reference<W: Write>(&mut self, w: W, v: &Rc<Value>) -> Result<(W, bool), AmfError> {
        if let Some(index) = self.object_reference_table.find_existing(v) {
            let w = self.w_marker(w, TypeMarker::Reference)?;
            let w = self.w_u16(w, index as u16)?;
            Ok((w, true))
        } else {
            Ok((w, false))
        }
    }

    fn write_pairs<W: Write>(&mut self, mut w: W, elements: &[Element]) -> Result<W, AmfError> {
        for element in elements {
            w = self.write_short_string(w, element.name())?;
            w = self.write_value(w, &element.value)?;
        }
        w = self.w_u16(w, 0)?;
        self.w_marker(w, TypeMarker::ObjectEnd)
    }

    fn write_object<W: Write>(
        &mut self,
        mut w: W,
        elements: &[Element],
        trt: &Option<Trait>,
    ) -> Result<W, AmfError> {
        self.depth.enter()?;
        match trt.as_ref().filter(|t| !t.is_anonymous()) {
            Some(t) => {
                w = self.w_marker(w, TypeMarker::TypedObject)?;
                w = self.write_short_string(w, &t.type_alias)?;
            }
            None => {
                w = self.w_marker(w, TypeMarker::Object)?;
            }
        }
        let w = self.write_pairs(w, elements)?;
        self.depth.exit();
        Ok(w)
    }

    fn write_strict_array<W: Write>(&mut self, mut w: W, items: &[Rc<Value>]) -> Result<W, AmfError> {
        self.depth.enter()?;
        w = self.w_marker(w, TypeMarker::StrictArray)?;
        w = self.w_u32(w, items.len() as u32)?;
        for item in items {
            w = self.write_value(w, item)?;
        }
        self.depth.exit();
        Ok(w)
    }

    fn write_date<W: Write>(&self, w: W, millis: f64) -> Result<W, AmfError> {
        let w = self.w_marker(w, TypeMarker::Date)?;
        let w = self.w_f64(w, millis)?;
        // Timezone offset must always be emitted as zero (§4.C).
        self.w_i16(w, 0)
    }

    fn write_xml<W: Write>(&self, w: W, xml: &str) -> Result<W, AmfError> {
        let w = self.w_marker(w, TypeMarker::XmlDocument)?;
        self.write_long_string(w, xml)
    }

    /// Write a single value, using a `Reference` marker instead of the full
    /// body whenever `v` is a complex value already seen this session.
    pub fn write_value<W: Write>(&mut self, w: W, v: &Rc<Value>) -> Result<W, AmfError> {
        match v.as_ref() {
            Value::Null => self.w_marker(w, TypeMarker::Null),
            Value::Undefined => self.w_marker(w, TypeMarker::Undefined),
            Value::Bool(b) => {
                let w = self.w_marker(w, TypeMarker::Boolean)?;
                self.w_u8(w, *b as u8)
            }
            Value::Int(i) => {
                let w = self.w_marker(w, TypeMarker::Number)?;
                self.w_f64(w, *i as f64)
            }
            Value::Double(n) => {
                let w = self.w_marker(w, TypeMarker::Number)?;
                self.w_f64(w, *n)
            }
            Value::String(s) => self.write_string(w, s),
            Value::ByteArray(_) => {
                // ByteArray has no AMF0 wire form (§4.C's marker set doesn't
                // cover it). Only the version bridge (§4.E) can carry it, and
                // only as the top marker of a payload, never nested inside an
                // AMF0 container.
                if self.allow_version_switch && self.depth.current() == 0 {
                    let w = self.w_marker(w, TypeMarker::AvmPlus)?;
                    let mut bridge = Amf3Encoder::new();
                    bridge.write_value(w, v)
                } else {
                    Err(AmfError::Unsupported(
                        "ByteArray has no AMF0 wire representation".to_string(),
                    ))
                }
            }
            Value::Date(millis) => {
                let (w, wrote) = self.try_write_reference(w, v)?;
                if wrote {
                    return Ok(w);
                }
                self.object_reference_table.intern(Rc::clone(v));
                self.write_date(w, *millis)
            }
            Value::XmlDoc(xml) => {
                let (w, wrote) = self.try_write_reference(w, v)?;
                if wrote {
                    return Ok(w);
                }
                self.object_reference_table.intern(Rc::clone(v));
                self.write_xml(w, xml)
            }
            Value::Array(items) => {
                let (w, wrote) = self.try_write_reference(w, v)?;
                if wrote {
                    return Ok(w);
                }
                self.object_reference_table.intern(Rc::clone(v));
                self.write_strict_array(w, items)
            }
            Value::Object(elements, trt) => {
                let (w, wrote) = self.try_write_reference(w, v)?;
                if wrote {
                    return Ok(w);
                }
                self.object_reference_table.intern(Rc::clone(v));
                self.write_object(w, elements, trt)
            }
        }
    }
}
