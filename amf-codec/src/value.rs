//! The in-memory value universe the codec decodes into and encodes from.
//!
//! Complex values (`Object`, `Array`) are wrapped in [`Rc`] rather than
//! carrying an explicit `Reference` variant: two `Rc` clones pointing at the
//! same allocation *are* the AMF back-reference, so `Rc::ptr_eq` is the
//! identity check invariant 1 (§3) asks for. This mirrors the teacher's own
//! `Value`/`Element` split in `types.rs`, generalized to the 13-marker AMF0
//! and AMF3 sets this codec targets (the flex-only vector/dictionary/custom
//! variants are out of scope here).

use enumset::{EnumSet, EnumSetType};
use std::rc::Rc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single value in the decoded universe.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// AMF's `null`.
    Null,
    /// AMF's `undefined` (AMF0 0x06 / AMF3 0x00) — distinct from `Null`.
    Undefined,
    /// AMF0 Boolean / AMF3 True/False.
    Bool(bool),
    /// AMF3 Integer (U29, reinterpreted as signed 29-bit).
    Int(i32),
    /// AMF0 Number / AMF3 Double.
    Double(f64),
    /// AMF0 String/LongString, AMF3 String.
    String(String),
    /// Milliseconds since the Unix epoch. The AMF0 timezone field is always
    /// zero on emit and ignored on read (§4.C).
    Date(f64),
    /// AMF3 ByteArray.
    ByteArray(Vec<u8>),
    /// AMF0 XmlDocument / AMF3 Xml and XmlDoc (both carry raw markup text).
    XmlDoc(String),
    /// AMF0 StrictArray/EcmaArray or AMF3 Array's dense portion.
    Array(Vec<Rc<Value>>),
    /// A trait-tagged or anonymous property bag. `None` trait means an
    /// anonymous object (AMF0 untyped Object, or decode-side fallback when a
    /// trait's alias isn't registered).
    Object(Vec<Element>, Option<Trait>),
}

/// A named slot inside an [`Value::Object`] or AMF3 associative array run.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// The wire name of this member.
    pub name: String,
    /// The member's value.
    pub value: Rc<Value>,
}

impl Element {
    /// Build a new element, boxing `value` into an `Rc`.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: Rc::new(value.into()),
        }
    }

    /// The member name.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// The member value.
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl From<Value> for Rc<Value> {
    fn from(v: Value) -> Self {
        Rc::new(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// The flags a trait record can carry (§3 "Traits").
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(EnumSetType, Debug)]
pub enum TraitFlag {
    /// The object this trait describes may carry members beyond `members`.
    Dynamic,
    /// The object requires a custom externalizer this implementation doesn't provide.
    Externalizable,
}

/// A trait (a.k.a. class definition) describing an object's shape.
///
/// Two traits are equal iff every field matches structurally (§3); this is
/// exactly `#[derive(PartialEq)]`'s behaviour here, so trait reuse detection
/// in [`crate::session::Session`] is a linear scan for a structurally equal
/// entry rather than a hash lookup.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Trait {
    /// External name, empty for an anonymous trait.
    pub type_alias: String,
    /// Dynamic/Externalizable flags.
    pub flags: EnumSet<TraitFlag>,
    /// Sealed (static) member names, in declaration order.
    pub members: Vec<String>,
}

impl Trait {
    /// A trait with no flags and no members, named `type_alias`.
    pub fn named(type_alias: impl Into<String>) -> Self {
        Self {
            type_alias: type_alias.into(),
            flags: EnumSet::empty(),
            members: Vec::new(),
        }
    }

    /// The anonymous trait: empty alias, no flags, no members.
    pub fn anonymous() -> Self {
        Self::named("")
    }

    /// Whether this trait's object may carry members beyond `members`.
    pub fn is_dynamic(&self) -> bool {
        self.flags.contains(TraitFlag::Dynamic)
    }

    /// Whether this trait requires a custom externalizer.
    pub fn is_externalizable(&self) -> bool {
        self.flags.contains(TraitFlag::Externalizable)
    }

    /// Whether this trait has no external name.
    pub fn is_anonymous(&self) -> bool {
        self.type_alias.is_empty()
    }
}
