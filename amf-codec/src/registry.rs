//! Schema Registry (§4.A): resolves user record types to/from their wire
//! alias, caching each type's encode/decode closures behind a `TypeId`.
//!
//! Rust has no runtime reflection, so there is no way to hand the registry a
//! list of arbitrary types and have it discover their fields on its own. The
//! `DataContract` trait below is the explicit declaration point the teacher's
//! own codebase doesn't need (`flash-lso` only ever materializes the generic
//! `Value`/`Trait` tree) but that this codec's typed binding layer requires.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::AmfError;
use crate::value::Value;

/// What shape a registered type takes on the wire (§3 "Schema descriptor").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    /// An AMF `Object`: a trait-tagged, ordered property bag.
    Record,
    /// A bare integer, translated to/from a symbolic constant (§9 "Enum as integer").
    Enum,
}

/// Implemented by user types that bind to an AMF trait alias (§4.A, §4.G).
///
/// `to_value`/`from_value` own the field-by-field projection themselves —
/// there is no separate generic accessor table, since building one without
/// a derive macro or reflection would just relocate the same per-field code
/// one layer down. [`field`], [`coerce_i32`] and friends below exist so that
/// projection still reads like the decode-path coercion rules in §4.G
/// ("numeric widen/narrow with overflow error", "`Null` into a non-nullable
/// target → `ContractViolation`") rather than bespoke match arms per type.
pub trait DataContract: Any {
    /// The external wire name for this type.
    fn alias() -> &'static str
    where
        Self: Sized;

    /// Record or Enum; defaults to Record since that's the common case.
    fn kind() -> ContractKind
    where
        Self: Sized,
    {
        ContractKind::Record
    }

    /// Project this instance into its wire [`Value`] (an `Object` for
    /// records, an `Int` for enums). Encode path of §4.G.
    fn to_value(&self) -> Value;

    /// Build a new instance from a decoded [`Value`]. Decode path of §4.G:
    /// implementors default-construct, apply whichever members they
    /// recognise, and silently drop the rest (forward compatibility).
    fn from_value(value: &Value) -> Result<Self, AmfError>
    where
        Self: Sized;
}

/// Find `name` among `elements`, or `None` if absent (§4.G step 3, "if not
/// found in the descriptor, silently drop" — used in reverse here: a field
/// missing from the wire simply isn't applied to a freshly defaulted instance).
pub fn field<'e>(elements: &'e [crate::value::Element], name: &str) -> Option<&'e Value> {
    elements
        .iter()
        .find(|e| e.name == name)
        .map(|e| e.value.as_ref())
}

fn violation(field_name: &str, reason: impl Into<String>) -> AmfError {
    AmfError::ContractViolation {
        field: field_name.to_string(),
        reason: reason.into(),
    }
}

/// Require a present, non-`Null` value for a non-nullable member.
pub fn require<'v>(value: Option<&'v Value>, field_name: &str) -> Result<&'v Value, AmfError> {
    match value {
        None => Err(violation(field_name, "missing required member")),
        Some(Value::Null) => Err(violation(field_name, "null is not valid for a non-nullable member")),
        Some(v) => Ok(v),
    }
}

/// Coerce a decoded value into `i32`, widening from `Int` directly and
/// narrowing from `Double` when it carries no fractional part and fits the
/// target range; anything else is a contract violation.
pub fn coerce_i32(value: &Value, field_name: &str) -> Result<i32, AmfError> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Double(d) if d.fract() == 0.0 && *d >= i32::MIN as f64 && *d <= i32::MAX as f64 => {
            Ok(*d as i32)
        }
        Value::Double(_) => Err(violation(field_name, "double does not fit in i32 without loss")),
        other => Err(violation(field_name, format!("expected a number, found {:?}", other))),
    }
}

/// Coerce a decoded value into `f64`, widening `Int` and passing `Double` through.
pub fn coerce_f64(value: &Value, field_name: &str) -> Result<f64, AmfError> {
    match value {
        Value::Int(i) => Ok(*i as f64),
        Value::Double(d) => Ok(*d),
        other => Err(violation(field_name, format!("expected a number, found {:?}", other))),
    }
}

/// Coerce a decoded value into `bool`.
pub fn coerce_bool(value: &Value, field_name: &str) -> Result<bool, AmfError> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(violation(field_name, format!("expected a boolean, found {:?}", other))),
    }
}

/// Coerce a decoded value into an owned `String`.
pub fn coerce_string(value: &Value, field_name: &str) -> Result<String, AmfError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(violation(field_name, format!("expected a string, found {:?}", other))),
    }
}

type EncodeFn = Box<dyn Fn(&dyn Any) -> Value>;
type DecodeFn = Box<dyn Fn(&Value) -> Result<Box<dyn Any>, AmfError>>;

pub(crate) struct Entry {
    kind: ContractKind,
    encode: EncodeFn,
    decode: DecodeFn,
}

/// Resolves registered types to/from their wire alias (§4.A). Built once via
/// [`RegistryBuilder`] and never mutated afterward — immutability is what
/// lets a single [`crate::codec::Codec`] be shared across threads (§5).
#[derive(Default)]
pub struct Registry {
    by_type: HashMap<TypeId, Rc<Entry>>,
    by_alias: HashMap<&'static str, Rc<Entry>>,
}

impl Registry {
    pub(crate) fn entry_by_alias(&self, alias: &str) -> Option<&Entry> {
        self.by_alias.get(alias).map(Rc::as_ref)
    }

    pub(crate) fn entry_by_type(&self, id: TypeId) -> Option<&Entry> {
        self.by_type.get(&id).map(Rc::as_ref)
    }
}

impl Entry {
    pub(crate) fn kind(&self) -> ContractKind {
        self.kind
    }

    pub(crate) fn encode(&self, value: &dyn Any) -> Value {
        (self.encode)(value)
    }

    pub(crate) fn decode(&self, value: &Value) -> Result<Box<dyn Any>, AmfError> {
        (self.decode)(value)
    }
}

/// Builds a [`Registry`] by registering one type at a time. Mirrors §4.A's
/// "root type plus known types" constructor inputs as repeated `register`
/// calls, since Rust can't accept a runtime list of arbitrary types.
#[derive(Default)]
pub struct RegistryBuilder {
    by_type: HashMap<TypeId, Rc<Entry>>,
    by_alias: HashMap<&'static str, Rc<Entry>>,
}

impl RegistryBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a data-contract type. Panics if `T`'s alias collides with an
    /// already-registered type's alias — a construction-time programming
    /// error rather than a runtime condition.
    pub fn register<T: DataContract + 'static>(mut self) -> Self {
        let alias = T::alias();
        let entry = Rc::new(Entry {
            kind: T::kind(),
            encode: Box::new(|any: &dyn Any| {
                any.downcast_ref::<T>()
                    .expect("registry dispatch always matches the TypeId it was registered under")
                    .to_value()
            }),
            decode: Box::new(|value: &Value| {
                T::from_value(value).map(|t| Box::new(t) as Box<dyn Any>)
            }),
        });
        assert!(
            self.by_alias.insert(alias, entry.clone()).is_none(),
            "alias `{}` is already registered",
            alias
        );
        self.by_type.insert(TypeId::of::<T>(), entry);
        self
    }

    /// Freeze the builder into an immutable [`Registry`].
    pub fn build(self) -> Registry {
        Registry {
            by_type: self.by_type,
            by_alias: self.by_alias,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Element;

    #[derive(Debug, PartialEq)]
    struct Pair(i32, i32);

    impl DataContract for Pair {
        fn alias() -> &'static str {
            "test.Pair"
        }

        fn to_value(&self) -> Value {
            Value::Object(
                vec![Element::new("a", self.0), Element::new("b", self.1)],
                None,
            )
        }

        fn from_value(value: &Value) -> Result<Self, AmfError> {
            match value {
                Value::Object(elements, _) => Ok(Pair(
                    coerce_i32(require(field(elements, "a"), "a")?, "a")?,
                    coerce_i32(require(field(elements, "b"), "b")?, "b")?,
                )),
                other => Err(violation("Pair", format!("not an object: {:?}", other))),
            }
        }
    }

    #[test]
    fn registry_resolves_by_type_and_by_alias() {
        let registry = RegistryBuilder::new().register::<Pair>().build();
        assert!(registry.entry_by_alias("test.Pair").is_some());
        assert!(registry.entry_by_alias("unknown").is_none());
        assert!(registry.entry_by_type(TypeId::of::<Pair>()).is_some());
    }

    #[test]
    fn entry_round_trips_through_any() {
        let registry = RegistryBuilder::new().register::<Pair>().build();
        let entry = registry.entry_by_type(TypeId::of::<Pair>()).unwrap();
        let pair = Pair(1, 2);
        let value = entry.encode(&pair as &dyn Any);
        let boxed = entry.decode(&value).unwrap();
        assert_eq!(*boxed.downcast::<Pair>().unwrap(), pair);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_alias_registration_panics() {
        RegistryBuilder::new().register::<Pair>().register::<Pair>();
    }

    #[test]
    fn require_rejects_missing_and_null() {
        assert!(require(None, "x").is_err());
        assert!(require(Some(&Value::Null), "x").is_err());
        assert!(require(Some(&Value::Int(1)), "x").is_ok());
    }

    #[test]
    fn coerce_i32_narrows_whole_doubles_only() {
        assert_eq!(coerce_i32(&Value::Double(3.0), "n").unwrap(), 3);
        assert!(coerce_i32(&Value::Double(3.5), "n").is_err());
        assert!(coerce_i32(&Value::String("x".to_string()), "n").is_err());
    }
}
