//! Object Binder (§4.G): materializes a decoded trait+property bag into a
//! registered user type, or projects one back into a property bag for
//! encoding. The thin layer between the raw [`Value`] tree and the typed
//! [`crate::registry::DataContract`] world.

use std::any::{Any, TypeId};

use crate::error::AmfError;
use crate::registry::{DataContract, Registry};
use crate::value::Value;

/// The outcome of a generic, alias-driven decode (§4.G decode path, step 1).
pub enum Bound {
    /// The wire trait's alias matched a registered type.
    Typed(Box<dyn Any>),
    /// No alias (anonymous trait), or the alias wasn't registered — in the
    /// latter case this is a deliberate, logged fallback (§4.I), not a
    /// silent one.
    Anonymous(Value),
}

/// Binds decoded values to (and projects registered values from) the
/// [`Registry`] (§4.A).
pub struct Binder<'a> {
    registry: &'a Registry,
}

impl<'a> Binder<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    fn alias_of(value: &Value) -> Option<&str> {
        match value {
            Value::Object(_, Some(t)) if !t.is_anonymous() => Some(t.type_alias.as_str()),
            _ => None,
        }
    }

    /// Resolve a decoded value by its wire alias, for callers that don't
    /// know the concrete type ahead of time (heterogeneous/polymorphic
    /// members, and the untyped decode entry point). An unregistered alias
    /// degrades to an anonymous bag with a `warn` log rather than failing
    /// the whole decode (§4.I) — a conscious trade favoring forward
    /// compatibility over failing closed; see `DESIGN.md`.
    pub fn decode(&self, value: &Value) -> Result<Bound, AmfError> {
        let alias = match Self::alias_of(value) {
            Some(alias) => alias,
            None => return Ok(Bound::Anonymous(value.clone())),
        };
        match self.registry.entry_by_alias(alias) {
            Some(entry) => {
                log::debug!("binding decoded alias `{}` as {:?}", alias, entry.kind());
                Ok(Bound::Typed(entry.decode(value)?))
            }
            None => {
                log::warn!(
                    "decoded alias `{}` is not registered; falling back to an anonymous bag",
                    alias
                );
                Ok(Bound::Anonymous(value.clone()))
            }
        }
    }

    /// Resolve a decoded value as a statically known type `T` (§6 `decode`'s
    /// typed entry point). Unlike [`Binder::decode`], the caller asked for
    /// `T` specifically, so two things must both hold, not just one:
    /// `T` must be registered, *and*, when the wire value actually carries a
    /// trait alias, that alias must name `T` and not some other registered
    /// type. Checking only the former lets a payload tagged with a
    /// completely different (or unregistered) class name decode into `T`
    /// whenever its fields happen to coerce — a type-confusion hole.
    pub fn decode_as<T: DataContract + 'static>(&self, value: &Value) -> Result<T, AmfError> {
        let expected = self.registry.entry_by_type(TypeId::of::<T>());
        if let Some(alias) = Self::alias_of(value) {
            let matches = match (self.registry.entry_by_alias(alias), expected) {
                (Some(resolved), Some(expected)) => std::ptr::eq(resolved, expected),
                _ => false,
            };
            if !matches {
                return Err(AmfError::UnknownTypeAlias(alias.to_string()));
            }
        }
        let entry = expected
            .ok_or_else(|| AmfError::UnregisteredType(std::any::type_name::<T>().to_string()))?;
        let boxed = entry.decode(value)?;
        boxed.downcast::<T>().map(|b| *b).map_err(|_| AmfError::ContractViolation {
            field: std::any::type_name::<T>().to_string(),
            reason: "registry entry decoded to an unexpected concrete type".to_string(),
        })
    }

    /// Project a value of known type into its wire [`Value`] (§4.G encode
    /// path, steps 1–2). Fails closed with `UnregisteredType` on a registry
    /// miss — encoding never falls back to an anonymous bag.
    pub fn encode<T: Any>(&self, value: &T) -> Result<Value, AmfError> {
        let entry = self
            .registry
            .entry_by_type(TypeId::of::<T>())
            .ok_or_else(|| AmfError::UnregisteredType(std::any::type_name::<T>().to_string()))?;
        Ok(entry.encode(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryBuilder;
    use crate::value::{Element, Trait};

    #[derive(Debug, PartialEq)]
    struct Tag(String);

    impl DataContract for Tag {
        fn alias() -> &'static str {
            "test.Tag"
        }
        fn to_value(&self) -> Value {
            Value::Object(vec![], Some(Trait::named(Self::alias())))
        }
        fn from_value(_: &Value) -> Result<Self, AmfError> {
            Ok(Tag("bound".to_string()))
        }
    }

    #[test]
    fn decode_untyped_value_is_anonymous() {
        let registry = RegistryBuilder::new().build();
        let binder = Binder::new(&registry);
        match binder.decode(&Value::Int(1)).unwrap() {
            Bound::Anonymous(Value::Int(1)) => {}
            Bound::Anonymous(other) => panic!("unexpected anonymous value: {:?}", other),
            Bound::Typed(_) => panic!("expected an anonymous bind for an untyped value"),
        }
    }

    #[test]
    fn decode_registered_alias_binds_typed() {
        let registry = RegistryBuilder::new().register::<Tag>().build();
        let binder = Binder::new(&registry);
        let value = Value::Object(vec![], Some(Trait::named(Tag::alias())));
        match binder.decode(&value).unwrap() {
            Bound::Typed(boxed) => assert_eq!(*boxed.downcast::<Tag>().unwrap(), Tag("bound".to_string())),
            Bound::Anonymous(_) => panic!("expected a typed bind"),
        }
    }

    #[test]
    fn decode_unknown_alias_falls_back_to_anonymous() {
        let registry = RegistryBuilder::new().build();
        let binder = Binder::new(&registry);
        let value = Value::Object(
            vec![Element::new("x", 1i32)],
            Some(Trait::named("not.registered")),
        );
        match binder.decode(&value).unwrap() {
            Bound::Anonymous(_) => {}
            Bound::Typed(_) => panic!("expected an anonymous fallback"),
        }
    }

    #[test]
    fn decode_as_unregistered_type_is_an_error() {
        let registry = RegistryBuilder::new().build();
        let binder = Binder::new(&registry);
        let err = binder.decode_as::<Tag>(&Value::Null).unwrap_err();
        assert!(matches!(err, AmfError::UnregisteredType(_)));
    }

    #[derive(Debug, PartialEq)]
    struct OtherTag;

    impl DataContract for OtherTag {
        fn alias() -> &'static str {
            "test.OtherTag"
        }
        fn to_value(&self) -> Value {
            Value::Object(vec![], Some(Trait::named(Self::alias())))
        }
        fn from_value(_: &Value) -> Result<Self, AmfError> {
            Ok(OtherTag)
        }
    }

    #[test]
    fn decode_as_rejects_a_wire_alias_belonging_to_a_different_type() {
        let registry = RegistryBuilder::new().register::<Tag>().register::<OtherTag>().build();
        let binder = Binder::new(&registry);
        // Tagged as OtherTag on the wire; asking for Tag must not silently succeed.
        let value = Value::Object(vec![], Some(Trait::named(OtherTag::alias())));
        let err = binder.decode_as::<Tag>(&value).unwrap_err();
        match err {
            AmfError::UnknownTypeAlias(alias) => assert_eq!(alias, OtherTag::alias()),
            other => panic!("expected UnknownTypeAlias, got {:?}", other),
        }
    }

    #[test]
    fn decode_as_rejects_an_alias_that_is_not_registered_at_all() {
        let registry = RegistryBuilder::new().register::<Tag>().build();
        let binder = Binder::new(&registry);
        let value = Value::Object(vec![], Some(Trait::named("not.registered")));
        let err = binder.decode_as::<Tag>(&value).unwrap_err();
        assert!(matches!(err, AmfError::UnknownTypeAlias(alias) if alias == "not.registered"));
    }

    #[test]
    fn decode_as_accepts_a_matching_wire_alias() {
        let registry = RegistryBuilder::new().register::<Tag>().build();
        let binder = Binder::new(&registry);
        let value = Value::Object(vec![], Some(Trait::named(Tag::alias())));
        assert_eq!(binder.decode_as::<Tag>(&value).unwrap(), Tag("bound".to_string()));
    }

    #[test]
    fn encode_unregistered_type_is_an_error() {
        let registry = RegistryBuilder::new().build();
        let binder = Binder::new(&registry);
        let err = binder.encode(&Tag("x".to_string())).unwrap_err();
        assert!(matches!(err, AmfError::UnregisteredType(_)));
    }
}
