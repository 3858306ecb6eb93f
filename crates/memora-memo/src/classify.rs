//! Per-argument equality strategy selection.

use std::fmt;

use memora_core::Value;
use serde::{Deserialize, Serialize};

use crate::cycle::has_cycle;

/// How an argument is compared against earlier arguments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Compared by value through its canonical encoding.
    Primitive,
    /// Compared by symbol instance.
    SymbolIdentity,
    /// Compared by object instance.
    ReferenceIdentity,
    /// Compared by structure through its canonical encoding.
    Structural,
}

/// Which of the two cache tables a strategy routes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Table {
    /// Entries keyed by instance identity.
    Identity,
    /// Entries keyed by canonical encoding.
    Canonical,
}

impl Strategy {
    #[must_use]
    pub const fn table(self) -> Table {
        match self {
            Self::SymbolIdentity | Self::ReferenceIdentity => Table::Identity,
            Self::Primitive | Self::Structural => Table::Canonical,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primitive => "primitive",
            Self::SymbolIdentity => "symbol-identity",
            Self::ReferenceIdentity => "reference-identity",
            Self::Structural => "structural",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Select the equality strategy for one argument.
///
/// - scalars → [`Strategy::Primitive`]
/// - symbols → [`Strategy::SymbolIdentity`]
/// - functions, maps and sets → [`Strategy::ReferenceIdentity`]
/// - arrays and plain objects → [`Strategy::Structural`], unless they
///   contain a cycle, in which case [`Strategy::ReferenceIdentity`]
#[must_use]
pub fn classify(value: &Value) -> Strategy {
    match value {
        Value::Null
        | Value::Undefined
        | Value::Boolean(_)
        | Value::Number(_)
        | Value::String(_) => Strategy::Primitive,
        Value::Symbol(_) => Strategy::SymbolIdentity,
        Value::Function(_) | Value::MapValue(_) | Value::SetValue(_) => {
            Strategy::ReferenceIdentity
        }
        Value::Array(_) | Value::PlainObject(_) => {
            if has_cycle(value) {
                Strategy::ReferenceIdentity
            } else {
                Strategy::Structural
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memora_core::{Array, Function, MapValue, PlainObject, SetValue, Symbol};

    #[test]
    fn test_scalars_are_primitive() {
        for value in [
            Value::Null,
            Value::Undefined,
            Value::from(true),
            Value::from(1.5),
            Value::from("s"),
        ] {
            assert_eq!(classify(&value), Strategy::Primitive, "{value:?}");
        }
    }

    #[test]
    fn test_symbol_identity() {
        assert_eq!(
            classify(&Value::from(Symbol::new("test"))),
            Strategy::SymbolIdentity
        );
    }

    #[test]
    fn test_reference_types() {
        let f = Function::new("f", |_| Value::Null);
        assert_eq!(classify(&Value::from(f)), Strategy::ReferenceIdentity);
        assert_eq!(
            classify(&Value::from(MapValue::new())),
            Strategy::ReferenceIdentity
        );
        assert_eq!(
            classify(&Value::from(SetValue::new())),
            Strategy::ReferenceIdentity
        );
    }

    #[test]
    fn test_acyclic_composites_are_structural() {
        let obj = PlainObject::from_pairs([("a", Value::from(1))]);
        let arr = Array::from_values([Value::from(obj.clone())]);
        assert_eq!(classify(&Value::from(obj)), Strategy::Structural);
        assert_eq!(classify(&Value::from(arr)), Strategy::Structural);
    }

    #[test]
    fn test_cyclic_composites_fall_back_to_identity() {
        let circular = PlainObject::new();
        circular.insert("self", circular.clone());
        assert_eq!(
            classify(&Value::from(circular)),
            Strategy::ReferenceIdentity
        );
    }

    #[test]
    fn test_strategy_tables() {
        assert_eq!(Strategy::Primitive.table(), Table::Canonical);
        assert_eq!(Strategy::Structural.table(), Table::Canonical);
        assert_eq!(Strategy::SymbolIdentity.table(), Table::Identity);
        assert_eq!(Strategy::ReferenceIdentity.table(), Table::Identity);
    }
}
