//! Cache key generation.
//!
//! Turns an argument tuple into a [`CacheKey`]. Identity-classified
//! arguments are keyed by their [`ObjectId`]. Everything else is keyed by a
//! canonical text encoding.
//!
//! ## Canonical encoding
//!
//! | value            | encoding                                  |
//! |------------------|-------------------------------------------|
//! | null / undefined | `null` / `undefined`                      |
//! | boolean          | `true` / `false`                          |
//! | number           | shortest round-trip decimal, `NaN`, `Infinity`, `-Infinity`; `-0` is `0` |
//! | string           | `"…"` with `\` and `"` backslash-escaped  |
//! | symbol           | `Symbol()` or `Symbol("desc")`            |
//! | function         | `function:anonymous` or `function:"name"` |
//! | array            | `[a,b]`                                   |
//! | map              | `Map(k:v,k:v)` in insertion order         |
//! | set              | `Set(a,b)` in insertion order             |
//! | plain object     | `{"a":v,"b":v}` with names sorted         |
//!
//! Every token is self-delimiting, so distinct values never share an
//! encoding. Maps and sets are **not** order-normalized: two maps holding the
//! same pairs in a different insertion order encode differently. Plain
//! objects are, because their property order is not observable.
//!
//! ## Tuples
//!
//! A single argument is keyed by its own classification. Zero or several
//! arguments are keyed by `(` + comma-joined encodings + `)` in the
//! canonical table. In that form a cyclic argument is written as
//! `ref:<id>`, while functions and symbols fall back to their textual form,
//! so two distinct functions with the same name are equated. Use
//! [`TupleKeying::PerArgument`] to key each argument by its own strategy
//! instead.

use std::collections::HashSet;
use std::fmt;

use memora_core::{fingerprint, ObjectId, Value, WeakValue};
use serde::{Deserialize, Serialize};

use crate::classify::{classify, Strategy, Table};
use crate::config::TupleKeying;
use crate::cycle::has_cycle;

/// Deterministic text encoding of a value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short hash of the key for logs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(self.0.as_bytes())
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One argument's contribution to a per-argument composite key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Identity(ObjectId),
    Canonical(CanonicalKey),
}

/// A key addressing the identity table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    /// The single argument's own instance.
    Instance(ObjectId),
    /// A per-argument tuple holding at least one identity part.
    Composite(Vec<KeyPart>),
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(id) => write!(f, "#{id}"),
            Self::Composite(parts) => {
                f.write_str("(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    match part {
                        KeyPart::Identity(id) => write!(f, "#{id}")?,
                        KeyPart::Canonical(key) => write!(f, "{key}")?,
                    }
                }
                f.write_str(")")
            }
        }
    }
}

/// A resolved cache key. The variant decides the table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Identity(IdentityKey),
    Canonical(CanonicalKey),
}

impl CacheKey {
    #[must_use]
    pub fn table(&self) -> Table {
        match self {
            Self::Identity(_) => Table::Identity,
            Self::Canonical(_) => Table::Canonical,
        }
    }

    /// Short hash of the key for logs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        match self {
            Self::Identity(key) => fingerprint(key.to_string().as_bytes()),
            Self::Canonical(key) => key.fingerprint(),
        }
    }
}

/// A cache key together with what produced it.
#[derive(Debug)]
pub struct ResolvedKey {
    pub key: CacheKey,
    pub strategy: Strategy,
    /// Weak handles to the instances an identity key is built from.
    pub anchors: Vec<WeakValue>,
}

/// Encode a value into its canonical key.
///
/// Total over every [`Value`]. Meant for primitive and structural values;
/// identity-classified values still encode (functions by name, maps and sets
/// by content) but that form does not distinguish instances. If a node is
/// re-entered while still being encoded, a back-reference `^<id>` is written
/// instead of recursing.
#[must_use]
pub fn encode(value: &Value) -> CanonicalKey {
    let mut out = String::new();
    Encoder::default().write(value, &mut out);
    CanonicalKey(out)
}

/// Key for an argument tuple of any length.
///
/// One argument uses its own strategy. Zero or several arguments follow
/// `keying`.
#[must_use]
pub fn resolve(args: &[Value], keying: TupleKeying) -> ResolvedKey {
    match (args, keying) {
        ([arg], _) => resolve_single(arg),
        (_, TupleKeying::SingleArgument) => resolve_tuple(args),
        (_, TupleKeying::PerArgument) => resolve_per_argument(args),
    }
}

fn resolve_single(arg: &Value) -> ResolvedKey {
    let strategy = classify(arg);
    match (strategy.table(), arg.downgrade()) {
        (Table::Identity, Some(anchor)) => ResolvedKey {
            key: CacheKey::Identity(IdentityKey::Instance(anchor.id())),
            strategy,
            anchors: vec![anchor],
        },
        _ => ResolvedKey {
            key: CacheKey::Canonical(encode(arg)),
            strategy,
            anchors: Vec::new(),
        },
    }
}

fn resolve_tuple(args: &[Value]) -> ResolvedKey {
    let mut encoded = Vec::with_capacity(args.len());
    let mut all_primitive = true;
    for arg in args {
        let strategy = classify(arg);
        all_primitive &= strategy == Strategy::Primitive;
        encoded.push(encode_tuple_member(arg, strategy));
    }

    ResolvedKey {
        key: CacheKey::Canonical(join_tuple(&encoded)),
        strategy: if all_primitive {
            Strategy::Primitive
        } else {
            Strategy::Structural
        },
        anchors: Vec::new(),
    }
}

fn resolve_per_argument(args: &[Value]) -> ResolvedKey {
    let mut parts = Vec::with_capacity(args.len());
    let mut anchors = Vec::new();
    let mut all_primitive = true;

    for arg in args {
        let strategy = classify(arg);
        all_primitive &= strategy == Strategy::Primitive;
        match (strategy.table(), arg.downgrade()) {
            (Table::Identity, Some(anchor)) => {
                parts.push(KeyPart::Identity(anchor.id()));
                anchors.push(anchor);
            }
            _ => parts.push(KeyPart::Canonical(encode(arg))),
        }
    }

    if anchors.is_empty() {
        let encoded: Vec<CanonicalKey> = parts
            .into_iter()
            .filter_map(|part| match part {
                KeyPart::Canonical(key) => Some(key),
                KeyPart::Identity(_) => None,
            })
            .collect();
        return ResolvedKey {
            key: CacheKey::Canonical(join_tuple(&encoded)),
            strategy: if all_primitive {
                Strategy::Primitive
            } else {
                Strategy::Structural
            },
            anchors,
        };
    }

    ResolvedKey {
        key: CacheKey::Identity(IdentityKey::Composite(parts)),
        strategy: Strategy::ReferenceIdentity,
        anchors,
    }
}

/// Encoding of one member of a canonical tuple. Cyclic members are keyed by
/// instance rather than encoded.
fn encode_tuple_member(arg: &Value, strategy: Strategy) -> CanonicalKey {
    let cyclic = match arg {
        // Classified by instance only when they contain a cycle.
        Value::Array(_) | Value::PlainObject(_) => strategy == Strategy::ReferenceIdentity,
        Value::MapValue(_) | Value::SetValue(_) => has_cycle(arg),
        _ => false,
    };
    match arg.object_id() {
        Some(id) if cyclic => CanonicalKey(format!("ref:{id}")),
        _ => encode(arg),
    }
}

fn join_tuple(encoded: &[CanonicalKey]) -> CanonicalKey {
    let mut out = String::from("(");
    for (i, key) in encoded.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(key.as_str());
    }
    out.push(')');
    CanonicalKey(out)
}

/// One pending piece of output.
enum Step {
    Value(Value),
    Punct(&'static str),
    /// A quoted property name followed by `:`.
    Name(String),
    /// The node's contents are fully written; it is off the path again.
    Leave(ObjectId),
}

/// Writes values with an explicit work stack, so deep nesting never
/// recurses.
#[derive(Default)]
struct Encoder {
    on_path: HashSet<ObjectId>,
}

impl Encoder {
    fn write(&mut self, value: &Value, out: &mut String) {
        let mut stack = vec![Step::Value(value.clone())];
        while let Some(step) = stack.pop() {
            match step {
                Step::Value(value) => self.write_one(&value, out, &mut stack),
                Step::Punct(text) => out.push_str(text),
                Step::Name(name) => {
                    write_quoted(&name, out);
                    out.push(':');
                }
                Step::Leave(id) => {
                    self.on_path.remove(&id);
                }
            }
        }
    }

    /// Write a scalar, or open a composite and schedule its contents.
    fn write_one(&mut self, value: &Value, out: &mut String, stack: &mut Vec<Step>) {
        let mut steps = Vec::new();
        let (id, close) = match value {
            Value::Null => return out.push_str("null"),
            Value::Undefined => return out.push_str("undefined"),
            Value::Boolean(b) => return out.push_str(if *b { "true" } else { "false" }),
            Value::Number(n) => return write_number(*n, out),
            Value::String(s) => return write_quoted(s, out),
            Value::Symbol(sym) => {
                out.push_str("Symbol(");
                if let Some(desc) = sym.description() {
                    write_quoted(desc, out);
                }
                return out.push(')');
            }
            Value::Function(func) => {
                out.push_str("function:");
                return match func.name() {
                    Some(name) => write_quoted(name, out),
                    None => out.push_str("anonymous"),
                };
            }
            Value::Array(arr) => {
                if !self.enter(arr.id(), out) {
                    return;
                }
                out.push('[');
                list_steps(arr.items().iter(), &mut steps);
                (arr.id(), "]")
            }
            Value::SetValue(set) => {
                if !self.enter(set.id(), out) {
                    return;
                }
                out.push_str("Set(");
                list_steps(set.members().iter(), &mut steps);
                (set.id(), ")")
            }
            Value::MapValue(map) => {
                if !self.enter(map.id(), out) {
                    return;
                }
                out.push_str("Map(");
                for (i, (k, v)) in map.entries().iter().enumerate() {
                    if i > 0 {
                        steps.push(Step::Punct(","));
                    }
                    steps.push(Step::Value(k.clone()));
                    steps.push(Step::Punct(":"));
                    steps.push(Step::Value(v.clone()));
                }
                (map.id(), ")")
            }
            Value::PlainObject(obj) => {
                if !self.enter(obj.id(), out) {
                    return;
                }
                out.push('{');
                for (i, (name, v)) in obj.properties().iter().enumerate() {
                    if i > 0 {
                        steps.push(Step::Punct(","));
                    }
                    steps.push(Step::Name(name.clone()));
                    steps.push(Step::Value(v.clone()));
                }
                (obj.id(), "}")
            }
        };

        steps.push(Step::Punct(close));
        steps.push(Step::Leave(id));
        stack.extend(steps.into_iter().rev());
    }

    /// Mark `id` as being encoded. Writes a back-reference and returns
    /// `false` if it already is.
    fn enter(&mut self, id: ObjectId, out: &mut String) -> bool {
        if self.on_path.insert(id) {
            true
        } else {
            out.push('^');
            out.push_str(&id.to_string());
            false
        }
    }
}

fn list_steps<'a>(items: impl Iterator<Item = &'a Value>, steps: &mut Vec<Step>) {
    for (i, item) in items.enumerate() {
        if i > 0 {
            steps.push(Step::Punct(","));
        }
        steps.push(Step::Value(item.clone()));
    }
}

fn write_number(n: f64, out: &mut String) {
    if n.is_nan() {
        out.push_str("NaN");
    } else if n.is_infinite() {
        out.push_str(if n > 0.0 { "Infinity" } else { "-Infinity" });
    } else if n == 0.0 {
        out.push('0');
    } else {
        out.push_str(&n.to_string());
    }
}

fn write_quoted(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use memora_core::{Array, Function, MapValue, PlainObject, SetValue, Symbol};

    fn enc(value: impl Into<Value>) -> String {
        encode(&value.into()).as_str().to_string()
    }

    #[test]
    fn test_encode_scalars() {
        assert_eq!(enc(Value::Null), "null");
        assert_eq!(enc(Value::Undefined), "undefined");
        assert_eq!(enc(true), "true");
        assert_eq!(enc(3), "3");
        assert_eq!(enc(2.5), "2.5");
        assert_eq!(enc(-0.0), "0");
        assert_eq!(enc(f64::NAN), "NaN");
        assert_eq!(enc(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(enc("hi"), "\"hi\"");
    }

    #[test]
    fn test_encode_string_escaping() {
        assert_eq!(enc(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[test]
    fn test_strings_with_separators_stay_distinct() {
        // ["a,b"] vs ["a","b"]
        let joined = Array::from_values([Value::from("a,b")]);
        let split = Array::from_values([Value::from("a"), Value::from("b")]);
        assert_ne!(enc(joined), enc(split));

        // ["a\",\"b"] must not read as ["a","b"]
        let tricky = Array::from_values([Value::from("a\",\"b")]);
        let split = Array::from_values([Value::from("a"), Value::from("b")]);
        assert_ne!(enc(tricky), enc(split));
    }

    #[test]
    fn test_string_and_number_distinct() {
        assert_ne!(enc("1"), enc(1));
        assert_ne!(enc("null"), enc(Value::Null));
        assert_ne!(enc("true"), enc(true));
    }

    #[test]
    fn test_encode_symbol_and_function() {
        assert_eq!(enc(Symbol::new("tag")), "Symbol(\"tag\")");
        assert_eq!(enc(Symbol::anonymous()), "Symbol()");
        assert_ne!(enc(Symbol::anonymous()), enc(Symbol::new("")));

        let named = Function::new("square", |_| Value::Null);
        assert_eq!(enc(named), "function:\"square\"");
        assert_eq!(enc(Function::anonymous(|_| Value::Null)), "function:anonymous");
        assert_ne!(
            enc(Function::new("anonymous", |_| Value::Null)),
            enc(Function::anonymous(|_| Value::Null))
        );
    }

    #[test]
    fn test_encode_array_preserves_order() {
        let a = Array::from_values([Value::from(1), Value::from(2)]);
        let b = Array::from_values([Value::from(2), Value::from(1)]);
        assert_eq!(enc(a.clone()), "[1,2]");
        assert_ne!(enc(a), enc(b));
    }

    #[test]
    fn test_encode_object_normalizes_property_order() {
        let obj1 = PlainObject::new();
        obj1.insert("a", 1);
        obj1.insert("b", 2);
        let obj2 = PlainObject::new();
        obj2.insert("b", 2);
        obj2.insert("a", 1);

        assert_eq!(enc(obj1.clone()), "{\"a\":1,\"b\":2}");
        assert_eq!(enc(obj1), enc(obj2));
    }

    #[test]
    fn test_encode_map_is_order_sensitive() {
        let m1 = MapValue::from_entries([
            (Value::from("a"), Value::from(1)),
            (Value::from("b"), Value::from(2)),
        ]);
        let m2 = MapValue::from_entries([
            (Value::from("b"), Value::from(2)),
            (Value::from("a"), Value::from(1)),
        ]);

        assert_eq!(enc(m1.clone()), "Map(\"a\":1,\"b\":2)");
        assert_ne!(enc(m1), enc(m2));
    }

    #[test]
    fn test_encode_set() {
        let set = SetValue::from_values([Value::from(1), Value::from("x")]);
        assert_eq!(enc(set), "Set(1,\"x\")");
    }

    #[test]
    fn test_encode_nested() {
        let inner = PlainObject::from_pairs([("k", Value::from(Array::from_values([
            Value::Null,
            Value::from(false),
        ])))]);
        let outer = Array::from_values([Value::from(inner), Value::Undefined]);
        assert_eq!(enc(outer), "[{\"k\":[null,false]},undefined]");
    }

    #[test]
    fn test_encode_shared_subobject_twice() {
        let shared = Array::from_values([Value::from(1)]);
        let outer = Array::from_values([Value::from(shared.clone()), Value::from(shared)]);
        assert_eq!(enc(outer), "[[1],[1]]");
    }

    #[test]
    fn test_encode_terminates_on_cycle() {
        let arr = Array::new();
        arr.push(arr.clone());
        assert_eq!(enc(arr.clone()), format!("[^{}]", arr.id()));
    }

    #[test]
    fn test_resolve_single_primitive() {
        let resolved = resolve(&[Value::from(5)], TupleKeying::SingleArgument);
        assert_eq!(resolved.strategy, Strategy::Primitive);
        assert_eq!(resolved.key, CacheKey::Canonical(encode(&Value::from(5))));
        assert!(resolved.anchors.is_empty());
    }

    #[test]
    fn test_resolve_single_reference() {
        let map = MapValue::new();
        let resolved = resolve(&[Value::from(map.clone())], TupleKeying::SingleArgument);

        assert_eq!(resolved.strategy, Strategy::ReferenceIdentity);
        assert_eq!(
            resolved.key,
            CacheKey::Identity(IdentityKey::Instance(map.id()))
        );
        assert_eq!(resolved.anchors.len(), 1);
        assert_eq!(resolved.key.table(), Table::Identity);
    }

    #[test]
    fn test_resolve_single_symbol() {
        let sym = Symbol::new("s");
        let resolved = resolve(&[Value::from(sym.clone())], TupleKeying::SingleArgument);
        assert_eq!(resolved.strategy, Strategy::SymbolIdentity);
        assert_eq!(
            resolved.key,
            CacheKey::Identity(IdentityKey::Instance(sym.id()))
        );
    }

    #[test]
    fn test_resolve_tuples() {
        let empty = resolve(&[], TupleKeying::SingleArgument);
        assert_eq!(empty.key, CacheKey::Canonical(CanonicalKey("()".into())));

        let pair = resolve(&[Value::from(1), Value::from(2)], TupleKeying::SingleArgument);
        let triple = resolve(
            &[Value::from(1), Value::from(2), Value::from(3)],
            TupleKeying::SingleArgument,
        );
        assert_eq!(pair.key, CacheKey::Canonical(CanonicalKey("(1,2)".into())));
        assert_ne!(pair.key, triple.key);
        assert_eq!(pair.strategy, Strategy::Primitive);
    }

    #[test]
    fn test_single_argument_never_collides_with_tuple() {
        let single = resolve(&[Value::from("(1,2)")], TupleKeying::SingleArgument);
        let pair = resolve(&[Value::from(1), Value::from(2)], TupleKeying::SingleArgument);
        let array = resolve(
            &[Value::from(Array::from_values([Value::from(1), Value::from(2)]))],
            TupleKeying::SingleArgument,
        );

        assert_ne!(single.key, pair.key);
        assert_ne!(array.key, pair.key);
    }

    #[test]
    fn test_tuple_equates_same_named_functions() {
        let f1 = Function::new("handler", |_| Value::Null);
        let f2 = Function::new("handler", |_| Value::from(1));

        let k1 = resolve(&[Value::from(f1), Value::from(1)], TupleKeying::SingleArgument);
        let k2 = resolve(&[Value::from(f2), Value::from(1)], TupleKeying::SingleArgument);

        assert_eq!(k1.key, k2.key);
        assert_eq!(k1.strategy, Strategy::Structural);
    }

    #[test]
    fn test_tuple_cyclic_member_keyed_by_instance() {
        let c1 = PlainObject::new();
        c1.insert("self", c1.clone());
        let c2 = PlainObject::new();
        c2.insert("self", c2.clone());

        let k1 = resolve(&[Value::from(c1.clone()), Value::from(0)], TupleKeying::SingleArgument);
        let k2 = resolve(&[Value::from(c2), Value::from(0)], TupleKeying::SingleArgument);

        assert_eq!(
            k1.key,
            CacheKey::Canonical(CanonicalKey(format!("(ref:{},0)", c1.id())))
        );
        assert_ne!(k1.key, k2.key);
    }

    #[test]
    fn test_per_argument_distinguishes_functions() {
        let f1 = Function::new("handler", |_| Value::Null);
        let f2 = Function::new("handler", |_| Value::Null);

        let k1 = resolve(&[Value::from(f1.clone()), Value::from(1)], TupleKeying::PerArgument);
        let k1_again = resolve(&[Value::from(f1.clone()), Value::from(1)], TupleKeying::PerArgument);
        let k2 = resolve(&[Value::from(f2), Value::from(1)], TupleKeying::PerArgument);

        assert_eq!(k1.key, k1_again.key);
        assert_ne!(k1.key, k2.key);
        assert_eq!(k1.strategy, Strategy::ReferenceIdentity);
        assert_eq!(k1.anchors.len(), 1);
        assert_eq!(
            k1.key,
            CacheKey::Identity(IdentityKey::Composite(vec![
                KeyPart::Identity(f1.id()),
                KeyPart::Canonical(encode(&Value::from(1))),
            ]))
        );
    }

    #[test]
    fn test_per_argument_all_canonical_matches_tuple() {
        let args = [Value::from(1), Value::from("x")];
        let per_arg = resolve(&args, TupleKeying::PerArgument);
        let tuple = resolve(&args, TupleKeying::SingleArgument);
        assert_eq!(per_arg.key, tuple.key);
        assert_eq!(per_arg.key.table(), Table::Canonical);
    }

    #[test]
    fn test_fingerprints_are_short_and_stable() {
        let key = resolve(&[Value::from(1), Value::from(2)], TupleKeying::SingleArgument).key;
        assert_eq!(key.fingerprint(), key.fingerprint());
        assert_eq!(key.fingerprint().len(), 16);

        let identity = CacheKey::Identity(IdentityKey::Instance(PlainObject::new().id()));
        assert_eq!(identity.fingerprint().len(), 16);
    }

    #[test]
    fn test_encode_deep_nesting() {
        let depth = 50_000;
        let mut value = Value::from(0);
        for _ in 0..depth {
            value = Value::from(Array::from_values([value]));
        }

        let encoded = encode(&value);
        assert_eq!(encoded.as_str().len(), 2 * depth + 1);
        assert!(encoded.as_str().starts_with("[[["));
        assert!(encoded.as_str().ends_with("0]]]"));
    }

    #[test]
    fn test_encode_back_reference_is_path_scoped() {
        // The inner map reaches the outer one: back-reference on re-entry,
        // full encoding for the sibling that is merely shared.
        let outer = MapValue::new();
        let shared = Array::from_values([Value::from(1)]);
        outer.insert("a", shared.clone());
        outer.insert("b", shared);
        outer.insert("me", outer.clone());

        assert_eq!(
            enc(outer.clone()),
            format!("Map(\"a\":[1],\"b\":[1],\"me\":^{})", outer.id())
        );
        outer.clear();
    }

    #[test]
    fn test_tuple_cyclic_map_keyed_by_instance() {
        let map = MapValue::new();
        map.insert("me", map.clone());
        let plain = MapValue::from_entries([(Value::from("k"), Value::from(1))]);

        let cyclic = resolve(&[Value::from(map.clone()), Value::from(0)], TupleKeying::SingleArgument);
        let acyclic = resolve(&[Value::from(plain), Value::from(0)], TupleKeying::SingleArgument);

        assert_eq!(
            cyclic.key,
            CacheKey::Canonical(CanonicalKey(format!("(ref:{},0)", map.id())))
        );
        assert_eq!(
            acyclic.key,
            CacheKey::Canonical(CanonicalKey("(Map(\"k\":1),0)".into()))
        );
        map.clear();
    }
}
