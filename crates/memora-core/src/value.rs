//! Runtime values passed to memoized callables.
//!
//! [`Value`] is a tagged union over the argument kinds a memoized callable
//! can receive. Scalars (`Null`, `Undefined`, `Boolean`, `Number`, `String`)
//! are plain data. Everything else is a *reference-typed* value: a cheap
//! handle to a shared instance that carries its own [`ObjectId`].
//!
//! ## Identity
//!
//! Cloning a handle yields the same instance; constructing a new handle
//! always yields a new one, even when the contents are identical:
//!
//! ```
//! use memora_core::value::{Array, Value};
//!
//! let a = Array::from_values([Value::from(1), Value::from(2)]);
//! let b = Array::from_values([Value::from(1), Value::from(2)]);
//!
//! assert_eq!(a.id(), a.clone().id());
//! assert_ne!(a.id(), b.id());
//! ```
//!
//! ## Self-reference
//!
//! Composite contents sit behind a lock, so a value can be made to contain
//! itself:
//!
//! ```
//! use memora_core::value::{PlainObject, Value};
//!
//! let circular = PlainObject::new();
//! circular.insert("self", circular.clone());
//! assert!(circular.get("self").is_some());
//!
//! // The value keeps itself alive until the cycle is broken.
//! circular.clear();
//! ```
//!
//! Handles are reference counted, so a self-referential value is never
//! freed on its own: it stays alive, and weak references to it stay live,
//! until its cycle is broken with `clear`, `remove` or `set`.
//!
//! Dropping the last handle to a deeply nested value does not recurse; the
//! contents are released with an explicit work list.
//!
//! Ids are drawn from a process-wide counter and are never reused, so an id
//! observed once can never alias a later instance.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};

use crate::error::{MemoraError, Result};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a reference-typed value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Node<T> {
    id: ObjectId,
    data: RwLock<T>,
}

/// Shared, lockable storage behind every composite value.
struct Shared<T> {
    node: Arc<Node<T>>,
}

impl<T> Shared<T> {
    fn new(data: T) -> Self {
        Self {
            node: Arc::new(Node {
                id: ObjectId::next(),
                data: RwLock::new(data),
            }),
        }
    }

    fn id(&self) -> ObjectId {
        self.node.id
    }

    fn read(&self) -> RwLockReadGuard<'_, T> {
        self.node.data.read()
    }
}

impl<T: Send + Sync + 'static> Shared<T> {
    fn downgrade(&self) -> WeakValue {
        WeakValue {
            id: self.node.id,
            handle: Arc::downgrade(&self.node) as Weak<dyn Any + Send + Sync>,
        }
    }
}

impl<T: Contents> Shared<T> {
    /// Move the children out if this is the last strong handle.
    fn detach_if_last(&self, out: &mut Vec<Value>) {
        if Arc::strong_count(&self.node) == 1 {
            self.node.data.write().drain_into(out);
        }
    }

    /// Release the contents of the last handle one level at a time.
    fn release(&self) {
        let mut pending = Vec::new();
        self.detach_if_last(&mut pending);
        while let Some(value) = pending.pop() {
            value.detach_if_last(&mut pending);
        }
    }

    fn clear(&self) {
        // Dropped after the write guard; the contents may hold this node.
        let removed = std::mem::take(&mut *self.node.data.write());
        drop(removed);
    }
}

/// Composite contents that can hand over their child values.
trait Contents: Default {
    fn drain_into(&mut self, out: &mut Vec<Value>);
}

impl Contents for Vec<Value> {
    fn drain_into(&mut self, out: &mut Vec<Value>) {
        out.append(self);
    }
}

impl Contents for Vec<(Value, Value)> {
    fn drain_into(&mut self, out: &mut Vec<Value>) {
        for (key, value) in self.drain(..) {
            out.push(key);
            out.push(value);
        }
    }
}

impl Contents for BTreeMap<String, Value> {
    fn drain_into(&mut self, out: &mut Vec<Value>) {
        out.extend(std::mem::take(self).into_values());
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

/// A weak reference to a reference-typed value.
///
/// Does not keep the instance alive. Used by caches that key entries on
/// identity and want to know when the keying instance is gone.
#[derive(Clone)]
pub struct WeakValue {
    id: ObjectId,
    handle: Weak<dyn Any + Send + Sync>,
}

impl WeakValue {
    /// Identity of the referenced instance.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Whether the referenced instance is still reachable.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.handle.strong_count() > 0
    }
}

impl fmt::Debug for WeakValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakValue")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

struct SymbolData {
    id: ObjectId,
    description: Option<String>,
}

/// A unique symbol. Two symbols are equal only if they are the same instance.
#[derive(Clone)]
pub struct Symbol(Arc<SymbolData>);

impl Symbol {
    /// Create a fresh symbol with a description.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self(Arc::new(SymbolData {
            id: ObjectId::next(),
            description: Some(description.into()),
        }))
    }

    /// Create a fresh symbol without a description.
    #[must_use]
    pub fn anonymous() -> Self {
        Self(Arc::new(SymbolData {
            id: ObjectId::next(),
            description: None,
        }))
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(desc) => write!(f, "Symbol#{}({:?})", self.id(), desc),
            None => write!(f, "Symbol#{}()", self.id()),
        }
    }
}

type FunctionBody = Box<dyn Fn(&[Value]) -> Value + Send + Sync>;

struct FunctionData {
    id: ObjectId,
    name: Option<String>,
    body: FunctionBody,
}

/// A callable value, compared by identity.
#[derive(Clone)]
pub struct Function(Arc<FunctionData>);

impl Function {
    /// Create a named function value.
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(FunctionData {
            id: ObjectId::next(),
            name: Some(name.into()),
            body: Box::new(body),
        }))
    }

    /// Create a function value with no name.
    pub fn anonymous<F>(body: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(FunctionData {
            id: ObjectId::next(),
            name: None,
            body: Box::new(body),
        }))
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    /// Invoke the function.
    pub fn call(&self, args: &[Value]) -> Value {
        (self.0.body)(args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Function#{}({})",
            self.id(),
            self.name().unwrap_or("anonymous")
        )
    }
}

/// An ordered list of values.
///
/// An array that contains itself is kept alive by that cycle; call
/// [`Array::clear`] to break it.
#[derive(Clone)]
pub struct Array(Shared<Vec<Value>>);

impl Array {
    #[must_use]
    pub fn new() -> Self {
        Self(Shared::new(Vec::new()))
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self(Shared::new(values.into_iter().collect()))
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.0.id()
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.0.node.data.write().push(value.into());
    }

    /// Replace the element at `index`.
    ///
    /// Arrays are dense; writing past the end is an error.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        let mut items = self.0.node.data.write();
        let len = items.len();
        let slot = items.get_mut(index).ok_or_else(|| {
            MemoraError::InvalidValue(format!("index {index} out of bounds for array of {len}"))
        })?;
        *slot = value.into();
        Ok(())
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.read().get(index).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Borrow the elements. Holds a read lock until the guard is dropped.
    pub fn items(&self) -> RwLockReadGuard<'_, Vec<Value>> {
        self.0.read()
    }

    /// Remove every element.
    pub fn clear(&self) {
        self.0.clear();
    }
}

impl Drop for Array {
    fn drop(&mut self) {
        self.0.release();
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

/// A keyed record with string property names.
///
/// Properties are kept sorted by name, so insertion order is not observable.
///
/// An object that reaches itself through its properties is kept alive by
/// that cycle; call [`PlainObject::clear`] (or remove the back-edge) to
/// break it.
#[derive(Clone)]
pub struct PlainObject(Shared<BTreeMap<String, Value>>);

impl PlainObject {
    #[must_use]
    pub fn new() -> Self {
        Self(Shared::new(BTreeMap::new()))
    }

    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self(Shared::new(
            pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.0.id()
    }

    /// Set a property, returning the previous value if any.
    pub fn insert(&self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.node.data.write().insert(name.into(), value.into())
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.0.node.data.write().remove(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.read().get(name).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Borrow the properties, sorted by name.
    pub fn properties(&self) -> RwLockReadGuard<'_, BTreeMap<String, Value>> {
        self.0.read()
    }

    /// Remove every property.
    pub fn clear(&self) {
        self.0.clear();
    }
}

impl Drop for PlainObject {
    fn drop(&mut self) {
        self.0.release();
    }
}

impl Default for PlainObject {
    fn default() -> Self {
        Self::new()
    }
}

/// An insertion-ordered map with arbitrary value keys.
///
/// Keys are compared with [`Value::same_value_zero`]. Overwriting an existing
/// key keeps its original position.
#[derive(Clone)]
pub struct MapValue(Shared<Vec<(Value, Value)>>);

impl MapValue {
    #[must_use]
    pub fn new() -> Self {
        Self(Shared::new(Vec::new()))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let map = Self::new();
        for (key, value) in entries {
            map.insert(key, value);
        }
        map
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.0.id()
    }

    /// Set `key` to `value`, returning the previous value if any.
    pub fn insert(&self, key: impl Into<Value>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        let mut entries = self.0.node.data.write();
        if let Some((_, slot)) = entries.iter_mut().find(|(k, _)| k.same_value_zero(&key)) {
            return Some(std::mem::replace(slot, value));
        }
        entries.push((key, value));
        None
    }

    #[must_use]
    pub fn get(&self, key: &Value) -> Option<Value> {
        self.0
            .read()
            .iter()
            .find(|(k, _)| k.same_value_zero(key))
            .map(|(_, v)| v.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Borrow the entries in insertion order.
    pub fn entries(&self) -> RwLockReadGuard<'_, Vec<(Value, Value)>> {
        self.0.read()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.0.clear();
    }
}

impl Drop for MapValue {
    fn drop(&mut self) {
        self.0.release();
    }
}

impl Default for MapValue {
    fn default() -> Self {
        Self::new()
    }
}

/// An insertion-ordered set of values, deduplicated with SameValueZero.
#[derive(Clone)]
pub struct SetValue(Shared<Vec<Value>>);

impl SetValue {
    #[must_use]
    pub fn new() -> Self {
        Self(Shared::new(Vec::new()))
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let set = Self::new();
        for value in values {
            set.insert(value);
        }
        set
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.0.id()
    }

    /// Add a member. Returns `false` if an equal member was already present.
    pub fn insert(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        let mut members = self.0.node.data.write();
        if members.iter().any(|m| m.same_value_zero(&value)) {
            return false;
        }
        members.push(value);
        true
    }

    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        self.0.read().iter().any(|m| m.same_value_zero(value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Borrow the members in insertion order.
    pub fn members(&self) -> RwLockReadGuard<'_, Vec<Value>> {
        self.0.read()
    }

    /// Remove every member.
    pub fn clear(&self) {
        self.0.clear();
    }
}

impl Drop for SetValue {
    fn drop(&mut self) {
        self.0.release();
    }
}

impl Default for SetValue {
    fn default() -> Self {
        Self::new()
    }
}

/// An argument to a memoized callable.
#[derive(Clone)]
pub enum Value {
    Null,
    Undefined,
    Boolean(bool),
    Number(f64),
    String(String),
    Symbol(Symbol),
    Function(Function),
    Array(Array),
    PlainObject(PlainObject),
    MapValue(MapValue),
    SetValue(SetValue),
}

impl Value {
    /// Short name of the variant, for logs and error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Undefined => "undefined",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Function(_) => "function",
            Self::Array(_) => "array",
            Self::PlainObject(_) => "object",
            Self::MapValue(_) => "map",
            Self::SetValue(_) => "set",
        }
    }

    /// Identity of a reference-typed value; `None` for scalars.
    #[must_use]
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Self::Null
            | Self::Undefined
            | Self::Boolean(_)
            | Self::Number(_)
            | Self::String(_) => None,
            Self::Symbol(s) => Some(s.id()),
            Self::Function(f) => Some(f.id()),
            Self::Array(a) => Some(a.id()),
            Self::PlainObject(o) => Some(o.id()),
            Self::MapValue(m) => Some(m.id()),
            Self::SetValue(s) => Some(s.id()),
        }
    }

    /// Weak reference to a reference-typed value; `None` for scalars.
    #[must_use]
    pub fn downgrade(&self) -> Option<WeakValue> {
        match self {
            Self::Null
            | Self::Undefined
            | Self::Boolean(_)
            | Self::Number(_)
            | Self::String(_) => None,
            Self::Symbol(s) => Some(WeakValue {
                id: s.id(),
                handle: Arc::downgrade(&s.0) as Weak<dyn Any + Send + Sync>,
            }),
            Self::Function(f) => Some(WeakValue {
                id: f.id(),
                handle: Arc::downgrade(&f.0) as Weak<dyn Any + Send + Sync>,
            }),
            Self::Array(a) => Some(a.0.downgrade()),
            Self::PlainObject(o) => Some(o.0.downgrade()),
            Self::MapValue(m) => Some(m.0.downgrade()),
            Self::SetValue(s) => Some(s.0.downgrade()),
        }
    }

    fn detach_if_last(&self, out: &mut Vec<Value>) {
        match self {
            Self::Array(a) => a.0.detach_if_last(out),
            Self::PlainObject(o) => o.0.detach_if_last(out),
            Self::MapValue(m) => m.0.detach_if_last(out),
            Self::SetValue(s) => s.0.detach_if_last(out),
            Self::Null
            | Self::Undefined
            | Self::Boolean(_)
            | Self::Number(_)
            | Self::String(_)
            | Self::Symbol(_)
            | Self::Function(_) => {}
        }
    }

    /// SameValueZero equality: scalars by value (`NaN` equals `NaN`, `-0`
    /// equals `0`), reference types by identity.
    #[must_use]
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) | (Self::Undefined, Self::Undefined) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::String(a), Self::String(b)) => a == b,
            _ => match (self.object_id(), other.object_id()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

// Composites print their identity only; following children would not
// terminate on self-referential values.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Undefined => write!(f, "Undefined"),
            Self::Boolean(b) => write!(f, "Boolean({b})"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Symbol(s) => fmt::Debug::fmt(s, f),
            Self::Function(func) => fmt::Debug::fmt(func, f),
            Self::Array(a) => write!(f, "Array#{}", a.id()),
            Self::PlainObject(o) => write!(f, "PlainObject#{}", o.id()),
            Self::MapValue(m) => write!(f, "MapValue#{}", m.id()),
            Self::SetValue(s) => write!(f, "SetValue#{}", s.id()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Self::Symbol(s)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Self::Function(f)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Self::Array(a)
    }
}

impl From<PlainObject> for Value {
    fn from(o: PlainObject) -> Self {
        Self::PlainObject(o)
    }
}

impl From<MapValue> for Value {
    fn from(m: MapValue) -> Self {
        Self::MapValue(m)
    }
}

impl From<SetValue> for Value {
    fn from(s: SetValue) -> Self {
        Self::SetValue(s)
    }
}
