// Runtime value system for Tarn
// Represents values during execution (different from the IR, which represents compiled code)

use crate::ir::core::{FunctionDef, IrNode};
use crate::ir::intrinsics::Intrinsic;
use crate::runtime::environment::Frame;
use crate::runtime::error::RuntimeErrorKind;
use crate::runtime::interner;
use crate::runtime::native_stack::ensure_sufficient_stack;
use crate::runtime::reference::{Reference, ValueCell};
use crate::runtime::tasks::Deferred;
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Interned scalar payload. Only ever constructed through [`interner::intern`].
#[derive(Debug, Clone, PartialEq)]
pub enum Concrete {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
}

/// Marker values that are distinct from every concrete value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentinel {
    /// Content of a `let` cell before its initializer ran.
    Uninitialized,
    /// Result of reading a member a container does not define.
    Undefined,
    /// Produced by an exhausted iterator.
    End,
}

#[derive(Clone)]
pub enum Value {
    Concrete(Rc<Concrete>),
    List(Rc<List>),
    Dict(Rc<Dict>),
    Object(Rc<Object>),
    Closure(Rc<Closure>),
    Native(Rc<NativeFunction>),
    Reference(Rc<Reference>),
    Deferred(Rc<Deferred>),
    Iterator(Rc<ValueIter>),
    Thunk(Rc<Thunk>),
    Sentinel(Sentinel),
}

impl Value {
    pub fn null() -> Value {
        Value::Concrete(interner::intern(Concrete::Null))
    }

    pub fn boolean(b: bool) -> Value {
        Value::Concrete(interner::intern(Concrete::Boolean(b)))
    }

    pub fn number(n: f64) -> Value {
        Value::Concrete(interner::intern(Concrete::Number(n)))
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value::Concrete(interner::intern(Concrete::String(s.into())))
    }

    pub fn uninitialized() -> Value {
        Value::Sentinel(Sentinel::Uninitialized)
    }

    pub fn undefined() -> Value {
        Value::Sentinel(Sentinel::Undefined)
    }

    pub fn end() -> Value {
        Value::Sentinel(Sentinel::End)
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(List::new(items)))
    }

    pub fn dict(entries: impl IntoIterator<Item = (Value, Value)>) -> Value {
        Value::Dict(Rc::new(Dict::new(entries)))
    }

    pub fn object(fields: IndexMap<String, Value>, sealed: bool) -> Value {
        Value::Object(Rc::new(Object::new(fields, sealed)))
    }

    pub fn host_function(
        name: impl Into<String>,
        arity: Arity,
        func: impl Fn(&[Value]) -> Result<Value, RuntimeErrorKind> + 'static,
    ) -> Value {
        Value::Native(Rc::new(NativeFunction::Host(HostFunction {
            name: name.into(),
            arity,
            func: Rc::new(func),
        })))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Concrete(c) => match c.as_ref() {
                Concrete::Null => "null",
                Concrete::Boolean(_) => "boolean",
                Concrete::Number(_) => "number",
                Concrete::String(_) => "string",
            },
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Object(_) => "object",
            Value::Closure(_) => "closure",
            Value::Native(_) => "native",
            Value::Reference(_) => "reference",
            Value::Deferred(_) => "deferred",
            Value::Iterator(_) => "iterator",
            Value::Thunk(_) => "thunk",
            Value::Sentinel(Sentinel::Uninitialized) => "uninitialized",
            Value::Sentinel(Sentinel::Undefined) => "undefined",
            Value::Sentinel(Sentinel::End) => "end",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Concrete(c) if **c == Concrete::Null)
    }

    pub fn is_uninitialized(&self) -> bool {
        matches!(self, Value::Sentinel(Sentinel::Uninitialized))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Sentinel(Sentinel::Undefined))
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Value::Sentinel(Sentinel::End))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Concrete(c) => match c.as_ref() {
                Concrete::Boolean(b) => Some(*b),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Concrete(c) => match c.as_ref() {
                Concrete::Number(n) => Some(*n),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Concrete(c) => match c.as_ref() {
                Concrete::String(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    /// Only booleans have a truth value.
    pub fn truthiness(&self, operation: &str) -> Result<bool, RuntimeErrorKind> {
        self.as_bool()
            .ok_or_else(|| RuntimeErrorKind::type_error(operation, "boolean", self))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Native(_) | Value::Thunk(_))
    }

    /// Identity comparison: true when both values are the same runtime object.
    ///
    /// Interned scalars with equal raw content are always the same object.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Sentinel(a), Value::Sentinel(b)) => a == b,
            _ => self.identity().is_some() && self.identity() == other.identity(),
        }
    }

    fn identity(&self) -> Option<usize> {
        fn addr<T: ?Sized>(rc: &Rc<T>) -> usize {
            Rc::as_ptr(rc) as *const () as usize
        }
        match self {
            Value::Concrete(v) => Some(addr(v)),
            Value::List(v) => Some(addr(v)),
            Value::Dict(v) => Some(addr(v)),
            Value::Object(v) => Some(addr(v)),
            Value::Closure(v) => Some(addr(v)),
            Value::Native(v) => Some(addr(v)),
            Value::Reference(v) => Some(addr(v)),
            Value::Deferred(v) => Some(addr(v)),
            Value::Iterator(v) => Some(addr(v)),
            Value::Thunk(v) => Some(addr(v)),
            Value::Sentinel(_) => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // Raw comparison keeps NaN unequal to itself
            (Value::Concrete(a), Value::Concrete(b)) => a == b,
            (Value::Native(a), Value::Native(b)) => match (a.as_ref(), b.as_ref()) {
                (NativeFunction::Intrinsic(x), NativeFunction::Intrinsic(y)) => x == y,
                _ => Rc::ptr_eq(a, b),
            },
            _ => self.same(other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, &mut Vec::new())
    }
}

/// Address of a container's shared allocation.
fn container_address(value: &Value) -> Option<*const ()> {
    match value {
        Value::List(list) => Some(Rc::as_ptr(list) as *const ()),
        Value::Dict(dict) => Some(Rc::as_ptr(dict) as *const ()),
        Value::Object(object) => Some(Rc::as_ptr(object) as *const ()),
        _ => None,
    }
}

/// Writes `value`. `open` holds the containers being written further out; a
/// container met again inside itself prints as `[...]` or `{...}`.
fn write_value(
    f: &mut fmt::Formatter<'_>,
    value: &Value,
    open: &mut Vec<*const ()>,
) -> fmt::Result {
    let address = container_address(value);
    if let Some(address) = address {
        if open.contains(&address) {
            return match value {
                Value::List(_) => write!(f, "[...]"),
                _ => write!(f, "{{...}}"),
            };
        }
        open.push(address);
    }
    let result = ensure_sufficient_stack(|| write_contents(f, value, open));
    if address.is_some() {
        open.pop();
    }
    result
}

fn write_contents(
    f: &mut fmt::Formatter<'_>,
    value: &Value,
    open: &mut Vec<*const ()>,
) -> fmt::Result {
    match value {
        Value::Concrete(c) => match c.as_ref() {
            Concrete::Null => write!(f, "null"),
            Concrete::Boolean(b) => write!(f, "{}", b),
            Concrete::Number(n) => write!(f, "{}", n),
            Concrete::String(s) => write!(f, "\"{}\"", s),
        },
        Value::List(list) => {
            write!(f, "[")?;
            for (position, item) in list.items.borrow().iter().enumerate() {
                if position > 0 {
                    write!(f, ", ")?;
                }
                write_value(f, item, open)?;
            }
            write!(f, "]")
        }
        Value::Dict(dict) => {
            write!(f, "{{")?;
            for (position, (key, value)) in dict.entries.borrow().iter().enumerate() {
                if position > 0 {
                    write!(f, ", ")?;
                }
                write_value(f, &key.0, open)?;
                write!(f, ": ")?;
                write_value(f, value, open)?;
            }
            write!(f, "}}")
        }
        Value::Object(object) => {
            if object.sealed {
                write!(f, "struct ")?;
            }
            write!(f, "{{")?;
            for (position, (name, value)) in object.fields.borrow().iter().enumerate() {
                if position > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: ", name)?;
                write_value(f, value, open)?;
            }
            write!(f, "}}")
        }
        Value::Closure(closure) => write!(f, "#<closure {}>", closure.name()),
        Value::Native(native) => write!(f, "#<native {}>", native.name()),
        Value::Reference(_) => write!(f, "#<reference>"),
        Value::Deferred(deferred) => write!(f, "#<deferred {}>", deferred.id()),
        Value::Iterator(_) => write!(f, "#<iterator>"),
        Value::Thunk(_) => write!(f, "#<thunk>"),
        Value::Sentinel(Sentinel::Uninitialized) => write!(f, "#<uninitialized>"),
        Value::Sentinel(Sentinel::Undefined) => write!(f, "#<undefined>"),
        Value::Sentinel(Sentinel::End) => write!(f, "#<end>"),
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Dictionary key: hashes and compares by value identity.
///
/// Scalars are interned, so identity coincides with raw equality for them
/// (including `NaN`, whose interned allocation is unique per bit pattern).
#[derive(Clone)]
pub struct ValueKey(pub Value);

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.same(&other.0)
    }
}

impl Eq for ValueKey {}

impl Hash for ValueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Value::Sentinel(s) => s.hash(state),
            other => other.identity().hash(state),
        }
    }
}

impl fmt::Debug for ValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct List {
    pub items: RefCell<Vec<Value>>,
}

impl List {
    pub fn new(items: Vec<Value>) -> Self {
        List {
            items: RefCell::new(items),
        }
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.borrow().get(index).cloned()
    }

    pub fn push(&self, value: Value) {
        self.items.borrow_mut().push(value);
    }

    pub fn pop(&self) -> Option<Value> {
        self.items.borrow_mut().pop()
    }
}

#[derive(Debug, Default)]
pub struct Dict {
    pub entries: RefCell<IndexMap<ValueKey, Value>>,
}

impl Dict {
    pub fn new(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Dict {
            entries: RefCell::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (ValueKey(k), v))
                    .collect(),
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.entries.borrow().get(&ValueKey(key.clone())).cloned()
    }

    pub fn set(&self, key: Value, value: Value) {
        self.entries.borrow_mut().insert(ValueKey(key), value);
    }

    pub fn has(&self, key: &Value) -> bool {
        self.entries.borrow().contains_key(&ValueKey(key.clone()))
    }

    pub fn delete(&self, key: &Value) -> Option<Value> {
        self.entries.borrow_mut().shift_remove(&ValueKey(key.clone()))
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.borrow().keys().map(|k| k.0.clone()).collect()
    }
}

/// String-keyed property table. A sealed object (a struct) has a fixed field set.
#[derive(Debug, Default)]
pub struct Object {
    pub fields: RefCell<IndexMap<String, Value>>,
    pub sealed: bool,
}

impl Object {
    pub fn new(fields: IndexMap<String, Value>, sealed: bool) -> Self {
        Object {
            fields: RefCell::new(fields),
            sealed,
        }
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.borrow().contains_key(name)
    }

    pub fn set_field(&self, name: &str, value: Value) -> Result<(), RuntimeErrorKind> {
        let mut fields = self.fields.borrow_mut();
        match fields.get_mut(name) {
            Some(slot) => *slot = value,
            None if self.sealed => {
                return Err(RuntimeErrorKind::UnknownField {
                    field: name.to_string(),
                })
            }
            None => {
                fields.insert(name.to_string(), value);
            }
        }
        Ok(())
    }

    pub fn delete(&self, name: &str) -> Result<Option<Value>, RuntimeErrorKind> {
        if self.sealed {
            return Err(RuntimeErrorKind::ReadOnlyProperty {
                type_name: "struct".to_string(),
                property: name.to_string(),
            });
        }
        Ok(self.fields.borrow_mut().shift_remove(name))
    }

    pub fn keys(&self) -> Vec<Value> {
        self.fields.borrow().keys().map(Value::string).collect()
    }
}

/// An interpreted function: compiled definition plus the cells it captured.
#[derive(Debug)]
pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub captures: Rc<[ValueCell]>,
}

impl Closure {
    pub fn name(&self) -> &str {
        self.def.name.as_deref().unwrap_or("anonymous")
    }
}

/// Number of arguments a native accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    Variadic(usize), // Minimum number of arguments
    Range(usize, usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Arity::Fixed(n) => count == *n,
            Arity::Variadic(min) => count >= *min,
            Arity::Range(min, max) => count >= *min && count <= *max,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Fixed(n) => write!(f, "{}", n),
            Arity::Variadic(min) => write!(f, "at least {}", min),
            Arity::Range(min, max) => write!(f, "{} to {}", min, max),
        }
    }
}

#[derive(Clone)]
pub struct HostFunction {
    pub name: String,
    pub arity: Arity,
    pub func: Rc<dyn Fn(&[Value]) -> Result<Value, RuntimeErrorKind>>,
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Built-in methods exposed as properties of containers and iterators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerMethod {
    Get,
    Set,
    Has,
    Delete,
    Push,
    Pop,
    Iter,
    Next,
}

impl ContainerMethod {
    pub fn name(&self) -> &'static str {
        match self {
            ContainerMethod::Get => "get",
            ContainerMethod::Set => "set",
            ContainerMethod::Has => "has",
            ContainerMethod::Delete => "delete",
            ContainerMethod::Push => "push",
            ContainerMethod::Pop => "pop",
            ContainerMethod::Iter => "iter",
            ContainerMethod::Next => "next",
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            ContainerMethod::Get | ContainerMethod::Has | ContainerMethod::Delete => Arity::Fixed(1),
            ContainerMethod::Set => Arity::Fixed(2),
            ContainerMethod::Push => Arity::Fixed(1),
            ContainerMethod::Pop | ContainerMethod::Iter | ContainerMethod::Next => Arity::Fixed(0),
        }
    }
}

#[derive(Debug)]
pub enum NativeFunction {
    Intrinsic(Intrinsic),
    Host(HostFunction),
    /// A container method bound to its receiver.
    Method {
        receiver: Value,
        method: ContainerMethod,
    },
}

impl NativeFunction {
    pub fn name(&self) -> &str {
        match self {
            NativeFunction::Intrinsic(intrinsic) => intrinsic.name(),
            NativeFunction::Host(host) => &host.name,
            NativeFunction::Method { method, .. } => method.name(),
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            NativeFunction::Intrinsic(intrinsic) => intrinsic.arity(),
            NativeFunction::Host(host) => host.arity,
            NativeFunction::Method { method, .. } => method.arity(),
        }
    }
}

/// A suspended argument expression of an `fexpr` call.
///
/// `frames` is a snapshot of the caller's frames from its nearest call
/// boundary upwards, which is everything the expression can address.
#[derive(Debug)]
pub struct Thunk {
    pub node: Rc<IrNode>,
    pub frames: Vec<Frame>,
}

#[derive(Debug)]
pub enum IterSource {
    /// Reads the list live, so elements pushed during iteration are visited.
    List(Rc<List>),
    /// A snapshot of dictionary keys or object field names.
    Keys(Vec<Value>),
}

/// Lazy, finite and one-shot: once it yields `end` it keeps yielding `end`.
#[derive(Debug)]
pub struct ValueIter {
    source: IterSource,
    position: Cell<usize>,
    done: Cell<bool>,
}

impl ValueIter {
    pub fn new(source: IterSource) -> Self {
        ValueIter {
            source,
            position: Cell::new(0),
            done: Cell::new(false),
        }
    }

    pub fn next_value(&self) -> Value {
        if self.done.get() {
            return Value::end();
        }
        let position = self.position.get();
        let item = match &self.source {
            IterSource::List(list) => list.get(position),
            IterSource::Keys(keys) => keys.get(position).cloned(),
        };
        match item {
            Some(value) => {
                self.position.set(position + 1);
                value
            }
            None => {
                self.done.set(true);
                Value::end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scalars_are_interned() {
        assert!(Value::null().same(&Value::null()));
        assert!(Value::boolean(true).same(&Value::boolean(true)));
        assert!(Value::number(42.0).same(&Value::number(42.0)));
        assert!(Value::string("tarn").same(&Value::string("tarn")));
        assert!(!Value::string("a").same(&Value::string("b")));
    }

    #[test]
    fn test_nested_cycles_in_debug_output() {
        let outer = Value::list(Vec::new());
        let inner = Value::object(IndexMap::new(), false);
        if let (Value::List(list), Value::Object(object)) = (&outer, &inner) {
            list.items.borrow_mut().push(inner.clone());
            object.set_field("back", outer.clone()).unwrap();
        }
        assert_eq!(format!("{:?}", outer), "[{back: [...]}]");
        assert_eq!(format!("{:?}", inner), "{back: [{...}]}");
    }

    #[test]
    fn test_containers_compare_by_identity() {
        let a = Value::list(vec![Value::number(1.0)]);
        let b = Value::list(vec![Value::number(1.0)]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_nan_is_not_equal_to_itself() {
        let nan = Value::number(f64::NAN);
        assert_ne!(nan, nan.clone());
        assert!(nan.same(&nan.clone()));
    }

    #[test]
    fn test_dict_keys_by_identity() {
        let dict = Dict::default();
        dict.set(Value::string("k"), Value::number(1.0));
        dict.set(Value::number(2.0), Value::string("two"));
        assert_eq!(dict.get(&Value::string("k")), Some(Value::number(1.0)));
        assert_eq!(dict.get(&Value::number(2.0)), Some(Value::string("two")));

        let key = Value::list(vec![]);
        dict.set(key.clone(), Value::boolean(true));
        assert!(dict.has(&key));
        assert!(!dict.has(&Value::list(vec![])));
    }

    #[test]
    fn test_iterator_is_one_shot() {
        let list = Rc::new(List::new(vec![Value::number(1.0), Value::number(2.0)]));
        let iter = ValueIter::new(IterSource::List(list.clone()));
        assert_eq!(iter.next_value(), Value::number(1.0));
        assert_eq!(iter.next_value(), Value::number(2.0));
        assert!(iter.next_value().is_end());
        list.push(Value::number(3.0));
        assert!(iter.next_value().is_end());
    }

    #[test]
    fn test_sealed_object_rejects_new_fields() {
        let mut fields = IndexMap::new();
        fields.insert("x".to_string(), Value::number(1.0));
        let object = Object::new(fields, true);
        assert!(object.set_field("x", Value::number(2.0)).is_ok());
        assert_eq!(
            object.set_field("y", Value::number(2.0)),
            Err(RuntimeErrorKind::UnknownField {
                field: "y".to_string()
            })
        );
    }

    #[test]
    fn test_display() {
        let value = Value::list(vec![Value::number(1.0), Value::string("a"), Value::null()]);
        assert_eq!(value.to_string(), "[1, \"a\", null]");
        assert_eq!(Value::undefined().to_string(), "#<undefined>");
    }
}
