//! Script Values
//!
//! Dynamic values exchanged between promises, handlers and class members.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::class::{PromiseClass, Prototype};
use crate::error::{ErrorKind, ErrorValue};
use crate::function::Function;
use crate::thenable::PromiseRef;

/// Outcome of running script-level code. `Err` carries the thrown value.
pub type Completion = Result<Value, Value>;

/// Dynamic script value
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Array),
    Object(Object),
    Function(Function),
    Error(ErrorValue),
    /// An error constructor, usable as a `caught` filter.
    ErrorClass(ErrorKind),
    Promise(PromiseRef),
    Class(PromiseClass),
    Prototype(Prototype),
    Host(HostObject),
}

impl Value {
    pub fn string(s: &str) -> Self {
        Value::String(s.into())
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Array::from_vec(items.into_iter().collect()))
    }

    pub fn object<K: AsRef<str>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(Object::from_entries(entries))
    }

    /// `typeof` result.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) | Value::ErrorClass(_) | Value::Class(_) => "function",
            Value::Null
            | Value::Array(_)
            | Value::Object(_)
            | Value::Error(_)
            | Value::Promise(_)
            | Value::Prototype(_)
            | Value::Host(_) => "object",
        }
    }

    /// `Object.prototype.toString` tag, e.g. `[object Array]`.
    pub fn object_tag(&self) -> String {
        let tag = match self {
            Value::Undefined => "Undefined",
            Value::Null => "Null",
            Value::Bool(_) => "Boolean",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::Array(_) => "Array",
            Value::Function(_) | Value::ErrorClass(_) | Value::Class(_) => "Function",
            Value::Error(_) => "Error",
            Value::Promise(_) => "Promise",
            Value::Object(_) | Value::Prototype(_) | Value::Host(_) => "Object",
        };
        format!("[object {tag}]")
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorValue> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<&PromiseRef> {
        match self {
            Value::Promise(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&PromiseClass> {
        match self {
            Value::Class(c) => Some(c),
            _ => None,
        }
    }

    /// `value instanceof kind` for error values.
    pub fn is_instance_of(&self, kind: ErrorKind) -> bool {
        self.as_error().is_some_and(|e| e.kind().is_a(kind))
    }

    /// The callable `then` of a plain object thenable.
    ///
    /// Promises are not covered here; match on [`Value::Promise`] first.
    pub fn thenable_then(&self) -> Option<Function> {
        match self {
            Value::Object(o) => match o.get("then") {
                Some(Value::Function(f)) => Some(f),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether the value exposes `then` (promise or object thenable).
    pub fn is_thenable(&self) -> bool {
        matches!(self, Value::Promise(_)) || self.thenable_then().is_some()
    }

    /// Numeric `length`, when the value has one.
    pub fn length(&self) -> Option<usize> {
        match self {
            Value::Array(a) => Some(a.len()),
            Value::String(s) => Some(s.chars().count()),
            Value::Error(e) if e.kind() == ErrorKind::AggregateError => Some(e.errors().len()),
            _ => None,
        }
    }

    /// Property read (`value[key]`). Missing properties read as `undefined`.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(o) => o.get(key).unwrap_or_default(),
            Value::Array(a) => match key {
                "length" => Value::from(a.len()),
                _ => parse_index(key).and_then(|i| a.get(i)).unwrap_or_default(),
            },
            Value::String(s) => match key {
                "length" => Value::from(s.chars().count()),
                _ => parse_index(key)
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::String(c.to_string().into()))
                    .unwrap_or_default(),
            },
            Value::Error(e) => e.get(key),
            Value::Function(f) => match key {
                "name" => Value::String(f.name()),
                _ => Value::Undefined,
            },
            Value::ErrorClass(kind) => match key {
                "name" => Value::string(kind.name()),
                _ => Value::Undefined,
            },
            Value::Promise(p) => p.get(key).unwrap_or_default(),
            Value::Class(c) => match key {
                "name" => Value::string(c.name()),
                "prototype" => Value::Prototype(c.prototype().clone()),
                _ => c.get_static(key).unwrap_or_default(),
            },
            Value::Prototype(p) => p.get(key).unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    pub fn get_index(&self, index: usize) -> Value {
        self.get(&index.to_string())
    }

    /// Reference identity for objects, value identity for primitives.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Error(a), Value::Error(b)) => a.ptr_eq(b),
            (Value::ErrorClass(a), Value::ErrorClass(b)) => a == b,
            (Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
            (Value::Class(a), Value::Class(b)) => a.ptr_eq(b),
            (Value::Prototype(a), Value::Prototype(b)) => a.ptr_eq(b),
            (Value::Host(a), Value::Host(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

fn parse_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse().ok()
}

/// Structural equality for arrays and objects, identity for everything else.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b) || a.to_vec() == b.to_vec(),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b) || a.entries() == b.entries(),
            _ => self.same(other),
        }
    }
}

/// `String(value)`
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => fmt_number(f, *n),
            Value::String(s) => f.write_str(s),
            Value::Array(a) => {
                for (i, item) in a.to_vec().iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if !item.is_nullish() {
                        write!(f, "{item}")?;
                    }
                }
                Ok(())
            }
            Value::Function(func) => write!(f, "function {}() {{ [native code] }}", func.name()),
            Value::ErrorClass(kind) => write!(f, "function {}() {{ [native code] }}", kind.name()),
            Value::Class(c) => write!(f, "function {}() {{ [native code] }}", c.name()),
            Value::Error(e) => write!(f, "{e}"),
            other => f.write_str(&other.object_tag()),
        }
    }
}

fn fmt_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n == 0.0 {
        f.write_str("0")
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        write!(f, "{n:.0}")
    } else {
        write!(f, "{n}")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(a) => f.debug_list().entries(a.to_vec()).finish(),
            Value::Object(o) => {
                let mut map = f.debug_map();
                for (k, v) in o.entries() {
                    map.entry(&k, &v);
                }
                map.finish()
            }
            Value::Function(func) => write!(f, "[Function: {}]", func.name()),
            Value::Error(e) => write!(f, "{e:?}"),
            Value::ErrorClass(kind) => write!(f, "[class {}]", kind.name()),
            Value::Promise(p) => write!(f, "{p:?}"),
            Value::Class(c) => write!(f, "{c:?}"),
            Value::Prototype(p) => write!(f, "{p:?}"),
            Value::Host(h) => write!(f, "[{}]", h.type_name()),
            other => write!(f, "{other}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Array::from_vec(items))
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl From<ErrorValue> for Value {
    fn from(e: ErrorValue) -> Self {
        Value::Error(e)
    }
}

impl From<PromiseRef> for Value {
    fn from(p: PromiseRef) -> Self {
        Value::Promise(p)
    }
}

impl From<PromiseClass> for Value {
    fn from(c: PromiseClass) -> Self {
        Value::Class(c)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

/// Shared, insertion-ordered property bag
#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<Vec<(Rc<str>, Value)>>>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<K: AsRef<str>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        let object = Self::new();
        for (key, value) in entries {
            object.set(key.as_ref(), value);
        }
        object
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.borrow().iter().find(|(k, _)| &**k == key).map(|(_, v)| v.clone())
    }

    pub fn set(&self, key: &str, value: Value) {
        let mut props = self.0.borrow_mut();
        match props.iter_mut().find(|(k, _)| &**k == key) {
            Some(slot) => slot.1 = value,
            None => props.push((key.into(), value)),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.borrow().iter().any(|(k, _)| &**k == key)
    }

    pub fn keys(&self) -> Vec<Rc<str>> {
        self.0.borrow().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn entries(&self) -> Vec<(Rc<str>, Value)> {
        self.0.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Calls `self[name](...args)` with `self` as the receiver.
    pub fn call_method(&self, name: &str, args: &[Value]) -> Completion {
        match self.get(name) {
            Some(Value::Function(f)) => f.call(&Value::Object(self.clone()), args),
            _ => Err(crate::error::type_error(format!("{name} is not a function"))),
        }
    }
}

/// Shared array
#[derive(Clone, Default)]
pub struct Array(Rc<RefCell<Vec<Value>>>);

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    pub fn set(&self, index: usize, value: Value) {
        let mut items = self.0.borrow_mut();
        if index >= items.len() {
            items.resize(index + 1, Value::Undefined);
        }
        items[index] = value;
    }

    pub fn push(&self, value: Value) {
        self.0.borrow_mut().push(value);
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Opaque host-defined object (disposers, resource handles)
#[derive(Clone)]
pub struct HostObject {
    type_name: &'static str,
    inner: Rc<dyn Any>,
}

impl HostObject {
    pub fn new<T: Any>(type_name: &'static str, value: T) -> Self {
        Self { type_name, inner: Rc::new(value) }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }

    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
