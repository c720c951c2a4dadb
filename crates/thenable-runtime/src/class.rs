//! Promise Classes
//!
//! A promise class is a constructor plus two member tables: statics on the
//! class itself and instance members on its prototype. Tables are mutable
//! so libraries can be extended after construction.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::type_error;
use crate::function::Function;
use crate::slots::Slots;
use crate::value::{Completion, Value};

/// `new Class(executor)`
pub type Constructor = dyn Fn(&PromiseClass, &Function) -> Completion;

/// Named member table
#[derive(Default)]
pub struct Members {
    entries: RefCell<BTreeMap<Rc<str>, Value>>,
}

impl Members {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.borrow().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    /// Sets a member, returning the previous one.
    pub fn define(&self, key: &str, value: impl Into<Value>) -> Option<Value> {
        self.entries.borrow_mut().insert(key.into(), value.into())
    }

    /// Sets a member only when absent.
    pub fn define_missing(&self, key: &str, value: impl Into<Value>) -> bool {
        let mut entries = self.entries.borrow_mut();
        if entries.contains_key(key) {
            return false;
        }
        entries.insert(key.into(), value.into());
        true
    }

    pub fn keys(&self) -> Vec<Rc<str>> {
        self.entries.borrow().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(Rc<str>, Value)> {
        self.entries
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

/// Instance member table shared by every promise of a class
#[derive(Clone, Default)]
pub struct Prototype(Rc<PrototypeInner>);

#[derive(Default)]
struct PrototypeInner {
    members: Members,
    slots: Slots,
}

impl Prototype {
    pub fn members(&self) -> &Members {
        &self.0.members
    }

    pub fn slots(&self) -> &Slots {
        &self.0.slots
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.members.get(key)
    }

    pub fn has_method(&self, key: &str) -> bool {
        matches!(self.get(key), Some(Value::Function(_)))
    }

    pub fn ptr_eq(&self, other: &Prototype) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[prototype {:?}]", self.members().keys())
    }
}

/// Shared handle to a promise class
#[derive(Clone)]
pub struct PromiseClass(Rc<ClassInner>);

struct ClassInner {
    name: Rc<str>,
    constructor: Box<Constructor>,
    statics: Members,
    /// Static keys that resolve to the class itself
    self_aliases: RefCell<BTreeSet<Rc<str>>>,
    prototype: Prototype,
    slots: Slots,
}

impl PromiseClass {
    pub fn new(
        name: &str,
        constructor: impl Fn(&PromiseClass, &Function) -> Completion + 'static,
    ) -> Self {
        Self(Rc::new(ClassInner {
            name: name.into(),
            constructor: Box::new(constructor),
            statics: Members::default(),
            self_aliases: RefCell::new(BTreeSet::new()),
            prototype: Prototype::default(),
            slots: Slots::new(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn prototype(&self) -> &Prototype {
        &self.0.prototype
    }

    /// Hidden per-class storage
    pub fn slots(&self) -> &Slots {
        &self.0.slots
    }

    pub fn get_static(&self, key: &str) -> Option<Value> {
        if self.0.self_aliases.borrow().contains(key) {
            return Some(Value::Class(self.clone()));
        }
        self.0.statics.get(key)
    }

    pub fn has_static(&self, key: &str) -> bool {
        self.0.self_aliases.borrow().contains(key) || self.0.statics.contains(key)
    }

    pub fn static_keys(&self) -> Vec<Rc<str>> {
        let mut keys = self.0.statics.keys();
        keys.extend(self.0.self_aliases.borrow().iter().cloned());
        keys.sort();
        keys
    }

    /// Sets a static member. A class stored under its own table is kept as
    /// an alias so the class never owns itself.
    pub fn define_static(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if matches!(&value, Value::Class(c) if c.ptr_eq(self)) {
            self.0.statics.entries.borrow_mut().remove(key);
            self.0.self_aliases.borrow_mut().insert(key.into());
        } else {
            self.0.self_aliases.borrow_mut().remove(key);
            self.0.statics.define(key, value);
        }
    }

    /// Sets a static member only when absent.
    pub fn define_static_missing(&self, key: &str, value: impl Into<Value>) -> bool {
        if self.has_static(key) {
            return false;
        }
        self.define_static(key, value);
        true
    }

    /// `Class[name](...args)` with the class as receiver.
    pub fn call_static(&self, name: &str, args: &[Value]) -> Completion {
        match self.get_static(name) {
            Some(Value::Function(f)) => f.call(&Value::Class(self.clone()), args),
            _ => Err(type_error(format!("{}.{name} is not a function", self.name()))),
        }
    }

    /// `new Class(executor)`
    pub fn construct(&self, executor: Function) -> Completion {
        (self.0.constructor)(self, &executor)
    }

    pub fn resolve(&self, value: Value) -> Completion {
        self.call_static("resolve", &[value])
    }

    pub fn reject(&self, reason: Value) -> Completion {
        self.call_static("reject", &[reason])
    }

    pub fn downgrade(&self) -> WeakPromiseClass {
        WeakPromiseClass(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &PromiseClass) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for PromiseClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[class {}]", self.name())
    }
}

/// Non-owning class handle, held by members installed on other classes
#[derive(Clone)]
pub struct WeakPromiseClass(Weak<ClassInner>);

impl WeakPromiseClass {
    pub fn upgrade(&self) -> Option<PromiseClass> {
        self.0.upgrade().map(PromiseClass)
    }
}

impl fmt::Debug for WeakPromiseClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(class) => write!(f, "(weak) {class:?}"),
            None => f.write_str("(weak) [dropped class]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str) -> PromiseClass {
        PromiseClass::new(name, |_, _| Ok(Value::Undefined))
    }

    #[test]
    fn test_self_alias_does_not_own_class() {
        let c = class("P");
        c.define_static("Self", c.clone());
        assert!(matches!(c.get_static("Self"), Some(Value::Class(s)) if s.ptr_eq(&c)));
        let weak = c.downgrade();
        drop(c);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_define_missing_keeps_existing() {
        let c = class("P");
        c.define_static("x", Value::from(1));
        assert!(!c.define_static_missing("x", Value::from(2)));
        assert!(c.define_static_missing("y", Value::from(3)));
        assert_eq!(c.get_static("x"), Some(Value::from(1)));
        assert_eq!(c.static_keys().len(), 2);
    }

    #[test]
    fn test_call_missing_static() {
        let c = class("P");
        let err = c.call_static("nope", &[]).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: P.nope is not a function");
    }
}
