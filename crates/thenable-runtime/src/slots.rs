//! Hidden Slots
//!
//! Typed per-object storage invisible to property enumeration. Libraries
//! key their private state by Rust type instead of by property name.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Default)]
pub struct Slots {
    entries: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
}

impl Slots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Any>(&self) -> Option<Rc<T>> {
        let entry = self.entries.borrow().get(&TypeId::of::<T>()).cloned()?;
        entry.downcast::<T>().ok()
    }

    pub fn insert<T: Any>(&self, value: T) -> Rc<T> {
        let value = Rc::new(value);
        self.entries.borrow_mut().insert(TypeId::of::<T>(), value.clone());
        value
    }

    /// Returns the stored value, creating it on first access.
    pub fn get_or_insert_with<T: Any>(&self, init: impl FnOnce() -> T) -> Rc<T> {
        if let Some(existing) = self.get::<T>() {
            return existing;
        }
        self.insert(init())
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.entries.borrow().contains_key(&TypeId::of::<T>())
    }

    pub fn remove<T: Any>(&self) -> Option<Rc<T>> {
        let entry = self.entries.borrow_mut().remove(&TypeId::of::<T>())?;
        entry.downcast::<T>().ok()
    }
}

impl fmt::Debug for Slots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slots({})", self.entries.borrow().len())
    }
}
