//! State Inspector
//!
//! Synchronous status of an asynchronous promise. The first inspection
//! attaches a [`StatusCell`] to the promise. If the host can introspect the
//! promise the cell is filled right away; otherwise a side observer fills it
//! when the promise settles. A settled cell never changes again.

use std::cell::RefCell;
use std::rc::Rc;

use thenable_runtime::{Completion, ErrorKind, PromiseRef, PromiseState, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending = 0,
    Fulfilled = 1,
    Rejected = 2,
}

/// `[state, payload]` record attached to an inspected promise
#[derive(Debug, Clone, PartialEq)]
pub struct StatusCell {
    pub status: Status,
    /// Fulfillment value or rejection reason once settled
    pub payload: Value,
}

impl StatusCell {
    fn pending() -> Self {
        Self { status: Status::Pending, payload: Value::Undefined }
    }

    fn record(&mut self, outcome: Completion) {
        if self.status != Status::Pending {
            return;
        }
        *self = match outcome {
            Ok(value) => Self { status: Status::Fulfilled, payload: value },
            Err(reason) => Self { status: Status::Rejected, payload: reason },
        };
    }

    pub fn to_state(&self) -> PromiseState {
        match self.status {
            Status::Pending => PromiseState::Pending,
            Status::Fulfilled => PromiseState::Fulfilled(self.payload.clone()),
            Status::Rejected => PromiseState::Rejected(self.payload.clone()),
        }
    }
}

/// Slot holding the shared cell
struct StatusSlot(Rc<RefCell<StatusCell>>);

pub fn inspect(promise: &PromiseRef) -> StatusCell {
    let existing = promise.slots().get::<StatusSlot>();
    let created = existing.is_none();
    let slot = match existing {
        Some(slot) => slot,
        None => promise
            .slots()
            .insert(StatusSlot(Rc::new(RefCell::new(StatusCell::pending())))),
    };
    if slot.0.borrow().status != Status::Pending {
        return slot.0.borrow().clone();
    }

    match promise.introspect() {
        Some(state) => {
            if let Some(outcome) = state.outcome() {
                slot.0.borrow_mut().record(outcome);
            }
        }
        None if created => {
            tracing::trace!(promise = %promise.id(), "attaching status observer");
            let cell = slot.0.clone();
            promise.react(Box::new(move |outcome| cell.borrow_mut().record(outcome)));
        }
        None => {}
    }
    let cell = slot.0.borrow().clone();
    cell
}

pub fn status(promise: &PromiseRef) -> Status {
    inspect(promise).status
}

pub fn is_pending(promise: &PromiseRef) -> bool {
    status(promise) == Status::Pending
}

pub fn is_fulfilled(promise: &PromiseRef) -> bool {
    status(promise) == Status::Fulfilled
}

pub fn is_rejected(promise: &PromiseRef) -> bool {
    status(promise) == Status::Rejected
}

pub fn is_resolved(promise: &PromiseRef) -> bool {
    status(promise) != Status::Pending
}

/// Rejected with a `CancellationError`.
pub fn is_cancelled(promise: &PromiseRef) -> bool {
    let cell = inspect(promise);
    cell.status == Status::Rejected && cell.payload.is_instance_of(ErrorKind::CancellationError)
}

/// Fulfillment value, or `undefined` when not (yet) known to be fulfilled.
pub fn value(promise: &PromiseRef) -> Value {
    let cell = inspect(promise);
    match cell.status {
        Status::Fulfilled => cell.payload,
        _ => Value::Undefined,
    }
}

/// Rejection reason, or `undefined` when not (yet) known to be rejected.
pub fn reason(promise: &PromiseRef) -> Value {
    let cell = inspect(promise);
    match cell.status {
        Status::Rejected => cell.payload,
        _ => Value::Undefined,
    }
}

pub fn to_json(promise: &PromiseRef) -> Value {
    thenable_rich::inspection::to_json(&inspect(promise).to_state())
}

#[cfg(test)]
mod tests {
    use super::*;
    use thenable_runtime::{Realm, RuntimeConfig};

    fn opaque_realm() -> Realm {
        Realm::new(RuntimeConfig { sync_introspection: false, ..RuntimeConfig::default() })
    }

    #[test]
    fn test_introspection_fills_immediately() {
        let realm = Realm::default();
        let p = realm.reject("no").to_ref();
        assert_eq!(status(&p), Status::Rejected);
        assert_eq!(reason(&p), Value::from("no"));
        assert!(value(&p).is_undefined());
    }

    #[test]
    fn test_observer_fills_later() {
        let realm = opaque_realm();
        let p = realm.resolve(5).to_ref();
        assert!(is_pending(&p));
        assert!(value(&p).is_undefined());
        realm.run_microtasks();
        assert!(is_fulfilled(&p));
        assert_eq!(value(&p), Value::from(5));
    }

    #[test]
    fn test_settled_cell_is_stable() {
        let realm = Realm::default();
        let p = realm.resolve(1).to_ref();
        let first = inspect(&p);
        let second = inspect(&p);
        assert_eq!(first, second);
        assert_eq!(first.status, Status::Fulfilled);
    }

    #[test]
    fn test_pending_cell_updates_in_place() {
        let realm = Realm::default();
        let (p, resolvers) = realm.pending();
        let handle = p.to_ref();
        assert!(is_pending(&handle));
        resolvers.resolve(Value::from("late"));
        assert!(is_fulfilled(&handle));
        assert_eq!(value(&handle), Value::from("late"));
    }
}
