//! Thenable Contract
//!
//! Every promise flavor implements [`Thenable`]. Script code holds promises
//! as [`PromiseRef`], a shared handle that dispatches member lookups through
//! the promise's class.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

use crate::class::PromiseClass;
use crate::error::type_error;
use crate::function::Function;
use crate::slots::Slots;
use crate::value::{Completion, Value};

/// Unique promise identifier within an event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromiseId(pub u64);

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Promise state
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PromiseState {
    #[default]
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

impl PromiseState {
    pub fn is_pending(&self) -> bool {
        matches!(self, PromiseState::Pending)
    }

    pub fn outcome(&self) -> Option<Completion> {
        match self {
            PromiseState::Pending => None,
            PromiseState::Fulfilled(v) => Some(Ok(v.clone())),
            PromiseState::Rejected(r) => Some(Err(r.clone())),
        }
    }
}

impl From<Completion> for PromiseState {
    fn from(outcome: Completion) -> Self {
        match outcome {
            Ok(v) => PromiseState::Fulfilled(v),
            Err(r) => PromiseState::Rejected(r),
        }
    }
}

/// Observer notified once with the settled outcome
pub type Reaction = Box<dyn FnOnce(Completion)>;

/// Typed settlement handler used by Rust-level `then`
pub type Handler = Box<dyn FnOnce(Value) -> Completion>;

/// A promise implementation
pub trait Thenable {
    fn id(&self) -> PromiseId;

    /// The class whose prototype serves this promise's members
    fn constructor(&self) -> PromiseClass;

    /// Hidden per-promise storage
    fn slots(&self) -> &Slots;

    /// Observe settlement. Marks the promise as handled.
    fn react(&self, reaction: Reaction);

    /// Synchronous state, when the implementation exposes one.
    fn introspect(&self) -> Option<PromiseState> {
        None
    }

    /// Own (non-prototype) property.
    fn own_property(&self, _key: &str) -> Option<Value> {
        None
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

/// Shared handle to any promise
#[derive(Clone)]
pub struct PromiseRef(Rc<dyn Thenable>);

impl PromiseRef {
    pub fn new(promise: Rc<dyn Thenable>) -> Self {
        Self(promise)
    }

    pub fn id(&self) -> PromiseId {
        self.0.id()
    }

    pub fn constructor(&self) -> PromiseClass {
        self.0.constructor()
    }

    pub fn slots(&self) -> &Slots {
        self.0.slots()
    }

    pub fn react(&self, reaction: Reaction) {
        self.0.react(reaction)
    }

    pub fn introspect(&self) -> Option<PromiseState> {
        self.0.introspect()
    }

    pub fn downcast<T: Thenable + 'static>(&self) -> Option<Rc<T>> {
        self.0.clone().into_any().downcast::<T>().ok()
    }

    pub fn ptr_eq(&self, other: &PromiseRef) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }

    pub fn downgrade(&self) -> WeakPromiseRef {
        WeakPromiseRef(Rc::downgrade(&self.0))
    }

    /// Own property, then the class prototype.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0
            .own_property(key)
            .or_else(|| self.constructor().prototype().get(key))
    }

    pub fn method(&self, name: &str) -> Option<Function> {
        match self.get(name) {
            Some(Value::Function(f)) => Some(f),
            _ => None,
        }
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.method(name).is_some()
    }

    /// `promise[name](...args)`
    pub fn invoke(&self, name: &str, args: &[Value]) -> Completion {
        let method = self.method(name).ok_or_else(|| {
            type_error(format!(
                "{}.prototype.{name} is not a function",
                self.constructor().name()
            ))
        })?;
        method.call(&Value::Promise(self.clone()), args)
    }

    /// Dynamic `then` through the prototype.
    pub fn then(&self, on_fulfilled: Option<Function>, on_rejected: Option<Function>) -> Completion {
        let arg = |f: Option<Function>| f.map(Value::Function).unwrap_or_default();
        self.invoke("then", &[arg(on_fulfilled), arg(on_rejected)])
    }
}

/// Non-owning promise handle, for caches that must not keep a promise alive
#[derive(Clone)]
pub struct WeakPromiseRef(Weak<dyn Thenable>);

impl WeakPromiseRef {
    pub fn upgrade(&self) -> Option<PromiseRef> {
        self.0.upgrade().map(PromiseRef)
    }
}

impl fmt::Debug for PromiseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.introspect() {
            Some(PromiseState::Pending) => "pending".to_string(),
            Some(PromiseState::Fulfilled(v)) => format!("fulfilled {v:?}"),
            Some(PromiseState::Rejected(r)) => format!("rejected {r:?}"),
            None => "opaque".to_string(),
        };
        write!(f, "{} {} {{ <{state}> }}", self.constructor().name(), self.id())
    }
}

impl IntoFuture for PromiseRef {
    type Output = Completion;
    type IntoFuture = Settled;

    fn into_future(self) -> Settled {
        Settled::pending(Subscription::Promise(self))
    }
}

/// Wait for a value: thenables are followed, anything else is ready.
pub fn settle_value(value: Value) -> Settled {
    match value {
        Value::Promise(p) => p.into_future(),
        other => match other.thenable_then() {
            Some(then) => Settled::pending(Subscription::Object(other, then)),
            None => Settled::ready(Ok(other)),
        },
    }
}

enum Subscription {
    Promise(PromiseRef),
    Object(Value, Function),
}

impl Subscription {
    fn attach(self, outcome: &Rc<RefCell<Outcome>>) {
        match self {
            Subscription::Promise(p) => {
                let slot = outcome.clone();
                p.react(Box::new(move |o| Outcome::fill(&slot, o)));
            }
            Subscription::Object(target, then) => {
                let (ok, err) = (outcome.clone(), outcome.clone());
                let on_fulfilled = Function::once("", move |v| {
                    Outcome::fill(&ok, Ok(v));
                    Ok(Value::Undefined)
                });
                let on_rejected = Function::once("", move |r| {
                    Outcome::fill(&err, Err(r));
                    Ok(Value::Undefined)
                });
                if let Err(thrown) = then.call(&target, &[on_fulfilled.into(), on_rejected.into()]) {
                    Outcome::fill(outcome, Err(thrown));
                }
            }
        }
    }
}

#[derive(Default)]
struct Outcome {
    settled: bool,
    completion: Option<Completion>,
    waker: Option<Waker>,
}

impl Outcome {
    fn fill(slot: &Rc<RefCell<Outcome>>, completion: Completion) {
        let waker = {
            let mut outcome = slot.borrow_mut();
            if outcome.settled {
                return;
            }
            outcome.settled = true;
            outcome.completion = Some(completion);
            outcome.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// Future resolving with a promise's outcome
pub struct Settled {
    subscription: Option<Subscription>,
    outcome: Rc<RefCell<Outcome>>,
}

impl Settled {
    fn pending(subscription: Subscription) -> Self {
        Self {
            subscription: Some(subscription),
            outcome: Rc::default(),
        }
    }

    fn ready(completion: Completion) -> Self {
        let outcome = Outcome {
            settled: true,
            completion: Some(completion),
            waker: None,
        };
        Self {
            subscription: None,
            outcome: Rc::new(RefCell::new(outcome)),
        }
    }
}

impl Future for Settled {
    type Output = Completion;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Completion> {
        let this = self.get_mut();
        if let Some(subscription) = this.subscription.take() {
            subscription.attach(&this.outcome);
        }
        let mut outcome = this.outcome.borrow_mut();
        if let Some(completion) = outcome.completion.take() {
            return Poll::Ready(completion);
        }
        outcome.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}
