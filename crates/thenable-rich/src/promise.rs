//! Rich Promise Core
//!
//! Settlement, adoption, bound receivers, cancellation and the chaining
//! helpers built on `then`.
//!
//! Unlike native promises, a rich promise adopts foreign thenables
//! synchronously: the observer is attached the moment the promise is
//! resolved with them. A promise marked async-guaranteed runs the reactions
//! already waiting at settlement inline when it settles inside a job.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use thenable_runtime::{
    Completion, ErrorKind, EventLoop, Function, Handler, PromiseClass, PromiseId, PromiseRef,
    PromiseState, Reaction, Slots, Thenable, Value, WeakPromiseRef, arg, error, type_error,
};

use crate::filter;
use crate::{CLASS_NAME, RichLibrary};

const IS_FULFILLED: u32 = 0x0200_0000;
const IS_REJECTED: u32 = 0x0100_0000;
const IS_CANCELLED: u32 = 0x0001_0000;
const IS_FOLLOWING: u32 = 0x0080_0000;

type CancelCallback = Box<dyn FnOnce()>;

/// Handle to a rich promise
#[derive(Clone)]
pub struct RichPromise(Rc<RichInner>);

pub(crate) struct RichInner {
    id: PromiseId,
    library: RichLibrary,
    state: RefCell<PromiseState>,
    reactions: RefCell<Vec<Reaction>>,
    /// Receiver for handlers, inherited by derived promises
    bound: Rc<RefCell<Value>>,
    /// Promise this one adopted or was derived from. Weak: the followed
    /// promise already holds this one through its reactions.
    following: RefCell<Option<WeakPromiseRef>>,
    on_cancel: RefCell<Vec<CancelCallback>>,
    handled: Cell<bool>,
    suppressed: Cell<bool>,
    async_guaranteed: Cell<bool>,
    slots: Slots,
}

impl Thenable for RichInner {
    fn id(&self) -> PromiseId {
        self.id
    }

    fn constructor(&self) -> PromiseClass {
        self.library.class().clone()
    }

    fn slots(&self) -> &Slots {
        &self.slots
    }

    fn react(&self, reaction: Reaction) {
        self.mark_handled();
        let outcome = self.state.borrow().outcome();
        match outcome {
            None => self.reactions.borrow_mut().push(reaction),
            Some(outcome) => self
                .library
                .event_loop()
                .queue_microtask("bluebird reaction", move || reaction(outcome)),
        }
    }

    fn introspect(&self) -> Option<PromiseState> {
        Some(self.state.borrow().clone())
    }

    fn own_property(&self, key: &str) -> Option<Value> {
        match key {
            "_bitField" => Some(Value::Number(self.bit_field().into())),
            _ => None,
        }
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl RichInner {
    fn mark_handled(&self) {
        if !self.handled.replace(true) {
            self.library.event_loop().rejections().handled(self.id);
        }
    }

    fn bit_field(&self) -> u32 {
        let mut bits = match &*self.state.borrow() {
            PromiseState::Pending => 0,
            PromiseState::Fulfilled(_) => IS_FULFILLED,
            PromiseState::Rejected(reason) if reason.is_instance_of(ErrorKind::CancellationError) => {
                IS_REJECTED | IS_CANCELLED
            }
            PromiseState::Rejected(_) => IS_REJECTED,
        };
        if self.following.borrow().is_some() {
            bits |= IS_FOLLOWING;
        }
        bits
    }
}

impl RichPromise {
    pub fn pending(library: &RichLibrary) -> (RichPromise, RichResolver) {
        let promise = RichPromise(Rc::new(RichInner {
            id: library.event_loop().next_promise_id(),
            library: library.clone(),
            state: RefCell::new(PromiseState::Pending),
            reactions: RefCell::new(Vec::new()),
            bound: Rc::new(RefCell::new(Value::Undefined)),
            following: RefCell::new(None),
            on_cancel: RefCell::new(Vec::new()),
            handled: Cell::new(false),
            suppressed: Cell::new(false),
            async_guaranteed: Cell::new(false),
            slots: Slots::new(),
        }));
        let resolver = RichResolver::new(promise.clone());
        (promise, resolver)
    }

    /// `Bluebird.resolve(value)`: promises of the same library pass through.
    pub fn resolved(library: &RichLibrary, value: Value) -> RichPromise {
        if let Some(existing) = RichPromise::from_value(&value)
            && existing.library().ptr_eq(library)
        {
            return existing;
        }
        let (promise, resolver) = RichPromise::pending(library);
        resolver.resolve(value);
        promise
    }

    pub fn rejected(library: &RichLibrary, reason: Value) -> RichPromise {
        let (promise, resolver) = RichPromise::pending(library);
        resolver.reject(reason);
        promise
    }

    pub fn from_ref(promise: &PromiseRef) -> Option<RichPromise> {
        promise.downcast::<RichInner>().map(RichPromise)
    }

    pub fn from_value(value: &Value) -> Option<RichPromise> {
        value.as_promise().and_then(RichPromise::from_ref)
    }

    pub fn to_ref(&self) -> PromiseRef {
        PromiseRef::new(self.0.clone())
    }

    pub fn id(&self) -> PromiseId {
        self.0.id
    }

    pub fn library(&self) -> &RichLibrary {
        &self.0.library
    }

    pub(crate) fn event_loop(&self) -> &EventLoop {
        self.0.library.event_loop()
    }

    pub fn state(&self) -> PromiseState {
        self.0.state.borrow().clone()
    }

    /// Receiver passed to handlers
    pub fn bound(&self) -> Value {
        self.0.bound.borrow().clone()
    }

    pub(crate) fn set_bound(&self, receiver: Value) {
        *self.0.bound.borrow_mut() = receiver;
    }

    /// Observe settlement without creating a derived promise.
    pub fn observe(&self, reaction: impl FnOnce(Completion) + 'static) {
        self.0.react(Box::new(reaction));
    }

    pub(crate) fn settle(&self, outcome: Completion) {
        let reactions = {
            let mut state = self.0.state.borrow_mut();
            if !state.is_pending() {
                return;
            }
            *state = PromiseState::from(outcome.clone());
            std::mem::take(&mut *self.0.reactions.borrow_mut())
        };
        self.0.on_cancel.borrow_mut().clear();
        let event_loop = self.event_loop().clone();
        if let Err(reason) = &outcome
            && !self.0.handled.get()
            && !self.0.suppressed.get()
        {
            event_loop.rejections().rejected(self.0.id, CLASS_NAME, reason.clone());
        }
        if self.0.async_guaranteed.get() && event_loop.is_running_job() {
            for reaction in reactions {
                reaction(outcome.clone());
            }
        } else {
            for reaction in reactions {
                let outcome = outcome.clone();
                event_loop.queue_microtask("bluebird reaction", move || reaction(outcome));
            }
        }
    }

    /// Resolution procedure: adopt promises and thenables, fulfill otherwise.
    pub(crate) fn resolve_with(&self, value: Value) {
        match &value {
            Value::Promise(p) if p.ptr_eq(&self.to_ref()) => {
                self.settle(Err(type_error("circular promise resolution chain")));
            }
            Value::Promise(p) => {
                *self.0.following.borrow_mut() = Some(p.downgrade());
                if let Some(rich) = RichPromise::from_ref(p)
                    && let Some(outcome) = rich.state().outcome()
                {
                    rich.0.mark_handled();
                    self.settle(outcome);
                    return;
                }
                let target = self.clone();
                p.react(Box::new(move |outcome| target.settle(outcome)));
            }
            _ => match value.thenable_then() {
                Some(then) => {
                    let resolver = RichResolver::new(self.clone());
                    let (resolve, reject) = resolver.to_functions();
                    if let Err(thrown) = then.call(&value, &[resolve.into(), reject.into()]) {
                        resolver.reject(thrown);
                    }
                }
                None => self.settle(Ok(value)),
            },
        }
    }

    /// Pending promise inheriting the receiver, following `self`.
    pub(crate) fn derive(&self) -> (RichPromise, RichResolver) {
        let (derived, resolver) = RichPromise::pending(self.library());
        derived.set_bound(self.bound());
        *derived.0.following.borrow_mut() = Some(self.to_ref().downgrade());
        (derived, resolver)
    }

    /// Core chaining primitive: maps the outcome into the derived promise.
    pub fn then_with(&self, map: impl FnOnce(Completion) -> Completion + 'static) -> RichPromise {
        let (derived, resolver) = self.derive();
        self.observe(move |outcome| resolver.settle(map(outcome)));
        derived
    }

    pub fn then(&self, on_fulfilled: Option<Handler>, on_rejected: Option<Handler>) -> RichPromise {
        self.then_with(move |outcome| match outcome {
            Ok(value) => match on_fulfilled {
                Some(handler) => handler(value),
                None => Ok(value),
            },
            Err(reason) => match on_rejected {
                Some(handler) => handler(reason),
                None => Err(reason),
            },
        })
    }

    /// `then` with script handlers called on the bound receiver.
    pub fn then_fn(&self, on_fulfilled: Option<Function>, on_rejected: Option<Function>) -> RichPromise {
        let bound = self.0.bound.clone();
        self.then_with(move |outcome| match outcome {
            Ok(value) => match on_fulfilled {
                Some(f) => call_bound(&f, &bound, &[value]),
                None => Ok(value),
            },
            Err(reason) => match on_rejected {
                Some(f) => call_bound(&f, &bound, &[reason]),
                None => Err(reason),
            },
        })
    }

    /// Like `then`, but a final rejection is reported as uncaught.
    pub fn done(&self, on_fulfilled: Option<Function>, on_rejected: Option<Function>) {
        let event_loop = self.event_loop().clone();
        self.then_fn(on_fulfilled, on_rejected).observe(move |outcome| {
            if let Err(reason) = outcome {
                event_loop.report_uncaught(reason);
            }
        });
    }

    /// `catch(filter..., handler)`. No filters catches everything.
    pub fn caught(&self, filters: Vec<Value>, handler: Function) -> RichPromise {
        let bound = self.0.bound.clone();
        self.then_with(move |outcome| {
            let reason = match outcome {
                Ok(value) => return Ok(value),
                Err(reason) => reason,
            };
            if filters.is_empty() || filter::any_match(&filters, &reason)? {
                call_bound(&handler, &bound, &[reason])
            } else {
                Err(reason)
            }
        })
    }

    /// Catches operational errors only.
    pub fn error(&self, handler: Function) -> RichPromise {
        self.caught(vec![Value::ErrorClass(ErrorKind::OperationalError)], handler)
    }

    /// Runs `handler` on either outcome and waits for what it returns.
    pub fn finally(&self, handler: Function) -> RichPromise {
        let bound = self.0.bound.clone();
        let library = self.library().clone();
        self.then_with(move |outcome| {
            let result = call_bound(&handler, &bound, &[])?;
            if result.is_thenable() {
                let after = RichPromise::resolved(&library, result);
                return Ok(after.then_with(move |done| done.and(outcome)).into());
            }
            outcome
        })
    }

    /// Side effect on fulfillment; the value passes through.
    pub fn tap(&self, handler: Function) -> RichPromise {
        let bound = self.0.bound.clone();
        let library = self.library().clone();
        self.then_with(move |outcome| {
            let value = outcome?;
            let result = call_bound(&handler, &bound, &[value.clone()])?;
            if result.is_thenable() {
                let after = RichPromise::resolved(&library, result);
                return Ok(after.then_with(move |done| done.map(|_| value)).into());
            }
            Ok(value)
        })
    }

    /// Side effect on matching rejections; the reason passes through.
    pub fn tap_catch(&self, filters: Vec<Value>, handler: Function) -> RichPromise {
        let bound = self.0.bound.clone();
        let library = self.library().clone();
        self.then_with(move |outcome| {
            let reason = match outcome {
                Ok(value) => return Ok(value),
                Err(reason) => reason,
            };
            if !filters.is_empty() && !filter::any_match(&filters, &reason)? {
                return Err(reason);
            }
            let result = call_bound(&handler, &bound, &[reason.clone()])?;
            if result.is_thenable() {
                let after = RichPromise::resolved(&library, result);
                return Ok(after.then_with(move |done| done.and(Err(reason))).into());
            }
            Err(reason)
        })
    }

    /// Awaits the array members, then calls `handler` with them as arguments.
    pub fn spread(&self, handler: Function) -> RichPromise {
        let bound = self.0.bound.clone();
        let library = self.library().clone();
        self.then_with(move |outcome| {
            let values = outcome?;
            let all = crate::collection::all(&library, values);
            Ok(all
                .then_with(move |settled| {
                    let items = settled?.as_array().map(|a| a.to_vec()).unwrap_or_default();
                    call_bound(&handler, &bound, &items)
                })
                .into())
        })
    }

    /// Property read on the fulfillment value. Numeric keys index from the
    /// end when negative.
    pub fn get(&self, key: Value) -> RichPromise {
        self.then_with(move |outcome| Ok(read_key(&outcome?, &key)))
    }

    /// Calls a method on the fulfillment value.
    pub fn call(&self, name: Value, args: Vec<Value>) -> RichPromise {
        self.then_with(move |outcome| call_method(&outcome?, &name, &args))
    }

    /// Derived promise whose handlers receive `receiver` as `this`.
    /// A thenable receiver is awaited first.
    pub fn bind(&self, receiver: Value) -> RichPromise {
        let (derived, resolver) = self.derive();
        if !receiver.is_thenable() {
            derived.set_bound(receiver);
            self.observe(move |outcome| resolver.settle(outcome));
            return derived;
        }
        let (source, target) = (self.clone(), derived.clone());
        RichPromise::resolved(self.library(), receiver).observe(move |ready| match ready {
            Err(reason) => resolver.reject(reason),
            Ok(receiver) => {
                target.set_bound(receiver);
                source.observe(move |outcome| resolver.settle(outcome));
            }
        });
        derived
    }

    pub fn then_return(&self, value: Value) -> RichPromise {
        self.then_with(move |outcome| outcome.map(|_| value))
    }

    pub fn then_throw(&self, reason: Value) -> RichPromise {
        self.then_with(move |outcome| outcome.and(Err(reason)))
    }

    pub fn catch_return(&self, filters: Vec<Value>, value: Value) -> RichPromise {
        self.then_with(move |outcome| match outcome {
            Ok(v) => Ok(v),
            Err(reason) if filters.is_empty() || filter::any_match(&filters, &reason)? => Ok(value),
            Err(reason) => Err(reason),
        })
    }

    pub fn catch_throw(&self, filters: Vec<Value>, thrown: Value) -> RichPromise {
        self.then_with(move |outcome| match outcome {
            Ok(v) => Ok(v),
            Err(reason) if filters.is_empty() || filter::any_match(&filters, &reason)? => Err(thrown),
            Err(reason) => Err(reason),
        })
    }

    /// Always fulfills with an inspection of this promise's outcome.
    pub fn reflect(&self) -> RichPromise {
        self.then_with(|outcome| Ok(crate::inspection::inspection(&PromiseState::from(outcome))))
    }

    /// Registers a callback run when the promise is cancelled.
    pub fn on_cancel(&self, callback: impl FnOnce() + 'static) {
        if self.is_pending() {
            self.0.on_cancel.borrow_mut().push(Box::new(callback));
        }
    }

    /// Rejects a pending promise with a `CancellationError` and cancels the
    /// promise it follows.
    pub fn cancel(&self) {
        if !self.library().config().cancellation || !self.is_pending() {
            return;
        }
        tracing::trace!(promise = %self.id(), "cancelling");
        self.suppress_unhandled_rejections();
        let callbacks = std::mem::take(&mut *self.0.on_cancel.borrow_mut());
        for callback in callbacks {
            callback();
        }
        self.settle(Err(error(ErrorKind::CancellationError, "cancellation error")));
        let following = self.0.following.borrow().as_ref().and_then(WeakPromiseRef::upgrade);
        if let Some(parent) = following.as_ref().and_then(RichPromise::from_ref) {
            parent.cancel();
        }
    }

    pub fn suppress_unhandled_rejections(&self) {
        self.0.suppressed.set(true);
        self.event_loop().rejections().handled(self.0.id);
    }

    pub fn is_suppressed(&self) -> bool {
        self.0.suppressed.get()
    }

    pub fn set_async_guaranteed(&self) {
        self.0.async_guaranteed.set(true);
    }

    pub fn is_async_guaranteed(&self) -> bool {
        self.0.async_guaranteed.get()
    }

    pub fn is_pending(&self) -> bool {
        self.0.state.borrow().is_pending()
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(&*self.0.state.borrow(), PromiseState::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(&*self.0.state.borrow(), PromiseState::Rejected(_))
    }

    pub fn is_resolved(&self) -> bool {
        !self.is_pending()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(&*self.0.state.borrow(),
            PromiseState::Rejected(reason) if reason.is_instance_of(ErrorKind::CancellationError))
    }

    pub fn is_cancellable(&self) -> bool {
        self.library().config().cancellation && self.is_pending()
    }

    /// Fulfillment value; throws when the promise is not fulfilled.
    pub fn value(&self) -> Completion {
        match &*self.0.state.borrow() {
            PromiseState::Fulfilled(value) => Ok(value.clone()),
            _ => Err(type_error("cannot get fulfillment value of a non-fulfilled promise")),
        }
    }

    /// Rejection reason; throws when the promise is not rejected.
    pub fn reason(&self) -> Completion {
        match &*self.0.state.borrow() {
            PromiseState::Rejected(reason) => Ok(reason.clone()),
            _ => Err(type_error("cannot get rejection reason of a non-rejected promise")),
        }
    }

    pub fn bit_field(&self) -> u32 {
        self.0.bit_field()
    }

    pub fn to_json(&self) -> Value {
        crate::inspection::to_json(&self.state())
    }
}

impl From<RichPromise> for Value {
    fn from(p: RichPromise) -> Self {
        Value::Promise(p.to_ref())
    }
}

impl std::fmt::Debug for RichPromise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{CLASS_NAME} {} {:?}", self.0.id, self.0.state.borrow())
    }
}

/// Once-only resolving functions of a pending rich promise
#[derive(Clone)]
pub struct RichResolver {
    promise: RichPromise,
    done: Rc<Cell<bool>>,
}

impl RichResolver {
    fn new(promise: RichPromise) -> Self {
        Self { promise, done: Rc::new(Cell::new(false)) }
    }

    pub fn promise(&self) -> &RichPromise {
        &self.promise
    }

    pub fn resolve(&self, value: Value) {
        if !self.done.replace(true) {
            self.promise.resolve_with(value);
        }
    }

    pub fn reject(&self, reason: Value) {
        if !self.done.replace(true) {
            self.promise.settle(Err(reason));
        }
    }

    pub fn settle(&self, outcome: Completion) {
        match outcome {
            Ok(value) => self.resolve(value),
            Err(reason) => self.reject(reason),
        }
    }

    pub fn to_functions(&self) -> (Function, Function) {
        let (ok, err) = (self.clone(), self.clone());
        (
            Function::new("resolve", move |_, args| {
                ok.resolve(arg(args, 0));
                Ok(Value::Undefined)
            }),
            Function::new("reject", move |_, args| {
                err.reject(arg(args, 0));
                Ok(Value::Undefined)
            }),
        )
    }
}

pub(crate) fn call_bound(f: &Function, bound: &RefCell<Value>, args: &[Value]) -> Completion {
    let receiver = bound.borrow().clone();
    f.call(&receiver, args)
}

/// `obj[key]` with negative numeric keys counting from the end.
pub fn read_key(target: &Value, key: &Value) -> Value {
    if target.is_nullish() {
        return Value::Undefined;
    }
    match key {
        Value::Number(n) => match target.length() {
            Some(len) => {
                let index = if *n < 0.0 { (*n + len as f64).max(0.0) } else { *n };
                target.get(&Value::Number(index).to_string())
            }
            None => target.get(&key.to_string()),
        },
        other => target.get(&other.to_string()),
    }
}

/// `obj[name](...args)`, rejecting when the method is missing.
pub fn call_method(target: &Value, name: &Value, args: &[Value]) -> Completion {
    let method = if target.is_nullish() {
        Value::Undefined
    } else {
        target.get(&name.to_string())
    };
    match method {
        Value::Function(f) => f.call(target, args),
        _ => Err(type_error(format!(
            "Object {} has no method '{name}'",
            target.object_tag()
        ))),
    }
}
