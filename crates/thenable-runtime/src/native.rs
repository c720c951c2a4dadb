//! Native Promise
//!
//! The host's intrinsic promise with ECMAScript resolution semantics:
//! reactions always run as microtasks, thenables are adopted one job later,
//! and resolving a promise with itself rejects with a `TypeError`.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::class::PromiseClass;
use crate::error::type_error;
use crate::function::{Function, arg};
use crate::realm::{Realm, RealmInner};
use crate::slots::Slots;
use crate::thenable::{Handler, PromiseId, PromiseRef, PromiseState, Reaction, Thenable};
use crate::value::{Array, Completion, Value};

/// Handle to a native promise
#[derive(Clone)]
pub struct NativePromise(Rc<NativeInner>);

pub(crate) struct NativeInner {
    id: PromiseId,
    realm: Realm,
    state: RefCell<PromiseState>,
    reactions: RefCell<Vec<Reaction>>,
    handled: Cell<bool>,
    slots: Slots,
}

impl Thenable for NativeInner {
    fn id(&self) -> PromiseId {
        self.id
    }

    fn constructor(&self) -> PromiseClass {
        self.realm.promise_class().clone()
    }

    fn slots(&self) -> &Slots {
        &self.slots
    }

    fn react(&self, reaction: Reaction) {
        if !self.handled.replace(true) {
            self.realm.event_loop().rejections().handled(self.id);
        }
        let outcome = self.state.borrow().outcome();
        match outcome {
            None => self.reactions.borrow_mut().push(reaction),
            Some(outcome) => self
                .realm
                .event_loop()
                .queue_microtask("promise reaction", move || reaction(outcome)),
        }
    }

    fn introspect(&self) -> Option<PromiseState> {
        self.realm
            .event_loop()
            .capabilities()
            .sync_introspection
            .then(|| self.state.borrow().clone())
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl NativePromise {
    /// A pending promise and its resolving functions.
    pub fn pending(realm: &Realm) -> (NativePromise, Resolvers) {
        let promise = NativePromise(Rc::new(NativeInner {
            id: realm.event_loop().next_promise_id(),
            realm: realm.clone(),
            state: RefCell::new(PromiseState::Pending),
            reactions: RefCell::new(Vec::new()),
            handled: Cell::new(false),
            slots: Slots::new(),
        }));
        let resolvers = Resolvers {
            promise: promise.clone(),
            already_resolved: Rc::new(Cell::new(false)),
        };
        (promise, resolvers)
    }

    /// `Promise.resolve(value)`: native promises pass through unchanged.
    pub fn resolve(realm: &Realm, value: Value) -> NativePromise {
        if let Some(native) = NativePromise::from_value(&value) {
            return native;
        }
        let (promise, resolvers) = NativePromise::pending(realm);
        resolvers.resolve(value);
        promise
    }

    pub fn reject(realm: &Realm, reason: Value) -> NativePromise {
        let (promise, resolvers) = NativePromise::pending(realm);
        resolvers.reject(reason);
        promise
    }

    pub fn from_ref(promise: &PromiseRef) -> Option<NativePromise> {
        promise.downcast::<NativeInner>().map(NativePromise)
    }

    pub fn from_value(value: &Value) -> Option<NativePromise> {
        value.as_promise().and_then(NativePromise::from_ref)
    }

    pub fn to_ref(&self) -> PromiseRef {
        PromiseRef::new(self.0.clone())
    }

    pub fn id(&self) -> PromiseId {
        self.0.id
    }

    pub fn realm(&self) -> &Realm {
        &self.0.realm
    }

    /// Internal state, regardless of host introspection support.
    pub fn state(&self) -> PromiseState {
        self.0.state.borrow().clone()
    }

    pub fn then(&self, on_fulfilled: Option<Handler>, on_rejected: Option<Handler>) -> NativePromise {
        let (derived, resolvers) = NativePromise::pending(&self.0.realm);
        self.0.react(Box::new(move |outcome| {
            let next = match outcome {
                Ok(value) => match on_fulfilled {
                    Some(handler) => handler(value),
                    None => Ok(value),
                },
                Err(reason) => match on_rejected {
                    Some(handler) => handler(reason),
                    None => Err(reason),
                },
            };
            resolvers.settle(next);
        }));
        derived
    }

    pub fn catch(&self, on_rejected: Handler) -> NativePromise {
        self.then(None, Some(on_rejected))
    }

    /// Runs `on_finally` on either outcome, waits for what it returns,
    /// then passes the original outcome through.
    pub fn finally(&self, on_finally: impl FnOnce() -> Completion + 'static) -> NativePromise {
        let callback = Rc::new(RefCell::new(Some(on_finally)));
        let (on_ok, on_err) = (callback.clone(), callback);
        let (realm_ok, realm_err) = (self.0.realm.clone(), self.0.realm.clone());
        self.then(
            Some(Box::new(move |value| {
                let result = run_once(&*on_ok)?;
                let after = NativePromise::resolve(&realm_ok, result);
                Ok(after.then(Some(Box::new(move |_| Ok(value))), None).into())
            })),
            Some(Box::new(move |reason| {
                let result = run_once(&*on_err)?;
                let after = NativePromise::resolve(&realm_err, result);
                Ok(after.then(Some(Box::new(move |_| Err(reason))), None).into())
            })),
        )
    }

    /// `Promise.all(values)`
    pub fn all(realm: &Realm, values: &Value) -> NativePromise {
        let Some(items) = values.as_array().map(Array::to_vec) else {
            return NativePromise::reject(realm, not_iterable(values));
        };
        let (promise, resolvers) = NativePromise::pending(realm);
        if items.is_empty() {
            resolvers.resolve(Value::array([]));
            return promise;
        }
        let results = Array::from_vec(vec![Value::Undefined; items.len()]);
        let remaining = Rc::new(Cell::new(items.len()));
        for (index, item) in items.into_iter().enumerate() {
            let (results, remaining, ok, err) =
                (results.clone(), remaining.clone(), resolvers.clone(), resolvers.clone());
            NativePromise::resolve(realm, item).then(
                Some(Box::new(move |value| {
                    results.set(index, value);
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        ok.resolve(results.into());
                    }
                    Ok(Value::Undefined)
                })),
                Some(Box::new(move |reason| {
                    err.reject(reason);
                    Ok(Value::Undefined)
                })),
            );
        }
        promise
    }

    /// `Promise.allSettled(values)`
    pub fn all_settled(realm: &Realm, values: &Value) -> NativePromise {
        let Some(items) = values.as_array().map(Array::to_vec) else {
            return NativePromise::reject(realm, not_iterable(values));
        };
        let (promise, resolvers) = NativePromise::pending(realm);
        if items.is_empty() {
            resolvers.resolve(Value::array([]));
            return promise;
        }
        let results = Array::from_vec(vec![Value::Undefined; items.len()]);
        let remaining = Rc::new(Cell::new(items.len()));
        for (index, item) in items.into_iter().enumerate() {
            let (results, remaining, resolvers) = (results.clone(), remaining.clone(), resolvers.clone());
            NativePromise::resolve(realm, item).0.react(Box::new(move |outcome| {
                let entry = match outcome {
                    Ok(value) => Value::object([("status", Value::from("fulfilled")), ("value", value)]),
                    Err(reason) => Value::object([("status", Value::from("rejected")), ("reason", reason)]),
                };
                results.set(index, entry);
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    resolvers.resolve(results.into());
                }
            }));
        }
        promise
    }

    /// `Promise.race(values)`
    pub fn race(realm: &Realm, values: &Value) -> NativePromise {
        let Some(items) = values.as_array().map(Array::to_vec) else {
            return NativePromise::reject(realm, not_iterable(values));
        };
        let (promise, resolvers) = NativePromise::pending(realm);
        for item in items {
            let resolvers = resolvers.clone();
            NativePromise::resolve(realm, item).0.react(Box::new(move |o| resolvers.settle(o)));
        }
        promise
    }

    fn settle(&self, outcome: Completion) {
        let reactions = {
            let mut state = self.0.state.borrow_mut();
            if !state.is_pending() {
                return;
            }
            *state = PromiseState::from(outcome.clone());
            std::mem::take(&mut *self.0.reactions.borrow_mut())
        };
        let event_loop = self.0.realm.event_loop();
        if let Err(reason) = &outcome
            && !self.0.handled.get()
        {
            event_loop.rejections().rejected(self.0.id, "Promise", reason.clone());
        }
        for reaction in reactions {
            let outcome = outcome.clone();
            event_loop.queue_microtask("promise reaction", move || reaction(outcome));
        }
    }

    /// Body of the resolve function, after the already-resolved check.
    fn resolve_in_place(&self, value: Value) {
        let event_loop = self.0.realm.event_loop();
        match &value {
            Value::Promise(p) if p.ptr_eq(&self.to_ref()) => {
                self.settle(Err(type_error("Chaining cycle detected for promise #<Promise>")));
            }
            Value::Promise(p) => {
                let (source, target) = (p.clone(), self.clone());
                event_loop.queue_microtask("resolve thenable", move || {
                    source.react(Box::new(move |outcome| target.settle(outcome)));
                });
            }
            _ => match value.thenable_then() {
                Some(then) => {
                    let target = self.clone();
                    event_loop.queue_microtask("resolve thenable", move || {
                        let resolvers = Resolvers {
                            promise: target,
                            already_resolved: Rc::new(Cell::new(false)),
                        };
                        let (resolve, reject) = resolvers.to_functions();
                        if let Err(thrown) = then.call(&value, &[resolve.into(), reject.into()]) {
                            resolvers.reject(thrown);
                        }
                    });
                }
                None => self.settle(Ok(value)),
            },
        }
    }
}

impl From<NativePromise> for Value {
    fn from(p: NativePromise) -> Self {
        Value::Promise(p.to_ref())
    }
}

impl std::fmt::Debug for NativePromise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Promise {} {:?}", self.0.id, self.0.state.borrow())
    }
}

fn run_once(callback: &RefCell<Option<impl FnOnce() -> Completion>>) -> Completion {
    let callback = callback.borrow_mut().take();
    callback.map_or(Ok(Value::Undefined), |f| f())
}

fn not_iterable(value: &Value) -> Value {
    type_error(format!("{} is not iterable", value.type_of()))
}

/// Resolving functions of a pending native promise
#[derive(Clone)]
pub struct Resolvers {
    promise: NativePromise,
    already_resolved: Rc<Cell<bool>>,
}

impl Resolvers {
    pub fn promise(&self) -> &NativePromise {
        &self.promise
    }

    pub fn resolve(&self, value: Value) {
        if self.already_resolved.replace(true) {
            return;
        }
        self.promise.resolve_in_place(value);
    }

    pub fn reject(&self, reason: Value) {
        if self.already_resolved.replace(true) {
            return;
        }
        self.promise.settle(Err(reason));
    }

    pub fn settle(&self, outcome: Completion) {
        match outcome {
            Ok(value) => self.resolve(value),
            Err(reason) => self.reject(reason),
        }
    }

    /// Script-callable `(resolve, reject)` pair.
    pub fn to_functions(&self) -> (Function, Function) {
        let (ok, err) = (self.clone(), self.clone());
        (
            Function::new("", move |_, args| {
                ok.resolve(arg(args, 0));
                Ok(Value::Undefined)
            }),
            Function::new("", move |_, args| {
                err.reject(arg(args, 0));
                Ok(Value::Undefined)
            }),
        )
    }
}

/// Builds the intrinsic `Promise` class of a realm.
pub(crate) fn intrinsic_class(realm: Weak<RealmInner>) -> PromiseClass {
    let class = PromiseClass::new("Promise", {
        let realm = realm.clone();
        move |_, executor| {
            let realm = Realm::upgrade(&realm)?;
            let (promise, resolvers) = NativePromise::pending(&realm);
            let (resolve, reject) = resolvers.to_functions();
            if let Err(thrown) = executor.call(&Value::Undefined, &[resolve.into(), reject.into()]) {
                resolvers.reject(thrown);
            }
            Ok(promise.into())
        }
    });

    let statics: [(&str, fn(&Realm, &[Value]) -> NativePromise); 5] = [
        ("resolve", |realm, args| NativePromise::resolve(realm, arg(args, 0))),
        ("reject", |realm, args| NativePromise::reject(realm, arg(args, 0))),
        ("all", |realm, args| NativePromise::all(realm, &arg(args, 0))),
        ("allSettled", |realm, args| NativePromise::all_settled(realm, &arg(args, 0))),
        ("race", |realm, args| NativePromise::race(realm, &arg(args, 0))),
    ];
    for (name, body) in statics {
        let realm = realm.clone();
        class.define_static(
            name,
            Function::new(name, move |_, args| {
                let realm = Realm::upgrade(&realm)?;
                Ok(body(&realm, args).into())
            }),
        );
    }

    let prototype = class.prototype().members();
    prototype.define(
        "then",
        Function::new("then", |this, args| {
            let promise = receiver(this, "then")?;
            Ok(promise.then(handler(args, 0), handler(args, 1)).into())
        }),
    );
    prototype.define(
        "catch",
        Function::new("catch", |this, args| {
            let promise = receiver(this, "catch")?;
            Ok(promise.then(None, handler(args, 0)).into())
        }),
    );
    prototype.define(
        "finally",
        Function::new("finally", |this, args| {
            let promise = receiver(this, "finally")?;
            match arg(args, 0) {
                Value::Function(f) => Ok(promise.finally(move || f.call(&Value::Undefined, &[])).into()),
                _ => Ok(promise.then(None, None).into()),
            }
        }),
    );
    class
}

fn receiver(this: &Value, method: &str) -> Result<NativePromise, Value> {
    NativePromise::from_value(this).ok_or_else(|| {
        type_error(format!(
            "Method Promise.prototype.{method} called on incompatible receiver {this}"
        ))
    })
}

/// Script function argument as a typed handler; non-functions are ignored.
fn handler(args: &[Value], index: usize) -> Option<Handler> {
    match arg(args, index) {
        Value::Function(f) => Some(Box::new(move |v| f.call(&Value::Undefined, &[v]))),
        _ => None,
    }
}
