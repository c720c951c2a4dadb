//! Awaitable Adapter
//!
//! One typed surface over every promise flavor. Calls go through the
//! receiver's class, so an augmented native promise and a rich promise
//! answer the same methods. Script throws come back as
//! [`InteropError::Thrown`].
//!
//! `RichPromise` has inherent methods of the same names; call those through
//! the trait (`Awaitable::all(&rich)`) to get the dynamic dispatch.

use std::future::IntoFuture;

use thenable_rich::RichPromise;
use thenable_runtime::{Function, NativePromise, PromiseRef, Settled, Value};

use crate::capability::Capability;
use crate::error::{InteropError, Result};

pub trait Awaitable {
    fn as_promise(&self) -> PromiseRef;

    /// Future for the promise's outcome.
    fn settled(&self) -> Settled {
        self.as_promise().into_future()
    }

    fn invoke(&self, capability: Capability, args: &[Value]) -> Result<Value> {
        Ok(self.as_promise().invoke(capability.key(), args)?)
    }

    /// Invokes a member expected to return a promise.
    fn chain(&self, capability: Capability, args: &[Value]) -> Result<PromiseRef> {
        match self.invoke(capability, args)? {
            Value::Promise(promise) => Ok(promise),
            other => Err(unexpected(capability, "a promise", &other)),
        }
    }

    fn flag(&self, capability: Capability) -> Result<bool> {
        match self.invoke(capability, &[])? {
            Value::Bool(flag) => Ok(flag),
            other => Err(unexpected(capability, "a boolean", &other)),
        }
    }

    fn then(&self, on_fulfilled: Option<Function>, on_rejected: Option<Function>) -> Result<PromiseRef> {
        match self.as_promise().then(on_fulfilled, on_rejected)? {
            Value::Promise(promise) => Ok(promise),
            other => Err(InteropError::UnexpectedResult {
                member: "then".to_string(),
                expected: "a promise",
                actual: other.object_tag(),
            }),
        }
    }

    fn all(&self) -> Result<PromiseRef> {
        self.chain(Capability::All, &[])
    }

    fn any(&self) -> Result<PromiseRef> {
        self.chain(Capability::Any, &[])
    }

    fn race(&self) -> Result<PromiseRef> {
        self.chain(Capability::Race, &[])
    }

    fn props(&self) -> Result<PromiseRef> {
        self.chain(Capability::Props, &[])
    }

    fn settle(&self) -> Result<PromiseRef> {
        self.chain(Capability::Settle, &[])
    }

    fn some(&self, count: usize) -> Result<PromiseRef> {
        self.chain(Capability::Some, &[count.into()])
    }

    fn map(&self, mapper: Function, concurrency: Option<usize>) -> Result<PromiseRef> {
        self.chain(Capability::Map, &[mapper.into(), concurrency_options(concurrency)])
    }

    fn filter(&self, predicate: Function, concurrency: Option<usize>) -> Result<PromiseRef> {
        self.chain(Capability::Filter, &[predicate.into(), concurrency_options(concurrency)])
    }

    fn map_series(&self, iterator: Function) -> Result<PromiseRef> {
        self.chain(Capability::MapSeries, &[iterator.into()])
    }

    fn each(&self, iterator: Function) -> Result<PromiseRef> {
        self.chain(Capability::Each, &[iterator.into()])
    }

    fn reduce(&self, reducer: Function, initial: Option<Value>) -> Result<PromiseRef> {
        let mut args = vec![reducer.into()];
        args.extend(initial);
        self.chain(Capability::Reduce, &args)
    }

    fn catch(&self, handler: Function) -> Result<PromiseRef> {
        self.chain(Capability::Catch, &[handler.into()])
    }

    /// `caught(...filters, handler)`
    fn caught(&self, filters: Vec<Value>, handler: Function) -> Result<PromiseRef> {
        self.chain(Capability::Caught, &with_last(filters, handler.into()))
    }

    fn finally(&self, handler: Function) -> Result<PromiseRef> {
        self.chain(Capability::Finally, &[handler.into()])
    }

    fn tap(&self, handler: Function) -> Result<PromiseRef> {
        self.chain(Capability::Tap, &[handler.into()])
    }

    fn tap_catch(&self, filters: Vec<Value>, handler: Function) -> Result<PromiseRef> {
        self.chain(Capability::TapCatch, &with_last(filters, handler.into()))
    }

    fn spread(&self, handler: Function) -> Result<PromiseRef> {
        self.chain(Capability::Spread, &[handler.into()])
    }

    fn get(&self, key: Value) -> Result<PromiseRef> {
        self.chain(Capability::Get, &[key])
    }

    fn call(&self, method: &str, args: Vec<Value>) -> Result<PromiseRef> {
        self.chain(Capability::Call, &with_first(method.into(), args))
    }

    fn bind(&self, receiver: Value) -> Result<PromiseRef> {
        self.chain(Capability::Bind, &[receiver])
    }

    fn delay(&self, ms: u64) -> Result<PromiseRef> {
        self.chain(Capability::Delay, &[Value::Number(ms as f64)])
    }

    fn timeout(&self, ms: u64, message: Option<Value>) -> Result<PromiseRef> {
        let mut args = vec![Value::Number(ms as f64)];
        args.extend(message);
        self.chain(Capability::Timeout, &args)
    }

    fn nodeify(&self, callback: Function) -> Result<PromiseRef> {
        self.chain(Capability::Nodeify, &[callback.into()])
    }

    fn then_return(&self, value: Value) -> Result<PromiseRef> {
        self.chain(Capability::ThenReturn, &[value])
    }

    fn then_throw(&self, reason: Value) -> Result<PromiseRef> {
        self.chain(Capability::ThenThrow, &[reason])
    }

    fn catch_return(&self, filters: Vec<Value>, value: Value) -> Result<PromiseRef> {
        self.chain(Capability::CatchReturn, &with_last(filters, value))
    }

    fn catch_throw(&self, filters: Vec<Value>, reason: Value) -> Result<PromiseRef> {
        self.chain(Capability::CatchThrow, &with_last(filters, reason))
    }

    fn reflect(&self) -> Result<PromiseRef> {
        self.chain(Capability::Reflect, &[])
    }

    fn cancel(&self) -> Result<()> {
        self.invoke(Capability::Cancel, &[]).map(drop)
    }

    fn is_fulfilled(&self) -> Result<bool> {
        self.flag(Capability::IsFulfilled)
    }

    fn is_pending(&self) -> Result<bool> {
        self.flag(Capability::IsPending)
    }

    fn is_rejected(&self) -> Result<bool> {
        self.flag(Capability::IsRejected)
    }

    fn is_resolved(&self) -> Result<bool> {
        self.flag(Capability::IsResolved)
    }

    fn is_cancelled(&self) -> Result<bool> {
        self.flag(Capability::IsCancelled)
    }

    fn is_cancellable(&self) -> Result<bool> {
        self.flag(Capability::IsCancellable)
    }

    fn value(&self) -> Result<Value> {
        self.invoke(Capability::Value, &[])
    }

    fn reason(&self) -> Result<Value> {
        self.invoke(Capability::Reason, &[])
    }

    fn to_json(&self) -> Result<Value> {
        self.invoke(Capability::ToJson, &[])
    }

    fn suppress_unhandled_rejections(&self) -> Result<()> {
        self.invoke(Capability::SuppressUnhandledRejections, &[]).map(drop)
    }

    fn to_bluebird(&self) -> Result<PromiseRef> {
        self.chain(Capability::ToBluebird, &[])
    }

    fn to_native(&self) -> Result<PromiseRef> {
        self.chain(Capability::ToNative, &[])
    }
}

impl Awaitable for PromiseRef {
    fn as_promise(&self) -> PromiseRef {
        self.clone()
    }
}

impl Awaitable for NativePromise {
    fn as_promise(&self) -> PromiseRef {
        self.to_ref()
    }
}

impl Awaitable for RichPromise {
    fn as_promise(&self) -> PromiseRef {
        self.to_ref()
    }
}

fn unexpected(capability: Capability, expected: &'static str, actual: &Value) -> InteropError {
    InteropError::UnexpectedResult {
        member: capability.key().to_string(),
        expected,
        actual: actual.object_tag(),
    }
}

fn concurrency_options(concurrency: Option<usize>) -> Value {
    match concurrency {
        Some(limit) => Value::object([("concurrency", Value::from(limit))]),
        None => Value::Undefined,
    }
}

fn with_last(mut items: Vec<Value>, last: Value) -> Vec<Value> {
    items.push(last);
    items
}

fn with_first(first: Value, rest: Vec<Value>) -> Vec<Value> {
    let mut items = Vec::with_capacity(rest.len() + 1);
    items.push(first);
    items.extend(rest);
    items
}
