//! Default Members
//!
//! Script-callable implementations installed on augmented classes. Two
//! strategies build the self-sufficient members: continuation chains on
//! `then`, or suspended tasks awaiting the receiver. The strategy is fixed
//! when the bridge is built.

use std::cell::RefCell;
use std::rc::Rc;

use thenable_runtime::{
    Completion, EventLoop, Function, HostCapabilities, PromiseClass, PromiseRef, Value,
    WeakPromiseClass, arg, type_error,
};

use crate::convert;
use crate::error::InteropError;

pub(crate) mod continuation;
pub mod statics;
pub(crate) mod suspend;

/// How self-sufficient members are expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// `then` chains
    Continuation,
    /// Cooperative tasks suspended on `await`
    Suspend,
}

impl Strategy {
    pub fn detect(capabilities: HostCapabilities) -> Self {
        if capabilities.await_support {
            Strategy::Suspend
        } else {
            Strategy::Continuation
        }
    }
}

/// Shared state of installed members
///
/// Classes are held weakly: members live inside class tables and must not
/// keep those classes alive.
pub(crate) struct Context {
    native: WeakPromiseClass,
    rich: WeakPromiseClass,
    pub(crate) strategy: Strategy,
    pub(crate) event_loop: EventLoop,
}

impl Context {
    pub(crate) fn new(
        native: &PromiseClass,
        rich: &PromiseClass,
        strategy: Strategy,
        event_loop: &EventLoop,
    ) -> Rc<Self> {
        Rc::new(Self {
            native: native.downgrade(),
            rich: rich.downgrade(),
            strategy,
            event_loop: event_loop.clone(),
        })
    }

    pub(crate) fn native(&self) -> Result<PromiseClass, InteropError> {
        self.native.upgrade().ok_or(InteropError::ClassDropped)
    }

    pub(crate) fn rich(&self) -> Result<PromiseClass, InteropError> {
        self.rich.upgrade().ok_or(InteropError::ClassDropped)
    }

    pub(crate) fn to_rich(&self, promise: &PromiseRef) -> Result<PromiseRef, Value> {
        let rich = self.rich().map_err(InteropError::into_value)?;
        convert::to_rich(promise, &rich).map_err(InteropError::into_value)
    }

    pub(crate) fn to_native(&self, promise: &PromiseRef) -> Result<PromiseRef, Value> {
        let native = self.native().map_err(InteropError::into_value)?;
        convert::to_native(promise, &native).map_err(InteropError::into_value)
    }
}

pub(crate) type MemberBody = fn(&Context, &PromiseRef, &[Value]) -> Completion;

/// Wraps `body` as an instance member checking its receiver.
pub(crate) fn member(context: &Rc<Context>, name: &'static str, body: MemberBody) -> Function {
    let context = context.clone();
    Function::new(name, move |this, args| match this {
        Value::Promise(promise) => body(&context, promise, args),
        other => Err(type_error(format!(
            "Method {name} called on incompatible receiver {other}"
        ))),
    })
}

/// Installs each member the prototype lacks; returns how many were added.
pub(crate) fn install(
    context: &Rc<Context>,
    class: &PromiseClass,
    members: &[(&'static str, MemberBody)],
) -> usize {
    let prototype = class.prototype().members();
    let mut installed = 0;
    for &(name, body) in members {
        if !prototype.contains(name) {
            prototype.define(name, member(context, name, body));
            installed += 1;
        }
    }
    installed
}

/// `onFinally`/`onTap` results that are thenables are waited for before
/// passing `value` on.
pub(crate) fn after(result: Value, value: Value) -> Completion {
    let pass = Function::once("", move |_| Ok(value));
    match &result {
        Value::Promise(promise) => promise.then(Some(pass), None),
        other => match other.thenable_then() {
            Some(then) => then.call(other, &[pass.into()]),
            None => pass.call(&Value::Undefined, &[]),
        },
    }
}

pub(crate) fn function(value: &Value) -> Option<Function> {
    value.as_function().cloned()
}

pub(crate) fn require_function(value: &Value) -> Result<Function, Value> {
    function(value).ok_or_else(|| type_error(format!("{value} is not a function")))
}

/// `new Class(executor)`, keeping the resolving functions it receives.
pub(crate) fn construct(class: &PromiseClass) -> Result<(Value, Function, Function), Value> {
    let captured = Rc::new(RefCell::new(None));
    let executor = {
        let captured = captured.clone();
        Function::new("executor", move |_, args| {
            *captured.borrow_mut() = function(&arg(args, 0)).zip(function(&arg(args, 1)));
            Ok(Value::Undefined)
        })
    };
    let promise = class.construct(executor)?;
    let resolvers = captured.borrow_mut().take();
    match resolvers {
        Some((resolve, reject)) => Ok((promise, resolve, reject)),
        None => Err(type_error(format!("{} executor was not called", class.name()))),
    }
}

/// Items of an array for spreading into arguments.
pub(crate) fn spread_args(values: &Value) -> Result<Vec<Value>, Value> {
    values
        .as_array()
        .map(|items| items.to_vec())
        .ok_or_else(|| type_error(format!("{} is not iterable", values.type_of())))
}
