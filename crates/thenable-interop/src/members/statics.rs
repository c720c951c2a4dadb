//! Interop Statics
//!
//! Class-level entry points added to every augmented class.

use std::rc::Rc;

use thenable_runtime::{Function, PromiseClass, PromiseRef, Value, arg};

use super::{Context, Strategy, construct};
use crate::error::{InteropError, Result};
use crate::{augment, identity, suppress};

/// `{promise, resolve, reject, fulfill}` of a pending promise
#[derive(Debug, Clone)]
pub struct Deferred {
    pub promise: PromiseRef,
    pub resolve: Function,
    pub reject: Function,
    /// Same function as `resolve`
    pub fulfill: Function,
}

impl Deferred {
    /// `new class(executor)`, capturing its resolving functions.
    pub fn new(class: &PromiseClass) -> Result<Self> {
        let (promise, resolve, reject) = construct(class)?;
        let Value::Promise(promise) = promise else {
            return Err(InteropError::UnexpectedResult {
                member: format!("new {}", class.name()),
                expected: "a promise",
                actual: promise.object_tag(),
            });
        };
        Ok(Self { promise, fulfill: resolve.clone(), resolve, reject })
    }

    pub fn to_value(&self) -> Value {
        Value::object([
            ("promise", Value::Promise(self.promise.clone())),
            ("resolve", self.resolve.clone().into()),
            ("reject", self.reject.clone().into()),
            ("fulfill", self.fulfill.clone().into()),
        ])
    }
}

/// Adds the interop statics the class lacks.
pub(crate) fn install(
    context: &Rc<Context>,
    class: &PromiseClass,
    native: &PromiseClass,
    rich: &PromiseClass,
) -> usize {
    let augment_fn = {
        let context = context.clone();
        Function::new("bluebirdifyPromiseClass", move |_, args| {
            augment::augment(&context, &arg(args, 0))
                .map(Value::Class)
                .map_err(InteropError::into_value)
        })
    };
    let defer = {
        let context = context.clone();
        Function::new("defer", move |this, _| {
            let class = match this {
                Value::Class(class) => class.clone(),
                _ => context.native().map_err(InteropError::into_value)?,
            };
            Deferred::new(&class).map(|d| d.to_value()).map_err(InteropError::into_value)
        })
    };
    let statics: [(&str, Value); 8] = [
        ("Promise", Value::Class(native.clone())),
        ("Bluebird", Value::Class(rich.clone())),
        ("bluebirdifyPromiseClass", augment_fn.clone().into()),
        ("augment", augment_fn.into()),
        ("supportsAsyncAwait", Value::Bool(context.strategy == Strategy::Suspend)),
        (
            "suppressUnhandledRejections",
            Function::new("suppressUnhandledRejections", |_, args| {
                let promise = arg(args, 0);
                suppress::suppress(&promise)?;
                Ok(promise)
            })
            .into(),
        ),
        ("is", Function::new("is", |_, args| Ok(identity::is(&arg(args, 0)).into())).into()),
        ("defer", defer.into()),
    ];
    statics
        .into_iter()
        .map(|(key, value)| class.define_static_missing(key, value))
        .filter(|&added| added)
        .count()
}

/// `pending`, `rejected` and `fulfilled`, read after the other statics are in.
pub(crate) fn install_aliases(class: &PromiseClass) -> usize {
    let mut installed = 0;
    for (alias, source) in [("pending", "defer"), ("rejected", "reject"), ("fulfilled", "resolve")] {
        if let Some(value) = class.get_static(source)
            && class.define_static_missing(alias, value)
        {
            installed += 1;
        }
    }
    installed
}
