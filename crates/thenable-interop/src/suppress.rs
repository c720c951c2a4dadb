//! Unhandled-Rejection Suppression
//!
//! A suppressed promise never reaches the host's unhandled-rejection report.
//! The flag travels to conversions when they are created, and to a rich view
//! that already exists at the moment of suppression. Nothing flows back from
//! a conversion to its source.

use thenable_runtime::{Function, PromiseRef, Value};
use thenable_rich::RichPromise;

use crate::convert;

/// Marks an instance as suppressed
pub(crate) struct SuppressionFlag;

const METHOD: &str = "suppressUnhandledRejections";

pub fn is_suppressed(promise: &PromiseRef) -> bool {
    promise.slots().contains::<SuppressionFlag>()
        || RichPromise::from_ref(promise).is_some_and(|rich| rich.is_suppressed())
}

/// Static entry point: accepts any value, ignores non-thenables.
pub fn suppress(value: &Value) -> Result<(), Value> {
    match value {
        Value::Promise(promise) if promise.has_method(METHOD) => {
            promise.invoke(METHOD, &[])?;
        }
        Value::Promise(promise) => suppress_instance(promise),
        other => {
            if let Some(then) = other.thenable_then() {
                then.call(other, &[noop().into(), noop().into()])?;
            }
        }
    }
    Ok(())
}

/// Default `suppressUnhandledRejections` member.
pub fn suppress_instance(promise: &PromiseRef) {
    if promise.slots().contains::<SuppressionFlag>() {
        return;
    }
    tracing::trace!(promise = %promise.id(), "suppressing unhandled rejection");
    promise.slots().insert(SuppressionFlag);
    promise.react(Box::new(|_| {}));
    if let Some(view) = convert::rich_view(promise) {
        propagate(&view);
    }
}

/// Suppresses a conversion of an already suppressed promise.
pub(crate) fn propagate(target: &PromiseRef) {
    if let Err(thrown) = suppress(&Value::Promise(target.clone())) {
        tracing::debug!(promise = %target.id(), %thrown, "suppression propagation failed");
    }
}

fn noop() -> Function {
    Function::anonymous(|_, _| Ok(Value::Undefined))
}
