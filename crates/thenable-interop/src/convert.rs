//! Conversion Bridge
//!
//! Memoized conversions between the native and the rich representation.
//! Each promise remembers the conversion it produced, so repeated calls hand
//! out the same derived promise and handlers attached to it keep their FIFO
//! order.
//!
//! Sources own their views. A rich view refers back to the promise it
//! follows only weakly, and a native view not at all, so neither direction
//! forms a cycle.

use thenable_runtime::{PromiseClass, PromiseRef, Value};

use crate::error::{InteropError, Result};
use crate::inspect::{self, Status};
use crate::suppress;

/// Memoized rich conversion
struct RichView(PromiseRef);

/// Memoized native conversion
struct NativeView(PromiseRef);

/// The rich conversion of `promise`, if one was made.
pub fn rich_view(promise: &PromiseRef) -> Option<PromiseRef> {
    promise.slots().get::<RichView>().map(|view| view.0.clone())
}

pub fn native_view(promise: &PromiseRef) -> Option<PromiseRef> {
    promise.slots().get::<NativeView>().map(|view| view.0.clone())
}

pub fn to_rich(promise: &PromiseRef, rich_class: &PromiseClass) -> Result<PromiseRef> {
    if promise.constructor().ptr_eq(rich_class) {
        return Ok(promise.clone());
    }
    if let Some(view) = rich_view(promise) {
        return Ok(view);
    }

    let rich = expect_promise("resolve", rich_class.resolve(Value::Promise(promise.clone()))?)?;
    if rich.has_method("_setAsyncGuaranteed") {
        rich.invoke("_setAsyncGuaranteed", &[])?;
    }
    if suppress::is_suppressed(promise) {
        suppress::propagate(&rich);
    }
    tracing::trace!(source = %promise.id(), view = %rich.id(), "converted to {}", rich_class.name());
    promise.slots().insert(RichView(rich.clone()));
    Ok(rich)
}

pub fn to_native(promise: &PromiseRef, native_class: &PromiseClass) -> Result<PromiseRef> {
    if promise.constructor().ptr_eq(native_class) {
        return Ok(promise.clone());
    }
    if let Some(view) = native_view(promise) {
        return Ok(view);
    }

    let cell = inspect::inspect(promise);
    let native = match cell.status {
        Status::Pending => native_class.resolve(Value::Promise(promise.clone()))?,
        Status::Fulfilled => native_class.resolve(cell.payload)?,
        Status::Rejected => native_class.reject(cell.payload)?,
    };
    let native = expect_promise("resolve", native)?;
    if suppress::is_suppressed(promise) {
        suppress::propagate(&native);
    }
    tracing::trace!(source = %promise.id(), view = %native.id(), "converted to {}", native_class.name());
    promise.slots().insert(NativeView(native.clone()));
    Ok(native)
}

fn expect_promise(member: &str, value: Value) -> Result<PromiseRef> {
    match value {
        Value::Promise(promise) => Ok(promise),
        other => Err(InteropError::UnexpectedResult {
            member: member.to_string(),
            expected: "a promise",
            actual: other.object_tag(),
        }),
    }
}
