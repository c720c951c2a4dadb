//! Catch Filters
//!
//! A filter is an error class (matched with `instanceof`), a predicate
//! function, or an object whose properties must all equal the reason's.
//! A throwing predicate replaces the rejection reason.

use thenable_runtime::{Value, type_error};

pub fn matches(filter: &Value, reason: &Value) -> Result<bool, Value> {
    match filter {
        Value::ErrorClass(kind) => Ok(reason.is_instance_of(*kind)),
        Value::Function(predicate) => Ok(predicate.call(&Value::Undefined, &[reason.clone()])?.is_truthy()),
        Value::Object(matcher) => Ok(matcher
            .entries()
            .iter()
            .all(|(key, expected)| reason.get(key) == *expected)),
        other => Err(type_error(format!(
            "Catch statement predicate: expecting an object but got {}",
            other.object_tag()
        ))),
    }
}

pub fn any_match(filters: &[Value], reason: &Value) -> Result<bool, Value> {
    for filter in filters {
        if matches(filter, reason)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Splits `(filter..., last)` call arguments.
pub fn split_last(args: &[Value]) -> (Vec<Value>, Value) {
    match args.split_last() {
        Some((last, filters)) => (filters.to_vec(), last.clone()),
        None => (Vec::new(), Value::Undefined),
    }
}
