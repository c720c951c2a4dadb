//! Promise Inspections
//!
//! Snapshot objects produced by `reflect`, `settle` and `allSettled`.

use thenable_runtime::{ErrorKind, Function, PromiseState, Value, type_error};

/// Inspection object exposing `isFulfilled`, `isRejected`, `isPending`,
/// `isCancelled`, `value` and `reason` as methods.
pub fn inspection(state: &PromiseState) -> Value {
    let flag = |name: &str, set: bool| (name.to_string(), Value::from(Function::new(name, move |_, _| Ok(Value::Bool(set)))));
    let cancelled = matches!(state, PromiseState::Rejected(r) if r.is_instance_of(ErrorKind::CancellationError));
    let value = match state {
        PromiseState::Fulfilled(v) => Ok(v.clone()),
        _ => Err("cannot get fulfillment value of a non-fulfilled promise"),
    };
    let reason = match state {
        PromiseState::Rejected(r) => Ok(r.clone()),
        _ => Err("cannot get rejection reason of a non-rejected promise"),
    };
    Value::object([
        flag("isFulfilled", matches!(state, PromiseState::Fulfilled(_))),
        flag("isRejected", matches!(state, PromiseState::Rejected(_))),
        flag("isPending", state.is_pending()),
        flag("isCancelled", cancelled),
        ("value".to_string(), getter("value", value)),
        ("reason".to_string(), getter("reason", reason)),
    ])
}

fn getter(name: &str, result: Result<Value, &'static str>) -> Value {
    Function::new(name, move |_, _| result.clone().map_err(type_error)).into()
}

/// `toJSON` shape shared by rich promises and augmented ones.
pub fn to_json(state: &PromiseState) -> Value {
    let (fulfilled, rejected, value, reason) = match state {
        PromiseState::Pending => (false, false, Value::Undefined, Value::Undefined),
        PromiseState::Fulfilled(v) => (true, false, v.clone(), Value::Undefined),
        PromiseState::Rejected(r) => (false, true, Value::Undefined, r.clone()),
    };
    Value::object([
        ("isFulfilled", Value::Bool(fulfilled)),
        ("isRejected", Value::Bool(rejected)),
        ("fulfillmentValue", value),
        ("rejectionReason", reason),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use thenable_runtime::Object;

    fn call(inspection: &Value, name: &str) -> Result<Value, Value> {
        inspection.as_object().map(Object::clone).unwrap().call_method(name, &[])
    }

    #[test]
    fn test_fulfilled_inspection() {
        let snapshot = inspection(&PromiseState::Fulfilled(Value::from(5)));
        assert_eq!(call(&snapshot, "isFulfilled"), Ok(Value::Bool(true)));
        assert_eq!(call(&snapshot, "value"), Ok(Value::from(5)));
        assert!(call(&snapshot, "reason").is_err());
    }

    #[test]
    fn test_to_json_rejected() {
        let json = to_json(&PromiseState::Rejected(Value::from("no")));
        assert_eq!(json.get("isRejected"), Value::Bool(true));
        assert_eq!(json.get("rejectionReason"), Value::from("no"));
        assert!(json.get("fulfillmentValue").is_undefined());
    }
}
