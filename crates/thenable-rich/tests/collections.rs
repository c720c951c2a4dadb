//! Collection combinator tests

use std::cell::Cell;
use std::rc::Rc;

use thenable_rich::*;
use thenable_runtime::*;

fn library() -> RichLibrary {
    RichLibrary::new(&EventLoop::default(), RichConfig::default())
}

/// Calls a class static and drives the loop until idle.
fn run_static(lib: &RichLibrary, name: &str, args: &[Value]) -> RichPromise {
    let result = lib.class().call_static(name, args).unwrap();
    lib.event_loop().run_until_idle();
    let promise = RichPromise::from_value(&result).unwrap();
    promise.suppress_unhandled_rejections();
    promise
}

fn numbers(values: &[i32]) -> Value {
    Value::array(values.iter().map(|&n| Value::from(n)))
}

fn doubling() -> Function {
    Function::new("double", |_, args| Ok(Value::from(arg(args, 0).as_number().unwrap_or(0.0) * 2.0)))
}

// ============================================================================
// ALL / SETTLE / RACE
// ============================================================================

#[test]
fn test_all_mixed_inputs() {
    let lib = library();
    let input = Value::array([Value::from(1), lib.resolve(2).into(), lib.resolve(lib.resolve(3)).into()]);
    let p = run_static(&lib, "all", &[input]);
    assert_eq!(p.value(), Ok(numbers(&[1, 2, 3])));
}

#[test]
fn test_all_accepts_promise_for_array() {
    let lib = library();
    let p = run_static(&lib, "all", &[lib.resolve(numbers(&[4, 5])).into()]);
    assert_eq!(p.value(), Ok(numbers(&[4, 5])));
}

#[test]
fn test_non_array_input_rejects() {
    let lib = library();
    let p = run_static(&lib, "all", &[Value::from(5)]);
    let reason = p.reason().unwrap();
    assert!(reason.is_instance_of(ErrorKind::TypeError));
    assert_eq!(
        reason.get("message"),
        Value::from("expecting an array or an iterable object but got [object Number]")
    );
}

#[test]
fn test_settle_reports_each_outcome() {
    let lib = library();
    let input = Value::array([lib.resolve(1).into(), lib.reject("no").into()]);
    let p = run_static(&lib, "settle", &[input]);
    let snapshots = p.value().unwrap();
    let first = snapshots.get_index(0);
    let second = snapshots.get_index(1);
    assert_eq!(first.as_object().unwrap().call_method("value", &[]), Ok(Value::from(1)));
    assert_eq!(second.as_object().unwrap().call_method("isRejected", &[]), Ok(Value::Bool(true)));
}

#[test]
fn test_race_first_settled_wins() {
    let lib = library();
    let (slow, _resolver) = lib.pending();
    let input = Value::array([slow.into(), lib.resolve("fast").into()]);
    let p = run_static(&lib, "race", &[input]);
    assert_eq!(p.value(), Ok(Value::from("fast")));
}

#[test]
fn test_join_arguments() {
    let lib = library();
    let p = run_static(&lib, "join", &[Value::from(1), lib.resolve(2).into()]);
    assert_eq!(p.value(), Ok(numbers(&[1, 2])));
}

// ============================================================================
// SOME / ANY
// ============================================================================

#[test]
fn test_some_fulfills_with_first_values() {
    let lib = library();
    let input = Value::array([
        lib.reject("a").into(),
        lib.resolve(1).into(),
        lib.resolve(2).into(),
        lib.resolve(3).into(),
    ]);
    let p = run_static(&lib, "some", &[input, Value::from(2)]);
    assert_eq!(p.value(), Ok(numbers(&[1, 2])));
}

#[test]
fn test_some_zero_is_empty() {
    let lib = library();
    let p = run_static(&lib, "some", &[numbers(&[1]), Value::from(0)]);
    assert_eq!(p.value(), Ok(Value::array([])));
}

#[test]
fn test_some_rejects_invalid_count() {
    let lib = library();
    let negative = run_static(&lib, "some", &[numbers(&[1]), Value::from(-1)]);
    assert!(negative.reason().unwrap().is_instance_of(ErrorKind::TypeError));

    let too_many = run_static(&lib, "some", &[numbers(&[1, 2, 3]), Value::from(5)]);
    let reason = too_many.reason().unwrap();
    assert!(reason.is_instance_of(ErrorKind::RangeError));
    assert_eq!(
        reason.get("message"),
        Value::from("Input array must contain at least 5 items but contains only 3 items")
    );
}

#[test]
fn test_some_aggregates_rejections() {
    let lib = library();
    let input = Value::array([lib.reject("a").into(), lib.reject("b").into(), lib.resolve(1).into()]);
    let p = run_static(&lib, "some", &[input, Value::from(2)]);
    let reason = p.reason().unwrap();
    let aggregate = reason.as_error().unwrap();
    assert_eq!(aggregate.kind(), ErrorKind::AggregateError);
    assert_eq!(aggregate.errors(), [Value::from("a"), Value::from("b")]);
}

#[test]
fn test_any_unwraps_single_value() {
    let lib = library();
    let input = Value::array([lib.reject("a").into(), lib.resolve("b").into()]);
    let p = run_static(&lib, "any", &[input]);
    assert_eq!(p.value(), Ok(Value::from("b")));
}

#[test]
fn test_any_all_rejected() {
    let lib = library();
    let input = Value::array([lib.reject("a").into(), lib.reject("b").into()]);
    let p = run_static(&lib, "any", &[input]);
    assert!(p.reason().unwrap().is_instance_of(ErrorKind::AggregateError));
}

// ============================================================================
// MAP / FILTER / SERIES
// ============================================================================

#[test]
fn test_map_passes_index_and_length() {
    let lib = library();
    let describe = Function::new("describe", |_, args| {
        Ok(Value::from(format!("{}@{}/{}", arg(args, 0), arg(args, 1), arg(args, 2))))
    });
    let p = run_static(&lib, "map", &[Value::array([Value::from("a"), Value::from("b")]), describe.into()]);
    assert_eq!(p.value(), Ok(Value::array([Value::from("a@0/2"), Value::from("b@1/2")])));
}

#[test]
fn test_map_respects_concurrency() {
    let lib = library();
    let current = Rc::new(Cell::new(0usize));
    let peak = Rc::new(Cell::new(0usize));
    let mapper = {
        let (lib, current, peak) = (lib.clone(), current.clone(), peak.clone());
        Function::new("mapper", move |_, args| {
            current.set(current.get() + 1);
            peak.set(peak.get().max(current.get()));
            let current = current.clone();
            let doubled = Value::from(arg(args, 0).as_number().unwrap_or(0.0) * 2.0);
            let delayed = timing::delay(&lib, 10, doubled).then(
                Some(Box::new(move |v| {
                    current.set(current.get() - 1);
                    Ok(v)
                })),
                None,
            );
            Ok(delayed.into())
        })
    };
    let options = Value::object([("concurrency", Value::from(2))]);
    let result = lib
        .class()
        .call_static("map", &[numbers(&[1, 2, 3, 4]), mapper.into(), options])
        .unwrap();
    for _ in 0..4 {
        lib.event_loop().tick(10);
    }
    let p = RichPromise::from_value(&result).unwrap();
    assert_eq!(p.value(), Ok(numbers(&[2, 4, 6, 8])));
    assert_eq!(peak.get(), 2);
}

#[test]
fn test_filter_keeps_input_order() {
    let lib = library();
    let even = Function::new("even", |_, args| {
        Ok(Value::from(arg(args, 0).as_number().unwrap_or(1.0) % 2.0 == 0.0))
    });
    let p = run_static(&lib, "filter", &[numbers(&[1, 2, 3, 4]), even.into()]);
    assert_eq!(p.value(), Ok(numbers(&[2, 4])));
}

#[test]
fn test_map_series_is_sequential() {
    let lib = library();
    let order = Rc::new(std::cell::RefCell::new(Vec::new()));
    let iterator = {
        let (lib, order) = (lib.clone(), order.clone());
        Function::new("iterator", move |_, args| {
            let value = arg(args, 0);
            order.borrow_mut().push(format!("start:{value}"));
            let order = order.clone();
            let finished = timing::delay(&lib, 5, value).then(
                Some(Box::new(move |v| {
                    order.borrow_mut().push(format!("end:{v}"));
                    Ok(v)
                })),
                None,
            );
            Ok(finished.into())
        })
    };
    let p = run_static(&lib, "mapSeries", &[numbers(&[1, 2]), iterator.into()]);
    assert_eq!(p.value(), Ok(numbers(&[1, 2])));
    assert_eq!(*order.borrow(), ["start:1", "end:1", "start:2", "end:2"]);
}

#[test]
fn test_each_returns_inputs() {
    let lib = library();
    let p = run_static(&lib, "each", &[numbers(&[1, 2]), doubling().into()]);
    assert_eq!(p.value(), Ok(numbers(&[1, 2])));
}

#[test]
fn test_map_mapper_throw_rejects() {
    let lib = library();
    let throwing = Function::new("throwing", |_, _| Err(Value::from("bad")));
    let p = run_static(&lib, "map", &[numbers(&[1]), throwing.into()]);
    assert_eq!(p.reason(), Ok(Value::from("bad")));
}

// ============================================================================
// REDUCE / PROPS
// ============================================================================

fn adding() -> Function {
    Function::new("add", |_, args| {
        let sum = arg(args, 0).as_number().unwrap_or(0.0) + arg(args, 1).as_number().unwrap_or(0.0);
        Ok(Value::from(sum))
    })
}

#[test]
fn test_reduce_with_initial() {
    let lib = library();
    let input = Value::array([Value::from(1), lib.resolve(2).into(), Value::from(3)]);
    let p = run_static(&lib, "reduce", &[input, adding().into(), Value::from(10)]);
    assert_eq!(p.value(), Ok(Value::from(16)));
}

#[test]
fn test_reduce_without_initial() {
    let lib = library();
    let p = run_static(&lib, "reduce", &[numbers(&[1, 2, 3]), adding().into()]);
    assert_eq!(p.value(), Ok(Value::from(6)));

    let empty = run_static(&lib, "reduce", &[numbers(&[]), adding().into()]);
    assert_eq!(empty.value(), Ok(Value::Undefined));
}

#[test]
fn test_props_resolves_object() {
    let lib = library();
    let input = Value::object([("a", lib.resolve(1).into()), ("b", Value::from(2))]);
    let p = run_static(&lib, "props", &[input]);
    assert_eq!(p.value(), Ok(Value::object([("a", Value::from(1)), ("b", Value::from(2))])));
}

#[test]
fn test_props_rejects_primitive() {
    let lib = library();
    let p = run_static(&lib, "props", &[Value::from(3)]);
    assert!(p.reason().unwrap().is_instance_of(ErrorKind::TypeError));
}

// ============================================================================
// INSTANCE FORMS
// ============================================================================

#[test]
fn test_instance_map_and_reduce() {
    let lib = library();
    let mapped = lib.resolve(numbers(&[1, 2])).map(doubling().into(), Value::Undefined);
    let total = mapped.reduce(adding().into(), None);
    lib.event_loop().run_until_idle();
    assert_eq!(mapped.value(), Ok(numbers(&[2, 4])));
    assert_eq!(total.value(), Ok(Value::from(6)));
}

#[test]
fn test_instance_all_through_prototype() {
    let lib = library();
    let source = lib.resolve(Value::array([lib.resolve("x").into()]));
    let result = source.to_ref().invoke("all", &[]).unwrap();
    lib.event_loop().run_until_idle();
    let p = RichPromise::from_value(&result).unwrap();
    assert_eq!(p.value(), Ok(Value::array([Value::from("x")])));
}
