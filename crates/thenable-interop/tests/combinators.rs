//! Augmented member tests
//!
//! The rich catalog called on native promises, under both member strategies.

use std::cell::RefCell;
use std::rc::Rc;

use thenable_interop::*;
use thenable_rich::*;
use thenable_runtime::*;

struct Host {
    realm: Realm,
    _library: RichLibrary,
    bridge: Bridge,
}

fn host(strategy: Strategy) -> Host {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let realm = Realm::default();
    let library = RichLibrary::for_realm(&realm);
    let bridge = Bridge::with_strategy(realm.promise_class(), library.class(), realm.event_loop(), strategy)
        .expect("bridge");
    Host { realm, _library: library, bridge }
}

/// Runs `check` against a fresh host per strategy.
fn each_strategy(check: impl Fn(&Host)) {
    for strategy in [Strategy::Continuation, Strategy::Suspend] {
        let _span = tracing::info_span!("strategy", ?strategy).entered();
        check(&host(strategy));
    }
}

fn log() -> Rc<RefCell<Vec<String>>> {
    Rc::new(RefCell::new(Vec::new()))
}

fn record(log: &Rc<RefCell<Vec<String>>>, entry: &str) -> Function {
    let (log, entry) = (log.clone(), entry.to_string());
    Function::new("record", move |_, args| {
        let rendered: Vec<String> = args.iter().map(Value::to_string).collect();
        log.borrow_mut().push(format!("{entry}:{}", rendered.join(",")));
        Ok(arg(args, 0))
    })
}

fn returning(value: Value) -> Function {
    Function::new("handler", move |_, _| Ok(value.clone()))
}

fn numbers(values: &[i32]) -> Value {
    Value::array(values.iter().map(|&n| Value::from(n)))
}

fn number(value: &Value) -> f64 {
    value.as_number().unwrap_or(f64::NAN)
}

fn promise(value: Value) -> PromiseRef {
    value.as_promise().cloned().expect("promise value")
}

fn state(promise: &PromiseRef) -> PromiseState {
    if let Some(native) = NativePromise::from_ref(promise) {
        return native.state();
    }
    RichPromise::from_ref(promise).expect("known promise").state()
}

/// Invokes `name` on `target`, drains the loop and reports the outcome.
fn settle(host: &Host, target: &PromiseRef, name: &str, args: &[Value]) -> PromiseState {
    let result = promise(target.invoke(name, args).unwrap());
    host.realm.run_until_idle();
    state(&result)
}

fn rejection_kind(state: &PromiseState) -> Option<ErrorKind> {
    match state {
        PromiseState::Rejected(Value::Error(e)) => Some(e.kind()),
        _ => None,
    }
}

fn rejection_message(state: &PromiseState) -> String {
    match state {
        PromiseState::Rejected(Value::Error(e)) => e.message().to_string(),
        other => panic!("expected an error rejection, got {other:?}"),
    }
}

// ============================================================================
// COLLECTIONS
// ============================================================================

#[test]
fn test_any_fulfills_with_an_input() {
    each_strategy(|host| {
        let p = host.realm.resolve(numbers(&[1, 2, 3])).to_ref();
        match settle(host, &p, "any", &[]) {
            PromiseState::Fulfilled(v) => assert!([1.0, 2.0, 3.0].contains(&number(&v))),
            other => panic!("expected fulfillment, got {other:?}"),
        }
    });
}

#[test]
fn test_any_of_empty_array_is_range_error() {
    each_strategy(|host| {
        let p = host.realm.resolve(Value::array([])).to_ref();
        let outcome = settle(host, &p, "any", &[]);
        assert_eq!(rejection_kind(&outcome), Some(ErrorKind::RangeError));
    });
}

#[test]
fn test_all_through_native_static() {
    each_strategy(|host| {
        let items = Value::array([host.realm.resolve(1).into(), Value::from(2)]);
        let p = host.realm.resolve(items).to_ref();
        assert_eq!(settle(host, &p, "all", &[]), PromiseState::Fulfilled(numbers(&[1, 2])));
    });
}

#[test]
fn test_map_filter_reduce() {
    let double = Function::new("double", |_, args| Ok(Value::from(number(&arg(args, 0)) * 2.0)));
    let odd = Function::new("odd", |_, args| Ok(Value::Bool(number(&arg(args, 0)) % 2.0 == 1.0)));
    let sum = Function::new("sum", |_, args| Ok(Value::from(number(&arg(args, 0)) + number(&arg(args, 1)))));
    each_strategy(|host| {
        let p = host.realm.resolve(numbers(&[1, 2, 3])).to_ref();
        assert_eq!(
            settle(host, &p, "map", &[double.clone().into()]),
            PromiseState::Fulfilled(numbers(&[2, 4, 6]))
        );
        assert_eq!(
            settle(host, &p, "filter", &[odd.clone().into()]),
            PromiseState::Fulfilled(numbers(&[1, 3]))
        );
        assert_eq!(
            settle(host, &p, "reduce", &[sum.clone().into(), Value::from(10)]),
            PromiseState::Fulfilled(Value::from(16))
        );
    });
}

#[test]
fn test_map_series_visits_in_order() {
    each_strategy(|host| {
        let seen = log();
        let p = host.realm.resolve(numbers(&[1, 2, 3])).to_ref();
        settle(host, &p, "mapSeries", &[record(&seen, "item").into()]);
        let items: Vec<String> = seen.borrow().iter().map(|e| e.split(',').next().unwrap_or_default().to_string()).collect();
        assert_eq!(items, ["item:1", "item:2", "item:3"]);
    });
}

#[test]
fn test_props_awaits_values() {
    each_strategy(|host| {
        let input = Value::object([("a", host.realm.resolve(1).into()), ("b", Value::from(2))]);
        let p = host.realm.resolve(input).to_ref();
        let expected = Value::object([("a", Value::from(1)), ("b", Value::from(2))]);
        assert_eq!(settle(host, &p, "props", &[]), PromiseState::Fulfilled(expected));
    });
}

#[test]
fn test_settle_is_delegated() {
    each_strategy(|host| {
        let items = Value::array([host.realm.resolve(1).into(), host.realm.reject("no").into()]);
        let p = host.realm.resolve(items).to_ref();
        match settle(host, &p, "settle", &[]) {
            PromiseState::Fulfilled(results) => assert_eq!(results.length(), Some(2)),
            other => panic!("expected fulfillment, got {other:?}"),
        }
    });
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[test]
fn test_caught_skips_non_matching_filter() {
    each_strategy(|host| {
        let seen = log();
        let p = host.realm.reject(error(ErrorKind::SyntaxError, "bad")).to_ref();
        let filtered = promise(
            p.invoke("caught", &[Value::ErrorClass(ErrorKind::TypeError), record(&seen, "type").into()])
                .unwrap(),
        );
        let recovered = settle(
            host,
            &filtered,
            "caught",
            &[Value::ErrorClass(ErrorKind::SyntaxError), returning(Value::from("recovered")).into()],
        );
        assert!(seen.borrow().is_empty());
        assert_eq!(recovered, PromiseState::Fulfilled(Value::from("recovered")));
    });
}

#[test]
fn test_caught_matching_filter() {
    each_strategy(|host| {
        let p = host.realm.reject(type_error("bad")).to_ref();
        let outcome = settle(
            host,
            &p,
            "caught",
            &[Value::ErrorClass(ErrorKind::TypeError), returning(Value::from("handled")).into()],
        );
        assert_eq!(outcome, PromiseState::Fulfilled(Value::from("handled")));
    });
}

#[test]
fn test_caught_without_filter_is_catch() {
    each_strategy(|host| {
        let p = host.realm.reject("plain").to_ref();
        let outcome = settle(host, &p, "caught", &[returning(Value::from("ok")).into()]);
        assert_eq!(outcome, PromiseState::Fulfilled(Value::from("ok")));
        let outcome = settle(host, &p, "error", &[returning(Value::from("ok")).into()]);
        assert_eq!(outcome, PromiseState::Fulfilled(Value::from("ok")));
    });
}

#[test]
fn test_catch_passes_fulfillment_through() {
    each_strategy(|host| {
        let p = host.realm.resolve(1).to_ref();
        let outcome = settle(host, &p, "catch", &[returning(Value::from("unused")).into()]);
        assert_eq!(outcome, PromiseState::Fulfilled(Value::from(1)));
    });
}

#[test]
fn test_finally_keeps_rejection() {
    each_strategy(|host| {
        let seen = log();
        let p = host.realm.reject("boom").to_ref();
        let outcome = settle(host, &p, "finally", &[record(&seen, "finally").into()]);
        assert_eq!(outcome, PromiseState::Rejected(Value::from("boom")));
        assert_eq!(seen.borrow().len(), 1);

        let lastly = settle(host, &host.realm.resolve(2).to_ref(), "lastly", &[record(&seen, "lastly").into()]);
        assert_eq!(lastly, PromiseState::Fulfilled(Value::from(2)));
        assert_eq!(seen.borrow().len(), 2);
    });
}

#[test]
fn test_finally_waits_for_returned_promise() {
    each_strategy(|host| {
        let (gate, resolvers) = host.realm.pending();
        let on_finally = returning(gate.into());
        let result = promise(host.realm.resolve(1).to_ref().invoke("finally", &[on_finally.into()]).unwrap());
        host.realm.run_until_idle();
        assert!(state(&result).is_pending());
        resolvers.resolve(Value::from("ignored"));
        host.realm.run_until_idle();
        assert_eq!(state(&result), PromiseState::Fulfilled(Value::from(1)));
    });
}

// ============================================================================
// VALUE MEMBERS
// ============================================================================

#[test]
fn test_tap_observes_without_changing_value() {
    each_strategy(|host| {
        let seen = log();
        let p = host.realm.resolve(3).to_ref();
        let tapper = Function::new("tap", {
            let seen = seen.clone();
            move |_, args| {
                seen.borrow_mut().push(format!("tap:{}", arg(args, 0)));
                Ok(Value::from("replaced"))
            }
        });
        assert_eq!(settle(host, &p, "tap", &[tapper.into()]), PromiseState::Fulfilled(Value::from(3)));
        assert_eq!(*seen.borrow(), ["tap:3"]);
    });
}

#[test]
fn test_spread_get_and_call() {
    let add = Function::new("add", |_, args| Ok(Value::from(number(&arg(args, 0)) + number(&arg(args, 1)))));
    let twice = Function::new("twice", |this, _| Ok(Value::from(number(&this.get("n")) * 2.0)));
    each_strategy(|host| {
        let pair = host.realm.resolve(numbers(&[1, 2])).to_ref();
        assert_eq!(settle(host, &pair, "spread", &[add.clone().into()]), PromiseState::Fulfilled(Value::from(3)));

        let list = host.realm.resolve(numbers(&[1, 2, 3])).to_ref();
        assert_eq!(settle(host, &list, "get", &[Value::from(-1)]), PromiseState::Fulfilled(Value::from(3)));

        let target = Value::object([("n", Value::from(21)), ("twice", twice.clone().into())]);
        let object = host.realm.resolve(target).to_ref();
        assert_eq!(settle(host, &object, "get", &[Value::from("n")]), PromiseState::Fulfilled(Value::from(21)));
        assert_eq!(
            settle(host, &object, "call", &[Value::from("twice")]),
            PromiseState::Fulfilled(Value::from(42))
        );

        let missing = settle(host, &object, "call", &[Value::from("nope")]);
        assert_eq!(rejection_kind(&missing), Some(ErrorKind::TypeError));
        assert_eq!(rejection_message(&missing), "Object [object Object] has no method 'nope'");
    });
}

#[test]
fn test_then_return_and_then_throw() {
    each_strategy(|host| {
        let p = host.realm.resolve(1).to_ref();
        assert_eq!(settle(host, &p, "thenReturn", &[Value::from("b")]), PromiseState::Fulfilled(Value::from("b")));
        assert_eq!(settle(host, &p, "return", &[Value::from("c")]), PromiseState::Fulfilled(Value::from("c")));
        assert_eq!(settle(host, &p, "thenThrow", &[Value::from("x")]), PromiseState::Rejected(Value::from("x")));
        assert_eq!(settle(host, &p, "throw", &[Value::from("y")]), PromiseState::Rejected(Value::from("y")));

        let rejected = host.realm.reject("first").to_ref();
        assert_eq!(
            settle(host, &rejected, "thenReturn", &[Value::from("b")]),
            PromiseState::Rejected(Value::from("first"))
        );
    });
}

#[test]
fn test_done_is_then() {
    let host = host(Strategy::Suspend);
    let members = host.realm.promise_class().prototype().members();
    assert!(members.get("done").unwrap().same(&members.get("then").unwrap()));
}

// ============================================================================
// CANCELLATION
// ============================================================================

#[test]
fn test_cancel_throws_on_native_promise() {
    each_strategy(|host| {
        let p = host.realm.resolve(1).to_ref();
        for name in ["cancel", "break"] {
            match p.invoke(name, &[]) {
                Err(Value::Error(e)) => {
                    assert_eq!(e.kind(), ErrorKind::TypeError);
                    assert_eq!(e.message(), "Cannot cancel a non bluebird promise");
                }
                other => panic!("expected a TypeError, got {other:?}"),
            }
        }
        assert_eq!(p.invoke("isCancellable", &[]).unwrap(), Value::Bool(false));
    });
}

// ============================================================================
// DELEGATED
// ============================================================================

#[test]
fn test_delay_is_delegated() {
    each_strategy(|host| {
        let p = host.realm.resolve(1).to_ref();
        let delayed = promise(p.invoke("delay", &[Value::from(100)]).unwrap());
        assert!(RichPromise::from_ref(&delayed).is_some());
        host.realm.run_microtasks();
        assert!(state(&delayed).is_pending());
        host.realm.event_loop().tick(100);
        assert_eq!(state(&delayed), PromiseState::Fulfilled(Value::from(1)));
    });
}

#[test]
fn test_timeout_rejects_pending_promise() {
    each_strategy(|host| {
        let (pending, _resolvers) = host.realm.pending();
        let timed = promise(pending.to_ref().invoke("timeout", &[Value::from(10)]).unwrap());
        timed.then(None, Some(returning(Value::Undefined))).unwrap();
        host.realm.run_microtasks();
        assert!(state(&timed).is_pending());
        host.realm.event_loop().tick(10);
        assert_eq!(rejection_kind(&state(&timed)), Some(ErrorKind::TimeoutError));
    });
}

#[test]
fn test_nodeify_calls_back() {
    each_strategy(|host| {
        let seen = log();
        let p = host.realm.resolve(4).to_ref();
        p.invoke("nodeify", &[record(&seen, "cb").into()]).unwrap();
        host.realm.reject("no").to_ref().invoke("asCallback", &[record(&seen, "cb").into()]).unwrap();
        host.realm.run_until_idle();
        assert_eq!(*seen.borrow(), ["cb:null,4", "cb:no"]);
    });
}

#[test]
fn test_reflect_fulfills_with_inspection() {
    each_strategy(|host| {
        let p = host.realm.reject("no").to_ref();
        match settle(host, &p, "reflect", &[]) {
            PromiseState::Fulfilled(inspection) => {
                let object = inspection.as_object().cloned().expect("inspection object");
                assert_eq!(object.call_method("isRejected", &[]).unwrap(), Value::Bool(true));
                assert_eq!(object.call_method("reason", &[]).unwrap(), Value::from("no"));
            }
            other => panic!("expected fulfillment, got {other:?}"),
        }
    });
}

#[test]
fn test_catch_return_is_delegated() {
    each_strategy(|host| {
        let p = host.realm.reject(type_error("bad")).to_ref();
        let outcome = settle(host, &p, "catchReturn", &[Value::ErrorClass(ErrorKind::TypeError), Value::from(0)]);
        assert_eq!(outcome, PromiseState::Fulfilled(Value::from(0)));
    });
}

// ============================================================================
// TYPED ADAPTER
// ============================================================================

#[test]
fn test_awaitable_chain() {
    let double = Function::new("double", |_, args| Ok(Value::from(number(&arg(args, 0)) * 2.0)));
    each_strategy(|host| {
        let native = host.realm.resolve(numbers(&[1, 2, 3]));
        let mapped = Awaitable::map(&native, double.clone(), Some(1)).unwrap();
        let last = Awaitable::get(&mapped, Value::from(-1)).unwrap();
        host.realm.run_until_idle();
        assert_eq!(state(&last), PromiseState::Fulfilled(Value::from(6)));
        assert!(Awaitable::is_fulfilled(&native).unwrap());
        assert_eq!(Awaitable::value(&native).unwrap(), numbers(&[1, 2, 3]));
    });
}

#[test]
fn test_deferred_resolution() {
    each_strategy(|host| {
        let deferred = host.bridge.defer().unwrap();
        assert!(Awaitable::is_pending(&deferred.promise).unwrap());
        deferred.fulfill.call(&Value::Undefined, &[Value::from("done")]).unwrap();
        host.realm.run_until_idle();
        assert_eq!(Awaitable::value(&deferred.promise).unwrap(), Value::from("done"));
    });
}
