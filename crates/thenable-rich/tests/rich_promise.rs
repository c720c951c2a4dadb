//! Rich promise behavior tests
//!
//! Class surface, filtered catches, cancellation, timers, callbacks and
//! resource disposal.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use thenable_rich::*;
use thenable_runtime::*;

fn library() -> RichLibrary {
    RichLibrary::new(&EventLoop::default(), RichConfig::default())
}

fn log() -> Rc<RefCell<Vec<String>>> {
    Rc::new(RefCell::new(Vec::new()))
}

fn push(log: &Rc<RefCell<Vec<String>>>, entry: &str) -> Handler {
    let (log, entry) = (log.clone(), entry.to_string());
    Box::new(move |v| {
        log.borrow_mut().push(format!("{entry}:{v}"));
        Ok(v)
    })
}

fn returning(value: Value) -> Function {
    Function::new("handler", move |_, _| Ok(value.clone()))
}

fn rich(value: &Value) -> RichPromise {
    RichPromise::from_value(value).expect("rich promise")
}

fn rejection_kind(state: &PromiseState) -> Option<ErrorKind> {
    match state {
        PromiseState::Rejected(Value::Error(e)) => Some(e.kind()),
        _ => None,
    }
}

// ============================================================================
// CLASS SURFACE
// ============================================================================

#[test]
fn test_class_aliases() {
    let lib = library();
    let class = lib.class();
    assert!(matches!(class.get_static("Promise"), Some(Value::Class(c)) if c.ptr_eq(class)));
    assert_eq!(class.get_static("version"), Some(Value::from(VERSION)));

    let same = |a: &str, b: &str| class.get_static(a).unwrap().same(&class.get_static(b).unwrap());
    assert!(same("rejected", "reject"));
    assert!(same("fulfilled", "resolve"));
    assert!(same("pending", "defer"));
    assert!(same("attempt", "try"));
    assert!(matches!(
        class.get_static("RejectionError"),
        Some(Value::ErrorClass(ErrorKind::OperationalError))
    ));
}

#[test]
fn test_prototype_aliases() {
    let lib = library();
    let proto = lib.class().prototype();
    let same = |a: &str, b: &str| proto.get(a).unwrap().same(&proto.get(b).unwrap());
    assert!(same("caught", "catch"));
    assert!(same("lastly", "finally"));
    assert!(same("break", "cancel"));
    assert!(same("asCallback", "nodeify"));
    assert!(proto.has_method("_setAsyncGuaranteed"));
}

#[test]
fn test_async_guaranteed_hook_can_be_hidden() {
    let config = RichConfig { async_guaranteed_hook: false, ..RichConfig::default() };
    let lib = RichLibrary::new(&EventLoop::default(), config);
    assert!(!lib.class().prototype().has_method("_setAsyncGuaranteed"));
    assert!(lib.class().prototype().has_method("then"));
}

#[test]
fn test_constructor_settles_synchronously() {
    let lib = library();
    let executor = Function::new("executor", |_, args| {
        arg(args, 0).as_function().unwrap().call(&Value::Undefined, &[Value::from(3)])
    });
    let p = rich(&lib.class().construct(executor).unwrap());
    assert!(p.is_fulfilled());
    assert_eq!(p.value(), Ok(Value::from(3)));
}

#[test]
fn test_constructor_executor_throw_rejects() {
    let lib = library();
    let executor = Function::new("executor", |_, _| Err(Value::from("boom")));
    let p = rich(&lib.class().construct(executor).unwrap());
    assert_eq!(p.reason(), Ok(Value::from("boom")));
}

#[test]
fn test_inspection_throws_on_wrong_state() {
    let lib = library();
    let (p, _resolver) = lib.pending();
    assert!(p.is_pending());
    assert!(p.value().is_err());
    assert!(p.reason().is_err());

    let fulfilled = lib.resolve(1);
    assert!(fulfilled.reason().is_err());
    assert!(fulfilled.is_resolved());
}

#[test]
fn test_bit_field_marker() {
    let lib = library();
    let bits = lib.resolve(1).to_ref().get("_bitField").and_then(|v| v.as_number());
    assert_eq!(bits, Some(f64::from(0x0200_0000)));
}

#[test]
fn test_is_checks_library() {
    let lib = library();
    let other = library();
    let mine = lib.resolve(1);
    assert_eq!(lib.class().call_static("is", &[mine.clone().into()]), Ok(Value::Bool(true)));
    assert_eq!(other.class().call_static("is", &[mine.into()]), Ok(Value::Bool(false)));
    assert_eq!(lib.class().call_static("is", &[Value::from(1)]), Ok(Value::Bool(false)));
}

#[test]
fn test_defer_shape() {
    let lib = library();
    let deferred = lib.class().call_static("defer", &[]).unwrap();
    let p = rich(&deferred.get("promise"));
    assert!(p.is_pending());
    deferred
        .get("fulfill")
        .as_function()
        .unwrap()
        .call(&Value::Undefined, &[Value::from(5)])
        .unwrap();
    assert_eq!(p.value(), Ok(Value::from(5)));
}

#[test]
fn test_dynamic_then_through_prototype() {
    let lib = library();
    let seen = log();
    let recorder = {
        let seen = seen.clone();
        Function::new("recorder", move |_, args| {
            seen.borrow_mut().push(arg(args, 0).to_string());
            Ok(Value::Undefined)
        })
    };
    lib.resolve("x").to_ref().then(Some(recorder), None).unwrap();
    lib.event_loop().run_microtasks();
    assert_eq!(*seen.borrow(), ["x"]);
}

// ============================================================================
// CHAINING
// ============================================================================

#[test]
fn test_caught_with_class_filters() {
    let lib = library();
    let skipped = Rc::new(Cell::new(false));
    let range_handler = {
        let skipped = skipped.clone();
        Function::new("range", move |_, _| {
            skipped.set(true);
            Ok(Value::Undefined)
        })
    };
    let p = lib
        .reject(type_error("bad"))
        .caught(vec![Value::ErrorClass(ErrorKind::RangeError)], range_handler)
        .caught(vec![Value::ErrorClass(ErrorKind::TypeError)], returning(Value::from("handled")));
    lib.event_loop().run_until_idle();
    assert_eq!(p.value(), Ok(Value::from("handled")));
    assert!(!skipped.get());
}

#[test]
fn test_caught_through_class_with_many_filters() {
    let lib = library();
    let rejected = lib.reject(range_error("out"));
    let result = rejected
        .to_ref()
        .invoke(
            "catch",
            &[
                Value::ErrorClass(ErrorKind::TypeError),
                Value::ErrorClass(ErrorKind::RangeError),
                returning(Value::from("caught")).into(),
            ],
        )
        .unwrap();
    lib.event_loop().run_until_idle();
    assert_eq!(rich(&result).value(), Ok(Value::from("caught")));
}

#[test]
fn test_throwing_predicate_replaces_reason() {
    let lib = library();
    let predicate = Function::new("predicate", |_, _| Err(Value::from("replaced")));
    let p = lib
        .reject(Value::from("original"))
        .caught(vec![predicate.into()], returning(Value::Undefined));
    lib.event_loop().run_until_idle();
    assert_eq!(p.reason(), Ok(Value::from("replaced")));
}

#[test]
fn test_error_catches_operational_only() {
    let lib = library();
    let plain = lib.reject(error(ErrorKind::Error, "plain")).error(returning(Value::from(1)));
    let operational = lib
        .reject(error(ErrorKind::OperationalError, "io"))
        .error(returning(Value::from(2)));
    plain.suppress_unhandled_rejections();
    lib.event_loop().run_until_idle();
    assert!(plain.is_rejected());
    assert_eq!(operational.value(), Ok(Value::from(2)));
}

#[test]
fn test_bound_receiver_reaches_handlers() {
    let lib = library();
    let receiver = Value::object([("name", Value::from("ctx"))]);
    let read_name = Function::new("readName", |this, _| Ok(this.get("name")));
    let p = lib.resolve(1).bind(receiver).then_fn(Some(read_name), None);
    lib.event_loop().run_until_idle();
    assert_eq!(p.value(), Ok(Value::from("ctx")));
}

#[test]
fn test_spread_awaits_members() {
    let lib = library();
    let sum = Function::new("sum", |_, args| {
        Ok(Value::from(args.iter().filter_map(Value::as_number).sum::<f64>()))
    });
    let input = Value::array([Value::from(1), lib.resolve(2).into()]);
    let p = lib.resolve(input).spread(sum);
    lib.event_loop().run_until_idle();
    assert_eq!(p.value(), Ok(Value::from(3)));
}

#[test]
fn test_get_with_negative_index() {
    let lib = library();
    let input = Value::array([Value::from("a"), Value::from("b"), Value::from("c")]);
    let p = lib.resolve(input).get(Value::from(-1));
    lib.event_loop().run_until_idle();
    assert_eq!(p.value(), Ok(Value::from("c")));
}

#[test]
fn test_tap_passes_value_through() {
    let lib = library();
    let p = lib.resolve(7).tap(returning(Value::from("ignored")));
    lib.event_loop().run_until_idle();
    assert_eq!(p.value(), Ok(Value::from(7)));
}

#[test]
fn test_finally_waits_for_returned_promise() {
    let lib = library();
    let (gate, gate_resolver) = lib.pending();
    let p = lib.resolve(1).finally(returning(gate.into()));
    lib.event_loop().run_microtasks();
    assert!(p.is_pending());
    gate_resolver.resolve(Value::Undefined);
    lib.event_loop().run_microtasks();
    assert_eq!(p.value(), Ok(Value::from(1)));
}

#[test]
fn test_reflect_fulfills_with_inspection() {
    let lib = library();
    let p = lib.reject(Value::from("no")).reflect();
    lib.event_loop().run_until_idle();
    let snapshot = p.value().unwrap();
    let snapshot = snapshot.as_object().unwrap();
    assert_eq!(snapshot.call_method("isRejected", &[]), Ok(Value::Bool(true)));
    assert_eq!(snapshot.call_method("reason", &[]), Ok(Value::from("no")));
}

#[test]
fn test_done_reports_uncaught() {
    let lib = library();
    lib.reject(Value::from("lost")).done(None, None);
    lib.event_loop().run_until_idle();
    assert_eq!(lib.event_loop().take_uncaught_errors(), [Value::from("lost")]);
}

// ============================================================================
// SCHEDULING
// ============================================================================

#[test]
fn test_reactions_are_asynchronous() {
    let lib = library();
    let seen = log();
    lib.resolve(1).then(Some(push(&seen, "then")), None);
    assert!(seen.borrow().is_empty());
    lib.event_loop().run_microtasks();
    assert_eq!(*seen.borrow(), ["then:1"]);
}

#[test]
fn test_async_guaranteed_runs_inline_inside_job() {
    let lib = library();
    let seen = log();
    let (p, resolver) = lib.pending();
    p.set_async_guaranteed();
    p.then(Some(push(&seen, "rich")), None);
    lib.event_loop().queue_microtask("resolve", move || resolver.resolve(Value::from(1)));
    let later = seen.clone();
    lib.event_loop().queue_microtask("later", move || later.borrow_mut().push("later".into()));
    lib.event_loop().run_microtasks();
    assert_eq!(*seen.borrow(), ["rich:1", "later"]);
}

#[test]
fn test_plain_promise_queues_after_pending_jobs() {
    let lib = library();
    let seen = log();
    let (p, resolver) = lib.pending();
    p.then(Some(push(&seen, "rich")), None);
    lib.event_loop().queue_microtask("resolve", move || resolver.resolve(Value::from(1)));
    let later = seen.clone();
    lib.event_loop().queue_microtask("later", move || later.borrow_mut().push("later".into()));
    lib.event_loop().run_microtasks();
    assert_eq!(*seen.borrow(), ["later", "rich:1"]);
}

#[test]
fn test_adopts_native_promise() {
    let realm = Realm::default();
    let lib = RichLibrary::for_realm(&realm);
    let (native, resolvers) = realm.pending();
    let p = lib.resolve(Value::from(native.to_ref()));
    assert!(p.is_pending());
    resolvers.resolve(Value::from("done"));
    realm.run_microtasks();
    assert_eq!(p.value(), Ok(Value::from("done")));
}

#[test]
fn test_circular_resolution_rejects() {
    let lib = library();
    let (p, resolver) = lib.pending();
    resolver.resolve(p.clone().into());
    assert_eq!(rejection_kind(&p.state()), Some(ErrorKind::TypeError));
}

#[test]
fn test_abandoned_adoption_is_freed() {
    let realm = Realm::default();
    let lib = RichLibrary::for_realm(&realm);
    let (native, resolvers) = realm.pending();
    let follower = lib.resolve(Value::from(native.to_ref()));
    let (source_weak, follower_weak) = (native.to_ref().downgrade(), follower.to_ref().downgrade());
    drop((native, resolvers, follower));
    realm.run_until_idle();
    assert!(source_weak.upgrade().is_none());
    assert!(follower_weak.upgrade().is_none());
}

#[test]
fn test_abandoned_chain_is_freed() {
    let lib = library();
    let (parent, resolver) = lib.pending();
    let child = parent.then(None, None);
    let (parent_weak, child_weak) = (parent.to_ref().downgrade(), child.to_ref().downgrade());
    drop((parent, resolver, child));
    assert!(parent_weak.upgrade().is_none());
    assert!(child_weak.upgrade().is_none());
}

// ============================================================================
// CANCELLATION
// ============================================================================

#[test]
fn test_cancel_runs_callbacks_and_propagates() {
    let lib = library();
    let cancelled = Rc::new(Cell::new(false));
    let (p, _resolver) = lib.pending();
    let flag = cancelled.clone();
    p.on_cancel(move || flag.set(true));
    let child = p.then(None, None);
    child.cancel();
    assert!(child.is_cancelled());
    assert!(p.is_cancelled());
    assert!(cancelled.get());
    assert_eq!(p.bit_field() & 0x0001_0000, 0x0001_0000);
    lib.event_loop().run_until_idle();
    assert!(lib.event_loop().take_unhandled_rejections().is_empty());
}

#[test]
fn test_executor_on_cancel() {
    let lib = library();
    let cancelled = Rc::new(Cell::new(false));
    let flag = cancelled.clone();
    let executor = Function::new("executor", move |_, args| {
        let flag = flag.clone();
        let callback = Function::new("cleanup", move |_, _| {
            flag.set(true);
            Ok(Value::Undefined)
        });
        arg(args, 2).as_function().unwrap().call(&Value::Undefined, &[callback.into()])
    });
    let p = rich(&lib.class().construct(executor).unwrap());
    p.to_ref().invoke("cancel", &[]).unwrap();
    assert!(cancelled.get());
    assert!(p.is_cancelled());
}

#[test]
fn test_cancellation_disabled() {
    let config = RichConfig { cancellation: false, ..RichConfig::default() };
    let lib = RichLibrary::new(&EventLoop::default(), config);
    let (p, _resolver) = lib.pending();
    assert!(!p.is_cancellable());
    p.cancel();
    assert!(p.is_pending());
}

// ============================================================================
// TIMERS
// ============================================================================

#[test]
fn test_delay() {
    let lib = library();
    let p = lib.resolve(7).delay(50);
    lib.event_loop().run_microtasks();
    assert!(p.is_pending());
    lib.event_loop().tick(50);
    assert_eq!(p.value(), Ok(Value::from(7)));
}

#[test]
fn test_timeout_rejects_and_cancels_source() {
    let lib = library();
    let (p, _resolver) = lib.pending();
    let timed = p.timeout(100, Value::Undefined);
    lib.event_loop().tick(99);
    assert!(timed.is_pending());
    lib.event_loop().tick(1);
    assert_eq!(rejection_kind(&timed.state()), Some(ErrorKind::TimeoutError));
    assert_eq!(timed.reason().unwrap().get("message"), Value::from("operation timed out"));
    assert!(p.is_cancelled());
}

#[test]
fn test_timeout_custom_message() {
    let lib = library();
    let (p, _resolver) = lib.pending();
    let timed = p.timeout(10, Value::from("too slow"));
    lib.event_loop().tick(10);
    assert_eq!(timed.reason().unwrap().get("message"), Value::from("too slow"));
}

#[test]
fn test_timeout_cleared_on_settlement() {
    let lib = library();
    let (p, resolver) = lib.pending();
    let timed = p.timeout(100, Value::Undefined);
    resolver.resolve(Value::from(5));
    lib.event_loop().run_microtasks();
    assert_eq!(timed.value(), Ok(Value::from(5)));
    assert_eq!(lib.event_loop().next_deadline(), None);
}

// ============================================================================
// NODE CALLBACKS
// ============================================================================

fn recorder(seen: &Rc<RefCell<Vec<Value>>>) -> Function {
    let seen = seen.clone();
    Function::new("callback", move |_, args| {
        seen.borrow_mut().extend(args.iter().cloned());
        Ok(Value::Undefined)
    })
}

#[test]
fn test_nodeify_success_and_spread() {
    let lib = library();
    let seen = Rc::new(RefCell::new(Vec::new()));
    lib.resolve(4).nodeify(recorder(&seen).into(), &Value::Undefined);
    lib.event_loop().run_microtasks();
    assert_eq!(*seen.borrow(), [Value::Null, Value::from(4)]);

    seen.borrow_mut().clear();
    let spread = Value::object([("spread", Value::Bool(true))]);
    lib.resolve(Value::array([Value::from(1), Value::from(2)]))
        .nodeify(recorder(&seen).into(), &spread);
    lib.event_loop().run_microtasks();
    assert_eq!(*seen.borrow(), [Value::Null, Value::from(1), Value::from(2)]);
}

#[test]
fn test_nodeify_callback_throw_is_uncaught() {
    let lib = library();
    let throwing = Function::new("callback", |_, _| Err(Value::from("oops")));
    lib.resolve(1).nodeify(throwing.into(), &Value::Undefined);
    lib.event_loop().run_microtasks();
    assert_eq!(lib.event_loop().take_uncaught_errors(), [Value::from("oops")]);
}

fn read_file() -> Function {
    Function::new("readFile", |_, args| {
        let callback = arg(args, 1);
        let callback = callback.as_function().unwrap();
        match arg(args, 0).as_str() {
            Some("missing") => callback.call(&Value::Undefined, &[error(ErrorKind::Error, "ENOENT")]),
            _ => callback.call(&Value::Undefined, &[Value::Null, Value::from(format!("data:{}", arg(args, 0)))]),
        }
    })
}

#[test]
fn test_promisify() {
    let lib = library();
    let promisified = lib.class().call_static("promisify", &[read_file().into()]).unwrap();
    let promisified = promisified.as_function().unwrap();

    let ok = rich(&promisified.call(&Value::Undefined, &[Value::from("a")]).unwrap());
    let failed = rich(&promisified.call(&Value::Undefined, &[Value::from("missing")]).unwrap());
    failed.suppress_unhandled_rejections();
    assert_eq!(ok.value(), Ok(Value::from("data:a")));

    let reason = failed.reason().unwrap();
    assert!(reason.is_instance_of(ErrorKind::OperationalError));
    assert_eq!(reason.get("message"), Value::from("ENOENT"));
    assert!(reason.as_error().and_then(ErrorValue::cause).is_some());
}

#[test]
fn test_promisify_all_adds_async_twins() {
    let lib = library();
    let api = Value::object([("readFile", Value::from(read_file()))]);
    lib.class().call_static("promisifyAll", &[api.clone()]).unwrap();
    let twin = api.get("readFileAsync");
    let result = twin.as_function().unwrap().call(&api, &[Value::from("b")]).unwrap();
    assert_eq!(rich(&result).value(), Ok(Value::from("data:b")));
}

#[test]
fn test_from_callback() {
    let lib = library();
    let resolver = Function::new("resolver", |_, args| {
        arg(args, 0).as_function().unwrap().call(&Value::Undefined, &[Value::Null, Value::from(9)])
    });
    let p = rich(&lib.class().call_static("fromCallback", &[resolver.into()]).unwrap());
    assert_eq!(p.value(), Ok(Value::from(9)));
}

#[test]
fn test_attempt_captures_throw() {
    let lib = library();
    let throwing = Function::new("throwing", |_, _| Err(Value::from("thrown")));
    let p = rich(&lib.class().call_static("try", &[throwing.into()]).unwrap());
    p.suppress_unhandled_rejections();
    assert_eq!(p.reason(), Ok(Value::from("thrown")));
}

// ============================================================================
// DISPOSERS
// ============================================================================

fn disposing(seen: &Rc<RefCell<Vec<String>>>) -> Function {
    let seen = seen.clone();
    Function::new("dispose", move |_, args| {
        let fulfilled = arg(args, 1).as_object().unwrap().call_method("isFulfilled", &[])?;
        seen.borrow_mut().push(format!("dispose:{}:{fulfilled}", arg(args, 0)));
        Ok(Value::Undefined)
    })
}

#[test]
fn test_using_disposes_after_body() {
    let lib = library();
    let seen = log();
    let resource = lib.resolve("conn").disposer(disposing(&seen));
    let body = {
        let seen = seen.clone();
        Function::new("body", move |_, args| {
            seen.borrow_mut().push(format!("body:{}", arg(args, 0)));
            Ok(Value::from("result"))
        })
    };
    let p = rich(&lib.class().call_static("using", &[resource, body.into()]).unwrap());
    lib.event_loop().run_until_idle();
    assert_eq!(p.value(), Ok(Value::from("result")));
    assert_eq!(*seen.borrow(), ["body:conn", "dispose:conn:true"]);
}

#[test]
fn test_using_disposes_when_body_throws() {
    let lib = library();
    let seen = log();
    let resource = lib.resolve("conn").disposer(disposing(&seen));
    let body = Function::new("body", |_, _| Err(Value::from("failed")));
    let p = rich(&lib.class().call_static("using", &[resource, body.into()]).unwrap());
    p.suppress_unhandled_rejections();
    lib.event_loop().run_until_idle();
    assert_eq!(p.reason(), Ok(Value::from("failed")));
    assert_eq!(*seen.borrow(), ["dispose:conn:false"]);
}
