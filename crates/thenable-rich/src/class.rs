//! The `Bluebird` class: constructor, statics and prototype members.

use std::rc::Weak;

use thenable_runtime::{
    Completion, ErrorKind, Function, PromiseClass, Value, arg, type_error,
};

use crate::config::RichConfig;
use crate::filter::split_last;
use crate::promise::RichPromise;
use crate::timing::millis;
use crate::{CLASS_NAME, LibraryInner, RichLibrary, VERSION, collection, disposer, node, timing};

type StaticBody = fn(&RichLibrary, &[Value]) -> Completion;
type MethodBody = fn(&RichPromise, &[Value]) -> Completion;

pub(crate) fn build(weak: Weak<LibraryInner>, config: &RichConfig) -> PromiseClass {
    let class = PromiseClass::new(CLASS_NAME, {
        let weak = weak.clone();
        move |_, executor| {
            let library = RichLibrary::upgrade(&weak)?;
            let (promise, resolver) = RichPromise::pending(&library);
            let (resolve, reject) = resolver.to_functions();
            let on_cancel = {
                let promise = promise.clone();
                Function::new("onCancel", move |_, args| {
                    if let Value::Function(callback) = arg(args, 0) {
                        let event_loop = promise.library().event_loop().clone();
                        promise.on_cancel(move || {
                            if let Err(thrown) = callback.call(&Value::Undefined, &[]) {
                                event_loop.report_uncaught(thrown);
                            }
                        });
                    }
                    Ok(Value::Undefined)
                })
            };
            let args = [resolve.into(), reject.into(), on_cancel.into()];
            if let Err(thrown) = executor.call(&Value::Undefined, &args) {
                resolver.reject(thrown);
            }
            Ok(promise.into())
        }
    });

    class.define_static("Promise", class.clone());
    class.define_static("version", VERSION);
    define_statics(&class, &weak);
    for kind in [
        ErrorKind::TimeoutError,
        ErrorKind::CancellationError,
        ErrorKind::OperationalError,
        ErrorKind::AggregateError,
        ErrorKind::TypeError,
        ErrorKind::RangeError,
    ] {
        class.define_static(kind.name(), Value::ErrorClass(kind));
    }
    class.define_static("RejectionError", Value::ErrorClass(ErrorKind::OperationalError));
    class.define_static("_async", async_marker(weak));

    define_methods(&class, config);
    class
}

fn define_statics(class: &PromiseClass, weak: &Weak<LibraryInner>) {
    let statics: &[(&'static [&'static str], StaticBody)] = &[
        (&["resolve", "fulfilled", "cast"], |lib, args| Ok(lib.resolve(arg(args, 0)).into())),
        (&["reject", "rejected"], |lib, args| Ok(lib.reject(arg(args, 0)).into())),
        (&["defer", "pending"], |lib, _| Ok(deferred(lib))),
        (&["is"], |lib, args| {
            let is = RichPromise::from_value(&arg(args, 0)).is_some_and(|p| p.library().ptr_eq(lib));
            Ok(Value::Bool(is))
        }),
        (&["bind"], |lib, args| Ok(lib.resolve(arg(args, 1)).bind(arg(args, 0)).into())),
        (&["all"], |lib, args| Ok(collection::all(lib, arg(args, 0)).into())),
        (&["allSettled"], |lib, args| Ok(collection::all_settled(lib, arg(args, 0)).into())),
        (&["any"], |lib, args| Ok(collection::any(lib, arg(args, 0)).into())),
        (&["race"], |lib, args| Ok(collection::race(lib, arg(args, 0)).into())),
        (&["some"], |lib, args| Ok(collection::some(lib, arg(args, 0), arg(args, 1)).into())),
        (&["map"], |lib, args| {
            Ok(collection::map(lib, arg(args, 0), arg(args, 1), arg(args, 2)).into())
        }),
        (&["mapSeries"], |lib, args| Ok(collection::map_series(lib, arg(args, 0), arg(args, 1)).into())),
        (&["reduce"], |lib, args| {
            let initial = Some(arg(args, 2)).filter(|v| !v.is_undefined());
            Ok(collection::reduce(lib, arg(args, 0), arg(args, 1), initial).into())
        }),
        (&["filter"], |lib, args| {
            Ok(collection::filter(lib, arg(args, 0), arg(args, 1), arg(args, 2)).into())
        }),
        (&["each"], |lib, args| Ok(collection::each(lib, arg(args, 0), arg(args, 1)).into())),
        (&["props"], |lib, args| Ok(collection::props(lib, arg(args, 0)).into())),
        (&["settle"], |lib, args| Ok(collection::settle(lib, arg(args, 0)).into())),
        (&["join"], |lib, args| Ok(collection::join(lib, args.to_vec()).into())),
        (&["try", "attempt"], |lib, args| Ok(attempt(lib, &arg(args, 0), &Value::Undefined, &[]).into())),
        (&["method"], |lib, args| {
            let target = require_function(&arg(args, 0))?;
            let lib = lib.clone();
            let name = target.name();
            let wrapped = Function::new(&name, move |this, args| {
                Ok(attempt(&lib, &Value::Function(target.clone()), this, args).into())
            });
            Ok(wrapped.into())
        }),
        (&["promisify"], |lib, args| {
            let target = require_function(&arg(args, 0))?;
            let options = arg(args, 1);
            let context = Some(options.get("context")).filter(|c| !c.is_undefined());
            Ok(node::promisify(lib, target, &options, context).into())
        }),
        (&["promisifyAll"], |lib, args| Ok(node::promisify_all(lib, &arg(args, 0), &arg(args, 1)))),
        (&["fromCallback", "fromNode"], |lib, args| {
            let resolver = require_function(&arg(args, 0))?;
            Ok(node::from_callback(lib, resolver, &arg(args, 1)).into())
        }),
        (&["delay"], |lib, args| Ok(timing::delay(lib, millis(&arg(args, 0)), arg(args, 1)).into())),
        (&["using"], |lib, args| {
            let (resources, body) = split_last(args);
            let body = require_function(&body)?;
            if let [Value::Array(items)] = resources.as_slice() {
                let items = items.to_vec();
                let spread = body;
                let body = Function::new("using", move |this, args| {
                    spread.call(this, &[Value::array(args.to_vec())])
                });
                return Ok(disposer::using(lib, items, body).into());
            }
            Ok(disposer::using(lib, resources, body).into())
        }),
    ];
    for &(names, body) in statics {
        let weak = weak.clone();
        let function = Function::new(names[0], move |_, args| {
            let library = RichLibrary::upgrade(&weak)?;
            body(&library, args)
        });
        for name in names {
            class.define_static(name, function.clone());
        }
    }
}

fn define_methods(class: &PromiseClass, config: &RichConfig) {
    let methods: &[(&'static [&'static str], MethodBody)] = &[
        (&["then"], |p, args| Ok(p.then_fn(function(args, 0), function(args, 1)).into())),
        (&["done"], |p, args| {
            p.done(function(args, 0), function(args, 1));
            Ok(Value::Undefined)
        }),
        (&["catch", "caught"], |p, args| {
            let (filters, handler) = split_last(args);
            match handler {
                Value::Function(handler) => Ok(p.caught(filters, handler).into()),
                _ => Ok(p.then_fn(None, None).into()),
            }
        }),
        (&["error"], |p, args| match function(args, 0) {
            Some(handler) => Ok(p.error(handler).into()),
            None => Ok(p.then_fn(None, None).into()),
        }),
        (&["finally", "lastly"], |p, args| match function(args, 0) {
            Some(handler) => Ok(p.finally(handler).into()),
            None => Ok(p.then_fn(None, None).into()),
        }),
        (&["tap"], |p, args| Ok(p.tap(require_function(&arg(args, 0))?).into())),
        (&["tapCatch"], |p, args| {
            let (filters, handler) = split_last(args);
            Ok(p.tap_catch(filters, require_function(&handler)?).into())
        }),
        (&["spread"], |p, args| Ok(p.spread(require_function(&arg(args, 0))?).into())),
        (&["get"], |p, args| Ok(p.get(arg(args, 0)).into())),
        (&["call"], |p, args| {
            let rest = args.get(1..).map(<[Value]>::to_vec).unwrap_or_default();
            Ok(p.call(arg(args, 0), rest).into())
        }),
        (&["bind"], |p, args| Ok(p.bind(arg(args, 0)).into())),
        (&["delay"], |p, args| Ok(p.delay(millis(&arg(args, 0))).into())),
        (&["timeout"], |p, args| Ok(p.timeout(millis(&arg(args, 0)), arg(args, 1)).into())),
        (&["nodeify", "asCallback"], |p, args| Ok(p.nodeify(arg(args, 0), &arg(args, 1)).into())),
        (&["disposer"], |p, args| Ok(p.disposer(require_function(&arg(args, 0))?))),
        (&["thenReturn", "return"], |p, args| Ok(p.then_return(arg(args, 0)).into())),
        (&["thenThrow", "throw"], |p, args| Ok(p.then_throw(arg(args, 0)).into())),
        (&["catchReturn"], |p, args| {
            let (filters, value) = split_last(args);
            Ok(p.catch_return(filters, value).into())
        }),
        (&["catchThrow"], |p, args| {
            let (filters, reason) = split_last(args);
            Ok(p.catch_throw(filters, reason).into())
        }),
        (&["reflect"], |p, _| Ok(p.reflect().into())),
        (&["all"], |p, _| Ok(p.all().into())),
        (&["any"], |p, _| Ok(p.any().into())),
        (&["race"], |p, _| Ok(p.race().into())),
        (&["settle"], |p, _| Ok(p.settle_all().into())),
        (&["props"], |p, _| Ok(p.props().into())),
        (&["some"], |p, args| Ok(p.some(arg(args, 0)).into())),
        (&["map"], |p, args| Ok(p.map(arg(args, 0), arg(args, 1)).into())),
        (&["filter"], |p, args| Ok(p.filter(arg(args, 0), arg(args, 1)).into())),
        (&["mapSeries"], |p, args| Ok(p.map_series(arg(args, 0)).into())),
        (&["each"], |p, args| Ok(p.each(arg(args, 0)).into())),
        (&["reduce"], |p, args| {
            let initial = Some(arg(args, 1)).filter(|v| !v.is_undefined());
            Ok(p.reduce(arg(args, 0), initial).into())
        }),
        (&["isFulfilled"], |p, _| Ok(p.is_fulfilled().into())),
        (&["isRejected"], |p, _| Ok(p.is_rejected().into())),
        (&["isPending"], |p, _| Ok(p.is_pending().into())),
        (&["isResolved"], |p, _| Ok(p.is_resolved().into())),
        (&["isCancelled"], |p, _| Ok(p.is_cancelled().into())),
        (&["isCancellable"], |p, _| Ok(p.is_cancellable().into())),
        (&["value"], |p, _| p.value()),
        (&["reason"], |p, _| p.reason()),
        (&["cancel", "break"], |p, _| {
            p.cancel();
            Ok(Value::Undefined)
        }),
        (&["suppressUnhandledRejections"], |p, _| {
            p.suppress_unhandled_rejections();
            Ok(Value::Undefined)
        }),
        (&["toJSON"], |p, _| Ok(p.to_json())),
        (&["toString"], |_, _| Ok(Value::from("[object Promise]"))),
        (&["isBound"], |p, _| Ok((!p.bound().is_undefined()).into())),
        (&["_setAsyncGuaranteed"], |p, _| {
            p.set_async_guaranteed();
            Ok(Value::Undefined)
        }),
    ];
    let prototype = class.prototype().members();
    for &(names, body) in methods {
        if names[0] == "_setAsyncGuaranteed" && !config.async_guaranteed_hook {
            continue;
        }
        let method = names[0];
        let function = Function::new(method, move |this, args| body(&receiver(this, method)?, args));
        for name in names {
            prototype.define(name, function.clone());
        }
    }
}

fn receiver(this: &Value, method: &str) -> Result<RichPromise, Value> {
    RichPromise::from_value(this).ok_or_else(|| {
        type_error(format!(
            "Method {CLASS_NAME}.prototype.{method} called on incompatible receiver {this}"
        ))
    })
}

fn function(args: &[Value], index: usize) -> Option<Function> {
    match arg(args, index) {
        Value::Function(f) => Some(f),
        _ => None,
    }
}

fn require_function(value: &Value) -> Result<Function, Value> {
    match value {
        Value::Function(f) => Ok(f.clone()),
        other => Err(type_error(format!(
            "expecting a function but got {}",
            other.object_tag()
        ))),
    }
}

/// Calls `target`, turning its return or throw into a promise.
fn attempt(library: &RichLibrary, target: &Value, this: &Value, args: &[Value]) -> RichPromise {
    let target = match require_function(target) {
        Ok(target) => target,
        Err(reason) => return library.reject(reason),
    };
    match target.call(this, args) {
        Ok(value) => library.resolve(value),
        Err(thrown) => library.reject(thrown),
    }
}

/// `{promise, resolve, reject, fulfill}`
fn deferred(library: &RichLibrary) -> Value {
    let (promise, resolver) = library.pending();
    let (resolve, reject) = resolver.to_functions();
    Value::object([
        ("promise", promise.into()),
        ("resolve", resolve.clone().into()),
        ("fulfill", resolve.into()),
        ("reject", reject.into()),
    ])
}

/// Scheduler handle; not part of the public surface.
fn async_marker(weak: Weak<LibraryInner>) -> Value {
    let has_pending_work = Function::new("hasPendingWork", move |_, _| {
        let library = RichLibrary::upgrade(&weak)?;
        Ok(library.event_loop().has_pending_work().into())
    });
    Value::object([("hasPendingWork", Value::from(has_pending_work))])
}
