//! Node-style Callbacks
//!
//! Bridges `(err, value)` callbacks and promises in both directions.

use thenable_runtime::{ErrorKind, ErrorValue, Function, Object, Value};

use crate::RichLibrary;
use crate::promise::RichPromise;

/// Rejection reason for a callback error, marked operational.
fn operational(reason: Value) -> Value {
    let message = match &reason {
        Value::Error(e) => e.message().to_string(),
        other => other.to_string(),
    };
    ErrorValue::with_cause(ErrorKind::OperationalError, message, reason).into()
}

/// Pending promise and the `(err, ...values)` callback settling it.
fn node_callback(library: &RichLibrary, multi_args: bool) -> (RichPromise, Function) {
    let (derived, resolver) = RichPromise::pending(library);
    let callback = Function::new("callback", move |_, args| {
        let err = args.first().cloned().unwrap_or_default();
        if !err.is_nullish() {
            resolver.reject(operational(err));
        } else if multi_args {
            resolver.resolve(Value::array(args.iter().skip(1).cloned()));
        } else {
            resolver.resolve(args.get(1).cloned().unwrap_or_default());
        }
        Ok(Value::Undefined)
    });
    (derived, callback)
}

fn multi_args(options: &Value) -> bool {
    options.get("multiArgs").is_truthy()
}

/// `promisify(fn)`: the returned function appends a node callback and
/// returns a promise.
pub fn promisify(library: &RichLibrary, target: Function, options: &Value, receiver: Option<Value>) -> Function {
    let library = library.clone();
    let multi = multi_args(options);
    let name = target.name();
    Function::new(&name, move |this, args| {
        let (promise, callback) = node_callback(&library, multi);
        let mut call_args = args.to_vec();
        call_args.push(callback.into());
        let this = receiver.clone().unwrap_or_else(|| this.clone());
        if let Err(thrown) = target.call(&this, &call_args) {
            return Ok(RichPromise::rejected(&library, thrown).into());
        }
        Ok(promise.into())
    })
}

/// Adds an `<name>Async` promisified twin for every method of `target`.
pub fn promisify_all(library: &RichLibrary, target: &Value, options: &Value) -> Value {
    if let Value::Object(object) = target {
        for (key, value) in object.entries() {
            let Value::Function(method) = value else { continue };
            if key.ends_with("Async") {
                continue;
            }
            let twin = format!("{key}Async");
            if !object.has(&twin) {
                object.set(&twin, promisify(library, method, options, Some(target.clone())).into());
            }
        }
    }
    target.clone()
}

/// `fromCallback(resolver)`: calls `resolver(callback)` and settles from it.
pub fn from_callback(library: &RichLibrary, resolver: Function, options: &Value) -> RichPromise {
    let (promise, callback) = node_callback(library, multi_args(options));
    if let Err(thrown) = resolver.call(&Value::Undefined, &[callback.into()]) {
        return RichPromise::rejected(library, thrown);
    }
    promise
}

impl RichPromise {
    /// Calls `callback(err)` or `callback(null, value)` once settled. With
    /// `{spread: true}` array values become separate arguments. Errors
    /// thrown by the callback are reported as uncaught.
    pub fn nodeify(&self, callback: Value, options: &Value) -> RichPromise {
        let Value::Function(callback) = callback else {
            return self.clone();
        };
        let spread = options.get("spread").is_truthy();
        let event_loop = self.event_loop().clone();
        let receiver = self.bound();
        self.observe(move |outcome| {
            let args = match outcome {
                Ok(Value::Array(items)) if spread => {
                    std::iter::once(Value::Null).chain(items.to_vec()).collect::<Vec<_>>()
                }
                Ok(value) => vec![Value::Null, value],
                Err(reason) => vec![reason],
            };
            if let Err(thrown) = callback.call(&receiver, &args) {
                event_loop.report_uncaught(thrown);
            }
        });
        self.clone()
    }
}

/// Plain object of node-style methods, for tests and demos.
pub fn callback_api(entries: Vec<(&str, Function)>) -> Value {
    let object = Object::new();
    for (key, method) in entries {
        object.set(key, method.into());
    }
    object.into()
}
