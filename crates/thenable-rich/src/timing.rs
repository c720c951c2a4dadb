//! Timers
//!
//! `delay` and `timeout`, scheduled on the event loop's virtual clock.

use std::cell::Cell;
use std::rc::Rc;

use thenable_runtime::{ErrorKind, Value, error};

use crate::RichLibrary;
use crate::promise::RichPromise;

/// Milliseconds from a script value; negatives and NaN clamp to zero.
pub fn millis(value: &Value) -> u64 {
    match value.as_number() {
        Some(ms) if ms > 0.0 => ms as u64,
        _ => 0,
    }
}

/// Fulfills with `value` after `ms`. A thenable value is awaited first.
pub fn delay(library: &RichLibrary, ms: u64, value: Value) -> RichPromise {
    if value.is_thenable() {
        let lib = library.clone();
        return RichPromise::resolved(library, value)
            .then_with(move |outcome| Ok(delay(&lib, ms, outcome?).into()));
    }
    let (promise, resolver) = RichPromise::pending(library);
    library
        .event_loop()
        .set_timeout(ms, "bluebird delay", move || resolver.resolve(value));
    promise
}

impl RichPromise {
    /// Delays fulfillment; rejections pass through immediately.
    pub fn delay(&self, ms: u64) -> RichPromise {
        let library = self.library().clone();
        self.then_with(move |outcome| Ok(delay(&library, ms, outcome?).into()))
    }

    /// Rejects with a `TimeoutError` unless settled within `ms`, then
    /// cancels this promise. `message` may be a string or an error value.
    pub fn timeout(&self, ms: u64, message: Value) -> RichPromise {
        let (derived, resolver) = self.derive();
        let event_loop = self.event_loop().clone();
        let fired = Rc::new(Cell::new(false));
        let timer = {
            let (source, resolver, fired) = (self.clone(), resolver.clone(), fired.clone());
            event_loop.set_timeout(ms, "bluebird timeout", move || {
                fired.set(true);
                let reason = match message {
                    Value::Error(_) => message,
                    Value::String(text) => error(ErrorKind::TimeoutError, &*text),
                    _ => error(ErrorKind::TimeoutError, "operation timed out"),
                };
                tracing::trace!(promise = %source.id(), ms, "timed out");
                resolver.reject(reason);
                source.cancel();
            })
        };
        self.observe(move |outcome| {
            if !fired.get() {
                event_loop.clear_timer(timer);
            }
            resolver.settle(outcome);
        });
        derived
    }
}
