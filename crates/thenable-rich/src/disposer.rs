//! Resource Disposers
//!
//! `promise.disposer(fn)` pairs a resource promise with its cleanup;
//! `using(resources..., body)` acquires them all, runs the body, then
//! disposes every acquired resource before passing the body's outcome on.

use std::rc::Rc;

use thenable_runtime::{Completion, Function, HostObject, PromiseState, Value};

use crate::RichLibrary;
use crate::collection::gather;
use crate::inspection::inspection;
use crate::promise::RichPromise;

const TYPE_NAME: &str = "Disposer";

/// Resource promise plus cleanup function
pub struct Disposer {
    resource: RichPromise,
    dispose: Function,
}

impl Disposer {
    pub fn resource(&self) -> &RichPromise {
        &self.resource
    }

    fn from_value(value: &Value) -> Option<Rc<Disposer>> {
        match value {
            Value::Host(host) if host.type_name() == TYPE_NAME => host.downcast::<Disposer>(),
            _ => None,
        }
    }
}

impl RichPromise {
    /// Wraps this resource promise for use with [`using`].
    pub fn disposer(&self, dispose: Function) -> Value {
        let disposer = Disposer { resource: self.clone(), dispose };
        Value::Host(HostObject::new(TYPE_NAME, disposer))
    }
}

/// Acquires `resources`, calls `body` with their values and disposes them
/// once the body's promise settles. Plain values and promises are accepted
/// alongside disposers.
pub fn using(library: &RichLibrary, resources: Vec<Value>, body: Function) -> RichPromise {
    let disposers: Vec<Option<Rc<Disposer>>> = resources.iter().map(Disposer::from_value).collect();
    let acquiring = resources
        .iter()
        .zip(&disposers)
        .map(|(value, disposer)| match disposer {
            Some(d) => d.resource.clone().into(),
            None => value.clone(),
        })
        .collect();
    let (result, resolver) = RichPromise::pending(library);
    let lib = library.clone();
    gather(library, acquiring, move |acquired: Vec<Completion>| {
        if let Some(reason) = acquired.iter().find_map(|c| c.clone().err()) {
            let release = dispose_all(&lib, &disposers, &acquired, &Err(reason.clone()));
            release.observe(move |_| resolver.reject(reason));
            return;
        }
        let values: Vec<Value> = acquired.iter().filter_map(|c| c.clone().ok()).collect();
        let outcome = match body.call(&Value::Undefined, &values) {
            Ok(returned) => RichPromise::resolved(&lib, returned),
            Err(thrown) => RichPromise::rejected(&lib, thrown),
        };
        let lib = lib.clone();
        outcome.observe(move |outcome| {
            let release = dispose_all(&lib, &disposers, &acquired, &outcome);
            release.observe(move |disposed| match disposed {
                Err(reason) => resolver.reject(reason),
                Ok(_) => resolver.settle(outcome),
            });
        });
    });
    result
}

/// Calls each acquired resource's dispose function with the resource and an
/// inspection of the body's outcome, in reverse acquisition order.
fn dispose_all(
    library: &RichLibrary,
    disposers: &[Option<Rc<Disposer>>],
    acquired: &[Completion],
    outcome: &Completion,
) -> RichPromise {
    let snapshot = inspection(&PromiseState::from(outcome.clone()));
    let mut pending = Vec::new();
    for (disposer, resource) in disposers.iter().zip(acquired).rev() {
        let (Some(disposer), Ok(resource)) = (disposer, resource) else {
            continue;
        };
        tracing::trace!(resource = %disposer.resource.id(), "disposing");
        match disposer.dispose.call(&Value::Undefined, &[resource.clone(), snapshot.clone()]) {
            Ok(returned) => pending.push(returned),
            Err(thrown) => pending.push(RichPromise::rejected(library, thrown).into()),
        }
    }
    crate::collection::all(library, Value::array(pending))
}
