//! Realm
//!
//! A realm owns one event loop and the intrinsic `Promise` class bound to it.

use std::future::Future;
use std::rc::{Rc, Weak};

use crate::class::PromiseClass;
use crate::config::RuntimeConfig;
use crate::error::type_error;
use crate::event_loop::EventLoop;
use crate::native::{self, NativePromise, Resolvers};
use crate::value::{Completion, Value};

#[derive(Clone)]
pub struct Realm(Rc<RealmInner>);

pub(crate) struct RealmInner {
    event_loop: EventLoop,
    promise: PromiseClass,
}

impl Realm {
    pub fn new(config: RuntimeConfig) -> Self {
        tracing::debug!(?config, "creating realm");
        let event_loop = EventLoop::new(config);
        Self(Rc::new_cyclic(|weak| RealmInner {
            promise: native::intrinsic_class(weak.clone()),
            event_loop,
        }))
    }

    pub(crate) fn upgrade(weak: &Weak<RealmInner>) -> Result<Realm, Value> {
        weak.upgrade()
            .map(Realm)
            .ok_or_else(|| type_error("realm has been dropped"))
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.0.event_loop
    }

    /// The intrinsic `Promise` class
    pub fn promise_class(&self) -> &PromiseClass {
        &self.0.promise
    }

    pub fn pending(&self) -> (NativePromise, Resolvers) {
        NativePromise::pending(self)
    }

    pub fn resolve(&self, value: impl Into<Value>) -> NativePromise {
        NativePromise::resolve(self, value.into())
    }

    pub fn reject(&self, reason: impl Into<Value>) -> NativePromise {
        NativePromise::reject(self, reason.into())
    }

    /// Runs `future` as a suspended task; the returned promise settles
    /// with its outcome.
    pub fn spawn(&self, future: impl Future<Output = Completion> + 'static) -> NativePromise {
        let (promise, resolvers) = self.pending();
        self.0.event_loop.spawn_local(async move {
            resolvers.settle(future.await);
        });
        promise
    }

    pub fn run_microtasks(&self) -> usize {
        self.0.event_loop.run_microtasks()
    }

    pub fn run_until_idle(&self) {
        self.0.event_loop.run_until_idle()
    }

    pub fn ptr_eq(&self, other: &Realm) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Realm {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl std::fmt::Debug for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realm").field("event_loop", &self.0.event_loop).finish()
    }
}
