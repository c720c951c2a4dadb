//! thenable Rich Promises
//!
//! A promise library with a wide surface: cancellation, bound receivers,
//! filtered catches, collection combinators, timers, node-style callbacks,
//! resource disposers and synchronous inspection.
//!
//! Every library instance owns its own `Bluebird` class. Script code reaches
//! the library through that class; Rust code can also use [`RichPromise`]
//! directly.

use std::rc::{Rc, Weak};

use thenable_runtime::{EventLoop, PromiseClass, Realm, Value, type_error};

mod class;
pub mod collection;
pub mod config;
pub mod disposer;
pub mod filter;
pub mod inspection;
pub mod node;
pub mod promise;
pub mod timing;

pub use config::RichConfig;
pub use disposer::Disposer;
pub use promise::{RichPromise, RichResolver};

/// Version reported by the class's `version` static.
pub const VERSION: &str = "3.7.2";

/// Class name of rich promises.
pub const CLASS_NAME: &str = "Bluebird";

/// Handle to a library instance
#[derive(Clone)]
pub struct RichLibrary(Rc<LibraryInner>);

pub(crate) struct LibraryInner {
    event_loop: EventLoop,
    config: RichConfig,
    class: PromiseClass,
}

impl RichLibrary {
    pub fn new(event_loop: &EventLoop, config: RichConfig) -> Self {
        tracing::debug!(?config, "creating rich promise library");
        Self(Rc::new_cyclic(|weak| LibraryInner {
            class: class::build(weak.clone(), &config),
            event_loop: event_loop.clone(),
            config,
        }))
    }

    pub fn for_realm(realm: &Realm) -> Self {
        Self::new(realm.event_loop(), RichConfig::default())
    }

    pub(crate) fn upgrade(weak: &Weak<LibraryInner>) -> Result<RichLibrary, Value> {
        weak.upgrade()
            .map(RichLibrary)
            .ok_or_else(|| type_error("promise library has been dropped"))
    }

    /// The `Bluebird` class
    pub fn class(&self) -> &PromiseClass {
        &self.0.class
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.0.event_loop
    }

    pub fn config(&self) -> &RichConfig {
        &self.0.config
    }

    pub fn pending(&self) -> (RichPromise, RichResolver) {
        RichPromise::pending(self)
    }

    pub fn resolve(&self, value: impl Into<Value>) -> RichPromise {
        RichPromise::resolved(self, value.into())
    }

    pub fn reject(&self, reason: impl Into<Value>) -> RichPromise {
        RichPromise::rejected(self, reason.into())
    }

    pub fn ptr_eq(&self, other: &RichLibrary) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for RichLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RichLibrary")
            .field("class", &self.0.class)
            .field("config", &self.0.config)
            .finish()
    }
}
