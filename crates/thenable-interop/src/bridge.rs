//! Bridge
//!
//! Explicit entry point to the interop layer. Building a bridge augments the
//! rich class and then the native class; afterwards both answer the full
//! catalog and convert into each other.

use std::rc::Rc;

use thenable_rich::RichLibrary;
use thenable_runtime::{EventLoop, PromiseClass, PromiseRef, Realm, Value};

use crate::augment;
use crate::capability::CapabilityDescriptor;
use crate::convert;
use crate::error::Result;
use crate::identity;
use crate::members::statics::Deferred;
use crate::members::{Context, Strategy};
use crate::suppress;

pub struct Bridge {
    native: PromiseClass,
    rich: PromiseClass,
    context: Rc<Context>,
}

impl Bridge {
    /// Installs the bridge with the strategy the host supports.
    pub fn install(native: &PromiseClass, rich: &PromiseClass, event_loop: &EventLoop) -> Result<Self> {
        let strategy = Strategy::detect(event_loop.capabilities());
        Self::with_strategy(native, rich, event_loop, strategy)
    }

    pub fn with_strategy(
        native: &PromiseClass,
        rich: &PromiseClass,
        event_loop: &EventLoop,
        strategy: Strategy,
    ) -> Result<Self> {
        tracing::info!(native = native.name(), rich = rich.name(), ?strategy, "installing promise bridge");
        let bridge = Self {
            native: native.clone(),
            rich: rich.clone(),
            context: Context::new(native, rich, strategy, event_loop),
        };
        bridge.augment(&Value::Class(rich.clone()))?;
        bridge.augment(&Value::Class(native.clone()))?;
        Ok(bridge)
    }

    pub fn for_realm(realm: &Realm, library: &RichLibrary) -> Result<Self> {
        Self::install(realm.promise_class(), library.class(), realm.event_loop())
    }

    /// Augments another promise class with this bridge's members.
    pub fn augment(&self, target: &Value) -> Result<PromiseClass> {
        augment::augment(&self.context, target)
    }

    pub fn describe(&self, class: &PromiseClass) -> CapabilityDescriptor {
        CapabilityDescriptor::probe(class)
    }

    pub fn is(&self, value: &Value) -> bool {
        identity::is(value)
    }

    pub fn suppress(&self, value: &Value) -> Result<()> {
        Ok(suppress::suppress(value)?)
    }

    /// A pending native promise with its resolving functions.
    pub fn defer(&self) -> Result<Deferred> {
        Deferred::new(&self.native)
    }

    pub fn to_rich(&self, promise: &PromiseRef) -> Result<PromiseRef> {
        convert::to_rich(promise, &self.rich)
    }

    pub fn to_native(&self, promise: &PromiseRef) -> Result<PromiseRef> {
        convert::to_native(promise, &self.native)
    }

    pub fn strategy(&self) -> Strategy {
        self.context.strategy
    }

    pub fn native_class(&self) -> &PromiseClass {
        &self.native
    }

    pub fn rich_class(&self) -> &PromiseClass {
        &self.rich
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("native", &self.native)
            .field("rich", &self.rich)
            .field("strategy", &self.context.strategy)
            .finish()
    }
}
