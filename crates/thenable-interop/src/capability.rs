//! Capability Catalog
//!
//! The fixed set of instance members an augmented class offers, and the
//! one-time conformance check deciding how a class gets augmented.

use std::collections::BTreeSet;
use std::rc::Rc;

use thenable_runtime::{PromiseClass, Value};

use crate::identity;

/// How a default member is implemented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// `then` plus the class's own statics
    SelfSufficient,
    /// Forwarded to the rich conversion
    Delegated,
    /// Answered by the state inspector
    Inspection,
    /// Conversion and suppression entry points
    Identity,
}

macro_rules! catalog {
    ($($variant:ident => $key:literal, $tier:ident;)*) => {
        /// Instance capability
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Capability {
            $($variant,)*
        }

        impl Capability {
            pub const ALL: &'static [Capability] = &[$(Capability::$variant,)*];

            /// Member name on the prototype
            pub fn key(self) -> &'static str {
                match self {
                    $(Capability::$variant => $key,)*
                }
            }

            pub fn tier(self) -> Tier {
                match self {
                    $(Capability::$variant => Tier::$tier,)*
                }
            }
        }
    };
}

catalog! {
    All => "all", SelfSufficient;
    Any => "any", SelfSufficient;
    Race => "race", SelfSufficient;
    Some => "some", SelfSufficient;
    Map => "map", SelfSufficient;
    MapSeries => "mapSeries", SelfSufficient;
    Reduce => "reduce", SelfSufficient;
    Filter => "filter", SelfSufficient;
    Each => "each", SelfSufficient;
    Props => "props", SelfSufficient;
    Settle => "settle", Delegated;
    Catch => "catch", SelfSufficient;
    Caught => "caught", Delegated;
    Error => "error", SelfSufficient;
    Finally => "finally", SelfSufficient;
    Tap => "tap", SelfSufficient;
    TapCatch => "tapCatch", Delegated;
    Spread => "spread", SelfSufficient;
    Get => "get", SelfSufficient;
    Call => "call", SelfSufficient;
    Bind => "bind", Delegated;
    Delay => "delay", Delegated;
    Timeout => "timeout", Delegated;
    Nodeify => "nodeify", Delegated;
    AsCallback => "asCallback", Delegated;
    Disposer => "disposer", Delegated;
    ThenReturn => "thenReturn", SelfSufficient;
    ThenThrow => "thenThrow", SelfSufficient;
    CatchReturn => "catchReturn", Delegated;
    CatchThrow => "catchThrow", Delegated;
    Cancel => "cancel", SelfSufficient;
    IsFulfilled => "isFulfilled", Inspection;
    IsPending => "isPending", Inspection;
    IsRejected => "isRejected", Inspection;
    IsResolved => "isResolved", Inspection;
    IsCancelled => "isCancelled", Inspection;
    IsCancellable => "isCancellable", Inspection;
    Value => "value", Inspection;
    Reason => "reason", Inspection;
    Reflect => "reflect", Delegated;
    ToJson => "toJSON", Inspection;
    ToBluebird => "toBluebird", Identity;
    ToNative => "toNative", Identity;
    SuppressUnhandledRejections => "suppressUnhandledRejections", Identity;
}

impl Capability {
    pub fn from_key(key: &str) -> Option<Capability> {
        Capability::ALL.iter().copied().find(|c| c.key() == key)
    }
}

/// Which augmentation a class receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// The rich library's own class: only conveniences are added
    Rich,
    /// Any other promise class: full augmentation
    Foreign,
}

/// Result of probing a promise class once
#[derive(Debug, Clone)]
pub struct CapabilityDescriptor {
    pub class_name: String,
    pub flavor: Flavor,
    /// Whether the prototype has a callable `then`
    pub thenable: bool,
    pub augmented: bool,
    /// Catalog members already on the prototype
    pub present: BTreeSet<Capability>,
    pub statics: Vec<Rc<str>>,
}

impl CapabilityDescriptor {
    pub fn probe(class: &PromiseClass) -> Self {
        let prototype = class.prototype();
        let present = Capability::ALL
            .iter()
            .copied()
            .filter(|c| prototype.members().contains(c.key()))
            .collect();
        let flavor = if is_rich(class) { Flavor::Rich } else { Flavor::Foreign };
        Self {
            class_name: class.name().to_string(),
            flavor,
            thenable: prototype.has_method("then"),
            augmented: identity::is_augmented(class),
            present,
            statics: class.static_keys(),
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.present.contains(&capability)
    }

    /// Catalog members the class is missing.
    pub fn missing(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.iter().copied().filter(|c| !self.has(*c))
    }
}

/// The rich library's signature: `Promise` is the class itself, a `version`
/// is set, and a resolved instance carries the internal state marker.
fn is_rich(class: &PromiseClass) -> bool {
    let self_referential = matches!(class.get_static("Promise"), Some(Value::Class(c)) if c.ptr_eq(class));
    if !self_referential {
        return false;
    }
    let versioned = class.get_static("version").is_some_and(|v| v.is_truthy());
    if !versioned || !matches!(class.get_static("resolve"), Some(Value::Function(_))) {
        return false;
    }
    match class.resolve(Value::Undefined) {
        Ok(Value::Promise(probe)) => probe.get("_bitField").is_some_and(|bits| bits.is_truthy()),
        _ => false,
    }
}
