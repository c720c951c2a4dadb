//! thenable Interop
//!
//! Lets native and rich promises be used interchangeably.
//!
//! Features:
//! - Synchronous state inspection of native promises
//! - Memoized conversion in both directions
//! - Additive augmentation of promise classes with the rich catalog
//! - Unhandled-rejection suppression that follows conversions
//! - A typed [`Awaitable`] surface over every flavor
//!
//! Nothing is installed globally: a [`Bridge`] augments the classes it is
//! given.

mod augment;
pub mod awaitable;
pub mod bridge;
pub mod capability;
pub mod convert;
pub mod error;
pub mod identity;
pub mod inspect;
pub mod members;
pub mod suppress;

pub use awaitable::Awaitable;
pub use bridge::Bridge;
pub use capability::{Capability, CapabilityDescriptor, Flavor, Tier};
pub use error::InteropError;
pub use inspect::{Status, StatusCell};
pub use members::Strategy;
pub use members::statics::Deferred;
