//! thenable Runtime
//!
//! Single-threaded promise host for promise libraries to live in.
//!
//! Features:
//! - Dynamic values and script-callable functions
//! - Microtask queue with virtual-time timers
//! - Host tracking of unhandled rejections
//! - Suspended async tasks polled between microtasks
//! - Intrinsic `Promise` class with ECMAScript resolution semantics

pub mod class;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod function;
pub mod native;
pub mod realm;
pub mod rejection;
pub mod slots;
pub mod thenable;
pub mod value;

pub use class::{Members, PromiseClass, Prototype, WeakPromiseClass};
pub use config::{ConfigError, HostCapabilities, RuntimeConfig};
pub use error::{ErrorKind, ErrorValue, error, range_error, type_error};
pub use event_loop::{EventLoop, TimerId};
pub use function::{Function, arg};
pub use native::{NativePromise, Resolvers};
pub use realm::Realm;
pub use rejection::UnhandledRejection;
pub use slots::Slots;
pub use thenable::{
    Handler, PromiseId, PromiseRef, PromiseState, Reaction, Settled, Thenable, WeakPromiseRef,
    settle_value,
};
pub use value::{Array, Completion, HostObject, Object, Value};
