//! Identity & Classification

use thenable_runtime::{PromiseClass, Value};

/// Set on augmented classes and their prototypes
pub(crate) struct AugmentedTag;

/// Whether `value` is an instance of an augmented promise class.
///
/// The prototype of an augmented class carries the tag too, but is not an
/// instance and is rejected.
pub fn is(value: &Value) -> bool {
    match value {
        Value::Promise(promise) => {
            let class = promise.constructor();
            is_augmented(&class) || class.prototype().slots().contains::<AugmentedTag>()
        }
        _ => false,
    }
}

pub fn is_augmented(class: &PromiseClass) -> bool {
    class.slots().contains::<AugmentedTag>()
}

pub(crate) fn tag(class: &PromiseClass) {
    class.slots().insert(AugmentedTag);
    class.prototype().slots().insert(AugmentedTag);
}
