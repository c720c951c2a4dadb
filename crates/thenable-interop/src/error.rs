//! Interop errors

use thenable_runtime::{Value, type_error};

/// Interop error
#[derive(Debug, Clone, thiserror::Error)]
pub enum InteropError {
    #[error("Cannot bluebirdify an {0}.")]
    InvalidTarget(&'static str),

    #[error("Cannot bluebirdify {0}: it is not a Promise class")]
    NotAPromiseClass(String),

    #[error("{class}.prototype.{member} is not a function")]
    MissingMember { class: String, member: String },

    #[error("{member} returned {actual}, expected {expected}")]
    UnexpectedResult {
        member: String,
        expected: &'static str,
        actual: String,
    },

    #[error("promise class has been dropped")]
    ClassDropped,

    /// A script-level throw, carried as-is.
    #[error("{0}")]
    Thrown(Value),
}

impl InteropError {
    /// The value script code observes: thrown values pass through, every
    /// other error becomes a `TypeError`.
    pub fn into_value(self) -> Value {
        match self {
            InteropError::Thrown(value) => value,
            other => type_error(other.to_string()),
        }
    }
}

impl From<Value> for InteropError {
    fn from(value: Value) -> Self {
        InteropError::Thrown(value)
    }
}

pub type Result<T> = std::result::Result<T, InteropError>;
