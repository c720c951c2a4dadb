//! Script Errors
//!
//! Error values thrown by handlers and rejected into promises.

use std::fmt;
use std::rc::Rc;

use crate::value::Value;

/// Built-in error classes.
///
/// Every kind other than `Error` subclasses `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    SyntaxError,
    ReferenceError,
    TimeoutError,
    CancellationError,
    OperationalError,
    AggregateError,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::CancellationError => "CancellationError",
            ErrorKind::OperationalError => "OperationalError",
            ErrorKind::AggregateError => "AggregateError",
        }
    }

    pub fn parent(self) -> Option<ErrorKind> {
        match self {
            ErrorKind::Error => None,
            _ => Some(ErrorKind::Error),
        }
    }

    /// Subclass test.
    pub fn is_a(self, class: ErrorKind) -> bool {
        self == class || self.parent().is_some_and(|p| p.is_a(class))
    }
}

/// Shared error object
#[derive(Clone)]
pub struct ErrorValue(Rc<ErrorInner>);

struct ErrorInner {
    kind: ErrorKind,
    message: String,
    errors: Vec<Value>,
    cause: Option<Value>,
}

impl ErrorValue {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self(Rc::new(ErrorInner {
            kind,
            message: message.into(),
            errors: Vec::new(),
            cause: None,
        }))
    }

    /// Aggregate of several rejection reasons, index-readable like an array.
    pub fn aggregate(errors: Vec<Value>, message: impl Into<String>) -> Self {
        Self(Rc::new(ErrorInner {
            kind: ErrorKind::AggregateError,
            message: message.into(),
            errors,
            cause: None,
        }))
    }

    /// Error wrapping another value, e.g. an operational error.
    pub fn with_cause(kind: ErrorKind, message: impl Into<String>, cause: Value) -> Self {
        Self(Rc::new(ErrorInner {
            kind,
            message: message.into(),
            errors: Vec::new(),
            cause: Some(cause),
        }))
    }

    pub fn kind(&self) -> ErrorKind {
        self.0.kind
    }

    pub fn message(&self) -> &str {
        &self.0.message
    }

    pub fn errors(&self) -> &[Value] {
        &self.0.errors
    }

    pub fn cause(&self) -> Option<&Value> {
        self.0.cause.as_ref()
    }

    pub fn get(&self, key: &str) -> Value {
        match key {
            "name" => Value::from(self.kind().name()),
            "message" => Value::from(self.message()),
            "cause" => self.cause().cloned().unwrap_or_default(),
            "length" if self.kind() == ErrorKind::AggregateError => Value::from(self.errors().len()),
            _ => key
                .parse::<usize>()
                .ok()
                .and_then(|i| self.errors().get(i).cloned())
                .unwrap_or_default(),
        }
    }

    pub fn ptr_eq(&self, other: &ErrorValue) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message().is_empty() {
            f.write_str(self.kind().name())
        } else {
            write!(f, "{}: {}", self.kind().name(), self.message())
        }
    }
}

impl fmt::Debug for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors().is_empty() {
            write!(f, "[{self}]")
        } else {
            write!(f, "[{self}] {:?}", self.errors())
        }
    }
}

pub fn error(kind: ErrorKind, message: impl Into<String>) -> Value {
    Value::Error(ErrorValue::new(kind, message))
}

pub fn type_error(message: impl Into<String>) -> Value {
    error(ErrorKind::TypeError, message)
}

pub fn range_error(message: impl Into<String>) -> Value {
    error(ErrorKind::RangeError, message)
}
