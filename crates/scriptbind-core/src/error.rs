//! Host exceptions.
//!
//! Every failure that reaches scripting code is an [`Exception`]. Native
//! callbacks return `Err(Exception)` to throw; host operations such as
//! `call` and `get` return it when something below them threw.

use std::fmt;

use thiserror::Error;

use crate::value::Value;

/// Category of a host exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    Error,
    TypeError,
    RangeError,
    ReferenceError,
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExceptionKind::Error => "Error",
            ExceptionKind::TypeError => "TypeError",
            ExceptionKind::RangeError => "RangeError",
            ExceptionKind::ReferenceError => "ReferenceError",
        };
        f.write_str(name)
    }
}

/// An exception thrown inside the host runtime.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct Exception {
    kind: ExceptionKind,
    message: String,
    value: Value,
}

impl Exception {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind,
            value: Value::String(message.clone()),
            message,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::Error, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::TypeError, message)
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::RangeError, message)
    }

    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::ReferenceError, message)
    }

    /// Throw an arbitrary value, the way scripted code does.
    pub fn throw(value: Value) -> Self {
        Self {
            kind: ExceptionKind::Error,
            message: value.to_display_string(),
            value,
        }
    }

    pub fn kind(&self) -> ExceptionKind {
        self.kind
    }

    /// The message, without the kind prefix.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The thrown value.
    pub fn value(&self) -> &Value {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind() {
        let e = Exception::type_error("not a function");
        assert_eq!(e.to_string(), "TypeError: not a function");
        assert_eq!(e.message(), "not a function");
        assert_eq!(e.value(), &Value::String("not a function".into()));
    }

    #[test]
    fn thrown_values_keep_their_payload() {
        let e = Exception::throw(Value::Int(7));
        assert_eq!(e.kind(), ExceptionKind::Error);
        assert_eq!(e.message(), "7");
        assert_eq!(e.value(), &Value::Int(7));
    }
}
