//! Error types for the binding engine.
//!
//! ## Error Hierarchy
//!
//! ```text
//! BindError (anything that can go wrong crossing the boundary)
//! ├── CastError            - a host value cannot become the requested native value
//! ├── InsufficientArguments - a call supplied fewer arguments than the callee needs
//! ├── Native               - native code failed (Err or panic) during a call
//! ├── Bidirectional        - a factory product is not of the requested type
//! ├── Borrowed             - the native object is locked by another borrow
//! ├── Script(Exception)    - scripted code threw
//! └── Registration         - see RegistrationError
//!
//! RegistrationError (returned immediately by ClassBuilder calls)
//! ├── DuplicateName
//! ├── ConstructorAfterMembers
//! ├── AlreadyFinalized
//! └── TypeNotRegistered
//! ```
//!
//! Every `BindError` converts into a host [`Exception`] so call thunks can
//! hand it to scripting code instead of unwinding.

use scriptbind_core::Exception;
use thiserror::Error;

// ============================================================================
// Cast Errors
// ============================================================================

/// A host value could not be converted to the requested native value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CastError {
    /// The host value has the wrong shape.
    #[error("expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// A native object was expected but the value is not an object.
    #[error("expected a {expected} object, got {actual}")]
    NotAnObject {
        expected: &'static str,
        actual: &'static str,
    },

    /// The object carries no native payload.
    #[error("object is not a wrapped native {expected}")]
    NotWrapped { expected: &'static str },

    /// The native payload cannot be viewed as the requested type.
    #[error("wrapped {actual} is not compatible with {expected}")]
    Incompatible {
        expected: &'static str,
        actual: &'static str,
    },

    /// The native object behind the handle is gone.
    #[error("native {expected} behind this object has been destroyed")]
    Detached { expected: &'static str },

    /// The native type has no descriptor in this registry.
    #[error("type {type_name} is not registered")]
    Unregistered { type_name: &'static str },

    /// Fixed-size conversion got the wrong number of elements.
    #[error("expected {expected} elements, got {actual}")]
    Length { expected: usize, actual: usize },
}

// ============================================================================
// Registration Errors
// ============================================================================

/// Errors raised while describing a type. These are programming errors in
/// the embedding and surface at the offending builder call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    /// The name is already taken on this type.
    #[error("duplicate name '{name}' on {type_name}")]
    DuplicateName { type_name: String, name: String },

    /// Constructors must be declared before any method or member.
    #[error("constructor '{name}' for {type_name} added after methods or members")]
    ConstructorAfterMembers { type_name: String, name: String },

    /// The type's member set has been locked.
    #[error("{type_name} is finalized")]
    AlreadyFinalized { type_name: String },

    /// A referenced type has no descriptor.
    #[error("type {type_name} is not registered")]
    TypeNotRegistered { type_name: &'static str },

    /// A registration-time value could not be converted.
    #[error("invalid value for '{name}': {reason}")]
    InvalidValue { name: String, reason: String },

    /// The host runtime rejected an operation.
    #[error(transparent)]
    Host(#[from] Exception),
}

// ============================================================================
// Bind Errors
// ============================================================================

/// Failure while crossing the native/script boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    #[error(transparent)]
    Cast(#[from] CastError),

    /// Fewer arguments than the callee's declared arity.
    #[error("{name} requires {required} arguments, {supplied} given")]
    InsufficientArguments {
        name: String,
        required: usize,
        supplied: usize,
    },

    /// Native code failed; the message is the native error's own text.
    #[error("{message}")]
    Native { message: String },

    /// A factory product was requested as a type it is not.
    #[error("{0}")]
    Bidirectional(String),

    /// The native object is already borrowed in a conflicting way.
    #[error("{type_name} is already borrowed")]
    Borrowed { type_name: &'static str },

    /// The registry the binding was created from no longer exists.
    #[error("binding registry has been dropped")]
    RegistryDropped,

    /// Scripted code threw.
    #[error(transparent)]
    Script(#[from] Exception),

    #[error(transparent)]
    Registration(#[from] RegistrationError),
}

impl BindError {
    /// Create a native failure carrying `message`.
    pub fn native(message: impl Into<String>) -> Self {
        BindError::Native {
            message: message.into(),
        }
    }

    /// Create a bidirectional failure.
    pub fn bidirectional(message: impl Into<String>) -> Self {
        BindError::Bidirectional(message.into())
    }
}

impl From<BindError> for Exception {
    fn from(err: BindError) -> Self {
        match err {
            BindError::Script(exception) => exception,
            BindError::Native { message } => Exception::error(message),
            other @ (BindError::Cast(_)
            | BindError::InsufficientArguments { .. }
            | BindError::Borrowed { .. }) => Exception::type_error(other.to_string()),
            other => Exception::error(other.to_string()),
        }
    }
}
