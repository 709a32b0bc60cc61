//! Error types for composition and deferred-value operations

use thiserror::Error;

/// Errors that can occur when working with composite types and instances
#[derive(Debug, Clone, Error)]
pub enum AmalgamError {
    /// A behavior was invoked that no constituent of the instance's type defines
    #[error("Behavior not found: {name}")]
    MissingBehavior {
        /// Name of the behavior that was invoked
        name: String,
    },

    /// An instance was asked for a component its initializers never installed
    #[error("Component not present: {0}")]
    MissingComponent(String),

    /// Invalid operation
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Reason why the operation is invalid
        reason: String,
    },

    /// Generic error
    #[error("Error: {0}")]
    Generic(String),
}

/// Result type for composition and deferred-value operations
pub type AmalgamResult<T> = Result<T, AmalgamError>;

impl AmalgamError {
    /// Create a missing-behavior error
    pub fn missing_behavior(name: impl Into<String>) -> Self {
        AmalgamError::MissingBehavior { name: name.into() }
    }

    /// Create a missing-component error
    pub fn missing_component(name: impl Into<String>) -> Self {
        AmalgamError::MissingComponent(name.into())
    }

    /// Create an invalid-operation error
    pub fn invalid_operation(reason: impl Into<String>) -> Self {
        AmalgamError::InvalidOperation {
            reason: reason.into(),
        }
    }

    /// Create a generic error
    pub fn generic(msg: impl Into<String>) -> Self {
        AmalgamError::Generic(msg.into())
    }
}
