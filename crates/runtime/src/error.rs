//! Error types for the Coronest runtime crate
//!
//! Two error worlds cross this crate, and the type keeps them apart:
//! script-visible errors (raised inside script code, carrying a message
//! string) and host errors (arbitrary failures from host code that the
//! script never observes). See the supervisor for the delivery policy.

use coronest_core::CoreError;
use thiserror::Error;

/// Runtime errors
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A script-visible error carrying the script's message
    #[error("Script error: {message}")]
    Script { message: String },

    /// A value failed to cross the host/script boundary
    #[error("Value error: {0}")]
    Core(#[from] CoreError),

    /// An engine-level failure from the embedded interpreter
    #[error("Engine error: {0}")]
    Engine(mlua::Error),

    /// The suspension protocol was violated (a system yield that did not
    /// carry a suspend token)
    #[error("Suspension protocol violation: {message}")]
    Protocol { message: String },

    /// A host-world failure from a suspendable's future; never delivered
    /// to the script
    #[error("Host error: {0}")]
    Host(anyhow::Error),

    /// The invocation was abandoned before completion
    #[error("Invocation canceled")]
    Canceled,
}

impl RuntimeError {
    /// Create a new script-visible error
    pub fn script<S: Into<String>>(message: S) -> Self {
        Self::Script {
            message: message.into(),
        }
    }

    /// Create a new suspension protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a new host-world error
    pub fn host<E: Into<anyhow::Error>>(error: E) -> Self {
        Self::Host(error.into())
    }

    /// Check if this error belongs to the script-visible world
    pub fn is_script(&self) -> bool {
        matches!(self, RuntimeError::Script { .. })
    }

    /// Returns the script-visible message, if this is a script error
    pub fn script_message(&self) -> Option<&str> {
        match self {
            RuntimeError::Script { message } => Some(message),
            _ => None,
        }
    }

    /// Converts this error into an engine error for delivery to script code.
    ///
    /// Script and value errors surface with their message; everything else
    /// crosses as an external error.
    pub fn into_lua(self) -> mlua::Error {
        match self {
            RuntimeError::Script { message } => mlua::Error::RuntimeError(message),
            RuntimeError::Core(e) => mlua::Error::RuntimeError(e.to_string()),
            RuntimeError::Engine(e) => e,
            other => mlua::Error::external(other),
        }
    }
}

/// Extracts the script-level message from an engine error, if it carries one.
///
/// Walks callback and context wrappers down to the root cause; an external
/// error is script-level only when it wraps a [`RuntimeError::Script`].
fn script_message_of(error: &mlua::Error) -> Option<String> {
    match error {
        mlua::Error::RuntimeError(message) => Some(message.clone()),
        mlua::Error::CallbackError { cause, .. } => script_message_of(cause),
        mlua::Error::WithContext { cause, .. } => script_message_of(cause),
        mlua::Error::ExternalError(cause) => {
            let cause: &(dyn std::error::Error + 'static) = &**cause;
            match cause.downcast_ref::<RuntimeError>() {
                Some(RuntimeError::Script { message }) => Some(message.clone()),
                _ => None,
            }
        }
        _ => None,
    }
}

impl From<mlua::Error> for RuntimeError {
    fn from(error: mlua::Error) -> Self {
        match script_message_of(&error) {
            Some(message) => RuntimeError::Script { message },
            None => RuntimeError::Engine(error),
        }
    }
}

impl From<anyhow::Error> for RuntimeError {
    fn from(error: anyhow::Error) -> Self {
        RuntimeError::Host(error)
    }
}

/// Result type for runtime operations
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
