//! Error types for the Coronest core crate
//!
//! This module provides error handling for the host value model and the
//! project collaborator layer (resource loading and path confinement).

use thiserror::Error;

/// Core errors raised by the value model and the project layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A script table used a key the host mapping cannot represent
    #[error("Unsupported table key: {type_name}")]
    UnsupportedKey { type_name: String },

    /// A script value could not be represented as a host value
    #[error("Unsupported value: {type_name}, reason: {reason}")]
    UnsupportedValue { type_name: String, reason: String },

    /// A path escaped the project root
    #[error("Access denied: {path} is outside the project root")]
    PathOutsideProject { path: String },

    /// A project resource could not be found
    #[error("Resource not found: {path}")]
    ResourceNotFound { path: String },

    /// A project resource was found but could not be read
    #[error("Resource unreadable: {path}, reason: {reason}")]
    ResourceUnreadable { path: String, reason: String },
}

impl CoreError {
    /// Create a new unsupported key error
    pub fn unsupported_key<S: Into<String>>(type_name: S) -> Self {
        Self::UnsupportedKey {
            type_name: type_name.into(),
        }
    }

    /// Create a new unsupported value error
    pub fn unsupported_value<S: Into<String>>(type_name: S, reason: S) -> Self {
        Self::UnsupportedValue {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a new path confinement error
    pub fn path_outside_project<S: Into<String>>(path: S) -> Self {
        Self::PathOutsideProject { path: path.into() }
    }

    /// Create a new resource not found error
    pub fn resource_not_found<S: Into<String>>(path: S) -> Self {
        Self::ResourceNotFound { path: path.into() }
    }

    /// Create a new resource unreadable error
    pub fn resource_unreadable<S: Into<String>>(path: S, reason: S) -> Self {
        Self::ResourceUnreadable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is a sandbox refusal (script-visible)
    pub fn is_sandbox_refusal(&self) -> bool {
        matches!(
            self,
            CoreError::PathOutsideProject { .. } | CoreError::ResourceNotFound { .. }
        )
    }
}

/// Result type for core operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;
