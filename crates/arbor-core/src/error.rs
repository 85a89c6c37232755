//! Error types for Arbor.

use serde::Serialize;
use thiserror::Error;

/// A shared error type for every Arbor crate.
///
/// Structural no-ops (unknown ids, root removal) are not errors and never
/// surface here; these variants cover storage, serialization and
/// collaborator failures.
#[derive(Error, Debug, Clone, Serialize)]
pub enum ArborError {
    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// The storage backend refused a write because it is full
    #[error("Storage quota exceeded for '{key}': {required} bytes requested, {available} available")]
    QuotaExceeded {
        key: String,
        required: usize,
        available: usize,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "JSON", "TOML", "base64"
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// An external collaborator (model client, summarizer) failed
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArborError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a Collaborator error
    pub fn collaborator(message: impl Into<String>) -> Self {
        Self::Collaborator(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if the storage backend ran out of room.
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for ArborError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for ArborError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for ArborError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for ArborError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<base64::DecodeError> for ArborError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Serialization {
            format: "base64".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, ArborError>`.
pub type Result<T> = std::result::Result<T, ArborError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_is_capacity() {
        let err = ArborError::QuotaExceeded {
            key: "graph".to_string(),
            required: 10,
            available: 5,
        };
        assert!(err.is_capacity());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_json_error_conversion() {
        let err: ArborError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, ArborError::Serialization { .. }));
        assert!(err.to_string().contains("JSON"));
    }
}
