//! Error taxonomy for the intake core

use std::fmt;

/// One field-scoped, user-fixable problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation failed; nothing was encrypted or sent
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} field(s) need attention", .errors.len())]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    /// First offending field, the one a UI would focus
    pub fn first_field(&self) -> Option<&str> {
        self.errors.first().map(|e| e.field.as_str())
    }

    pub fn message_for(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }
}

/// Field encryption errors
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// No recipient key loaded
    #[error("Encryption key not available")]
    EncryptionUnavailable,

    /// Primitive rejected the input
    #[error("Failed to encrypt data: {0}")]
    EncryptionFailure(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailure(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Network or server failure
#[derive(Debug, thiserror::Error)]
pub enum TransmissionError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Server responded with {status}: {snippet}")]
    Status { status: u16, snippet: String },

    #[error("Invalid response JSON: {0}")]
    InvalidResponse(String),
}

/// Local storage read/write/deserialize failure (always degraded, never fatal)
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored bytes that can never decode as a draft
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a rejected or failed submission attempt
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// Another submission is in flight; this request was ignored
    #[error("A submission is already in progress")]
    InFlight,

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Encryption(#[from] CryptoError),

    #[error("Transmission failed: {0}")]
    Transmission(#[from] TransmissionError),
}

impl SubmitError {
    /// Failures after which the same form can be resubmitted unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmitError::Transmission(_) | SubmitError::InFlight)
    }
}

/// Startup errors for the intake context and binary
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Transmission(#[from] TransmissionError),
}
