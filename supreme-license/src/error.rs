//! Error types for the activation client.

use thiserror::Error;

/// Activation-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// This install has no activation on record.
    #[error("license not activated")]
    NotActivated,

    /// No license key has been stored for this install.
    #[error("no registration key found")]
    NoRegistrationKey,

    /// Network error talking to the license server.
    #[error("network error: {0}")]
    Network(String),

    /// License server answered with a non-success HTTP status.
    #[error("license server returned {status}: {body}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body, if readable.
        body: String,
    },

    /// License server answered with a body we could not decode.
    #[error("invalid license server response: {0}")]
    InvalidResponse(String),

    /// Sync store read or write failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The per-install identifier could not be obtained.
    #[error("instance id unavailable: {0}")]
    InstanceId(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LicenseError {
    /// Returns true if the failure came from the transport rather than the server's verdict.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Result type for activation operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
