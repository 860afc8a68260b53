//! Error types for verification runs.
//!
//! Only [`VerifyError::NotFound`], locate-stage [`VerifyError::Retrieval`],
//! [`VerifyError::Configuration`] and [`VerifyError::Cancelled`] ever leave
//! the engine. Everything else is folded into a check result.

use thiserror::Error;

/// Exit status for a fatal error raised before any report exists.
pub const EXIT_FATAL: i32 = 3;

/// Exit status for an interrupted or timed-out run.
pub const EXIT_CANCELLED: i32 = 130;

/// Errors that can occur during verification.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Target, release or artifact set could not be resolved.
    #[error("Not found: {message}")]
    NotFound {
        /// What was not found.
        message: String,
    },

    /// Network, filesystem or external tool failure.
    #[error("Retrieval error: {message}")]
    Retrieval {
        /// Error message.
        message: String,
    },

    /// Evidence was retrieved but is invalid.
    #[error("Check failed: {reason}")]
    CheckFailure {
        /// Reason for the failure.
        reason: String,
    },

    /// Invalid policy, threshold or target configuration.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message.
        message: String,
    },

    /// User interrupt or overall run timeout.
    #[error("Verification cancelled")]
    Cancelled,

    /// Cryptographic error.
    #[error("Crypto error: {0}")]
    Crypto(#[from] black_crypto::CryptoError),
}

impl VerifyError {
    /// Create a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a retrieval error.
    #[must_use]
    pub fn retrieval(message: impl Into<String>) -> Self {
        Self::Retrieval {
            message: message.into(),
        }
    }

    /// Create a check failure.
    #[must_use]
    pub fn check_failure(reason: impl Into<String>) -> Self {
        Self::CheckFailure {
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check if this error aborts a run when it escapes the engine.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Retrieval { .. }
                | Self::Configuration { .. }
                | Self::Cancelled
        )
    }

    /// Process exit status for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cancelled => EXIT_CANCELLED,
            _ => EXIT_FATAL,
        }
    }
}
