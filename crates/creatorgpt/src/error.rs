//! Error types for CreatorGpt.
//!
//! This module defines the [`enum@Error`] enum and [`Result`] type alias used
//! throughout the library, plus [`AuthError`], the small fixed set of identity
//! failures that are surfaced to users.
//!
//! # Error Categories
//!
//! - [`Error::Storage`] - Document store backend failures
//! - [`Error::Document`] - Malformed paths or undecodable fields
//! - [`Error::Conflict`] - A transaction precondition no longer holds
//! - [`Error::Aborted`] - A transaction gave up after exhausting its retries
//! - [`Error::Transaction`] - A transaction was used incorrectly
//! - [`Error::Auth`] - Identity provider failures
//! - [`Error::Generation`] - Generation endpoint failures
//! - [`Error::ImageTooLarge`] - An image attachment exceeds the upload limit
//! - [`Error::Validation`] - Invalid user input
//! - [`Error::Config`] - Configuration issues
//!
//! # Example
//!
//! ```rust
//! use creatorgpt::{AuthError, Error};
//!
//! let err = Error::from(AuthError::WeakPassword);
//! match err {
//!     Error::Auth(auth) => assert_eq!(auth.user_message(), "Password too weak (min 6 chars)."),
//!     other => panic!("unexpected error: {other}"),
//! }
//! ```

use std::sync::Arc;
use thiserror::Error;

/// Result type alias for CreatorGpt operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in CreatorGpt operations
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The document store backend failed
    #[error("storage error: {0}")]
    Storage(Arc<str>),

    /// A document path or field could not be used
    #[error("document error: {0}")]
    Document(Arc<str>),

    /// A document read inside a transaction changed before commit
    #[error("transaction conflict: {0}")]
    Conflict(Arc<str>),

    /// A transaction was retried until its attempt budget ran out
    #[error("transaction aborted: {0}")]
    Aborted(Arc<str>),

    /// A transaction was used in a way the store does not allow
    #[error("invalid transaction: {0}")]
    Transaction(Arc<str>),

    /// Identity provider failure
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The generation endpoint failed or returned garbage
    #[error("generation failed: {0}")]
    Generation(Arc<str>),

    /// An image attachment is over the upload limit
    #[error("image is {size} bytes, limit is {limit} bytes")]
    ImageTooLarge {
        /// Size of the rejected image in bytes
        size: u64,
        /// Configured limit in bytes
        limit: u64,
    },

    /// Invalid user input
    #[error("invalid input: {0}")]
    Validation(Arc<str>),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(Arc<str>),
}

impl Error {
    /// Create a storage error
    #[inline]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(Arc::from(msg.into()))
    }

    /// Create a document error
    #[inline]
    pub fn document(msg: impl Into<String>) -> Self {
        Self::Document(Arc::from(msg.into()))
    }

    /// Create a conflict error
    #[inline]
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(Arc::from(msg.into()))
    }

    /// Create an aborted error
    #[inline]
    pub fn aborted(msg: impl Into<String>) -> Self {
        Self::Aborted(Arc::from(msg.into()))
    }

    /// Create a transaction misuse error
    #[inline]
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(Arc::from(msg.into()))
    }

    /// Create a generation error
    #[inline]
    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(Arc::from(msg.into()))
    }

    /// Create a validation error
    #[inline]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(Arc::from(msg.into()))
    }

    /// Create a configuration error
    #[inline]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(Arc::from(msg.into()))
    }

    /// Whether a transaction that failed with this error may be re-executed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Identity failures, each mapped to one fixed user-readable message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown account or wrong password
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Sign-up with an email that already has an account
    #[error("email already registered")]
    EmailAlreadyInUse,

    /// Password shorter than [`crate::MIN_PASSWORD_LEN`] characters
    #[error("weak password")]
    WeakPassword,

    /// Malformed email address
    #[error("invalid email address")]
    InvalidEmail,

    /// The provider could not be reached or failed internally
    #[error("identity provider unavailable: {0}")]
    Unavailable(Arc<str>),
}

impl AuthError {
    /// Create an unavailable error
    #[inline]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(Arc::from(msg.into()))
    }

    /// Map a provider error code (`auth/wrong-password`, ...) to a kind.
    ///
    /// Codes this crate does not know become [`AuthError::Unavailable`] carrying
    /// the raw code, which displays as the generic message.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "auth/user-not-found" | "auth/wrong-password" | "auth/invalid-credential" => {
                Self::InvalidCredentials
            }
            "auth/email-already-in-use" => Self::EmailAlreadyInUse,
            "auth/weak-password" => Self::WeakPassword,
            "auth/invalid-email" => Self::InvalidEmail,
            other => Self::unavailable(other),
        }
    }

    /// The message shown to the user for this failure
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "Invalid email or password.",
            Self::EmailAlreadyInUse => "Email already registered.",
            Self::WeakPassword => "Password too weak (min 6 chars).",
            Self::InvalidEmail | Self::Unavailable(_) => "An error occurred.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_codes_map_to_kinds() {
        assert_eq!(AuthError::from_code("auth/user-not-found"), AuthError::InvalidCredentials);
        assert_eq!(AuthError::from_code("auth/wrong-password"), AuthError::InvalidCredentials);
        assert_eq!(AuthError::from_code("auth/invalid-credential"), AuthError::InvalidCredentials);
        assert_eq!(AuthError::from_code("auth/email-already-in-use"), AuthError::EmailAlreadyInUse);
        assert_eq!(AuthError::from_code("auth/weak-password"), AuthError::WeakPassword);
    }

    #[test]
    fn test_unmapped_code_uses_generic_message() {
        let err = AuthError::from_code("auth/too-many-requests");
        assert!(matches!(err, AuthError::Unavailable(_)));
        assert_eq!(err.user_message(), "An error occurred.");
    }

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(Error::conflict("version moved").is_retryable());
        assert!(!Error::aborted("gave up").is_retryable());
        assert!(!Error::storage("disk full").is_retryable());
    }
}
