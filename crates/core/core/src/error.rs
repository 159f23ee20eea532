//! Error types for twostep.
//!
//! This module defines the `AuthError` enum which represents every way a
//! login attempt can be rejected, plus the infrastructure failures that make
//! the core fail closed.

use thiserror::Error;

/// Generic message for a rejected id/password pair.
pub const MSG_INVALID_CREDENTIALS: &str = "id or password is not correct";
/// Generic message for a wrong one-time code.
pub const MSG_INVALID_CODE: &str = "otp is not correct";
/// Generic message for a replayed one-time code.
pub const MSG_CODE_ALREADY_USED: &str = "otp is already used";
/// Generic message for a missing or expired session.
pub const MSG_SESSION_EXPIRED: &str = "session has expired, please log in again";
/// Generic message for everything the user should not see the details of.
pub const MSG_UNEXPECTED: &str = "unexpected error";

/// The main error type for twostep operations.
///
/// Every variant is terminal for the current attempt; nothing in the core
/// retries on its own.
#[derive(Debug, Error)]
pub enum AuthError {
    // ==================== Authentication Errors ====================
    /// The id/password pair was rejected.
    ///
    /// Also returned for unknown ids so that callers cannot enumerate accounts.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The session token was not found.
    #[error("Session not found")]
    SessionNotFound,

    /// The session token was found but is past its expiry.
    #[error("Session expired")]
    SessionExpired,

    /// The submitted one-time code does not match any step in the window.
    #[error("Invalid one-time code")]
    InvalidCode,

    /// The submitted one-time code was already consumed by this user.
    #[error("One-time code already used")]
    CodeAlreadyUsed,

    // ==================== Storage Errors ====================
    /// A backing store failed or timed out.
    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// An insert-if-absent found an existing record.
    ///
    /// Raised by replay guards only; the state machine converts it into
    /// `CodeAlreadyUsed` before it reaches a caller.
    #[error("Conflicting record")]
    Conflict,

    // ==================== Configuration Errors ====================
    /// The configuration is invalid.
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    // ==================== Internal Errors ====================
    /// An internal error occurred.
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl AuthError {
    /// Creates a new store failure.
    pub fn store(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Returns true if this is a user-facing error (vs internal).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::SessionNotFound
                | Self::SessionExpired
                | Self::InvalidCode
                | Self::CodeAlreadyUsed
        )
    }

    /// Returns true if the caller may resubmit the same request unchanged.
    ///
    /// Only store failures qualify: no state was mutated by the failed call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Returns the message that may be shown to the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => MSG_INVALID_CREDENTIALS,
            Self::InvalidCode => MSG_INVALID_CODE,
            Self::CodeAlreadyUsed | Self::Conflict => MSG_CODE_ALREADY_USED,
            Self::SessionNotFound | Self::SessionExpired => MSG_SESSION_EXPIRED,
            Self::StoreUnavailable { .. }
            | Self::ConfigurationError { .. }
            | Self::InternalError { .. } => MSG_UNEXPECTED,
        }
    }

    /// Returns an HTTP status code appropriate for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidCredentials
            | Self::SessionNotFound
            | Self::SessionExpired
            | Self::InvalidCode => 401,
            Self::CodeAlreadyUsed | Self::Conflict => 409,
            Self::StoreUnavailable { .. } => 503,
            Self::ConfigurationError { .. } | Self::InternalError { .. } => 500,
        }
    }
}

/// A Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
