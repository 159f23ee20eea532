//! # Twostep OTP
//!
//! Time-based one-time password engine used by the login state machine.
//! This crate provides:
//! - RFC 6238 code generation (HMAC-SHA1, dynamic truncation)
//! - Verification across a window of adjacent time steps
//! - Constant-time comparison of generated and submitted codes
//! - `otpauth://` provisioning URIs
//!
//! Nothing here performs I/O or keeps state.

mod generator;
mod provisioning;
mod verification;

pub use generator::{MAX_WINDOW, TotpEngine, TotpOptions};
pub use provisioning::{TotpUri, provisioning_uri};
pub use verification::constant_time_eq;

use twostep_core::AuthError;

/// Error type for TOTP configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TotpError {
    #[error("TOTP codes must have 6 to 8 digits, got {0}")]
    InvalidDigits(u32),

    #[error("TOTP period must be at least one second")]
    InvalidPeriod,

    #[error("TOTP window tolerance {0} exceeds the maximum of {max}", max = MAX_WINDOW)]
    WindowTooLarge(u64),

    #[error("TOTP secret cannot key the MAC")]
    InvalidKey,
}

impl From<TotpError> for AuthError {
    fn from(err: TotpError) -> Self {
        AuthError::config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_rejects_invalid_options() {
        let err = TotpEngine::new(&TotpOptions::new(9, 30)).unwrap_err();
        assert_eq!(err, TotpError::InvalidDigits(9));

        let auth: AuthError = err.into();
        assert!(matches!(auth, AuthError::ConfigurationError { .. }));
    }
}
