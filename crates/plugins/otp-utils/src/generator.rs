//! TOTP code generation (RFC 6238 over RFC 4226 HOTP).

use hmac::{Hmac, Mac};
use sha1::Sha1;
use twostep_core::{OtpCode, Secret};

use crate::TotpError;

type HmacSha1 = Hmac<Sha1>;

/// Largest accepted window tolerance, in steps on each side.
pub const MAX_WINDOW: u64 = 10;

/// Configuration for TOTP generation and verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotpOptions {
    /// Number of digits in a code. Default: 6.
    pub digits: u32,
    /// Step duration in seconds. Default: 30.
    pub period: u64,
    /// Adjacent steps accepted on each side of the current one. Default: 1.
    pub window: u64,
}

impl Default for TotpOptions {
    fn default() -> Self {
        Self {
            digits: 6,
            period: 30,
            window: 1,
        }
    }
}

impl TotpOptions {
    /// Creates options with the given digits and period and a window of 1.
    pub fn new(digits: u32, period: u64) -> Self {
        Self {
            digits,
            period,
            ..Default::default()
        }
    }

    /// Sets the window tolerance.
    pub fn with_window(mut self, window: u64) -> Self {
        self.window = window;
        self
    }

    /// Checks digits, period and window bounds.
    pub fn validate(&self) -> Result<(), TotpError> {
        if !(6..=8).contains(&self.digits) {
            return Err(TotpError::InvalidDigits(self.digits));
        }
        if self.period == 0 {
            return Err(TotpError::InvalidPeriod);
        }
        if self.window > MAX_WINDOW {
            return Err(TotpError::WindowTooLarge(self.window));
        }
        Ok(())
    }
}

/// Stateless TOTP engine.
///
/// Holds only the digit count and step duration; every call is a pure
/// function of its arguments and may run concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotpEngine {
    digits: u32,
    period: u64,
}

impl TotpEngine {
    /// Creates an engine after validating `options`.
    pub fn new(options: &TotpOptions) -> Result<Self, TotpError> {
        options.validate()?;
        Ok(Self {
            digits: options.digits,
            period: options.period,
        })
    }

    /// Returns the number of digits per code.
    pub fn digits(&self) -> u32 {
        self.digits
    }

    /// Returns the step duration in seconds.
    pub fn period(&self) -> u64 {
        self.period
    }

    /// Maps a unix timestamp to its time step.
    pub fn time_step(&self, unix_time: u64) -> u64 {
        unix_time / self.period
    }

    /// Computes the code for `time_step`.
    ///
    /// HMAC-SHA1 over the big-endian step counter, then dynamic truncation.
    pub fn generate_code(&self, secret: &Secret, time_step: u64) -> Result<OtpCode, TotpError> {
        let mut mac =
            HmacSha1::new_from_slice(secret.expose()).map_err(|_| TotpError::InvalidKey)?;
        mac.update(&time_step.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let offset = usize::from(digest[digest.len() - 1] & 0x0f);
        let binary = (u32::from(digest[offset] & 0x7f) << 24)
            | (u32::from(digest[offset + 1]) << 16)
            | (u32::from(digest[offset + 2]) << 8)
            | u32::from(digest[offset + 3]);

        let modulus = 10u64.pow(self.digits);
        Ok(OtpCode::from_number(u64::from(binary) % modulus, self.digits))
    }

    /// Computes the code valid at `unix_time`.
    pub fn code_at(&self, secret: &Secret, unix_time: u64) -> Result<OtpCode, TotpError> {
        self.generate_code(secret, self.time_step(unix_time))
    }
}
