//! Core data types for twostep.
//!
//! This module defines the values that flow between the TOTP engine, the
//! stores and the login state machine: shared secrets, one-time codes,
//! opaque session tokens and the records kept for them.

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AuthError, AuthResult};

/// Minimum shared secret length in bytes (RFC 4226, section 4).
pub const MIN_SECRET_LEN: usize = 16;

/// Length of a freshly generated shared secret in bytes.
pub const GENERATED_SECRET_LEN: usize = 20;

/// Number of random bytes behind every session token.
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Longest one-time code accepted anywhere in the system.
pub const MAX_CODE_DIGITS: usize = 10;

/// Longest session lifetime accepted, in days.
pub const MAX_SESSION_TTL_DAYS: i64 = 366;

const BASE32: base32::Alphabet = base32::Alphabet::Rfc4648 { padding: false };

/// The shared HMAC key bound to one user.
///
/// The bytes never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Vec<u8>);

impl Secret {
    /// Wraps raw key bytes, rejecting keys shorter than 128 bits.
    pub fn new(bytes: impl Into<Vec<u8>>) -> AuthResult<Self> {
        let bytes = bytes.into();
        if bytes.len() < MIN_SECRET_LEN {
            return Err(AuthError::config(format!(
                "secret must be at least {MIN_SECRET_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    /// Generates a new random secret from the operating system RNG.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; GENERATED_SECRET_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parses the base32 form shown to users by authenticator apps.
    ///
    /// Case, whitespace and trailing padding are ignored.
    pub fn from_base32(encoded: &str) -> AuthResult<Self> {
        let cleaned: String = encoded
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '=')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        let bytes = base32::decode(BASE32, &cleaned)
            .ok_or_else(|| AuthError::config("secret is not valid base32"))?;
        Self::new(bytes)
    }

    /// Returns the unpadded base32 encoding of the secret.
    pub fn to_base32(&self) -> String {
        base32::encode(BASE32, &self.0)
    }

    /// Exposes the raw key bytes for MAC computation.
    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED; {}])", self.0.len())
    }
}

/// A short decimal one-time code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OtpCode(String);

impl OtpCode {
    /// Validates a candidate code: 1 to 10 ASCII digits.
    pub fn new(value: impl Into<String>) -> AuthResult<Self> {
        let value = value.into();
        let well_formed = !value.is_empty()
            && value.len() <= MAX_CODE_DIGITS
            && value.bytes().all(|b| b.is_ascii_digit());
        if !well_formed {
            return Err(AuthError::InvalidCode);
        }
        Ok(Self(value))
    }

    /// Formats a truncated MAC value as a zero-padded code of `digits` digits.
    pub fn from_number(value: u64, digits: u32) -> Self {
        Self(format!("{:0>width$}", value, width = digits as usize))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the number of digits.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a validated code.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An opaque, unguessable session token.
///
/// Carriers (cookies, headers) move it around as a plain string; only the
/// session store can map it back to a user.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generates a token with 256 bits of entropy, base64url encoded.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Wraps a token received from a carrier.
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the token as a string slice, for writing it to a carrier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the token and returns the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(4).collect();
        write!(f, "SessionToken({prefix}…)")
    }
}

/// What a session token proves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// The password was verified; a one-time code is still owed.
    OtpPending,
    /// Both factors were verified.
    Authenticated,
}

impl SessionKind {
    /// Returns a stable name for logs and storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OtpPending => "otp_pending",
            Self::Authenticated => "authenticated",
        }
    }
}

/// Time-to-live for each session kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTtl {
    /// Lifetime of an OTP-pending session.
    pub pending: Duration,
    /// Lifetime of an authenticated session.
    pub authenticated: Duration,
}

impl Default for SessionTtl {
    fn default() -> Self {
        Self {
            pending: Duration::minutes(5),
            authenticated: Duration::days(7),
        }
    }
}

impl SessionTtl {
    /// Creates a new TTL pair.
    pub fn new(pending: Duration, authenticated: Duration) -> Self {
        Self {
            pending,
            authenticated,
        }
    }

    /// Returns the TTL for the given kind.
    pub fn for_kind(&self, kind: SessionKind) -> Duration {
        match kind {
            SessionKind::OtpPending => self.pending,
            SessionKind::Authenticated => self.authenticated,
        }
    }

    /// Checks that both TTLs are positive, within `MAX_SESSION_TTL_DAYS`
    /// and that pending is the shorter one.
    pub fn validate(&self) -> AuthResult<()> {
        if self.pending <= Duration::zero() || self.authenticated <= Duration::zero() {
            return Err(AuthError::config("session ttls must be positive"));
        }
        if self.authenticated > Duration::days(MAX_SESSION_TTL_DAYS) {
            return Err(AuthError::config(format!(
                "session ttls must not exceed {MAX_SESSION_TTL_DAYS} days"
            )));
        }
        if self.pending >= self.authenticated {
            return Err(AuthError::config(
                "pending session ttl must be shorter than the authenticated ttl",
            ));
        }
        Ok(())
    }
}

/// A stored session, keyed by its token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// The user this session belongs to.
    pub user_id: String,
    /// Which stage of the login this session proves.
    pub kind: SessionKind,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session stops resolving.
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Creates a record that expires `ttl` after `now`.
    ///
    /// Fails when the expiry falls outside the representable calendar.
    pub fn new(
        user_id: impl Into<String>,
        kind: SessionKind,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> AuthResult<Self> {
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::internal("session expiry out of range"))?;
        Ok(Self {
            user_id: user_id.into(),
            kind,
            created_at: now,
            expires_at,
        })
    }

    /// Checks if the session has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A consumed one-time code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedOtpRecord {
    /// The user who consumed the code.
    pub user_id: String,
    /// The consumed code.
    pub code: OtpCode,
    /// The time step the code was generated for.
    pub time_step: u64,
    /// When the code can no longer verify and the record may be dropped.
    pub expires_at: DateTime<Utc>,
}

impl UsedOtpRecord {
    /// Checks if the record has passed its expiry at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
