//! Core traits for twostep.
//!
//! This module defines the seams between the login state machine and the
//! things it does not own: the user directory, the session store and the
//! replay guard. Adapters implement these traits; the state machine only
//! ever holds them as trait objects.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::AuthResult;
use crate::types::{OtpCode, Secret, SessionKind, SessionRecord, SessionToken};

/// A user as seen by the login core.
///
/// Password hashing and storage format belong to the implementor.
pub trait UserRecord: Send + Sync + Debug {
    /// Returns the user's identifier.
    fn id(&self) -> &str;

    /// Returns the shared TOTP secret.
    fn secret(&self) -> &Secret;

    /// Compares a candidate password with the stored one.
    fn equals_password(&self, candidate: &str) -> bool;
}

/// Read-only lookup of users by identifier.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Finds a user by id, returning `None` when no such user exists.
    async fn find_user_by_id(&self, id: &str) -> AuthResult<Option<Arc<dyn UserRecord>>>;
}

/// Persistence for opaque session tokens.
///
/// Implementations must be safe to call from many tasks at once.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Mints a new token bound to `user_id` with the TTL configured for `kind`.
    ///
    /// Fails with `StoreUnavailable` if the token could not be persisted.
    async fn create_session(&self, kind: SessionKind, user_id: &str) -> AuthResult<SessionToken>;

    /// Looks up a token.
    ///
    /// Fails with `SessionNotFound` if absent and `SessionExpired` if the
    /// token exists but is past its expiry.
    async fn resolve_session(&self, token: &SessionToken) -> AuthResult<SessionRecord>;

    /// Removes a token immediately. Removing an unknown token is not an error.
    async fn invalidate(&self, token: &SessionToken) -> AuthResult<()>;

    /// Removes a token and returns the record it held, in one step.
    ///
    /// When several callers consume the same token at once, exactly one gets
    /// the record and the others get `SessionNotFound`. An expired token is
    /// still removed and reported as `SessionExpired`.
    async fn consume(&self, token: &SessionToken) -> AuthResult<SessionRecord>;

    /// Drops expired sessions and returns how many were removed.
    async fn purge_expired(&self) -> AuthResult<usize>;
}

/// Tracks which one-time codes each user has already consumed.
#[async_trait]
pub trait ReplayGuard: Send + Sync {
    /// Returns true if `code` was consumed by `user_id` and the record is
    /// still within its expiry.
    async fn is_used(&self, user_id: &str, code: &OtpCode) -> AuthResult<bool>;

    /// Records `code` as consumed by `user_id` until `expires_at`.
    ///
    /// This is a single atomic insert-if-absent: when two callers race on the
    /// same `(user_id, code)` pair, exactly one succeeds and the others get
    /// `Conflict`.
    async fn mark_used(
        &self,
        user_id: &str,
        code: &OtpCode,
        time_step: u64,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()>;

    /// Drops expired records and returns how many were removed.
    async fn purge_expired(&self) -> AuthResult<usize>;
}
