//! The login state machine.
//!
//! A visitor moves through three states:
//!
//! ```text
//! Anonymous --(id + password)--> OtpPending --(one-time code)--> Authenticated
//!     ^                              |                                |
//!     +------(expiry / logout)-------+----------(expiry / logout)-----+
//! ```
//!
//! Each state other than `Anonymous` is backed by a session token of the
//! matching [`SessionKind`]. A pending token never grants access on its own.

use chrono::DateTime;
use std::future::Future;
use std::sync::Arc;
use twostep_core::clock::{Clock, SystemClock};
use twostep_core::error::{AuthError, AuthResult};
use twostep_core::traits::{ReplayGuard, SessionStore, UserDirectory};
use twostep_core::types::{OtpCode, SessionKind, SessionRecord, SessionToken};
use twostep_otp::{TotpEngine, TotpUri, provisioning_uri};

use crate::config::TwoFactorConfig;

/// Where a visitor currently stands in the login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    /// No usable token.
    Anonymous,
    /// Password verified, one-time code still owed.
    OtpPending { user_id: String },
    /// Both factors verified.
    Authenticated { user_id: String },
}

impl LoginState {
    /// Returns the user id, if any.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::OtpPending { user_id } | Self::Authenticated { user_id } => Some(user_id),
        }
    }

    /// Checks if the visitor completed both factors.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

/// Counts returned by [`TwoStepLogin::purge_expired`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub sessions: usize,
    pub used_codes: usize,
}

/// Password-then-TOTP login over pluggable stores.
pub struct TwoStepLogin {
    config: TwoFactorConfig,
    engine: TotpEngine,
    users: Arc<dyn UserDirectory>,
    sessions: Arc<dyn SessionStore>,
    replay_guard: Arc<dyn ReplayGuard>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TwoStepLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoStepLogin")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl TwoStepLogin {
    /// Starts building a login with the given configuration.
    pub fn builder(config: TwoFactorConfig) -> TwoStepLoginBuilder {
        TwoStepLoginBuilder::new(config)
    }

    /// Gets the configuration.
    pub fn config(&self) -> &TwoFactorConfig {
        &self.config
    }

    /// Gets the TOTP engine.
    pub fn engine(&self) -> &TotpEngine {
        &self.engine
    }

    /// Checks an id/password pair and opens an OTP-pending session.
    ///
    /// Unknown ids and wrong passwords are indistinguishable to the caller.
    pub async fn begin_password_login(&self, id: &str, password: &str) -> AuthResult<SessionToken> {
        let user = self
            .guarded("find_user_by_id", self.users.find_user_by_id(id))
            .await?;

        let Some(user) = user.filter(|user| user.equals_password(password)) else {
            tracing::warn!(user_id = id, "password login rejected");
            return Err(AuthError::InvalidCredentials);
        };

        let token = self
            .guarded(
                "create_session",
                self.sessions.create_session(SessionKind::OtpPending, user.id()),
            )
            .await?;

        tracing::info!(user_id = user.id(), "password accepted, awaiting one-time code");
        Ok(token)
    }

    /// Exchanges a pending token and a one-time code for an authenticated token.
    ///
    /// On success the code is recorded as used and the pending token is
    /// consumed. Any failure before the authenticated token is minted
    /// leaves the pending token usable for another attempt.
    ///
    /// The authenticated token is minted first and then the pending token
    /// is claimed atomically; a submission that loses the claim revokes the
    /// token it minted, so one pending token yields at most one session.
    pub async fn submit_otp(&self, pending: &SessionToken, code: &str) -> AuthResult<SessionToken> {
        let record = self.resolve_kind(pending, SessionKind::OtpPending).await?;
        let user_id = record.user_id;

        let Some(user) = self
            .guarded("find_user_by_id", self.users.find_user_by_id(&user_id))
            .await?
        else {
            tracing::warn!(user_id = %user_id, "pending session refers to an unknown user");
            return Err(AuthError::SessionNotFound);
        };

        let candidate = OtpCode::new(code).inspect_err(|_| {
            tracing::warn!(user_id = %user_id, "malformed one-time code");
        })?;
        if candidate.len() != self.engine.digits() as usize {
            tracing::warn!(user_id = %user_id, "one-time code has the wrong length");
            return Err(AuthError::InvalidCode);
        }

        let window = self.config.totp_options.window;
        let unix_time = self.unix_now()?;
        let Some(step) = self
            .engine
            .verify_step(user.secret(), candidate.as_str(), unix_time, window)
        else {
            tracing::warn!(user_id = %user_id, "one-time code rejected");
            return Err(AuthError::InvalidCode);
        };

        if self
            .guarded("is_used", self.replay_guard.is_used(&user_id, &candidate))
            .await?
        {
            tracing::warn!(user_id = %user_id, step, "one-time code replayed");
            return Err(AuthError::CodeAlreadyUsed);
        }

        let valid_until = i64::try_from(self.engine.valid_until(step, window))
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| AuthError::internal("one-time code expiry out of range"))?;

        match self
            .guarded(
                "mark_used",
                self.replay_guard
                    .mark_used(&user_id, &candidate, step, valid_until),
            )
            .await
        {
            Ok(()) => {}
            Err(AuthError::Conflict) => {
                tracing::warn!(user_id = %user_id, step, "one-time code consumed concurrently");
                return Err(AuthError::CodeAlreadyUsed);
            }
            Err(err) => return Err(err),
        }

        let token = self
            .guarded(
                "create_session",
                self.sessions
                    .create_session(SessionKind::Authenticated, &user_id),
            )
            .await
            .inspect_err(|err| {
                tracing::error!(user_id = %user_id, error = %err, "could not open authenticated session");
            })?;

        // Only one submission may turn this pending token into a session.
        let claimed = self
            .guarded("consume", self.sessions.consume(pending))
            .await
            .and_then(|claimed| {
                if claimed.kind == SessionKind::OtpPending && claimed.user_id == user_id {
                    Ok(claimed)
                } else {
                    Err(AuthError::SessionNotFound)
                }
            });
        if let Err(err) = claimed {
            self.revoke(&token, &user_id).await;
            return Err(match err {
                AuthError::SessionNotFound | AuthError::SessionExpired => {
                    tracing::warn!(user_id = %user_id, "pending session claimed by another submission");
                    AuthError::SessionNotFound
                }
                other => other,
            });
        }

        tracing::info!(user_id = %user_id, step, "second factor accepted");
        Ok(token)
    }

    /// Resolves an authenticated token to its user id.
    ///
    /// A pending token is rejected as `SessionNotFound`.
    pub async fn authenticate(&self, token: &SessionToken) -> AuthResult<String> {
        self.resolve_kind(token, SessionKind::Authenticated)
            .await
            .map(|record| record.user_id)
    }

    /// Works out the visitor's state from the tokens they presented.
    ///
    /// Missing, expired and wrong-kind tokens count as absent. Store failures
    /// are returned rather than treated as `Anonymous`.
    pub async fn state(
        &self,
        pending: Option<&SessionToken>,
        session: Option<&SessionToken>,
    ) -> AuthResult<LoginState> {
        if let Some(token) = session {
            if let Some(user_id) = self.lookup(token, SessionKind::Authenticated).await? {
                return Ok(LoginState::Authenticated { user_id });
            }
        }
        if let Some(token) = pending {
            if let Some(user_id) = self.lookup(token, SessionKind::OtpPending).await? {
                return Ok(LoginState::OtpPending { user_id });
            }
        }
        Ok(LoginState::Anonymous)
    }

    /// Invalidates a token of either kind.
    pub async fn logout(&self, token: &SessionToken) -> AuthResult<()> {
        self.guarded("invalidate", self.sessions.invalidate(token))
            .await?;
        tracing::debug!("session invalidated");
        Ok(())
    }

    /// Drops expired sessions and replay records.
    pub async fn purge_expired(&self) -> AuthResult<PurgeReport> {
        let sessions = self
            .guarded("purge_sessions", self.sessions.purge_expired())
            .await?;
        let used_codes = self
            .guarded("purge_used_codes", self.replay_guard.purge_expired())
            .await?;
        Ok(PurgeReport {
            sessions,
            used_codes,
        })
    }

    /// Builds the enrollment URI for a user's secret.
    pub fn provisioning_uri(&self, account: &str, secret: &twostep_core::Secret) -> TotpUri {
        provisioning_uri(
            &self.config.issuer,
            account,
            secret,
            &self.config.totp_options,
        )
    }

    async fn resolve_kind(&self, token: &SessionToken, kind: SessionKind) -> AuthResult<SessionRecord> {
        let record = self
            .guarded("resolve_session", self.sessions.resolve_session(token))
            .await
            .inspect_err(|err| {
                if err.is_user_error() {
                    tracing::debug!(kind = kind.as_str(), error = %err, "session did not resolve");
                }
            })?;

        if record.kind != kind {
            tracing::warn!(
                expected = kind.as_str(),
                actual = record.kind.as_str(),
                "session presented for the wrong stage"
            );
            return Err(AuthError::SessionNotFound);
        }
        Ok(record)
    }

    /// Invalidates a token this call minted but must not hand out.
    async fn revoke(&self, token: &SessionToken, user_id: &str) {
        if let Err(err) = self
            .guarded("invalidate", self.sessions.invalidate(token))
            .await
        {
            tracing::error!(
                user_id,
                error = %err,
                "unissued authenticated session not revoked, it will lapse at its ttl"
            );
        }
    }

    async fn lookup(&self, token: &SessionToken, kind: SessionKind) -> AuthResult<Option<String>> {
        match self.resolve_kind(token, kind).await {
            Ok(record) => Ok(Some(record.user_id)),
            Err(AuthError::SessionNotFound | AuthError::SessionExpired) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn unix_now(&self) -> AuthResult<u64> {
        u64::try_from(self.clock.now().timestamp())
            .map_err(|_| AuthError::internal("clock reads before the unix epoch"))
    }

    /// Runs a store call under the configured timeout.
    ///
    /// Timeouts become `StoreUnavailable`, so the caller fails closed.
    async fn guarded<T, F>(&self, operation: &'static str, call: F) -> AuthResult<T>
    where
        F: Future<Output = AuthResult<T>>,
    {
        let timeout = self.config.store_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(Err(err @ AuthError::StoreUnavailable { .. })) => {
                tracing::error!(operation, error = %err, "store call failed");
                Err(err)
            }
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    operation,
                    timeout_ms = timeout.as_millis() as u64,
                    "store call timed out"
                );
                Err(AuthError::store(format!("{operation} timed out")))
            }
        }
    }
}

/// Builder for [`TwoStepLogin`].
pub struct TwoStepLoginBuilder {
    config: TwoFactorConfig,
    users: Option<Arc<dyn UserDirectory>>,
    sessions: Option<Arc<dyn SessionStore>>,
    replay_guard: Option<Arc<dyn ReplayGuard>>,
    clock: Option<Arc<dyn Clock>>,
}

impl TwoStepLoginBuilder {
    /// Creates a builder with no stores attached.
    pub fn new(config: TwoFactorConfig) -> Self {
        Self {
            config,
            users: None,
            sessions: None,
            replay_guard: None,
            clock: None,
        }
    }

    /// Sets the user directory.
    pub fn users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(users);
        self
    }

    /// Sets the session store.
    pub fn sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Sets the replay guard.
    pub fn replay_guard(mut self, replay_guard: Arc<dyn ReplayGuard>) -> Self {
        self.replay_guard = Some(replay_guard);
        self
    }

    /// Sets the clock. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Uses one adapter for all three stores.
    pub fn adapter<A>(self, adapter: Arc<A>) -> Self
    where
        A: UserDirectory + SessionStore + ReplayGuard + 'static,
    {
        self.users(adapter.clone())
            .sessions(adapter.clone())
            .replay_guard(adapter)
    }

    /// Validates the configuration and assembles the login.
    pub fn build(self) -> AuthResult<TwoStepLogin> {
        self.config.validate()?;
        let engine = TotpEngine::new(&self.config.totp_options)?;

        let users = self
            .users
            .ok_or_else(|| AuthError::config("a user directory is required"))?;
        let sessions = self
            .sessions
            .ok_or_else(|| AuthError::config("a session store is required"))?;
        let replay_guard = self
            .replay_guard
            .ok_or_else(|| AuthError::config("a replay guard is required"))?;

        Ok(TwoStepLogin {
            config: self.config,
            engine,
            users,
            sessions,
            replay_guard,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}
