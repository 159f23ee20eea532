//! # Twostep Memory Adapter
//!
//! An in-memory session store, replay guard and user directory for twostep,
//! intended for tests, development and single-process deployments.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use twostep_adapter_memory::MemoryAdapter;
//!
//! let adapter = Arc::new(MemoryAdapter::new());
//! adapter.insert_user("alice", "correct horse", Secret::generate()).await;
//! let login = TwoStepLogin::builder(TwoFactorConfig::default())
//!     .adapter(adapter.clone())
//!     .build()?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use twostep_core::clock::{Clock, SystemClock};
use twostep_core::error::{AuthError, AuthResult};
use twostep_core::traits::{ReplayGuard, SessionStore, UserDirectory, UserRecord};
use twostep_core::types::{
    OtpCode, Secret, SessionKind, SessionRecord, SessionToken, SessionTtl, UsedOtpRecord,
};

/// In-memory storage for a single entity type.
type Store<K, T> = Arc<RwLock<HashMap<K, T>>>;

/// A user held by the memory directory.
///
/// Only a SHA-256 digest of the password is kept.
#[derive(Debug)]
pub struct MemoryUser {
    id: String,
    secret: Secret,
    password_digest: [u8; 32],
}

impl MemoryUser {
    /// Creates a user from a plaintext password.
    pub fn new(id: impl Into<String>, password: &str, secret: Secret) -> Self {
        Self {
            id: id.into(),
            secret,
            password_digest: digest(password),
        }
    }
}

impl UserRecord for MemoryUser {
    fn id(&self) -> &str {
        &self.id
    }

    fn secret(&self) -> &Secret {
        &self.secret
    }

    fn equals_password(&self, candidate: &str) -> bool {
        digest(candidate)[..].ct_eq(&self.password_digest[..]).into()
    }
}

fn digest(password: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(password.as_bytes()));
    out
}

/// In-memory storage adapter for twostep.
///
/// Cloning is cheap and clones share the same data. Data is lost when the
/// process exits.
#[derive(Debug, Clone)]
pub struct MemoryAdapter {
    users: Store<String, Arc<MemoryUser>>,
    sessions: Store<String, SessionRecord>,
    used_codes: Store<(String, OtpCode), UsedOtpRecord>,
    ttl: SessionTtl,
    clock: Arc<dyn Clock>,
}

impl MemoryAdapter {
    /// Creates a new adapter with default TTLs and the system clock.
    pub fn new() -> Self {
        Self::with_clock(SessionTtl::default(), Arc::new(SystemClock))
    }

    /// Creates a new adapter with the given TTLs and clock.
    pub fn with_clock(ttl: SessionTtl, clock: Arc<dyn Clock>) -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            used_codes: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            clock,
        }
    }

    /// Returns the session TTLs.
    pub fn ttl(&self) -> SessionTtl {
        self.ttl
    }

    /// Adds or replaces a user in the directory.
    pub async fn insert_user(&self, id: impl Into<String>, password: &str, secret: Secret) {
        let user = MemoryUser::new(id, password, secret);
        let mut users = self.users.write().await;
        users.insert(user.id.clone(), Arc::new(user));
    }

    /// Clears all stored data, users included.
    pub async fn clear(&self) {
        self.users.write().await.clear();
        self.sessions.write().await.clear();
        self.used_codes.write().await.clear();
    }

    /// Returns the number of sessions stored, expired ones included.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns the number of used-code records stored, expired ones included.
    pub async fn used_code_count(&self) -> usize {
        self.used_codes.read().await.len()
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== User Directory ====================

#[async_trait]
impl UserDirectory for MemoryAdapter {
    async fn find_user_by_id(&self, id: &str) -> AuthResult<Option<Arc<dyn UserRecord>>> {
        let users = self.users.read().await;
        Ok(users
            .get(id)
            .map(|user| Arc::clone(user) as Arc<dyn UserRecord>))
    }
}

// ==================== Session Operations ====================

#[async_trait]
impl SessionStore for MemoryAdapter {
    async fn create_session(&self, kind: SessionKind, user_id: &str) -> AuthResult<SessionToken> {
        let now = self.clock.now();
        let record = SessionRecord::new(user_id, kind, now, self.ttl.for_kind(kind))?;

        let mut sessions = self.sessions.write().await;
        let token = loop {
            let candidate = SessionToken::generate();
            if !sessions.contains_key(candidate.as_str()) {
                break candidate;
            }
        };
        sessions.insert(token.as_str().to_string(), record);
        Ok(token)
    }

    async fn resolve_session(&self, token: &SessionToken) -> AuthResult<SessionRecord> {
        let sessions = self.sessions.read().await;
        let record = sessions
            .get(token.as_str())
            .ok_or(AuthError::SessionNotFound)?;

        if record.is_expired_at(self.clock.now()) {
            return Err(AuthError::SessionExpired);
        }
        Ok(record.clone())
    }

    async fn invalidate(&self, token: &SessionToken) -> AuthResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(token.as_str());
        Ok(())
    }

    async fn consume(&self, token: &SessionToken) -> AuthResult<SessionRecord> {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .remove(token.as_str())
            .ok_or(AuthError::SessionNotFound)?;

        if record.is_expired_at(self.clock.now()) {
            return Err(AuthError::SessionExpired);
        }
        Ok(record)
    }

    async fn purge_expired(&self) -> AuthResult<usize> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| !record.is_expired_at(now));
        let purged = before - sessions.len();
        if purged > 0 {
            tracing::debug!(purged, "purged expired sessions");
        }
        Ok(purged)
    }
}

// ==================== Replay Guard ====================

#[async_trait]
impl ReplayGuard for MemoryAdapter {
    async fn is_used(&self, user_id: &str, code: &OtpCode) -> AuthResult<bool> {
        let now = self.clock.now();
        let used_codes = self.used_codes.read().await;
        Ok(used_codes
            .get(&(user_id.to_string(), code.clone()))
            .is_some_and(|record| !record.is_expired_at(now)))
    }

    async fn mark_used(
        &self,
        user_id: &str,
        code: &OtpCode,
        time_step: u64,
        expires_at: DateTime<Utc>,
    ) -> AuthResult<()> {
        let now = self.clock.now();
        let key = (user_id.to_string(), code.clone());

        // Check and insert under one write guard.
        let mut used_codes = self.used_codes.write().await;
        if used_codes
            .get(&key)
            .is_some_and(|existing| !existing.is_expired_at(now))
        {
            return Err(AuthError::Conflict);
        }

        used_codes.insert(
            key,
            UsedOtpRecord {
                user_id: user_id.to_string(),
                code: code.clone(),
                time_step,
                expires_at,
            },
        );
        Ok(())
    }

    async fn purge_expired(&self) -> AuthResult<usize> {
        let now = self.clock.now();
        let mut used_codes = self.used_codes.write().await;
        let before = used_codes.len();
        used_codes.retain(|_, record| !record.is_expired_at(now));
        let purged = before - used_codes.len();
        if purged > 0 {
            tracing::debug!(purged, "purged expired used-code records");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use twostep_core::clock::ManualClock;

    fn adapter_at(start: i64) -> (MemoryAdapter, ManualClock) {
        let clock = ManualClock::at_unix(start);
        let adapter = MemoryAdapter::with_clock(SessionTtl::default(), Arc::new(clock.clone()));
        (adapter, clock)
    }

    fn code(value: &str) -> OtpCode {
        OtpCode::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_find_user_and_check_password() {
        let adapter = MemoryAdapter::new();
        adapter
            .insert_user("alice", "correct horse", Secret::generate())
            .await;

        let user = adapter.find_user_by_id("alice").await.unwrap().unwrap();
        assert_eq!(user.id(), "alice");
        assert!(user.equals_password("correct horse"));
        assert!(!user.equals_password("battery staple"));

        assert!(adapter.find_user_by_id("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_operations() {
        let (adapter, _clock) = adapter_at(1_700_000_000);

        let token = adapter
            .create_session(SessionKind::OtpPending, "alice")
            .await
            .unwrap();
        let record = adapter.resolve_session(&token).await.unwrap();
        assert_eq!(record.user_id, "alice");
        assert_eq!(record.kind, SessionKind::OtpPending);

        adapter.invalidate(&token).await.unwrap();
        assert!(matches!(
            adapter.resolve_session(&token).await,
            Err(AuthError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_unknown_token_is_not_found() {
        let adapter = MemoryAdapter::new();
        let token = SessionToken::from_string("made-up");
        assert!(matches!(
            adapter.resolve_session(&token).await,
            Err(AuthError::SessionNotFound)
        ));
        // Invalidating an unknown token is fine.
        adapter.invalidate(&token).await.unwrap();
    }

    #[tokio::test]
    async fn test_session_expiry_by_kind() {
        let (adapter, clock) = adapter_at(1_700_000_000);

        let pending = adapter
            .create_session(SessionKind::OtpPending, "alice")
            .await
            .unwrap();
        let full = adapter
            .create_session(SessionKind::Authenticated, "alice")
            .await
            .unwrap();

        clock.advance(Duration::minutes(5));
        assert!(matches!(
            adapter.resolve_session(&pending).await,
            Err(AuthError::SessionExpired)
        ));
        assert!(adapter.resolve_session(&full).await.is_ok());

        assert_eq!(adapter.purge_expired_sessions().await, 1);
        assert!(matches!(
            adapter.resolve_session(&pending).await,
            Err(AuthError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_consume_removes_token_once() {
        let (adapter, clock) = adapter_at(1_700_000_000);

        let token = adapter
            .create_session(SessionKind::OtpPending, "alice")
            .await
            .unwrap();
        let record = adapter.consume(&token).await.unwrap();
        assert_eq!(record.user_id, "alice");
        assert!(matches!(
            adapter.consume(&token).await,
            Err(AuthError::SessionNotFound)
        ));

        let stale = adapter
            .create_session(SessionKind::OtpPending, "alice")
            .await
            .unwrap();
        clock.advance(Duration::minutes(5));
        assert!(matches!(
            adapter.consume(&stale).await,
            Err(AuthError::SessionExpired)
        ));
        assert_eq!(adapter.session_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consume_has_one_winner() {
        let adapter = MemoryAdapter::new();
        let token = adapter
            .create_session(SessionKind::OtpPending, "alice")
            .await
            .unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let adapter = adapter.clone();
            let token = token.clone();
            tasks.spawn(async move { adapter.consume(&token).await });
        }

        let mut winners = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(_) => winners += 1,
                Err(AuthError::SessionNotFound) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_session_past_calendar_end_is_refused() {
        let clock = ManualClock::at_unix(1_700_000_000);
        clock.set(DateTime::<Utc>::MAX_UTC - Duration::minutes(1));
        let adapter = MemoryAdapter::with_clock(SessionTtl::default(), Arc::new(clock));

        let result = adapter
            .create_session(SessionKind::Authenticated, "alice")
            .await;
        assert!(matches!(result, Err(AuthError::InternalError { .. })));
        assert_eq!(adapter.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_mark_used_twice_conflicts() {
        let (adapter, clock) = adapter_at(60);
        let expires = clock.now() + Duration::seconds(60);

        assert!(!adapter.is_used("alice", &code("287082")).await.unwrap());
        adapter
            .mark_used("alice", &code("287082"), 2, expires)
            .await
            .unwrap();
        assert!(adapter.is_used("alice", &code("287082")).await.unwrap());

        let second = adapter.mark_used("alice", &code("287082"), 2, expires).await;
        assert!(matches!(second, Err(AuthError::Conflict)));
    }

    #[tokio::test]
    async fn test_used_codes_are_scoped_per_user() {
        let (adapter, clock) = adapter_at(60);
        let expires = clock.now() + Duration::seconds(60);

        adapter
            .mark_used("alice", &code("287082"), 2, expires)
            .await
            .unwrap();
        assert!(!adapter.is_used("bob", &code("287082")).await.unwrap());
        adapter
            .mark_used("bob", &code("287082"), 2, expires)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_expired_used_code_can_recur() {
        let (adapter, clock) = adapter_at(60);
        let expires = clock.now() + Duration::seconds(60);

        adapter
            .mark_used("alice", &code("287082"), 2, expires)
            .await
            .unwrap();

        clock.advance(Duration::seconds(60));
        assert!(!adapter.is_used("alice", &code("287082")).await.unwrap());

        // The same digits at a much later step are a different code.
        adapter
            .mark_used("alice", &code("287082"), 9_000, clock.now() + Duration::seconds(60))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_purge_used_codes() {
        let (adapter, clock) = adapter_at(60);

        adapter
            .mark_used("alice", &code("111111"), 2, clock.now() + Duration::seconds(30))
            .await
            .unwrap();
        adapter
            .mark_used("alice", &code("222222"), 3, clock.now() + Duration::seconds(90))
            .await
            .unwrap();

        clock.advance(Duration::seconds(45));
        let purged = ReplayGuard::purge_expired(&adapter).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(adapter.used_code_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mark_used_has_one_winner() {
        let adapter = MemoryAdapter::new();
        let expires = Utc::now() + Duration::seconds(90);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let adapter = adapter.clone();
            tasks.spawn(async move {
                adapter
                    .mark_used("alice", &OtpCode::new("424242").unwrap(), 7, expires)
                    .await
            });
        }

        let mut winners = 0;
        let mut conflicts = 0;
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(()) => winners += 1,
                Err(AuthError::Conflict) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(conflicts, 15);
    }

    impl MemoryAdapter {
        async fn purge_expired_sessions(&self) -> usize {
            SessionStore::purge_expired(self).await.unwrap()
        }
    }
}
