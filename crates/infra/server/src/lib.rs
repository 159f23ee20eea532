//! # Twostep Server
//!
//! Host process for the login core. Builds the in-memory stores, seeds the
//! user directory from configuration, and keeps expired sessions and
//! replay records swept while the process runs.

mod config;

pub use config::{
    AppConfig, ConfigError, CookieSection, LoginConfig, ServerConfig, TotpSection, UserSeed,
    load_config, parse_config,
};

use std::sync::Arc;
use std::time::Duration;
use twostep_adapter_memory::MemoryAdapter;
use twostep_core::clock::{Clock, SystemClock};
use twostep_core::error::{AuthError, AuthResult};
use twostep_two_factor::{LoginFlow, PurgeReport, TwoStepLogin};

/// Errors raised while assembling or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The assembled login service.
pub struct LoginServer {
    /// Server configuration.
    pub config: ServerConfig,
    adapter: Arc<MemoryAdapter>,
    flow: LoginFlow,
}

impl LoginServer {
    /// Builds the server on the system clock.
    pub async fn from_config(config: AppConfig) -> Result<Self, ServerError> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// Builds the server on the given clock.
    pub async fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> Result<Self, ServerError> {
        config.validate()?;
        let login_config = config.login.to_two_factor_config()?;

        let adapter = Arc::new(MemoryAdapter::with_clock(
            login_config.session_ttl,
            clock.clone(),
        ));
        for user in &config.users {
            adapter
                .insert_user(user.id.clone(), &user.password, user.decode_secret()?)
                .await;
        }
        if config.users.is_empty() {
            tracing::warn!("no users configured, every login will be rejected");
        }

        let login = TwoStepLogin::builder(login_config)
            .adapter(adapter.clone())
            .clock(clock)
            .build()?;

        tracing::info!(users = config.users.len(), "login service assembled");
        Ok(Self {
            config: config.server,
            adapter,
            flow: LoginFlow::new(Arc::new(login)),
        })
    }

    /// Gets the login pages.
    pub fn flow(&self) -> &LoginFlow {
        &self.flow
    }

    /// Gets the state machine.
    pub fn login(&self) -> &TwoStepLogin {
        self.flow.machine()
    }

    /// Gets the backing store.
    pub fn adapter(&self) -> &Arc<MemoryAdapter> {
        &self.adapter
    }

    /// Runs one expiry sweep.
    pub async fn sweep(&self) -> AuthResult<PurgeReport> {
        let report = self.login().purge_expired().await?;
        if report.sessions > 0 || report.used_codes > 0 {
            tracing::info!(
                sessions = report.sessions,
                used_codes = report.used_codes,
                "expired records purged"
            );
        }
        Ok(report)
    }

    /// Sweeps on the configured interval until ctrl-c.
    pub async fn run(&self) -> Result<(), ServerError> {
        let period = Duration::from_secs(self.config.sweep_interval_secs);
        tracing::info!(sweep_interval_secs = period.as_secs(), "server ready");

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = &mut shutdown => {
                    result?;
                    tracing::info!("shutdown requested");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep().await {
                        tracing::error!(error = %err, "expiry sweep failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use twostep_core::ManualClock;
    use twostep_two_factor::{FlowResponse, LoginForm, OtpForm, RequestCookies};

    const ALICE_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    const CONFIG: &str = r#"
[[users]]
id = "alice"
password = "pw"
secret = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ"
"#;

    async fn server(clock: &ManualClock) -> LoginServer {
        let config = parse_config(CONFIG).unwrap();
        LoginServer::with_clock(config, Arc::new(clock.clone()))
            .await
            .unwrap()
    }

    fn set_cookie(response: &FlowResponse, name: &str) -> Option<String> {
        response.cookies().iter().find_map(|change| match change {
            twostep_two_factor::CookieChange::Set { name: n, value, .. } if n == name => {
                Some(value.clone())
            }
            _ => None,
        })
    }

    #[tokio::test]
    async fn test_seeded_user_can_log_in() {
        let clock = ManualClock::at_unix(1_700_000_000);
        let server = server(&clock).await;

        let posted = server
            .flow()
            .login(&LoginForm {
                id: "alice".to_string(),
                password: "pw".to_string(),
            })
            .await;
        let cookies = RequestCookies {
            pending: set_cookie(&posted, "otp_session"),
            ..Default::default()
        };

        let secret = twostep_core::Secret::from_base32(ALICE_SECRET).unwrap();
        let now = clock.now().timestamp() as u64;
        let otp = server.login().engine().code_at(&secret, now).unwrap();
        let done = server
            .flow()
            .otp_login(
                &cookies,
                &OtpForm {
                    otp: otp.as_str().to_string(),
                },
            )
            .await;
        assert!(set_cookie(&done, "session").is_some());
    }

    #[tokio::test]
    async fn test_sweep_purges_expired_records() {
        let clock = ManualClock::at_unix(1_700_000_000);
        let server = server(&clock).await;
        server
            .login()
            .begin_password_login("alice", "pw")
            .await
            .unwrap();

        assert_eq!(server.sweep().await.unwrap(), PurgeReport::default());
        clock.advance(ChronoDuration::minutes(6));
        assert_eq!(server.sweep().await.unwrap().sessions, 1);
        assert_eq!(server.adapter().session_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.server.sweep_interval_secs = 0;
        assert!(matches!(
            LoginServer::from_config(config).await,
            Err(ServerError::Config(_))
        ));
    }
}
