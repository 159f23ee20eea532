//! Server configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use twostep_core::types::{Secret, SessionTtl};
use twostep_otp::TotpOptions;
use twostep_two_factor::{CookieNames, TwoFactorConfig};

/// Complete configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub login: LoginConfig,
    pub users: Vec<UserSeed>,
}

/// Server-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Log level, used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Seconds between expiry sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            sweep_interval_secs: 60,
        }
    }
}

/// Login configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    /// Issuer shown in authenticator apps.
    pub issuer: String,
    /// OTP-pending session lifetime in seconds.
    pub pending_ttl_secs: i64,
    /// Authenticated session lifetime in seconds.
    pub session_ttl_secs: i64,
    /// Store call timeout in milliseconds.
    pub store_timeout_ms: u64,
    pub totp: TotpSection,
    pub cookies: CookieSection,
}

impl Default for LoginConfig {
    fn default() -> Self {
        let ttl = SessionTtl::default();
        Self {
            issuer: "twostep".to_string(),
            pending_ttl_secs: ttl.pending.num_seconds(),
            session_ttl_secs: ttl.authenticated.num_seconds(),
            store_timeout_ms: 2_000,
            totp: TotpSection::default(),
            cookies: CookieSection::default(),
        }
    }
}

/// TOTP parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TotpSection {
    pub digits: u32,
    pub period: u64,
    pub window: u64,
}

impl Default for TotpSection {
    fn default() -> Self {
        let options = TotpOptions::default();
        Self {
            digits: options.digits,
            period: options.period,
            window: options.window,
        }
    }
}

/// Cookie names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSection {
    pub pending: String,
    pub session: String,
    pub flash: String,
}

impl Default for CookieSection {
    fn default() -> Self {
        let names = CookieNames::default();
        Self {
            pending: names.pending,
            session: names.authenticated,
            flash: names.flash,
        }
    }
}

/// A user to load into the in-memory directory at startup.
#[derive(Clone, Serialize, Deserialize)]
pub struct UserSeed {
    pub id: String,
    pub password: String,
    /// Base32 TOTP secret.
    pub secret: String,
}

impl std::fmt::Debug for UserSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSeed")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl UserSeed {
    /// Decodes the configured secret.
    pub fn decode_secret(&self) -> Result<Secret, ConfigError> {
        Secret::from_base32(&self.secret)
            .map_err(|err| ConfigError::Invalid(format!("user {}: {}", self.id, err)))
    }
}

impl LoginConfig {
    /// Converts the file representation into a validated login configuration.
    pub fn to_two_factor_config(&self) -> Result<TwoFactorConfig, ConfigError> {
        let options = TotpOptions::new(self.totp.digits, self.totp.period)
            .with_window(self.totp.window);
        let ttl = SessionTtl::new(
            ttl_seconds("pending_ttl_secs", self.pending_ttl_secs)?,
            ttl_seconds("session_ttl_secs", self.session_ttl_secs)?,
        );
        let config = TwoFactorConfig::new()
            .issuer(self.issuer.clone())
            .totp_options(options)
            .session_ttl(ttl)
            .store_timeout(std::time::Duration::from_millis(self.store_timeout_ms))
            .cookies(CookieNames {
                pending: self.cookies.pending.clone(),
                authenticated: self.cookies.session.clone(),
                flash: self.cookies.flash.clone(),
            });

        config
            .validate()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        Ok(config)
    }
}

fn ttl_seconds(field: &str, seconds: i64) -> Result<Duration, ConfigError> {
    Duration::try_seconds(seconds)
        .ok_or_else(|| ConfigError::Invalid(format!("{field} is out of range")))
}

impl AppConfig {
    /// Checks cross-field rules not expressible in the file format.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        self.login.to_two_factor_config()?;

        let mut seen = HashSet::new();
        for user in &self.users {
            if user.id.is_empty() {
                return Err(ConfigError::Invalid("user id must not be empty".to_string()));
            }
            if !seen.insert(user.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate user id {}", user.id)));
            }
            user.decode_secret()?;
        }
        Ok(())
    }
}

/// Parses configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig =
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Loads configuration from a TOML file.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
    parse_config(&content)
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[server]
log_level = "debug"
sweep_interval_secs = 30

[login]
issuer = "Example"
pending_ttl_secs = 120

[login.totp]
window = 2

[[users]]
id = "alice"
password = "pw"
secret = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ"
"#;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.sweep_interval_secs, 60);
        assert_eq!(config.login.pending_ttl_secs, 300);
        assert_eq!(config.login.session_ttl_secs, 7 * 24 * 60 * 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_sample() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.login.issuer, "Example");
        assert_eq!(config.login.totp.digits, 6);
        assert_eq!(config.users.len(), 1);

        let login = config.login.to_two_factor_config().unwrap();
        assert_eq!(login.session_ttl.pending, Duration::seconds(120));
        assert_eq!(login.totp_options.window, 2);
        assert_eq!(login.cookies.pending, "otp_session");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert!(config.users.is_empty());
        assert_eq!(config.login.store_timeout_ms, 2_000);
    }

    #[test]
    fn test_bad_secret_is_rejected() {
        let text = r#"
[[users]]
id = "bob"
password = "pw"
secret = "not base32!"
"#;
        assert!(matches!(parse_config(text), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_duplicate_users_are_rejected() {
        let text = format!("{SAMPLE}\n[[users]]\nid = \"alice\"\npassword = \"x\"\nsecret = \"GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ\"\n");
        assert!(matches!(parse_config(&text), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_pending_ttl_must_be_shorter() {
        let text = "[login]\npending_ttl_secs = 600\nsession_ttl_secs = 300\n";
        assert!(matches!(parse_config(text), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_oversized_ttls_are_rejected() {
        let text = format!("[login]\nsession_ttl_secs = {}\n", i64::MAX);
        assert!(matches!(parse_config(&text), Err(ConfigError::Invalid(_))));

        let text = "[login]\nsession_ttl_secs = 9000000000000\n";
        assert!(matches!(parse_config(text), Err(ConfigError::Invalid(_))));

        let text = "[login]\npending_ttl_secs = -9223372036854775808\n";
        assert!(matches!(parse_config(text), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(parse_config("[server"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_seed_debug_hides_secrets() {
        let config = parse_config(SAMPLE).unwrap();
        let debug = format!("{:?}", config.users[0]);
        assert!(!debug.contains("GEZD"));
        assert!(!debug.contains("pw"));
    }
}
