//! Configuration for the two-step login.

use std::time::Duration;
use twostep_core::error::{AuthError, AuthResult};
use twostep_core::types::SessionTtl;
use twostep_otp::TotpOptions;

/// Names of the cookies the login flow reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieNames {
    /// Carries the OTP-pending token. Default: "otp_session".
    pub pending: String,
    /// Carries the authenticated token. Default: "session".
    pub authenticated: String,
    /// Carries a one-shot error message between redirects. Default: "flash".
    pub flash: String,
}

impl Default for CookieNames {
    fn default() -> Self {
        Self {
            pending: "otp_session".to_string(),
            authenticated: "session".to_string(),
            flash: "flash".to_string(),
        }
    }
}

/// Locations the login flow redirects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowPaths {
    /// Landing page for authenticated users. Default: "/".
    pub index: String,
    /// Password form. Default: "/login".
    pub login: String,
    /// One-time code form. Default: "/login/otp".
    pub otp_login: String,
}

impl Default for FlowPaths {
    fn default() -> Self {
        Self {
            index: "/".to_string(),
            login: "/login".to_string(),
            otp_login: "/login/otp".to_string(),
        }
    }
}

/// Configuration for the two-step login.
#[derive(Debug, Clone)]
pub struct TwoFactorConfig {
    /// The issuer name for TOTP (displayed in authenticator apps).
    pub issuer: String,
    /// TOTP options.
    pub totp_options: TotpOptions,
    /// Session lifetimes per kind.
    pub session_ttl: SessionTtl,
    /// Upper bound on every store and directory call. Default: 2 seconds.
    pub store_timeout: Duration,
    /// Cookie names used by the login flow.
    pub cookies: CookieNames,
    /// Redirect targets used by the login flow.
    pub paths: FlowPaths,
}

impl Default for TwoFactorConfig {
    fn default() -> Self {
        Self {
            issuer: "twostep".to_string(),
            totp_options: TotpOptions::default(),
            session_ttl: SessionTtl::default(),
            store_timeout: Duration::from_secs(2),
            cookies: CookieNames::default(),
            paths: FlowPaths::default(),
        }
    }
}

impl TwoFactorConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the issuer name.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Sets TOTP options.
    pub fn totp_options(mut self, options: TotpOptions) -> Self {
        self.totp_options = options;
        self
    }

    /// Sets session lifetimes.
    pub fn session_ttl(mut self, ttl: SessionTtl) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Sets the store call timeout.
    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Sets cookie names.
    pub fn cookies(mut self, cookies: CookieNames) -> Self {
        self.cookies = cookies;
        self
    }

    /// Sets redirect targets.
    pub fn paths(mut self, paths: FlowPaths) -> Self {
        self.paths = paths;
        self
    }

    /// Checks every section of the configuration.
    pub fn validate(&self) -> AuthResult<()> {
        self.totp_options.validate()?;
        self.session_ttl.validate()?;

        if self.store_timeout.is_zero() {
            return Err(AuthError::config("store timeout must be positive"));
        }

        let names = [
            &self.cookies.pending,
            &self.cookies.authenticated,
            &self.cookies.flash,
        ];
        if names.iter().any(|name| name.is_empty()) {
            return Err(AuthError::config("cookie names must not be empty"));
        }
        if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
            return Err(AuthError::config("cookie names must be distinct"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TwoFactorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_shared_cookie_name_is_rejected() {
        let config = TwoFactorConfig::new().cookies(CookieNames {
            pending: "sid".to_string(),
            authenticated: "sid".to_string(),
            flash: "flash".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_totp_options_are_rejected() {
        let config = TwoFactorConfig::new().totp_options(TotpOptions::new(5, 30));
        assert!(matches!(
            config.validate(),
            Err(AuthError::ConfigurationError { .. })
        ));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let config = TwoFactorConfig::new().store_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
