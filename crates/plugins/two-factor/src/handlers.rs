//! Request handlers for the two-step login pages.
//!
//! Handlers take the cookies and form fields a transport extracted and
//! return what to render or where to redirect, along with the cookie
//! changes to apply. They never see raw HTTP.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use twostep_core::error::{
    AuthError, MSG_CODE_ALREADY_USED, MSG_INVALID_CODE, MSG_INVALID_CREDENTIALS,
    MSG_SESSION_EXPIRED, MSG_UNEXPECTED,
};
use twostep_core::types::SessionToken;

use crate::config::CookieNames;
use crate::login::{LoginState, TwoStepLogin};

/// How long a flash message survives between a redirect and the next render.
const FLASH_MAX_AGE_SECS: i64 = 60;

/// Cookies relevant to the login, as presented by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCookies {
    pub pending: Option<String>,
    pub session: Option<String>,
    pub flash: Option<String>,
}

impl RequestCookies {
    /// Picks the login cookies out of `name=value` pairs.
    pub fn from_pairs<'a>(
        names: &CookieNames,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut cookies = Self::default();
        for (name, value) in pairs {
            let slot = if name == names.pending {
                &mut cookies.pending
            } else if name == names.authenticated {
                &mut cookies.session
            } else if name == names.flash {
                &mut cookies.flash
            } else {
                continue;
            };
            if !value.is_empty() {
                *slot = Some(value.to_string());
            }
        }
        cookies
    }

    fn pending_token(&self) -> Option<SessionToken> {
        self.pending.as_deref().map(SessionToken::from_string)
    }

    fn session_token(&self) -> Option<SessionToken> {
        self.session.as_deref().map(SessionToken::from_string)
    }
}

/// Body of the password form.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    pub id: String,
    pub password: String,
}

/// Body of the one-time code form.
#[derive(Debug, Clone, Deserialize)]
pub struct OtpForm {
    pub otp: String,
}

/// Which page to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    Login,
    OtpLogin,
}

/// Data handed to the page template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoginView {
    pub error: Option<String>,
}

/// A cookie to set or remove on the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieChange {
    Set {
        name: String,
        value: String,
        max_age: Duration,
    },
    Clear {
        name: String,
    },
}

/// What the transport should send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowResponse {
    Render {
        page: Page,
        view: LoginView,
        cookies: Vec<CookieChange>,
    },
    Redirect {
        location: String,
        cookies: Vec<CookieChange>,
    },
}

impl FlowResponse {
    /// Gets the cookie changes of either variant.
    pub fn cookies(&self) -> &[CookieChange] {
        match self {
            Self::Render { cookies, .. } | Self::Redirect { cookies, .. } => cookies,
        }
    }
}

/// The login pages, bound to a [`TwoStepLogin`].
#[derive(Debug, Clone)]
pub struct LoginFlow {
    login: Arc<TwoStepLogin>,
}

impl LoginFlow {
    /// Creates the flow.
    pub fn new(login: Arc<TwoStepLogin>) -> Self {
        Self { login }
    }

    /// Gets the underlying state machine.
    pub fn machine(&self) -> &TwoStepLogin {
        &self.login
    }

    /// GET of the password page.
    ///
    /// Authenticated visitors go to the index. A leftover pending token is
    /// dropped, since showing this page restarts the login.
    pub async fn show_login(&self, cookies: &RequestCookies) -> FlowResponse {
        let state = match self.state(cookies).await {
            Ok(state) => state,
            Err(_) => return self.render(Page::Login, Some(MSG_UNEXPECTED), vec![]),
        };
        if state.is_authenticated() {
            return self.redirect(&self.paths().index, vec![]);
        }

        let mut changes = self.take_flash(cookies);
        if let Some(pending) = cookies.pending_token() {
            if let Err(err) = self.login.logout(&pending).await {
                tracing::warn!(error = %err, "could not drop abandoned pending session");
            }
            changes.push(self.clear(&self.names().pending));
        }
        let error = flash_message(cookies);
        self.render(Page::Login, error, changes)
    }

    /// POST of the password page.
    ///
    /// Failures redirect back to the form with a flash message.
    pub async fn login(&self, form: &LoginForm) -> FlowResponse {
        match self.login.begin_password_login(&form.id, &form.password).await {
            Ok(token) => {
                let ttl = self.login.config().session_ttl.pending;
                let set = self.set(&self.names().pending, token.into_string(), ttl);
                self.redirect(&self.paths().otp_login, vec![set])
            }
            Err(err) => self.fail(&self.paths().login, &err),
        }
    }

    /// GET of the one-time code page.
    ///
    /// Only visitors in the pending state see the form; everyone else is
    /// sent back to the password page.
    pub async fn show_otp_login(&self, cookies: &RequestCookies) -> FlowResponse {
        match self.state(cookies).await {
            Ok(LoginState::OtpPending { .. }) => {
                let changes = self.take_flash(cookies);
                self.render(Page::OtpLogin, flash_message(cookies), changes)
            }
            Ok(LoginState::Authenticated { .. }) => self.redirect(&self.paths().index, vec![]),
            Ok(LoginState::Anonymous) => {
                let mut changes = Vec::new();
                if cookies.pending.is_some() {
                    changes.push(self.clear(&self.names().pending));
                    changes.push(self.set_flash(MSG_SESSION_EXPIRED));
                }
                self.redirect(&self.paths().login, changes)
            }
            Err(_) => self.render(Page::OtpLogin, Some(MSG_UNEXPECTED), vec![]),
        }
    }

    /// POST of the one-time code page.
    pub async fn otp_login(&self, cookies: &RequestCookies, form: &OtpForm) -> FlowResponse {
        let Some(pending) = cookies.pending_token() else {
            return self.redirect(&self.paths().login, vec![]);
        };

        match self.login.submit_otp(&pending, &form.otp).await {
            Ok(token) => {
                let ttl = self.login.config().session_ttl.authenticated;
                let changes = vec![
                    self.clear(&self.names().pending),
                    self.set(&self.names().authenticated, token.into_string(), ttl),
                ];
                self.redirect(&self.paths().index, changes)
            }
            Err(AuthError::SessionNotFound | AuthError::SessionExpired) => {
                let changes = vec![
                    self.clear(&self.names().pending),
                    self.set_flash(MSG_SESSION_EXPIRED),
                ];
                self.redirect(&self.paths().login, changes)
            }
            Err(err) => self.fail(&self.paths().otp_login, &err),
        }
    }

    /// Ends whatever session the visitor holds.
    pub async fn logout(&self, cookies: &RequestCookies) -> FlowResponse {
        let mut changes = Vec::new();
        for (token, name) in [
            (cookies.session_token(), &self.names().authenticated),
            (cookies.pending_token(), &self.names().pending),
        ] {
            if let Some(token) = token {
                if let Err(err) = self.login.logout(&token).await {
                    tracing::warn!(error = %err, "logout could not invalidate session");
                }
                changes.push(self.clear(name));
            }
        }
        self.redirect(&self.paths().login, changes)
    }

    async fn state(&self, cookies: &RequestCookies) -> Result<LoginState, AuthError> {
        let pending = cookies.pending_token();
        let session = cookies.session_token();
        self.login
            .state(pending.as_ref(), session.as_ref())
            .await
            .inspect_err(|err| tracing::error!(error = %err, "could not determine login state"))
    }

    /// Redirects back to `location` with the error's generic message as flash.
    fn fail(&self, location: &str, err: &AuthError) -> FlowResponse {
        if !err.is_user_error() {
            tracing::error!(error = %err, "login step failed");
        }
        self.redirect(location, vec![self.set_flash(err.user_message())])
    }

    fn take_flash(&self, cookies: &RequestCookies) -> Vec<CookieChange> {
        match cookies.flash {
            Some(_) => vec![self.clear(&self.names().flash)],
            None => Vec::new(),
        }
    }

    fn set_flash(&self, message: &str) -> CookieChange {
        self.set(
            &self.names().flash,
            message.to_string(),
            Duration::seconds(FLASH_MAX_AGE_SECS),
        )
    }

    fn set(&self, name: &str, value: String, max_age: Duration) -> CookieChange {
        CookieChange::Set {
            name: name.to_string(),
            value,
            max_age,
        }
    }

    fn clear(&self, name: &str) -> CookieChange {
        CookieChange::Clear {
            name: name.to_string(),
        }
    }

    fn render(&self, page: Page, error: Option<&str>, cookies: Vec<CookieChange>) -> FlowResponse {
        FlowResponse::Render {
            page,
            view: LoginView {
                error: error.map(str::to_string),
            },
            cookies,
        }
    }

    fn redirect(&self, location: &str, cookies: Vec<CookieChange>) -> FlowResponse {
        FlowResponse::Redirect {
            location: location.to_string(),
            cookies,
        }
    }

    fn names(&self) -> &CookieNames {
        &self.login.config().cookies
    }

    fn paths(&self) -> &crate::config::FlowPaths {
        &self.login.config().paths
    }
}

/// Maps a flash cookie back to one of the fixed messages.
///
/// The cookie is client-controlled, so anything else is dropped.
fn flash_message(cookies: &RequestCookies) -> Option<&'static str> {
    let value = cookies.flash.as_deref()?;
    [
        MSG_INVALID_CREDENTIALS,
        MSG_INVALID_CODE,
        MSG_CODE_ALREADY_USED,
        MSG_SESSION_EXPIRED,
        MSG_UNEXPECTED,
    ]
    .into_iter()
    .find(|known| *known == value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> CookieNames {
        CookieNames::default()
    }

    #[test]
    fn test_cookies_from_pairs() {
        let cookies = RequestCookies::from_pairs(
            &names(),
            [("otp_session", "abc"), ("theme", "dark"), ("session", "")],
        );
        assert_eq!(cookies.pending.as_deref(), Some("abc"));
        assert_eq!(cookies.session, None);
        assert_eq!(cookies.flash, None);
    }

    #[test]
    fn test_flash_message_only_accepts_known_text() {
        let known = RequestCookies {
            flash: Some(MSG_SESSION_EXPIRED.to_string()),
            ..Default::default()
        };
        assert_eq!(flash_message(&known), Some(MSG_SESSION_EXPIRED));

        let forged = RequestCookies {
            flash: Some("<script>".to_string()),
            ..Default::default()
        };
        assert_eq!(flash_message(&forged), None);
    }

    #[test]
    fn test_login_view_serialization() {
        let view = LoginView {
            error: Some(MSG_INVALID_CODE.to_string()),
        };
        let json = serde_json::to_string(&view).unwrap();
        assert_eq!(json, r#"{"error":"otp is not correct"}"#);

        let empty = serde_json::to_string(&LoginView::default()).unwrap();
        assert_eq!(empty, r#"{"error":null}"#);
    }

    #[test]
    fn test_forms_deserialize() {
        let form: LoginForm = serde_json::from_str(r#"{"id":"alice","password":"pw"}"#).unwrap();
        assert_eq!(form.id, "alice");

        let form: OtpForm = serde_json::from_str(r#"{"otp":"287082"}"#).unwrap();
        assert_eq!(form.otp, "287082");
    }
}
