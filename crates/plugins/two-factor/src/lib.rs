//! # Twostep Two-Factor
//!
//! The password-then-TOTP login. This crate holds the state machine that
//! moves a visitor from anonymous, through an OTP-pending session, to an
//! authenticated one, and the page handlers that drive it from form posts
//! and cookies.
//!
//! Stores are injected as trait objects; see `twostep_core::traits`.

mod config;
mod handlers;
mod login;

pub use config::{CookieNames, FlowPaths, TwoFactorConfig};
pub use handlers::{
    CookieChange, FlowResponse, LoginFlow, LoginForm, LoginView, OtpForm, Page, RequestCookies,
};
pub use login::{LoginState, PurgeReport, TwoStepLogin, TwoStepLoginBuilder};
pub use twostep_otp::{TotpEngine, TotpOptions, TotpUri};
