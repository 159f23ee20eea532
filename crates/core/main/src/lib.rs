//! # Twostep
//!
//! A two-factor login core: an id/password check followed by an RFC 6238
//! one-time code, with single-use codes and opaque session tokens.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use twostep::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), AuthError> {
//!     let adapter = Arc::new(MemoryAdapter::new());
//!     adapter.insert_user("alice", "pw", Secret::generate()).await;
//!
//!     let login = TwoStepLogin::builder(TwoFactorConfig::default())
//!         .adapter(adapter)
//!         .build()?;
//!
//!     let pending = login.begin_password_login("alice", "pw").await?;
//!     let session = login.submit_otp(&pending, "287082").await?;
//!     let user_id = login.authenticate(&session).await?;
//!
//!     Ok(())
//! }
//! ```

// Re-export core types
pub use twostep_core::*;

/// TOTP generation and verification.
pub mod otp {
    pub use twostep_otp::*;
}

/// The login state machine and page handlers.
pub mod login {
    pub use twostep_two_factor::*;
}

/// Store implementations.
pub mod adapters {
    pub use twostep_adapter_memory::{MemoryAdapter, MemoryUser};
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use twostep_adapter_memory::MemoryAdapter;
    pub use twostep_core::clock::{Clock, ManualClock, SystemClock};
    pub use twostep_core::error::{AuthError, AuthResult};
    pub use twostep_core::traits::{ReplayGuard, SessionStore, UserDirectory, UserRecord};
    pub use twostep_core::types::{OtpCode, Secret, SessionKind, SessionToken, SessionTtl};
    pub use twostep_otp::{TotpEngine, TotpOptions};
    pub use twostep_two_factor::{
        LoginFlow, LoginState, TwoFactorConfig, TwoStepLogin, TwoStepLoginBuilder,
    };
}
