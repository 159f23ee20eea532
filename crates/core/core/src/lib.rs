//! # Twostep Core
//!
//! This crate provides the foundational types and traits for twostep, a
//! password-then-TOTP login core. It defines the data model (secrets, codes,
//! session tokens), the error taxonomy, and the store interfaces that
//! adapters must implement.

pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items at the crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthError, AuthResult};
pub use traits::{ReplayGuard, SessionStore, UserDirectory, UserRecord};
pub use types::{
    OtpCode, Secret, SessionKind, SessionRecord, SessionToken, SessionTtl, UsedOtpRecord,
};
