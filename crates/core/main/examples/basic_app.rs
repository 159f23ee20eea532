//! Basic example walking one user through both login steps.
//!
//! Run with: cargo run --example basic_app

use std::sync::Arc;
use twostep::otp::provisioning_uri;
use twostep::prelude::*;

#[tokio::main]
async fn main() -> Result<(), AuthError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
        .init();

    // Enroll a user with a fresh secret
    let secret = Secret::generate();
    let adapter = Arc::new(MemoryAdapter::new());
    adapter.insert_user("alice", "correct horse", secret.clone()).await;

    let config = TwoFactorConfig::default().issuer("Example");
    let uri = provisioning_uri(&config.issuer, "alice", &secret, &config.totp_options);
    tracing::info!(uri = %uri.uri, "scan into an authenticator app");

    let login = TwoStepLogin::builder(config)
        .adapter(adapter.clone())
        .build()?;

    // First factor
    let pending = login.begin_password_login("alice", "correct horse").await?;
    let state = login.state(Some(&pending), None).await?;
    tracing::info!(?state, "password accepted");

    // Second factor, computed here in place of the authenticator app
    let now = SystemClock.now().timestamp() as u64;
    let code = login.engine().code_at(&secret, now)?;
    let session = login.submit_otp(&pending, code.as_str()).await?;
    let user_id = login.authenticate(&session).await?;
    tracing::info!(%user_id, "logged in");

    // The same code cannot be used twice
    let again = login.begin_password_login("alice", "correct horse").await?;
    match login.submit_otp(&again, code.as_str()).await {
        Err(err) => tracing::info!(reason = err.user_message(), "replay rejected"),
        Ok(_) => tracing::warn!("replay accepted"),
    }

    login.logout(&session).await?;
    let state = login.state(None, Some(&session)).await?;
    tracing::info!(?state, "logged out");

    Ok(())
}
