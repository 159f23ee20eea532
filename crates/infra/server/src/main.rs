//! Twostep server binary.
//!
//! Usage: `twostep-server [config.toml]`. The path may also come from
//! `TWOSTEP_CONFIG`; with neither, built-in defaults are used.

use tracing_subscriber::EnvFilter;
use twostep_server::{AppConfig, LoginServer, load_config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TWOSTEP_CONFIG").ok());
    let config = match path.as_deref() {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match path.as_deref() {
        Some(path) => tracing::info!(path, "configuration loaded"),
        None => tracing::info!("no configuration file given, using defaults"),
    }

    let server = LoginServer::from_config(config).await?;
    server.run().await?;

    Ok(())
}
