//! # Launchpad Client
//!
//! Runs a read-only status check against the configured launchpad
//! deployment: verifies the program account points at its derived
//! program-data account and reports whether the global config exists.
//!
//! ## Environment Setup
//! `LAUNCHPAD_PROGRAM_ID` and `LAUNCHPAD_TOKEN_MINT` are required; see
//! `config.rs` for the rest. A `.env` file in the working directory is read
//! first.
//!
//! ```bash
//! RUST_LOG=debug cargo run
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use launchpad_client::{
    LaunchpadClient,
    config::Config,
    services::{KeypairSigner, RpcClientEndpoint},
};
use solana_sdk::signature::Keypair;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .compact(),
        )
        .init();

    tracing::info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("failed to load configuration")?;
    let rpc = Arc::new(RpcClientEndpoint::new(&config.rpc.url, config.rpc.commitment));
    tracing::info!(rpc = %rpc.url(), program = %config.program.program_id, "connecting");

    // Status checks never sign, so an ephemeral key is enough without SIGNER_KEYPAIR
    let signer = match &config.signer_keypair {
        Some(secret) => KeypairSigner::from_base58(secret).context("SIGNER_KEYPAIR")?,
        None => KeypairSigner::new(Keypair::new()),
    };
    let client = LaunchpadClient::new(config.client_settings(), rpc, Arc::new(signer));

    let status = client
        .program_status()
        .await
        .context("program status check failed")?;
    println!("{}", serde_json::to_string_pretty(&status)?);

    if config.signer_keypair.is_some() {
        let wallet = client.wallet();
        match client.fetch_profile(&wallet).await? {
            Some(profile) => tracing::info!(%wallet, username = %profile.fields.username, "profile found"),
            None => tracing::info!(%wallet, "no profile for signer"),
        }
    }

    Ok(())
}
