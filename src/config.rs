//! Configuration module for environment variables and client settings

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    pubkey::Pubkey,
};

use crate::onchain_instance::ClientSettings;
use crate::services::submitter::ConfirmationPolicy;

const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";

#[derive(Debug, Clone)]
pub struct Config {
    /// Launchpad program deployment
    pub program: ProgramConfig,

    /// RPC node and confirmation behaviour
    pub rpc: RpcConfig,

    /// Base58 secret key; without it the binary stays read-only
    pub signer_keypair: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProgramConfig {
    pub program_id: Pubkey,
    pub token_mint: Pubkey,
    pub token_decimals: u8,
}

#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub url: String,
    pub commitment: CommitmentConfig,
    pub confirm_max_attempts: u32,
    pub confirm_base_delay: Duration,
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("{} environment variable is required", key))
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{}={:?} is invalid: {}", key, raw, e)),
        None => Ok(default),
    }
}

fn pubkey(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Pubkey> {
    let raw = required(lookup, key)?;
    Pubkey::from_str(raw.trim()).with_context(|| format!("{} is not a base58 address", key))
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token_decimals: u8 = parsed(&lookup, "LAUNCHPAD_TOKEN_DECIMALS", 9)?;
        if token_decimals > 19 {
            return Err(anyhow!("LAUNCHPAD_TOKEN_DECIMALS={} does not fit u64 base units", token_decimals));
        }

        let commitment = match lookup("SOLANA_COMMITMENT") {
            Some(raw) => CommitmentLevel::from_str(raw.trim())
                .map_err(|e| anyhow!("SOLANA_COMMITMENT={:?} is invalid: {}", raw, e))?,
            None => CommitmentLevel::Confirmed,
        };

        let confirm_max_attempts: u32 = parsed(&lookup, "CONFIRM_MAX_ATTEMPTS", 30)?;
        if confirm_max_attempts == 0 {
            return Err(anyhow!("CONFIRM_MAX_ATTEMPTS must be at least 1"));
        }

        Ok(Self {
            program: ProgramConfig {
                program_id: pubkey(&lookup, "LAUNCHPAD_PROGRAM_ID")?,
                token_mint: pubkey(&lookup, "LAUNCHPAD_TOKEN_MINT")?,
                token_decimals,
            },
            rpc: RpcConfig {
                url: lookup("SOLANA_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
                commitment: CommitmentConfig { commitment },
                confirm_max_attempts,
                confirm_base_delay: Duration::from_millis(parsed(&lookup, "CONFIRM_BASE_DELAY_MS", 500)?),
            },
            signer_keypair: lookup("SIGNER_KEYPAIR").filter(|v| !v.trim().is_empty()),
        })
    }

    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            max_attempts: self.rpc.confirm_max_attempts,
            base_delay: self.rpc.confirm_base_delay,
            ..ConfirmationPolicy::default()
        }
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            program_id: self.program.program_id,
            token_mint: self.program.token_mint,
            token_decimals: self.program.token_decimals,
            confirmation: self.confirmation_policy(),
        }
    }
}
