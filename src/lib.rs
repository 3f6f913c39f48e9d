//! # Launchpad Client
//!
//! A hand-rolled client for the launchpad project-funding program on
//! Solana. No IDL or code generation is involved: addresses, discriminators,
//! argument bytes and account tables are produced here directly.
//!
//! ## Architecture
//! - `program`: pure wire-format code
//!   - `pda`: program-derived addresses
//!   - `discriminator`: 8-byte instruction and account tags
//!   - `codec`: argument encoding and decimal scaling
//!   - `instruction`: per-operation account tables and the builder
//!   - `accounts`: decoding raw account bytes into typed state
//! - `services`: RPC and signer capabilities, the transaction submitter
//! - `onchain_instance`: `LaunchpadClient`, the per-session entry point
//! - `config`: environment configuration
//! - `error`: the error taxonomy shared by all of the above

pub mod config;
pub mod error;
pub mod onchain_instance;
pub mod program;
pub mod services;
pub mod state_structs;

pub use error::{Corruption, LaunchpadError, LaunchpadResult};
pub use onchain_instance::{ClientSettings, LaunchpadClient};
