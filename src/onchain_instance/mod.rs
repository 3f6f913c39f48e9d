//! # Onchain Program Instance Module
//!
//! The per-session client for the launchpad program. It composes address
//! derivation, instruction building, submission and account reading into
//! the program's user-facing operations.

/// Launchpad program client
pub mod instance;

pub use instance::{ClientSettings, LaunchpadClient, ProjectReceipt, SubmissionReceipt};
