//! Error taxonomy for the launchpad client.
//!
//! Construction-time errors (derivation, encoding, account ordering) are
//! local and fatal. Submission-time errors are classified from RPC and
//! signer failures and expose [`LaunchpadError::is_retryable`] so the caller
//! can decide whether to rebuild and resubmit.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Result alias used across the crate
pub type LaunchpadResult<T> = std::result::Result<T, LaunchpadError>;

/// Why an account's bytes could not be trusted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Corruption {
    #[error("declared {declared} bytes but only {available} remain")]
    Truncated { declared: usize, available: usize },

    #[error("declared length {declared} exceeds the {limit} byte ceiling")]
    Implausible { declared: u64, limit: u64 },

    #[error("pointer targets {found}, expected {expected}")]
    PointerMismatch { expected: Pubkey, found: Pubkey },

    #[error("owned by {found}, expected {expected}")]
    WrongOwner { expected: Pubkey, found: Pubkey },

    #[error("unexpected tag {found} (expected {expected})")]
    UnexpectedTag { expected: u32, found: u32 },

    #[error("account discriminator {found:02x?} does not match {expected}")]
    DiscriminatorMismatch { expected: &'static str, found: [u8; 8] },

    #[error("field decode failed: {0}")]
    Field(String),
}

/// Comprehensive error type for every client operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchpadError {
    /// No bump in 255..=0 produced an off-curve address
    #[error("no canonical bump found for program {program}")]
    AddressDerivationExhausted { program: Pubkey },

    #[error("invalid seeds: {0}")]
    InvalidSeeds(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Caller supplied a different account list than the descriptor declares
    #[error(
        "{operation}: expected {expected} accounts, got {actual}{}",
        role_detail(.missing, .unknown)
    )]
    AccountOrderMismatch {
        operation: &'static str,
        expected: usize,
        actual: usize,
        /// Table roles the caller did not supply (name-keyed builds only)
        missing: Vec<String>,
        /// Supplied roles the table does not declare (name-keyed builds only)
        unknown: Vec<String>,
    },

    #[error("{operation}: argument mismatch: {reason}")]
    ArgumentMismatch {
        operation: &'static str,
        reason: String,
    },

    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("account not found: {0}")]
    AccountNotFound(Pubkey),

    #[error("account corrupt ({address:?}): {reason}")]
    AccountCorrupt { address: Option<Pubkey>, reason: Corruption },

    /// The remote program rejected the transaction during preflight
    #[error("simulation failed (code: {code:?}): {message}")]
    SimulationFailure { code: Option<u32>, message: String },

    #[error("blockhash expired")]
    BlockhashExpired,

    #[error("wallet rejected signing: {0}")]
    WalletRejected(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("account already exists: {0}")]
    AlreadyExists(String),

    #[error("transaction {signature} not confirmed after {attempts} polls")]
    ConfirmationTimeout { signature: String, attempts: u32 },

    /// Landed on chain but the program returned an error
    #[error("transaction failed on chain (code: {code:?}): {message}")]
    TransactionFailed { code: Option<u32>, message: String },

    /// A submitter step was run on an envelope in the wrong state
    #[error("transaction envelope: {0}")]
    EnvelopeState(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl LaunchpadError {
    /// Whether rebuilding and resubmitting can succeed without a code change
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LaunchpadError::BlockhashExpired
                | LaunchpadError::NetworkError(_)
                | LaunchpadError::ConfirmationTimeout { .. }
        )
    }

    /// Errors that say nothing about the transaction contents, only its delivery
    pub fn is_submission_error(&self) -> bool {
        matches!(
            self,
            LaunchpadError::BlockhashExpired
                | LaunchpadError::NetworkError(_)
                | LaunchpadError::ConfirmationTimeout { .. }
                | LaunchpadError::WalletRejected(_)
        )
    }

    pub(crate) fn corrupt(address: Option<Pubkey>, reason: Corruption) -> Self {
        LaunchpadError::AccountCorrupt { address, reason }
    }

    /// Classify an RPC or runtime error string.
    ///
    /// RPC nodes report failures as free text, so classification is by
    /// lower-cased substring, with the `custom program error: 0x..` code
    /// pulled out when present.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let code = parse_custom_error_code(&lower);

        // Custom code 0 is ambiguous across programs; ensure_account narrows it
        if lower.contains("already in use") {
            LaunchpadError::AlreadyExists(message.to_string())
        } else if lower.contains("blockhash not found")
            || lower.contains("block height exceeded")
            || lower.contains("transaction expired")
        {
            LaunchpadError::BlockhashExpired
        } else if lower.contains("simulation failed")
            || lower.contains("preflight")
            || code.is_some()
        {
            LaunchpadError::SimulationFailure {
                code,
                message: message.to_string(),
            }
        } else if lower.contains("user rejected") || lower.contains("rejected the request") {
            LaunchpadError::WalletRejected(message.to_string())
        } else {
            LaunchpadError::NetworkError(message.to_string())
        }
    }
}

fn role_detail(missing: &[String], unknown: &[String]) -> String {
    let mut detail = String::new();
    if !missing.is_empty() {
        detail.push_str(&format!(" (missing roles: {})", missing.join(", ")));
    }
    if !unknown.is_empty() {
        detail.push_str(&format!(" (unknown roles: {})", unknown.join(", ")));
    }
    detail
}

/// Extract `N` from "custom program error: 0xN"
pub(crate) fn parse_custom_error_code(lower: &str) -> Option<u32> {
    let (_, rest) = lower.split_once("custom program error: 0x")?;
    let hex: String = rest.chars().take_while(|c| c.is_ascii_hexdigit()).collect();
    u32::from_str_radix(&hex, 16).ok()
}
