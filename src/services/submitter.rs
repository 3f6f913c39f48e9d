//! Transaction submission.
//!
//! An envelope moves `Unsigned → Ready → Signed → Pending` and ends in
//! `Confirmed`, `Failed` or `Expired`. Every transition is logged. The
//! submitter never retries on its own: a retryable error goes back to the
//! caller, who rebuilds against a fresh blockhash.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use solana_sdk::{
    hash::Hash, instruction::Instruction, message::Message, pubkey::Pubkey, signature::Signature,
    transaction::Transaction,
};
use tracing::{debug, info, warn};

use crate::error::{LaunchpadError, LaunchpadResult, parse_custom_error_code};
use crate::program::codec::ArgValue;
use crate::program::discriminator::Operation;
use crate::program::instruction::{EncodedInstruction, InstructionBuilder, NamedAccounts};
use crate::services::rpc::{ConfirmationStatus, RecentBlockhash, RpcEndpoint, TransactionSigner};

/// Upper bound on strategies tried by [`TransactionSubmitter::submit_with_fallback`]
pub const MAX_STRATEGY_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Unsigned,
    Ready,
    Signed,
    Pending,
    Confirmed,
    Failed,
    Expired,
}

impl TxState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TxState::Confirmed | TxState::Failed | TxState::Expired)
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Bounded exponential backoff for confirmation polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl ConfirmationPolicy {
    /// `base * 2^attempt`, capped at `max_delay` (attempt is 0-indexed)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Instructions plus everything gathered on the way to the chain
#[derive(Debug, Clone)]
pub struct TransactionEnvelope {
    instructions: Vec<Instruction>,
    fee_payer: Pubkey,
    recent_blockhash: Option<RecentBlockhash>,
    transaction: Option<Transaction>,
    signature: Option<Signature>,
    state: TxState,
}

impl TransactionEnvelope {
    pub fn new(fee_payer: Pubkey, instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            fee_payer,
            recent_blockhash: None,
            transaction: None,
            signature: None,
            state: TxState::Unsigned,
        }
    }

    /// Only possible before the envelope is signed
    pub fn push_instruction(&mut self, instruction: Instruction) -> LaunchpadResult<()> {
        if !matches!(self.state, TxState::Unsigned | TxState::Ready) {
            return Err(LaunchpadError::EnvelopeState(format!(
                "cannot add instructions once {}",
                self.state
            )));
        }
        self.instructions.push(instruction);
        Ok(())
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn fee_payer(&self) -> &Pubkey {
        &self.fee_payer
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn recent_blockhash(&self) -> Option<&RecentBlockhash> {
        self.recent_blockhash.as_ref()
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    fn transition(&mut self, to: TxState) {
        let signature = self.signature.map(|s| s.to_string());
        match to {
            TxState::Confirmed => info!(from = %self.state, to = %to, ?signature, "transaction state"),
            TxState::Failed | TxState::Expired => {
                warn!(from = %self.state, to = %to, ?signature, "transaction state")
            }
            _ => debug!(from = %self.state, to = %to, ?signature, "transaction state"),
        }
        self.state = to;
    }

    fn expect_state(&self, expected: TxState) -> LaunchpadResult<()> {
        if self.state != expected {
            return Err(LaunchpadError::EnvelopeState(format!(
                "expected {}, envelope is {}",
                expected, self.state
            )));
        }
        Ok(())
    }

    /// Record a terminal failure and hand the error back
    fn fail(&mut self, err: LaunchpadError) -> LaunchpadError {
        if err == LaunchpadError::BlockhashExpired {
            self.transition(TxState::Expired);
        } else {
            self.transition(TxState::Failed);
        }
        err
    }
}

/// How one attempt lays out its accounts
#[derive(Debug, Clone)]
pub enum BuildStrategy {
    /// Accounts keyed by role and resolved against the table
    Named(NamedAccounts),
    /// Accounts already in table order, sent after `prelude`
    Positional {
        accounts: Vec<Pubkey>,
        prelude: Vec<Instruction>,
    },
}

impl BuildStrategy {
    pub fn positional(accounts: Vec<Pubkey>) -> Self {
        BuildStrategy::Positional {
            accounts,
            prelude: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BuildStrategy::Named(_) => "named",
            BuildStrategy::Positional { .. } => "positional",
        }
    }

    pub fn build(
        &self,
        builder: &InstructionBuilder,
        operation: Operation,
        args: &[ArgValue],
    ) -> LaunchpadResult<EncodedInstruction> {
        match self {
            BuildStrategy::Named(accounts) => builder.build_named(operation, accounts, args),
            BuildStrategy::Positional { accounts, .. } => builder.build(operation, accounts, args),
        }
    }

    /// Full instruction list for one attempt
    pub fn instructions(
        &self,
        builder: &InstructionBuilder,
        operation: Operation,
        args: &[ArgValue],
    ) -> LaunchpadResult<Vec<Instruction>> {
        let ix: Instruction = self.build(builder, operation, args)?.into();
        Ok(match self {
            BuildStrategy::Named(_) => vec![ix],
            BuildStrategy::Positional { prelude, .. } => {
                prelude.iter().cloned().chain(std::iter::once(ix)).collect()
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub strategy: &'static str,
    pub signature: Option<Signature>,
    pub error: Option<LaunchpadError>,
}

/// Every attempt made plus the final result
#[derive(Debug)]
pub struct FallbackOutcome {
    pub attempts: Vec<AttemptRecord>,
    pub result: LaunchpadResult<Signature>,
}

impl FallbackOutcome {
    /// Strategy whose attempt landed, if any
    pub fn winning_strategy(&self) -> Option<&'static str> {
        self.attempts
            .iter()
            .find(|a| a.signature.is_some())
            .map(|a| a.strategy)
    }

    pub fn into_result(self) -> LaunchpadResult<Signature> {
        self.result
    }
}

/// Only a bad build or a preflight rejection justifies trying another layout
fn advances_fallback(err: &LaunchpadError) -> bool {
    matches!(
        err,
        LaunchpadError::AccountOrderMismatch { .. }
            | LaunchpadError::ArgumentMismatch { .. }
            | LaunchpadError::Codec(_)
            | LaunchpadError::InvalidSeeds(_)
            | LaunchpadError::UnknownOperation(_)
            | LaunchpadError::SimulationFailure { .. }
    )
}

/// Only asked about creation transactions, where code 0 is the system
/// program's AccountAlreadyInUse
fn is_already_in_use(err: &LaunchpadError) -> bool {
    matches!(
        err,
        LaunchpadError::AlreadyExists(_)
            | LaunchpadError::SimulationFailure { code: Some(0), .. }
            | LaunchpadError::TransactionFailed { code: Some(0), .. }
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    AlreadyExisted,
    Created(Signature),
}

impl EnsureOutcome {
    pub fn created(&self) -> bool {
        matches!(self, EnsureOutcome::Created(_))
    }
}

/// Drives envelopes through the chain for one signer
#[derive(Clone)]
pub struct TransactionSubmitter {
    rpc: Arc<dyn RpcEndpoint>,
    signer: Arc<dyn TransactionSigner>,
    policy: ConfirmationPolicy,
}

impl TransactionSubmitter {
    pub fn new(
        rpc: Arc<dyn RpcEndpoint>,
        signer: Arc<dyn TransactionSigner>,
        policy: ConfirmationPolicy,
    ) -> Self {
        Self { rpc, signer, policy }
    }

    pub fn policy(&self) -> &ConfirmationPolicy {
        &self.policy
    }

    pub fn signer_key(&self) -> Pubkey {
        self.signer.public_key()
    }

    /// Fresh envelope paid for by the signer
    pub fn envelope(&self, instructions: Vec<Instruction>) -> TransactionEnvelope {
        TransactionEnvelope::new(self.signer.public_key(), instructions)
    }

    /// Unsigned → Ready: attach a recent blockhash
    pub async fn prepare(&self, envelope: &mut TransactionEnvelope) -> LaunchpadResult<()> {
        envelope.expect_state(TxState::Unsigned)?;
        if envelope.instructions.is_empty() {
            return Err(LaunchpadError::EnvelopeState("no instructions to send".to_string()));
        }
        match self.rpc.get_latest_blockhash().await {
            Ok(blockhash) => {
                envelope.recent_blockhash = Some(blockhash);
                envelope.transition(TxState::Ready);
                Ok(())
            }
            Err(e) => Err(envelope.fail(e)),
        }
    }

    /// Ready → Signed through the external signer
    pub async fn sign(&self, envelope: &mut TransactionEnvelope) -> LaunchpadResult<()> {
        envelope.expect_state(TxState::Ready)?;
        let blockhash = envelope
            .recent_blockhash
            .map(|b| b.blockhash)
            .ok_or_else(|| LaunchpadError::EnvelopeState("ready without a blockhash".to_string()))?;

        let mut tx = Transaction::new_unsigned(Message::new(&envelope.instructions, Some(&envelope.fee_payer)));
        tx.message.recent_blockhash = blockhash;

        let signed = match self.signer.sign_transaction(tx).await {
            Ok(signed) => signed,
            Err(e) => return Err(envelope.fail(e)),
        };
        if !signed.is_signed() {
            return Err(envelope.fail(LaunchpadError::WalletRejected(
                "signer returned an unsigned transaction".to_string(),
            )));
        }

        envelope.signature = signed.signatures.first().copied();
        envelope.transaction = Some(signed);
        envelope.transition(TxState::Signed);
        Ok(())
    }

    /// Signed → Pending; an immediate rejection is classified and terminal
    pub async fn broadcast(&self, envelope: &mut TransactionEnvelope) -> LaunchpadResult<Signature> {
        envelope.expect_state(TxState::Signed)?;
        let tx = envelope
            .transaction
            .as_ref()
            .ok_or_else(|| LaunchpadError::EnvelopeState("signed without a transaction".to_string()))?;
        let raw = bincode::serialize(tx).map_err(|e| LaunchpadError::Codec(e.to_string()))?;

        match self.rpc.send_raw_transaction(&raw).await {
            Ok(signature) => {
                if envelope.signature != Some(signature) {
                    warn!(%signature, expected = ?envelope.signature, "node echoed a different signature");
                    envelope.signature = Some(signature);
                }
                envelope.transition(TxState::Pending);
                Ok(signature)
            }
            Err(e) => Err(envelope.fail(e)),
        }
    }

    /// Pending → Confirmed | Failed | Expired, polling under the policy
    pub async fn confirm(&self, envelope: &mut TransactionEnvelope) -> LaunchpadResult<Signature> {
        envelope.expect_state(TxState::Pending)?;
        let (signature, blockhash): (Signature, Hash) = match (envelope.signature, envelope.recent_blockhash) {
            (Some(s), Some(b)) => (s, b.blockhash),
            _ => {
                return Err(LaunchpadError::EnvelopeState(
                    "pending without a signature".to_string(),
                ));
            }
        };

        for attempt in 0..self.policy.max_attempts {
            match self.rpc.confirm_transaction(&signature, &blockhash).await {
                Ok(ConfirmationStatus::Confirmed) => {
                    envelope.transition(TxState::Confirmed);
                    return Ok(signature);
                }
                Ok(ConfirmationStatus::Failed(message)) => {
                    let code = parse_custom_error_code(&message.to_lowercase());
                    return Err(envelope.fail(LaunchpadError::TransactionFailed { code, message }));
                }
                Ok(ConfirmationStatus::Expired) => {
                    return Err(envelope.fail(LaunchpadError::BlockhashExpired));
                }
                Ok(ConfirmationStatus::Pending) => {}
                Err(e) => warn!(%signature, attempt, error = %e, "confirmation poll failed"),
            }

            if attempt + 1 < self.policy.max_attempts {
                tokio::time::sleep(self.policy.delay_for(attempt)).await;
            }
        }

        Err(envelope.fail(LaunchpadError::ConfirmationTimeout {
            signature: signature.to_string(),
            attempts: self.policy.max_attempts,
        }))
    }

    /// Run an unsigned envelope to a terminal state
    pub async fn run(&self, envelope: &mut TransactionEnvelope) -> LaunchpadResult<Signature> {
        self.prepare(envelope).await?;
        self.sign(envelope).await?;
        self.broadcast(envelope).await?;
        self.confirm(envelope).await
    }

    pub async fn submit(&self, instructions: Vec<Instruction>) -> LaunchpadResult<Signature> {
        let mut envelope = self.envelope(instructions);
        self.run(&mut envelope).await
    }

    /// Try each strategy once, in order, moving on only after a build or
    /// preflight failure. At most [`MAX_STRATEGY_ATTEMPTS`] are tried, and a
    /// strategy producing the same instructions the chain just rejected is
    /// not sent again.
    pub async fn submit_with_fallback(
        &self,
        builder: &InstructionBuilder,
        operation: Operation,
        args: &[ArgValue],
        strategies: &[BuildStrategy],
    ) -> FallbackOutcome {
        if strategies.len() > MAX_STRATEGY_ATTEMPTS {
            warn!(
                operation = operation.name(),
                given = strategies.len(),
                "extra strategies ignored"
            );
        }

        let mut attempts = Vec::new();
        let mut last_err = LaunchpadError::EnvelopeState("no strategies given".to_string());
        let mut rejected: Option<Vec<Instruction>> = None;

        for strategy in strategies.iter().take(MAX_STRATEGY_ATTEMPTS) {
            let result = match strategy.instructions(builder, operation, args) {
                Ok(instructions) if rejected.as_ref() == Some(&instructions) => {
                    warn!(
                        operation = operation.name(),
                        strategy = strategy.name(),
                        "fallback builds the rejected transaction again, not sending"
                    );
                    break;
                }
                Ok(instructions) => {
                    let result = self.submit(instructions.clone()).await;
                    if result.is_err() {
                        rejected = Some(instructions);
                    }
                    result
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(signature) => {
                    info!(operation = operation.name(), strategy = strategy.name(), %signature, "submitted");
                    attempts.push(AttemptRecord {
                        strategy: strategy.name(),
                        signature: Some(signature),
                        error: None,
                    });
                    return FallbackOutcome {
                        attempts,
                        result: Ok(signature),
                    };
                }
                Err(e) => {
                    warn!(operation = operation.name(), strategy = strategy.name(), error = %e, "attempt failed");
                    attempts.push(AttemptRecord {
                        strategy: strategy.name(),
                        signature: None,
                        error: Some(e.clone()),
                    });
                    let advance = advances_fallback(&e);
                    last_err = e;
                    if !advance {
                        break;
                    }
                }
            }
        }

        FallbackOutcome {
            attempts,
            result: Err(last_err),
        }
    }

    /// Create the account at `address` unless it is already there.
    ///
    /// Losing a creation race to another caller is success: the chain's
    /// "already in use" rejection becomes `AlreadyExisted`.
    pub async fn ensure_account<F>(&self, address: &Pubkey, build: F) -> LaunchpadResult<EnsureOutcome>
    where
        F: FnOnce() -> LaunchpadResult<Vec<Instruction>> + Send,
    {
        if self.rpc.get_account_info(address).await?.is_some() {
            debug!(%address, "account already exists");
            return Ok(EnsureOutcome::AlreadyExisted);
        }

        let instructions = build()?;
        match self.submit(instructions).await {
            Ok(signature) => {
                info!(%address, %signature, "account created");
                Ok(EnsureOutcome::Created(signature))
            }
            Err(e) if is_already_in_use(&e) => {
                info!(%address, error = %e, "account created concurrently");
                Ok(EnsureOutcome::AlreadyExisted)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_then_caps() {
        let policy = ConfirmationPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn test_envelope_frozen_after_signing() {
        let mut envelope = TransactionEnvelope::new(Pubkey::new_unique(), vec![]);
        let ix = Instruction::new_with_bytes(Pubkey::new_unique(), &[1], vec![]);
        assert!(envelope.push_instruction(ix.clone()).is_ok());

        envelope.state = TxState::Signed;
        assert!(matches!(
            envelope.push_instruction(ix),
            Err(LaunchpadError::EnvelopeState(_))
        ));
    }

    #[test]
    fn test_fail_distinguishes_expiry() {
        let mut envelope = TransactionEnvelope::new(Pubkey::new_unique(), vec![]);
        envelope.fail(LaunchpadError::BlockhashExpired);
        assert_eq!(envelope.state(), TxState::Expired);

        let mut envelope = TransactionEnvelope::new(Pubkey::new_unique(), vec![]);
        envelope.fail(LaunchpadError::WalletRejected("no".into()));
        assert_eq!(envelope.state(), TxState::Failed);
        assert!(envelope.state().is_terminal());
    }

    #[test]
    fn test_only_build_and_preflight_errors_advance() {
        assert!(advances_fallback(&LaunchpadError::AccountOrderMismatch {
            operation: "invest_in_project",
            expected: 9,
            actual: 8,
            missing: Vec::new(),
            unknown: Vec::new(),
        }));
        assert!(advances_fallback(&LaunchpadError::SimulationFailure {
            code: Some(3012),
            message: "AccountNotInitialized".into(),
        }));
        assert!(!advances_fallback(&LaunchpadError::BlockhashExpired));
        assert!(!advances_fallback(&LaunchpadError::WalletRejected("no".into())));
        assert!(!advances_fallback(&LaunchpadError::AlreadyExists("in use".into())));
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(BuildStrategy::Named(NamedAccounts::new()).name(), "named");
        assert_eq!(BuildStrategy::positional(vec![]).name(), "positional");
    }

    #[test]
    fn test_prelude_precedes_the_operation() {
        let program = Pubkey::new_unique();
        let builder = InstructionBuilder::new(program);
        let accounts = vec![Pubkey::new_unique(), Pubkey::new_unique()];
        let prelude = Instruction::new_with_bytes(Pubkey::new_unique(), &[1], vec![]);

        let plain = BuildStrategy::positional(accounts.clone())
            .instructions(&builder, Operation::CloseProject, &[])
            .unwrap();
        let with_prelude = BuildStrategy::Positional {
            accounts,
            prelude: vec![prelude.clone()],
        }
        .instructions(&builder, Operation::CloseProject, &[])
        .unwrap();

        assert_eq!(plain.len(), 1);
        assert_eq!(with_prelude, vec![prelude, plain[0].clone()]);
    }

    #[test]
    fn test_already_in_use_covers_creation_code_zero() {
        assert!(is_already_in_use(&LaunchpadError::AlreadyExists("in use".into())));
        assert!(is_already_in_use(&LaunchpadError::SimulationFailure {
            code: Some(0),
            message: "custom program error: 0x0".into(),
        }));
        assert!(is_already_in_use(&LaunchpadError::TransactionFailed {
            code: Some(0),
            message: "custom program error: 0x0".into(),
        }));
        assert!(!is_already_in_use(&LaunchpadError::SimulationFailure {
            code: Some(0x1771),
            message: "custom program error: 0x1771".into(),
        }));
    }
}
