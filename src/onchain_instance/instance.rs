use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey, signature::Signature, system_program};
use spl_associated_token_account::{
    ID as ASSOCIATED_TOKEN_PROGRAM_ID, get_associated_token_address,
    instruction::create_associated_token_account_idempotent,
};
use spl_token::ID as TOKEN_PROGRAM_ID;

use crate::error::{LaunchpadError, LaunchpadResult};
use crate::program::accounts::{AccountSnapshot, AccountStateReader};
use crate::program::codec::{ArgValue, from_base_units, to_base_units};
use crate::program::discriminator::Operation;
use crate::program::instruction::{InstructionBuilder, InstructionDescriptor, NamedAccounts};
use crate::program::pda;
use crate::services::rpc::{RpcEndpoint, TransactionSigner};
use crate::services::submitter::{
    AttemptRecord, BuildStrategy, ConfirmationPolicy, EnsureOutcome, TransactionSubmitter,
};
use crate::state_structs::{
    CreateProjectRequest, InvestRequest, Investment, LaunchpadConfig, ProgramStatusResponse, Project,
    ProjectSummary, SubmissionResponse, UserProfile, WithdrawRequest,
};

/// Platform fee is a whole percentage
const MAX_PLATFORM_FEE_PERCENT: u8 = 100;

/// Everything a session needs to know about the deployment it talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    pub program_id: Pubkey,
    pub token_mint: Pubkey,
    pub token_decimals: u8,
    pub confirmation: ConfirmationPolicy,
}

/// A landed transaction and how it got there
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub signature: Signature,
    pub strategy: &'static str,
    pub attempts: Vec<AttemptRecord>,
}

impl SubmissionReceipt {
    pub fn to_response(&self) -> SubmissionResponse {
        SubmissionResponse {
            signature: self.signature.to_string(),
            strategy: self.strategy.to_string(),
            attempts: self.attempts.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProjectReceipt {
    pub project: Pubkey,
    pub vault: Pubkey,
    pub submission: SubmissionReceipt,
}

/// Launchpad program client for one signer.
///
/// Constructed per session; holds no global state and shares its
/// capabilities read-only.
pub struct LaunchpadClient {
    settings: ClientSettings,
    builder: InstructionBuilder,
    submitter: TransactionSubmitter,
    reader: AccountStateReader,
    signer: Arc<dyn TransactionSigner>,
}

fn parse_pubkey(operation: Operation, field: &str, value: &str) -> LaunchpadResult<Pubkey> {
    Pubkey::from_str(value.trim()).map_err(|e| LaunchpadError::ArgumentMismatch {
        operation: operation.name(),
        reason: format!("`{}` is not a valid address: {}", field, e),
    })
}

impl LaunchpadClient {
    pub fn new(
        settings: ClientSettings,
        rpc: Arc<dyn RpcEndpoint>,
        signer: Arc<dyn TransactionSigner>,
    ) -> Self {
        Self {
            builder: InstructionBuilder::new(settings.program_id),
            submitter: TransactionSubmitter::new(rpc.clone(), signer.clone(), settings.confirmation),
            reader: AccountStateReader::new(rpc, settings.program_id),
            settings,
            signer,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.settings.program_id
    }

    /// The signer's address; pays fees and signs every operation
    pub fn wallet(&self) -> Pubkey {
        self.signer.public_key()
    }

    pub fn builder(&self) -> &InstructionBuilder {
        &self.builder
    }

    pub fn submitter(&self) -> &TransactionSubmitter {
        &self.submitter
    }

    pub fn reader(&self) -> &AccountStateReader {
        &self.reader
    }

    // --- Addresses ---

    pub fn config_address(&self) -> LaunchpadResult<Pubkey> {
        Ok(pda::config_address(self.program_id())?.address)
    }

    pub fn profile_address(&self, owner: &Pubkey) -> LaunchpadResult<Pubkey> {
        Ok(pda::profile_address(self.program_id(), owner)?.address)
    }

    pub fn project_address(&self, name: &str) -> LaunchpadResult<Pubkey> {
        Ok(pda::project_address(self.program_id(), name)?.address)
    }

    pub fn investment_address(&self, project: &Pubkey, investor: &Pubkey) -> LaunchpadResult<Pubkey> {
        Ok(pda::investment_address(self.program_id(), project, investor)?.address)
    }

    /// Token account holding a project's raised funds
    pub fn vault_address(&self, project: &Pubkey) -> LaunchpadResult<Pubkey> {
        pda::associated_token_address(project, &self.settings.token_mint)
    }

    fn base_units(&self, operation: Operation, field: &str, amount: Decimal) -> LaunchpadResult<u64> {
        let units = to_base_units(amount, self.settings.token_decimals)?;
        if units == 0 {
            return Err(LaunchpadError::InvalidAmount(format!(
                "{}: `{}` of {} is zero in base units",
                operation, field, amount
            )));
        }
        Ok(units)
    }

    /// Name-keyed build, then `fallback` if the first attempt could not be
    /// built or failed preflight
    async fn submit_operation(
        &self,
        operation: Operation,
        accounts: NamedAccounts,
        args: Vec<ArgValue>,
        fallback: Option<BuildStrategy>,
    ) -> LaunchpadResult<SubmissionReceipt> {
        let strategies: Vec<BuildStrategy> = std::iter::once(BuildStrategy::Named(accounts))
            .chain(fallback)
            .collect();

        let outcome = self
            .submitter
            .submit_with_fallback(&self.builder, operation, &args, &strategies)
            .await;
        let strategy = outcome.winning_strategy().unwrap_or("none");
        let attempts = outcome.attempts.clone();
        let signature = outcome.into_result()?;
        Ok(SubmissionReceipt {
            signature,
            strategy,
            attempts,
        })
    }

    /// Positional retry for token transfers.
    ///
    /// The table is walked role by role and every address derived again,
    /// token accounts through the associated-token program's own derivation.
    /// The wallet's token account is created idempotently first, which
    /// recovers the common "token account not initialized" preflight failure.
    fn transfer_fallback(&self, operation: Operation, project: &Pubkey) -> LaunchpadResult<BuildStrategy> {
        let wallet = self.wallet();
        let mint = self.settings.token_mint;
        let table = InstructionDescriptor::for_operation(operation).accounts;

        let mut accounts = Vec::with_capacity(table.len());
        let mut unresolved = Vec::new();
        for spec in table {
            let address = match spec.role {
                "project" => *project,
                "investment" => self.investment_address(project, &wallet)?,
                "vault" => get_associated_token_address(project, &mint),
                "investor_token_account" | "creator_token_account" => get_associated_token_address(&wallet, &mint),
                "investor_profile" => self.profile_address(&wallet)?,
                "investor" | "creator" => wallet,
                "token_mint" => mint,
                "token_program" => TOKEN_PROGRAM_ID,
                "system_program" => system_program::ID,
                other => {
                    unresolved.push(other.to_string());
                    continue;
                }
            };
            accounts.push(address);
        }
        if !unresolved.is_empty() {
            return Err(LaunchpadError::AccountOrderMismatch {
                operation: operation.name(),
                expected: table.len(),
                actual: accounts.len(),
                missing: unresolved,
                unknown: Vec::new(),
            });
        }

        let prelude = vec![create_associated_token_account_idempotent(
            &wallet,
            &wallet,
            &mint,
            &TOKEN_PROGRAM_ID,
        )];
        Ok(BuildStrategy::Positional { accounts, prelude })
    }

    fn single_instruction(
        &self,
        operation: Operation,
        accounts: &NamedAccounts,
        args: &[ArgValue],
    ) -> LaunchpadResult<Vec<Instruction>> {
        Ok(vec![self.builder.build_named(operation, accounts, args)?.into()])
    }

    // --- Operations ---

    /// Create the global config with the signer as authority, unless it exists
    pub async fn initialize_config(&self, platform_fee_percent: u8) -> LaunchpadResult<EnsureOutcome> {
        if platform_fee_percent > MAX_PLATFORM_FEE_PERCENT {
            return Err(LaunchpadError::InvalidAmount(format!(
                "platform fee {}% is above {}%",
                platform_fee_percent, MAX_PLATFORM_FEE_PERCENT
            )));
        }
        let config = self.config_address()?;
        let accounts = NamedAccounts::new()
            .set("config", config)
            .set("authority", self.wallet())
            .set("token_mint", self.settings.token_mint)
            .set("system_program", system_program::ID);
        let args = [ArgValue::U8(platform_fee_percent)];

        self.submitter
            .ensure_account(&config, || {
                self.single_instruction(Operation::InitializeConfig, &accounts, &args)
            })
            .await
    }

    /// Create the signer's profile unless it exists; racing callers both succeed
    pub async fn ensure_profile(&self, username: &str) -> LaunchpadResult<EnsureOutcome> {
        if username.trim().is_empty() {
            return Err(LaunchpadError::ArgumentMismatch {
                operation: Operation::InitializeProfile.name(),
                reason: "username is empty".to_string(),
            });
        }
        let owner = self.wallet();
        let profile = self.profile_address(&owner)?;
        let accounts = NamedAccounts::new()
            .set("profile", profile)
            .set("owner", owner)
            .set("system_program", system_program::ID);
        let args = [ArgValue::from(username)];

        self.submitter
            .ensure_account(&profile, || {
                self.single_instruction(Operation::InitializeProfile, &accounts, &args)
            })
            .await
    }

    pub async fn create_project(&self, request: &CreateProjectRequest) -> LaunchpadResult<ProjectReceipt> {
        let operation = Operation::CreateProject;
        let target = self.base_units(operation, "target_amount", request.target_amount)?;
        let min_investment = self.base_units(operation, "min_investment", request.min_investment)?;
        if min_investment > target {
            return Err(LaunchpadError::InvalidAmount(format!(
                "minimum investment {} exceeds target {}",
                request.min_investment, request.target_amount
            )));
        }

        let creator = self.wallet();
        let creator_profile = self.profile_address(&creator)?;
        if !self.reader.exists(&creator_profile).await? {
            tracing::warn!(%creator, "create_project without a profile");
            return Err(LaunchpadError::AccountNotFound(creator_profile));
        }

        let project = self.project_address(&request.name)?;
        let vault = self.vault_address(&project)?;
        let accounts = NamedAccounts::new()
            .set("project", project)
            .set("vault", vault)
            .set("creator_profile", creator_profile)
            .set("config", self.config_address()?)
            .set("creator", creator)
            .set("token_mint", self.settings.token_mint)
            .set("token_program", TOKEN_PROGRAM_ID)
            .set("associated_token_program", ASSOCIATED_TOKEN_PROGRAM_ID)
            .set("system_program", system_program::ID);
        let args = vec![
            ArgValue::from(request.name.as_str()),
            ArgValue::U64(target),
            ArgValue::U64(min_investment),
        ];

        let submission = self.submit_operation(operation, accounts, args, None).await?;
        tracing::info!(name = %request.name, %project, signature = %submission.signature, "project created");
        Ok(ProjectReceipt {
            project,
            vault,
            submission,
        })
    }

    /// Refuse to move tokens for a project on a different mint
    async fn project_for_transfer(&self, operation: Operation, project: &Pubkey) -> LaunchpadResult<Project> {
        let snapshot = self.fetch_project(project).await?;
        if snapshot.fields.token_mint != self.settings.token_mint {
            return Err(LaunchpadError::ArgumentMismatch {
                operation: operation.name(),
                reason: format!(
                    "project uses mint {}, client is configured for {}",
                    snapshot.fields.token_mint, self.settings.token_mint
                ),
            });
        }
        Ok(snapshot.fields)
    }

    pub async fn invest(&self, request: &InvestRequest) -> LaunchpadResult<SubmissionReceipt> {
        let operation = Operation::InvestInProject;
        let project = parse_pubkey(operation, "project", &request.project)?;
        let amount = self.base_units(operation, "amount", request.amount)?;
        self.project_for_transfer(operation, &project).await?;

        let investor = self.wallet();
        let accounts = NamedAccounts::new()
            .set("project", project)
            .set("investment", self.investment_address(&project, &investor)?)
            .set("vault", self.vault_address(&project)?)
            .set(
                "investor_token_account",
                pda::associated_token_address(&investor, &self.settings.token_mint)?,
            )
            .set("investor_profile", self.profile_address(&investor)?)
            .set("investor", investor)
            .set("token_mint", self.settings.token_mint)
            .set("token_program", TOKEN_PROGRAM_ID)
            .set("system_program", system_program::ID);
        let fallback = self.transfer_fallback(operation, &project)?;

        self.submit_operation(operation, accounts, vec![ArgValue::U64(amount)], Some(fallback))
            .await
    }

    /// Creator pulls raised funds out of the vault
    pub async fn withdraw(&self, request: &WithdrawRequest) -> LaunchpadResult<SubmissionReceipt> {
        let operation = Operation::WithdrawFunds;
        let project = parse_pubkey(operation, "project", &request.project)?;
        let amount = self.base_units(operation, "amount", request.amount)?;
        self.project_for_transfer(operation, &project).await?;

        let creator = self.wallet();
        let accounts = NamedAccounts::new()
            .set("project", project)
            .set("vault", self.vault_address(&project)?)
            .set(
                "creator_token_account",
                pda::associated_token_address(&creator, &self.settings.token_mint)?,
            )
            .set("creator", creator)
            .set("token_mint", self.settings.token_mint)
            .set("token_program", TOKEN_PROGRAM_ID);
        let fallback = self.transfer_fallback(operation, &project)?;

        self.submit_operation(operation, accounts, vec![ArgValue::U64(amount)], Some(fallback))
            .await
    }

    pub async fn claim_refund(&self, project: &Pubkey) -> LaunchpadResult<SubmissionReceipt> {
        let operation = Operation::ClaimRefund;
        self.project_for_transfer(operation, project).await?;

        let investor = self.wallet();
        let accounts = NamedAccounts::new()
            .set("project", *project)
            .set("investment", self.investment_address(project, &investor)?)
            .set("vault", self.vault_address(project)?)
            .set(
                "investor_token_account",
                pda::associated_token_address(&investor, &self.settings.token_mint)?,
            )
            .set("investor", investor)
            .set("token_mint", self.settings.token_mint)
            .set("token_program", TOKEN_PROGRAM_ID);
        let fallback = self.transfer_fallback(operation, project)?;

        self.submit_operation(operation, accounts, vec![], Some(fallback))
            .await
    }

    pub async fn close_project(&self, project: &Pubkey) -> LaunchpadResult<SubmissionReceipt> {
        let accounts = NamedAccounts::new()
            .set("project", *project)
            .set("creator", self.wallet());
        self.submit_operation(Operation::CloseProject, accounts, vec![], None)
            .await
    }

    // --- State ---

    pub async fn fetch_config(&self) -> LaunchpadResult<Option<AccountSnapshot<LaunchpadConfig>>> {
        self.reader.fetch_optional(&self.config_address()?).await
    }

    pub async fn fetch_profile(&self, owner: &Pubkey) -> LaunchpadResult<Option<AccountSnapshot<UserProfile>>> {
        self.reader.fetch_optional(&self.profile_address(owner)?).await
    }

    pub async fn fetch_project(&self, project: &Pubkey) -> LaunchpadResult<AccountSnapshot<Project>> {
        self.reader.fetch(project).await
    }

    pub async fn fetch_project_by_name(&self, name: &str) -> LaunchpadResult<AccountSnapshot<Project>> {
        self.fetch_project(&self.project_address(name)?).await
    }

    pub async fn fetch_investment(
        &self,
        project: &Pubkey,
        investor: &Pubkey,
    ) -> LaunchpadResult<Option<AccountSnapshot<Investment>>> {
        self.reader
            .fetch_optional(&self.investment_address(project, investor)?)
            .await
    }

    /// Project state in display units
    pub async fn project_summary(&self, project: &Pubkey) -> LaunchpadResult<ProjectSummary> {
        let fields = self.fetch_project(project).await?.fields;
        let decimals = self.settings.token_decimals;
        let target_amount = from_base_units(fields.target_amount, decimals)?;
        let raised_amount = from_base_units(fields.raised_amount, decimals)?;
        let funded_percent = (!target_amount.is_zero())
            .then(|| (raised_amount * Decimal::ONE_HUNDRED / target_amount).round_dp(2));

        Ok(ProjectSummary {
            address: project.to_string(),
            name: fields.name,
            creator: fields.creator.to_string(),
            target_amount,
            raised_amount,
            investor_count: fields.investor_count,
            status: fields.status,
            funded_percent,
        })
    }

    /// Read-only health check: verified program-data pointer plus config state
    pub async fn program_status(&self) -> LaunchpadResult<ProgramStatusResponse> {
        let program_data = self.reader.program_data(self.program_id()).await?;
        let config = self.fetch_config().await?.map(|snapshot| snapshot.fields);
        if config.is_none() {
            tracing::warn!(program = %self.program_id(), "launchpad config is not initialized");
        }

        Ok(ProgramStatusResponse {
            program_id: self.program_id().to_string(),
            program_data: program_data.to_string(),
            config_initialized: config.is_some(),
            platform_fee_percent: config.as_ref().map(|c| c.platform_fee_percent),
            project_count: config.as_ref().map(|c| c.project_count),
        })
    }
}
