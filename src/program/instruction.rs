//! Instruction assembly for the launchpad program.
//!
//! Each operation has one static descriptor: its account table in the exact
//! position the program reads them, and its argument schema in declaration
//! order. The program matches accounts by position only, so the tables here
//! are the contract.

use std::collections::BTreeMap;

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

use crate::error::{LaunchpadError, LaunchpadResult};
use crate::program::codec::{ArgDecoder, ArgEncoder, ArgType, ArgValue};
use crate::program::discriminator::{DISCRIMINATOR_LEN, DiscriminatorRegistry, Operation};

/// One positional slot in an account table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSpec {
    pub role: &'static str,
    pub is_signer: bool,
    pub is_writable: bool,
}

const fn writable(role: &'static str) -> AccountSpec {
    AccountSpec { role, is_signer: false, is_writable: true }
}

const fn signer(role: &'static str) -> AccountSpec {
    AccountSpec { role, is_signer: true, is_writable: true }
}

const fn readonly(role: &'static str) -> AccountSpec {
    AccountSpec { role, is_signer: false, is_writable: false }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub ty: ArgType,
}

const fn arg(name: &'static str, ty: ArgType) -> ArgSpec {
    ArgSpec { name, ty }
}

/// Static shape of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionDescriptor {
    pub operation: Operation,
    pub accounts: &'static [AccountSpec],
    pub args: &'static [ArgSpec],
}

static INITIALIZE_CONFIG: InstructionDescriptor = InstructionDescriptor {
    operation: Operation::InitializeConfig,
    accounts: &[
        writable("config"),
        signer("authority"),
        readonly("token_mint"),
        readonly("system_program"),
    ],
    args: &[arg("platform_fee_percent", ArgType::U8)],
};

static INITIALIZE_PROFILE: InstructionDescriptor = InstructionDescriptor {
    operation: Operation::InitializeProfile,
    accounts: &[
        writable("profile"),
        signer("owner"),
        readonly("system_program"),
    ],
    args: &[arg("username", ArgType::String)],
};

static CREATE_PROJECT: InstructionDescriptor = InstructionDescriptor {
    operation: Operation::CreateProject,
    accounts: &[
        writable("project"),
        writable("vault"),
        writable("creator_profile"),
        writable("config"),
        signer("creator"),
        readonly("token_mint"),
        readonly("token_program"),
        readonly("associated_token_program"),
        readonly("system_program"),
    ],
    args: &[
        arg("name", ArgType::String),
        arg("target_amount", ArgType::U64),
        arg("min_investment", ArgType::U64),
    ],
};

static INVEST_IN_PROJECT: InstructionDescriptor = InstructionDescriptor {
    operation: Operation::InvestInProject,
    accounts: &[
        writable("project"),
        writable("investment"),
        writable("vault"),
        writable("investor_token_account"),
        writable("investor_profile"),
        signer("investor"),
        readonly("token_mint"),
        readonly("token_program"),
        readonly("system_program"),
    ],
    args: &[arg("amount", ArgType::U64)],
};

static WITHDRAW_FUNDS: InstructionDescriptor = InstructionDescriptor {
    operation: Operation::WithdrawFunds,
    accounts: &[
        writable("project"),
        writable("vault"),
        writable("creator_token_account"),
        signer("creator"),
        readonly("token_mint"),
        readonly("token_program"),
    ],
    args: &[arg("amount", ArgType::U64)],
};

static CLAIM_REFUND: InstructionDescriptor = InstructionDescriptor {
    operation: Operation::ClaimRefund,
    accounts: &[
        writable("project"),
        writable("investment"),
        writable("vault"),
        writable("investor_token_account"),
        signer("investor"),
        readonly("token_mint"),
        readonly("token_program"),
    ],
    args: &[],
};

static CLOSE_PROJECT: InstructionDescriptor = InstructionDescriptor {
    operation: Operation::CloseProject,
    accounts: &[writable("project"), signer("creator")],
    args: &[],
};

impl InstructionDescriptor {
    pub fn for_operation(operation: Operation) -> &'static InstructionDescriptor {
        match operation {
            Operation::InitializeConfig => &INITIALIZE_CONFIG,
            Operation::InitializeProfile => &INITIALIZE_PROFILE,
            Operation::CreateProject => &CREATE_PROJECT,
            Operation::InvestInProject => &INVEST_IN_PROJECT,
            Operation::WithdrawFunds => &WITHDRAW_FUNDS,
            Operation::ClaimRefund => &CLAIM_REFUND,
            Operation::CloseProject => &CLOSE_PROJECT,
        }
    }

    pub fn role_index(&self, role: &str) -> Option<usize> {
        self.accounts.iter().position(|a| a.role == role)
    }

    pub fn arg_types(&self) -> Vec<ArgType> {
        self.args.iter().map(|a| a.ty).collect()
    }
}

/// Program call ready to be placed in a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedInstruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

impl From<EncodedInstruction> for Instruction {
    fn from(ix: EncodedInstruction) -> Self {
        Instruction {
            program_id: ix.program_id,
            accounts: ix.accounts,
            data: ix.data,
        }
    }
}

/// Accounts keyed by role name, resolved into table order at build time
#[derive(Debug, Clone, Default)]
pub struct NamedAccounts {
    accounts: BTreeMap<String, Pubkey>,
}

impl NamedAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, role: &str, address: Pubkey) -> Self {
        self.accounts.insert(role.to_string(), address);
        self
    }

    pub fn get(&self, role: &str) -> Option<&Pubkey> {
        self.accounts.get(role)
    }

    /// Supplied role names in sorted order
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.accounts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Pure, synchronous instruction builder for one program id
#[derive(Debug, Clone)]
pub struct InstructionBuilder {
    program_id: Pubkey,
    registry: DiscriminatorRegistry,
}

impl InstructionBuilder {
    pub fn new(program_id: Pubkey) -> Self {
        Self {
            program_id,
            registry: DiscriminatorRegistry::new(),
        }
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    pub fn registry(&self) -> &DiscriminatorRegistry {
        &self.registry
    }

    /// `discriminator ∥ args` after checking the args against the schema
    pub fn encode_payload(&self, operation: Operation, args: &[ArgValue]) -> LaunchpadResult<Vec<u8>> {
        let descriptor = InstructionDescriptor::for_operation(operation);
        if args.len() != descriptor.args.len() {
            return Err(LaunchpadError::ArgumentMismatch {
                operation: operation.name(),
                reason: format!("expected {} arguments, got {}", descriptor.args.len(), args.len()),
            });
        }

        let mut encoder = ArgEncoder::with_prefix(&self.registry.discriminator_of(operation));
        for (spec, value) in descriptor.args.iter().zip(args) {
            if spec.ty != value.arg_type() {
                return Err(LaunchpadError::ArgumentMismatch {
                    operation: operation.name(),
                    reason: format!("`{}` must be {}, got {}", spec.name, spec.ty, value.arg_type()),
                });
            }
            encoder.write_value(value)?;
        }
        Ok(encoder.finish())
    }

    /// Build from accounts already in table order
    pub fn build(
        &self,
        operation: Operation,
        accounts: &[Pubkey],
        args: &[ArgValue],
    ) -> LaunchpadResult<EncodedInstruction> {
        let descriptor = InstructionDescriptor::for_operation(operation);
        if accounts.len() != descriptor.accounts.len() {
            return Err(LaunchpadError::AccountOrderMismatch {
                operation: operation.name(),
                expected: descriptor.accounts.len(),
                actual: accounts.len(),
                missing: Vec::new(),
                unknown: Vec::new(),
            });
        }

        let data = self.encode_payload(operation, args)?;
        let metas = descriptor
            .accounts
            .iter()
            .zip(accounts)
            .map(|(spec, address)| AccountMeta {
                pubkey: *address,
                is_signer: spec.is_signer,
                is_writable: spec.is_writable,
            })
            .collect();

        tracing::debug!(
            operation = operation.name(),
            accounts = accounts.len(),
            data_len = data.len(),
            "built instruction"
        );

        Ok(EncodedInstruction {
            program_id: self.program_id,
            accounts: metas,
            data,
        })
    }

    /// Build from role-keyed accounts; every role must be present exactly once
    pub fn build_named(
        &self,
        operation: Operation,
        accounts: &NamedAccounts,
        args: &[ArgValue],
    ) -> LaunchpadResult<EncodedInstruction> {
        let descriptor = InstructionDescriptor::for_operation(operation);
        let missing: Vec<String> = descriptor
            .accounts
            .iter()
            .filter(|spec| accounts.get(spec.role).is_none())
            .map(|spec| spec.role.to_string())
            .collect();
        let unknown: Vec<String> = accounts
            .roles()
            .filter(|role| !descriptor.accounts.iter().any(|spec| spec.role == *role))
            .map(str::to_string)
            .collect();

        if !missing.is_empty() || !unknown.is_empty() {
            tracing::warn!(
                operation = operation.name(),
                ?missing,
                ?unknown,
                "named accounts do not match the table"
            );
            return Err(LaunchpadError::AccountOrderMismatch {
                operation: operation.name(),
                expected: descriptor.accounts.len(),
                actual: accounts.len(),
                missing,
                unknown,
            });
        }

        let resolved: Vec<Pubkey> = descriptor
            .accounts
            .iter()
            .filter_map(|spec| accounts.get(spec.role).copied())
            .collect();
        self.build(operation, &resolved, args)
    }

    /// Split instruction data back into its operation and arguments
    pub fn decode_instruction(&self, data: &[u8]) -> LaunchpadResult<(Operation, Vec<ArgValue>)> {
        let operation = self.registry.operation_for(data)?;
        let descriptor = InstructionDescriptor::for_operation(operation);
        let mut decoder = ArgDecoder::new(&data[DISCRIMINATOR_LEN..]);
        let args = descriptor
            .args
            .iter()
            .map(|spec| decoder.read_value(spec.ty))
            .collect::<LaunchpadResult<Vec<_>>>()?;
        decoder.finish()?;
        Ok((operation, args))
    }
}
