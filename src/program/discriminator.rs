//! Instruction and account discriminators.
//!
//! The launchpad program dispatches on the first 8 bytes of instruction
//! data: `sha256("global:" + name)[..8]`, where `name` is the exact,
//! case-sensitive handler name the program declares. Accounts carry the same
//! kind of tag under the `account:` namespace.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::error::{LaunchpadError, LaunchpadResult};

pub const DISCRIMINATOR_LEN: usize = 8;

pub type Discriminator = [u8; DISCRIMINATOR_LEN];

/// Every instruction the launchpad program exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    InitializeConfig,
    InitializeProfile,
    CreateProject,
    InvestInProject,
    WithdrawFunds,
    ClaimRefund,
    CloseProject,
}

impl Operation {
    /// Declaration order; the registry is indexed by it
    pub const ALL: [Operation; 7] = [
        Operation::InitializeConfig,
        Operation::InitializeProfile,
        Operation::CreateProject,
        Operation::InvestInProject,
        Operation::WithdrawFunds,
        Operation::ClaimRefund,
        Operation::CloseProject,
    ];

    /// Handler name exactly as the program declares it
    pub const fn name(self) -> &'static str {
        match self {
            Operation::InitializeConfig => "initialize_config",
            Operation::InitializeProfile => "initialize_profile",
            Operation::CreateProject => "create_project",
            Operation::InvestInProject => "invest_in_project",
            Operation::WithdrawFunds => "withdraw_funds",
            Operation::ClaimRefund => "claim_refund",
            Operation::CloseProject => "close_project",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = LaunchpadError;

    /// Exact match only; `investInProject` is not `invest_in_project`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| LaunchpadError::UnknownOperation(s.to_string()))
    }
}

/// First 8 bytes of `sha256("{namespace}:{name}")`
pub fn sighash(namespace: &str, name: &str) -> Discriminator {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    let hash = hasher.finalize();
    let mut disc = [0u8; DISCRIMINATOR_LEN];
    disc.copy_from_slice(&hash[..DISCRIMINATOR_LEN]);
    disc
}

pub fn instruction_discriminator(name: &str) -> Discriminator {
    sighash("global", name)
}

pub fn account_discriminator(type_name: &str) -> Discriminator {
    sighash("account", type_name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryEntry {
    pub operation: Operation,
    pub name: &'static str,
    pub discriminator: Discriminator,
}

/// Precomputed operation → discriminator table
#[derive(Debug, Clone)]
pub struct DiscriminatorRegistry {
    entries: Vec<RegistryEntry>,
}

impl Default for DiscriminatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscriminatorRegistry {
    pub fn new() -> Self {
        let entries = Operation::ALL
            .iter()
            .map(|&operation| RegistryEntry {
                operation,
                name: operation.name(),
                discriminator: instruction_discriminator(operation.name()),
            })
            .collect();
        Self { entries }
    }

    pub fn discriminator_of(&self, operation: Operation) -> Discriminator {
        self.entries[operation.index()].discriminator
    }

    pub fn entry(&self, operation: Operation) -> &RegistryEntry {
        &self.entries[operation.index()]
    }

    /// Reverse lookup used when decoding instruction data
    pub fn operation_for(&self, data: &[u8]) -> LaunchpadResult<Operation> {
        let prefix = data.get(..DISCRIMINATOR_LEN).ok_or_else(|| {
            LaunchpadError::UnknownOperation(format!("{} bytes is too short for a discriminator", data.len()))
        })?;
        self.entries
            .iter()
            .find(|e| e.discriminator == prefix)
            .map(|e| e.operation)
            .ok_or_else(|| LaunchpadError::UnknownOperation(format!("discriminator {:02x?}", prefix)))
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }
}
