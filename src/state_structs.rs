// --- On-chain account structs matching the launchpad program's layouts ---
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::error::{Corruption, LaunchpadError, LaunchpadResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchpadConfig {
    pub authority: Pubkey,
    pub token_mint: Pubkey,
    pub platform_fee_percent: u8,
    pub project_count: u64,
    pub bump: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub owner: Pubkey,
    pub username: String,
    pub projects_created: u64,
    pub total_invested: u64,
    pub bump: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Funding,
    Funded,
    Closed,
}

impl TryFrom<u8> for ProjectStatus {
    type Error = LaunchpadError;

    fn try_from(value: u8) -> LaunchpadResult<Self> {
        match value {
            0 => Ok(ProjectStatus::Funding),
            1 => Ok(ProjectStatus::Funded),
            2 => Ok(ProjectStatus::Closed),
            other => Err(LaunchpadError::corrupt(
                None,
                Corruption::Field(format!("unknown project status {}", other)),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub creator: Pubkey,
    pub name: String,
    pub token_mint: Pubkey,
    pub target_amount: u64,
    pub raised_amount: u64,
    pub investor_count: u64,
    pub status: ProjectStatus,
    pub bump: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Investment {
    pub investor: Pubkey,
    pub project: Pubkey,
    pub amount: u64,
    pub bump: u8,
}

// --- Request structs ---
// Amounts are human-readable token amounts; the client scales them by the
// mint's decimals.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub target_amount: Decimal,
    pub min_investment: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestRequest {
    pub project: String, // base58 pubkey
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub project: String, // base58 pubkey
    pub amount: Decimal,
}

// --- Response structs ---

/// Project state in display units, for printing or handing to a frontend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub address: String,
    pub name: String,
    pub creator: String,
    pub target_amount: Decimal,
    pub raised_amount: Decimal,
    pub investor_count: u64,
    pub status: ProjectStatus,
    pub funded_percent: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramStatusResponse {
    pub program_id: String,
    pub program_data: String,
    pub config_initialized: bool,
    pub platform_fee_percent: Option<u8>,
    pub project_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub signature: String,
    pub strategy: String,
    pub attempts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_status_from_u8() {
        assert_eq!(ProjectStatus::try_from(0).unwrap(), ProjectStatus::Funding);
        assert_eq!(ProjectStatus::try_from(2).unwrap(), ProjectStatus::Closed);
        assert!(matches!(
            ProjectStatus::try_from(9),
            Err(LaunchpadError::AccountCorrupt { reason: Corruption::Field(_), .. })
        ));
    }

    #[test]
    fn test_request_deserializes_decimal_amounts() {
        let req: CreateProjectRequest =
            serde_json::from_str(r#"{"name":"Demo Project","target_amount":"5000","min_investment":"1.5"}"#)
                .unwrap();
        assert_eq!(req.target_amount, Decimal::new(5000, 0));
        assert_eq!(req.min_investment, Decimal::new(15, 1));
    }
}
