//! Program-derived address (PDA) derivation.
//!
//! A PDA is `sha256(seeds ∥ [bump] ∥ program ∥ "ProgramDerivedAddress")`
//! for the highest bump whose digest is not a valid Ed25519 point. Being off
//! the curve means no private key exists for it, so only the owning program
//! can sign for the account.

use curve25519_dalek::edwards::CompressedEdwardsY;
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::ID as ASSOCIATED_TOKEN_PROGRAM_ID;
use spl_token::ID as TOKEN_PROGRAM_ID;

use crate::error::{LaunchpadError, LaunchpadResult};

/// Domain separator appended to every PDA hash
pub const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Maximum seeds per address, bump included
pub const MAX_SEEDS: usize = 16;

/// Maximum length of a single seed
pub const MAX_SEED_LEN: usize = 32;

pub const BPF_LOADER_UPGRADEABLE_ID: Pubkey =
    solana_sdk::pubkey!("BPFLoaderUpgradeab1e11111111111111111111111");

pub const CONFIG_SEED: &[u8] = b"config";
pub const PROFILE_SEED: &[u8] = b"profile";
pub const PROJECT_SEED: &[u8] = b"project";
pub const INVESTMENT_SEED: &[u8] = b"investment";

/// Ordered seed material for one derivation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Seeds(Vec<Vec<u8>>);

impl Seeds {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a seed, builder style
    pub fn with(mut self, seed: impl AsRef<[u8]>) -> Self {
        self.0.push(seed.as_ref().to_vec());
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.0.iter().map(Vec::as_slice)
    }

    /// Enforce the runtime's seed limits, leaving room for `extra` more seeds
    fn validate(&self, extra: usize) -> LaunchpadResult<()> {
        if self.0.len() + extra > MAX_SEEDS {
            return Err(LaunchpadError::InvalidSeeds(format!(
                "{} seeds exceed the limit of {}",
                self.0.len() + extra,
                MAX_SEEDS
            )));
        }
        if let Some((index, seed)) = self.0.iter().enumerate().find(|(_, s)| s.len() > MAX_SEED_LEN) {
            return Err(LaunchpadError::InvalidSeeds(format!(
                "seed {} is {} bytes, max is {}",
                index,
                seed.len(),
                MAX_SEED_LEN
            )));
        }
        Ok(())
    }
}

impl<const N: usize> From<[&[u8]; N]> for Seeds {
    fn from(seeds: [&[u8]; N]) -> Self {
        Self(seeds.iter().map(|s| s.to_vec()).collect())
    }
}

/// A derived address together with everything needed to re-derive it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramAddress {
    pub address: Pubkey,
    pub bump: u8,
    pub seeds: Seeds,
    pub program_owner: Pubkey,
}

/// Whether 32 bytes decompress to an Ed25519 point
pub fn is_on_curve(bytes: &[u8; 32]) -> bool {
    CompressedEdwardsY(*bytes).decompress().is_some()
}

fn hash_candidate(seeds: &Seeds, bump: u8, program_owner: &Pubkey) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for seed in seeds.iter() {
        hasher.update(seed);
    }
    hasher.update([bump]);
    hasher.update(program_owner.as_ref());
    hasher.update(PDA_MARKER);
    hasher.finalize().into()
}

/// Address for one explicit bump; fails if the digest lands on the curve
pub fn create_program_address(seeds: &Seeds, bump: u8, program_owner: &Pubkey) -> LaunchpadResult<Pubkey> {
    seeds.validate(1)?;
    let digest = hash_candidate(seeds, bump, program_owner);
    if is_on_curve(&digest) {
        return Err(LaunchpadError::InvalidSeeds(format!(
            "bump {} yields an on-curve address",
            bump
        )));
    }
    Ok(Pubkey::new_from_array(digest))
}

/// Walk bumps from 255 down and stop at the first digest `on_curve` rejects.
pub(crate) fn find_canonical<F>(seeds: &Seeds, program_owner: &Pubkey, on_curve: F) -> LaunchpadResult<ProgramAddress>
where
    F: Fn(&[u8; 32]) -> bool,
{
    seeds.validate(1)?;
    for bump in (0..=u8::MAX).rev() {
        let digest = hash_candidate(seeds, bump, program_owner);
        if !on_curve(&digest) {
            return Ok(ProgramAddress {
                address: Pubkey::new_from_array(digest),
                bump,
                seeds: seeds.clone(),
                program_owner: *program_owner,
            });
        }
    }
    tracing::error!(program = %program_owner, seeds = seeds.len(), "PDA bump search exhausted");
    Err(LaunchpadError::AddressDerivationExhausted { program: *program_owner })
}

/// Derive the canonical program address for `seeds` under `program_owner`
pub fn derive(seeds: &Seeds, program_owner: &Pubkey) -> LaunchpadResult<ProgramAddress> {
    find_canonical(seeds, program_owner, is_on_curve)
}

pub fn config_address(program_id: &Pubkey) -> LaunchpadResult<ProgramAddress> {
    derive(&Seeds::new().with(CONFIG_SEED), program_id)
}

pub fn profile_address(program_id: &Pubkey, owner: &Pubkey) -> LaunchpadResult<ProgramAddress> {
    derive(&Seeds::new().with(PROFILE_SEED).with(owner), program_id)
}

/// Projects are keyed by their UTF-8 name, so names longer than 32 bytes are rejected
pub fn project_address(program_id: &Pubkey, name: &str) -> LaunchpadResult<ProgramAddress> {
    derive(&Seeds::new().with(PROJECT_SEED).with(name.as_bytes()), program_id)
}

pub fn investment_address(program_id: &Pubkey, project: &Pubkey, investor: &Pubkey) -> LaunchpadResult<ProgramAddress> {
    derive(
        &Seeds::new().with(INVESTMENT_SEED).with(project).with(investor),
        program_id,
    )
}

/// Associated token account of `owner` for `mint` under the classic token program
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> LaunchpadResult<Pubkey> {
    let seeds = Seeds::new().with(owner).with(TOKEN_PROGRAM_ID).with(mint);
    Ok(derive(&seeds, &ASSOCIATED_TOKEN_PROGRAM_ID)?.address)
}

/// Program-data account an upgradeable program's pointer must reference
pub fn program_data_address(program_id: &Pubkey) -> LaunchpadResult<Pubkey> {
    Ok(derive(&Seeds::new().with(program_id), &BPF_LOADER_UPGRADEABLE_ID)?.address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn program() -> Pubkey {
        solana_sdk::pubkey!("ChzF1fiEZ8Uo2q62dg2f8MJSQW2oDxw4PJcbWiC1pxQe")
    }

    #[test]
    fn test_derive_is_deterministic() {
        let seeds = Seeds::new().with(b"project").with(b"Demo Project");
        let first = derive(&seeds, &program()).unwrap();
        let second = derive(&seeds, &program()).unwrap();
        assert_eq!(first.address, second.address);
        assert_eq!(first.bump, second.bump);
    }

    #[test]
    fn test_matches_runtime_derivation() {
        let owner = Pubkey::new_unique();
        let cases: Vec<Vec<&[u8]>> = vec![
            vec![&b"config"[..]],
            vec![&b"project"[..], &b"Demo Project"[..]],
            vec![&b"profile"[..], owner.as_ref()],
            vec![],
        ];
        for case in cases {
            let mut seeds = Seeds::new();
            for s in &case {
                seeds = seeds.with(s);
            }
            let ours = derive(&seeds, &program()).unwrap();
            let (expected, bump) = Pubkey::find_program_address(&case, &program());
            assert_eq!(ours.address, expected);
            assert_eq!(ours.bump, bump);
        }
    }

    #[test]
    fn test_highest_off_curve_bump_wins() {
        let seeds = Seeds::new().with(b"project").with(b"Demo Project");
        let derived = derive(&seeds, &program()).unwrap();

        // Every bump above the canonical one must be on the curve
        for bump in (derived.bump as u16 + 1)..=255 {
            let digest = hash_candidate(&seeds, bump as u8, &program());
            assert!(is_on_curve(&digest), "bump {} was skipped", bump);
        }

        // Some lower bump is also off-curve, yet it is never the answer
        let lower = (0..derived.bump)
            .rev()
            .find(|b| create_program_address(&seeds, *b, &program()).is_ok())
            .expect("a second off-curve bump exists");
        assert!(lower < derived.bump);
        assert_ne!(
            create_program_address(&seeds, lower, &program()).unwrap(),
            derived.address
        );
    }

    #[test]
    fn test_search_order_prefers_high_bumps() {
        let seeds = Seeds::new().with(b"config");
        // Treat the first five candidates as on-curve: bump 250 must be chosen
        // even though every lower bump also passes.
        let rejected: Vec<[u8; 32]> = (251..=255u8)
            .map(|b| hash_candidate(&seeds, b, &program()))
            .collect();
        let derived = find_canonical(&seeds, &program(), |d| rejected.contains(d)).unwrap();
        assert_eq!(derived.bump, 250);
    }

    #[test]
    fn test_exhausted_search() {
        let seeds = Seeds::new().with(b"config");
        let err = find_canonical(&seeds, &program(), |_| true).unwrap_err();
        assert_eq!(err, LaunchpadError::AddressDerivationExhausted { program: program() });
    }

    #[test]
    fn test_seed_limits() {
        let long = [7u8; 33];
        let err = derive(&Seeds::new().with(long), &program()).unwrap_err();
        assert!(matches!(err, LaunchpadError::InvalidSeeds(_)));

        let mut many = Seeds::new();
        for i in 0..16u8 {
            many = many.with([i]);
        }
        assert!(matches!(
            derive(&many, &program()),
            Err(LaunchpadError::InvalidSeeds(_))
        ));
    }

    #[test]
    fn test_project_name_too_long() {
        let name = "a project name that is definitely too long";
        assert!(project_address(&program(), name).is_err());
    }

    #[test]
    fn test_associated_token_address_matches_spl() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let ours = associated_token_address(&owner, &mint).unwrap();
        let expected = spl_associated_token_account::get_associated_token_address(&owner, &mint);
        assert_eq!(ours, expected);
    }

    #[test]
    fn test_program_data_address_matches_runtime() {
        let ours = program_data_address(&program()).unwrap();
        let (expected, _) = Pubkey::find_program_address(&[program().as_ref()], &BPF_LOADER_UPGRADEABLE_ID);
        assert_eq!(ours, expected);
    }

    proptest! {
        #[test]
        fn prop_single_byte_change_moves_address(
            seed in proptest::collection::vec(any::<u8>(), 1..=32),
            index in any::<prop::sample::Index>(),
        ) {
            let original = derive(&Seeds::new().with(&seed), &program()).unwrap();
            let mut flipped = seed.clone();
            let i = index.index(flipped.len());
            flipped[i] ^= 0x01;
            let changed = derive(&Seeds::new().with(&flipped), &program()).unwrap();
            prop_assert_ne!(original.address, changed.address);
        }

        #[test]
        fn prop_derive_is_pure(seed in proptest::collection::vec(any::<u8>(), 0..=32)) {
            let seeds = Seeds::new().with(&seed);
            let a = derive(&seeds, &program()).unwrap();
            let b = derive(&seeds, &program()).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
