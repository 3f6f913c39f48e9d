//! Raw account bytes to typed state.
//!
//! Three shapes are understood:
//!
//! - the metadata header: `slot: u32 LE`, `len: u32 LE`, then `len` payload
//!   bytes;
//! - the 36-byte program pointer: `tag: u32 LE` (2 for programs) followed by
//!   the address of the program-data account;
//! - Anchor accounts: an 8-byte `account:` discriminator, then fields in
//!   declaration order.
//!
//! Declared lengths are checked against the bytes actually present before
//! anything is sliced. Nothing here is cached; every fetch reads the chain.

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;

use crate::error::{Corruption, LaunchpadError, LaunchpadResult};
use crate::program::codec::ArgDecoder;
use crate::program::discriminator::{DISCRIMINATOR_LEN, Discriminator, account_discriminator};
use crate::program::pda::program_data_address;
use crate::services::rpc::RpcEndpoint;
use crate::state_structs::{Investment, LaunchpadConfig, Project, ProjectStatus, UserProfile};

/// Largest account the runtime allows
pub const MAX_ACCOUNT_SIZE: u64 = 10 * 1024 * 1024;

pub const METADATA_HEADER_LEN: usize = 8;

pub const POINTER_LEN: usize = 36;

/// Pointer tag marking an upgradeable program account
pub const PROGRAM_POINTER_TAG: u32 = 2;

/// Decoded fields alongside the bytes they came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot<T> {
    pub raw: Vec<u8>,
    pub fields: T,
}

/// An Anchor-style account type the reader can decode
pub trait AccountLayout: Sized {
    /// Struct name as declared in the program; feeds the discriminator
    const TYPE_NAME: &'static str;

    fn discriminator() -> Discriminator {
        account_discriminator(Self::TYPE_NAME)
    }

    fn decode_fields(decoder: &mut ArgDecoder<'_>) -> LaunchpadResult<Self>;
}

fn field_error(err: LaunchpadError) -> LaunchpadError {
    match err {
        LaunchpadError::Codec(msg) => LaunchpadError::corrupt(None, Corruption::Field(msg)),
        other => other,
    }
}

/// Fill in the address on corruption errors raised before it was known
fn at(address: &Pubkey) -> impl FnOnce(LaunchpadError) -> LaunchpadError + '_ {
    move |err| match err {
        LaunchpadError::AccountCorrupt { address: None, reason } => {
            LaunchpadError::corrupt(Some(*address), reason)
        }
        other => other,
    }
}

/// Decode an Anchor account. Bytes past the last field are allocation slack
/// and are ignored.
pub fn decode<T: AccountLayout>(raw: &[u8]) -> LaunchpadResult<AccountSnapshot<T>> {
    let tag = raw.get(..DISCRIMINATOR_LEN).ok_or_else(|| {
        LaunchpadError::corrupt(
            None,
            Corruption::Truncated {
                declared: DISCRIMINATOR_LEN,
                available: raw.len(),
            },
        )
    })?;
    if tag != T::discriminator() {
        let mut found = [0u8; DISCRIMINATOR_LEN];
        found.copy_from_slice(tag);
        return Err(LaunchpadError::corrupt(
            None,
            Corruption::DiscriminatorMismatch {
                expected: T::TYPE_NAME,
                found,
            },
        ));
    }

    let mut decoder = ArgDecoder::new(&raw[DISCRIMINATOR_LEN..]);
    let fields = T::decode_fields(&mut decoder).map_err(field_error)?;
    Ok(AccountSnapshot {
        raw: raw.to_vec(),
        fields,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramMetadata {
    pub slot: u32,
    pub payload: Vec<u8>,
}

/// Decode a metadata header and its payload.
///
/// An implausible declared length is reported as such even when the buffer
/// is also short, so a garbage header never reads as a mere truncation.
pub fn decode_metadata(raw: &[u8]) -> LaunchpadResult<AccountSnapshot<ProgramMetadata>> {
    if raw.len() < METADATA_HEADER_LEN {
        return Err(LaunchpadError::corrupt(
            None,
            Corruption::Truncated {
                declared: METADATA_HEADER_LEN,
                available: raw.len(),
            },
        ));
    }

    let mut header = ArgDecoder::new(&raw[..METADATA_HEADER_LEN]);
    let slot = header.read_u32()?;
    let declared = header.read_u32()?;

    if u64::from(declared) > MAX_ACCOUNT_SIZE {
        return Err(LaunchpadError::corrupt(
            None,
            Corruption::Implausible {
                declared: u64::from(declared),
                limit: MAX_ACCOUNT_SIZE,
            },
        ));
    }

    let body = &raw[METADATA_HEADER_LEN..];
    let declared = declared as usize;
    let payload = body.get(..declared).ok_or_else(|| {
        LaunchpadError::corrupt(
            None,
            Corruption::Truncated {
                declared,
                available: body.len(),
            },
        )
    })?;

    Ok(AccountSnapshot {
        raw: raw.to_vec(),
        fields: ProgramMetadata {
            slot,
            payload: payload.to_vec(),
        },
    })
}

/// A program account's pointer to its program-data account.
///
/// The target is only handed out through [`ProgramPointer::verify_target`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramPointer {
    target: Pubkey,
}

impl ProgramPointer {
    pub fn decode(raw: &[u8]) -> LaunchpadResult<Self> {
        if raw.len() < POINTER_LEN {
            return Err(LaunchpadError::corrupt(
                None,
                Corruption::Truncated {
                    declared: POINTER_LEN,
                    available: raw.len(),
                },
            ));
        }
        let mut decoder = ArgDecoder::new(&raw[..POINTER_LEN]);
        let tag = decoder.read_u32()?;
        if tag != PROGRAM_POINTER_TAG {
            return Err(LaunchpadError::corrupt(
                None,
                Corruption::UnexpectedTag {
                    expected: PROGRAM_POINTER_TAG,
                    found: tag,
                },
            ));
        }
        Ok(Self {
            target: decoder.read_address()?,
        })
    }

    pub fn verify_target(&self, expected: &Pubkey) -> LaunchpadResult<Pubkey> {
        if self.target != *expected {
            return Err(LaunchpadError::corrupt(
                None,
                Corruption::PointerMismatch {
                    expected: *expected,
                    found: self.target,
                },
            ));
        }
        Ok(self.target)
    }
}

impl AccountLayout for LaunchpadConfig {
    const TYPE_NAME: &'static str = "LaunchpadConfig";

    fn decode_fields(d: &mut ArgDecoder<'_>) -> LaunchpadResult<Self> {
        Ok(Self {
            authority: d.read_address()?,
            token_mint: d.read_address()?,
            platform_fee_percent: d.read_u8()?,
            project_count: d.read_u64()?,
            bump: d.read_u8()?,
        })
    }
}

impl AccountLayout for UserProfile {
    const TYPE_NAME: &'static str = "UserProfile";

    fn decode_fields(d: &mut ArgDecoder<'_>) -> LaunchpadResult<Self> {
        Ok(Self {
            owner: d.read_address()?,
            username: d.read_string()?,
            projects_created: d.read_u64()?,
            total_invested: d.read_u64()?,
            bump: d.read_u8()?,
        })
    }
}

impl AccountLayout for Project {
    const TYPE_NAME: &'static str = "Project";

    fn decode_fields(d: &mut ArgDecoder<'_>) -> LaunchpadResult<Self> {
        Ok(Self {
            creator: d.read_address()?,
            name: d.read_string()?,
            token_mint: d.read_address()?,
            target_amount: d.read_u64()?,
            raised_amount: d.read_u64()?,
            investor_count: d.read_u64()?,
            status: ProjectStatus::try_from(d.read_u8()?)?,
            bump: d.read_u8()?,
        })
    }
}

impl AccountLayout for Investment {
    const TYPE_NAME: &'static str = "Investment";

    fn decode_fields(d: &mut ArgDecoder<'_>) -> LaunchpadResult<Self> {
        Ok(Self {
            investor: d.read_address()?,
            project: d.read_address()?,
            amount: d.read_u64()?,
            bump: d.read_u8()?,
        })
    }
}

/// What [`AccountStateReader::inspect_program`] found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInspection {
    pub program_id: Pubkey,
    pub program_data: Pubkey,
    pub metadata: AccountSnapshot<ProgramMetadata>,
}

/// Fetches accounts through an [`RpcEndpoint`] and decodes them
#[derive(Clone)]
pub struct AccountStateReader {
    rpc: Arc<dyn RpcEndpoint>,
    program_id: Pubkey,
}

impl AccountStateReader {
    /// `program_id` is the owner every typed account must have
    pub fn new(rpc: Arc<dyn RpcEndpoint>, program_id: Pubkey) -> Self {
        Self { rpc, program_id }
    }

    pub async fn exists(&self, address: &Pubkey) -> LaunchpadResult<bool> {
        Ok(self.rpc.get_account_info(address).await?.is_some())
    }

    pub async fn fetch_raw(&self, address: &Pubkey) -> LaunchpadResult<Vec<u8>> {
        self.rpc
            .get_account_info(address)
            .await?
            .map(|account| account.data)
            .ok_or(LaunchpadError::AccountNotFound(*address))
    }

    /// `AccountNotFound` when nothing lives at `address`
    pub async fn fetch<T: AccountLayout>(&self, address: &Pubkey) -> LaunchpadResult<AccountSnapshot<T>> {
        self.fetch_optional(address)
            .await?
            .ok_or(LaunchpadError::AccountNotFound(*address))
    }

    pub async fn fetch_optional<T: AccountLayout>(
        &self,
        address: &Pubkey,
    ) -> LaunchpadResult<Option<AccountSnapshot<T>>> {
        let Some(account) = self.rpc.get_account_info(address).await? else {
            return Ok(None);
        };
        if account.owner != self.program_id {
            return Err(LaunchpadError::corrupt(
                Some(*address),
                Corruption::WrongOwner {
                    expected: self.program_id,
                    found: account.owner,
                },
            ));
        }
        let snapshot = decode::<T>(&account.data).map_err(at(address))?;
        tracing::debug!(%address, layout = T::TYPE_NAME, len = account.data.len(), "decoded account");
        Ok(Some(snapshot))
    }

    /// Resolve and verify `program_id`'s program-data account
    pub async fn program_data(&self, program_id: &Pubkey) -> LaunchpadResult<Pubkey> {
        let raw = self.fetch_raw(program_id).await?;
        let pointer = ProgramPointer::decode(&raw).map_err(at(program_id))?;
        let expected = program_data_address(program_id)?;
        pointer.verify_target(&expected).map_err(at(program_id))
    }

    /// Follow the program's pointer, check it, and decode the metadata header
    pub async fn inspect_program(&self, program_id: &Pubkey) -> LaunchpadResult<ProgramInspection> {
        let program_data = self.program_data(program_id).await?;
        let raw = self.fetch_raw(&program_data).await?;
        let metadata = decode_metadata(&raw).map_err(at(&program_data))?;
        tracing::info!(
            program = %program_id,
            %program_data,
            slot = metadata.fields.slot,
            payload_len = metadata.fields.payload.len(),
            "inspected program"
        );
        Ok(ProgramInspection {
            program_id: *program_id,
            program_data,
            metadata,
        })
    }
}
