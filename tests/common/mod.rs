//! In-memory chain used by the integration tests.
//!
//! Only the parts of the launchpad program the client can observe are
//! modelled: creation instructions allocate their first account and fail
//! with "already in use" when it exists, investments move `raised_amount`.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use launchpad_client::{
    ClientSettings, LaunchpadClient, LaunchpadError, LaunchpadResult,
    program::accounts::{AccountLayout, PROGRAM_POINTER_TAG},
    program::codec::{ArgEncoder, ArgValue},
    program::discriminator::Operation,
    program::instruction::InstructionBuilder,
    program::pda::{self, BPF_LOADER_UPGRADEABLE_ID},
    services::{
        ConfirmationPolicy, ConfirmationStatus, KeypairSigner, RecentBlockhash, RpcEndpoint,
        TransactionSigner,
    },
    state_structs::{Investment, LaunchpadConfig, Project, ProjectStatus, UserProfile},
};
use solana_sdk::{
    account::Account,
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    transaction::Transaction,
};
use tokio::sync::Barrier;

pub const DECIMALS: u8 = 9;

pub fn program_id() -> Pubkey {
    solana_sdk::pubkey!("ChzF1fiEZ8Uo2q62dg2f8MJSQW2oDxw4PJcbWiC1pxQe")
}

pub fn token_mint() -> Pubkey {
    solana_sdk::pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v")
}

/// Knobs a test flips to steer the next calls
#[derive(Default)]
pub struct Script {
    /// This many `get_latest_blockhash` calls hand out an already dead hash
    pub stale_blockhashes: u32,
    /// Polls answered `Pending` before the real status is reported
    pub pending_polls: u32,
    /// Transactions are accepted but never land
    pub drop_sends: bool,
    /// Invalidate every blockhash right after a dropped send
    pub expire_after_drop: bool,
    /// Errors returned by the next sends, in order
    pub reject_sends: VecDeque<LaunchpadError>,
    /// Lookups of this address wait until the barrier fills
    pub lookup_barrier: Option<(Pubkey, Arc<Barrier>)>,
    /// Transfers fail preflight unless the wallet's token account exists
    pub require_token_accounts: bool,
}

#[derive(Default)]
struct ChainState {
    accounts: HashMap<Pubkey, Account>,
    current_blockhash: Hash,
    valid_blockhashes: HashSet<Hash>,
    landed: HashMap<Signature, Option<String>>,
    sent: Vec<Transaction>,
    polls: u32,
    creations: u32,
}

pub struct MockChain {
    program_id: Pubkey,
    builder: InstructionBuilder,
    state: Mutex<ChainState>,
    pub script: Mutex<Script>,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        let blockhash = Hash::new_unique();
        let mut state = ChainState {
            current_blockhash: blockhash,
            ..ChainState::default()
        };
        state.valid_blockhashes.insert(blockhash);
        Arc::new(Self {
            program_id: program_id(),
            builder: InstructionBuilder::new(program_id()),
            state: Mutex::new(state),
            script: Mutex::new(Script::default()),
        })
    }

    pub fn put_account(&self, address: Pubkey, owner: Pubkey, data: Vec<u8>) {
        let account = Account {
            lamports: 1_000_000,
            data,
            owner,
            executable: false,
            rent_epoch: 0,
        };
        self.state.lock().unwrap().accounts.insert(address, account);
    }

    pub fn account_data(&self, address: &Pubkey) -> Option<Vec<u8>> {
        self.state.lock().unwrap().accounts.get(address).map(|a| a.data.clone())
    }

    /// Program account pointing at `program_data`, plus a program-data
    /// account carrying a metadata header
    pub fn install_program(&self, program_data: Pubkey, slot: u32, payload: &[u8]) {
        let mut pointer = PROGRAM_POINTER_TAG.to_le_bytes().to_vec();
        pointer.extend_from_slice(program_data.as_ref());
        self.put_account(self.program_id, BPF_LOADER_UPGRADEABLE_ID, pointer);

        let mut data = slot.to_le_bytes().to_vec();
        data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        data.extend_from_slice(payload);
        self.put_account(program_data, BPF_LOADER_UPGRADEABLE_ID, data);
    }

    pub fn put_project(&self, name: &str, creator: Pubkey, target: u64, raised: u64, status: u8) -> Pubkey {
        let (address, bump) = {
            let derived = pda::project_address(&self.program_id, name).unwrap();
            (derived.address, derived.bump)
        };
        let mut enc = ArgEncoder::with_prefix(&Project::discriminator());
        enc.write_address(&creator);
        enc.write_string(name).unwrap();
        enc.write_address(&token_mint());
        enc.write_u64(target);
        enc.write_u64(raised);
        enc.write_u64(0);
        enc.write_u8(status);
        enc.write_u8(bump);
        self.put_account(address, self.program_id, enc.finish());
        address
    }

    pub fn sent(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn polls(&self) -> u32 {
        self.state.lock().unwrap().polls
    }

    pub fn creations(&self) -> u32 {
        self.state.lock().unwrap().creations
    }

    /// Position of the wallet's token account in a transfer's table
    fn wallet_token_account_index(operation: Operation) -> Option<usize> {
        match operation {
            Operation::InvestInProject | Operation::ClaimRefund => Some(3),
            Operation::WithdrawFunds => Some(2),
            _ => None,
        }
    }

    /// Apply one launchpad instruction to the account map
    fn execute(&self, state: &mut ChainState, accounts: &[Pubkey], data: &[u8]) -> Result<(), String> {
        let (operation, args) = self.builder.decode_instruction(data).map_err(|e| e.to_string())?;
        let first = accounts[0];

        let created = match operation {
            Operation::InitializeConfig => {
                let fee = match args[0] {
                    ArgValue::U8(fee) => fee,
                    _ => return Err("bad fee".to_string()),
                };
                let mut enc = ArgEncoder::with_prefix(&LaunchpadConfig::discriminator());
                enc.write_address(&accounts[1]);
                enc.write_address(&accounts[2]);
                enc.write_u8(fee);
                enc.write_u64(0);
                enc.write_u8(255);
                Some(enc.finish())
            }
            Operation::InitializeProfile => {
                let username = match &args[0] {
                    ArgValue::String(name) => name.clone(),
                    _ => return Err("bad username".to_string()),
                };
                let mut enc = ArgEncoder::with_prefix(&UserProfile::discriminator());
                enc.write_address(&accounts[1]);
                enc.write_string(&username).map_err(|e| e.to_string())?;
                enc.write_u64(0);
                enc.write_u64(0);
                enc.write_u8(255);
                Some(enc.finish())
            }
            Operation::CreateProject => {
                let (name, target) = match (&args[0], &args[1]) {
                    (ArgValue::String(name), ArgValue::U64(target)) => (name.clone(), *target),
                    _ => return Err("bad project args".to_string()),
                };
                let mut enc = ArgEncoder::with_prefix(&Project::discriminator());
                enc.write_address(&accounts[4]);
                enc.write_string(&name).map_err(|e| e.to_string())?;
                enc.write_address(&accounts[5]);
                enc.write_u64(target);
                enc.write_u64(0);
                enc.write_u64(0);
                enc.write_u8(ProjectStatus::Funding as u8);
                enc.write_u8(255);
                Some(enc.finish())
            }
            Operation::InvestInProject => {
                let amount = match args[0] {
                    ArgValue::U64(amount) => amount,
                    _ => return Err("bad amount".to_string()),
                };
                let mut enc = ArgEncoder::with_prefix(&Investment::discriminator());
                enc.write_address(&accounts[5]);
                enc.write_address(&first);
                enc.write_u64(amount);
                enc.write_u8(255);
                let investment = enc.finish();

                // raised_amount sits after creator, name, mint and target
                let project = state.accounts.get_mut(&first).ok_or("project missing")?;
                let name_len = u32::from_le_bytes(project.data[40..44].try_into().unwrap()) as usize;
                let offset = 8 + 32 + 4 + name_len + 32 + 8;
                let raised = u64::from_le_bytes(project.data[offset..offset + 8].try_into().unwrap());
                project.data[offset..offset + 8].copy_from_slice(&(raised + amount).to_le_bytes());

                state.accounts.insert(
                    accounts[1],
                    Account {
                        lamports: 1,
                        data: investment,
                        owner: self.program_id,
                        executable: false,
                        rent_epoch: 0,
                    },
                );
                None
            }
            Operation::WithdrawFunds | Operation::ClaimRefund | Operation::CloseProject => None,
        };

        if let Some(data) = created {
            if state.accounts.contains_key(&first) {
                return Err(format!(
                    "Transaction simulation failed: Allocate: account Address {{ address: {}, base: None }} {}",
                    first, "already in use"
                ));
            }
            state.accounts.insert(
                first,
                Account {
                    lamports: 1,
                    data,
                    owner: self.program_id,
                    executable: false,
                    rent_epoch: 0,
                },
            );
            state.creations += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl RpcEndpoint for MockChain {
    async fn get_account_info(&self, address: &Pubkey) -> LaunchpadResult<Option<Account>> {
        let account = self.state.lock().unwrap().accounts.get(address).cloned();

        let barrier = match &self.script.lock().unwrap().lookup_barrier {
            Some((target, barrier)) if target == address => Some(barrier.clone()),
            _ => None,
        };
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        Ok(account)
    }

    async fn get_latest_blockhash(&self) -> LaunchpadResult<RecentBlockhash> {
        let stale = {
            let mut script = self.script.lock().unwrap();
            if script.stale_blockhashes > 0 {
                script.stale_blockhashes -= 1;
                true
            } else {
                false
            }
        };
        let blockhash = if stale {
            Hash::new_unique()
        } else {
            self.state.lock().unwrap().current_blockhash
        };
        Ok(RecentBlockhash {
            blockhash,
            last_valid_block_height: 1_000,
        })
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> LaunchpadResult<Signature> {
        let tx: Transaction =
            bincode::deserialize(raw).map_err(|e| LaunchpadError::NetworkError(e.to_string()))?;
        if tx.verify().is_err() {
            return Err(LaunchpadError::classify("Transaction signature verification failure"));
        }

        let mut state = self.state.lock().unwrap();
        state.sent.push(tx.clone());

        if !state.valid_blockhashes.contains(&tx.message.recent_blockhash) {
            return Err(LaunchpadError::classify("Transaction simulation failed: Blockhash not found"));
        }

        let mut script = self.script.lock().unwrap();
        if let Some(err) = script.reject_sends.pop_front() {
            return Err(err);
        }

        let signature = tx.signatures[0];
        if script.drop_sends {
            if script.expire_after_drop {
                state.valid_blockhashes.clear();
                let fresh = Hash::new_unique();
                state.current_blockhash = fresh;
                state.valid_blockhashes.insert(fresh);
            }
            return Ok(signature);
        }
        let require_token_accounts = script.require_token_accounts;
        drop(script);

        // Preflight: apply against a scratch copy, commit only on success
        let mut scratch = ChainState {
            accounts: state.accounts.clone(),
            creations: state.creations,
            ..ChainState::default()
        };
        for (index, ix) in tx.message.instructions.iter().enumerate() {
            let program = tx.message.account_keys[ix.program_id_index as usize];
            let accounts: Vec<Pubkey> = ix
                .accounts
                .iter()
                .map(|i| tx.message.account_keys[*i as usize])
                .collect();

            if program == spl_associated_token_account::ID {
                // Idempotent create: the token account is the second key
                scratch.accounts.entry(accounts[1]).or_insert(Account {
                    lamports: 1,
                    data: vec![0u8; 165],
                    owner: spl_token::ID,
                    executable: false,
                    rent_epoch: 0,
                });
                continue;
            }
            if program != self.program_id {
                continue;
            }

            if require_token_accounts {
                let operation = self
                    .builder
                    .decode_instruction(&ix.data)
                    .map(|(op, _)| op)
                    .map_err(|e| LaunchpadError::classify(&e.to_string()))?;
                if let Some(i) = Self::wallet_token_account_index(operation) {
                    if !scratch.accounts.contains_key(&accounts[i]) {
                        // AccountNotInitialized
                        return Err(LaunchpadError::classify(&format!(
                            "Transaction simulation failed: Error processing Instruction {}: {}",
                            index, "custom program error: 0xbc4"
                        )));
                    }
                }
            }
            self.execute(&mut scratch, &accounts, &ix.data)
                .map_err(|msg| LaunchpadError::classify(&msg))?;
        }
        state.accounts = scratch.accounts;
        state.creations = scratch.creations;
        state.landed.insert(signature, None);
        Ok(signature)
    }

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        blockhash: &Hash,
    ) -> LaunchpadResult<ConfirmationStatus> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;

        {
            let mut script = self.script.lock().unwrap();
            if script.pending_polls > 0 {
                script.pending_polls -= 1;
                return Ok(ConfirmationStatus::Pending);
            }
        }

        Ok(match state.landed.get(signature) {
            Some(None) => ConfirmationStatus::Confirmed,
            Some(Some(err)) => ConfirmationStatus::Failed(err.clone()),
            None if !state.valid_blockhashes.contains(blockhash) => ConfirmationStatus::Expired,
            None => ConfirmationStatus::Pending,
        })
    }
}

/// A wallet whose user always says no
pub struct RejectingSigner {
    pub key: Pubkey,
}

#[async_trait]
impl TransactionSigner for RejectingSigner {
    fn public_key(&self) -> Pubkey {
        self.key
    }

    async fn sign_transaction(&self, _tx: Transaction) -> LaunchpadResult<Transaction> {
        Err(LaunchpadError::WalletRejected("User rejected the request.".to_string()))
    }
}

pub fn fast_policy() -> ConfirmationPolicy {
    ConfirmationPolicy {
        max_attempts: 4,
        base_delay: std::time::Duration::from_millis(100),
        max_delay: std::time::Duration::from_secs(1),
    }
}

pub fn settings() -> ClientSettings {
    ClientSettings {
        program_id: program_id(),
        token_mint: token_mint(),
        token_decimals: DECIMALS,
        confirmation: fast_policy(),
    }
}

pub fn client_with(chain: &Arc<MockChain>, signer: Arc<dyn TransactionSigner>) -> LaunchpadClient {
    LaunchpadClient::new(settings(), chain.clone(), signer)
}

pub fn client(chain: &Arc<MockChain>) -> (LaunchpadClient, Pubkey) {
    let signer = KeypairSigner::new(Keypair::new());
    let wallet = signer.public_key();
    (client_with(chain, Arc::new(signer)), wallet)
}
