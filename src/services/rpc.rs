//! Capabilities the client consumes: an RPC endpoint and a transaction
//! signer. Production adapters wrap `solana-client`'s nonblocking
//! `RpcClient` and an in-process `Keypair`; tests plug in an in-memory chain.

use std::str::FromStr;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde_json::json;
use solana_client::{
    client_error::ClientError, nonblocking::rpc_client::RpcClient, rpc_request::RpcRequest,
};
use solana_sdk::{
    account::Account,
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};

use crate::error::{LaunchpadError, LaunchpadResult};

/// Blockhash plus the last block height at which it is still accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentBlockhash {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Result of one confirmation poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Not yet seen at the requested commitment
    Pending,
    Confirmed,
    /// Landed but the program returned an error
    Failed(String),
    /// Not seen, and its blockhash is no longer valid
    Expired,
}

#[async_trait]
pub trait RpcEndpoint: Send + Sync {
    /// `None` when no account lives at `address`
    async fn get_account_info(&self, address: &Pubkey) -> LaunchpadResult<Option<Account>>;

    async fn get_latest_blockhash(&self) -> LaunchpadResult<RecentBlockhash>;

    /// Broadcast an already signed, serialized transaction
    async fn send_raw_transaction(&self, raw: &[u8]) -> LaunchpadResult<Signature>;

    /// `blockhash` is the one the transaction was signed against, so the
    /// endpoint can tell a slow transaction from a dead one.
    async fn confirm_transaction(
        &self,
        signature: &Signature,
        blockhash: &Hash,
    ) -> LaunchpadResult<ConfirmationStatus>;
}

#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn public_key(&self) -> Pubkey;

    /// Sign against the transaction's own recent blockhash. A refusal must
    /// come back as `WalletRejected`.
    async fn sign_transaction(&self, tx: Transaction) -> LaunchpadResult<Transaction>;
}

pub(crate) fn classify_client_error(err: ClientError) -> LaunchpadError {
    LaunchpadError::classify(&err.to_string())
}

/// `RpcEndpoint` over a JSON-RPC node
pub struct RpcClientEndpoint {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl RpcClientEndpoint {
    pub fn new(rpc_url: &str, commitment: CommitmentConfig) -> Self {
        Self {
            client: RpcClient::new_with_commitment(rpc_url.to_string(), commitment),
            commitment,
        }
    }

    pub fn url(&self) -> String {
        self.client.url()
    }
}

#[async_trait]
impl RpcEndpoint for RpcClientEndpoint {
    async fn get_account_info(&self, address: &Pubkey) -> LaunchpadResult<Option<Account>> {
        self.client
            .get_account_with_commitment(address, self.commitment)
            .await
            .map(|response| response.value)
            .map_err(classify_client_error)
    }

    async fn get_latest_blockhash(&self) -> LaunchpadResult<RecentBlockhash> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .map_err(classify_client_error)?;
        Ok(RecentBlockhash {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> LaunchpadResult<Signature> {
        let params = json!([
            BASE64.encode(raw),
            {
                "encoding": "base64",
                "preflightCommitment": self.commitment.commitment,
            }
        ]);
        let signature: String = self
            .client
            .send(RpcRequest::SendTransaction, params)
            .await
            .map_err(classify_client_error)?;
        Signature::from_str(&signature)
            .map_err(|e| LaunchpadError::NetworkError(format!("node returned bad signature {}: {}", signature, e)))
    }

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        blockhash: &Hash,
    ) -> LaunchpadResult<ConfirmationStatus> {
        let statuses = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(classify_client_error)?
            .value;

        if let Some(Some(status)) = statuses.into_iter().next() {
            if let Some(err) = status.err {
                return Ok(ConfirmationStatus::Failed(err.to_string()));
            }
            if status.satisfies_commitment(self.commitment) {
                return Ok(ConfirmationStatus::Confirmed);
            }
            return Ok(ConfirmationStatus::Pending);
        }

        let still_valid = self
            .client
            .is_blockhash_valid(blockhash, self.commitment)
            .await
            .map_err(classify_client_error)?;
        Ok(if still_valid {
            ConfirmationStatus::Pending
        } else {
            ConfirmationStatus::Expired
        })
    }
}

/// Signs with a keypair held in memory
pub struct KeypairSigner {
    keypair: Keypair,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// From a base58-encoded 64-byte secret, the format wallets export
    pub fn from_base58(secret: &str) -> LaunchpadResult<Self> {
        let bytes = bs58::decode(secret.trim())
            .into_vec()
            .map_err(|e| LaunchpadError::Config(format!("signer keypair is not base58: {}", e)))?;
        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|e| LaunchpadError::Config(format!("signer keypair is invalid: {}", e)))?;
        Ok(Self::new(keypair))
    }
}

#[async_trait]
impl TransactionSigner for KeypairSigner {
    fn public_key(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_transaction(&self, mut tx: Transaction) -> LaunchpadResult<Transaction> {
        let blockhash = tx.message.recent_blockhash;
        tx.try_sign(&[&self.keypair], blockhash)
            .map_err(|e| LaunchpadError::WalletRejected(e.to_string()))?;
        Ok(tx)
    }
}
