//! # Services Module
//!
//! Everything that talks to the chain: the RPC and signer capabilities and
//! the transaction submitter built on them.

pub mod rpc;
pub mod submitter;

pub use rpc::{ConfirmationStatus, KeypairSigner, RecentBlockhash, RpcClientEndpoint, RpcEndpoint, TransactionSigner};
pub use submitter::{
    AttemptRecord, BuildStrategy, ConfirmationPolicy, EnsureOutcome, FallbackOutcome, TransactionEnvelope,
    TransactionSubmitter, TxState,
};
