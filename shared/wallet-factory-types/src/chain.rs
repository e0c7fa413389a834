use alloy_primitives::{Address, Bytes, Log, B256, U256};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::policy::WalletCreationRequest;

/// Faults reported by a chain collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Used by mocks or partial collaborators.
    #[error("operation not supported by this chain collaborator")]
    NotImplemented,
    #[error("chain unavailable: {0}")]
    Unavailable(String),
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("insufficient gas (limit {limit})")]
    InsufficientGas { limit: u64 },
    #[error("timed out waiting for the chain")]
    Timeout,
    /// Return data was malformed or could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Transaction the collaborator should send to the factory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub to: Address,
    pub calldata: Bytes,
    pub gas_limit: u64,
}

/// Handle for a submitted (not yet confirmed) transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxHandle {
    pub tx_hash: B256,
    /// Sender nonce used for this submission; each resubmission gets a fresh one.
    pub nonce: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub tx_hash: B256,
    /// `false` when the transaction reverted.
    pub success: bool,
    pub block_number: u64,
    pub gas_used: u64,
    pub logs: Vec<Log>,
}

/// The node-facing side of provisioning, implemented by real RPC clients and by test mocks.
#[async_trait]
pub trait ChainCollaborator: Send + Sync {
    /// The factory's own view of `computeWalletAddress(owner, salt)`.
    async fn deterministic_address(&self, _owner: Address, _salt: U256) -> Result<Address, ChainError> {
        Err(ChainError::NotImplemented)
    }

    /// Send the creation transaction; returns once the node accepted it.
    async fn submit_creation(
        &self,
        request: &WalletCreationRequest,
        payload: &SubmissionPayload,
    ) -> Result<TxHandle, ChainError>;

    /// Wait for the receipt of a previously submitted transaction.
    async fn await_receipt(&self, handle: &TxHandle) -> Result<TransactionReceipt, ChainError>;
}
