//! In-memory chain collaborator for tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
        Mutex, PoisonError,
    },
    time::Duration,
};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;

use wallet_factory_types::{ChainCollaborator, ChainError, SubmissionPayload, TransactionReceipt, TxHandle};

use crate::{
    config::ProvisioningConfig,
    digest::keccak256_bytes,
    factory::wallet_created_log,
    WalletCreationRequest,
};

/// Mock factory deployment.
///
/// By default it behaves like a correct factory: its oracle and its `WalletCreated` events
/// report the CREATE2 address of the configured init-code hash. Knobs let tests make it lie,
/// fail, revert or stall.
pub struct MockChain {
    config: ProvisioningConfig,
    oracle: bool,
    oracle_override: Option<Address>,
    created_override: Option<Address>,
    receipt_delay: Option<Duration>,
    failing_submissions: AtomicU32,
    revert_next: AtomicBool,
    next_nonce: AtomicU64,
    pending: Mutex<HashMap<B256, Pending>>,
    payloads: Mutex<Vec<SubmissionPayload>>,
}

#[derive(Clone, Copy)]
struct Pending {
    owner: Address,
    salt: U256,
    revert: bool,
    nonce: u64,
}

impl MockChain {
    pub fn new(config: ProvisioningConfig) -> Self {
        Self {
            config,
            oracle: true,
            oracle_override: None,
            created_override: None,
            receipt_delay: None,
            failing_submissions: AtomicU32::new(0),
            revert_next: AtomicBool::new(false),
            next_nonce: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            payloads: Mutex::new(Vec::new()),
        }
    }

    /// Behave like a collaborator without `computeWalletAddress` support.
    pub fn without_oracle(mut self) -> Self {
        self.oracle = false;
        self
    }

    /// Make the factory oracle report `address` for every owner.
    pub fn oracle_reporting(mut self, address: Address) -> Self {
        self.oracle_override = Some(address);
        self
    }

    /// Make `WalletCreated` report `address` instead of the correct one.
    pub fn creating_at(mut self, address: Address) -> Self {
        self.created_override = Some(address);
        self
    }

    /// Delay every receipt by `delay`.
    pub fn with_receipt_delay(mut self, delay: Duration) -> Self {
        self.receipt_delay = Some(delay);
        self
    }

    /// Reject the next `count` submissions as if the node were unreachable.
    pub fn fail_next_submissions(&self, count: u32) {
        self.failing_submissions.store(count, Ordering::SeqCst);
    }

    /// Revert the next submitted transaction.
    pub fn revert_next(&self) {
        self.revert_next.store(true, Ordering::SeqCst);
    }

    /// Payloads of every submission the node accepted, in order.
    pub fn submitted_payloads(&self) -> Vec<SubmissionPayload> {
        self.payloads.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn correct_address(&self, owner: Address, salt: U256) -> Address {
        self.config.predict_wallet_address(owner, salt)
    }
}

#[async_trait]
impl ChainCollaborator for MockChain {
    async fn deterministic_address(&self, owner: Address, salt: U256) -> Result<Address, ChainError> {
        if !self.oracle {
            return Err(ChainError::NotImplemented);
        }
        Ok(self
            .oracle_override
            .unwrap_or_else(|| self.correct_address(owner, salt)))
    }

    async fn submit_creation(
        &self,
        request: &WalletCreationRequest,
        payload: &SubmissionPayload,
    ) -> Result<TxHandle, ChainError> {
        if self
            .failing_submissions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ChainError::Unavailable("mock node offline".to_string()));
        }
        if payload.to != self.config.factory {
            return Err(ChainError::Rejected(format!("unexpected target {}", payload.to)));
        }

        let nonce = self.next_nonce.fetch_add(1, Ordering::SeqCst);
        let mut preimage = payload.calldata.to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let tx_hash = keccak256_bytes(&preimage);

        let pending = Pending {
            owner: request.owner(),
            salt: request.salt(),
            revert: self.revert_next.swap(false, Ordering::SeqCst),
            nonce,
        };
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tx_hash, pending);
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(payload.clone());

        Ok(TxHandle { tx_hash, nonce })
    }

    async fn await_receipt(&self, handle: &TxHandle) -> Result<TransactionReceipt, ChainError> {
        if let Some(delay) = self.receipt_delay {
            tokio::time::sleep(delay).await;
        }
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle.tx_hash)
            .copied()
            .ok_or_else(|| ChainError::MalformedResponse(format!("unknown tx {}", handle.tx_hash)))?;

        let logs = if pending.revert {
            Vec::new()
        } else {
            let wallet = self
                .created_override
                .unwrap_or_else(|| self.correct_address(pending.owner, pending.salt));
            vec![wallet_created_log(self.config.factory, wallet, pending.owner)]
        };

        Ok(TransactionReceipt {
            tx_hash: handle.tx_hash,
            success: !pending.revert,
            block_number: 1 + pending.nonce,
            gas_used: 250_000,
            logs,
        })
    }
}
