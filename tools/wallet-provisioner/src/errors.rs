use std::{fmt, time::Duration};

use alloy_primitives::{Address, B256};
use thiserror::Error;

pub use wallet_factory_types::{ChainError, EncodingError};

use crate::orchestrator::ProvisioningState;

/// Errors from the signing backend or from signature verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    #[error("invalid secp256k1 signing key")]
    InvalidKey,
    #[error("signing backend rejected the digest: {0}")]
    Backend(String),
    #[error("signature must be 65 bytes, got {0}")]
    InvalidLength(usize),
    #[error("unsupported recovery byte {0}")]
    InvalidRecoveryId(u8),
    #[error("signature does not recover a public key: {0}")]
    Unrecoverable(String),
    #[error("signer {recovered} is not the wallet owner {expected}")]
    SignerMismatch { expected: Address, recovered: Address },
    #[error("policy could not be encoded: {0}")]
    Encoding(#[from] EncodingError),
}

/// Where the disagreeing address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchOrigin {
    /// `computeWalletAddress` on the factory.
    Oracle,
    /// The `WalletCreated` event of the creation receipt.
    Receipt,
}

impl fmt::Display for MismatchOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchOrigin::Oracle => f.write_str("factory oracle"),
            MismatchOrigin::Receipt => f.write_str("creation receipt"),
        }
    }
}

/// Local CREATE2 derivation disagrees with the deployed factory.
///
/// Terminal: the derivation rule (or the configured init-code hash) has drifted from the
/// factory, so retrying cannot help.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("wallet address mismatch ({origin}): predicted {predicted}, chain reported {reported}")]
pub struct AddressMismatchError {
    pub predicted: Address,
    pub reported: Address,
    pub origin: MismatchOrigin,
}

/// Transient chain-side failures. Retryable with a fresh nonce.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("no receipt within {0:?}")]
    Timeout(Duration),
    #[error("transaction {0} reverted")]
    Reverted(B256),
    #[error("receipt of {0} carries no WalletCreated event from the factory")]
    MissingCreationEvent(B256),
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Raw transaction blob could not be decoded (or does not round-trip).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedTxError {
    #[error("invalid hex: {0}")]
    Hex(String),
    #[error("empty transaction")]
    Empty,
    #[error("rlp: {0}")]
    Rlp(String),
    #[error("transaction is not an rlp list")]
    NotAList,
    #[error("{0} trailing bytes after the transaction list")]
    TrailingBytes(usize),
    #[error("expected 9 fields, found {0}")]
    FieldCount(usize),
    #[error("field `{0}` must be a byte string, found a list")]
    UnexpectedList(&'static str),
    #[error("field `{0}` is not canonically encoded")]
    NonCanonical(&'static str),
    #[error("field `{field}` is {len} bytes, at most {max} allowed")]
    FieldTooLong { field: &'static str, len: usize, max: usize },
    #[error("destination must be empty or 20 bytes, got {0}")]
    InvalidDestination(usize),
    #[error("re-encoding does not reproduce the input")]
    RoundTripMismatch,
    #[error("signature does not recover a sender: {0}")]
    BadSignature(String),
}

/// Everything a provisioning attempt can fail with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    AddressMismatch(#[from] AddressMismatchError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        state: ProvisioningState,
        action: &'static str,
    },
}

impl ProvisionError {
    /// Only chain-side faults may be retried, and only by re-submitting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProvisionError::Submission(_))
    }

    pub fn is_address_mismatch(&self) -> bool {
        matches!(self, ProvisionError::AddressMismatch(_))
    }
}
