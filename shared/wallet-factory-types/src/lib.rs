//! Shared types for wallet policies, factory requests, chain collaborators and tx fixtures.

pub mod chain;
pub mod errors;
pub mod fixture;
pub mod policy;

pub use chain::{ChainCollaborator, ChainError, SubmissionPayload, TransactionReceipt, TxHandle};
pub use errors::EncodingError;
pub use fixture::RawTxFixture;
pub use policy::{AuthorizationSignature, NumberInput, PolicyConfig, WalletCreationRequest, WalletPolicy};
