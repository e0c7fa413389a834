//! Off-chain side of deterministic smart-wallet provisioning.
//!
//! Given a [`WalletPolicy`] this crate produces everything the wallet factory needs to create
//! the wallet, and checks the factory's answer against what was predicted locally:
//!
//! - [`encoder`]: canonical ABI encoding of the policy.
//! - [`digest`]: EIP-712 digest scoped to one factory deployment.
//! - [`signer`]: owner authorization (secp256k1) and its verification.
//! - [`address`]: CREATE2 prediction of the wallet address.
//! - [`orchestrator`]: the provisioning state machine driving a [`ChainCollaborator`].
//! - [`raw_tx`] / [`replay`]: legacy signed-transaction codec and fixture replay.

pub mod address;
pub mod config;
pub mod digest;
pub mod encoder;
pub mod errors;
pub mod factory;
pub mod mock;
pub mod orchestrator;
pub mod raw_tx;
pub mod replay;
pub mod signer;
pub mod types;

#[cfg(test)]
mod tests;

pub use wallet_factory_types::{
    AuthorizationSignature, ChainCollaborator, PolicyConfig, RawTxFixture, WalletCreationRequest,
    WalletPolicy,
};

pub use config::ProvisioningConfig;
pub use errors::{
    AddressMismatchError, ChainError, EncodingError, MalformedTxError, ProvisionError, SigningError,
    SubmissionError,
};
pub use orchestrator::{ProvisioningAttempt, ProvisioningState, Provisioner};
pub use signer::{AuthorizationSigner, LocalKeySigner};
pub use types::{EncodedPolicy, FactoryDomain};
