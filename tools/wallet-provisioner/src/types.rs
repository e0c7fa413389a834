use alloy_primitives::{Address, Bytes};
use serde::Serialize;

use crate::digest::{DEFAULT_DOMAIN_NAME, DEFAULT_DOMAIN_VERSION};

/// Canonical ABI encoding of a wallet policy (see [`crate::encoder::encode_policy`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedPolicy(Vec<u8>);

impl EncodedPolicy {
    /// Wrap bytes from elsewhere; layout is checked when the encoding is read.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.0)
    }
}

/// EIP-712 domain of one factory deployment.
///
/// Binding the verifying contract and chain id into every digest keeps an authorization for
/// one factory from being replayed against another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl FactoryDomain {
    pub fn new(factory: Address, chain_id: u64) -> Self {
        Self {
            name: DEFAULT_DOMAIN_NAME.to_string(),
            version: DEFAULT_DOMAIN_VERSION.to_string(),
            chain_id,
            verifying_contract: factory,
        }
    }
}
