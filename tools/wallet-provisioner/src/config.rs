use std::{fs, path::Path, time::Duration};

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    address::derive_address,
    digest::{DEFAULT_DOMAIN_NAME, DEFAULT_DOMAIN_VERSION},
    types::FactoryDomain,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed parsing provisioning config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("factory address must be non-zero")]
    ZeroFactory,
    #[error("chain id must be non-zero")]
    ZeroChainId,
    #[error("wallet init-code hash must be non-zero")]
    ZeroInitCodeHash,
    #[error("EIP-712 domain name and version must be non-empty")]
    EmptyDomain,
    #[error("submit timeout must be between 1 and {MAX_SUBMIT_TIMEOUT_SECS} seconds, got {0}")]
    SubmitTimeoutOutOfRange(u64),
}

/// One day.
pub const MAX_SUBMIT_TIMEOUT_SECS: u64 = 86_400;

/// Per-factory settings. Passed explicitly to the provisioner; nothing here is process-global.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningConfig {
    pub factory: Address,
    pub chain_id: u64,
    /// `keccak256` of the wallet proxy creation code the factory deploys. Versioned with the
    /// factory; take it from the deployed bytecode, never guess it.
    pub wallet_init_code_hash: B256,
    #[serde(default = "default_domain_name")]
    pub domain_name: String,
    #[serde(default = "default_domain_version")]
    pub domain_version: String,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_submit_timeout_secs")]
    pub submit_timeout_secs: u64,
}

fn default_domain_name() -> String {
    DEFAULT_DOMAIN_NAME.to_string()
}

fn default_domain_version() -> String {
    DEFAULT_DOMAIN_VERSION.to_string()
}

fn default_gas_limit() -> u64 {
    10_000_000
}

fn default_submit_timeout_secs() -> u64 {
    120
}

impl ProvisioningConfig {
    pub fn new(factory: Address, chain_id: u64, wallet_init_code_hash: B256) -> Self {
        Self {
            factory,
            chain_id,
            wallet_init_code_hash,
            domain_name: default_domain_name(),
            domain_version: default_domain_version(),
            gas_limit: default_gas_limit(),
            submit_timeout_secs: default_submit_timeout_secs(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.factory == Address::ZERO {
            return Err(ConfigError::ZeroFactory);
        }
        if self.chain_id == 0 {
            return Err(ConfigError::ZeroChainId);
        }
        if self.wallet_init_code_hash == B256::ZERO {
            return Err(ConfigError::ZeroInitCodeHash);
        }
        if self.domain_name.is_empty() || self.domain_version.is_empty() {
            return Err(ConfigError::EmptyDomain);
        }
        if !(1..=MAX_SUBMIT_TIMEOUT_SECS).contains(&self.submit_timeout_secs) {
            return Err(ConfigError::SubmitTimeoutOutOfRange(self.submit_timeout_secs));
        }
        Ok(())
    }

    pub fn domain(&self) -> FactoryDomain {
        FactoryDomain {
            name: self.domain_name.clone(),
            version: self.domain_version.clone(),
            chain_id: self.chain_id,
            verifying_contract: self.factory,
        }
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    pub fn predict_wallet_address(&self, owner: Address, salt: U256) -> Address {
        derive_address(owner, salt, self.factory, self.wallet_init_code_hash)
    }
}
