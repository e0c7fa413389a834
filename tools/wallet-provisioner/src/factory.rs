//! Solidity ABI surface of the wallet factory.
//!
//! The provisioner never talks to a node itself; these bindings build the calldata a chain
//! collaborator sends and read back what the factory reports.

use alloy_primitives::{Address, Bytes, Log, U256};
use alloy_sol_types::{sol, SolCall, SolEvent};

use crate::{config::ProvisioningConfig, errors::ChainError, WalletCreationRequest};
use wallet_factory_types::SubmissionPayload;

sol! {
    /// Wallet configuration as accepted by `createWallet`.
    struct WalletConfig {
        address owner;
        address[] guardians;
        uint256 quota;
        address inheritor;
        address feeRecipient;
        address feeToken;
        uint256 feeAmount;
        bytes signature;
    }

    function createWallet(WalletConfig config, uint256 salt) external returns (address wallet);

    function computeWalletAddress(address owner, uint256 salt) external view returns (address);

    event WalletCreated(address wallet, address owner);
}

/// `createWallet(config, salt)` calldata for a signed request.
pub fn create_wallet_calldata(request: &WalletCreationRequest) -> Bytes {
    let policy = request.policy();
    let call = createWalletCall {
        config: WalletConfig {
            owner: policy.owner,
            guardians: policy.guardians.clone(),
            quota: policy.quota,
            inheritor: policy.inheritor,
            feeRecipient: policy.fee_recipient,
            feeToken: policy.fee_token,
            feeAmount: policy.fee_amount,
            signature: request.signature().clone().into_bytes(),
        },
        salt: policy.salt,
    };
    Bytes::from(call.abi_encode())
}

pub fn compute_wallet_address_calldata(owner: Address, salt: U256) -> Bytes {
    Bytes::from(computeWalletAddressCall { owner, salt }.abi_encode())
}

/// Decode the return data of `computeWalletAddress`.
pub fn decode_compute_wallet_address(data: &[u8]) -> Result<Address, ChainError> {
    computeWalletAddressCall::abi_decode_returns(data, true)
        .map(|ret| ret._0)
        .map_err(|e| ChainError::MalformedResponse(e.to_string()))
}

pub fn submission_payload(config: &ProvisioningConfig, request: &WalletCreationRequest) -> SubmissionPayload {
    SubmissionPayload {
        to: config.factory,
        calldata: create_wallet_calldata(request),
        gas_limit: config.gas_limit,
    }
}

/// The `WalletCreated` log the factory emits, as a collaborator would see it in a receipt.
pub fn wallet_created_log(factory: Address, wallet: Address, owner: Address) -> Log {
    Log {
        address: factory,
        data: WalletCreated { wallet, owner }.encode_log_data(),
    }
}

/// Wallet reported by the first `WalletCreated` event emitted by `factory` for `owner`.
pub fn created_wallet(factory: Address, owner: Address, logs: &[Log]) -> Option<Address> {
    logs.iter()
        .filter(|log| log.address == factory)
        .filter_map(|log| WalletCreated::decode_log_data(&log.data, true).ok())
        .find(|event| event.owner == owner)
        .map(|event| event.wallet)
}
