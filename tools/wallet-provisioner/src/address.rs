//! Counterfactual wallet addresses.
//!
//! The factory deploys with CREATE2 using a per-owner salt:
//! `salt' = keccak256("WALLET_CREATION" || owner || salt)` and
//! `address = keccak256(0xff || factory || salt' || initCodeHash)[12..]`.

use alloy_primitives::{Address, B256, U256};

use crate::digest::keccak256_bytes;

pub const WALLET_SALT_PREFIX: &[u8] = b"WALLET_CREATION";

/// Salt actually handed to CREATE2 for `(owner, salt)`.
pub fn wallet_salt(owner: Address, salt: U256) -> B256 {
    let mut buf = Vec::with_capacity(WALLET_SALT_PREFIX.len() + 20 + 32);
    buf.extend_from_slice(WALLET_SALT_PREFIX);
    buf.extend_from_slice(owner.as_slice());
    buf.extend_from_slice(&salt.to_be_bytes::<32>());
    keccak256_bytes(&buf)
}

/// EIP-1014 address of a contract created by `deployer`.
pub fn create2_address(deployer: Address, salt: B256, init_code_hash: B256) -> Address {
    let mut buf = Vec::with_capacity(1 + 20 + 32 + 32);
    buf.push(0xff);
    buf.extend_from_slice(deployer.as_slice());
    buf.extend_from_slice(salt.as_slice());
    buf.extend_from_slice(init_code_hash.as_slice());
    let hash = keccak256_bytes(&buf);
    Address::from_slice(&hash[12..32])
}

/// Address the factory at `factory` will give the wallet of `owner` created with `salt`.
pub fn derive_address(owner: Address, salt: U256, factory: Address, init_code_hash: B256) -> Address {
    create2_address(factory, wallet_salt(owner, salt), init_code_hash)
}
