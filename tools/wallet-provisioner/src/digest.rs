//! EIP-712 digest of a wallet creation request (must match the factory's `createWallet` check).

use alloy_primitives::{B256, U256};
use sha3::{Digest, Keccak256};

use crate::{
    encoder::{encode_policy, policy_words},
    errors::EncodingError,
    types::{EncodedPolicy, FactoryDomain},
    WalletPolicy,
};

pub const DEFAULT_DOMAIN_NAME: &str = "WalletFactory";
pub const DEFAULT_DOMAIN_VERSION: &str = "2.0.0";

pub const EIP712_DOMAIN_TYPE: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

pub const CREATE_WALLET_TYPE: &[u8] = b"createWallet(address owner,address[] guardians,uint256 quota,address inheritor,address feeRecipient,address feeToken,uint256 feeAmount,uint256 salt)";

pub(crate) fn keccak256_bytes(bytes: &[u8]) -> B256 {
    let mut h = Keccak256::new();
    h.update(bytes);
    let out = h.finalize();
    let mut b = [0u8; 32];
    b.copy_from_slice(out.as_slice());
    B256::new(b)
}

pub fn create_wallet_type_hash() -> B256 {
    keccak256_bytes(CREATE_WALLET_TYPE)
}

/// `keccak256(abi.encode(DOMAIN_TYPEHASH, keccak(name), keccak(version), chainId, factory))`
pub fn domain_separator(domain: &FactoryDomain) -> B256 {
    let mut domain_buf = Vec::with_capacity(32 * 5);
    domain_buf.extend_from_slice(keccak256_bytes(EIP712_DOMAIN_TYPE).as_slice());
    domain_buf.extend_from_slice(keccak256_bytes(domain.name.as_bytes()).as_slice());
    domain_buf.extend_from_slice(keccak256_bytes(domain.version.as_bytes()).as_slice());
    domain_buf.extend_from_slice(&U256::from(domain.chain_id).to_be_bytes::<32>());
    let mut vc_padded = [0u8; 32];
    vc_padded[12..32].copy_from_slice(domain.verifying_contract.as_slice());
    domain_buf.extend_from_slice(&vc_padded);
    keccak256_bytes(&domain_buf)
}

/// Typed-data struct hash, read straight out of the canonical encoding.
///
/// Guardians are folded in as `keccak256(abi.encodePacked(guardians))`, so their order is
/// part of what gets signed.
pub fn struct_hash(encoded: &EncodedPolicy) -> Result<B256, EncodingError> {
    let words = policy_words(encoded)?;
    let guardians_hash = keccak256_bytes(words.guardians);

    let mut struct_buf = Vec::with_capacity(32 * 9);
    struct_buf.extend_from_slice(create_wallet_type_hash().as_slice());
    struct_buf.extend_from_slice(words.owner);
    struct_buf.extend_from_slice(guardians_hash.as_slice());
    struct_buf.extend_from_slice(words.quota);
    struct_buf.extend_from_slice(words.inheritor);
    struct_buf.extend_from_slice(words.fee_recipient);
    struct_buf.extend_from_slice(words.fee_token);
    struct_buf.extend_from_slice(words.fee_amount);
    struct_buf.extend_from_slice(words.salt);
    Ok(keccak256_bytes(&struct_buf))
}

/// Final digest: `keccak256("\x19\x01" || domainSeparator || structHash)`.
pub fn build_digest(domain: &FactoryDomain, encoded: &EncodedPolicy) -> Result<B256, EncodingError> {
    let struct_hash = struct_hash(encoded)?;

    let mut final_buf = Vec::with_capacity(2 + 32 + 32);
    final_buf.extend_from_slice(b"\x19\x01");
    final_buf.extend_from_slice(domain_separator(domain).as_slice());
    final_buf.extend_from_slice(struct_hash.as_slice());
    Ok(keccak256_bytes(&final_buf))
}

/// Encode and digest in one step.
pub fn policy_digest(domain: &FactoryDomain, policy: &WalletPolicy) -> Result<B256, EncodingError> {
    build_digest(domain, &encode_policy(policy)?)
}
