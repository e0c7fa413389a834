//! Owner authorization for wallet creation.
//!
//! Signatures are secp256k1 over the bare 32-byte EIP-712 digest, serialized `r || s || v` with
//! `v` in {27, 28}. Verification mirrors the factory: recover the signer and compare it with
//! the policy owner.

use std::fmt;

use alloy_primitives::{Address, B256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use zeroize::Zeroizing;

use crate::{
    digest::{keccak256_bytes, policy_digest},
    errors::SigningError,
    types::FactoryDomain,
    AuthorizationSignature, WalletPolicy,
};

pub const SIGNATURE_LEN: usize = 65;

/// Anything able to authorize a digest on behalf of a wallet owner (local key, HSM, remote signer).
pub trait AuthorizationSigner: Send + Sync {
    /// Address whose signatures this signer produces.
    fn address(&self) -> Address;

    fn sign_digest(&self, digest: &B256) -> Result<AuthorizationSignature, SigningError>;
}

/// Sign the digest and return the 65-byte authorization.
pub fn sign(digest: &B256, signing_key: &SigningKey) -> Result<AuthorizationSignature, SigningError> {
    let (signature, recovery_id) = signing_key
        .sign_prehash_recoverable(digest.as_slice())
        .map_err(|e| SigningError::Backend(e.to_string()))?;
    let (r, s) = signature.split_bytes();

    let mut sig_bytes = Vec::with_capacity(SIGNATURE_LEN);
    sig_bytes.extend_from_slice(r.as_slice());
    sig_bytes.extend_from_slice(s.as_slice());
    sig_bytes.push(27 + recovery_id.to_byte());
    Ok(AuthorizationSignature::new(sig_bytes))
}

/// Ethereum address of a public key: last 20 bytes of `keccak256(x || y)`.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256_bytes(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..32])
}

/// Recover the signer of `digest` from a 65-byte `r || s || v` signature.
///
/// `v` may be 0/1 or 27/28.
pub fn recover_signer(digest: &B256, signature: &[u8]) -> Result<Address, SigningError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(SigningError::InvalidLength(signature.len()));
    }
    let v = signature[64];
    let recovery_byte = match v {
        27 | 28 => v - 27,
        0 | 1 => v,
        _ => return Err(SigningError::InvalidRecoveryId(v)),
    };
    let mut rs = [0u8; 64];
    rs.copy_from_slice(&signature[..64]);
    recover_address(digest, &rs, recovery_byte)
}

/// Recover an address from raw `r || s` and a 0/1 recovery bit.
///
/// High-s signatures are normalized first (with the recovery bit flipped), matching `ecrecover`.
pub fn recover_address(digest: &B256, rs: &[u8; 64], recovery_bit: u8) -> Result<Address, SigningError> {
    let signature =
        Signature::from_slice(rs).map_err(|e| SigningError::Unrecoverable(e.to_string()))?;
    let (signature, recovery_bit) = match signature.normalize_s() {
        Some(normalized) => (normalized, recovery_bit ^ 1),
        None => (signature, recovery_bit),
    };
    let recovery_id =
        RecoveryId::from_byte(recovery_bit).ok_or(SigningError::InvalidRecoveryId(recovery_bit))?;
    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
        .map_err(|e| SigningError::Unrecoverable(e.to_string()))?;
    Ok(address_of(&key))
}

/// Check that `signature` authorizes `policy` for the factory in `domain`.
///
/// Needs only public data: the digest is rebuilt from the domain and policy, and the recovered
/// signer must be `policy.owner`.
pub fn verify_authorization(
    domain: &FactoryDomain,
    policy: &WalletPolicy,
    signature: &AuthorizationSignature,
) -> Result<Address, SigningError> {
    let digest = policy_digest(domain, policy)?;
    let recovered = recover_signer(&digest, signature.as_bytes())?;
    if recovered != policy.owner {
        return Err(SigningError::SignerMismatch {
            expected: policy.owner,
            recovered,
        });
    }
    Ok(recovered)
}

/// Signer backed by an in-memory secp256k1 key.
///
/// Only the zeroizing secret bytes are held; the `SigningKey` is rebuilt for each signature and
/// dropped (and wiped) when that signature is done, on success and error paths alike.
pub struct LocalKeySigner {
    secret: Zeroizing<[u8; 32]>,
    address: Address,
}

impl LocalKeySigner {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SigningError> {
        if bytes.len() != 32 {
            return Err(SigningError::InvalidKey);
        }
        let key = SigningKey::from_slice(bytes).map_err(|_| SigningError::InvalidKey)?;
        let address = address_of(key.verifying_key());

        let mut secret = Zeroizing::new([0u8; 32]);
        secret.copy_from_slice(bytes);
        Ok(Self { secret, address })
    }

    /// Parse a hex key (`0x` optional, surrounding whitespace ignored).
    pub fn from_hex(key: &str) -> Result<Self, SigningError> {
        let trimmed = key.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let raw = Zeroizing::new(hex::decode(digits).map_err(|_| SigningError::InvalidKey)?);
        Self::from_bytes(&raw)
    }

    fn with_key<T>(
        &self,
        f: impl FnOnce(&SigningKey) -> Result<T, SigningError>,
    ) -> Result<T, SigningError> {
        let key = SigningKey::from_slice(self.secret.as_slice()).map_err(|_| SigningError::InvalidKey)?;
        f(&key)
    }
}

impl AuthorizationSigner for LocalKeySigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_digest(&self, digest: &B256) -> Result<AuthorizationSignature, SigningError> {
        self.with_key(|key| sign(digest, key))
    }
}

impl fmt::Debug for LocalKeySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKeySigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
