//! Canonical byte layout of a wallet policy.
//!
//! Layout (Solidity ABI parameter encoding of
//! `(address,address[],uint256,address,address,address,uint256,uint256)`):
//! - word 0: owner (left-padded)
//! - word 1: offset of the guardians tail, always `0x100`
//! - word 2: quota
//! - word 3: inheritor
//! - word 4: fee recipient
//! - word 5: fee token
//! - word 6: fee amount
//! - word 7: salt
//! - word 8: guardian count `n`
//! - words 9..9+n: guardians, in insertion order

use std::collections::BTreeSet;

use alloy_primitives::{Address, U256};
use tracing::debug;

use crate::{
    errors::EncodingError,
    types::EncodedPolicy,
    WalletPolicy,
};

pub const WORD: usize = 32;
const HEAD_WORDS: usize = 8;
/// Byte offset of the guardians tail inside the encoding.
pub const GUARDIANS_OFFSET: usize = HEAD_WORDS * WORD;

/// Encode a policy into its canonical byte layout.
pub fn encode_policy(policy: &WalletPolicy) -> Result<EncodedPolicy, EncodingError> {
    policy.validate()?;

    let mut buf = Vec::with_capacity(WORD * (HEAD_WORDS + 1 + policy.guardians.len()));
    push_address(&mut buf, policy.owner);
    push_u256(&mut buf, U256::from(GUARDIANS_OFFSET));
    push_u256(&mut buf, policy.quota);
    push_address(&mut buf, policy.inheritor);
    push_address(&mut buf, policy.fee_recipient);
    push_address(&mut buf, policy.fee_token);
    push_u256(&mut buf, policy.fee_amount);
    push_u256(&mut buf, policy.salt);

    push_u256(&mut buf, U256::from(policy.guardians.len()));
    for guardian in &policy.guardians {
        push_address(&mut buf, *guardian);
    }

    debug!(
        owner = %policy.owner,
        guardians = policy.guardians.len(),
        len = buf.len(),
        "encoded wallet policy"
    );
    Ok(EncodedPolicy::from_vec(buf))
}

fn push_u256(buf: &mut Vec<u8>, value: U256) {
    buf.extend_from_slice(&value.to_be_bytes::<32>());
}

fn push_address(buf: &mut Vec<u8>, address: Address) {
    let mut padded = [0u8; 32];
    padded[12..32].copy_from_slice(address.as_slice());
    buf.extend_from_slice(&padded);
}

/// Borrowed, layout-checked view of an encoded policy. Each field is its raw 32-byte word.
#[derive(Clone, Copy, Debug)]
pub struct PolicyWords<'a> {
    pub owner: &'a [u8],
    pub quota: &'a [u8],
    pub inheritor: &'a [u8],
    pub fee_recipient: &'a [u8],
    pub fee_token: &'a [u8],
    pub fee_amount: &'a [u8],
    pub salt: &'a [u8],
    /// Guardian words back to back (`abi.encodePacked(address[])`).
    pub guardians: &'a [u8],
}

impl PolicyWords<'_> {
    pub fn guardian_count(&self) -> usize {
        self.guardians.len() / WORD
    }
}

/// Split an encoding into its words, rejecting anything `encode_policy` could not have produced.
pub fn policy_words(encoded: &EncodedPolicy) -> Result<PolicyWords<'_>, EncodingError> {
    let bytes = encoded.as_bytes();
    if bytes.len() < WORD * (HEAD_WORDS + 1) || bytes.len() % WORD != 0 {
        return Err(EncodingError::MalformedEncoding("length is not a whole number of words"));
    }

    let mut i = 0usize;
    let owner = read_address_word(bytes, &mut i)?;
    let offset = read_word(bytes, &mut i)?;
    if U256::from_be_slice(offset) != U256::from(GUARDIANS_OFFSET) {
        return Err(EncodingError::MalformedEncoding("unexpected guardians offset"));
    }
    let quota = read_word(bytes, &mut i)?;
    let inheritor = read_address_word(bytes, &mut i)?;
    let fee_recipient = read_address_word(bytes, &mut i)?;
    let fee_token = read_address_word(bytes, &mut i)?;
    let fee_amount = read_word(bytes, &mut i)?;
    let salt = read_word(bytes, &mut i)?;

    let count = U256::from_be_slice(read_word(bytes, &mut i)?);
    let remaining = (bytes.len() - i) / WORD;
    if count != U256::from(remaining) {
        return Err(EncodingError::MalformedEncoding("guardian count disagrees with length"));
    }
    let guardians = &bytes[i..];
    let mut j = 0usize;
    while j < guardians.len() {
        read_address_word(guardians, &mut j)?;
    }

    Ok(PolicyWords {
        owner,
        quota,
        inheritor,
        fee_recipient,
        fee_token,
        fee_amount,
        salt,
        guardians,
    })
}

/// Inverse of [`encode_policy`].
pub fn decode_policy(encoded: &EncodedPolicy) -> Result<WalletPolicy, EncodingError> {
    let words = policy_words(encoded)?;

    let mut guardians = Vec::with_capacity(words.guardian_count());
    let mut seen = BTreeSet::new();
    for word in words.guardians.chunks_exact(WORD) {
        let guardian = word_address(word);
        if !seen.insert(guardian) {
            return Err(EncodingError::DuplicateGuardian(guardian));
        }
        guardians.push(guardian);
    }

    let policy = WalletPolicy {
        owner: word_address(words.owner),
        guardians,
        quota: U256::from_be_slice(words.quota),
        inheritor: word_address(words.inheritor),
        fee_recipient: word_address(words.fee_recipient),
        fee_token: word_address(words.fee_token),
        fee_amount: U256::from_be_slice(words.fee_amount),
        salt: U256::from_be_slice(words.salt),
    };
    policy.validate()?;
    Ok(policy)
}

fn word_address(word: &[u8]) -> Address {
    Address::from_slice(&word[12..32])
}

fn read_word<'a>(bytes: &'a [u8], i: &mut usize) -> Result<&'a [u8], EncodingError> {
    if bytes.len() < *i + WORD {
        return Err(EncodingError::MalformedEncoding("truncated word"));
    }
    let word = &bytes[*i..*i + WORD];
    *i += WORD;
    Ok(word)
}

fn read_address_word<'a>(bytes: &'a [u8], i: &mut usize) -> Result<&'a [u8], EncodingError> {
    let word = read_word(bytes, i)?;
    if word[..12].iter().any(|b| *b != 0) {
        return Err(EncodingError::MalformedEncoding("dirty address padding"));
    }
    Ok(word)
}
