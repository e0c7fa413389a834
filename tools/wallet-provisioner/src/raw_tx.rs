//! Legacy (pre-typed) signed transaction codec.
//!
//! `rlp([nonce, gasPrice, gasLimit, to, value, data, v, r, s])`. Decoding is strict: anything
//! accepted re-encodes to exactly the input bytes.

use alloy_primitives::{Address, Bytes, B256, U256};
use rlp::{Rlp, RlpStream};
use serde::Serialize;

use crate::{
    digest::keccak256_bytes,
    errors::MalformedTxError,
    signer::recover_address,
};

const FIELDS: [&str; 9] = ["nonce", "gasPrice", "gasLimit", "to", "value", "data", "v", "r", "s"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTransaction {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub v: u64,
    pub r: U256,
    pub s: U256,
}

/// Where one field sat in the raw encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTrace {
    pub field: &'static str,
    pub offset: usize,
    pub header_len: usize,
    pub payload_len: usize,
}

/// Decode a hex blob (`0x` optional).
pub fn decode_hex(content: &str) -> Result<LegacyTransaction, MalformedTxError> {
    decode(&parse_hex(content)?)
}

pub fn decode(bytes: &[u8]) -> Result<LegacyTransaction, MalformedTxError> {
    decode_traced(bytes).map(|(tx, _)| tx)
}

/// Decode and also report the position of every field.
pub fn decode_traced(bytes: &[u8]) -> Result<(LegacyTransaction, Vec<FieldTrace>), MalformedTxError> {
    if bytes.is_empty() {
        return Err(MalformedTxError::Empty);
    }
    let rlp = Rlp::new(bytes);
    if !rlp.is_list() {
        return Err(MalformedTxError::NotAList);
    }
    let info = rlp.payload_info().map_err(rlp_error)?;
    let total = info.header_len + info.value_len;
    if total > bytes.len() {
        return Err(MalformedTxError::Rlp(format!(
            "list claims {} bytes, only {} present",
            total,
            bytes.len()
        )));
    }
    if total < bytes.len() {
        return Err(MalformedTxError::TrailingBytes(bytes.len() - total));
    }
    if list_header(info.value_len) != bytes[..info.header_len] {
        return Err(MalformedTxError::NonCanonical("list"));
    }

    let items = list_items(bytes, info.header_len, total)?;
    if items.len() != FIELDS.len() {
        return Err(MalformedTxError::FieldCount(items.len()));
    }

    let mut trace = Vec::with_capacity(FIELDS.len());
    let mut payloads: Vec<&[u8]> = Vec::with_capacity(FIELDS.len());
    for (field, (offset, raw)) in FIELDS.iter().copied().zip(items) {
        let item = Rlp::new(raw);
        if item.is_list() {
            return Err(MalformedTxError::UnexpectedList(field));
        }
        let item_info = item.payload_info().map_err(rlp_error)?;
        let payload = item.data().map_err(rlp_error)?;
        if rlp::encode(&payload.to_vec()).as_ref() != raw {
            return Err(MalformedTxError::NonCanonical(field));
        }
        trace.push(FieldTrace {
            field,
            offset,
            header_len: item_info.header_len,
            payload_len: item_info.value_len,
        });
        payloads.push(payload);
    }

    let to = match payloads[3].len() {
        0 => None,
        20 => Some(Address::from_slice(payloads[3])),
        n => return Err(MalformedTxError::InvalidDestination(n)),
    };
    let tx = LegacyTransaction {
        nonce: scalar(FIELDS[0], payloads[0])?,
        gas_price: scalar(FIELDS[1], payloads[1])?,
        gas_limit: scalar(FIELDS[2], payloads[2])?,
        to,
        value: scalar(FIELDS[4], payloads[4])?,
        data: Bytes::copy_from_slice(payloads[5]),
        v: small_scalar(FIELDS[6], payloads[6])?,
        r: scalar(FIELDS[7], payloads[7])?,
        s: scalar(FIELDS[8], payloads[8])?,
    };
    Ok((tx, trace))
}

/// Canonical RLP encoding of a signed legacy transaction.
pub fn encode(tx: &LegacyTransaction) -> Vec<u8> {
    let mut stream = RlpStream::new_list(FIELDS.len());
    append_unsigned_fields(&mut stream, tx);
    stream.append(&trimmed(&U256::from(tx.v)));
    stream.append(&trimmed(&tx.r));
    stream.append(&trimmed(&tx.s));
    stream.out().to_vec()
}

pub fn encode_hex(tx: &LegacyTransaction) -> String {
    format!("0x{}", hex::encode(encode(tx)))
}

impl LegacyTransaction {
    /// Hash of the signed encoding (the transaction id).
    pub fn tx_hash(&self) -> B256 {
        keccak256_bytes(&encode(self))
    }

    /// EIP-155 chain id, `None` for pre-EIP-155 signatures (`v` of 27/28).
    pub fn chain_id(&self) -> Option<u64> {
        (self.v >= 35).then(|| (self.v - 35) / 2)
    }

    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }

    /// Digest the sender signed.
    pub fn signing_hash(&self) -> B256 {
        let stream = match self.chain_id() {
            Some(chain_id) => {
                let mut s = RlpStream::new_list(9);
                append_unsigned_fields(&mut s, self);
                s.append(&trimmed(&U256::from(chain_id)));
                s.append_empty_data();
                s.append_empty_data();
                s
            }
            None => {
                let mut s = RlpStream::new_list(6);
                append_unsigned_fields(&mut s, self);
                s
            }
        };
        keccak256_bytes(&stream.out())
    }

    pub fn recover_sender(&self) -> Result<Address, MalformedTxError> {
        let recovery_bit = match self.v {
            27 | 28 => (self.v - 27) as u8,
            v if v >= 35 => ((v - 35) % 2) as u8,
            v => return Err(MalformedTxError::BadSignature(format!("unsupported v {v}"))),
        };
        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(&self.r.to_be_bytes::<32>());
        rs[32..].copy_from_slice(&self.s.to_be_bytes::<32>());
        recover_address(&self.signing_hash(), &rs, recovery_bit)
            .map_err(|e| MalformedTxError::BadSignature(e.to_string()))
    }
}

fn append_unsigned_fields(stream: &mut RlpStream, tx: &LegacyTransaction) {
    stream.append(&trimmed(&tx.nonce));
    stream.append(&trimmed(&tx.gas_price));
    stream.append(&trimmed(&tx.gas_limit));
    match tx.to {
        Some(to) => stream.append(&to.as_slice().to_vec()),
        None => stream.append_empty_data(),
    };
    stream.append(&trimmed(&tx.value));
    stream.append(&tx.data.to_vec());
}

/// Minimal big-endian bytes of an integer (empty for zero).
fn trimmed(value: &U256) -> Vec<u8> {
    let bytes = value.to_be_bytes::<32>();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

fn scalar(field: &'static str, payload: &[u8]) -> Result<U256, MalformedTxError> {
    check_scalar(field, payload, 32)?;
    Ok(U256::from_be_slice(payload))
}

fn small_scalar(field: &'static str, payload: &[u8]) -> Result<u64, MalformedTxError> {
    check_scalar(field, payload, 8)?;
    let mut buf = [0u8; 8];
    buf[8 - payload.len()..].copy_from_slice(payload);
    Ok(u64::from_be_bytes(buf))
}

fn check_scalar(field: &'static str, payload: &[u8], max: usize) -> Result<(), MalformedTxError> {
    if payload.len() > max {
        return Err(MalformedTxError::FieldTooLong {
            field,
            len: payload.len(),
            max,
        });
    }
    if payload.first() == Some(&0) {
        return Err(MalformedTxError::NonCanonical(field));
    }
    Ok(())
}

/// Split the list payload `bytes[start..end]` into `(offset, raw item)` pairs.
fn list_items(bytes: &[u8], start: usize, end: usize) -> Result<Vec<(usize, &[u8])>, MalformedTxError> {
    let mut items = Vec::with_capacity(FIELDS.len());
    let mut offset = start;
    while offset < end {
        let info = Rlp::new(&bytes[offset..end]).payload_info().map_err(rlp_error)?;
        let len = info.header_len + info.value_len;
        if offset + len > end {
            return Err(MalformedTxError::Rlp(format!(
                "item at offset {offset} overruns the list by {} bytes",
                offset + len - end
            )));
        }
        items.push((offset, &bytes[offset..offset + len]));
        offset += len;
    }
    Ok(items)
}

/// Shortest list header for a payload of `len` bytes.
fn list_header(len: usize) -> Vec<u8> {
    if len < 56 {
        return vec![0xc0 + len as u8];
    }
    let be = len.to_be_bytes();
    let first = be.iter().position(|b| *b != 0).unwrap_or(be.len() - 1);
    let mut header = vec![0xf7 + (be.len() - first) as u8];
    header.extend_from_slice(&be[first..]);
    header
}

fn rlp_error(err: rlp::DecoderError) -> MalformedTxError {
    MalformedTxError::Rlp(format!("{err:?}"))
}

pub fn parse_hex(content: &str) -> Result<Vec<u8>, MalformedTxError> {
    let trimmed = content.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(digits).map_err(|e| MalformedTxError::Hex(e.to_string()))
}
