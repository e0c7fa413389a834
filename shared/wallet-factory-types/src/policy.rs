use std::collections::BTreeSet;

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::errors::EncodingError;

/// Policy parameters the owner signs and the factory commits to when creating a wallet.
///
/// Optional identities (`inheritor`, `fee_recipient`, `fee_token`) use [`Address::ZERO`] as the
/// "unset" sentinel, exactly as the factory does.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletPolicy {
    pub owner: Address,
    /// Ordered: the order is part of the signed payload.
    pub guardians: Vec<Address>,
    pub quota: U256,
    pub inheritor: Address,
    pub fee_recipient: Address,
    pub fee_token: Address,
    pub fee_amount: U256,
    pub salt: U256,
}

impl WalletPolicy {
    /// Policy with no guardians, quota, inheritor or fee.
    pub fn new(owner: Address, salt: U256) -> Self {
        Self {
            owner,
            guardians: Vec::new(),
            quota: U256::ZERO,
            inheritor: Address::ZERO,
            fee_recipient: Address::ZERO,
            fee_token: Address::ZERO,
            fee_amount: U256::ZERO,
            salt,
        }
    }

    pub fn with_guardians(mut self, guardians: impl IntoIterator<Item = Address>) -> Self {
        self.guardians = guardians.into_iter().collect();
        self
    }

    pub fn with_quota(mut self, quota: U256) -> Self {
        self.quota = quota;
        self
    }

    pub fn with_inheritor(mut self, inheritor: Address) -> Self {
        self.inheritor = inheritor;
        self
    }

    pub fn with_fee(mut self, recipient: Address, token: Address, amount: U256) -> Self {
        self.fee_recipient = recipient;
        self.fee_token = token;
        self.fee_amount = amount;
        self
    }

    /// Check the invariants the encoder relies on.
    pub fn validate(&self) -> Result<(), EncodingError> {
        if self.owner == Address::ZERO {
            return Err(EncodingError::ZeroOwner);
        }
        let mut seen = BTreeSet::new();
        for guardian in &self.guardians {
            if *guardian == Address::ZERO {
                return Err(EncodingError::ZeroGuardian);
            }
            if !seen.insert(*guardian) {
                return Err(EncodingError::DuplicateGuardian(*guardian));
            }
        }
        Ok(())
    }

    pub fn inheritor(&self) -> Option<Address> {
        non_zero(self.inheritor)
    }

    pub fn fee_recipient(&self) -> Option<Address> {
        non_zero(self.fee_recipient)
    }

    pub fn has_fee(&self) -> bool {
        self.fee_amount != U256::ZERO
    }
}

fn non_zero(address: Address) -> Option<Address> {
    (address != Address::ZERO).then_some(address)
}

/// Integer input as it appears in hand-written policy files: a JSON number or a
/// decimal / `0x` hex string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberInput {
    Int(u64),
    Text(String),
}

impl Default for NumberInput {
    fn default() -> Self {
        NumberInput::Int(0)
    }
}

/// Untyped policy description (eg. a JSON file passed to the CLI).
///
/// Converted into a [`WalletPolicy`] with [`PolicyConfig::into_policy`], which enforces identity
/// width, the 256-bit integer bound and guardian uniqueness.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
    pub owner: String,
    #[serde(default)]
    pub guardians: Vec<String>,
    #[serde(default)]
    pub quota: NumberInput,
    #[serde(default)]
    pub inheritor: Option<String>,
    #[serde(default)]
    pub fee_recipient: Option<String>,
    #[serde(default)]
    pub fee_token: Option<String>,
    #[serde(default)]
    pub fee_amount: NumberInput,
    #[serde(default)]
    pub salt: NumberInput,
}

impl PolicyConfig {
    pub fn into_policy(self) -> Result<WalletPolicy, EncodingError> {
        let owner = parse_identity("owner", &self.owner)?;
        let guardians = self
            .guardians
            .iter()
            .enumerate()
            .map(|(i, g)| parse_identity(&format!("guardians[{i}]"), g))
            .collect::<Result<Vec<_>, _>>()?;

        let policy = WalletPolicy {
            owner,
            guardians,
            quota: parse_uint("quota", &self.quota)?,
            inheritor: parse_optional_identity("inheritor", self.inheritor.as_deref())?,
            fee_recipient: parse_optional_identity("feeRecipient", self.fee_recipient.as_deref())?,
            fee_token: parse_optional_identity("feeToken", self.fee_token.as_deref())?,
            fee_amount: parse_uint("feeAmount", &self.fee_amount)?,
            salt: parse_uint("salt", &self.salt)?,
        };
        policy.validate()?;
        Ok(policy)
    }
}

/// Parse a hex identity (`0x` prefix optional) that must be exactly 20 bytes.
pub fn parse_identity(field: &str, value: &str) -> Result<Address, EncodingError> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|_| EncodingError::InvalidIdentity {
            field: field.to_string(),
            value: value.to_string(),
        })
}

fn parse_optional_identity(field: &str, value: Option<&str>) -> Result<Address, EncodingError> {
    match value.map(str::trim) {
        None | Some("") => Ok(Address::ZERO),
        Some(v) => parse_identity(field, v),
    }
}

/// Parse an unsigned integer bounded by 256 bits.
pub fn parse_uint(field: &str, input: &NumberInput) -> Result<U256, EncodingError> {
    let text = match input {
        NumberInput::Int(v) => return Ok(U256::from(*v)),
        NumberInput::Text(s) => s.trim(),
    };
    let invalid = || EncodingError::InvalidInteger {
        field: field.to_string(),
        value: text.to_string(),
    };
    let overflow = || EncodingError::IntegerOverflow {
        field: field.to_string(),
        value: text.to_string(),
    };

    if let Some(digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        if digits.trim_start_matches('0').len() > 64 {
            return Err(overflow());
        }
        return U256::from_str_radix(digits, 16).map_err(|_| invalid());
    }

    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    // Digits are valid at this point, so the only remaining failure is width.
    U256::from_str_radix(text, 10).map_err(|_| overflow())
}

/// Owner authorization accepted by the factory (`r || s || v` for EOA owners).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorizationSignature(Bytes);

impl AuthorizationSignature {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl std::fmt::Display for AuthorizationSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A signed policy: the unit submitted to the factory. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletCreationRequest {
    policy: WalletPolicy,
    signature: AuthorizationSignature,
}

impl WalletCreationRequest {
    pub fn new(policy: WalletPolicy, signature: AuthorizationSignature) -> Self {
        Self { policy, signature }
    }

    pub fn policy(&self) -> &WalletPolicy {
        &self.policy
    }

    pub fn signature(&self) -> &AuthorizationSignature {
        &self.signature
    }

    pub fn owner(&self) -> Address {
        self.policy.owner
    }

    pub fn salt(&self) -> U256 {
        self.policy.salt
    }
}
