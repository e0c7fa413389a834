use alloy_primitives::Address;
use thiserror::Error;

/// Errors raised while building or encoding a wallet policy.
///
/// These are caller faults and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("{field}: `{value}` is not a 20-byte identity")]
    InvalidIdentity { field: String, value: String },
    #[error("{field}: `{value}` is not an unsigned integer")]
    InvalidInteger { field: String, value: String },
    #[error("{field}: `{value}` does not fit in 256 bits")]
    IntegerOverflow { field: String, value: String },
    #[error("guardian {0} appears more than once")]
    DuplicateGuardian(Address),
    #[error("the zero identity cannot be a guardian")]
    ZeroGuardian,
    #[error("owner must be a non-zero identity")]
    ZeroOwner,
    #[error("malformed policy encoding: {0}")]
    MalformedEncoding(&'static str),
}
