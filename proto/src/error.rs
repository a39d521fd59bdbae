use thiserror::Error;

/// Failure to parse a wire or display form back into a typed value.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid revision: {0}")]
    InvalidRevision(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("invalid store id: {0}")]
    InvalidStoreId(String),
}

/// Failure to produce canonical content bytes for digest derivation.
#[derive(Debug, Error)]
#[error("encode error: {0}")]
pub struct EncodeError(#[from] bincode::Error);
