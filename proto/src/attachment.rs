use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::DecodeError;

/// Content address of an attachment payload: the SHA-256 of its bytes.
/// Identical payloads bound to different documents share one stored blob.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BlobDigest([u8; 32]);

impl BlobDigest {
    pub fn of(payload: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(payload);
        Self(hasher.finalize().into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self { Self(bytes) }

    pub fn as_bytes(&self) -> &[u8; 32] { &self.0 }

    pub fn to_base64(&self) -> String { general_purpose::URL_SAFE_NO_PAD.encode(self.0) }

    pub fn from_base64(s: &str) -> Result<Self, DecodeError> {
        let decoded = general_purpose::URL_SAFE_NO_PAD.decode(s).map_err(|e| DecodeError::InvalidDigest(e.to_string()))?;
        let bytes: [u8; 32] = decoded[..].try_into().map_err(|_| DecodeError::InvalidDigest(format!("wrong length: {}", decoded.len())))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for BlobDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.to_base64()) }
}

impl fmt::Debug for BlobDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", &self.to_base64()[..8]) }
}

/// Metadata binding an attachment name to its payload. The payload itself is
/// stored (and transferred) separately, addressed by digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub content_type: String,
    pub size: u64,
    pub digest: BlobDigest,
}

/// A resolved attachment: metadata plus payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub content_type: String,
    pub payload: Bytes,
}
