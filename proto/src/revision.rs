use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::DecodeError;

/// Content-derived token identifying one revision of one document.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RevisionDigest([u8; 32]);

impl RevisionDigest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self { Self(bytes) }

    pub fn as_bytes(&self) -> &[u8; 32] { &self.0 }

    pub fn to_base64(&self) -> String { general_purpose::URL_SAFE_NO_PAD.encode(self.0) }

    pub fn from_base64(s: &str) -> Result<Self, DecodeError> {
        let decoded = general_purpose::URL_SAFE_NO_PAD.decode(s).map_err(|e| DecodeError::InvalidDigest(e.to_string()))?;
        let bytes: [u8; 32] = decoded[..].try_into().map_err(|_| DecodeError::InvalidDigest(format!("wrong length: {}", decoded.len())))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for RevisionDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.to_base64()) }
}

impl fmt::Debug for RevisionDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", &self.to_base64()[..8]) }
}

/// A versioned snapshot marker for a document: a monotonically advancing
/// generation plus a content-derived digest. Every successful write produces a
/// new revision whose generation is parent generation + 1.
///
/// Revisions are totally ordered (generation first, then digest bytes), which
/// is what makes conflict resolution deterministic on every replica.
#[derive(PartialEq, Eq, Hash, Clone, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Revision {
    pub generation: u64,
    pub digest: RevisionDigest,
}

impl Revision {
    /// Derive the revision for new document content.
    ///
    /// The digest binds the document id, the new generation, the parent
    /// digest, and the canonical content bytes, so independent replicas that
    /// apply the same edit to the same parent mint the same revision.
    pub fn derive(id: &str, parent: Option<&Revision>, content: &[u8]) -> Self {
        let generation = parent.map_or(1, |p| p.generation + 1);
        let mut hasher = Sha256::new();
        hasher.update(id.as_bytes());
        hasher.update(generation.to_be_bytes());
        match parent {
            Some(p) => hasher.update(p.digest.as_bytes()),
            None => hasher.update([0u8; 32]),
        }
        hasher.update(content);
        Self { generation, digest: RevisionDigest(hasher.finalize().into()) }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}-{}", self.generation, self.digest) }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}-{:?}", self.generation, self.digest) }
}

impl FromStr for Revision {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (generation, digest) = s.split_once('-').ok_or_else(|| DecodeError::InvalidRevision(s.to_string()))?;
        let generation = generation.parse::<u64>().map_err(|e| DecodeError::InvalidRevision(e.to_string()))?;
        Ok(Self { generation, digest: RevisionDigest::from_base64(digest)? })
    }
}
