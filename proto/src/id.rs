use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

use crate::error::DecodeError;

/// Identifier of a document within a collection. Assigned at creation,
/// caller-supplied or generated, and immutable for the document's lifetime.
#[derive(PartialEq, Eq, Hash, Clone, Ord, PartialOrd, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    /// Generate a fresh id (a ULID string, so generated ids sort by creation time).
    pub fn generate() -> Self { Self(Ulid::new().to_string()) }

    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

    pub fn as_str(&self) -> &str { &self.0 }

    pub fn as_bytes(&self) -> &[u8] { self.0.as_bytes() }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self { Self(id.to_string()) }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self { Self(id) }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Durable identity of a store replica, minted on first open of a collection
/// and persisted alongside it. Replication checkpoints are keyed by the
/// counterparty's StoreId.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Ord, PartialOrd, Serialize, Deserialize)]
pub struct StoreId(Ulid);

impl StoreId {
    pub fn new() -> Self { Self(Ulid::new()) }

    pub fn from_ulid(ulid: Ulid) -> Self { Self(ulid) }

    pub fn from_bytes(bytes: [u8; 16]) -> Self { Self(Ulid::from_bytes(bytes)) }

    pub fn to_bytes(&self) -> [u8; 16] { self.0.to_bytes() }

    /// Full 26-character form, used for checkpoint keys.
    pub fn as_string(&self) -> String { self.0.to_string() }
}

impl Default for StoreId {
    fn default() -> Self { Self::new() }
}

impl TryFrom<&str> for StoreId {
    type Error = DecodeError;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Ok(Self(Ulid::from_string(s).map_err(|e| DecodeError::InvalidStoreId(e.to_string()))?))
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "S{}", &self.0.to_string()[20..]) }
}

impl fmt::Debug for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self) }
}

/// Correlates a peer request with its response.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Debug, Serialize, Deserialize, Hash)]
pub struct RequestId(Ulid);

impl RequestId {
    pub fn new() -> Self { Self(Ulid::new()) }
}

impl Default for RequestId {
    fn default() -> Self { Self::new() }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "R{}", &self.0.to_string()[20..]) }
}
