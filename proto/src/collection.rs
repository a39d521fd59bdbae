use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a replicated document collection. All durable state (documents,
/// change feed, blobs, checkpoints) is keyed by collection name.
#[derive(PartialEq, Eq, Hash, Clone, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CollectionId(String);

impl CollectionId {
    pub fn new(name: impl Into<String>) -> Self { Self(name.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for CollectionId {
    fn from(name: &str) -> Self { Self(name.to_string()) }
}

impl From<String> for CollectionId {
    fn from(name: String) -> Self { Self(name) }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl fmt::Debug for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}
