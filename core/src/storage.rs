use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

use crate::error::StorageError;
use ludex_proto::{BlobDigest, ChangeBatch, CheckpointToken, CollectionId, DocumentId, DocumentState, StoreId};

pub fn docs_name(name: &str) -> String { format!("{}_docs", name) }

pub fn changes_name(name: &str) -> String { format!("{}_changes", name) }

pub fn blobs_name(name: &str) -> String { format!("{}_blobs", name) }

pub fn meta_name(name: &str) -> String { format!("{}_meta", name) }

#[async_trait]
pub trait StorageEngine: Send + Sync {
    // Opens and/or creates a storage collection.
    async fn collection(&self, id: &CollectionId) -> Result<Arc<dyn StorageCollection>, StorageError>;
    // Delete all collections and their data from the storage engine
    async fn delete_all_collections(&self) -> Result<bool, StorageError>;
}

/// Durable state of one collection: document states, a compacted change feed,
/// content-addressed blobs, per-peer checkpoints and the store identity.
#[async_trait]
pub trait StorageCollection: Send + Sync {
    /// The durable identity of this replica, minted on first call.
    async fn store_id(&self) -> Result<StoreId, StorageError>;

    /// Persist a document state and append its change-feed entry, returning
    /// the sequence assigned to the write. The previous feed entry for the
    /// same id is dropped (compaction).
    async fn set_document(&self, state: &DocumentState) -> Result<CheckpointToken, StorageError>;

    async fn get_document(&self, id: &DocumentId) -> Result<DocumentState, StorageError>;

    /// All document states, tombstones included, ordered by id.
    async fn scan_documents(&self) -> Result<Vec<DocumentState>, StorageError>;

    async fn changes_since(&self, since: CheckpointToken, limit: usize) -> Result<ChangeBatch, StorageError>;

    /// Store a blob under its content address. Returns false if it was
    /// already present.
    async fn put_blob(&self, digest: &BlobDigest, payload: Bytes) -> Result<bool, StorageError>;

    async fn get_blob(&self, digest: &BlobDigest) -> Result<Bytes, StorageError>;

    async fn has_blob(&self, digest: &BlobDigest) -> Result<bool, StorageError>;

    async fn get_checkpoint(&self, key: &str) -> Result<Option<CheckpointToken>, StorageError>;

    async fn set_checkpoint(&self, key: &str, token: CheckpointToken) -> Result<(), StorageError>;

    async fn get_documents(&self, ids: &[DocumentId]) -> Result<Vec<DocumentState>, StorageError> {
        let mut states = Vec::new();
        for id in ids {
            match self.get_document(id).await {
                Ok(state) => states.push(state),
                Err(StorageError::DocumentNotFound(_)) => {
                    warn!("document not found: {}", id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(states)
    }
}

/// Handle to the storage of a collection without any knowledge of the backend
#[derive(Clone)]
pub struct StorageCollectionWrapper(pub(crate) Arc<dyn StorageCollection>);

impl StorageCollectionWrapper {
    pub fn new(collection: Arc<dyn StorageCollection>) -> Self { Self(collection) }
}

impl std::ops::Deref for StorageCollectionWrapper {
    type Target = Arc<dyn StorageCollection>;
    fn deref(&self) -> &Self::Target { &self.0 }
}
