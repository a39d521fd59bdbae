use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;
use ludex_proto::{Attachment, ChangeBatch, CheckpointToken, DocumentId, DocumentState, Revision, StoreId};

/// Client view of the remote document authority.
///
/// The replication engine consumes this protocol; it never implements the
/// service side. Implementations exist for an in-process peer (tests,
/// embedded replicas) and a websocket client.
#[async_trait]
pub trait RemotePeer: Send + Sync {
    /// The peer's durable identity, used to key replication checkpoints.
    async fn store_id(&self) -> Result<StoreId, TransportError>;

    /// Read the peer's change feed from a checkpoint.
    async fn changes_since(&self, since: CheckpointToken, limit: u32) -> Result<ChangeBatch, TransportError>;

    /// Fetch full document states by (id, revision).
    async fn bulk_get(&self, requests: Vec<(DocumentId, Revision)>) -> Result<Vec<DocumentState>, TransportError>;

    /// Upsert full document states; the peer resolves conflicts against each
    /// document's recorded ancestry.
    async fn bulk_put(&self, documents: Vec<DocumentState>) -> Result<(), TransportError>;

    async fn get_attachment(&self, id: &DocumentId, name: &str) -> Result<Attachment, TransportError>;

    async fn put_attachment(&self, id: &DocumentId, name: &str, content_type: &str, payload: Bytes) -> Result<(), TransportError>;
}
