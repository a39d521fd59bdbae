//! In-process peer connector.
//!
//! Fronts a [`DocumentStore`] living in the same process with the remote peer
//! protocol, so two local stores can replicate against each other. Used by
//! the integration tests and by embedded second replicas.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

use ludex_core::connector::RemotePeer;
use ludex_core::error::{StorageError, TransportError};
use ludex_core::store::DocumentStore;
use ludex_proto::{Attachment, ChangeBatch, CheckpointToken, DocumentId, DocumentState, Revision, StoreId};

#[derive(Clone)]
pub struct LocalProcessPeer {
    store: Arc<DocumentStore>,
}

impl LocalProcessPeer {
    pub fn new(store: Arc<DocumentStore>) -> Self { Self { store } }
}

fn peer_err(e: impl std::fmt::Display) -> TransportError { TransportError::Peer(e.to_string()) }

#[async_trait]
impl RemotePeer for LocalProcessPeer {
    async fn store_id(&self) -> Result<StoreId, TransportError> { Ok(self.store.id()) }

    async fn changes_since(&self, since: CheckpointToken, limit: u32) -> Result<ChangeBatch, TransportError> {
        self.store.changes_since(since, limit as usize).await.map_err(peer_err)
    }

    async fn bulk_get(&self, requests: Vec<(DocumentId, Revision)>) -> Result<Vec<DocumentState>, TransportError> {
        let mut states = Vec::with_capacity(requests.len());
        for (id, revision) in requests {
            match self.store.document_state(&id).await {
                // The current state either contains the requested revision or
                // supersedes it; the requester's resolver sorts that out.
                Ok(state) => states.push(state),
                Err(StorageError::DocumentNotFound(_)) => {
                    debug!(id = %id, revision = %revision, "requested document vanished");
                }
                Err(e) => return Err(peer_err(e)),
            }
        }
        Ok(states)
    }

    async fn bulk_put(&self, documents: Vec<DocumentState>) -> Result<(), TransportError> {
        for state in documents {
            self.store.apply_replicated(state).await.map_err(peer_err)?;
        }
        Ok(())
    }

    async fn get_attachment(&self, id: &DocumentId, name: &str) -> Result<Attachment, TransportError> {
        self.store.get_attachment(id, name).await.map_err(peer_err)
    }

    async fn put_attachment(&self, _id: &DocumentId, _name: &str, _content_type: &str, payload: Bytes) -> Result<(), TransportError> {
        // Blobs are content-addressed; the (id, name) binding arrives with the
        // document state that references the digest.
        self.store.store_blob(payload).await.map_err(peer_err)?;
        Ok(())
    }
}
