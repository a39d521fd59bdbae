//! Attachment operations.
//!
//! Payloads are stored content-addressed (SHA-256 of the bytes), so identical
//! payloads bound to different documents share one blob. Binding or unbinding
//! an attachment is a document write under the same optimistic-concurrency
//! gate as `put`; unbinding never deletes the underlying blob (garbage
//! collection is a separate concern).

use bytes::Bytes;
use tracing::debug;

use crate::error::{MutationError, RetrievalError, StorageError, ValidationError};
use crate::store::DocumentStore;
use ludex_proto::{Attachment, AttachmentMeta, BlobDigest, DocumentId, Revision, VersionedDocument};

impl DocumentStore {
    /// Bind `payload` to `(id, name)`, producing a new document revision.
    pub async fn put_attachment(
        &self,
        id: &DocumentId,
        name: &str,
        expected_parent: &Revision,
        payload: Bytes,
        content_type: &str,
    ) -> Result<Revision, MutationError> {
        if name.is_empty() {
            return Err(MutationError::InvalidDocument(ValidationError::EmptyAttachmentName));
        }
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let previous = match self.load(id).await? {
            Some(prev) if !prev.current.deleted => prev,
            _ => return Err(MutationError::NotFound(id.clone())),
        };
        if previous.current.revision != *expected_parent {
            return Err(MutationError::Conflict {
                id: id.clone(),
                expected: Some(expected_parent.clone()),
                current: Some(previous.current.revision.clone()),
            });
        }

        let digest = BlobDigest::of(&payload);
        let size = payload.len() as u64;
        let fresh = self.storage().put_blob(&digest, payload).await?;
        if !fresh {
            debug!(digest = %digest, "blob already present, binding only");
        }

        let mut attachments = previous.current.attachments.clone();
        attachments.insert(name.to_string(), AttachmentMeta { content_type: content_type.to_string(), size, digest });

        let next = VersionedDocument::next(
            id,
            Some(&previous.current.revision),
            false,
            previous.current.body.clone(),
            attachments,
        )
        .map_err(StorageError::from)?;
        let revision = next.revision.clone();
        let mut state = previous.clone();
        state.advance(next);
        self.commit(Some(&previous), &state).await?;
        Ok(revision)
    }

    pub async fn get_attachment(&self, id: &DocumentId, name: &str) -> Result<Attachment, RetrievalError> {
        let state = match self.load(id).await? {
            Some(state) if !state.current.deleted => state,
            _ => return Err(RetrievalError::NotFound(id.clone())),
        };
        let meta = state
            .current
            .attachments
            .get(name)
            .ok_or_else(|| RetrievalError::AttachmentNotFound { id: id.clone(), name: name.to_string() })?;
        let payload = self.storage().get_blob(&meta.digest).await?;
        Ok(Attachment { content_type: meta.content_type.clone(), payload })
    }

    /// Unbind `(id, name)`, producing a new document revision. The blob stays
    /// behind for other bindings.
    pub async fn remove_attachment(&self, id: &DocumentId, name: &str, expected_parent: &Revision) -> Result<Revision, MutationError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let previous = match self.load(id).await? {
            Some(prev) if !prev.current.deleted => prev,
            _ => return Err(MutationError::NotFound(id.clone())),
        };
        if previous.current.revision != *expected_parent {
            return Err(MutationError::Conflict {
                id: id.clone(),
                expected: Some(expected_parent.clone()),
                current: Some(previous.current.revision.clone()),
            });
        }

        let mut attachments = previous.current.attachments.clone();
        if attachments.remove(name).is_none() {
            return Err(MutationError::AttachmentNotFound { id: id.clone(), name: name.to_string() });
        }

        let next = VersionedDocument::next(
            id,
            Some(&previous.current.revision),
            false,
            previous.current.body.clone(),
            attachments,
        )
        .map_err(StorageError::from)?;
        let revision = next.revision.clone();
        let mut state = previous.clone();
        state.advance(next);
        self.commit(Some(&previous), &state).await?;
        Ok(revision)
    }

    /// Stash a payload by content address without touching any document.
    /// Used by peers accepting replicated attachments ahead of their
    /// document states.
    pub async fn store_blob(&self, payload: Bytes) -> Result<BlobDigest, StorageError> {
        let digest = BlobDigest::of(&payload);
        self.storage().put_blob(&digest, payload).await?;
        Ok(digest)
    }
}
