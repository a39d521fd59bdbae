//! Error taxonomy for the Ludex core.
//!
//! Errors are grouped by operation family. Backend faults are wrapped at the
//! storage seam so callers only ever see these types.

use ludex_proto::{BlobDigest, CollectionId, DocumentId, EncodeError, Revision};
use thiserror::Error;

use crate::replication::ReplicationPhase;

/// A document failed schema validation. Caller bug, surfaced immediately.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("required field is empty: {field}")]
    Empty { field: &'static str },

    #[error("attachment name is empty")]
    EmptyAttachmentName,
}

/// Error type for read operations.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Document absent or tombstoned. Recoverable by the caller.
    #[error("document not found: {0}")]
    NotFound(DocumentId),

    /// Attachment name absent on an existing document.
    #[error("attachment not found: {id}/{name}")]
    AttachmentNotFound { id: DocumentId, name: String },

    /// An index posting referenced a document the store no longer has.
    /// Fatal for the collection until `rebuild_index` runs.
    #[error("index corruption: {0}")]
    IndexCorruption(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Error type for write operations.
#[derive(Debug, Error)]
pub enum MutationError {
    /// The stated parent revision is not the document's current revision.
    /// Recoverable: re-read and retry. Tombstoned ids always conflict, so a
    /// deleted id can never be resurrected.
    #[error("revision conflict on {id}: expected {expected:?}, current {current:?}")]
    Conflict { id: DocumentId, expected: Option<Revision>, current: Option<Revision> },

    #[error("invalid document: {0}")]
    InvalidDocument(#[from] ValidationError),

    #[error("document not found: {0}")]
    NotFound(DocumentId),

    #[error("attachment not found: {id}/{name}")]
    AttachmentNotFound { id: DocumentId, name: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Faults raised by a storage backend, wrapped at the storage seam.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("document not found: {0}")]
    DocumentNotFound(DocumentId),

    #[error("blob not found: {0}")]
    BlobNotFound(BlobDigest),

    #[error("collection not found: {0}")]
    CollectionNotFound(CollectionId),

    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("decode error: {0}")]
    Decode(Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Network-level failure while talking to a remote peer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timed out")]
    Timeout,

    #[error("peer error: {0}")]
    Peer(String),

    #[error("codec error: {0}")]
    Codec(String),
}

/// Error type for replication runs. A failed run leaves the prior convergent
/// state intact: no partial checkpoint advance.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// The offline flag short-circuited the invocation.
    #[error("replication is offline")]
    Offline,

    /// Transport failure after exhausting the per-batch retry budget.
    /// Reportable, non-fatal: the next manual trigger retries from the last
    /// known-good checkpoint.
    #[error("transport failure while {phase}: {source}")]
    Transport {
        phase: ReplicationPhase,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
