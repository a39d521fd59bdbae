use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    attachment::Attachment,
    changes::{ChangeBatch, CheckpointToken},
    collection::CollectionId,
    id::{DocumentId, RequestId, StoreId},
    revision::Revision,
    state::DocumentState,
};

/// Handshake payload announcing a peer's durable identity and collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub store_id: StoreId,
    pub collection: CollectionId,
}

/// Top-level frame exchanged between peers.
#[derive(Debug, Serialize, Deserialize)]
pub enum PeerMessage {
    Presence(Presence),
    Request(PeerRequest),
    Response(PeerResponse),
}

/// A request from a replicating client to the remote authority.
#[derive(Debug, Serialize, Deserialize)]
pub struct PeerRequest {
    pub id: RequestId,
    pub body: PeerRequestBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum PeerRequestBody {
    /// Read the change feed from a checkpoint.
    Changes { since: CheckpointToken, limit: u32 },
    /// Fetch full document states by id and revision.
    BulkGet { requests: Vec<(DocumentId, Revision)> },
    /// Upsert full document states; the receiver applies its own conflict
    /// resolution against each document's recorded ancestry.
    BulkPut { documents: Vec<DocumentState> },
    GetAttachment { id: DocumentId, name: String },
    PutAttachment { id: DocumentId, name: String, content_type: String, payload: Bytes },
}

/// A response from the remote authority.
#[derive(Debug, Serialize, Deserialize)]
pub struct PeerResponse {
    pub request_id: RequestId,
    pub body: PeerResponseBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum PeerResponseBody {
    Changes(ChangeBatch),
    Documents(Vec<DocumentState>),
    Attachment(Attachment),
    Ack,
    Error(String),
}

impl fmt::Display for PeerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Request {}: {}", self.id, self.body) }
}

impl fmt::Display for PeerRequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerRequestBody::Changes { since, limit } => write!(f, "Changes since {since} limit {limit}"),
            PeerRequestBody::BulkGet { requests } => {
                write!(f, "BulkGet [{}]", requests.iter().map(|(id, rev)| format!("{id}@{rev}")).collect::<Vec<_>>().join(", "))
            }
            PeerRequestBody::BulkPut { documents } => {
                write!(f, "BulkPut [{}]", documents.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", "))
            }
            PeerRequestBody::GetAttachment { id, name } => write!(f, "GetAttachment {id}/{name}"),
            PeerRequestBody::PutAttachment { id, name, payload, .. } => {
                write!(f, "PutAttachment {id}/{name} {}b", payload.len())
            }
        }
    }
}

impl fmt::Display for PeerResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Response({}) {}", self.request_id, self.body) }
}

impl fmt::Display for PeerResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerResponseBody::Changes(batch) => write!(f, "{batch}"),
            PeerResponseBody::Documents(docs) => write!(f, "Documents [{}]", docs.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")),
            PeerResponseBody::Attachment(att) => write!(f, "Attachment {} {}b", att.content_type, att.payload.len()),
            PeerResponseBody::Ack => write!(f, "Ack"),
            PeerResponseBody::Error(e) => write!(f, "Error: {e}"),
        }
    }
}
