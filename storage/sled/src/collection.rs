use async_trait::async_trait;
use bytes::Bytes;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use tokio::task;
use tracing::trace;

use crate::engine::backend;
use ludex_core::error::StorageError;
use ludex_core::storage::StorageCollection;
use ludex_proto::{
    BlobDigest, ChangeBatch, ChangeEntry, CheckpointToken, DocumentId, DocumentState, Revision, StoreId,
};

const SEQ_KEY: &[u8] = b"seq";
const STORE_ID_KEY: &[u8] = b"store_id";
const CHECKPOINT_PREFIX: &str = "checkpoint:";
const CHANGE_PTR_PREFIX: &[u8] = b"changeseq:";

/// One collection's trees. Document writes go through a cross-tree
/// transaction so the document, its change-feed entry and the sequence
/// counter can never drift apart.
pub struct SledCollection {
    pub(crate) docs: sled::Tree,
    pub(crate) changes: sled::Tree,
    pub(crate) blobs: sled::Tree,
    pub(crate) meta: sled::Tree,
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    bincode::deserialize(bytes).map_err(|e| StorageError::Decode(Box::new(e)))
}

fn u64_from(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf)
}

#[async_trait]
impl StorageCollection for SledCollection {
    async fn store_id(&self) -> Result<StoreId, StorageError> {
        let meta = self.meta.clone();
        task::spawn_blocking(move || -> Result<StoreId, StorageError> {
            if let Some(bytes) = meta.get(STORE_ID_KEY).map_err(backend)? {
                let raw: [u8; 16] =
                    bytes.as_ref().try_into().map_err(|_| StorageError::Decode("store id has wrong length".into()))?;
                return Ok(StoreId::from_bytes(raw));
            }
            let store_id = StoreId::new();
            meta.insert(STORE_ID_KEY, &store_id.to_bytes()[..]).map_err(backend)?;
            Ok(store_id)
        })
        .await
        .map_err(join_err)?
    }

    async fn set_document(&self, state: &DocumentState) -> Result<CheckpointToken, StorageError> {
        let doc_bytes = bincode::serialize(state).map_err(|e| StorageError::Encode(e.into()))?;
        let change_bytes = bincode::serialize(&(&state.id, &state.current.revision, state.current.deleted))
            .map_err(|e| StorageError::Encode(e.into()))?;
        let id_key = state.id.as_bytes().to_vec();
        let id = state.id.clone();

        let docs = self.docs.clone();
        let changes = self.changes.clone();
        let meta = self.meta.clone();

        let seq = task::spawn_blocking(move || -> Result<u64, StorageError> {
            let ptr_key: Vec<u8> = [CHANGE_PTR_PREFIX, &id_key].concat();
            (&docs, &changes, &meta)
                .transaction(|(docs, changes, meta)| -> Result<u64, ConflictableTransactionError<()>> {
                    let seq = match meta.get(SEQ_KEY)? {
                        Some(v) => u64_from(&v) + 1,
                        None => 1,
                    };
                    let seq_bytes = seq.to_be_bytes();
                    meta.insert(SEQ_KEY, &seq_bytes[..])?;
                    docs.insert(&id_key[..], &doc_bytes[..])?;
                    // compaction: retire the previous feed entry for this id
                    if let Some(old_seq) = meta.get(&ptr_key)? {
                        changes.remove(&old_seq[..])?;
                    }
                    changes.insert(&seq_bytes[..], &change_bytes[..])?;
                    meta.insert(&ptr_key[..], &seq_bytes[..])?;
                    Ok(seq)
                })
                .map_err(|e: TransactionError<()>| match e {
                    TransactionError::Storage(e) => backend(e),
                    TransactionError::Abort(()) => StorageError::Backend(anyhow::anyhow!("transaction aborted")),
                })
        })
        .await
        .map_err(join_err)??;

        trace!(id = %id, seq, "document state stored");
        Ok(CheckpointToken::new(seq))
    }

    async fn get_document(&self, id: &DocumentId) -> Result<DocumentState, StorageError> {
        let docs = self.docs.clone();
        let key = id.as_bytes().to_vec();
        let result = task::spawn_blocking(move || docs.get(&key)).await.map_err(join_err)?.map_err(backend)?;
        match result {
            Some(bytes) => decode(&bytes),
            None => Err(StorageError::DocumentNotFound(id.clone())),
        }
    }

    async fn scan_documents(&self) -> Result<Vec<DocumentState>, StorageError> {
        let docs = self.docs.clone();
        task::spawn_blocking(move || -> Result<Vec<DocumentState>, StorageError> {
            let mut states = Vec::new();
            for item in docs.iter() {
                let (_, bytes) = item.map_err(backend)?;
                states.push(decode(&bytes)?);
            }
            Ok(states)
        })
        .await
        .map_err(join_err)?
    }

    async fn changes_since(&self, since: CheckpointToken, limit: usize) -> Result<ChangeBatch, StorageError> {
        let changes = self.changes.clone();
        task::spawn_blocking(move || -> Result<ChangeBatch, StorageError> {
            let start = (since.value() + 1).to_be_bytes();
            let mut entries = Vec::new();
            let mut last_seq = since;
            let mut pending = false;
            for item in changes.range(&start[..]..) {
                let (key, value) = item.map_err(backend)?;
                if entries.len() == limit {
                    pending = true;
                    break;
                }
                let seq = CheckpointToken::new(u64_from(&key));
                let (id, revision, deleted): (DocumentId, Revision, bool) = decode(&value)?;
                last_seq = seq;
                entries.push(ChangeEntry { seq, id, revision, deleted });
            }
            Ok(ChangeBatch { entries, last_seq, pending })
        })
        .await
        .map_err(join_err)?
    }

    async fn put_blob(&self, digest: &BlobDigest, payload: Bytes) -> Result<bool, StorageError> {
        let blobs = self.blobs.clone();
        let key = digest.as_bytes().to_vec();
        task::spawn_blocking(move || -> Result<bool, StorageError> {
            if blobs.contains_key(&key).map_err(backend)? {
                return Ok(false);
            }
            blobs.insert(&key[..], &payload[..]).map_err(backend)?;
            Ok(true)
        })
        .await
        .map_err(join_err)?
    }

    async fn get_blob(&self, digest: &BlobDigest) -> Result<Bytes, StorageError> {
        let blobs = self.blobs.clone();
        let key = digest.as_bytes().to_vec();
        let result = task::spawn_blocking(move || blobs.get(&key)).await.map_err(join_err)?.map_err(backend)?;
        match result {
            Some(bytes) => Ok(Bytes::copy_from_slice(&bytes)),
            None => Err(StorageError::BlobNotFound(*digest)),
        }
    }

    async fn has_blob(&self, digest: &BlobDigest) -> Result<bool, StorageError> {
        let blobs = self.blobs.clone();
        let key = digest.as_bytes().to_vec();
        task::spawn_blocking(move || blobs.contains_key(&key)).await.map_err(join_err)?.map_err(backend)
    }

    async fn get_checkpoint(&self, key: &str) -> Result<Option<CheckpointToken>, StorageError> {
        let meta = self.meta.clone();
        let key = format!("{}{}", CHECKPOINT_PREFIX, key).into_bytes();
        let result = task::spawn_blocking(move || meta.get(&key)).await.map_err(join_err)?.map_err(backend)?;
        Ok(result.map(|bytes| CheckpointToken::new(u64_from(&bytes))))
    }

    async fn set_checkpoint(&self, key: &str, token: CheckpointToken) -> Result<(), StorageError> {
        let meta = self.meta.clone();
        let key = format!("{}{}", CHECKPOINT_PREFIX, key).into_bytes();
        task::spawn_blocking(move || meta.insert(&key[..], &token.value().to_be_bytes()[..]))
            .await
            .map_err(join_err)?
            .map_err(backend)?;
        Ok(())
    }
}

fn join_err(e: task::JoinError) -> StorageError { StorageError::Backend(anyhow::Error::new(e)) }
