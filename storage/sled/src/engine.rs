use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use sled::{Config, Db};

use crate::collection::SledCollection;
use ludex_core::error::StorageError;
use ludex_core::storage::{blobs_name, changes_name, docs_name, meta_name, StorageCollection, StorageEngine};
use ludex_proto::CollectionId;

/// Durable storage engine backed by a single sled database. Each collection
/// owns four trees: documents, change feed, blobs and meta.
pub struct SledStorageEngine {
    pub db: Db,
}

impl SledStorageEngine {
    pub fn with_homedir_folder(folder_name: &str) -> anyhow::Result<Self> {
        let dir = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("failed to get home directory"))?.join(folder_name);
        Self::with_path(dir)
    }

    pub fn with_path(path: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&path)?;
        let dbpath = path.join("sled");
        let db = sled::open(&dbpath)?;
        Ok(Self { db })
    }

    pub fn new() -> anyhow::Result<Self> { Self::with_homedir_folder(".ludex") }

    /// Temporary, in-memory-ish database for tests. Never flushed.
    pub fn new_test() -> anyhow::Result<Self> {
        let db = Config::new().temporary(true).flush_every_ms(None).open()?;
        Ok(Self { db })
    }
}

#[async_trait]
impl StorageEngine for SledStorageEngine {
    async fn collection(&self, id: &CollectionId) -> Result<Arc<dyn StorageCollection>, StorageError> {
        // open_tree is cheap; no need for spawn_blocking here
        let name = id.as_str();
        let docs = self.db.open_tree(docs_name(name)).map_err(backend)?;
        let changes = self.db.open_tree(changes_name(name)).map_err(backend)?;
        let blobs = self.db.open_tree(blobs_name(name)).map_err(backend)?;
        let meta = self.db.open_tree(meta_name(name)).map_err(backend)?;
        Ok(Arc::new(SledCollection { docs, changes, blobs, meta }))
    }

    async fn delete_all_collections(&self) -> Result<bool, StorageError> {
        let mut dropped = false;
        for name in self.db.tree_names() {
            if name.as_ref() == b"__sled__default" {
                continue;
            }
            dropped |= self.db.drop_tree(&name).map_err(backend)?;
        }
        Ok(dropped)
    }
}

pub(crate) fn backend(e: sled::Error) -> StorageError { StorageError::Backend(anyhow::Error::new(e)) }
