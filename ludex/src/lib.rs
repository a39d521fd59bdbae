//! # Ludex
//!
//! Ludex is a local-first document synchronization layer for a shared,
//! versioned game-library collection. It keeps a durable local replica,
//! replicates bidirectionally with a remote authority over an unreliable
//! network, resolves divergent concurrent edits deterministically, and serves
//! indexed, paginated queries to the presentation layer.
//!
//! ## Core Concepts
//!
//! - **Document**: the unit of storage — a `game`, `comment` or `like` with a
//!   revision history and optional attachments
//! - **Revision**: a generation counter plus content digest; writes must name
//!   the current revision as parent, or fail with a conflict
//! - **Tombstone**: a permanent deletion marker that replicates like any edit
//! - **Replication**: a manually triggered pull-then-push run against a peer,
//!   checkpointed per peer so repeated runs only diff the tail
//! - **Conflict**: divergent revisions resolved by a deterministic policy,
//!   with the loser retained for inspection
//!
//! ## Example
//!
//! ```no_run
//! use ludex::{DocumentStore, Pagination};
//! use ludex::proto::{CollectionId, DocumentBody, DocumentId};
//! use ludex_storage_sled::SledStorageEngine;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = SledStorageEngine::new_test()?;
//! let store = DocumentStore::open(&engine, CollectionId::new("library")).await?;
//!
//! let id = DocumentId::new("G1");
//! let rev = store
//!     .put(
//!         &id,
//!         DocumentBody::Game { title: "Chess".into(), editor: "FIDE".into(), country: None, release_year: 1475 },
//!         None,
//!     )
//!     .await?;
//!
//! let game = store.get(&id).await?;
//! assert_eq!(game.revision, rev);
//!
//! let page = store.list_all(Pagination::new(10, 0)).await?;
//! assert!(!page.more);
//! # Ok(())
//! # }
//! ```

pub use ludex_core::conflict;
pub use ludex_core::connector::{self, RemotePeer};
pub use ludex_core::error::{
    MutationError, ReplicationError, RetrievalError, StorageError, TransportError, ValidationError,
};
pub use ludex_core::query::{Constraint, Direction, Query, Selector, Sort, Value};
pub use ludex_core::replication::{ReplicationOptions, ReplicationPhase, ReplicationReport, Replicator};
pub use ludex_core::storage::{StorageCollection, StorageCollectionWrapper, StorageEngine};
pub use ludex_core::store::{ApplyOutcome, DocumentStore, Page, Pagination};

pub use ludex_proto as proto;
