pub mod attachment;
pub mod connector;
pub mod conflict;
pub mod error;
pub mod index;
pub mod query;
pub mod replication;
pub mod storage;
pub mod store;
pub mod views;

pub use connector::RemotePeer;
pub use error::{MutationError, ReplicationError, RetrievalError, StorageError, TransportError, ValidationError};
pub use query::{Constraint, Direction, Query, Selector, Sort, Value};
pub use replication::{ReplicationOptions, ReplicationPhase, ReplicationReport, Replicator};
pub use storage::{StorageCollection, StorageCollectionWrapper, StorageEngine};
pub use store::{ApplyOutcome, DocumentStore, Page, Pagination};
