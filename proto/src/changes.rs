use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{id::DocumentId, revision::Revision};

/// Position in a collection's append-only change feed. Opaque to peers; a
/// replication run hands back the token it last consumed to resume diffing
/// from there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default, Serialize, Deserialize)]
pub struct CheckpointToken(u64);

impl CheckpointToken {
    pub const ZERO: CheckpointToken = CheckpointToken(0);

    pub fn new(seq: u64) -> Self { Self(seq) }

    pub fn value(&self) -> u64 { self.0 }
}

impl fmt::Display for CheckpointToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "@{}", self.0) }
}

/// One entry in the change feed: the id moved to this revision at this
/// sequence. The feed is compacted — only the latest entry per id survives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub seq: CheckpointToken,
    pub id: DocumentId,
    pub revision: Revision,
    pub deleted: bool,
}

/// A page of the change feed. `pending` signals that more entries exist past
/// `last_seq`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBatch {
    pub entries: Vec<ChangeEntry>,
    pub last_seq: CheckpointToken,
    pub pending: bool,
}

impl fmt::Display for ChangeBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Changes({} entries, last {}{})", self.entries.len(), self.last_seq, if self.pending { ", pending" } else { "" })
    }
}
