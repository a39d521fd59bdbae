use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{
    attachment::AttachmentMeta,
    document::{Document, DocumentBody},
    error::EncodeError,
    id::DocumentId,
    revision::Revision,
};

/// How many ancestor revisions a document state retains. Divergence deeper
/// than the cap still resolves through the (generation, digest) policy, which
/// needs no history at all.
pub const REVS_LIMIT: usize = 100;

/// One concrete revision of a document: content plus the revision derived
/// from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedDocument {
    pub revision: Revision,
    pub deleted: bool,
    pub body: DocumentBody,
    pub attachments: BTreeMap<String, AttachmentMeta>,
}

impl VersionedDocument {
    /// Build the successor of `parent` for the given content, deriving the
    /// new revision from the canonical content bytes.
    pub fn next(
        id: &DocumentId,
        parent: Option<&Revision>,
        deleted: bool,
        body: DocumentBody,
        attachments: BTreeMap<String, AttachmentMeta>,
    ) -> Result<Self, EncodeError> {
        let content = bincode::serialize(&(deleted, &body, &attachments))?;
        let revision = Revision::derive(id.as_str(), parent, &content);
        Ok(Self { revision, deleted, body, attachments })
    }
}

/// A retained conflict loser, kept with enough ancestry to stay comparable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictingVersion {
    pub version: VersionedDocument,
    pub ancestry: Vec<Revision>,
}

/// The full stored (and replicated) state of one document id: the current
/// revision, its ancestry newest-first (capped at [`REVS_LIMIT`]), and any
/// retained conflict losers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentState {
    pub id: DocumentId,
    pub current: VersionedDocument,
    pub ancestry: Vec<Revision>,
    pub conflicts: Vec<ConflictingVersion>,
}

impl DocumentState {
    pub fn initial(id: DocumentId, current: VersionedDocument) -> Self {
        Self { id, current, ancestry: Vec::new(), conflicts: Vec::new() }
    }

    /// Replace the current version, pushing the old current onto the ancestry.
    pub fn advance(&mut self, next: VersionedDocument) {
        self.ancestry.insert(0, self.current.revision.clone());
        self.ancestry.truncate(REVS_LIMIT);
        self.current = next;
    }

    /// Whether this state has already seen `revision` — as current, as an
    /// ancestor, or as a recorded conflict. Used by replication diffing to
    /// skip transfers.
    pub fn knows_revision(&self, revision: &Revision) -> bool {
        if self.current.revision == *revision || self.ancestry.contains(revision) {
            return true;
        }
        self.conflicts.iter().any(|c| c.version.revision == *revision || c.ancestry.contains(revision))
    }

    /// The readable view of the current revision, if not tombstoned.
    pub fn to_document(&self) -> Option<Document> {
        if self.current.deleted {
            return None;
        }
        Some(Document {
            id: self.id.clone(),
            revision: self.current.revision.clone(),
            body: self.current.body.clone(),
            attachments: self.current.attachments.clone(),
        })
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "State({} @{}{}{})",
            self.id,
            self.current.revision,
            if self.current.deleted { " deleted" } else { "" },
            if self.conflicts.is_empty() { String::new() } else { format!(" +{} conflicts", self.conflicts.len()) }
        )
    }
}
