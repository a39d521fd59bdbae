use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::conflict::{self, Lineage};
use crate::error::{MutationError, RetrievalError, StorageError, ValidationError};
use crate::index::SecondaryIndex;
use crate::query::{self, Query};
use crate::storage::{StorageCollectionWrapper, StorageEngine};
use ludex_proto::{
    ChangeBatch, CheckpointToken, CollectionId, ConflictingVersion, Document, DocumentBody, DocumentId, DocumentKind,
    DocumentState, Revision, StoreId, VersionedDocument,
};

#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
}

impl Pagination {
    pub fn new(limit: usize, offset: usize) -> Self { Self { limit, offset } }
}

/// A page of results plus a flag telling the caller whether more matching
/// documents exist past it.
#[derive(Debug, Clone)]
pub struct Page {
    pub documents: Vec<Document>,
    pub more: bool,
}

/// What happened to an incoming replicated state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Committed as the new current revision (new document or fast-forward).
    Applied,
    /// The revision was already part of local history.
    AlreadyKnown,
    /// The incoming revision is an ancestor of the local current; nothing to do.
    Ignored,
    /// Histories diverged; the resolver picked `winner` and retained the loser.
    ConflictRecorded { winner: Revision },
}

/// Local, durable, versioned store of one document collection.
///
/// One logical writer per document id: writers contend on a per-id async
/// mutex, never on a store-wide lock. The secondary index is an in-memory
/// projection rebuilt from storage at open.
pub struct DocumentStore {
    collection: CollectionId,
    storage: StorageCollectionWrapper,
    store_id: StoreId,
    index: RwLock<SecondaryIndex>,
    locks: DashMap<DocumentId, Arc<Mutex<()>>>,
}

impl DocumentStore {
    /// Open (or create) the collection on the given engine and rebuild the
    /// index from a full scan.
    pub async fn open(engine: &dyn StorageEngine, collection: CollectionId) -> Result<Arc<Self>, RetrievalError> {
        let storage = StorageCollectionWrapper::new(engine.collection(&collection).await?);
        let store_id = storage.store_id().await?;
        let states = storage.scan_documents().await?;
        let index = SecondaryIndex::rebuild(states.iter());
        info!(collection = %collection, store = %store_id, documents = states.len(), "opened document store");
        Ok(Arc::new(Self { collection, storage, store_id, index: RwLock::new(index), locks: DashMap::new() }))
    }

    pub fn id(&self) -> StoreId { self.store_id }

    pub fn collection(&self) -> &CollectionId { &self.collection }

    pub(crate) fn lock_for(&self, id: &DocumentId) -> Arc<Mutex<()>> {
        self.locks.entry(id.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    pub(crate) async fn load(&self, id: &DocumentId) -> Result<Option<DocumentState>, StorageError> {
        match self.storage.get_document(id).await {
            Ok(state) => Ok(Some(state)),
            Err(StorageError::DocumentNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn commit(&self, previous: Option<&DocumentState>, next: &DocumentState) -> Result<CheckpointToken, StorageError> {
        let seq = self.storage.set_document(next).await?;
        self.index.write().unwrap().apply(previous, next);
        debug!(seq = %seq, "committed {}", next);
        Ok(seq)
    }

    /// Create (if the id is unseen) or update (if `expected_parent` names the
    /// current revision) a document. Attachments ride along unchanged; they
    /// are edited through the attachment operations.
    pub async fn put(
        &self,
        id: &DocumentId,
        body: DocumentBody,
        expected_parent: Option<&Revision>,
    ) -> Result<Revision, MutationError> {
        validate(&body)?;
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let previous = self.load(id).await?;
        let (parent, attachments) = match &previous {
            None => {
                if let Some(expected) = expected_parent {
                    return Err(MutationError::Conflict { id: id.clone(), expected: Some(expected.clone()), current: None });
                }
                (None, BTreeMap::new())
            }
            Some(prev) => {
                let current = &prev.current.revision;
                // A tombstoned id can never be written again, whatever parent
                // the caller names.
                if prev.current.deleted || expected_parent != Some(current) {
                    return Err(MutationError::Conflict {
                        id: id.clone(),
                        expected: expected_parent.cloned(),
                        current: Some(current.clone()),
                    });
                }
                (Some(current.clone()), prev.current.attachments.clone())
            }
        };

        let next = VersionedDocument::next(id, parent.as_ref(), false, body, attachments).map_err(StorageError::from)?;
        let revision = next.revision.clone();
        let state = match &previous {
            Some(prev) => {
                let mut state = prev.clone();
                state.advance(next);
                state
            }
            None => DocumentState::initial(id.clone(), next),
        };
        self.commit(previous.as_ref(), &state).await?;
        Ok(revision)
    }

    /// `put` with a generated id.
    pub async fn create(&self, body: DocumentBody) -> Result<(DocumentId, Revision), MutationError> {
        let id = DocumentId::generate();
        let revision = self.put(&id, body, None).await?;
        Ok((id, revision))
    }

    pub async fn get(&self, id: &DocumentId) -> Result<Document, RetrievalError> {
        let state = match self.load(id).await? {
            Some(state) => state,
            None => return Err(RetrievalError::NotFound(id.clone())),
        };
        state.to_document().ok_or_else(|| RetrievalError::NotFound(id.clone()))
    }

    /// The current document plus any retained conflict losers.
    pub async fn get_with_conflicts(&self, id: &DocumentId) -> Result<(Document, Vec<Document>), RetrievalError> {
        let state = match self.load(id).await? {
            Some(state) => state,
            None => return Err(RetrievalError::NotFound(id.clone())),
        };
        let document = state.to_document().ok_or_else(|| RetrievalError::NotFound(id.clone()))?;
        let conflicts = state
            .conflicts
            .iter()
            .map(|c| Document {
                id: state.id.clone(),
                revision: c.version.revision.clone(),
                body: c.version.body.clone(),
                attachments: c.version.attachments.clone(),
            })
            .collect();
        Ok((document, conflicts))
    }

    /// Write a tombstone revision. Same optimistic-concurrency gate as `put`;
    /// the tombstone replicates like any other edit, so deletes propagate.
    pub async fn remove(&self, id: &DocumentId, expected_parent: &Revision) -> Result<Revision, MutationError> {
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

        let next = VersionedDocument::next(
            id,
            Some(&previous.current.revision),
            true,
            previous.current.body.clone(),
            BTreeMap::new(),
        )
        .map_err(StorageError::from)?;
        let revision = next.revision.clone();
        let mut state = previous.clone();
        state.advance(next);
        self.commit(Some(&previous), &state).await?;
        Ok(revision)
    }

    /// Tombstone a game and everything referencing it. The store does not
    /// enforce referential integrity, so the cascade is explicit; children
    /// that moved concurrently are skipped with a warning and picked up by
    /// the next caller-level retry.
    pub async fn remove_game_cascade(&self, game_id: &DocumentId, expected_parent: &Revision) -> Result<Revision, MutationError> {
        let children: Vec<DocumentId> = {
            let index = self.index.read().unwrap();
            let mut children = index.children(DocumentKind::Comment, game_id);
            children.extend(index.children(DocumentKind::Like, game_id));
            children
        };
        let revision = self.remove(game_id, expected_parent).await?;
        for child in children {
            let state = match self.load(&child).await? {
                Some(state) if !state.current.deleted => state,
                _ => continue,
            };
            let parent = state.current.revision.clone();
            match self.remove(&child, &parent).await {
                Ok(_) => {}
                Err(MutationError::Conflict { .. }) | Err(MutationError::NotFound(_)) => {
                    warn!(child = %child, "cascade skipped concurrently updated document");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(revision)
    }

    /// All live documents in stable id order. Offset paging over a mutating
    /// collection may skip or repeat items between pages.
    pub async fn list_all(&self, pagination: Pagination) -> Result<Page, RetrievalError> {
        let ids = self.index.read().unwrap().live_ids();
        let documents = self.fetch_live(&ids).await?;
        Ok(paginate(documents, pagination.limit, pagination.offset))
    }

    /// Selector-based search. Candidates come from the narrowest applicable
    /// index posting and every candidate is verified against the full
    /// selector. Same offset-paging caveat as `list_all`.
    pub async fn find(&self, query: &Query) -> Result<Page, RetrievalError> {
        let candidates = {
            let index = self.index.read().unwrap();
            plan_candidates(&index, query)
        };
        let mut documents = self.fetch_live(&candidates).await?;
        documents.retain(|doc| query::matches(doc, &query.selector));
        query::sort_documents(&mut documents, &query.sort);
        Ok(paginate(documents, query.limit.unwrap_or(usize::MAX), query.offset))
    }

    async fn fetch_live(&self, ids: &[DocumentId]) -> Result<Vec<Document>, RetrievalError> {
        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            match self.load(id).await? {
                // A tombstone here is a benign race with a concurrent writer;
                // a missing document means the index lied.
                Some(state) => {
                    if let Some(doc) = state.to_document() {
                        documents.push(doc);
                    }
                }
                None => {
                    return Err(RetrievalError::IndexCorruption(format!(
                        "index references missing document {} in {}",
                        id, self.collection
                    )));
                }
            }
        }
        Ok(documents)
    }

    /// Rebuild the index from a full storage scan. Recovery path for
    /// `IndexCorruption`.
    pub async fn rebuild_index(&self) -> Result<(), RetrievalError> {
        let states = self.storage.scan_documents().await?;
        let rebuilt = SecondaryIndex::rebuild(states.iter());
        *self.index.write().unwrap() = rebuilt;
        info!(collection = %self.collection, documents = states.len(), "index rebuilt");
        Ok(())
    }

    /// Full stored state of an id, tombstones and conflicts included. This is
    /// the replication-facing read.
    pub async fn document_state(&self, id: &DocumentId) -> Result<DocumentState, StorageError> {
        self.storage.get_document(id).await
    }

    /// The local change feed, the replication-facing diff source.
    pub async fn changes_since(&self, since: CheckpointToken, limit: usize) -> Result<ChangeBatch, StorageError> {
        self.storage.changes_since(since, limit).await
    }

    pub(crate) fn storage(&self) -> &StorageCollectionWrapper { &self.storage }

    pub(crate) fn index(&self) -> &RwLock<SecondaryIndex> { &self.index }

    /// Commit a state received from a peer, funneling every divergence
    /// through the deterministic resolver. Never validates: convergence must
    /// not depend on local schema opinions.
    pub async fn apply_replicated(&self, incoming: DocumentState) -> Result<ApplyOutcome, StorageError> {
        let lock = self.lock_for(&incoming.id);
        let _guard = lock.lock().await;

        let previous = match self.storage.get_document(&incoming.id).await {
            Ok(state) => Some(state),
            Err(StorageError::DocumentNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let Some(prev) = previous else {
            let mut next = incoming;
            normalize_conflicts(&mut next);
            self.commit(None, &next).await?;
            return Ok(ApplyOutcome::Applied);
        };

        match conflict::classify(&prev, &incoming) {
            Lineage::Equal => {
                // Same winner on both sides; still adopt any losers the peer
                // recorded that we have not.
                let mut next = prev.clone();
                if merge_conflicts(&mut next, &incoming.conflicts) {
                    self.commit(Some(&prev), &next).await?;
                }
                Ok(ApplyOutcome::AlreadyKnown)
            }
            Lineage::IncomingAncestor => Ok(ApplyOutcome::Ignored),
            Lineage::IncomingDescends => {
                let mut next = incoming;
                merge_conflicts(&mut next, &prev.conflicts);
                normalize_conflicts(&mut next);
                self.commit(Some(&prev), &next).await?;
                Ok(ApplyOutcome::Applied)
            }
            Lineage::Divergent => {
                let incoming_wins = conflict::wins_over(&incoming.current, &prev.current);
                let (mut next, loser) = if incoming_wins {
                    let next = DocumentState {
                        id: incoming.id.clone(),
                        current: incoming.current.clone(),
                        ancestry: incoming.ancestry.clone(),
                        conflicts: incoming.conflicts.clone(),
                    };
                    (next, ConflictingVersion { version: prev.current.clone(), ancestry: prev.ancestry.clone() })
                } else {
                    (prev.clone(), ConflictingVersion { version: incoming.current.clone(), ancestry: incoming.ancestry.clone() })
                };
                merge_conflicts(&mut next, std::slice::from_ref(&loser));
                merge_conflicts(&mut next, if incoming_wins { &prev.conflicts } else { &incoming.conflicts });
                normalize_conflicts(&mut next);
                let winner = next.current.revision.clone();
                debug!(id = %next.id, winner = %winner, loser = %loser.version.revision, "divergent revisions resolved");
                self.commit(Some(&prev), &next).await?;
                Ok(ApplyOutcome::ConflictRecorded { winner })
            }
        }
    }
}

/// Add conflict entries the state does not already account for. Returns true
/// if anything changed.
fn merge_conflicts(state: &mut DocumentState, extra: &[ConflictingVersion]) -> bool {
    let mut changed = false;
    for entry in extra {
        let revision = &entry.version.revision;
        if state.current.revision == *revision || state.ancestry.contains(revision) {
            continue;
        }
        if state.conflicts.iter().any(|c| c.version.revision == *revision) {
            continue;
        }
        state.conflicts.push(entry.clone());
        changed = true;
    }
    if changed {
        normalize_conflicts(state);
    }
    changed
}

/// Keep the conflict list in a canonical order so converged replicas hold
/// identical states.
fn normalize_conflicts(state: &mut DocumentState) {
    state.conflicts.sort_by(|a, b| a.version.revision.cmp(&b.version.revision));
    state.conflicts.dedup_by(|a, b| a.version.revision == b.version.revision);
}

fn paginate(documents: Vec<Document>, limit: usize, offset: usize) -> Page {
    let total = documents.len();
    let documents: Vec<Document> = documents.into_iter().skip(offset).take(limit).collect();
    let more = offset.saturating_add(documents.len()) < total;
    Page { documents, more }
}

fn kind_from_str(name: &str) -> Option<DocumentKind> {
    match name {
        "game" => Some(DocumentKind::Game),
        "comment" => Some(DocumentKind::Comment),
        "like" => Some(DocumentKind::Like),
        _ => None,
    }
}

/// Pick the narrowest candidate set the index can serve for this selector.
fn plan_candidates(index: &SecondaryIndex, query: &Query) -> Vec<DocumentId> {
    use crate::query::{Constraint, Value};

    let kind = match query.selector.get("type") {
        Some(Constraint::Eq(Value::String(name))) => kind_from_str(name),
        _ => None,
    };
    let parent = match query.selector.get("game_id") {
        Some(Constraint::Eq(Value::String(id))) => Some(DocumentId::new(id.clone())),
        _ => None,
    };

    if let (Some(kind), Some(parent)) = (kind, parent.as_ref()) {
        return index.children(kind, parent);
    }
    if let Some(kind) = kind {
        return index.kind_ids(kind);
    }
    // A single-word substring needle can be served from the token index; a
    // multi-word needle can span token boundaries and must scan.
    for constraint in query.selector.0.values() {
        if let Constraint::Contains(needle) = constraint {
            let needle = needle.to_lowercase();
            if !needle.is_empty() && needle.chars().all(|c| c.is_alphanumeric()) {
                return index.token_candidates(&needle);
            }
        }
    }
    index.live_ids()
}

fn validate(body: &DocumentBody) -> Result<(), ValidationError> {
    match body {
        DocumentBody::Game { title, editor, .. } => {
            if title.trim().is_empty() {
                return Err(ValidationError::Empty { field: "title" });
            }
            if editor.trim().is_empty() {
                return Err(ValidationError::Empty { field: "editor" });
            }
        }
        DocumentBody::Comment { game_id, text, .. } => {
            if game_id.as_str().is_empty() {
                return Err(ValidationError::Empty { field: "game_id" });
            }
            if text.trim().is_empty() {
                return Err(ValidationError::Empty { field: "text" });
            }
        }
        DocumentBody::Like { game_id, .. } => {
            if game_id.as_str().is_empty() {
                return Err(ValidationError::Empty { field: "game_id" });
            }
        }
    }
    Ok(())
}
