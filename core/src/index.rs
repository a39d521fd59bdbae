//! Secondary index over the document store.
//!
//! Maintained incrementally on every store write and rebuilt from a full
//! storage scan at open, which doubles as the recovery path after
//! `IndexCorruption`. The index is derived state: durability follows from the
//! document tree it is rebuilt from.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

use ludex_proto::{DocumentBody, DocumentId, DocumentKind, DocumentState};

/// Lowercase alphanumeric tokens of a text field. Split points are exactly
/// the non-alphanumeric characters, so a single-word needle is a substring of
/// the normalized field iff it is a substring of some token.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase().split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(|t| t.to_string()).collect()
}

fn searchable_texts(body: &DocumentBody) -> Vec<&str> {
    match body {
        DocumentBody::Game { title, editor, country, .. } => {
            let mut texts = vec![title.as_str(), editor.as_str()];
            if let Some(country) = country {
                texts.push(country.as_str());
            }
            texts
        }
        DocumentBody::Comment { text, author, .. } => {
            let mut texts = vec![text.as_str()];
            if let Some(author) = author {
                texts.push(author.as_str());
            }
            texts
        }
        DocumentBody::Like { .. } => Vec::new(),
    }
}

#[derive(Debug, Default)]
pub(crate) struct SecondaryIndex {
    /// All live (non-tombstoned) ids, in id order. Backs `list_all`.
    live: BTreeSet<DocumentId>,
    by_kind: BTreeMap<DocumentKind, BTreeSet<DocumentId>>,
    /// Children of a parent document, ordered by creation time.
    by_parent: BTreeMap<(DocumentKind, DocumentId), BTreeSet<(DateTime<Utc>, DocumentId)>>,
    /// token -> ids whose searchable text contains the token.
    tokens: BTreeMap<String, BTreeSet<DocumentId>>,
}

impl SecondaryIndex {
    pub fn rebuild<'a>(states: impl IntoIterator<Item = &'a DocumentState>) -> Self {
        let mut index = Self::default();
        for state in states {
            index.insert_postings(state);
        }
        index
    }

    /// Incremental maintenance for one write: retract the superseded state's
    /// postings, then insert the new state's.
    pub fn apply(&mut self, previous: Option<&DocumentState>, next: &DocumentState) {
        if let Some(previous) = previous {
            self.remove_postings(previous);
        }
        self.insert_postings(next);
    }

    fn insert_postings(&mut self, state: &DocumentState) {
        if state.current.deleted {
            return;
        }
        let id = &state.id;
        let kind = state.current.body.kind();
        self.live.insert(id.clone());
        self.by_kind.entry(kind).or_default().insert(id.clone());
        if let (Some(parent), Some(created_at)) = (state.current.body.parent_id(), state.current.body.created_at()) {
            self.by_parent.entry((kind, parent.clone())).or_default().insert((created_at, id.clone()));
        }
        for text in searchable_texts(&state.current.body) {
            for token in tokenize(text) {
                self.tokens.entry(token).or_default().insert(id.clone());
            }
        }
    }

    fn remove_postings(&mut self, state: &DocumentState) {
        if state.current.deleted {
            return;
        }
        let id = &state.id;
        let kind = state.current.body.kind();
        self.live.remove(id);
        if let Some(ids) = self.by_kind.get_mut(&kind) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_kind.remove(&kind);
            }
        }
        if let (Some(parent), Some(created_at)) = (state.current.body.parent_id(), state.current.body.created_at()) {
            let key = (kind, parent.clone());
            if let Some(children) = self.by_parent.get_mut(&key) {
                children.remove(&(created_at, id.clone()));
                if children.is_empty() {
                    self.by_parent.remove(&key);
                }
            }
        }
        for text in searchable_texts(&state.current.body) {
            for token in tokenize(text) {
                if let Some(ids) = self.tokens.get_mut(&token) {
                    ids.remove(id);
                    if ids.is_empty() {
                        self.tokens.remove(&token);
                    }
                }
            }
        }
    }

    pub fn live_ids(&self) -> Vec<DocumentId> { self.live.iter().cloned().collect() }

    pub fn kind_ids(&self, kind: DocumentKind) -> Vec<DocumentId> {
        self.by_kind.get(&kind).map(|ids| ids.iter().cloned().collect()).unwrap_or_default()
    }

    /// Child ids of `parent`, ordered by creation time.
    pub fn children(&self, kind: DocumentKind, parent: &DocumentId) -> Vec<DocumentId> {
        self.by_parent
            .get(&(kind, parent.clone()))
            .map(|children| children.iter().map(|(_, id)| id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn child_count(&self, kind: DocumentKind, parent: &DocumentId) -> usize {
        self.by_parent.get(&(kind, parent.clone())).map(|children| children.len()).unwrap_or(0)
    }

    /// The most recently created child of `parent`, if any.
    pub fn latest_child(&self, kind: DocumentKind, parent: &DocumentId) -> Option<DocumentId> {
        self.by_parent.get(&(kind, parent.clone())).and_then(|children| children.iter().next_back().map(|(_, id)| id.clone()))
    }

    /// Ids whose searchable text contains `needle` (already lowercased) as a
    /// substring of some token. Only valid as a candidate set for single-word
    /// needles; multi-word needles must scan.
    pub fn token_candidates(&self, needle: &str) -> Vec<DocumentId> {
        let mut out = BTreeSet::new();
        for (token, ids) in &self.tokens {
            if token.contains(needle) {
                out.extend(ids.iter().cloned());
            }
        }
        out.into_iter().collect()
    }
}
