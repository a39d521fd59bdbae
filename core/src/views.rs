//! Aggregation views: derived counters recomputed from current index state.
//!
//! Never separately persisted, so they cannot drift from the documents they
//! summarize.

use crate::error::RetrievalError;
use crate::store::DocumentStore;
use ludex_proto::{Document, DocumentId, DocumentKind};

impl DocumentStore {
    /// Number of like documents referencing the game. Likes are
    /// unbounded-per-game: each like document counts.
    pub fn like_count(&self, game_id: &DocumentId) -> usize {
        self.index().read().unwrap().child_count(DocumentKind::Like, game_id)
    }

    /// The comment with the greatest creation time among the game's comments.
    pub async fn latest_comment(&self, game_id: &DocumentId) -> Result<Option<Document>, RetrievalError> {
        let latest = self.index().read().unwrap().latest_child(DocumentKind::Comment, game_id);
        match latest {
            Some(id) => match self.get(&id).await {
                Ok(doc) => Ok(Some(doc)),
                // Tombstoned between the index read and the fetch.
                Err(RetrievalError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            },
            None => Ok(None),
        }
    }
}
