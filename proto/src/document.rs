use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{attachment::AttachmentMeta, id::DocumentId, revision::Revision};

/// Discriminator for the closed set of document shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum DocumentKind {
    Game,
    Comment,
    Like,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Game => "game",
            DocumentKind::Comment => "comment",
            DocumentKind::Like => "like",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str()) }
}

/// Type-specific payload of a document. A like is a document whose existence
/// records the fact; aggregation counts like documents rather than reading a
/// boolean field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentBody {
    Game {
        title: String,
        editor: String,
        country: Option<String>,
        release_year: i32,
    },
    Comment {
        game_id: DocumentId,
        text: String,
        created_at: DateTime<Utc>,
        author: Option<String>,
    },
    Like {
        game_id: DocumentId,
        created_at: DateTime<Utc>,
    },
}

impl DocumentBody {
    pub fn kind(&self) -> DocumentKind {
        match self {
            DocumentBody::Game { .. } => DocumentKind::Game,
            DocumentBody::Comment { .. } => DocumentKind::Comment,
            DocumentBody::Like { .. } => DocumentKind::Like,
        }
    }

    /// The game a comment or like belongs to. Referential integrity is not
    /// store-enforced; cascade deletion is an explicit operation.
    pub fn parent_id(&self) -> Option<&DocumentId> {
        match self {
            DocumentBody::Game { .. } => None,
            DocumentBody::Comment { game_id, .. } => Some(game_id),
            DocumentBody::Like { game_id, .. } => Some(game_id),
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self {
            DocumentBody::Game { .. } => None,
            DocumentBody::Comment { created_at, .. } => Some(*created_at),
            DocumentBody::Like { created_at, .. } => Some(*created_at),
        }
    }
}

/// A readable document: the current revision of a live (non-tombstoned) id,
/// or a retained conflict loser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub revision: Revision,
    pub body: DocumentBody,
    pub attachments: BTreeMap<String, AttachmentMeta>,
}

impl Document {
    pub fn kind(&self) -> DocumentKind { self.body.kind() }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} @{} ({})", self.id, self.revision, self.kind()) }
}
