//! Selector-based filtering, sorting and pagination.
//!
//! The selector is a closed constraint object (field -> constraint), the sole
//! read contract exposed to the presentation layer. Offset pagination over a
//! mutating collection may skip or repeat items between pages; that is an
//! accepted tradeoff of offset paging, not special-cased here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use ludex_proto::{Document, DocumentBody};

/// A comparable field value. Derived ordering compares variants first, so
/// mixed-type sorts are stable even when a field is absent on some documents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    String(String),
    Timestamp(DateTime<Utc>),
}

impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::String(v.to_string()) }
}

impl From<String> for Value {
    fn from(v: String) -> Self { Value::String(v) }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self { Value::Integer(v) }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self { Value::Integer(v as i64) }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Bool(v) }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self { Value::Timestamp(v) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    /// Field present and equal.
    Eq(Value),
    /// Field present (true) or absent (false).
    Exists(bool),
    /// Case-insensitive substring match on a text field.
    Contains(String),
}

/// field -> constraint, combined conjunctively.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selector(pub BTreeMap<String, Constraint>);

impl Selector {
    pub fn new() -> Self { Self::default() }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), Constraint::Eq(value.into()));
        self
    }

    pub fn exists(mut self, field: impl Into<String>, exists: bool) -> Self {
        self.0.insert(field.into(), Constraint::Exists(exists));
        self
    }

    pub fn contains(mut self, field: impl Into<String>, needle: impl Into<String>) -> Self {
        self.0.insert(field.into(), Constraint::Contains(needle.into()));
        self
    }

    pub fn get(&self, field: &str) -> Option<&Constraint> { self.0.get(field) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub direction: Direction,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self { Self { field: field.into(), direction: Direction::Asc } }

    pub fn desc(field: impl Into<String>) -> Self { Self { field: field.into(), direction: Direction::Desc } }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub selector: Selector,
    pub sort: Vec<Sort>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Query {
    pub fn new(selector: Selector) -> Self { Self { selector, ..Default::default() } }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Named field access on a document. Unknown fields and fields the document's
/// kind does not carry read as absent.
pub fn field_value(doc: &Document, field: &str) -> Option<Value> {
    match field {
        "id" => return Some(Value::String(doc.id.as_str().to_string())),
        "type" => return Some(Value::String(doc.kind().as_str().to_string())),
        _ => {}
    }
    match &doc.body {
        DocumentBody::Game { title, editor, country, release_year } => match field {
            "title" => Some(Value::String(title.clone())),
            "editor" => Some(Value::String(editor.clone())),
            "country" => country.clone().map(Value::String),
            "release_year" => Some(Value::Integer(*release_year as i64)),
            _ => None,
        },
        DocumentBody::Comment { game_id, text, created_at, author } => match field {
            "game_id" => Some(Value::String(game_id.as_str().to_string())),
            "text" => Some(Value::String(text.clone())),
            "created_at" => Some(Value::Timestamp(*created_at)),
            "author" => author.clone().map(Value::String),
            _ => None,
        },
        DocumentBody::Like { game_id, created_at } => match field {
            "game_id" => Some(Value::String(game_id.as_str().to_string())),
            "created_at" => Some(Value::Timestamp(*created_at)),
            _ => None,
        },
    }
}

pub fn matches(doc: &Document, selector: &Selector) -> bool {
    selector.0.iter().all(|(field, constraint)| {
        let value = field_value(doc, field);
        match constraint {
            Constraint::Eq(expected) => value.as_ref() == Some(expected),
            Constraint::Exists(expected) => value.is_some() == *expected,
            Constraint::Contains(needle) => match value {
                Some(Value::String(text)) => text.to_lowercase().contains(&needle.to_lowercase()),
                _ => false,
            },
        }
    })
}

/// Multi-key sort with id tie-break, so the result order is total and stable
/// across replicas.
pub fn sort_documents(documents: &mut [Document], sort: &[Sort]) {
    documents.sort_by(|a, b| {
        for item in sort {
            let a_val = field_value(a, &item.field);
            let b_val = field_value(b, &item.field);
            let cmp = match item.direction {
                Direction::Asc => a_val.cmp(&b_val),
                Direction::Desc => b_val.cmp(&a_val),
            };
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        a.id.cmp(&b.id)
    });
}
