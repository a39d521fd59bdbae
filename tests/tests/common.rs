#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use ludex::proto::{CollectionId, DocumentBody, DocumentId};
use ludex::DocumentStore;
use ludex_storage_sled::SledStorageEngine;

#[ctor::ctor]
fn init_tracing() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).with_test_writer().init();
}

pub async fn test_store() -> Result<Arc<DocumentStore>> {
    let engine = SledStorageEngine::new_test()?;
    let store = DocumentStore::open(&engine, CollectionId::new("library")).await?;
    Ok(store)
}

pub fn game(title: &str, editor: &str, year: i32) -> DocumentBody {
    DocumentBody::Game { title: title.to_string(), editor: editor.to_string(), country: None, release_year: year }
}

pub fn game_from(title: &str, editor: &str, country: &str, year: i32) -> DocumentBody {
    DocumentBody::Game {
        title: title.to_string(),
        editor: editor.to_string(),
        country: Some(country.to_string()),
        release_year: year,
    }
}

pub fn comment(game_id: &DocumentId, text: &str, created_at: DateTime<Utc>) -> DocumentBody {
    DocumentBody::Comment { game_id: game_id.clone(), text: text.to_string(), created_at, author: None }
}

pub fn like(game_id: &DocumentId, created_at: DateTime<Utc>) -> DocumentBody {
    DocumentBody::Like { game_id: game_id.clone(), created_at }
}

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 1, hour, minute, 0).unwrap() }
