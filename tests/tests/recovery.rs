mod common;

use anyhow::Result;
use common::*;

use ludex::proto::{CollectionId, DocumentId};
use ludex::{DocumentStore, Query, Selector};
use ludex_storage_sled::SledStorageEngine;

#[tokio::test]
async fn reopening_a_collection_restores_documents_and_identity() -> Result<()> {
    let engine = SledStorageEngine::new_test()?;

    let store = DocumentStore::open(&engine, CollectionId::new("library")).await?;
    let store_id = store.id();
    let g1 = DocumentId::new("G1");
    let rev = store.put(&g1, game("Chess", "FIDE", 1475), None).await?;
    drop(store);

    // same engine, fresh store: the index is rebuilt from the document tree
    let store = DocumentStore::open(&engine, CollectionId::new("library")).await?;
    assert_eq!(store.id(), store_id);
    assert_eq!(store.get(&g1).await?.revision, rev);

    let page = store.find(&Query::new(Selector::new().contains("title", "chess"))).await?;
    assert_eq!(page.documents.len(), 1);
    Ok(())
}

#[tokio::test]
async fn rebuild_index_is_equivalent_to_incremental_maintenance() -> Result<()> {
    let store = test_store().await?;
    let g1 = DocumentId::new("G1");
    store.put(&g1, game("Chess", "FIDE", 1475), None).await?;
    store.create(comment(&g1, "still good", at(11, 0))).await?;
    store.create(like(&g1, at(11, 30))).await?;
    let doomed = DocumentId::new("G2");
    let rev = store.put(&doomed, game("Duds", "ed", 1999), None).await?;
    store.remove(&doomed, &rev).await?;

    let before = store.find(&Query::new(Selector::new().eq("type", "game"))).await?;
    let likes_before = store.like_count(&g1);

    store.rebuild_index().await?;

    let after = store.find(&Query::new(Selector::new().eq("type", "game"))).await?;
    assert_eq!(before.documents, after.documents);
    assert_eq!(store.like_count(&g1), likes_before);
    assert!(store.latest_comment(&g1).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn collections_are_isolated_by_name() -> Result<()> {
    let engine = SledStorageEngine::new_test()?;
    let games = DocumentStore::open(&engine, CollectionId::new("games")).await?;
    let other = DocumentStore::open(&engine, CollectionId::new("other")).await?;

    let g1 = DocumentId::new("G1");
    games.put(&g1, game("Chess", "FIDE", 1475), None).await?;

    assert!(games.get(&g1).await.is_ok());
    assert!(other.get(&g1).await.is_err());
    assert_ne!(games.id(), other.id());
    Ok(())
}
