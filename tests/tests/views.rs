mod common;

use anyhow::Result;
use common::*;

use ludex::proto::{DocumentBody, DocumentId};

#[tokio::test]
async fn like_count_follows_like_documents() -> Result<()> {
    let store = test_store().await?;
    let g1 = DocumentId::new("G1");
    store.put(&g1, game("Chess", "FIDE", 1475), None).await?;

    assert_eq!(store.like_count(&g1), 0);

    let (l1, _) = store.create(like(&g1, at(9, 0))).await?;
    store.create(like(&g1, at(9, 30))).await?;
    assert_eq!(store.like_count(&g1), 2);

    // deleting one like document drops the count; the view is derived, so
    // nothing needs recomputing beyond the index itself
    let doc = store.get(&l1).await?;
    store.remove(&l1, &doc.revision).await?;
    assert_eq!(store.like_count(&g1), 1);
    Ok(())
}

#[tokio::test]
async fn latest_comment_tracks_created_at() -> Result<()> {
    let store = test_store().await?;
    let g1 = DocumentId::new("G1");
    store.put(&g1, game("Chess", "FIDE", 1475), None).await?;

    assert!(store.latest_comment(&g1).await?.is_none());

    store.create(comment(&g1, "first", at(8, 0))).await?;
    let (newest, _) = store.create(comment(&g1, "latest", at(12, 0))).await?;
    store.create(comment(&g1, "middle", at(10, 0))).await?;

    let latest = store.latest_comment(&g1).await?.expect("a comment exists");
    assert_eq!(latest.id, newest);
    match &latest.body {
        DocumentBody::Comment { text, .. } => assert_eq!(text, "latest"),
        _ => panic!("expected a comment"),
    }

    // views are per-game
    let g2 = DocumentId::new("G2");
    store.put(&g2, game("Go", "ed", 1612), None).await?;
    assert!(store.latest_comment(&g2).await?.is_none());
    assert_eq!(store.like_count(&g2), 0);
    Ok(())
}

#[tokio::test]
async fn removing_the_latest_comment_falls_back_to_the_previous_one() -> Result<()> {
    let store = test_store().await?;
    let g1 = DocumentId::new("G1");
    store.put(&g1, game("Chess", "FIDE", 1475), None).await?;

    store.create(comment(&g1, "older", at(8, 0))).await?;
    let (newest, rev) = store.create(comment(&g1, "newest", at(12, 0))).await?;
    store.remove(&newest, &rev).await?;

    let latest = store.latest_comment(&g1).await?.expect("a comment remains");
    match &latest.body {
        DocumentBody::Comment { text, .. } => assert_eq!(text, "older"),
        _ => panic!("expected a comment"),
    }
    Ok(())
}
