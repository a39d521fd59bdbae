mod common;

use anyhow::Result;
use common::*;

use ludex::proto::DocumentId;
use ludex::{MutationError, Pagination, RetrievalError};

#[tokio::test]
async fn lifecycle_put_get_update_remove() -> Result<()> {
    let store = test_store().await?;
    let id = DocumentId::new("G1");

    let rev1 = store.put(&id, game("Chess", "FIDE", 1475), None).await?;
    assert_eq!(rev1.generation, 1);

    let doc = store.get(&id).await?;
    assert_eq!(doc.revision, rev1);

    let rev2 = store.put(&id, game("Chess Deluxe", "FIDE", 1475), Some(&rev1)).await?;
    assert_eq!(rev2.generation, 2);
    let doc = store.get(&id).await?;
    assert_eq!(doc.revision, rev2);

    let rev3 = store.remove(&id, &rev2).await?;
    assert_eq!(rev3.generation, 3);
    assert!(matches!(store.get(&id).await, Err(RetrievalError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn stale_parent_always_conflicts() -> Result<()> {
    let store = test_store().await?;
    let id = DocumentId::new("G1");

    let rev1 = store.put(&id, game("Chess", "FIDE", 1475), None).await?;
    let rev2 = store.put(&id, game("Chess II", "FIDE", 1475), Some(&rev1)).await?;

    // the first writer's revision is stale now
    let err = store.put(&id, game("Chess III", "FIDE", 1475), Some(&rev1)).await.unwrap_err();
    assert!(matches!(err, MutationError::Conflict { .. }));

    // the losing writer never overwrote anything
    let doc = store.get(&id).await?;
    assert_eq!(doc.revision, rev2);

    // a put with no parent against an existing id conflicts too
    let err = store.put(&id, game("Chess IV", "FIDE", 1475), None).await.unwrap_err();
    assert!(matches!(err, MutationError::Conflict { .. }));

    // as does a remove naming a stale parent
    let err = store.remove(&id, &rev1).await.unwrap_err();
    assert!(matches!(err, MutationError::Conflict { .. }));
    Ok(())
}

#[tokio::test]
async fn tombstones_are_permanent() -> Result<()> {
    let store = test_store().await?;
    let id = DocumentId::new("G1");

    let rev1 = store.put(&id, game("Chess", "FIDE", 1475), None).await?;
    let rev2 = store.remove(&id, &rev1).await?;

    // no resurrection, whatever parent the caller names
    for parent in [None, Some(&rev1), Some(&rev2)] {
        let err = store.put(&id, game("Chess Reborn", "FIDE", 2024), parent).await.unwrap_err();
        assert!(matches!(err, MutationError::Conflict { .. }));
    }

    // removing an already-deleted id reads as absent
    assert!(matches!(store.remove(&id, &rev2).await, Err(MutationError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn validation_rejects_empty_required_fields() -> Result<()> {
    let store = test_store().await?;
    let id = DocumentId::new("G1");

    let err = store.put(&id, game("", "FIDE", 1475), None).await.unwrap_err();
    assert!(matches!(err, MutationError::InvalidDocument(_)));

    let err = store.put(&id, comment(&DocumentId::new(""), "nice", at(10, 0)), None).await.unwrap_err();
    assert!(matches!(err, MutationError::InvalidDocument(_)));

    let err = store.put(&id, comment(&DocumentId::new("G1"), "   ", at(10, 0)), None).await.unwrap_err();
    assert!(matches!(err, MutationError::InvalidDocument(_)));

    // nothing was written
    assert!(matches!(store.get(&id).await, Err(RetrievalError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn list_all_is_ordered_paginated_and_excludes_tombstones() -> Result<()> {
    let store = test_store().await?;
    for name in ["e", "a", "c", "b", "d"] {
        store.put(&DocumentId::new(name), game(name, "ed", 2000), None).await?;
    }
    let doomed = store.get(&DocumentId::new("c")).await?;
    store.remove(&DocumentId::new("c"), &doomed.revision).await?;

    let page = store.list_all(Pagination::new(3, 0)).await?;
    let ids: Vec<_> = page.documents.iter().map(|d| d.id.as_str().to_string()).collect();
    assert_eq!(ids, vec!["a", "b", "d"]);
    assert!(page.more);

    let page = store.list_all(Pagination::new(3, 3)).await?;
    let ids: Vec<_> = page.documents.iter().map(|d| d.id.as_str().to_string()).collect();
    assert_eq!(ids, vec!["e"]);
    assert!(!page.more);

    // beyond the end: empty, no more
    let page = store.list_all(Pagination::new(3, 10)).await?;
    assert!(page.documents.is_empty());
    assert!(!page.more);
    Ok(())
}

#[tokio::test]
async fn attachments_ride_along_with_document_updates() -> Result<()> {
    let store = test_store().await?;
    let id = DocumentId::new("G1");
    let rev1 = store.put(&id, game("Chess", "FIDE", 1475), None).await?;
    let rev2 = store
        .put_attachment(&id, "cover", &rev1, bytes::Bytes::from_static(b"img"), "image/png")
        .await?;

    // a body edit keeps the attachment binding
    let rev3 = store.put(&id, game("Chess II", "FIDE", 1475), Some(&rev2)).await?;
    let doc = store.get(&id).await?;
    assert_eq!(doc.revision, rev3);
    assert!(doc.attachments.contains_key("cover"));
    Ok(())
}
