mod common;

use anyhow::Result;
use bytes::Bytes;
use common::*;

use ludex::proto::DocumentId;
use ludex::{MutationError, RetrievalError};

#[tokio::test]
async fn put_get_remove_attachment() -> Result<()> {
    let store = test_store().await?;
    let id = DocumentId::new("G1");
    let rev1 = store.put(&id, game("Chess", "FIDE", 1475), None).await?;

    let payload = Bytes::from_static(b"box art bytes");
    let rev2 = store.put_attachment(&id, "cover", &rev1, payload.clone(), "image/png").await?;
    assert_eq!(rev2.generation, 2);

    let attachment = store.get_attachment(&id, "cover").await?;
    assert_eq!(attachment.payload, payload);
    assert_eq!(attachment.content_type, "image/png");

    let rev3 = store.remove_attachment(&id, "cover", &rev2).await?;
    assert_eq!(rev3.generation, 3);
    assert!(matches!(
        store.get_attachment(&id, "cover").await,
        Err(RetrievalError::AttachmentNotFound { .. })
    ));

    // attachment edits advance the document revision like any other write
    let doc = store.get(&id).await?;
    assert_eq!(doc.revision, rev3);
    assert!(doc.attachments.is_empty());
    Ok(())
}

#[tokio::test]
async fn attachment_writes_respect_the_revision_gate() -> Result<()> {
    let store = test_store().await?;
    let id = DocumentId::new("G1");
    let rev1 = store.put(&id, game("Chess", "FIDE", 1475), None).await?;
    let rev2 = store.put(&id, game("Chess II", "FIDE", 1475), Some(&rev1)).await?;

    let err = store
        .put_attachment(&id, "cover", &rev1, Bytes::from_static(b"img"), "image/png")
        .await
        .unwrap_err();
    assert!(matches!(err, MutationError::Conflict { .. }));

    let err = store.remove_attachment(&id, "cover", &rev2).await.unwrap_err();
    assert!(matches!(err, MutationError::AttachmentNotFound { .. }));

    let err = store
        .put_attachment(&DocumentId::new("missing"), "cover", &rev1, Bytes::from_static(b"img"), "image/png")
        .await
        .unwrap_err();
    assert!(matches!(err, MutationError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn identical_payloads_share_one_blob() -> Result<()> {
    let store = test_store().await?;
    let payload = Bytes::from_static(b"shared artwork");

    let a = DocumentId::new("G1");
    let rev_a = store.put(&a, game("Chess", "FIDE", 1475), None).await?;
    let rev_a2 = store.put_attachment(&a, "cover", &rev_a, payload.clone(), "image/png").await?;

    let b = DocumentId::new("G2");
    let rev_b = store.put(&b, game("Go", "ed", 1612), None).await?;
    store.put_attachment(&b, "art", &rev_b, payload.clone(), "image/png").await?;

    // same content address on both bindings
    let doc_a = store.get(&a).await?;
    let doc_b = store.get(&b).await?;
    assert_eq!(doc_a.attachments["cover"].digest, doc_b.attachments["art"].digest);

    // unbinding one never breaks the other: blobs are only unbound, not deleted
    store.remove_attachment(&a, "cover", &rev_a2).await?;
    let attachment = store.get_attachment(&b, "art").await?;
    assert_eq!(attachment.payload, payload);
    Ok(())
}

#[tokio::test]
async fn attachment_lookup_on_missing_document() -> Result<()> {
    let store = test_store().await?;
    assert!(matches!(
        store.get_attachment(&DocumentId::new("nope"), "cover").await,
        Err(RetrievalError::NotFound(_))
    ));
    Ok(())
}
