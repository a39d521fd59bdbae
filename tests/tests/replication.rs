mod common;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ludex::proto::{Attachment, ChangeBatch, CheckpointToken, DocumentId, DocumentState, Revision, StoreId};
use ludex::{DocumentStore, RemotePeer, ReplicationError, Replicator, TransportError};
use ludex_connector_local_process::LocalProcessPeer;

fn replicator(local: &Arc<DocumentStore>, remote: &Arc<DocumentStore>) -> Replicator {
    Replicator::new(local.clone(), Arc::new(LocalProcessPeer::new(remote.clone())))
}

#[tokio::test]
async fn bidirectional_convergence() -> Result<()> {
    let a = test_store().await?;
    let b = test_store().await?;

    let g1 = DocumentId::new("G1");
    let g2 = DocumentId::new("G2");
    a.put(&g1, game("Chess", "FIDE", 1475), None).await?;
    b.put(&g2, game("Go", "Nihon Ki-in", 1612), None).await?;

    let a_to_b = replicator(&a, &b);
    let report = a_to_b.sync().await?;
    assert_eq!(report.docs_pulled, 1);
    assert_eq!(report.docs_pushed, 1);

    // both stores now hold both documents with identical revisions
    for id in [&g1, &g2] {
        assert_eq!(a.get(id).await?.revision, b.get(id).await?.revision);
    }

    // a second run transfers nothing: convergence is idempotent
    let report = a_to_b.sync().await?;
    assert_eq!(report.docs_pulled, 0);

    // and the reverse direction finds nothing new either
    let b_to_a = replicator(&b, &a);
    let report = b_to_a.sync().await?;
    assert_eq!(report.docs_pulled, 0);
    assert_eq!(report.conflicts_recorded, 0);
    Ok(())
}

#[tokio::test]
async fn tombstones_propagate() -> Result<()> {
    let a = test_store().await?;
    let b = test_store().await?;

    let g1 = DocumentId::new("G1");
    let rev = a.put(&g1, game("Chess", "FIDE", 1475), None).await?;
    replicator(&a, &b).sync().await?;
    assert!(b.get(&g1).await.is_ok());

    a.remove(&g1, &rev).await?;
    replicator(&a, &b).sync().await?;
    assert!(b.get(&g1).await.is_err());
    Ok(())
}

#[tokio::test]
async fn divergent_edits_resolve_identically_on_both_stores() -> Result<()> {
    let a = test_store().await?;
    let b = test_store().await?;

    // store A creates G2 at generation 1 and replicates it to B
    let g2 = DocumentId::new("G2");
    let rev1 = a.put(&g2, game("Shogi", "ed", 1600), None).await?;
    replicator(&a, &b).sync().await?;

    // both sides edit their copy independently to generation 2
    let rev_a = a.put(&g2, game("Shogi: A's Edit", "ed", 1600), Some(&rev1)).await?;
    let rev_b = b.put(&g2, game("Shogi: B's Edit", "ed", 1600), Some(&rev1)).await?;
    assert_eq!(rev_a.generation, 2);
    assert_eq!(rev_b.generation, 2);
    assert_ne!(rev_a, rev_b);

    // bidirectional replication
    replicator(&a, &b).sync().await?;
    replicator(&b, &a).sync().await?;

    // both stores report the same winning body
    let doc_a = a.get(&g2).await?;
    let doc_b = b.get(&g2).await?;
    assert_eq!(doc_a.revision, doc_b.revision);
    assert_eq!(doc_a.body, doc_b.body);

    // the winner is whichever revision the deterministic policy orders higher
    let expected_winner = if rev_a > rev_b { rev_a.clone() } else { rev_b.clone() };
    let expected_loser = if rev_a > rev_b { rev_b.clone() } else { rev_a.clone() };
    assert_eq!(doc_a.revision, expected_winner);

    // the loser is retained on both sides, never silently discarded
    for store in [&a, &b] {
        let (_, conflicts) = store.get_with_conflicts(&g2).await?;
        let revisions: Vec<Revision> = conflicts.iter().map(|c| c.revision.clone()).collect();
        assert_eq!(revisions, vec![expected_loser.clone()]);
    }
    Ok(())
}

#[tokio::test]
async fn cascade_delete_replicates() -> Result<()> {
    let a = test_store().await?;
    let b = test_store().await?;

    let g1 = DocumentId::new("G1");
    let rev = a.put(&g1, game("Chess", "FIDE", 1475), None).await?;
    let c1 = DocumentId::new("C1");
    a.put(&c1, comment(&g1, "brilliant", at(10, 0)), None).await?;
    let l1 = DocumentId::new("L1");
    a.put(&l1, like(&g1, at(10, 5)), None).await?;

    replicator(&a, &b).sync().await?;
    assert_eq!(b.like_count(&g1), 1);

    a.remove_game_cascade(&g1, &rev).await?;
    replicator(&a, &b).sync().await?;

    for id in [&g1, &c1, &l1] {
        assert!(b.get(id).await.is_err());
    }
    assert_eq!(b.like_count(&g1), 0);
    Ok(())
}

#[tokio::test]
async fn offline_flag_short_circuits() -> Result<()> {
    let a = test_store().await?;
    let b = test_store().await?;
    a.put(&DocumentId::new("G1"), game("Chess", "FIDE", 1475), None).await?;

    let sync = replicator(&a, &b);
    sync.set_offline(true);
    assert!(matches!(sync.sync().await, Err(ReplicationError::Offline)));
    assert!(b.get(&DocumentId::new("G1")).await.is_err());

    sync.set_offline(false);
    sync.sync().await?;
    assert!(b.get(&DocumentId::new("G1")).await.is_ok());
    Ok(())
}

/// A peer that fails every request until `failures` runs out, then delegates.
struct FlakyPeer {
    inner: LocalProcessPeer,
    failures: AtomicUsize,
}

impl FlakyPeer {
    fn new(store: Arc<DocumentStore>, failures: usize) -> Self {
        Self { inner: LocalProcessPeer::new(store), failures: AtomicUsize::new(failures) }
    }

    fn trip(&self) -> Result<(), TransportError> {
        if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
            Err(TransportError::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemotePeer for FlakyPeer {
    async fn store_id(&self) -> Result<StoreId, TransportError> { self.inner.store_id().await }

    async fn changes_since(&self, since: CheckpointToken, limit: u32) -> Result<ChangeBatch, TransportError> {
        self.trip()?;
        self.inner.changes_since(since, limit).await
    }

    async fn bulk_get(&self, requests: Vec<(DocumentId, Revision)>) -> Result<Vec<DocumentState>, TransportError> {
        self.trip()?;
        self.inner.bulk_get(requests).await
    }

    async fn bulk_put(&self, documents: Vec<DocumentState>) -> Result<(), TransportError> {
        self.trip()?;
        self.inner.bulk_put(documents).await
    }

    async fn get_attachment(&self, id: &DocumentId, name: &str) -> Result<Attachment, TransportError> {
        self.trip()?;
        self.inner.get_attachment(id, name).await
    }

    async fn put_attachment(&self, id: &DocumentId, name: &str, content_type: &str, payload: Bytes) -> Result<(), TransportError> {
        self.trip()?;
        self.inner.put_attachment(id, name, content_type, payload).await
    }
}

#[tokio::test]
async fn transient_transport_errors_are_retried_within_the_batch() -> Result<()> {
    let a = test_store().await?;
    let b = test_store().await?;
    b.put(&DocumentId::new("G1"), game("Chess", "FIDE", 1475), None).await?;

    // two failures fit inside the default retry budget of three
    let peer = Arc::new(FlakyPeer::new(b.clone(), 2));
    let sync = Replicator::new(a.clone(), peer);
    let report = sync.sync().await?;
    assert_eq!(report.docs_pulled, 1);
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_abort_without_advancing_the_checkpoint() -> Result<()> {
    let a = test_store().await?;
    let b = test_store().await?;
    b.put(&DocumentId::new("G1"), game("Chess", "FIDE", 1475), None).await?;

    // enough failures to exhaust every retry in the run
    let peer = Arc::new(FlakyPeer::new(b.clone(), 100));
    let sync = Replicator::new(a.clone(), peer);
    let err = sync.sync().await.unwrap_err();
    assert!(matches!(err, ReplicationError::Transport { .. }));
    assert!(a.get(&DocumentId::new("G1")).await.is_err());

    // the prior convergent state is intact: a healthy retry starts from
    // scratch and pulls everything
    let report = replicator(&a, &b).sync().await?;
    assert_eq!(report.docs_pulled, 1);
    assert!(a.get(&DocumentId::new("G1")).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn attachments_replicate_with_their_documents() -> Result<()> {
    let a = test_store().await?;
    let b = test_store().await?;

    let g1 = DocumentId::new("G1");
    let rev = a.put(&g1, game("Chess", "FIDE", 1475), None).await?;
    let payload = Bytes::from_static(b"box art");
    a.put_attachment(&g1, "cover", &rev, payload.clone(), "image/png").await?;

    let report = replicator(&a, &b).sync().await?;
    assert!(report.attachments_transferred >= 1);

    let attachment = b.get_attachment(&g1, "cover").await?;
    assert_eq!(attachment.payload, payload);
    assert_eq!(attachment.content_type, "image/png");
    Ok(())
}
