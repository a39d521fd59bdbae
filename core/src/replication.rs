//! Bidirectional replication against a remote peer.
//!
//! A run executes once to completion (or failure) per invocation: pull fully
//! completes, then push. Each direction walks the source's change feed in
//! batches from the last per-peer checkpoint, transfers missing documents and
//! their attachment blobs, funnels divergent revisions through the conflict
//! resolver, and advances the checkpoint only after the batch has committed.
//! A transport failure is retried a bounded number of times within the batch,
//! then the run aborts with the prior checkpoint intact, so the next manual
//! trigger resumes from the last known-good position. The offline flag
//! short-circuits invocation and cancels cooperatively between batches,
//! never mid-batch.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::connector::RemotePeer;
use crate::error::{ReplicationError, StorageError, TransportError};
use crate::store::{ApplyOutcome, DocumentStore};
use ludex_proto::{CheckpointToken, DocumentState, StoreId};

/// Where a replication run currently is. `Failed` is sticky until the next
/// invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationPhase {
    Idle,
    Diffing,
    Transferring,
    Resolving,
    Checkpointing,
    Failed,
}

impl fmt::Display for ReplicationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplicationPhase::Idle => "idle",
            ReplicationPhase::Diffing => "diffing",
            ReplicationPhase::Transferring => "transferring",
            ReplicationPhase::Resolving => "resolving",
            ReplicationPhase::Checkpointing => "checkpointing",
            ReplicationPhase::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct ReplicationOptions {
    /// Change-feed entries transferred per batch.
    pub batch_size: usize,
    /// Transport retries per batch before the run aborts.
    pub batch_retries: usize,
}

impl Default for ReplicationOptions {
    fn default() -> Self { Self { batch_size: 100, batch_retries: 3 } }
}

/// Summary of one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationReport {
    pub docs_pulled: usize,
    pub docs_pushed: usize,
    pub conflicts_recorded: usize,
    pub attachments_transferred: usize,
    pub pull_checkpoint: CheckpointToken,
    pub push_checkpoint: CheckpointToken,
}

pub struct Replicator {
    store: Arc<DocumentStore>,
    peer: Arc<dyn RemotePeer>,
    options: ReplicationOptions,
    offline: AtomicBool,
    phase: Mutex<ReplicationPhase>,
}

impl Replicator {
    pub fn new(store: Arc<DocumentStore>, peer: Arc<dyn RemotePeer>) -> Self {
        Self::with_options(store, peer, ReplicationOptions::default())
    }

    pub fn with_options(store: Arc<DocumentStore>, peer: Arc<dyn RemotePeer>, options: ReplicationOptions) -> Self {
        Self { store, peer, options, offline: AtomicBool::new(false), phase: Mutex::new(ReplicationPhase::Idle) }
    }

    pub fn set_offline(&self, offline: bool) { self.offline.store(offline, Ordering::Release); }

    pub fn is_offline(&self) -> bool { self.offline.load(Ordering::Acquire) }

    pub fn phase(&self) -> ReplicationPhase { *self.phase.lock().unwrap() }

    fn set_phase(&self, phase: ReplicationPhase) {
        debug!(phase = %phase, "replication phase");
        *self.phase.lock().unwrap() = phase;
    }

    /// Execute one full run: pull, then push. Returns the report on success;
    /// on failure the prior convergent state is intact and the next
    /// invocation retries from the last known-good checkpoints.
    pub async fn sync(&self) -> Result<ReplicationReport, ReplicationError> {
        if self.is_offline() {
            return Err(ReplicationError::Offline);
        }
        let mut report = ReplicationReport::default();
        let result = self.run(&mut report).await;
        match result {
            Ok(()) => {
                self.set_phase(ReplicationPhase::Idle);
                info!(
                    pulled = report.docs_pulled,
                    pushed = report.docs_pushed,
                    conflicts = report.conflicts_recorded,
                    "replication run complete"
                );
                Ok(report)
            }
            Err(e) => {
                self.set_phase(ReplicationPhase::Failed);
                warn!(error = %e, "replication run aborted");
                Err(e)
            }
        }
    }

    async fn run(&self, report: &mut ReplicationReport) -> Result<(), ReplicationError> {
        let peer_id = self
            .peer
            .store_id()
            .await
            .map_err(|source| ReplicationError::Transport { phase: ReplicationPhase::Diffing, source })?;
        self.pull(peer_id, report).await?;
        self.push(peer_id, report).await?;
        Ok(())
    }

    async fn pull(&self, peer_id: StoreId, report: &mut ReplicationReport) -> Result<(), ReplicationError> {
        let key = format!("pull:{}", peer_id.as_string());
        let mut checkpoint = self.store.storage().get_checkpoint(&key).await?.unwrap_or(CheckpointToken::ZERO);
        report.pull_checkpoint = checkpoint;

        loop {
            if self.is_offline() {
                debug!("pull cancelled at batch boundary");
                return Ok(());
            }

            self.set_phase(ReplicationPhase::Diffing);
            let batch = self
                .with_retry(ReplicationPhase::Diffing, || {
                    self.peer.changes_since(checkpoint, self.options.batch_size as u32)
                })
                .await?;

            let mut missing = Vec::new();
            for entry in &batch.entries {
                let known = match self.store.load(&entry.id).await? {
                    Some(state) => state.knows_revision(&entry.revision),
                    None => false,
                };
                if !known {
                    missing.push((entry.id.clone(), entry.revision.clone()));
                }
            }

            if !missing.is_empty() {
                self.set_phase(ReplicationPhase::Transferring);
                let documents = self
                    .with_retry(ReplicationPhase::Transferring, || self.peer.bulk_get(missing.clone()))
                    .await?;
                for state in &documents {
                    self.fetch_attachments(state, report).await?;
                }

                self.set_phase(ReplicationPhase::Resolving);
                for state in documents {
                    match self.store.apply_replicated(state).await? {
                        ApplyOutcome::Applied => report.docs_pulled += 1,
                        ApplyOutcome::ConflictRecorded { .. } => {
                            report.docs_pulled += 1;
                            report.conflicts_recorded += 1;
                        }
                        ApplyOutcome::AlreadyKnown | ApplyOutcome::Ignored => {}
                    }
                }
            }

            self.set_phase(ReplicationPhase::Checkpointing);
            checkpoint = batch.last_seq;
            self.store.storage().set_checkpoint(&key, checkpoint).await?;
            report.pull_checkpoint = checkpoint;

            if !batch.pending {
                return Ok(());
            }
        }
    }

    /// Pull the payloads the incoming state references and we do not hold.
    async fn fetch_attachments(&self, state: &DocumentState, report: &mut ReplicationReport) -> Result<(), ReplicationError> {
        for (name, meta) in &state.current.attachments {
            if self.store.storage().has_blob(&meta.digest).await? {
                continue;
            }
            let attachment = self
                .with_retry(ReplicationPhase::Transferring, || self.peer.get_attachment(&state.id, name))
                .await?;
            let digest = ludex_proto::BlobDigest::of(&attachment.payload);
            if digest != meta.digest {
                return Err(ReplicationError::Transport {
                    phase: ReplicationPhase::Transferring,
                    source: TransportError::Codec(format!("attachment {}/{} digest mismatch", state.id, name)),
                });
            }
            self.store.storage().put_blob(&digest, attachment.payload).await?;
            report.attachments_transferred += 1;
        }
        Ok(())
    }

    async fn push(&self, peer_id: StoreId, report: &mut ReplicationReport) -> Result<(), ReplicationError> {
        let key = format!("push:{}", peer_id.as_string());
        let mut checkpoint = self.store.storage().get_checkpoint(&key).await?.unwrap_or(CheckpointToken::ZERO);
        report.push_checkpoint = checkpoint;

        loop {
            if self.is_offline() {
                debug!("push cancelled at batch boundary");
                return Ok(());
            }

            self.set_phase(ReplicationPhase::Diffing);
            let batch = self.store.changes_since(checkpoint, self.options.batch_size).await?;

            if !batch.entries.is_empty() {
                let mut documents = Vec::with_capacity(batch.entries.len());
                for entry in &batch.entries {
                    match self.store.load(&entry.id).await? {
                        Some(state) => documents.push(state),
                        // The feed is compacted per id, so this only happens if
                        // storage lost the document out from under us.
                        None => return Err(ReplicationError::Storage(StorageError::DocumentNotFound(entry.id.clone()))),
                    }
                }

                self.set_phase(ReplicationPhase::Transferring);
                for state in &documents {
                    for (name, meta) in &state.current.attachments {
                        let payload = self.store.storage().get_blob(&meta.digest).await?;
                        self.with_retry(ReplicationPhase::Transferring, || {
                            self.peer.put_attachment(&state.id, name, &meta.content_type, payload.clone())
                        })
                        .await?;
                        report.attachments_transferred += 1;
                    }
                }
                let pushed = documents.len();
                self.with_retry(ReplicationPhase::Transferring, || self.peer.bulk_put(documents.clone())).await?;
                report.docs_pushed += pushed;
            }

            self.set_phase(ReplicationPhase::Checkpointing);
            checkpoint = batch.last_seq;
            self.store.storage().set_checkpoint(&key, checkpoint).await?;
            report.push_checkpoint = checkpoint;

            if !batch.pending {
                return Ok(());
            }
        }
    }

    async fn with_retry<T, F, Fut>(&self, phase: ReplicationPhase, mut op: F) -> Result<T, ReplicationError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, TransportError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(source) => {
                    attempt += 1;
                    if attempt > self.options.batch_retries {
                        return Err(ReplicationError::Transport { phase, source });
                    }
                    warn!(attempt, error = %source, "transport error, retrying batch");
                    sleep(Duration::from_millis(50 * attempt as u64)).await;
                }
            }
        }
    }
}
