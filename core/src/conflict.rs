//! Deterministic conflict resolution.
//!
//! Replication may surface two revisions of the same id whose histories
//! diverged. Every replica must pick the same winner without coordination, so
//! the policy is a pure function of the revisions themselves: higher
//! generation wins, digest bytes break ties. The loser is retained as a
//! recorded conflict, never discarded.

use ludex_proto::{DocumentState, VersionedDocument};

/// Causal relationship between a locally stored state and an incoming
/// replicated state for the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lineage {
    /// Same current revision on both sides.
    Equal,
    /// The local current revision appears in the incoming ancestry: the
    /// incoming state is a fast-forward.
    IncomingDescends,
    /// The incoming revision is already part of local history.
    IncomingAncestor,
    /// Neither is an ancestor of the other.
    Divergent,
}

pub fn classify(local: &DocumentState, incoming: &DocumentState) -> Lineage {
    if local.current.revision == incoming.current.revision {
        Lineage::Equal
    } else if incoming.ancestry.contains(&local.current.revision) {
        Lineage::IncomingDescends
    } else if local.knows_revision(&incoming.current.revision) {
        Lineage::IncomingAncestor
    } else {
        Lineage::Divergent
    }
}

/// Pick the winner between two divergent versions. Total order on revisions
/// (generation, then digest) makes this symmetric: both replicas agree.
pub fn wins_over(a: &VersionedDocument, b: &VersionedDocument) -> bool { a.revision > b.revision }
