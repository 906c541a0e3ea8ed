use std::{collections::HashMap, fmt::Debug, sync::Arc};

use alloy_primitives::B256;
use ream_consensus::{
    attestation::Attestation, attester_slashing::AttesterSlashing, primitives::Slot,
    proposer_slashing::ProposerSlashing, pubkey::PubKey, transfer::Transfer,
    voluntary_exit::SignedVoluntaryExit,
};
use ream_pool::churn::{AttestationAggregate, OffChainAggregates};
use tracing::warn;
use tree_hash::TreeHash;

/// Operations waiting to be included in a block.
pub trait PendingOperations: Send + Sync + Debug {
    fn attestations(&self) -> Vec<Attestation>;

    /// The latest pending attestation signed by ``pubkey``.
    fn find_attestation(&self, pubkey: &PubKey) -> Option<Attestation>;

    /// Up to ``max_count`` aggregates of attestations made at ``max_slot`` or earlier, oldest
    /// target first.
    fn peek_aggregated_attestations(&self, max_count: usize, max_slot: Slot) -> Vec<Attestation>;

    fn peek_proposer_slashings(&self, _max_count: usize) -> Vec<ProposerSlashing> {
        vec![]
    }

    fn peek_attester_slashings(&self, _max_count: usize) -> Vec<AttesterSlashing> {
        vec![]
    }

    fn peek_voluntary_exits(&self, _max_count: usize) -> Vec<SignedVoluntaryExit> {
        vec![]
    }

    fn peek_transfers(&self, _max_count: usize) -> Vec<Transfer> {
        vec![]
    }
}

/// Latest attestation per validator, aggregated on demand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingOperationsState {
    attestations: HashMap<PubKey, Attestation>,
}

impl PendingOperationsState {
    pub fn new(attestations: HashMap<PubKey, Attestation>) -> Self {
        Self { attestations }
    }

    /// Number of validators with a pending attestation.
    pub fn len(&self) -> usize {
        self.attestations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attestations.is_empty()
    }

    /// Distinct attestations in a stable order. An aggregate shared by several validators is
    /// listed once.
    fn distinct(&self) -> Vec<&Attestation> {
        let by_root: HashMap<B256, &Attestation> = self
            .attestations
            .values()
            .map(|attestation| (attestation.tree_hash_root(), attestation))
            .collect();
        let mut distinct = by_root.into_iter().collect::<Vec<_>>();
        distinct.sort_by_key(|(root, attestation)| {
            (
                attestation.data.target.epoch,
                attestation.data.slot,
                attestation.data.index,
                *root,
            )
        });
        distinct
            .into_iter()
            .map(|(_, attestation)| attestation)
            .collect()
    }
}

impl PendingOperations for PendingOperationsState {
    fn attestations(&self) -> Vec<Attestation> {
        self.distinct().into_iter().cloned().collect()
    }

    fn find_attestation(&self, pubkey: &PubKey) -> Option<Attestation> {
        self.attestations.get(pubkey).cloned()
    }

    fn peek_aggregated_attestations(&self, max_count: usize, max_slot: Slot) -> Vec<Attestation> {
        let mut aggregates: Vec<AttestationAggregate> = vec![];
        for attestation in self.distinct() {
            if attestation.data.slot > max_slot {
                continue;
            }
            if !aggregates.iter_mut().any(|aggregate| aggregate.add(attestation)) {
                aggregates.push(AttestationAggregate::new(attestation));
            }
        }

        aggregates
            .iter()
            .take(max_count)
            .filter_map(|aggregate| match aggregate.to_attestation() {
                Ok(attestation) => Some(attestation),
                Err(err) => {
                    warn!(slot = aggregate.data().slot, "Failed to aggregate attestations: {err}");
                    None
                }
            })
            .collect()
    }
}

/// Pending operations backed by the pool's off chain aggregates. Lookups by validator fall back
/// to the latest attestation cache.
#[derive(Debug, Clone)]
pub struct ChurnPendingOperations {
    aggregates: OffChainAggregates,
    latest: Arc<PendingOperationsState>,
}

impl ChurnPendingOperations {
    pub fn new(aggregates: OffChainAggregates, latest: Arc<PendingOperationsState>) -> Self {
        Self { aggregates, latest }
    }

    pub fn head_root(&self) -> B256 {
        self.aggregates.head_root
    }
}

impl PendingOperations for ChurnPendingOperations {
    fn attestations(&self) -> Vec<Attestation> {
        self.aggregates.aggregates.clone()
    }

    fn find_attestation(&self, pubkey: &PubKey) -> Option<Attestation> {
        self.latest.find_attestation(pubkey)
    }

    fn peek_aggregated_attestations(&self, max_count: usize, max_slot: Slot) -> Vec<Attestation> {
        self.aggregates
            .aggregates
            .iter()
            .filter(|attestation| attestation.data.slot <= max_slot)
            .take(max_count)
            .cloned()
            .collect()
    }
}
