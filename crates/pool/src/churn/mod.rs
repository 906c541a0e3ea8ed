pub mod aggregate;
pub mod attestation_churn;
pub mod queue;

use alloy_primitives::B256;
use ream_consensus::{attestation::Attestation, checkpoint::Checkpoint, primitives::Slot};
use ream_storage::BeaconTuple;

pub use self::{
    aggregate::AttestationAggregate, attestation_churn::InMemoryAttestationChurn,
    queue::ChurnQueue,
};

/// Aggregates of verified attestations not yet included on the chain of ``head_root``, computed
/// against its state at ``slot``.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OffChainAggregates {
    pub head_root: B256,
    pub slot: Slot,
    pub aggregates: Vec<Attestation>,
}

impl OffChainAggregates {
    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }
}

/// Keeps verified attestations and turns them into aggregates for the chain head.
pub trait AttestationChurn: Send {
    fn feed_justified_checkpoint(&mut self, checkpoint: Checkpoint);

    fn feed_finalized_checkpoint(&mut self, checkpoint: Checkpoint);

    fn feed_new_slot(&mut self, slot: Slot);

    fn add(&mut self, attestations: Vec<Attestation>);

    /// Aggregate the attestations that could still be included on top of ``tuple``.
    fn compute(&mut self, tuple: &BeaconTuple) -> OffChainAggregates;

    fn is_initialized(&self) -> bool;
}
