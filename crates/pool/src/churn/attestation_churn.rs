use ream_consensus::{
    attestation::Attestation,
    checkpoint::Checkpoint,
    constants::GENESIS_EPOCH,
    misc::compute_epoch_at_slot,
    primitives::{Epoch, Slot},
};
use ream_storage::BeaconTuple;
use tracing::{debug, warn};

use super::{AttestationAggregate, AttestationChurn, ChurnQueue, OffChainAggregates};

pub struct InMemoryAttestationChurn {
    queue: ChurnQueue,
    justified_checkpoint: Option<Checkpoint>,
    lower_epoch: Epoch,
    upper_epoch: Epoch,
}

impl InMemoryAttestationChurn {
    pub fn new(max_attestation_lookahead: Epoch, max_size: usize) -> Self {
        Self {
            queue: ChurnQueue::new(max_attestation_lookahead, max_size),
            justified_checkpoint: None,
            lower_epoch: GENESIS_EPOCH,
            upper_epoch: GENESIS_EPOCH,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn update_justified_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.update_epoch_boundaries(checkpoint.epoch, checkpoint.epoch.max(self.upper_epoch));
        self.justified_checkpoint = Some(checkpoint);
    }

    /// Boundaries are only moved when at least one of them advances.
    fn update_epoch_boundaries(&mut self, lower: Epoch, upper: Epoch) {
        if lower <= self.lower_epoch && upper <= self.upper_epoch {
            return;
        }
        self.queue.update_epoch_boundaries(lower, upper);
        self.lower_epoch = lower;
        self.upper_epoch = upper.max(lower);
    }
}

impl AttestationChurn for InMemoryAttestationChurn {
    fn feed_justified_checkpoint(&mut self, checkpoint: Checkpoint) {
        // a new justified checkpoint discards attestations of abandoned forks
        if self
            .justified_checkpoint
            .map_or(true, |justified| checkpoint.epoch > justified.epoch)
        {
            self.update_justified_checkpoint(checkpoint);
        }
    }

    fn feed_finalized_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.update_justified_checkpoint(checkpoint);
    }

    fn feed_new_slot(&mut self, slot: Slot) {
        let epoch = compute_epoch_at_slot(slot);
        self.update_epoch_boundaries(epoch.saturating_sub(1), epoch);
    }

    fn add(&mut self, attestations: Vec<Attestation>) {
        self.queue.add(attestations);
    }

    fn compute(&mut self, tuple: &BeaconTuple) -> OffChainAggregates {
        let state = &tuple.state;
        self.update_epoch_boundaries(state.get_previous_epoch(), state.get_current_epoch());

        let mut off_chain = OffChainAggregates {
            head_root: tuple.root(),
            slot: state.slot,
            aggregates: vec![],
        };
        if self.queue.is_empty() {
            return off_chain;
        }

        let coverage = state.get_included_participation();
        let mut candidates = self
            .queue
            .iter()
            .filter(|attestation| {
                coverage.get(&attestation.data).map_or(true, |bits| {
                    bits.intersection(&attestation.aggregation_bits).is_zero()
                })
            })
            .collect::<Vec<_>>();
        candidates.sort_by_key(|attestation| {
            (attestation.data.target.epoch, attestation.data.slot)
        });

        let mut includable_state = state.clone();
        let mut aggregates: Vec<AttestationAggregate> = vec![];
        for attestation in candidates {
            if let Err(err) = includable_state.process_attestation(attestation, false) {
                debug!(slot = attestation.data.slot, "Attestation can not be included: {err}");
                continue;
            }
            match aggregates
                .iter_mut()
                .find(|aggregate| aggregate.can_add(attestation))
            {
                Some(aggregate) => {
                    aggregate.add(attestation);
                }
                None => aggregates.push(AttestationAggregate::new(attestation)),
            }
        }

        for aggregate in aggregates {
            match aggregate.to_attestation() {
                Ok(attestation) => off_chain.aggregates.push(attestation),
                Err(err) => warn!(slot = aggregate.data().slot, "Failed to aggregate: {err}"),
            }
        }
        off_chain
    }

    fn is_initialized(&self) -> bool {
        true
    }
}
