use ream_consensus::{
    attestation::Attestation,
    checkpoint::Checkpoint,
    misc::compute_start_slot_at_epoch,
    primitives::Slot,
};

/// Accepts attestations whose target lies in a window around the chain's present.
///
/// The window spans from the finalized epoch start minus the lookahead up to the current slot
/// plus the lookahead, both ends inclusive.
#[derive(Debug)]
pub struct TimeFrameFilter {
    lookahead_slots: u64,
    finalized_checkpoint: Option<Checkpoint>,
    current_slot: Option<Slot>,
}

impl TimeFrameFilter {
    pub fn new(lookahead_slots: u64) -> Self {
        Self {
            lookahead_slots,
            finalized_checkpoint: None,
            current_slot: None,
        }
    }

    pub fn feed_finalized_checkpoint(&mut self, checkpoint: Checkpoint) {
        match self.finalized_checkpoint {
            Some(finalized) if finalized.epoch >= checkpoint.epoch => {}
            _ => self.finalized_checkpoint = Some(checkpoint),
        }
    }

    pub fn feed_new_slot(&mut self, slot: Slot) {
        self.current_slot = Some(self.current_slot.map_or(slot, |current| current.max(slot)));
    }

    pub fn is_initialized(&self) -> bool {
        self.finalized_checkpoint.is_some() && self.current_slot.is_some()
    }

    pub fn check(&self, attestation: &Attestation) -> bool {
        let (Some(finalized), Some(current_slot)) = (self.finalized_checkpoint, self.current_slot)
        else {
            return false;
        };

        let lower =
            compute_start_slot_at_epoch(finalized.epoch).saturating_sub(self.lookahead_slots);
        let upper = current_slot.saturating_add(self.lookahead_slots);
        let target_slot = compute_start_slot_at_epoch(attestation.data.target.epoch);

        lower <= target_slot && target_slot <= upper
    }
}
