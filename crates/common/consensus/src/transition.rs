use crate::{phase0::beacon_state::BeaconState, primitives::Slot};

/// Advances a state through slots that carry no block.
pub trait EmptySlotTransition: Send + Sync {
    /// Return a copy of ``state`` advanced to ``slot``. A state already at or past ``slot`` is
    /// returned unchanged.
    fn apply(&self, state: &BeaconState, slot: Slot) -> anyhow::Result<BeaconState>;
}

/// Empty slot transition backed by [`BeaconState::process_slots`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSlotsTransition;

impl EmptySlotTransition for ProcessSlotsTransition {
    fn apply(&self, state: &BeaconState, slot: Slot) -> anyhow::Result<BeaconState> {
        let mut state = state.clone();
        if state.slot < slot {
            state.process_slots(slot)?;
        }
        Ok(state)
    }
}
