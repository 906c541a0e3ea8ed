use alloy_primitives::B256;
use ream_consensus::phase0::{beacon_block::BeaconBlock, beacon_state::BeaconState};

/// A block together with its post state.
#[derive(Debug, PartialEq, Clone)]
pub struct BeaconTuple {
    pub block: BeaconBlock,
    pub state: BeaconState,
}

impl BeaconTuple {
    pub fn new(block: BeaconBlock, state: BeaconState) -> Self {
        Self { block, state }
    }

    pub fn root(&self) -> B256 {
        self.block.block_root()
    }
}
