use std::sync::Arc;

use ream_consensus::{
    attestation::Attestation, checkpoint::Checkpoint, phase0::beacon_block::BeaconBlock,
    primitives::{NodeId, Slot},
};
use ream_storage::BeaconTuple;

/// An attestation as it came off the wire, with the peer that sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedAttestation {
    pub sender: NodeId,
    pub message: Attestation,
}

impl ReceivedAttestation {
    pub fn new(sender: NodeId, message: Attestation) -> Self {
        Self { sender, message }
    }
}

/// Everything a pool stage consumes. Control events share the channel with attestations so that
/// their relative order survives every hop.
#[derive(Debug, Clone)]
pub enum PoolInput {
    FinalizedCheckpoint(Checkpoint),
    JustifiedCheckpoint(Checkpoint),
    NewSlot(Slot),
    Attestation(ReceivedAttestation),
    ImportedBlock(BeaconBlock),
    ChainHead(Arc<BeaconTuple>),
}

impl PoolInput {
    pub fn kind(&self) -> &'static str {
        match self {
            PoolInput::FinalizedCheckpoint(_) => "finalized_checkpoint",
            PoolInput::JustifiedCheckpoint(_) => "justified_checkpoint",
            PoolInput::NewSlot(_) => "new_slot",
            PoolInput::Attestation(_) => "attestation",
            PoolInput::ImportedBlock(_) => "imported_block",
            PoolInput::ChainHead(_) => "chain_head",
        }
    }
}

impl From<ReceivedAttestation> for PoolInput {
    fn from(attestation: ReceivedAttestation) -> Self {
        PoolInput::Attestation(attestation)
    }
}
