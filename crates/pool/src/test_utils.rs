//! Fixtures shared by the pool tests and by crates building on top of the pool.

use alloy_primitives::{B256, U256};
use ream_consensus::{
    attestation::Attestation,
    attestation_data::AttestationData,
    checkpoint::Checkpoint,
    config::ChainSpec,
    interop::{
        attestation_data_at, build_attestation, interop_genesis, interop_private_key,
        produce_block,
    },
    primitives::{Epoch, Slot},
    signature::BlsSignature,
    transition::{EmptySlotTransition, ProcessSlotsTransition},
};
use ream_storage::{BeaconTuple, InMemoryStorage};
use ssz_types::BitList;

use crate::input::ReceivedAttestation;

/// An unsigned attestation with a single participant out of a committee of four.
pub fn attestation_with(
    slot: Slot,
    source_epoch: Epoch,
    target_epoch: Epoch,
    mutate: impl FnOnce(&mut Attestation),
) -> Attestation {
    let mut aggregation_bits = BitList::with_capacity(4).expect("valid length");
    aggregation_bits.set(0, true).expect("in range");

    let mut attestation = Attestation {
        aggregation_bits,
        data: AttestationData {
            slot,
            index: 0,
            beacon_block_root: B256::repeat_byte(0xbb),
            source: Checkpoint {
                epoch: source_epoch,
                root: B256::ZERO,
            },
            target: Checkpoint {
                epoch: target_epoch,
                root: B256::repeat_byte(0xaa),
            },
        },
        custody_bits: BitList::with_capacity(4).expect("valid length"),
        signature: BlsSignature::infinity(),
    };
    mutate(&mut attestation);
    attestation
}

pub fn received(attestation: Attestation) -> ReceivedAttestation {
    ReceivedAttestation::new(U256::from(1), attestation)
}

/// An interop chain built in memory. Nothing is stored until the caller does so.
pub struct TestChain {
    pub genesis: BeaconTuple,
}

impl TestChain {
    pub fn new(validator_count: u64) -> Self {
        let (block, state) =
            interop_genesis(validator_count, 0, &ChainSpec::dev()).expect("interop genesis");
        Self {
            genesis: BeaconTuple::new(block, state),
        }
    }

    /// Storage anchored at the genesis tuple.
    pub fn storage(&self) -> InMemoryStorage {
        InMemoryStorage::from_genesis(self.genesis.clone())
    }

    /// Build the block at ``slot`` on top of ``parent``.
    pub fn produce(
        &self,
        parent: &BeaconTuple,
        slot: Slot,
        attestations: Vec<Attestation>,
    ) -> BeaconTuple {
        let (block, state) =
            produce_block(&parent.state, slot, attestations).expect("block production");
        BeaconTuple::new(block, state)
    }

    /// A signed attestation for ``head`` at ``slot`` from the member at ``committee_position``
    /// of committee zero.
    pub fn attest(&self, head: &BeaconTuple, slot: Slot, committee_position: usize) -> Attestation {
        let state = ProcessSlotsTransition
            .apply(&head.state, slot)
            .expect("empty slot transition");
        let data = attestation_data_at(&state, head.root(), slot, 0).expect("attestation data");
        let committee = state
            .get_beacon_committee(slot, 0)
            .expect("committee zero exists");
        let key = interop_private_key(committee[committee_position]).expect("interop key");
        build_attestation(&state, data, committee_position, &key).expect("signed attestation")
    }

    /// Size of committee zero at ``slot``.
    pub fn committee_size(&self, slot: Slot) -> usize {
        self.genesis
            .state
            .get_beacon_committee(slot, 0)
            .map(|committee| committee.len())
            .unwrap_or_default()
    }
}
