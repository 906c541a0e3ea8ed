//! Deterministic genesis and validator keys for local networks and tests.

use alloy_primitives::B256;
use anyhow::{anyhow, ensure};
use ethereum_hashing::hash_fixed;
use ssz_types::{BitList, BitVector, FixedVector, VariableList};
use tree_hash::TreeHash;

use crate::{
    attestation::Attestation,
    attestation_data::AttestationData,
    beacon_block_header::BeaconBlockHeader,
    bls::PrivateKey,
    checkpoint::Checkpoint,
    config::ChainSpec,
    constants::{
        DOMAIN_BEACON_ATTESTER, FAR_FUTURE_EPOCH, GENESIS_EPOCH, GENESIS_SLOT,
        MAX_EFFECTIVE_BALANCE,
    },
    fork::Fork,
    misc::{compute_epoch_at_slot, compute_signing_root, compute_start_slot_at_epoch},
    phase0::{
        beacon_block::BeaconBlock, beacon_block_body::BeaconBlockBody, beacon_state::BeaconState,
    },
    primitives::{CommitteeIndex, Slot, ValidatorIndex},
    validator::Validator,
};

/// Stand-in for the eth1 block hash genesis would be triggered from.
pub const INTEROP_ETH1_BLOCK_HASH: B256 = B256::repeat_byte(0x42);

/// Return the signing key of interop validator ``index``.
pub fn interop_private_key(index: ValidatorIndex) -> anyhow::Result<PrivateKey> {
    let mut ikm = [0u8; 32];
    ikm[..8].copy_from_slice(&index.to_le_bytes());
    PrivateKey::from_ikm(&hash_fixed(&ikm))
}

/// Build a genesis block and state with ``validator_count`` validators active from genesis.
pub fn interop_genesis(
    validator_count: u64,
    genesis_time: u64,
    spec: &ChainSpec,
) -> anyhow::Result<(BeaconBlock, BeaconState)> {
    ensure!(validator_count > 0, "Interop genesis needs at least one validator");

    let validators = (0..validator_count)
        .map(|index| {
            let pubkey = interop_private_key(index)?.public_key();
            let mut withdrawal_credentials = B256::from(hash_fixed(&pubkey.inner));
            withdrawal_credentials[0] = 0;
            Ok(Validator {
                pubkey,
                withdrawal_credentials,
                effective_balance: MAX_EFFECTIVE_BALANCE,
                slashed: false,
                activation_eligibility_epoch: GENESIS_EPOCH,
                activation_epoch: GENESIS_EPOCH,
                exit_epoch: FAR_FUTURE_EPOCH,
                withdrawable_epoch: FAR_FUTURE_EPOCH,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let validators = VariableList::new(validators)
        .map_err(|err| anyhow!("Too many genesis validators: {err:?}"))?;
    let balances = VariableList::new(vec![MAX_EFFECTIVE_BALANCE; validator_count as usize])
        .map_err(|err| anyhow!("Too many genesis balances: {err:?}"))?;

    let state = BeaconState {
        genesis_time,
        genesis_validators_root: validators.tree_hash_root(),
        slot: GENESIS_SLOT,
        fork: Fork {
            previous_version: spec.genesis_fork_version,
            current_version: spec.genesis_fork_version,
            epoch: GENESIS_EPOCH,
        },
        latest_block_header: BeaconBlockHeader {
            body_root: BeaconBlockBody::default().tree_hash_root(),
            ..Default::default()
        },
        block_roots: FixedVector::from_elem(B256::ZERO),
        state_roots: FixedVector::from_elem(B256::ZERO),
        validators,
        balances,
        randao_mixes: FixedVector::from_elem(INTEROP_ETH1_BLOCK_HASH),
        previous_epoch_attestations: VariableList::default(),
        current_epoch_attestations: VariableList::default(),
        justification_bits: BitVector::new(),
        previous_justified_checkpoint: Checkpoint::default(),
        current_justified_checkpoint: Checkpoint::default(),
        finalized_checkpoint: Checkpoint::default(),
    };

    let block = BeaconBlock {
        slot: GENESIS_SLOT,
        proposer_index: 0,
        parent_root: B256::ZERO,
        state_root: state.tree_hash_root(),
        body: BeaconBlockBody::default(),
    };

    Ok((block, state))
}

/// Produce the block at ``slot`` on top of ``parent_state`` carrying ``attestations``, together
/// with its post state.
pub fn produce_block(
    parent_state: &BeaconState,
    slot: Slot,
    attestations: Vec<Attestation>,
) -> anyhow::Result<(BeaconBlock, BeaconState)> {
    let mut state = parent_state.clone();
    state.process_slots(slot)?;

    let mut block = BeaconBlock {
        slot,
        proposer_index: state.get_beacon_proposer_index()?,
        parent_root: state.latest_block_header.tree_hash_root(),
        state_root: B256::ZERO,
        body: BeaconBlockBody {
            attestations: VariableList::new(attestations)
                .map_err(|err| anyhow!("Too many attestations for a block: {err:?}"))?,
            ..Default::default()
        },
    };
    state.process_block(&block)?;
    block.state_root = state.tree_hash_root();

    Ok((block, state))
}

/// Return the attestation data a validator of committee ``index`` would vote for at ``slot``,
/// given ``head_state`` advanced to ``slot`` and the root of its head block.
pub fn attestation_data_at(
    head_state: &BeaconState,
    head_root: B256,
    slot: Slot,
    index: CommitteeIndex,
) -> anyhow::Result<AttestationData> {
    ensure!(
        head_state.slot == slot,
        "Head state at slot {} was not advanced to slot {slot}",
        head_state.slot
    );
    let epoch = compute_epoch_at_slot(slot);
    let epoch_boundary_root = if compute_start_slot_at_epoch(epoch) == head_state.slot {
        head_root
    } else {
        head_state.get_block_root(epoch)?
    };

    Ok(AttestationData {
        slot,
        index,
        beacon_block_root: head_root,
        source: head_state.current_justified_checkpoint,
        target: Checkpoint {
            epoch,
            root: epoch_boundary_root,
        },
    })
}

/// Sign ``data`` as the committee member at ``committee_position``.
pub fn build_attestation(
    state: &BeaconState,
    data: AttestationData,
    committee_position: usize,
    private_key: &PrivateKey,
) -> anyhow::Result<Attestation> {
    let committee = state.get_beacon_committee(data.slot, data.index)?;
    ensure!(
        committee_position < committee.len(),
        "Committee position {committee_position} out of range, committee has {} members",
        committee.len()
    );

    let mut aggregation_bits = BitList::with_capacity(committee.len())
        .map_err(|err| anyhow!("Failed to allocate aggregation bits: {err:?}"))?;
    aggregation_bits
        .set(committee_position, true)
        .map_err(|err| anyhow!("Failed to set aggregation bit: {err:?}"))?;
    let custody_bits = BitList::with_capacity(committee.len())
        .map_err(|err| anyhow!("Failed to allocate custody bits: {err:?}"))?;

    let domain = state.get_domain(DOMAIN_BEACON_ATTESTER, Some(data.target.epoch));
    let signature = private_key.sign(compute_signing_root(&data, domain));

    Ok(Attestation {
        aggregation_bits,
        data,
        custody_bits,
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::is_active_validator;

    const VALIDATOR_COUNT: u64 = 64;

    fn genesis() -> (BeaconBlock, BeaconState) {
        interop_genesis(VALIDATOR_COUNT, 0, &ChainSpec::dev()).unwrap()
    }

    fn signed_attestation(state: &BeaconState, head_root: B256, position: usize) -> Attestation {
        let data = attestation_data_at(state, head_root, state.slot, 0).unwrap();
        let committee = state.get_beacon_committee(data.slot, 0).unwrap();
        let key = interop_private_key(committee[position]).unwrap();
        build_attestation(state, data, position, &key).unwrap()
    }

    #[test]
    fn test_genesis_is_consistent() {
        let (block, state) = genesis();

        assert_eq!(block.state_root, state.tree_hash_root());
        assert_eq!(state.validators.len() as u64, VALIDATOR_COUNT);
        assert!(state
            .validators
            .iter()
            .all(|validator| is_active_validator(validator, GENESIS_EPOCH)));
        assert_eq!(
            state.genesis_validators_root,
            state.validators.tree_hash_root()
        );
        assert_eq!(
            interop_private_key(7).unwrap().public_key(),
            state.validators[7].pubkey
        );
    }

    #[test]
    fn test_genesis_block_is_parent_of_first_block() {
        let (genesis_block, genesis_state) = genesis();
        let (block, state) = produce_block(&genesis_state, 1, vec![]).unwrap();

        assert_eq!(block.parent_root, genesis_block.block_root());
        assert_eq!(block.state_root, state.tree_hash_root());
        assert_eq!(state.get_block_root_at_slot(0).unwrap(), genesis_block.block_root());
    }

    #[test]
    fn test_small_registry_committees() {
        let (_, state) = genesis();
        // 64 validators spread over 32 slots, one committee each
        assert_eq!(state.get_committee_count_per_slot(GENESIS_EPOCH), 1);
        let mut members = (0..32)
            .flat_map(|slot| state.get_beacon_committee(slot, 0).unwrap())
            .collect::<Vec<_>>();
        members.sort();
        assert_eq!(members, (0..VALIDATOR_COUNT).collect::<Vec<_>>());
        assert!(state.get_beacon_committee(0, 1).is_err());
    }

    #[test]
    fn test_signed_attestation_is_valid() {
        let (genesis_block, genesis_state) = genesis();
        let mut state = genesis_state.clone();
        state.process_slots(1).unwrap();

        let attestation = signed_attestation(&state, genesis_block.block_root(), 1);
        let indexed = state.get_indexed_attestation(&attestation).unwrap();
        assert_eq!(indexed.attesting_indices.len(), 1);
        assert!(state.is_valid_indexed_attestation(&indexed, true).unwrap());

        let mut forged = attestation.clone();
        forged.data.beacon_block_root = B256::repeat_byte(0xee);
        let indexed = state.get_indexed_attestation(&forged).unwrap();
        assert!(!state.is_valid_indexed_attestation(&indexed, true).unwrap());
        assert!(state.is_valid_indexed_attestation(&indexed, false).unwrap());
    }

    #[test]
    fn test_included_attestation_is_tracked() {
        let (genesis_block, genesis_state) = genesis();
        let (block, state) = produce_block(&genesis_state, 1, vec![]).unwrap();
        let head_root = block.block_root();
        assert_ne!(head_root, genesis_block.block_root());

        let attestation = signed_attestation(&state, head_root, 0);

        let (_, post_state) = produce_block(&state, 2, vec![attestation.clone()]).unwrap();
        assert_eq!(post_state.current_epoch_attestations.len(), 1);
        assert_eq!(post_state.current_epoch_attestations[0].inclusion_delay, 1);

        let included = post_state.get_included_participation();
        assert_eq!(included.get(&attestation.data), Some(&attestation.aggregation_bits));
    }

    #[test]
    fn test_attestation_outside_inclusion_window_is_rejected() {
        let (genesis_block, genesis_state) = genesis();
        let mut state = genesis_state.clone();
        state.process_slots(1).unwrap();
        let attestation = signed_attestation(&state, genesis_block.block_root(), 0);

        // same slot as the attestation
        let mut same_slot = state.clone();
        assert!(same_slot.process_attestation(&attestation, false).is_err());

        let mut custody = attestation.clone();
        custody.custody_bits.set(0, true).unwrap();
        let mut next_slot = state.clone();
        next_slot.process_slots(2).unwrap();
        assert!(next_slot.process_attestation(&custody, false).is_err());
        assert!(next_slot.process_attestation(&attestation, true).is_ok());
    }
}
