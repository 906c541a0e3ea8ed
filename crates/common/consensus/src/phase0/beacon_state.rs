use std::{
    cmp::max,
    collections::{HashMap, HashSet},
};

use alloy_primitives::B256;
use anyhow::{anyhow, ensure};
use ethereum_hashing::{hash, hash_fixed};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{
    typenum::{U1099511627776, U2048, U4, U4096, U65536, U8192},
    BitList, BitVector, FixedVector, VariableList,
};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

use super::beacon_block::BeaconBlock;
use crate::{
    attestation::Attestation,
    attestation_data::AttestationData,
    beacon_block_header::BeaconBlockHeader,
    checkpoint::Checkpoint,
    constants::{
        DOMAIN_BEACON_ATTESTER, DOMAIN_BEACON_PROPOSER, EFFECTIVE_BALANCE_INCREMENT,
        EPOCHS_PER_HISTORICAL_VECTOR, GENESIS_EPOCH, MAX_COMMITTEES_PER_SLOT,
        MAX_EFFECTIVE_BALANCE, MAX_RANDOM_BYTE, MIN_ATTESTATION_INCLUSION_DELAY,
        MIN_SEED_LOOKAHEAD, SLOTS_PER_EPOCH, SLOTS_PER_HISTORICAL_ROOT, TARGET_COMMITTEE_SIZE,
    },
    fork::Fork,
    helpers::is_active_validator,
    indexed_attestation::IndexedAttestation,
    misc::{
        compute_committee, compute_domain, compute_epoch_at_slot, compute_shuffled_index,
        compute_signing_root, compute_start_slot_at_epoch,
    },
    pending_attestation::PendingAttestation,
    primitives::{DomainType, Epoch, Gwei, Slot, ValidatorIndex},
    pubkey::PubKey,
    validator::Validator,
};

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct BeaconState {
    // Versioning
    pub genesis_time: u64,
    pub genesis_validators_root: B256,
    pub slot: Slot,
    pub fork: Fork,

    // History
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: FixedVector<B256, U8192>,
    pub state_roots: FixedVector<B256, U8192>,

    // Registry
    pub validators: VariableList<Validator, U1099511627776>,
    #[serde(deserialize_with = "ssz_types::serde_utils::quoted_u64_var_list::deserialize")]
    pub balances: VariableList<u64, U1099511627776>,

    // Randomness
    pub randao_mixes: FixedVector<B256, U65536>,

    // Attestations
    pub previous_epoch_attestations: VariableList<PendingAttestation, U4096>,
    pub current_epoch_attestations: VariableList<PendingAttestation, U4096>,

    // Finality
    pub justification_bits: BitVector<U4>,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
}

impl BeaconState {
    /// Return the current epoch.
    pub fn get_current_epoch(&self) -> Epoch {
        compute_epoch_at_slot(self.slot)
    }

    /// Return the previous epoch (unless the current epoch is ``GENESIS_EPOCH``).
    pub fn get_previous_epoch(&self) -> Epoch {
        let current_epoch = self.get_current_epoch();
        if current_epoch == GENESIS_EPOCH {
            GENESIS_EPOCH
        } else {
            current_epoch - 1
        }
    }

    /// Return the block root at the start of a recent ``epoch``.
    pub fn get_block_root(&self, epoch: Epoch) -> anyhow::Result<B256> {
        self.get_block_root_at_slot(compute_start_slot_at_epoch(epoch))
    }

    /// Return the block root at a recent ``slot``.
    pub fn get_block_root_at_slot(&self, slot: Slot) -> anyhow::Result<B256> {
        ensure!(
            slot < self.slot && self.slot <= slot + SLOTS_PER_HISTORICAL_ROOT,
            "slot given was outside of block_roots range"
        );
        Ok(self.block_roots[(slot % SLOTS_PER_HISTORICAL_ROOT) as usize])
    }

    /// Return the randao mix at a recent ``epoch``.
    pub fn get_randao_mix(&self, epoch: Epoch) -> B256 {
        self.randao_mixes[(epoch % EPOCHS_PER_HISTORICAL_VECTOR) as usize]
    }

    /// Return the sequence of active validator indices at ``epoch``.
    pub fn get_active_validator_indices(&self, epoch: Epoch) -> Vec<ValidatorIndex> {
        self.validators
            .iter()
            .enumerate()
            .filter_map(|(i, v)| {
                if is_active_validator(v, epoch) {
                    Some(i as u64)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Return the seed at ``epoch``.
    pub fn get_seed(&self, epoch: Epoch, domain_type: DomainType) -> B256 {
        let mix =
            self.get_randao_mix(epoch + EPOCHS_PER_HISTORICAL_VECTOR - MIN_SEED_LOOKAHEAD - 1);
        let epoch_with_index =
            [domain_type.as_slice(), &epoch.to_le_bytes(), mix.as_slice()].concat();
        B256::from(hash_fixed(&epoch_with_index))
    }

    /// Return the number of committees in each slot for the given ``epoch``.
    pub fn get_committee_count_per_slot(&self, epoch: Epoch) -> u64 {
        (self.get_active_validator_indices(epoch).len() as u64
            / SLOTS_PER_EPOCH
            / TARGET_COMMITTEE_SIZE)
            .clamp(1, MAX_COMMITTEES_PER_SLOT)
    }

    /// Return from ``indices`` a random index sampled by effective balance.
    pub fn compute_proposer_index(
        &self,
        indices: &[ValidatorIndex],
        seed: B256,
    ) -> anyhow::Result<ValidatorIndex> {
        ensure!(!indices.is_empty(), "Index must be less than index_count");

        let mut i: usize = 0;
        let total = indices.len();

        loop {
            let candidate_index = indices[compute_shuffled_index(i % total, total, seed)?];

            let seed_with_index = [seed.as_slice(), &((i / 32) as u64).to_le_bytes()].concat();
            let hash = hash(&seed_with_index);
            let random_byte = hash[i % 32];

            let effective_balance = self.get_validator(candidate_index)?.effective_balance;

            if (effective_balance * MAX_RANDOM_BYTE) >= (MAX_EFFECTIVE_BALANCE * random_byte as u64)
            {
                return Ok(candidate_index);
            }

            i += 1;
        }
    }

    /// Return the beacon proposer index at the current slot.
    pub fn get_beacon_proposer_index(&self) -> anyhow::Result<ValidatorIndex> {
        let epoch = self.get_current_epoch();
        let seed = B256::from(hash_fixed(
            &[
                self.get_seed(epoch, DOMAIN_BEACON_PROPOSER).as_slice(),
                &self.slot.to_le_bytes(),
            ]
            .concat(),
        ));
        let indices = self.get_active_validator_indices(epoch);
        self.compute_proposer_index(&indices, seed)
    }

    pub fn get_validator(&self, index: ValidatorIndex) -> anyhow::Result<&Validator> {
        self.validators
            .get(index as usize)
            .ok_or_else(|| anyhow!("Validator index {index} is out of range"))
    }

    /// Return the public keys of the validators at ``indices``.
    pub fn get_pubkeys(&self, indices: &[ValidatorIndex]) -> anyhow::Result<Vec<&PubKey>> {
        indices
            .iter()
            .map(|&index| self.get_validator(index).map(|validator| &validator.pubkey))
            .collect()
    }

    /// Return the combined effective balance of the ``indices``.
    /// ``EFFECTIVE_BALANCE_INCREMENT`` Gwei minimum to avoid divisions by zero.
    pub fn get_total_balance(&self, indices: HashSet<ValidatorIndex>) -> Gwei {
        max(
            EFFECTIVE_BALANCE_INCREMENT,
            indices
                .iter()
                .filter_map(|index| self.validators.get(*index as usize))
                .map(|validator| validator.effective_balance)
                .sum(),
        )
    }

    /// Return the combined effective balance of the active validators.
    pub fn get_total_active_balance(&self) -> Gwei {
        self.get_total_balance(
            self.get_active_validator_indices(self.get_current_epoch())
                .into_iter()
                .collect::<HashSet<_>>(),
        )
    }

    /// Return the signature domain (fork version concatenated with domain type) of a message.
    pub fn get_domain(&self, domain_type: DomainType, epoch: Option<Epoch>) -> B256 {
        let epoch = epoch.unwrap_or_else(|| self.get_current_epoch());
        let fork_version = if epoch < self.fork.epoch {
            self.fork.previous_version
        } else {
            self.fork.current_version
        };
        compute_domain(domain_type, fork_version, self.genesis_validators_root)
    }

    /// Return the beacon committee at ``slot`` for ``index``.
    pub fn get_beacon_committee(
        &self,
        slot: Slot,
        index: u64,
    ) -> anyhow::Result<Vec<ValidatorIndex>> {
        let epoch = compute_epoch_at_slot(slot);
        let committees_per_slot = self.get_committee_count_per_slot(epoch);
        ensure!(
            index < committees_per_slot,
            "Committee index {index} out of range, {committees_per_slot} committees per slot"
        );
        compute_committee(
            &self.get_active_validator_indices(epoch),
            self.get_seed(epoch, DOMAIN_BEACON_ATTESTER),
            (slot % SLOTS_PER_EPOCH) * committees_per_slot + index,
            committees_per_slot * SLOTS_PER_EPOCH,
        )
    }

    /// Return the set of attesting indices corresponding to ``data`` and ``bits``.
    pub fn get_attesting_indices(
        &self,
        data: &AttestationData,
        bits: &BitList<U2048>,
    ) -> anyhow::Result<Vec<ValidatorIndex>> {
        let committee = self.get_beacon_committee(data.slot, data.index)?;
        ensure!(
            bits.len() == committee.len(),
            "Aggregation bits length {} does not match committee size {}",
            bits.len(),
            committee.len()
        );
        let indices: Vec<u64> = committee
            .into_iter()
            .enumerate()
            .filter_map(|(i, index)| bits.get(i).ok().filter(|&bit| bit).map(|_| index))
            .unique()
            .collect();
        Ok(indices)
    }

    /// Return the indexed attestation corresponding to ``attestation``.
    pub fn get_indexed_attestation(
        &self,
        attestation: &Attestation,
    ) -> anyhow::Result<IndexedAttestation> {
        let mut attesting_indices =
            self.get_attesting_indices(&attestation.data, &attestation.aggregation_bits)?;
        attesting_indices.sort();
        Ok(IndexedAttestation {
            attesting_indices: VariableList::new(attesting_indices)
                .map_err(|err| anyhow!("Too many attesting indices: {err:?}"))?,
            data: attestation.data,
            signature: attestation.signature.clone(),
        })
    }

    /// Check if ``indexed_attestation`` is not empty, has sorted and unique indices and, when
    /// ``verify_signature`` is set, carries a valid aggregate signature.
    pub fn is_valid_indexed_attestation(
        &self,
        indexed_attestation: &IndexedAttestation,
        verify_signature: bool,
    ) -> anyhow::Result<bool> {
        let indices = &indexed_attestation.attesting_indices;
        if indices.is_empty() || !indices.windows(2).all(|pair| pair[0] < pair[1]) {
            return Ok(false);
        }
        if indices
            .iter()
            .any(|&index| index as usize >= self.validators.len())
        {
            return Ok(false);
        }
        if !verify_signature {
            return Ok(true);
        }

        let pubkeys = self.get_pubkeys(indices)?;
        let domain = self.get_domain(
            DOMAIN_BEACON_ATTESTER,
            Some(indexed_attestation.data.target.epoch),
        );
        let signing_root = compute_signing_root(&indexed_attestation.data, domain);
        indexed_attestation
            .signature
            .fast_aggregate_verify(&pubkeys, signing_root)
    }

    /// Apply ``attestation`` to the state, appending it to the epoch's pending attestations.
    pub fn process_attestation(
        &mut self,
        attestation: &Attestation,
        verify_signature: bool,
    ) -> anyhow::Result<()> {
        let data = &attestation.data;
        ensure!(
            data.target.epoch == self.get_previous_epoch()
                || data.target.epoch == self.get_current_epoch(),
            "Attestation target epoch {} is neither previous nor current epoch",
            data.target.epoch
        );
        ensure!(
            data.target.epoch == compute_epoch_at_slot(data.slot),
            "Attestation slot {} is not in target epoch {}",
            data.slot,
            data.target.epoch
        );
        ensure!(
            data.slot + MIN_ATTESTATION_INCLUSION_DELAY <= self.slot
                && self.slot <= data.slot + SLOTS_PER_EPOCH,
            "Attestation slot {} is outside of the inclusion window at slot {}",
            data.slot,
            self.slot
        );
        ensure!(
            data.index < self.get_committee_count_per_slot(data.target.epoch),
            "Committee index {} out of range",
            data.index
        );
        ensure!(
            attestation.custody_bits.is_zero(),
            "Custody bits must be empty"
        );

        let is_current = data.target.epoch == self.get_current_epoch();
        let justified_checkpoint = if is_current {
            self.current_justified_checkpoint
        } else {
            self.previous_justified_checkpoint
        };
        ensure!(
            data.source == justified_checkpoint,
            "Attestation source does not match the justified checkpoint"
        );

        let indexed_attestation = self.get_indexed_attestation(attestation)?;
        ensure!(
            self.is_valid_indexed_attestation(&indexed_attestation, verify_signature)?,
            "Invalid indexed attestation"
        );

        let pending_attestation = PendingAttestation {
            aggregation_bits: attestation.aggregation_bits.clone(),
            data: attestation.data,
            inclusion_delay: self.slot - data.slot,
            proposer_index: self.get_beacon_proposer_index()?,
        };
        let epoch_attestations = if is_current {
            &mut self.current_epoch_attestations
        } else {
            &mut self.previous_epoch_attestations
        };
        epoch_attestations
            .push(pending_attestation)
            .map_err(|err| anyhow!("Too many pending attestations: {err:?}"))
    }

    pub fn process_block_header(&mut self, block: &BeaconBlock) -> anyhow::Result<()> {
        // Verify that the slots match
        ensure!(
            self.slot == block.slot,
            "State slot must be equal to block slot"
        );
        // Verify that the block is newer than latest block header
        ensure!(
            block.slot > self.latest_block_header.slot,
            "Block slot must be greater than latest block header slot of state"
        );
        // Verify that proposer index is the correct index
        ensure!(
            block.proposer_index == self.get_beacon_proposer_index()?,
            "Block proposer index must be equal to beacon proposer index"
        );
        // Verify that the parent matches
        ensure!(
            block.parent_root == self.latest_block_header.tree_hash_root(),
            "Block parent root must be equal to the root of latest block header"
        );

        // Cache current block as the new latest block, state root is filled in by process_slot
        self.latest_block_header = BeaconBlockHeader {
            state_root: B256::ZERO,
            ..block.block_header()
        };

        // Verify proposer is not slashed
        ensure!(
            !self.get_validator(block.proposer_index)?.slashed,
            "Block proposer must not be slashed"
        );

        Ok(())
    }

    /// Process the block header and the attestations of ``block``. The remaining operations are
    /// handled by the full state transition.
    pub fn process_block(&mut self, block: &BeaconBlock) -> anyhow::Result<()> {
        self.process_block_header(block)?;
        for attestation in block.body.attestations.iter() {
            self.process_attestation(attestation, true)?;
        }
        Ok(())
    }

    /// Cache the state and block roots of the current slot.
    pub fn process_slot(&mut self) {
        let previous_state_root = self.tree_hash_root();
        let index = (self.slot % SLOTS_PER_HISTORICAL_ROOT) as usize;
        self.state_roots[index] = previous_state_root;

        if self.latest_block_header.state_root == B256::ZERO {
            self.latest_block_header.state_root = previous_state_root;
        }

        let previous_block_root = self.latest_block_header.tree_hash_root();
        self.block_roots[index] = previous_block_root;
    }

    /// Advance the state through empty slots up to ``slot``.
    pub fn process_slots(&mut self, slot: Slot) -> anyhow::Result<()> {
        ensure!(
            self.slot < slot,
            "Cannot advance state at slot {} to slot {slot}",
            self.slot
        );
        while self.slot < slot {
            self.process_slot();
            if (self.slot + 1) % SLOTS_PER_EPOCH == 0 {
                self.process_participation_record_updates();
            }
            self.slot += 1;
        }
        Ok(())
    }

    /// Rotate current/previous epoch attestations.
    pub fn process_participation_record_updates(&mut self) {
        self.previous_epoch_attestations = std::mem::take(&mut self.current_epoch_attestations);
    }

    /// Union of the aggregation bits of pending attestations already included on chain, keyed by
    /// attestation data.
    pub fn get_included_participation(&self) -> HashMap<AttestationData, BitList<U2048>> {
        let mut coverage: HashMap<AttestationData, BitList<U2048>> = HashMap::new();
        for pending in self
            .previous_epoch_attestations
            .iter()
            .chain(self.current_epoch_attestations.iter())
        {
            coverage
                .entry(pending.data)
                .and_modify(|bits| *bits = bits.union(&pending.aggregation_bits))
                .or_insert_with(|| pending.aggregation_bits.clone());
        }
        coverage
    }
}
