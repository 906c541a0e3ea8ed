use std::sync::Arc;

use alloy_primitives::B256;
use itertools::Itertools;
use ream_consensus::{
    checkpoint::Checkpoint,
    constants::DOMAIN_BEACON_ATTESTER,
    misc::{compute_epoch_at_slot, compute_start_slot_at_epoch},
    phase0::beacon_state::BeaconState,
    pubkey::PubKey,
    transition::EmptySlotTransition,
};
use ream_storage::BeaconChainStorage;
use tracing::{debug, warn};

use super::{AggregateSignatureVerifier, BatchVerifier, VerificationResult};
use crate::input::ReceivedAttestation;

/// Verifies attestations against the state of the block they vote for.
///
/// Attestations are grouped by target checkpoint and beacon block root, so a state is looked up
/// and advanced to the target epoch once per group.
pub struct AttestationVerifier {
    storage: Arc<dyn BeaconChainStorage>,
    transition: Arc<dyn EmptySlotTransition>,
}

impl AttestationVerifier {
    pub fn new(
        storage: Arc<dyn BeaconChainStorage>,
        transition: Arc<dyn EmptySlotTransition>,
    ) -> Self {
        Self {
            storage,
            transition,
        }
    }

    fn verify_group(
        &self,
        target: Checkpoint,
        beacon_block_root: B256,
        group: Vec<ReceivedAttestation>,
    ) -> VerificationResult {
        let Some(state) = self.target_state(target, beacon_block_root) else {
            return VerificationResult::all_invalid(group);
        };

        let domain = state.get_domain(DOMAIN_BEACON_ATTESTER, Some(target.epoch));
        let mut signatures = AggregateSignatureVerifier::new(domain);
        let mut result = VerificationResult::empty();
        for attestation in group {
            match participants(&state, &attestation) {
                Some(pubkeys) => signatures.add(attestation, pubkeys),
                None => result.invalid.push(attestation),
            }
        }

        result.merge(signatures.verify())
    }

    /// The state attestations of the group are checked against: the state of the voted block
    /// advanced to the start of the target epoch.
    fn target_state(&self, target: Checkpoint, beacon_block_root: B256) -> Option<BeaconState> {
        let tuple = match self.storage.get_tuple(beacon_block_root) {
            Ok(Some(tuple)) => tuple,
            Ok(None) => {
                warn!(root = ?beacon_block_root, "Block of identified attestations is missing");
                return None;
            }
            Err(err) => {
                warn!(root = ?beacon_block_root, "Failed to read block tuple: {err}");
                return None;
            }
        };

        let block_epoch = compute_epoch_at_slot(tuple.block.slot);
        if block_epoch > target.epoch {
            debug!(block_epoch, target_epoch = target.epoch, "Block is newer than the target");
            return None;
        }
        if block_epoch < target.epoch && target.root != beacon_block_root {
            debug!(
                target_epoch = target.epoch,
                "Target root does not match the epoch boundary block"
            );
            return None;
        }

        if block_epoch == target.epoch {
            return Some(tuple.state);
        }
        match self
            .transition
            .apply(&tuple.state, compute_start_slot_at_epoch(target.epoch))
        {
            Ok(state) => Some(state),
            Err(err) => {
                warn!(target_epoch = target.epoch, "Failed to advance state: {err}");
                None
            }
        }
    }
}

impl BatchVerifier for AttestationVerifier {
    fn verify(&self, batch: Vec<ReceivedAttestation>) -> VerificationResult {
        batch
            .into_iter()
            .into_group_map_by(|attestation| {
                let data = &attestation.message.data;
                (data.target, data.beacon_block_root)
            })
            .into_iter()
            .map(|((target, root), group)| self.verify_group(target, root, group))
            .fold(VerificationResult::empty(), VerificationResult::merge)
    }
}

/// Public keys of the participants, if the attestation is structurally valid in ``state``.
fn participants(state: &BeaconState, attestation: &ReceivedAttestation) -> Option<Vec<PubKey>> {
    let message = &attestation.message;
    if !message.custody_bits.is_zero() {
        return None;
    }
    let indexed = state.get_indexed_attestation(message).ok()?;
    if !state.is_valid_indexed_attestation(&indexed, false).ok()? {
        return None;
    }
    state
        .get_pubkeys(&indexed.attesting_indices)
        .ok()
        .map(|pubkeys| pubkeys.into_iter().cloned().collect())
}

#[cfg(test)]
mod tests {
    use ream_consensus::{constants::SLOTS_PER_EPOCH, transition::ProcessSlotsTransition};
    use ream_storage::InMemoryStorage;

    use super::*;
    use crate::test_utils::{received, TestChain};

    fn verifier(storage: &InMemoryStorage) -> AttestationVerifier {
        AttestationVerifier::new(Arc::new(storage.clone()), Arc::new(ProcessSlotsTransition))
    }

    #[test]
    fn test_signed_attestations_are_valid() {
        let chain = TestChain::new(64);
        let storage = chain.storage();
        let block = chain.produce(&chain.genesis, 1, vec![]);
        storage.put_tuple(block.clone()).unwrap();

        let batch = vec![
            received(chain.attest(&block, 1, 0)),
            received(chain.attest(&block, 1, 1)),
            received(chain.attest(&chain.genesis, 2, 0)),
        ];
        let result = verifier(&storage).verify(batch.clone());

        assert_eq!(result.valid.len(), 3);
        assert!(result.invalid.is_empty());
        assert!(batch.iter().all(|attestation| result.valid.contains(attestation)));
    }

    #[test]
    fn test_forged_attestations_are_invalid() {
        let chain = TestChain::new(64);
        let storage = chain.storage();
        let block = chain.produce(&chain.genesis, 1, vec![]);
        storage.put_tuple(block.clone()).unwrap();

        let valid = chain.attest(&block, 1, 0);
        let mut wrong_signer = chain.attest(&block, 1, 1);
        wrong_signer.aggregation_bits = valid.aggregation_bits.clone();
        let mut custody = chain.attest(&block, 1, 1);
        custody.custody_bits.set(1, true).unwrap();
        let mut unknown_block = valid.clone();
        unknown_block.data.beacon_block_root = B256::repeat_byte(0x77);

        let batch = vec![
            received(valid.clone()),
            received(wrong_signer.clone()),
            received(custody.clone()),
            received(unknown_block.clone()),
        ];
        let result = verifier(&storage).verify(batch);

        assert_eq!(result.valid, vec![received(valid)]);
        assert_eq!(result.invalid.len(), 3);
        for forged in [wrong_signer, custody, unknown_block] {
            assert!(result.invalid.contains(&received(forged)));
        }
    }

    #[test]
    fn test_target_root_must_be_voted_block_across_epochs() {
        let chain = TestChain::new(64);
        let storage = chain.storage();
        let block = chain.produce(&chain.genesis, 1, vec![]);
        storage.put_tuple(block.clone()).unwrap();

        // block from epoch 0 voted in epoch 1, the boundary block is the block itself
        let valid = chain.attest(&block, SLOTS_PER_EPOCH + 1, 0);
        assert_eq!(valid.data.target.root, block.root());
        let mut wrong_target = valid.clone();
        wrong_target.data.target.root = chain.genesis.root();

        let result =
            verifier(&storage).verify(vec![received(valid.clone()), received(wrong_target)]);
        assert_eq!(result.valid, vec![received(valid)]);
        assert_eq!(result.invalid.len(), 1);
    }

    #[test]
    fn test_block_after_target_epoch() {
        let chain = TestChain::new(64);
        let storage = chain.storage();
        let block = chain.produce(&chain.genesis, SLOTS_PER_EPOCH, vec![]);
        storage.put_tuple(block.clone()).unwrap();

        let mut attestation = chain.attest(&block, SLOTS_PER_EPOCH, 0);
        attestation.data.target.epoch = 0;

        let result = verifier(&storage).verify(vec![received(attestation)]);
        assert!(result.valid.is_empty());
        assert_eq!(result.invalid.len(), 1);
    }
}
