use std::cmp::max;

use alloy_primitives::B256;
use anyhow::ensure;
use ethereum_hashing::hash;
use tree_hash::TreeHash;

use crate::{
    constants::{SHUFFLE_ROUND_COUNT, SLOTS_PER_EPOCH},
    fork_data::ForkData,
    primitives::{DomainType, Epoch, Slot, Version},
    signing_data::SigningData,
};

/// Return the epoch number at ``slot``.
pub fn compute_epoch_at_slot(slot: Slot) -> Epoch {
    slot / SLOTS_PER_EPOCH
}

/// Return the start slot of ``epoch``.
pub fn compute_start_slot_at_epoch(epoch: Epoch) -> Slot {
    epoch.saturating_mul(SLOTS_PER_EPOCH)
}

/// Return the 32-byte fork data root for the ``current_version`` and
/// ``genesis_validators_root``.
pub fn compute_fork_data_root(current_version: Version, genesis_validators_root: B256) -> B256 {
    ForkData {
        current_version,
        genesis_validators_root,
    }
    .tree_hash_root()
}

/// Return the domain for the ``domain_type`` and ``fork_version``.
pub fn compute_domain(
    domain_type: DomainType,
    fork_version: Version,
    genesis_validators_root: B256,
) -> B256 {
    let fork_data_root = compute_fork_data_root(fork_version, genesis_validators_root);
    let mut domain = B256::ZERO;
    domain[..4].copy_from_slice(domain_type.as_slice());
    domain[4..].copy_from_slice(&fork_data_root[..28]);
    domain
}

/// Return the signing root for the corresponding signing data.
pub fn compute_signing_root<SSZObject: TreeHash>(ssz_object: &SSZObject, domain: B256) -> B256 {
    SigningData {
        object_root: ssz_object.tree_hash_root(),
        domain,
    }
    .tree_hash_root()
}

/// Return the shuffled index corresponding to ``seed`` (and ``index_count``).
pub fn compute_shuffled_index(
    mut index: usize,
    index_count: usize,
    seed: B256,
) -> anyhow::Result<usize> {
    ensure!(index < index_count, "Index must be less than index_count");

    for current_round in 0..SHUFFLE_ROUND_COUNT {
        let pivot_hash = hash(&[seed.as_slice(), &[current_round]].concat());
        let pivot = (u64::from_le_bytes(pivot_hash[..8].try_into()?) % index_count as u64) as usize;
        let flip = (pivot + index_count - index) % index_count;
        let position = max(index, flip);
        let source = hash(
            &[
                seed.as_slice(),
                &[current_round],
                &((position / 256) as u32).to_le_bytes(),
            ]
            .concat(),
        );
        let byte = source[(position % 256) / 8];
        let bit = (byte >> (position % 8)) % 2;
        if bit == 1 {
            index = flip;
        }
    }

    Ok(index)
}

/// Return the committee corresponding to ``indices``, ``seed``, ``index``, and committee
/// ``count``.
pub fn compute_committee(
    indices: &[u64],
    seed: B256,
    index: u64,
    count: u64,
) -> anyhow::Result<Vec<u64>> {
    ensure!(count > 0, "Committee count must be positive");
    ensure!(index < count, "Committee index {index} out of range for {count} committees");

    let total = indices.len() as u64;
    let start = (total * index / count) as usize;
    let end = (total * (index + 1) / count) as usize;
    (start..end)
        .map(|i| Ok(indices[compute_shuffled_index(i, indices.len(), seed)?]))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[rstest::rstest]
    #[case(0, 0)]
    #[case(31, 0)]
    #[case(32, 1)]
    #[case(100, 3)]
    fn test_compute_epoch_at_slot(#[case] slot: u64, #[case] epoch: u64) {
        assert_eq!(compute_epoch_at_slot(slot), epoch);
        assert!(compute_start_slot_at_epoch(epoch) <= slot);
    }

    #[test]
    fn test_shuffled_index_is_a_permutation() {
        let seed = B256::repeat_byte(0x42);
        let count = 100;
        let shuffled: HashSet<usize> = (0..count)
            .map(|i| compute_shuffled_index(i, count, seed).unwrap())
            .collect();
        assert_eq!(shuffled.len(), count);
        assert!(shuffled.iter().all(|&i| i < count));
    }

    #[test]
    fn test_shuffled_index_out_of_range() {
        assert!(compute_shuffled_index(5, 5, B256::ZERO).is_err());
    }

    #[test]
    fn test_committees_partition_indices() {
        let indices: Vec<u64> = (0..64).collect();
        let seed = B256::repeat_byte(7);
        let count = 32;

        let mut seen = HashSet::new();
        for index in 0..count {
            let committee = compute_committee(&indices, seed, index, count).unwrap();
            assert_eq!(committee.len(), 2);
            for member in committee {
                assert!(seen.insert(member));
            }
        }
        assert_eq!(seen.len(), indices.len());
    }

    #[test]
    fn test_domain_layout() {
        let domain_type = DomainType::new([1, 0, 0, 0]);
        let fork_version = Version::new([0, 0, 0, 1]);
        let domain = compute_domain(domain_type, fork_version, B256::ZERO);
        let fork_data_root = compute_fork_data_root(fork_version, B256::ZERO);

        assert_eq!(&domain[..4], domain_type.as_slice());
        assert_eq!(&domain[4..], &fork_data_root[..28]);
    }
}
