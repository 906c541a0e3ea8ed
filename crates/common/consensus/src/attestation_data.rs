use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;

use crate::{
    checkpoint::Checkpoint,
    primitives::{CommitteeIndex, Slot},
};

/// The vote carried by an attestation. Two attestations can be aggregated only if their data is
/// identical, so this type doubles as the aggregation key.
#[derive(
    Debug, Eq, Hash, PartialEq, Clone, Copy, Serialize, Deserialize, Encode, Decode, TreeHash,
)]
pub struct AttestationData {
    pub slot: Slot,
    pub index: CommitteeIndex,

    /// LMD GHOST vote
    pub beacon_block_root: B256,

    /// FFG vote
    pub source: Checkpoint,
    pub target: Checkpoint,
}

#[cfg(test)]
mod tests {
    use ssz::{Decode, Encode};
    use tree_hash::TreeHash;

    use super::*;

    fn data(slot: u64, target_epoch: u64) -> AttestationData {
        AttestationData {
            slot,
            index: 0,
            beacon_block_root: B256::repeat_byte(1),
            source: Checkpoint {
                epoch: 0,
                root: B256::repeat_byte(2),
            },
            target: Checkpoint {
                epoch: target_epoch,
                root: B256::repeat_byte(3),
            },
        }
    }

    #[test]
    fn test_ssz_layout() {
        let data = data(96, 3);
        let bytes = data.as_ssz_bytes();

        // slot + index + root + 2 * (epoch + root)
        assert_eq!(bytes.len(), 8 + 8 + 32 + 2 * (8 + 32));
        assert_eq!(AttestationData::from_ssz_bytes(&bytes).unwrap(), data);
    }

    #[test]
    fn test_hash_root_tracks_content() {
        assert_eq!(data(96, 3).tree_hash_root(), data(96, 3).tree_hash_root());
        assert_ne!(data(96, 3).tree_hash_root(), data(97, 3).tree_hash_root());
        assert_ne!(data(96, 3).tree_hash_root(), data(96, 2).tree_hash_root());
    }
}
