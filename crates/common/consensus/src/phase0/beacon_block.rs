use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

use super::beacon_block_body::BeaconBlockBody;
use crate::{
    beacon_block_header::BeaconBlockHeader,
    primitives::{Slot, ValidatorIndex},
    signature::BlsSignature,
};

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct SignedBeaconBlock {
    pub message: BeaconBlock,
    pub signature: BlsSignature,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct BeaconBlock {
    pub slot: Slot,
    pub proposer_index: ValidatorIndex,
    pub parent_root: B256,
    pub state_root: B256,
    pub body: BeaconBlockBody,
}

impl BeaconBlock {
    /// The block root, which is also the root of its header.
    pub fn block_root(&self) -> B256 {
        self.tree_hash_root()
    }

    pub fn block_header(&self) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot: self.slot,
            proposer_index: self.proposer_index,
            parent_root: self.parent_root,
            state_root: self.state_root,
            body_root: self.body.tree_hash_root(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_root_equals_header_root() {
        let block = BeaconBlock {
            slot: 5,
            proposer_index: 3,
            parent_root: B256::repeat_byte(1),
            state_root: B256::repeat_byte(2),
            body: BeaconBlockBody::default(),
        };
        assert_eq!(block.block_root(), block.block_header().tree_hash_root());
    }
}
