use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;

use crate::{
    primitives::{Gwei, Slot, ValidatorIndex},
    pubkey::PubKey,
    signature::BlsSignature,
};

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct Transfer {
    pub sender: ValidatorIndex,
    pub recipient: ValidatorIndex,
    pub amount: Gwei,
    pub fee: Gwei,

    /// Slot at which transfer must be processed
    pub slot: Slot,

    /// Withdrawal pubkey
    pub pubkey: PubKey,
    pub signature: BlsSignature,
}
