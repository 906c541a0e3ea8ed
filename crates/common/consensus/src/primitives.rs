use alloy_primitives::{aliases::B32, U256};

pub type CommitteeIndex = u64; // committee index at a slot
pub type DomainType = B32; // domain type
pub type Epoch = u64; // epoch number
pub type Gwei = u64; // amount in gwei
pub type NodeId = U256; // node identifier
pub type Slot = u64; // slot number
pub type ValidatorIndex = u64; // validator registry index
pub type Version = B32; // fork version number
