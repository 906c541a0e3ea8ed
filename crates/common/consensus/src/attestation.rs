use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{typenum, BitList};
use tree_hash_derive::TreeHash;

use crate::{attestation_data::AttestationData, signature::BlsSignature};

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct Attestation {
    /// One bit per committee member, set for every member whose signature is aggregated
    pub aggregation_bits: BitList<typenum::U2048>,
    pub data: AttestationData,

    /// Proof of custody bits, all zero until custody games are enabled
    pub custody_bits: BitList<typenum::U2048>,
    pub signature: BlsSignature,
}
