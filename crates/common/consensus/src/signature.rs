use alloy_primitives::B256;
use anyhow::anyhow;
use blst::{
    min_pk::{AggregateSignature, PublicKey, Signature},
    BLST_ERROR,
};
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{typenum, FixedVector};
use tree_hash_derive::TreeHash;

use crate::{bls::DST, pubkey::PubKey};

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct BlsSignature {
    pub signature: FixedVector<u8, typenum::U96>,
}

impl Default for BlsSignature {
    fn default() -> Self {
        Self::infinity()
    }
}

impl From<Signature> for BlsSignature {
    fn from(signature: Signature) -> Self {
        Self {
            signature: FixedVector::from(signature.to_bytes().to_vec()),
        }
    }
}

impl BlsSignature {
    /// The compressed encoding of the point at infinity.
    pub fn infinity() -> Self {
        let mut bytes = vec![0; 96];
        bytes[0] = 0xc0;
        Self {
            signature: FixedVector::from(bytes),
        }
    }

    /// Check that the bytes decode to a point in the G2 subgroup. No pairing is performed.
    pub fn is_valid_encoding(&self) -> bool {
        Signature::sig_validate(&self.signature, false).is_ok()
    }

    pub fn to_signature(&self) -> anyhow::Result<Signature> {
        Signature::from_bytes(&self.signature)
            .map_err(|err| anyhow!("Failed to convert signature type {err:?}"))
    }

    /// Verify the signature against ``public_key`` which may itself be an aggregate.
    pub fn verify(&self, public_key: &PublicKey, signing_root: B256) -> anyhow::Result<bool> {
        let signature = self.to_signature()?;
        Ok(
            signature.verify(true, signing_root.as_ref(), DST, &[], public_key, false)
                == BLST_ERROR::BLST_SUCCESS,
        )
    }

    /// Verify an aggregate signature of ``pubkeys`` over the same ``signing_root``.
    pub fn fast_aggregate_verify(
        &self,
        pubkeys: &[&PubKey],
        signing_root: B256,
    ) -> anyhow::Result<bool> {
        let signature = self.to_signature()?;
        let public_keys = pubkeys
            .iter()
            .map(|pubkey| pubkey.to_public_key())
            .collect::<anyhow::Result<Vec<_>>>()?;
        let public_keys = public_keys.iter().collect::<Vec<_>>();
        Ok(
            signature.fast_aggregate_verify(true, signing_root.as_ref(), DST, &public_keys)
                == BLST_ERROR::BLST_SUCCESS,
        )
    }

    pub fn aggregate(signatures: &[&BlsSignature]) -> anyhow::Result<Self> {
        let signatures = signatures
            .iter()
            .map(|signature| signature.to_signature())
            .collect::<anyhow::Result<Vec<_>>>()?;
        let signatures = signatures.iter().collect::<Vec<_>>();
        AggregateSignature::aggregate(&signatures, false)
            .map(|aggregate| aggregate.to_signature().into())
            .map_err(|err| anyhow!("Failed to aggregate signatures: {err:?}"))
    }
}
