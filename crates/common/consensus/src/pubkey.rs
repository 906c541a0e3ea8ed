use std::hash::{Hash, Hasher};

use anyhow::anyhow;
use blst::min_pk::{AggregatePublicKey, PublicKey};
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{typenum, FixedVector};
use tree_hash_derive::TreeHash;

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct PubKey {
    pub inner: FixedVector<u8, typenum::U48>,
}

impl Eq for PubKey {}

impl Hash for PubKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner[..].hash(state);
    }
}

impl From<PublicKey> for PubKey {
    fn from(public_key: PublicKey) -> Self {
        Self {
            inner: FixedVector::from(public_key.to_bytes().to_vec()),
        }
    }
}

impl PubKey {
    pub fn to_public_key(&self) -> anyhow::Result<PublicKey> {
        PublicKey::from_bytes(&self.inner)
            .map_err(|err| anyhow!("Failed to convert to BLS public key: {err:?}"))
    }

    /// Aggregate ``pubkeys`` into a single key. Keys are assumed to come from the validator
    /// registry, which only holds validated keys.
    pub fn aggregate(pubkeys: &[&PubKey]) -> anyhow::Result<PublicKey> {
        let public_keys = pubkeys
            .iter()
            .map(|pubkey| pubkey.to_public_key())
            .collect::<anyhow::Result<Vec<_>>>()?;
        let public_keys = public_keys.iter().collect::<Vec<_>>();
        AggregatePublicKey::aggregate(&public_keys, false)
            .map(|aggregate| aggregate.to_public_key())
            .map_err(|err| anyhow!("Failed to aggregate public keys: {err:?}"))
    }
}
