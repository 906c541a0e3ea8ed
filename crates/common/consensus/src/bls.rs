use alloy_primitives::B256;
use anyhow::anyhow;
use blst::min_pk::SecretKey;

use crate::{pubkey::PubKey, signature::BlsSignature};

pub const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_ROPOP";

/// A validator signing key. Only used by local validators and tests, production keys live in a
/// remote signer.
pub struct PrivateKey {
    inner: SecretKey,
}

impl PrivateKey {
    /// Derive a key from at least 32 bytes of input keying material.
    pub fn from_ikm(ikm: &[u8]) -> anyhow::Result<Self> {
        let inner = SecretKey::key_gen(ikm, &[])
            .map_err(|err| anyhow!("Failed to derive secret key: {err:?}"))?;
        Ok(Self { inner })
    }

    pub fn public_key(&self) -> PubKey {
        self.inner.sk_to_pk().into()
    }

    pub fn sign(&self, signing_root: B256) -> BlsSignature {
        self.inner.sign(signing_root.as_ref(), DST, &[]).into()
    }
}
