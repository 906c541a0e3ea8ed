use alloy_primitives::B256;
use hashlink::LinkedHashSet;
use ream_consensus::attestation::Attestation;
use tree_hash::TreeHash;

pub type Fingerprint = Box<dyn Fn(&Attestation) -> B256 + Send + Sync>;

/// Bounded registry of attestations seen so far.
///
/// Fingerprints are kept in insertion order; once the registry is full the oldest fingerprint is
/// evicted, so a very old duplicate may be accepted again.
pub struct ProcessedAttestations {
    fingerprint: Fingerprint,
    capacity: usize,
    seen: LinkedHashSet<B256>,
}

impl ProcessedAttestations {
    /// Registry keyed by the hash tree root of the attestation.
    pub fn new(capacity: usize) -> Self {
        Self::with_fingerprint(
            Box::new(|attestation: &Attestation| attestation.tree_hash_root()),
            capacity,
        )
    }

    pub fn with_fingerprint(fingerprint: Fingerprint, capacity: usize) -> Self {
        Self {
            fingerprint,
            capacity: capacity.max(1),
            seen: LinkedHashSet::new(),
        }
    }

    /// Register ``attestation``, returning `true` if it was not seen before.
    pub fn add(&mut self, attestation: &Attestation) -> bool {
        let fingerprint = (self.fingerprint)(attestation);
        if self.seen.contains(&fingerprint) {
            return false;
        }

        self.seen.insert(fingerprint);
        while self.seen.len() > self.capacity {
            self.seen.pop_front();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::attestation_with;

    #[test]
    fn test_duplicate_is_rejected() {
        let mut registry = ProcessedAttestations::new(16);
        let attestation = attestation_with(96, 0, 1, |_| {});

        assert!(registry.add(&attestation));
        assert!(!registry.add(&attestation));
        assert!(!registry.add(&attestation.clone()));
        assert!(registry.add(&attestation_with(97, 0, 1, |_| {})));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_oldest_fingerprint_is_evicted() {
        let mut registry = ProcessedAttestations::new(2);
        let first = attestation_with(1, 0, 0, |_| {});
        let second = attestation_with(2, 0, 0, |_| {});
        let third = attestation_with(3, 0, 0, |_| {});

        assert!(registry.add(&first));
        assert!(registry.add(&second));
        assert!(registry.add(&third));
        assert_eq!(registry.len(), 2);

        // first was evicted, second and third are still known
        assert!(!registry.add(&third));
        assert!(!registry.add(&second));
        assert!(registry.add(&first));
    }

    #[test]
    fn test_injected_fingerprint() {
        // everything with the same slot collides
        let mut registry = ProcessedAttestations::with_fingerprint(
            Box::new(|attestation: &Attestation| {
                B256::left_padding_from(&attestation.data.slot.to_be_bytes())
            }),
            16,
        );
        assert!(registry.add(&attestation_with(5, 0, 0, |_| {})));
        assert!(!registry.add(&attestation_with(5, 0, 0, |a| a.data.index = 3)));
    }
}
