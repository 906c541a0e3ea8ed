use ream_consensus::{
    attestation::Attestation, attestation_data::AttestationData, signature::BlsSignature,
};
use ssz_types::{typenum::U2048, BitList};

/// Attestations with identical data and disjoint participants folded into one.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationAggregate {
    data: AttestationData,
    aggregation_bits: BitList<U2048>,
    custody_bits: BitList<U2048>,
    signatures: Vec<BlsSignature>,
}

impl AttestationAggregate {
    pub fn new(attestation: &Attestation) -> Self {
        Self {
            data: attestation.data,
            aggregation_bits: attestation.aggregation_bits.clone(),
            custody_bits: attestation.custody_bits.clone(),
            signatures: vec![attestation.signature.clone()],
        }
    }

    /// Fold ``attestation`` in, returning `false` if it votes for other data or shares a
    /// participant with the aggregate.
    pub fn add(&mut self, attestation: &Attestation) -> bool {
        if !self.can_add(attestation) {
            return false;
        }

        self.aggregation_bits = self.aggregation_bits.union(&attestation.aggregation_bits);
        self.custody_bits = self.custody_bits.union(&attestation.custody_bits);
        self.signatures.push(attestation.signature.clone());
        true
    }

    pub fn can_add(&self, attestation: &Attestation) -> bool {
        attestation.data == self.data
            && attestation.aggregation_bits.len() == self.aggregation_bits.len()
            && self
                .aggregation_bits
                .intersection(&attestation.aggregation_bits)
                .is_zero()
    }

    pub fn data(&self) -> &AttestationData {
        &self.data
    }

    pub fn aggregation_bits(&self) -> &BitList<U2048> {
        &self.aggregation_bits
    }

    /// Number of attestations folded into the aggregate.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Build the aggregated attestation, combining the signatures of every folded attestation.
    pub fn to_attestation(&self) -> anyhow::Result<Attestation> {
        let signature = match self.signatures.as_slice() {
            [single] => single.clone(),
            signatures => BlsSignature::aggregate(&signatures.iter().collect::<Vec<_>>())?,
        };
        Ok(Attestation {
            aggregation_bits: self.aggregation_bits.clone(),
            data: self.data,
            custody_bits: self.custody_bits.clone(),
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::B256;
    use ream_consensus::{
        bls::PrivateKey,
        constants::DOMAIN_BEACON_ATTESTER,
        misc::{compute_domain, compute_signing_root},
        pubkey::PubKey,
    };

    use super::*;
    use crate::test_utils::attestation_with;

    fn participant(position: usize) -> (Attestation, PubKey) {
        let key = PrivateKey::from_ikm(&[position as u8 + 10; 32]).unwrap();
        let domain = compute_domain(DOMAIN_BEACON_ATTESTER, Default::default(), B256::ZERO);
        let attestation = attestation_with(8, 0, 0, |a| {
            let mut bits = BitList::with_capacity(4).unwrap();
            bits.set(position, true).unwrap();
            a.aggregation_bits = bits;
            a.signature = key.sign(compute_signing_root(&a.data, domain));
        });
        (attestation, key.public_key())
    }

    #[test]
    fn test_bits_are_ored_and_signature_verifies() {
        let (first, first_key) = participant(0);
        let (second, second_key) = participant(2);
        let (third, third_key) = participant(3);

        let mut aggregate = AttestationAggregate::new(&first);
        assert!(aggregate.add(&second));
        assert!(aggregate.add(&third));
        assert_eq!(aggregate.len(), 3);

        let attestation = aggregate.to_attestation().unwrap();
        for input in [&first, &second, &third] {
            let covered = attestation
                .aggregation_bits
                .intersection(&input.aggregation_bits);
            assert_eq!(covered, input.aggregation_bits);
        }
        assert_eq!(attestation.aggregation_bits.num_set_bits(), 3);

        let domain = compute_domain(DOMAIN_BEACON_ATTESTER, Default::default(), B256::ZERO);
        let signing_root = compute_signing_root(&attestation.data, domain);
        assert!(attestation
            .signature
            .fast_aggregate_verify(&[&first_key, &second_key, &third_key], signing_root)
            .unwrap());
        assert!(!attestation
            .signature
            .fast_aggregate_verify(&[&first_key, &second_key], signing_root)
            .unwrap());
    }

    #[test]
    fn test_rejects_overlap_and_other_data() {
        let (first, _) = participant(0);
        let (same_participant, _) = participant(0);
        let (other_data, _) = participant(1);
        let other_data = Attestation {
            data: AttestationData {
                slot: 9,
                ..other_data.data
            },
            ..other_data
        };

        let mut aggregate = AttestationAggregate::new(&first);
        assert!(!aggregate.add(&same_participant));
        assert!(!aggregate.add(&other_data));
        assert_eq!(aggregate.len(), 1);
        assert_eq!(aggregate.to_attestation().unwrap(), first);
    }
}
