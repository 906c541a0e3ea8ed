pub mod aggregate;
pub mod attestation;

pub use self::{aggregate::AggregateSignatureVerifier, attestation::AttestationVerifier};
use crate::input::ReceivedAttestation;

/// Verifies attestations in batches. Every input ends up in exactly one of the two output lists.
pub trait BatchVerifier: Send + Sync {
    fn verify(&self, batch: Vec<ReceivedAttestation>) -> VerificationResult;
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct VerificationResult {
    pub valid: Vec<ReceivedAttestation>,
    pub invalid: Vec<ReceivedAttestation>,
}

impl VerificationResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn all_invalid(invalid: Vec<ReceivedAttestation>) -> Self {
        Self {
            valid: vec![],
            invalid,
        }
    }

    pub fn merge(mut self, other: VerificationResult) -> Self {
        self.valid.extend(other.valid);
        self.invalid.extend(other.invalid);
        self
    }

    pub fn len(&self) -> usize {
        self.valid.len() + self.invalid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
