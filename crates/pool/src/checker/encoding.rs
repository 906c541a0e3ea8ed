use ream_consensus::attestation::Attestation;

/// Checks that the signature bytes decode to a G2 point without running a pairing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureEncodingChecker;

impl SignatureEncodingChecker {
    pub fn check(&self, attestation: &Attestation) -> bool {
        attestation.signature.is_valid_encoding()
    }
}
