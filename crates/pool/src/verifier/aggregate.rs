use alloy_primitives::B256;
use itertools::Itertools;
use ream_consensus::{
    attestation_data::AttestationData, misc::compute_signing_root, pubkey::PubKey,
    signature::BlsSignature,
};
use ssz_types::{typenum::U2048, BitList};
use tracing::debug;

use super::VerificationResult;
use crate::input::ReceivedAttestation;

struct Entry {
    attestation: ReceivedAttestation,
    pubkeys: Vec<PubKey>,
}

impl Entry {
    fn verify(&self, signing_root: B256) -> bool {
        let pubkeys = self.pubkeys.iter().collect::<Vec<_>>();
        self.attestation
            .message
            .signature
            .fast_aggregate_verify(&pubkeys, signing_root)
            .unwrap_or(false)
    }
}

/// Verifies the signatures of attestations sharing a signature domain.
///
/// Attestations with the same data and disjoint participants are folded into one aggregate and
/// checked with a single fast aggregate verification. Only when that fails, or for attestations
/// that could not be folded in, the signatures are checked one by one.
pub struct AggregateSignatureVerifier {
    domain: B256,
    entries: Vec<Entry>,
}

impl AggregateSignatureVerifier {
    pub fn new(domain: B256) -> Self {
        Self {
            domain,
            entries: vec![],
        }
    }

    /// Queue ``attestation`` signed by ``pubkeys``, the keys of its participants.
    pub fn add(&mut self, attestation: ReceivedAttestation, pubkeys: Vec<PubKey>) {
        self.entries.push(Entry {
            attestation,
            pubkeys,
        });
    }

    pub fn verify(self) -> VerificationResult {
        let domain = self.domain;
        self.entries
            .into_iter()
            .into_group_map_by(|entry| entry.attestation.message.data)
            .into_iter()
            .map(|(data, entries)| verify_group(data, domain, entries))
            .fold(VerificationResult::empty(), VerificationResult::merge)
    }
}

fn verify_group(
    data: AttestationData,
    domain: B256,
    mut entries: Vec<Entry>,
) -> VerificationResult {
    let signing_root = compute_signing_root(&data, domain);
    entries.sort_by_key(|entry| {
        std::cmp::Reverse(entry.attestation.message.aggregation_bits.num_set_bits())
    });

    let (aggregated, rest) = split_disjoint(entries);
    let mut result = VerificationResult::empty();
    let remaining = if aggregated.len() > 1 && verify_aggregated(&aggregated, signing_root) {
        result
            .valid
            .extend(aggregated.into_iter().map(|entry| entry.attestation));
        rest
    } else {
        if aggregated.len() > 1 {
            debug!(slot = data.slot, "Aggregate signature check failed, verifying one by one");
        }
        aggregated.into_iter().chain(rest).collect()
    };

    for entry in remaining {
        if entry.verify(signing_root) {
            result.valid.push(entry.attestation);
        } else {
            result.invalid.push(entry.attestation);
        }
    }
    result
}

/// Split ``entries`` into a prefix-greedy set of attestations with disjoint participants and the
/// rest.
fn split_disjoint(entries: Vec<Entry>) -> (Vec<Entry>, Vec<Entry>) {
    let mut participants: Option<BitList<U2048>> = None;
    let mut aggregated = vec![];
    let mut rest = vec![];

    for entry in entries {
        let bits = &entry.attestation.message.aggregation_bits;
        match &participants {
            None => {
                participants = Some(bits.clone());
                aggregated.push(entry);
            }
            Some(union)
                if union.len() == bits.len() && union.intersection(bits).is_zero() =>
            {
                participants = Some(union.union(bits));
                aggregated.push(entry);
            }
            Some(_) => rest.push(entry),
        }
    }
    (aggregated, rest)
}

fn verify_aggregated(entries: &[Entry], signing_root: B256) -> bool {
    let signatures = entries
        .iter()
        .map(|entry| &entry.attestation.message.signature)
        .collect::<Vec<_>>();
    let Ok(signature) = BlsSignature::aggregate(&signatures) else {
        return false;
    };
    let pubkeys = entries
        .iter()
        .flat_map(|entry| entry.pubkeys.iter())
        .collect::<Vec<_>>();
    signature
        .fast_aggregate_verify(&pubkeys, signing_root)
        .unwrap_or(false)
}
