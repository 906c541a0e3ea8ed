use std::time::Duration;

use ream_consensus::{constants::SLOTS_PER_EPOCH, primitives::Epoch};

/// A number of threads checking signature encodings.
pub const MAX_THREADS: usize = 32;

/// Discard attestations with target epoch greater than current epoch plus this number.
pub const MAX_ATTESTATION_LOOKAHEAD: Epoch = 1;

/// Max number of attestation fingerprints kept by the dedup registry.
pub const MAX_PROCESSED_ATTESTATIONS: usize = 1_000_000;

/// Max number of attestations to not yet known blocks kept in memory.
pub const MAX_UNKNOWN_ATTESTATIONS: usize = 100_000;

/// Max number of verified attestations held by the churn.
pub const MAX_CHURN_ATTESTATIONS: usize = 100_000;

/// Max size of a batch passed on to the verifier.
pub const VERIFIER_BUFFER_SIZE: usize = 10_000;

/// Max time an attestation waits in the verifier buffer.
pub const VERIFIER_INTERVAL: Duration = Duration::from_millis(50);

/// Capacity of stage channels and of every published stream.
pub const CHANNEL_CAPACITY: usize = 16_384;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_threads: usize,
    pub max_attestation_lookahead: Epoch,
    pub max_processed_attestations: usize,
    pub max_unknown_attestations: usize,
    pub max_churn_attestations: usize,
    pub verifier_buffer_size: usize,
    pub verifier_interval: Duration,
    pub channel_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_threads: MAX_THREADS,
            max_attestation_lookahead: MAX_ATTESTATION_LOOKAHEAD,
            max_processed_attestations: MAX_PROCESSED_ATTESTATIONS,
            max_unknown_attestations: MAX_UNKNOWN_ATTESTATIONS,
            max_churn_attestations: MAX_CHURN_ATTESTATIONS,
            verifier_buffer_size: VERIFIER_BUFFER_SIZE,
            verifier_interval: VERIFIER_INTERVAL,
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

impl PoolConfig {
    pub fn lookahead_slots(&self) -> u64 {
        self.max_attestation_lookahead.saturating_mul(SLOTS_PER_EPOCH)
    }
}
