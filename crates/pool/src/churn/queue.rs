use std::collections::VecDeque;

use ream_consensus::{attestation::Attestation, primitives::Epoch};

/// Verified attestations held by the churn, oldest first.
///
/// Only attestations with a target epoch within `[lower, upper + lookahead]` are kept. When the
/// queue exceeds its size the oldest attestations are dropped.
#[derive(Debug)]
pub struct ChurnQueue {
    attestations: VecDeque<Attestation>,
    lower_epoch: Epoch,
    upper_epoch: Epoch,
    lookahead: Epoch,
    max_size: usize,
}

impl ChurnQueue {
    pub fn new(lookahead: Epoch, max_size: usize) -> Self {
        Self {
            attestations: VecDeque::new(),
            lower_epoch: 0,
            upper_epoch: 0,
            lookahead,
            max_size: max_size.max(1),
        }
    }

    pub fn lower_epoch(&self) -> Epoch {
        self.lower_epoch
    }

    pub fn upper_epoch(&self) -> Epoch {
        self.upper_epoch
    }

    fn accepts(&self, epoch: Epoch) -> bool {
        self.lower_epoch <= epoch && epoch <= self.upper_epoch.saturating_add(self.lookahead)
    }

    /// Move the epoch window and drop attestations falling out of it.
    pub fn update_epoch_boundaries(&mut self, lower: Epoch, upper: Epoch) {
        self.lower_epoch = lower;
        self.upper_epoch = upper.max(lower);
        let (lower, upper) = (self.lower_epoch, self.upper_epoch.saturating_add(self.lookahead));
        self.attestations.retain(|attestation| {
            let epoch = attestation.data.target.epoch;
            lower <= epoch && epoch <= upper
        });
    }

    pub fn add(&mut self, attestations: impl IntoIterator<Item = Attestation>) {
        for attestation in attestations {
            if self.accepts(attestation.data.target.epoch) {
                self.attestations.push_back(attestation);
            }
        }
        while self.attestations.len() > self.max_size {
            self.attestations.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attestation> {
        self.attestations.iter()
    }

    pub fn len(&self) -> usize {
        self.attestations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attestations.is_empty()
    }
}
