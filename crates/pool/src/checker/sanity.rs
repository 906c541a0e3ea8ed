use ream_consensus::{
    attestation::Attestation,
    checkpoint::Checkpoint,
    constants::{GENESIS_EPOCH, MAX_COMMITTEES_PER_SLOT},
};

/// Cheap structural checks run before any state is touched.
#[derive(Debug, Default)]
pub struct SanityChecker {
    finalized_checkpoint: Option<Checkpoint>,
}

impl SanityChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed_finalized_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.finalized_checkpoint = Some(checkpoint);
    }

    pub fn is_initialized(&self) -> bool {
        self.finalized_checkpoint.is_some()
    }

    pub fn check(&self, attestation: &Attestation) -> bool {
        let Some(finalized) = self.finalized_checkpoint else {
            return false;
        };
        let data = &attestation.data;

        if data.source.epoch > data.target.epoch {
            return false;
        }
        if data.target.epoch < finalized.epoch || data.source.epoch < finalized.epoch {
            return false;
        }
        // checkpoint roots are not known to the state at genesis
        if data.source.epoch == finalized.epoch
            && finalized.epoch != GENESIS_EPOCH
            && data.source.root != finalized.root
        {
            return false;
        }
        if data.index >= MAX_COMMITTEES_PER_SLOT {
            return false;
        }
        if attestation.aggregation_bits.is_zero() {
            return false;
        }

        attestation.custody_bits.len() <= attestation.aggregation_bits.len()
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::B256;

    use super::*;
    use crate::test_utils::attestation_with;

    fn finalized(epoch: u64) -> Checkpoint {
        Checkpoint {
            epoch,
            root: B256::repeat_byte(0xf1),
        }
    }

    fn checker(finalized_epoch: u64) -> SanityChecker {
        let mut checker = SanityChecker::new();
        checker.feed_finalized_checkpoint(finalized(finalized_epoch));
        checker
    }

    #[test]
    fn test_not_initialized() {
        let checker = SanityChecker::new();
        assert!(!checker.is_initialized());
        assert!(!checker.check(&attestation_with(96, 0, 1, |_| {})));
    }

    fn out_of_range_committee(attestation: &mut Attestation) {
        attestation.data.index = MAX_COMMITTEES_PER_SLOT;
    }

    fn clear_participants(attestation: &mut Attestation) {
        attestation.aggregation_bits = ssz_types::BitList::with_capacity(4).unwrap();
    }

    fn long_custody_bits(attestation: &mut Attestation) {
        attestation.custody_bits = ssz_types::BitList::with_capacity(64).unwrap();
    }

    #[rstest::rstest]
    #[case::plain(0, 1, |_: &mut Attestation| {}, true)]
    #[case::source_after_target(0, 1, |a: &mut Attestation| a.data.source.epoch = 2, false)]
    #[case::target_before_finalized(5, 1, |_: &mut Attestation| {}, false)]
    #[case::committee_out_of_range(0, 1, out_of_range_committee, false)]
    #[case::no_participants(0, 1, clear_participants, false)]
    #[case::long_custody_bits(0, 1, long_custody_bits, false)]
    fn test_check(
        #[case] finalized_epoch: u64,
        #[case] target_epoch: u64,
        #[case] mutate: fn(&mut Attestation),
        #[case] expected: bool,
    ) {
        let attestation = attestation_with(96, 0, target_epoch, mutate);
        assert_eq!(checker(finalized_epoch).check(&attestation), expected);
    }

    #[test]
    fn test_source_root_must_match_finalized() {
        let checker = checker(2);
        let matching = attestation_with(96, 2, 3, |a| a.data.source.root = finalized(2).root);
        let other = attestation_with(96, 2, 3, |a| a.data.source.root = B256::repeat_byte(7));

        assert!(checker.check(&matching));
        assert!(!checker.check(&other));
    }

    #[test]
    fn test_source_before_finalized() {
        let checker = checker(2);
        assert!(!checker.check(&attestation_with(96, 1, 3, |_| {})));
    }
}
