use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use alloy_primitives::B256;
use ream_consensus::{
    constants::GENESIS_EPOCH,
    misc::compute_epoch_at_slot,
    phase0::beacon_block::BeaconBlock,
    primitives::{Epoch, Slot},
};
use ream_storage::BeaconChainStorage;
use tracing::warn;

use crate::input::ReceivedAttestation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The referenced block is imported, the attestation can proceed.
    Known,
    /// Buffered until the referenced block is imported.
    Pending,
    /// The pool is at capacity, the attestation is rejected.
    Full,
    /// The target epoch is outside of the tracked epochs.
    OutOfWindow,
}

impl InsertOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, InsertOutcome::Pending)
    }
}

/// Attestations waiting for the block they vote for.
///
/// Entries are bucketed by target epoch. Only the previous, the current and the lookahead epochs
/// are tracked; buckets falling behind the baseline are dropped together with their attestations.
pub struct UnknownAttestationPool {
    storage: Arc<dyn BeaconChainStorage>,
    queue: EpochQueue,
    max_size: usize,
}

impl UnknownAttestationPool {
    pub fn new(
        storage: Arc<dyn BeaconChainStorage>,
        max_attestation_lookahead: Epoch,
        max_size: usize,
    ) -> Self {
        Self {
            storage,
            queue: EpochQueue::new(2 + max_attestation_lookahead),
            max_size,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.queue.baseline.is_some()
    }

    pub fn feed_new_slot(&mut self, slot: Slot) {
        let baseline = compute_epoch_at_slot(slot)
            .saturating_sub(1)
            .max(GENESIS_EPOCH);
        self.queue.move_baseline(baseline);
    }

    pub fn add(&mut self, attestation: ReceivedAttestation) -> InsertOutcome {
        let root = attestation.message.data.beacon_block_root;
        match self.storage.contains_block(root) {
            Ok(true) => return InsertOutcome::Known,
            Ok(false) => {}
            Err(err) => warn!(?root, "Failed to look up block: {err}"),
        }

        if self.queue.len() >= self.max_size {
            return InsertOutcome::Full;
        }
        let epoch = attestation.message.data.target.epoch;
        if self.queue.add(epoch, root, attestation) {
            InsertOutcome::Pending
        } else {
            InsertOutcome::OutOfWindow
        }
    }

    /// Release every attestation that was waiting for ``block``.
    pub fn feed_new_imported_block(&mut self, block: &BeaconBlock) -> Vec<ReceivedAttestation> {
        self.queue.evict(block.block_root())
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
struct EpochBucket {
    roots: HashMap<B256, Vec<ReceivedAttestation>>,
    size: usize,
}

impl EpochBucket {
    fn add(&mut self, root: B256, attestation: ReceivedAttestation) {
        self.roots.entry(root).or_default().push(attestation);
        self.size += 1;
    }

    fn evict(&mut self, root: B256) -> Vec<ReceivedAttestation> {
        let evicted = self.roots.remove(&root).unwrap_or_default();
        self.size -= evicted.len();
        evicted
    }
}

struct EpochQueue {
    buckets: VecDeque<EpochBucket>,
    tracked_epochs: u64,
    baseline: Option<Epoch>,
}

impl EpochQueue {
    fn new(tracked_epochs: u64) -> Self {
        Self {
            buckets: VecDeque::new(),
            tracked_epochs,
            baseline: None,
        }
    }

    fn move_baseline(&mut self, new_baseline: Epoch) {
        if let Some(baseline) = self.baseline {
            if new_baseline <= baseline {
                return;
            }
            for _ in 0..(new_baseline - baseline).min(self.tracked_epochs) {
                self.buckets.pop_front();
            }
        }
        while (self.buckets.len() as u64) < self.tracked_epochs {
            self.buckets.push_back(EpochBucket::default());
        }
        self.baseline = Some(new_baseline);
    }

    fn bucket_mut(&mut self, epoch: Epoch) -> Option<&mut EpochBucket> {
        let baseline = self.baseline?;
        let offset = epoch.checked_sub(baseline)?;
        self.buckets.get_mut(usize::try_from(offset).ok()?)
    }

    fn add(&mut self, epoch: Epoch, root: B256, attestation: ReceivedAttestation) -> bool {
        match self.bucket_mut(epoch) {
            Some(bucket) => {
                bucket.add(root, attestation);
                true
            }
            None => false,
        }
    }

    fn evict(&mut self, root: B256) -> Vec<ReceivedAttestation> {
        self.buckets
            .iter_mut()
            .flat_map(|bucket| bucket.evict(root))
            .collect()
    }

    fn len(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use ream_storage::{BeaconTuple, InMemoryStorage};

    use super::*;
    use crate::test_utils::{attestation_with, received, TestChain};

    struct Fixture {
        pool: UnknownAttestationPool,
        storage: InMemoryStorage,
        genesis: BeaconTuple,
        /// A block that exists but has not been imported
        missing: BeaconTuple,
    }

    fn fixture(max_size: usize) -> Fixture {
        let chain = TestChain::new(64);
        let storage = InMemoryStorage::from_genesis(chain.genesis.clone());
        let mut pool = UnknownAttestationPool::new(Arc::new(storage.clone()), 1, max_size);
        pool.feed_new_slot(100);
        Fixture {
            pool,
            storage,
            missing: chain.produce(&chain.genesis, 1, vec![]),
            genesis: chain.genesis,
        }
    }

    fn voting_for(root: B256, slot: Slot, target_epoch: Epoch) -> ReceivedAttestation {
        received(attestation_with(slot, 0, target_epoch, |a| {
            a.data.beacon_block_root = root
        }))
    }

    #[test]
    fn test_requires_slot() {
        let pool = UnknownAttestationPool::new(Arc::new(InMemoryStorage::new()), 1, 16);
        assert!(!pool.is_initialized());
    }

    #[test]
    fn test_known_block_passes_through() {
        let Fixture { mut pool, genesis, .. } = fixture(16);

        assert_eq!(pool.add(voting_for(genesis.root(), 96, 3)), InsertOutcome::Known);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_resolved_exactly_once() {
        let Fixture {
            mut pool,
            genesis,
            missing,
            ..
        } = fixture(16);
        let attestation = voting_for(missing.root(), 96, 3);

        assert!(pool.add(attestation.clone()).is_pending());
        assert_eq!(pool.len(), 1);

        assert!(pool.feed_new_imported_block(&genesis.block).is_empty());
        assert_eq!(pool.feed_new_imported_block(&missing.block), vec![attestation]);
        assert!(pool.feed_new_imported_block(&missing.block).is_empty());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_expired_attestation_is_not_released() {
        let Fixture {
            mut pool, missing, ..
        } = fixture(16);
        // slot 100 is epoch 3, baseline is epoch 2
        assert!(pool.add(voting_for(missing.root(), 96, 3)).is_pending());
        assert!(pool.add(voting_for(missing.root(), 64, 2)).is_pending());

        // epoch 5 moves the baseline to 4, both buckets are dropped
        pool.feed_new_slot(5 * 32);
        assert!(pool.is_empty());
        assert!(pool.feed_new_imported_block(&missing.block).is_empty());
    }

    #[rstest::rstest]
    #[case(1, InsertOutcome::OutOfWindow)]
    #[case(2, InsertOutcome::Pending)]
    #[case(4, InsertOutcome::Pending)]
    #[case(5, InsertOutcome::OutOfWindow)]
    fn test_tracked_epochs(#[case] target_epoch: Epoch, #[case] expected: InsertOutcome) {
        let Fixture {
            mut pool, missing, ..
        } = fixture(16);
        let attestation = voting_for(missing.root(), target_epoch * 32, target_epoch);
        assert_eq!(pool.add(attestation), expected);
    }

    #[test]
    fn test_full_pool_rejects_new_entries() {
        let Fixture {
            mut pool, missing, ..
        } = fixture(2);
        assert!(pool.add(voting_for(missing.root(), 96, 3)).is_pending());
        assert!(pool.add(voting_for(missing.root(), 97, 3)).is_pending());
        assert_eq!(
            pool.add(voting_for(missing.root(), 98, 3)),
            InsertOutcome::Full
        );
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_block_imported_after_add_is_known() {
        let Fixture {
            mut pool,
            storage,
            missing,
            ..
        } = fixture(16);
        let attestation = voting_for(missing.root(), 96, 3);
        assert!(pool.add(attestation.clone()).is_pending());

        storage.put_tuple(missing.clone()).unwrap();
        assert_eq!(pool.add(attestation.clone()), InsertOutcome::Known);
        assert_eq!(pool.feed_new_imported_block(&missing.block), vec![attestation]);
    }
}
