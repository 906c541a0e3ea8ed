pub mod in_memory;
pub mod tuple;

use alloy_primitives::B256;
use ream_consensus::{checkpoint::Checkpoint, phase0::beacon_block::BeaconBlock};

pub use crate::{in_memory::InMemoryStorage, tuple::BeaconTuple};

/// Block and state storage shared by the pool and fork choice.
///
/// Storage is append-only: a tuple, once put, is never replaced, so concurrent readers never
/// observe a key changing under them.
pub trait BeaconChainStorage: Send + Sync {
    fn get_block(&self, root: B256) -> anyhow::Result<Option<BeaconBlock>>;

    fn get_tuple(&self, root: B256) -> anyhow::Result<Option<BeaconTuple>>;

    fn put_tuple(&self, tuple: BeaconTuple) -> anyhow::Result<()>;

    fn contains_block(&self, root: B256) -> anyhow::Result<bool> {
        Ok(self.get_block(root)?.is_some())
    }

    /// Roots of the imported blocks whose parent is ``root``.
    fn get_children(&self, root: B256) -> anyhow::Result<Vec<B256>>;

    fn get_justified_checkpoint(&self) -> anyhow::Result<Checkpoint>;

    fn set_justified_checkpoint(&self, checkpoint: Checkpoint) -> anyhow::Result<()>;

    fn get_finalized_checkpoint(&self) -> anyhow::Result<Checkpoint>;

    fn set_finalized_checkpoint(&self, checkpoint: Checkpoint) -> anyhow::Result<()>;
}
