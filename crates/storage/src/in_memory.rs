use std::{collections::HashMap, sync::Arc};

use alloy_primitives::B256;
use parking_lot::RwLock;
use ream_consensus::{
    checkpoint::Checkpoint, misc::compute_epoch_at_slot, phase0::beacon_block::BeaconBlock,
};
use tracing::debug;

use crate::{tuple::BeaconTuple, BeaconChainStorage};

#[derive(Default)]
struct Tables {
    tuples: HashMap<B256, BeaconTuple>,
    children: HashMap<B256, Vec<B256>>,
    justified_checkpoint: Checkpoint,
    finalized_checkpoint: Checkpoint,
}

/// A thread-safe in-memory storage.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage holding ``genesis`` as the justified and finalized anchor.
    pub fn from_genesis(genesis: BeaconTuple) -> Self {
        let checkpoint = Checkpoint {
            epoch: compute_epoch_at_slot(genesis.block.slot),
            root: genesis.root(),
        };
        let storage = Self::new();
        {
            let mut tables = storage.tables.write();
            tables.justified_checkpoint = checkpoint;
            tables.finalized_checkpoint = checkpoint;
            tables.tuples.insert(checkpoint.root, genesis);
        }
        storage
    }

    pub fn len(&self) -> usize {
        self.tables.read().tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BeaconChainStorage for InMemoryStorage {
    fn get_block(&self, root: B256) -> anyhow::Result<Option<BeaconBlock>> {
        Ok(self
            .tables
            .read()
            .tuples
            .get(&root)
            .map(|tuple| tuple.block.clone()))
    }

    fn get_tuple(&self, root: B256) -> anyhow::Result<Option<BeaconTuple>> {
        Ok(self.tables.read().tuples.get(&root).cloned())
    }

    fn put_tuple(&self, tuple: BeaconTuple) -> anyhow::Result<()> {
        let root = tuple.root();
        let mut tables = self.tables.write();
        if tables.tuples.contains_key(&root) {
            debug!(?root, "Tuple already stored");
            return Ok(());
        }
        tables
            .children
            .entry(tuple.block.parent_root)
            .or_default()
            .push(root);
        tables.tuples.insert(root, tuple);
        Ok(())
    }

    fn contains_block(&self, root: B256) -> anyhow::Result<bool> {
        Ok(self.tables.read().tuples.contains_key(&root))
    }

    fn get_children(&self, root: B256) -> anyhow::Result<Vec<B256>> {
        Ok(self
            .tables
            .read()
            .children
            .get(&root)
            .cloned()
            .unwrap_or_default())
    }

    fn get_justified_checkpoint(&self) -> anyhow::Result<Checkpoint> {
        Ok(self.tables.read().justified_checkpoint)
    }

    fn set_justified_checkpoint(&self, checkpoint: Checkpoint) -> anyhow::Result<()> {
        self.tables.write().justified_checkpoint = checkpoint;
        Ok(())
    }

    fn get_finalized_checkpoint(&self) -> anyhow::Result<Checkpoint> {
        Ok(self.tables.read().finalized_checkpoint)
    }

    fn set_finalized_checkpoint(&self, checkpoint: Checkpoint) -> anyhow::Result<()> {
        self.tables.write().finalized_checkpoint = checkpoint;
        Ok(())
    }
}
