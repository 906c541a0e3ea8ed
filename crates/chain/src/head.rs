use std::{collections::HashMap, sync::Arc};

use alloy_primitives::B256;
use ream_consensus::{
    attestation::Attestation, phase0::beacon_block::BeaconBlock, primitives::Gwei,
    pubkey::PubKey,
};
use ream_storage::BeaconChainStorage;
use tracing::trace;

use crate::error::ChainError;

/// Selects the canonical head given the latest attestation of each validator.
pub trait HeadFunction: Send + Sync {
    fn get_head(
        &self,
        latest_attestation: &dyn Fn(&PubKey) -> Option<Attestation>,
    ) -> Result<BeaconBlock, ChainError>;
}

/// Latest Message Driven Greediest Heaviest Observed SubTree over the blocks in storage.
///
/// Starting at the justified block, descends into the child whose subtree carries the most
/// effective balance among the latest votes of the validators active at the justified state.
/// Equal weights are broken by the greater block root.
pub struct LmdGhostHeadFunction {
    storage: Arc<dyn BeaconChainStorage>,
}

impl LmdGhostHeadFunction {
    pub fn new(storage: Arc<dyn BeaconChainStorage>) -> Self {
        Self { storage }
    }

    /// Effective balance voting for every block above ``justified_slot``, summed over the subtree.
    fn get_weights(
        &self,
        votes: HashMap<B256, Gwei>,
        justified_slot: u64,
    ) -> anyhow::Result<HashMap<B256, Gwei>> {
        let mut weights = HashMap::<B256, Gwei>::new();
        for (vote_root, balance) in votes {
            let mut current_root = vote_root;
            while let Some(block) = self.storage.get_block(current_root)? {
                if block.slot <= justified_slot {
                    break;
                }
                *weights.entry(current_root).or_default() += balance;
                current_root = block.parent_root;
            }
        }
        Ok(weights)
    }
}

impl HeadFunction for LmdGhostHeadFunction {
    fn get_head(
        &self,
        latest_attestation: &dyn Fn(&PubKey) -> Option<Attestation>,
    ) -> Result<BeaconBlock, ChainError> {
        let justified = self.storage.get_justified_checkpoint()?;
        let justified_tuple = self
            .storage
            .get_tuple(justified.root)?
            .ok_or(ChainError::MissingJustifiedBlock {
                root: justified.root,
            })?;
        let state = &justified_tuple.state;

        let mut votes = HashMap::<B256, Gwei>::new();
        for index in state.get_active_validator_indices(state.get_current_epoch()) {
            let validator = &state.validators[index as usize];
            if let Some(attestation) = latest_attestation(&validator.pubkey) {
                *votes.entry(attestation.data.beacon_block_root).or_default() +=
                    validator.effective_balance;
            }
        }
        let weights = self.get_weights(votes, justified_tuple.block.slot)?;

        let mut head = justified.root;
        loop {
            let children = self.storage.get_children(head)?;
            let Some(next) = children
                .into_iter()
                .max_by_key(|root| (weights.get(root).copied().unwrap_or_default(), *root))
            else {
                break;
            };
            trace!(?next, weight = weights.get(&next).copied().unwrap_or_default(), "Descending");
            head = next;
        }

        self.storage
            .get_block(head)?
            .ok_or(ChainError::MissingHeadTuple { root: head })
    }
}
