use std::sync::Arc;

use ream_consensus::{primitives::Slot, transition::EmptySlotTransition};
use ream_executor::publisher::Publisher;
use ream_storage::BeaconTuple;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    churn::{AttestationChurn, OffChainAggregates},
    input::PoolInput,
};

/// Last stage of the pool. Collects verified attestations and publishes fresh aggregates for the
/// chain head on every new head and every new slot.
pub struct ChurnProcessor {
    churn: Box<dyn AttestationChurn>,
    transition: Arc<dyn EmptySlotTransition>,
    aggregates: Publisher<OffChainAggregates>,
    head: Option<Arc<BeaconTuple>>,
    current_slot: Option<Slot>,
}

impl ChurnProcessor {
    pub fn new(
        churn: Box<dyn AttestationChurn>,
        transition: Arc<dyn EmptySlotTransition>,
        aggregates: Publisher<OffChainAggregates>,
    ) -> Self {
        Self {
            churn,
            transition,
            aggregates,
            head: None,
            current_slot: None,
        }
    }

    pub async fn run(mut self, mut inbox: mpsc::Receiver<PoolInput>) {
        while let Some(input) = inbox.recv().await {
            match input {
                PoolInput::JustifiedCheckpoint(checkpoint) => {
                    self.churn.feed_justified_checkpoint(checkpoint)
                }
                PoolInput::FinalizedCheckpoint(checkpoint) => {
                    self.churn.feed_finalized_checkpoint(checkpoint)
                }
                PoolInput::NewSlot(slot) => {
                    self.churn.feed_new_slot(slot);
                    self.current_slot = Some(slot);
                    self.compute();
                }
                PoolInput::ChainHead(head) => {
                    self.head = Some(head);
                    self.compute();
                }
                PoolInput::Attestation(attestation) => self.churn.add(vec![attestation.message]),
                PoolInput::ImportedBlock(_) => {}
            }
        }
        info!("Churn processor stopped");
    }

    /// Publish aggregates for the head state advanced to the current slot.
    fn compute(&mut self) {
        let Some(head) = &self.head else {
            return;
        };
        if !self.churn.is_initialized() {
            return;
        }

        let slot = self.current_slot.unwrap_or(head.state.slot);
        let tuple = if slot > head.state.slot {
            match self.transition.apply(&head.state, slot) {
                Ok(state) => BeaconTuple::new(head.block.clone(), state),
                Err(err) => {
                    warn!(slot, "Failed to advance head state: {err}");
                    return;
                }
            }
        } else {
            head.as_ref().clone()
        };

        let off_chain = self.churn.compute(&tuple);
        debug!(
            slot = off_chain.slot,
            head = ?off_chain.head_root,
            aggregates = off_chain.aggregates.len(),
            "Computed off chain aggregates"
        );
        self.aggregates.publish(off_chain);
    }
}

#[cfg(test)]
mod tests {
    use ream_consensus::transition::ProcessSlotsTransition;

    use super::*;
    use crate::{
        churn::InMemoryAttestationChurn,
        test_utils::{received, TestChain},
    };

    #[tokio::test]
    async fn test_aggregates_follow_head_and_slot() {
        let chain = TestChain::new(64);
        let block = chain.produce(&chain.genesis, 1, vec![]);
        let aggregates = Publisher::replay_last("aggregates", 16);
        let mut stream = aggregates.subscribe();
        let processor = ChurnProcessor::new(
            Box::new(InMemoryAttestationChurn::new(1, 1024)),
            Arc::new(ProcessSlotsTransition),
            aggregates,
        );
        let (input, inbox) = mpsc::channel(16);
        tokio::spawn(processor.run(inbox));

        let attestation = chain.attest(&block, 1, 0);
        input.send(PoolInput::NewSlot(1)).await.unwrap();
        input
            .send(PoolInput::ChainHead(Arc::new(block.clone())))
            .await
            .unwrap();
        input.send(received(attestation.clone()).into()).await.unwrap();
        input.send(PoolInput::NewSlot(2)).await.unwrap();

        // head at slot 1, the attestation is not there yet
        let first = stream.recv().await.unwrap();
        assert_eq!(first.head_root, block.root());
        assert_eq!(first.slot, 1);
        assert!(first.is_empty());

        // at slot 2 it can be included
        let second = stream.recv().await.unwrap();
        assert_eq!(second.slot, 2);
        assert_eq!(second.aggregates, vec![attestation]);
    }
}
