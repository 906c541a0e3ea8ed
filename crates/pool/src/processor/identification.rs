use ream_executor::publisher::Publisher;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::Downstream;
use crate::{
    input::{PoolInput, ReceivedAttestation},
    registry::{InsertOutcome, UnknownAttestationPool},
};

/// Holds back attestations voting for blocks that are not imported yet.
///
/// Attestations whose block is known are published on the identified stream and forwarded.
/// Pending attestations are published on the unknown stream and released once their block is
/// imported.
pub struct IdentificationProcessor {
    pool: UnknownAttestationPool,
    downstream: Downstream,
    identified: Publisher<ReceivedAttestation>,
    unknown: Publisher<ReceivedAttestation>,
    invalid: Publisher<ReceivedAttestation>,
}

impl IdentificationProcessor {
    pub fn new(
        pool: UnknownAttestationPool,
        downstream: Downstream,
        identified: Publisher<ReceivedAttestation>,
        unknown: Publisher<ReceivedAttestation>,
        invalid: Publisher<ReceivedAttestation>,
    ) -> Self {
        Self {
            pool,
            downstream,
            identified,
            unknown,
            invalid,
        }
    }

    pub async fn run(mut self, mut inbox: mpsc::Receiver<PoolInput>) {
        while let Some(input) = inbox.recv().await {
            if !self.process(input).await {
                break;
            }
        }
        info!(next = self.downstream.stage(), "Identification processor stopped");
    }

    async fn process(&mut self, input: PoolInput) -> bool {
        match input {
            PoolInput::NewSlot(slot) => {
                self.pool.feed_new_slot(slot);
                self.downstream.forward(input).await
            }
            PoolInput::ImportedBlock(ref block) => {
                let released = self.pool.feed_new_imported_block(block);
                if !released.is_empty() {
                    debug!(slot = block.slot, count = released.len(), "Releasing attestations");
                }
                for attestation in released {
                    if !self.identify(attestation).await {
                        return false;
                    }
                }
                self.downstream.forward(input).await
            }
            PoolInput::Attestation(attestation) => {
                if !self.pool.is_initialized() {
                    debug!("No slot seen yet, dropping attestation");
                    return true;
                }
                match self.pool.add(attestation.clone()) {
                    InsertOutcome::Known => self.identify(attestation).await,
                    InsertOutcome::Pending => {
                        self.unknown.publish(attestation);
                        true
                    }
                    InsertOutcome::Full => {
                        warn!(sender = %attestation.sender, "Unknown attestation pool is full");
                        self.invalid.publish(attestation);
                        true
                    }
                    InsertOutcome::OutOfWindow => {
                        debug!(
                            target_epoch = attestation.message.data.target.epoch,
                            "Unknown attestation is out of the tracked epochs"
                        );
                        true
                    }
                }
            }
            PoolInput::FinalizedCheckpoint(_)
            | PoolInput::JustifiedCheckpoint(_)
            | PoolInput::ChainHead(_) => self.downstream.forward(input).await,
        }
    }

    async fn identify(&self, attestation: ReceivedAttestation) -> bool {
        self.identified.publish(attestation.clone());
        self.downstream.forward(attestation.into()).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ream_storage::BeaconChainStorage;

    use super::*;
    use crate::{
        processor::stage_channel,
        test_utils::{attestation_with, received, TestChain},
    };

    #[tokio::test]
    async fn test_attestation_is_released_after_import() {
        let chain = TestChain::new(64);
        let storage = chain.storage();
        let missing = chain.produce(&chain.genesis, 1, vec![]);

        let (downstream, mut output) = stage_channel("verification", 16);
        let identified = Publisher::new("identified", 16);
        let unknown = Publisher::new("unknown", 16);
        let mut identified_stream = identified.subscribe();
        let mut unknown_stream = unknown.subscribe();
        let processor = IdentificationProcessor::new(
            UnknownAttestationPool::new(Arc::new(storage.clone()), 1, 16),
            downstream,
            identified,
            unknown,
            Publisher::new("invalid", 16),
        );
        let (input, inbox) = mpsc::channel(16);
        tokio::spawn(processor.run(inbox));

        let known = received(attestation_with(2, 0, 0, |a| {
            a.data.beacon_block_root = chain.genesis.root()
        }));
        let pending = received(attestation_with(2, 0, 0, |a| {
            a.data.beacon_block_root = missing.root()
        }));

        input.send(PoolInput::NewSlot(2)).await.unwrap();
        input.send(pending.clone().into()).await.unwrap();
        input.send(known.clone().into()).await.unwrap();

        assert!(matches!(output.recv().await, Some(PoolInput::NewSlot(2))));
        assert!(matches!(output.recv().await, Some(PoolInput::Attestation(a)) if a == known));
        assert_eq!(unknown_stream.recv().await, Some(pending.clone()));
        assert_eq!(identified_stream.recv().await, Some(known));

        storage.put_tuple(missing.clone()).unwrap();
        input
            .send(PoolInput::ImportedBlock(missing.block.clone()))
            .await
            .unwrap();

        assert!(matches!(output.recv().await, Some(PoolInput::Attestation(a)) if a == pending));
        assert!(matches!(output.recv().await, Some(PoolInput::ImportedBlock(_))));
        assert_eq!(identified_stream.recv().await, Some(pending));
    }
}
