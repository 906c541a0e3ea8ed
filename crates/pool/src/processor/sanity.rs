use ream_executor::publisher::Publisher;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::Downstream;
use crate::{
    checker::SanityChecker,
    input::{PoolInput, ReceivedAttestation},
};

pub struct SanityProcessor {
    checker: SanityChecker,
    downstream: Downstream,
    invalid: Publisher<ReceivedAttestation>,
}

impl SanityProcessor {
    pub fn new(
        checker: SanityChecker,
        downstream: Downstream,
        invalid: Publisher<ReceivedAttestation>,
    ) -> Self {
        Self {
            checker,
            downstream,
            invalid,
        }
    }

    pub async fn run(mut self, mut inbox: mpsc::Receiver<PoolInput>) {
        while let Some(input) = inbox.recv().await {
            if let PoolInput::FinalizedCheckpoint(checkpoint) = &input {
                self.checker.feed_finalized_checkpoint(*checkpoint);
            }
            if let PoolInput::Attestation(attestation) = &input {
                if !self.checker.is_initialized() {
                    debug!("No finalized checkpoint yet, dropping attestation");
                    continue;
                }
                if !self.checker.check(&attestation.message) {
                    debug!(sender = %attestation.sender, "Attestation failed sanity checks");
                    self.invalid.publish(attestation.clone());
                    continue;
                }
            }

            if !self.downstream.forward(input).await {
                break;
            }
        }
        info!(next = self.downstream.stage(), "Sanity processor stopped");
    }
}
