use tokio::sync::mpsc;
use tracing::{debug, info};

use super::Downstream;
use crate::{input::PoolInput, registry::ProcessedAttestations};

/// Makes sure an attestation enters the expensive stages at most once.
pub struct DoubleWorkProcessor {
    registry: ProcessedAttestations,
    downstream: Downstream,
}

impl DoubleWorkProcessor {
    pub fn new(registry: ProcessedAttestations, downstream: Downstream) -> Self {
        Self {
            registry,
            downstream,
        }
    }

    pub async fn run(mut self, mut inbox: mpsc::Receiver<PoolInput>) {
        while let Some(input) = inbox.recv().await {
            if let PoolInput::Attestation(attestation) = &input {
                if !self.registry.add(&attestation.message) {
                    debug!(sender = %attestation.sender, "Attestation already processed");
                    continue;
                }
            }
            if !self.downstream.forward(input).await {
                break;
            }
        }
        info!(next = self.downstream.stage(), "Double work processor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        processor::stage_channel,
        test_utils::{attestation_with, received},
    };

    #[tokio::test]
    async fn test_duplicates_are_dropped() {
        let (downstream, mut output) = stage_channel("encoding", 16);
        let (input, inbox) = mpsc::channel(16);
        let processor = DoubleWorkProcessor::new(ProcessedAttestations::new(16), downstream);
        tokio::spawn(processor.run(inbox));

        let first = received(attestation_with(96, 0, 3, |_| {}));
        let second = received(attestation_with(97, 0, 3, |_| {}));
        for attestation in [&first, &first, &second, &first] {
            input.send(attestation.clone().into()).await.unwrap();
        }
        drop(input);

        let mut forwarded = vec![];
        while let Some(PoolInput::Attestation(attestation)) = output.recv().await {
            forwarded.push(attestation);
        }
        assert_eq!(forwarded, vec![first, second]);
    }
}
