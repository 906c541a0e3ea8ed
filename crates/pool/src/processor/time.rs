use tokio::sync::mpsc;
use tracing::{debug, info};

use super::Downstream;
use crate::{checker::TimeFrameFilter, input::PoolInput};

/// Drops attestations outside of the time frame. Rejections are not reported as invalid since
/// the attestation may be fine, only too old or too early for this node.
pub struct TimeProcessor {
    filter: TimeFrameFilter,
    downstream: Downstream,
}

impl TimeProcessor {
    pub fn new(filter: TimeFrameFilter, downstream: Downstream) -> Self {
        Self { filter, downstream }
    }

    pub async fn run(mut self, mut inbox: mpsc::Receiver<PoolInput>) {
        while let Some(input) = inbox.recv().await {
            let forward = match &input {
                PoolInput::FinalizedCheckpoint(checkpoint) => {
                    self.filter.feed_finalized_checkpoint(*checkpoint);
                    true
                }
                PoolInput::NewSlot(slot) => {
                    self.filter.feed_new_slot(*slot);
                    true
                }
                PoolInput::Attestation(attestation) => {
                    if !self.filter.is_initialized() {
                        debug!("Time frame is not known yet, dropping attestation");
                        false
                    } else if !self.filter.check(&attestation.message) {
                        debug!(
                            slot = attestation.message.data.slot,
                            target_epoch = attestation.message.data.target.epoch,
                            "Attestation is out of the time frame"
                        );
                        false
                    } else {
                        true
                    }
                }
                PoolInput::JustifiedCheckpoint(_)
                | PoolInput::ImportedBlock(_)
                | PoolInput::ChainHead(_) => true,
            };

            if forward && !self.downstream.forward(input).await {
                break;
            }
        }
        info!(next = self.downstream.stage(), "Time processor stopped");
    }
}
