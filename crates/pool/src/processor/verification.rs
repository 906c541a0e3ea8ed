use std::{sync::Arc, time::Duration};

use ream_executor::{publisher::Publisher, TaskSpawner};
use tokio::{
    sync::mpsc,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info};

use super::Downstream;
use crate::{
    input::{PoolInput, ReceivedAttestation},
    verifier::{BatchVerifier, VerificationResult},
};

/// Buffers identified attestations and verifies them in batches.
///
/// A batch is dispatched once the buffer is full or the interval elapses, whichever comes first.
/// Control events flush the buffer before they are forwarded so that verified attestations keep
/// their position relative to slots and checkpoints.
pub struct VerificationProcessor {
    verifier: Arc<dyn BatchVerifier>,
    spawner: TaskSpawner,
    buffer_size: usize,
    interval: Duration,
    buffer: Vec<ReceivedAttestation>,
    downstream: Downstream,
    valid: Publisher<ReceivedAttestation>,
    invalid: Publisher<ReceivedAttestation>,
}

impl VerificationProcessor {
    pub fn new(
        verifier: Arc<dyn BatchVerifier>,
        spawner: TaskSpawner,
        buffer_size: usize,
        interval: Duration,
        downstream: Downstream,
        valid: Publisher<ReceivedAttestation>,
        invalid: Publisher<ReceivedAttestation>,
    ) -> Self {
        Self {
            verifier,
            spawner,
            buffer_size: buffer_size.max(1),
            interval,
            buffer: vec![],
            downstream,
            valid,
            invalid,
        }
    }

    pub async fn run(mut self, mut inbox: mpsc::Receiver<PoolInput>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                input = inbox.recv() => {
                    let Some(input) = input else {
                        self.flush().await;
                        break;
                    };
                    let keep_going = match input {
                        PoolInput::Attestation(attestation) => {
                            self.buffer.push(attestation);
                            self.buffer.len() < self.buffer_size || self.flush().await
                        }
                        control => self.flush().await && self.downstream.forward(control).await,
                    };
                    if !keep_going {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if !self.flush().await {
                        break;
                    }
                }
            }
        }
        info!(next = self.downstream.stage(), "Verification processor stopped");
    }

    /// Verify the buffered attestations and forward the valid ones.
    async fn flush(&mut self) -> bool {
        if self.buffer.is_empty() {
            return true;
        }
        let batch = std::mem::take(&mut self.buffer);
        let size = batch.len();
        let verifier = self.verifier.clone();
        let task = {
            let batch = batch.clone();
            self.spawner.spawn_blocking(move || verifier.verify(batch))
        };
        let result = match task.await {
            Ok(result) => result,
            Err(err) => {
                error!(size, "Verification task failed: {err}");
                VerificationResult::all_invalid(batch)
            }
        };
        debug!(
            size,
            valid = result.valid.len(),
            invalid = result.invalid.len(),
            "Verified attestation batch"
        );

        for attestation in result.invalid {
            self.invalid.publish(attestation);
        }
        for attestation in result.valid {
            self.valid.publish(attestation.clone());
            if !self.downstream.forward(attestation.into()).await {
                return false;
            }
        }
        true
    }
}
