use std::sync::Arc;

use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};
use ream_consensus::attestation::Attestation;
use ream_executor::{publisher::Publisher, TaskSpawner};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, error, info};

use super::Downstream;
use crate::{
    checker::SignatureEncodingChecker,
    input::{PoolInput, ReceivedAttestation},
};

/// Max number of queued attestations checked in one go.
const MAX_RUN: usize = 1024;

/// Checks signature encodings on a dedicated thread pool.
///
/// Consecutive attestations waiting in the inbox are checked together in parallel; verdicts are
/// applied in arrival order, so the stage output keeps the input order.
pub struct EncodingProcessor {
    check: fn(&Attestation) -> bool,
    thread_pool: Arc<ThreadPool>,
    spawner: TaskSpawner,
    downstream: Downstream,
    invalid: Publisher<ReceivedAttestation>,
}

impl EncodingProcessor {
    pub fn new(
        max_threads: usize,
        spawner: TaskSpawner,
        downstream: Downstream,
        invalid: Publisher<ReceivedAttestation>,
    ) -> anyhow::Result<Self> {
        let thread_pool = ThreadPoolBuilder::new()
            .num_threads(max_threads.max(1))
            .thread_name(|index| format!("encoding-{index}"))
            .build()?;
        Ok(Self {
            check: |attestation| SignatureEncodingChecker.check(attestation),
            thread_pool: Arc::new(thread_pool),
            spawner,
            downstream,
            invalid,
        })
    }

    pub async fn run(self, mut inbox: mpsc::Receiver<PoolInput>) {
        'outer: while let Some(first) = inbox.recv().await {
            let mut run = vec![];
            let mut control = None;
            match first {
                PoolInput::Attestation(attestation) => run.push(attestation),
                other => control = Some(other),
            }
            while control.is_none() && run.len() < MAX_RUN {
                match inbox.try_recv() {
                    Ok(PoolInput::Attestation(attestation)) => run.push(attestation),
                    Ok(other) => control = Some(other),
                    Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
                }
            }

            for (attestation, is_valid) in self.check(run).await {
                if !is_valid {
                    debug!(sender = %attestation.sender, "Signature is not a valid encoding");
                    self.invalid.publish(attestation);
                } else if !self.downstream.forward(attestation.into()).await {
                    break 'outer;
                }
            }
            if let Some(control) = control {
                if !self.downstream.forward(control).await {
                    break;
                }
            }
        }
        info!(next = self.downstream.stage(), "Encoding processor stopped");
    }

    /// Pairs every attestation of ``run`` with its verdict. When the check task fails the whole
    /// run is reported invalid.
    async fn check(&self, run: Vec<ReceivedAttestation>) -> Vec<(ReceivedAttestation, bool)> {
        if run.is_empty() {
            return vec![];
        }
        let check = self.check;
        let thread_pool = self.thread_pool.clone();
        let task = {
            let run = run.clone();
            self.spawner.spawn_blocking(move || {
                thread_pool.install(|| {
                    run.into_par_iter()
                        .map(|attestation| {
                            let is_valid = check(&attestation.message);
                            (attestation, is_valid)
                        })
                        .collect::<Vec<_>>()
                })
            })
        };
        match task.await {
            Ok(checked) => checked,
            Err(err) => {
                error!(size = run.len(), "Encoding check task failed: {err}");
                run.into_iter().map(|attestation| (attestation, false)).collect()
            }
        }
    }
}
