//! One task per pool stage. Each processor owns its component, drains a single inbound channel
//! in arrival order and forwards whatever passes to the next stage.

pub mod churn;
pub mod double_work;
pub mod encoding;
pub mod identification;
pub mod sanity;
pub mod time;
pub mod verification;

use tokio::sync::mpsc;

pub use self::{
    churn::ChurnProcessor, double_work::DoubleWorkProcessor, encoding::EncodingProcessor,
    identification::IdentificationProcessor, sanity::SanityProcessor, time::TimeProcessor,
    verification::VerificationProcessor,
};
use crate::input::PoolInput;

/// Sending half of the channel into the next stage.
#[derive(Debug, Clone)]
pub struct Downstream {
    stage: &'static str,
    sender: mpsc::Sender<PoolInput>,
}

impl Downstream {
    pub fn new(stage: &'static str, sender: mpsc::Sender<PoolInput>) -> Self {
        Self { stage, sender }
    }

    /// Forward ``input``, waiting for capacity. Returns `false` once the next stage is gone.
    pub async fn forward(&self, input: PoolInput) -> bool {
        self.sender.send(input).await.is_ok()
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }
}

/// A channel pair for the stage called ``stage``.
pub fn stage_channel(
    stage: &'static str,
    capacity: usize,
) -> (Downstream, mpsc::Receiver<PoolInput>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (Downstream::new(stage, sender), receiver)
}
