use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ream_consensus::primitives::Slot;
use ream_executor::publisher::Publisher;
use tokio::{sync::mpsc, time::sleep};
use tracing::{debug, info};

/// Emits the current slot at every slot boundary since ``genesis_time``.
#[derive(Clone)]
pub struct SlotTicker {
    genesis: Duration,
    slot_duration: Duration,
    slots: Publisher<Slot>,
}

impl SlotTicker {
    /// ``genesis_time`` in seconds since the unix epoch.
    pub fn new(genesis_time: u64, seconds_per_slot: u64) -> Self {
        Self {
            genesis: Duration::from_secs(genesis_time),
            slot_duration: Duration::from_secs(seconds_per_slot.max(1)),
            slots: Publisher::replay_last("slot_ticker", 16),
        }
    }

    /// The slot at ``now``, or `None` before genesis.
    pub fn slot_at(&self, now: Duration) -> Option<Slot> {
        let since_genesis = now.checked_sub(self.genesis)?;
        Some((since_genesis.as_millis() / self.slot_duration.as_millis()) as Slot)
    }

    /// Time until the next slot starts, or until genesis.
    pub fn duration_to_next_slot(&self, now: Duration) -> Duration {
        match self.slot_at(now) {
            Some(slot) => self.slot_start(slot + 1).saturating_sub(now),
            None => self.genesis.saturating_sub(now),
        }
    }

    /// Saturates at `Duration::MAX` for slots too far in the future.
    pub fn slot_start(&self, slot: Slot) -> Duration {
        let since_genesis = self.slot_duration.as_secs().saturating_mul(slot);
        self.genesis.saturating_add(Duration::from_secs(since_genesis))
    }

    pub fn current_slot(&self) -> Option<Slot> {
        self.slot_at(now())
    }

    pub fn subscribe(&self) -> mpsc::Receiver<Slot> {
        self.slots.subscribe()
    }

    pub async fn run(self) {
        info!(genesis = self.genesis.as_secs(), "Slot ticker started");
        let mut last = None;
        loop {
            let now = now();
            if let Some(slot) = self.slot_at(now) {
                if last != Some(slot) {
                    debug!(slot, "New slot");
                    self.slots.publish(slot);
                    last = Some(slot);
                }
            }
            sleep(self.duration_to_next_slot(now)).await;
        }
    }
}

fn now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}
