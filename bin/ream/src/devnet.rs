use std::sync::Arc;

use alloy_primitives::U256;
use ream_chain::{
    LmdGhostHeadFunction, ObservableStateProcessor, ObserverInput, PendingOperations, SlotTicker,
};
use ream_consensus::{
    attestation::Attestation,
    checkpoint::Checkpoint,
    config::ChainSpec,
    constants::{MAX_ATTESTATIONS, MIN_ATTESTATION_INCLUSION_DELAY},
    interop::{
        attestation_data_at, build_attestation, interop_genesis, interop_private_key,
        produce_block,
    },
    misc::compute_epoch_at_slot,
    primitives::{Slot, ValidatorIndex},
    transition::{EmptySlotTransition, ProcessSlotsTransition},
};
use ream_executor::TaskSpawner;
use ream_pool::{InMemoryAttestationPool, PoolConfig, PoolInput, ReceivedAttestation};
use ream_storage::{BeaconChainStorage, BeaconTuple, InMemoryStorage};
use tracing::{debug, info, warn};

/// A single node interop network: every validator is local, one block is proposed per slot and
/// every committee attests to it through the attestation pool.
pub struct Devnet {
    spec: ChainSpec,
    storage: InMemoryStorage,
    transition: Arc<dyn EmptySlotTransition>,
    pool: InMemoryAttestationPool,
    observer: ObservableStateProcessor,
    ticker: SlotTicker,
    head: Arc<BeaconTuple>,
}

impl Devnet {
    pub fn new(
        spec: ChainSpec,
        validator_count: u64,
        genesis_time: u64,
        pool_config: PoolConfig,
    ) -> anyhow::Result<Self> {
        let (block, state) = interop_genesis(validator_count, genesis_time, &spec)?;
        let genesis = BeaconTuple::new(block, state);
        info!(
            root = ?genesis.root(),
            validators = validator_count,
            genesis_time,
            "Interop genesis"
        );

        let storage = InMemoryStorage::from_genesis(genesis.clone());
        let transition: Arc<dyn EmptySlotTransition> = Arc::new(ProcessSlotsTransition);
        let capacity = pool_config.channel_capacity;
        let pool = InMemoryAttestationPool::new(
            pool_config,
            Arc::new(storage.clone()),
            transition.clone(),
        );
        let observer = ObservableStateProcessor::new(
            Arc::new(storage.clone()),
            Box::new(LmdGhostHeadFunction::new(Arc::new(storage.clone()))),
            transition.clone(),
            capacity,
        );
        let ticker = SlotTicker::new(genesis_time, spec.seconds_per_slot);

        Ok(Self {
            spec,
            storage,
            transition,
            pool,
            observer,
            ticker,
            head: Arc::new(genesis),
        })
    }

    /// Start the pool and the observer and feed them the genesis anchor.
    pub async fn start(&mut self, spawner: &TaskSpawner) -> anyhow::Result<()> {
        self.pool.start(spawner)?;
        self.observer.start(spawner)?;

        let anchor = Checkpoint {
            epoch: compute_epoch_at_slot(self.head.block.slot),
            root: self.head.root(),
        };
        self.pool.send(PoolInput::FinalizedCheckpoint(anchor)).await?;
        self.pool.send(PoolInput::JustifiedCheckpoint(anchor)).await?;
        self.pool.send(PoolInput::ChainHead(self.head.clone())).await?;
        info!(network = %self.spec.config_name, "Devnet started");
        Ok(())
    }

    /// Drive the network from the slot ticker until a component stops.
    pub async fn run(mut self, spawner: &TaskSpawner) -> anyhow::Result<()> {
        let mut slots = self.ticker.subscribe();
        let mut valid = self.pool.valid_attestations();
        let mut aggregates = self.pool.off_chain_aggregates();
        let mut heads = self.observer.head_stream();
        spawner.spawn("slot_ticker", self.ticker.clone().run());

        loop {
            // catch up on the chain before acting on a new slot
            tokio::select! {
                biased;
                Some(head) = heads.recv() => {
                    self.pool.send(PoolInput::ChainHead(head.tuple.clone())).await?;
                    self.head = head.tuple;
                }
                Some(off_chain) = aggregates.recv() => {
                    self.observer.send(off_chain).await?;
                }
                Some(attestation) = valid.recv() => {
                    self.observer.send(attestation.message).await?;
                }
                Some(slot) = slots.recv() => {
                    self.on_slot(slot).await?;
                }
                else => break,
            }
        }
        info!("Devnet stopped");
        Ok(())
    }

    /// Announce ``slot``, propose its block and have its committees attest to it. Returns the
    /// number of attestations submitted.
    pub async fn on_slot(&mut self, slot: Slot) -> anyhow::Result<usize> {
        self.pool.send(PoolInput::NewSlot(slot)).await?;
        self.observer.send(ObserverInput::NewSlot(slot)).await?;
        if slot <= self.head.block.slot {
            return Ok(0);
        }

        let tuple = self.propose(slot)?;
        self.storage.put_tuple(tuple.clone())?;
        info!(
            slot,
            root = ?tuple.root(),
            attestations = tuple.block.body.attestations.len(),
            "Proposed block"
        );
        self.pool
            .send(PoolInput::ImportedBlock(tuple.block.clone()))
            .await?;
        self.observer.send(tuple.clone()).await?;
        self.head = Arc::new(tuple);

        let attestations = self.attest(slot)?;
        let count = attestations.len();
        for (validator, attestation) in attestations {
            self.pool
                .send(ReceivedAttestation::new(U256::from(validator), attestation))
                .await?;
        }
        debug!(slot, count, "Submitted attestations");
        Ok(count)
    }

    /// Build the block of ``slot`` on the current head, falling back to an empty block when the
    /// pending attestations do not apply.
    fn propose(&self, slot: Slot) -> anyhow::Result<BeaconTuple> {
        let attestations = self.block_attestations(slot);
        let (block, state) = match produce_block(&self.head.state, slot, attestations) {
            Ok(produced) => produced,
            Err(err) => {
                warn!(slot, "Dropping block attestations: {err}");
                produce_block(&self.head.state, slot, vec![])?
            }
        };
        Ok(BeaconTuple::new(block, state))
    }

    fn block_attestations(&self, slot: Slot) -> Vec<Attestation> {
        let Some(observable) = self.observer.latest_observable_state() else {
            return vec![];
        };
        observable.pending_operations.peek_aggregated_attestations(
            MAX_ATTESTATIONS as usize,
            slot.saturating_sub(MIN_ATTESTATION_INCLUSION_DELAY),
        )
    }

    /// One attestation per member of every committee of ``slot``, voting for the head.
    fn attest(&self, slot: Slot) -> anyhow::Result<Vec<(ValidatorIndex, Attestation)>> {
        let state = self.transition.apply(&self.head.state, slot)?;
        let mut attestations = vec![];
        for index in 0..state.get_committee_count_per_slot(compute_epoch_at_slot(slot)) {
            let data = attestation_data_at(&state, self.head.root(), slot, index)?;
            let committee = state.get_beacon_committee(slot, index)?;
            for (position, validator) in committee.into_iter().enumerate() {
                let key = interop_private_key(validator)?;
                attestations.push((validator, build_attestation(&state, data, position, &key)?));
            }
        }
        Ok(attestations)
    }

    pub fn storage(&self) -> &InMemoryStorage {
        &self.storage
    }

    pub fn observer(&self) -> &ObservableStateProcessor {
        &self.observer
    }

    pub fn pool(&self) -> &InMemoryAttestationPool {
        &self.pool
    }
}
