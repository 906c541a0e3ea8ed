use std::sync::Arc;

use alloy_primitives::B256;
use ream_consensus::{
    attestation::Attestation,
    constants::{MIN_ATTESTATION_INCLUSION_DELAY, SLOTS_PER_EPOCH},
    phase0::{beacon_block::BeaconBlock, beacon_state::BeaconState},
    primitives::Slot,
    pubkey::PubKey,
    transition::EmptySlotTransition,
};
use ream_executor::{publisher::Publisher, TaskSpawner};
use ream_pool::churn::OffChainAggregates;
use ream_storage::{BeaconChainStorage, BeaconTuple};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use crate::{
    cache::LatestAttestations,
    error::ChainError,
    head::HeadFunction,
    pending::{ChurnPendingOperations, PendingOperations, PendingOperationsState},
};

/// The canonical head selected by fork choice.
#[derive(Debug, Clone, PartialEq)]
pub struct BeaconChainHead {
    pub tuple: Arc<BeaconTuple>,
}

impl BeaconChainHead {
    pub fn new(tuple: Arc<BeaconTuple>) -> Self {
        Self { tuple }
    }

    pub fn block(&self) -> &BeaconBlock {
        &self.tuple.block
    }

    pub fn state(&self) -> &BeaconState {
        &self.tuple.state
    }

    pub fn root(&self) -> B256 {
        self.tuple.root()
    }
}

/// A consistent view of the chain for block proposers: the head block, the head state advanced to
/// the current slot and the operations waiting for inclusion.
///
/// Pending operations are backed by the off chain aggregates of the head when the pool has
/// computed them, and by the latest attestation cache otherwise.
#[derive(Debug, Clone)]
pub struct ObservableBeaconState {
    pub head: BeaconBlock,
    pub latest_slot_state: Arc<BeaconState>,
    pub pending_operations: Arc<dyn PendingOperations>,
}

impl PartialEq for ObservableBeaconState {
    fn eq(&self, other: &Self) -> bool {
        self.head == other.head
            && self.latest_slot_state == other.latest_slot_state
            && self.pending_operations.attestations() == other.pending_operations.attestations()
    }
}

#[derive(Debug, Clone)]
pub enum ObserverInput {
    NewSlot(Slot),
    /// A verified attestation from the wire.
    Attestation(Attestation),
    ImportedTuple(Arc<BeaconTuple>),
    OffChainAggregates(OffChainAggregates),
}

impl From<Attestation> for ObserverInput {
    fn from(attestation: Attestation) -> Self {
        ObserverInput::Attestation(attestation)
    }
}

impl From<OffChainAggregates> for ObserverInput {
    fn from(aggregates: OffChainAggregates) -> Self {
        ObserverInput::OffChainAggregates(aggregates)
    }
}

impl From<BeaconTuple> for ObserverInput {
    fn from(tuple: BeaconTuple) -> Self {
        ObserverInput::ImportedTuple(Arc::new(tuple))
    }
}

/// Keeps the chain head, the latest slot state and the pending operations up to date and
/// publishes each of them when it changes.
///
/// The head is published before the observable state that depends on it.
pub struct ObservableStateProcessor {
    worker: Option<Observer>,
    source: Option<mpsc::Sender<ObserverInput>>,
    capacity: usize,
    head: Publisher<BeaconChainHead>,
    observable_state: Publisher<ObservableBeaconState>,
    pending_operations: Publisher<Arc<PendingOperationsState>>,
}

impl ObservableStateProcessor {
    pub fn new(
        storage: Arc<dyn BeaconChainStorage>,
        head_function: Box<dyn HeadFunction>,
        transition: Arc<dyn EmptySlotTransition>,
        capacity: usize,
    ) -> Self {
        let head = Publisher::replay_last("chain_head", capacity);
        let observable_state = Publisher::replay_last("observable_state", capacity);
        let pending_operations = Publisher::replay_last("pending_operations", capacity);
        let worker = Observer {
            storage,
            head_function,
            transition,
            cache: LatestAttestations::new(),
            current_slot: None,
            head: None,
            aggregates: None,
            latest: None,
            observable: None,
            head_stream: head.clone(),
            observable_state_stream: observable_state.clone(),
            pending_operations_stream: pending_operations.clone(),
        };
        Self {
            worker: Some(worker),
            source: None,
            capacity: capacity.max(1),
            head,
            observable_state,
            pending_operations,
        }
    }

    pub fn start(&mut self, spawner: &TaskSpawner) -> Result<(), ChainError> {
        let worker = self.worker.take().ok_or(ChainError::AlreadyStarted)?;
        let (source, inbox) = mpsc::channel(self.capacity);
        spawner.spawn("observable_state", worker.run(inbox));
        self.source = Some(source);
        info!("Observable state processor started");
        Ok(())
    }

    pub fn submit(&self, input: impl Into<ObserverInput>) -> Result<(), ChainError> {
        let source = self.source.as_ref().ok_or(ChainError::NotStarted)?;
        source.try_send(input.into()).map_err(|err| match err {
            TrySendError::Full(_) => {
                warn!("Observable state processor is lagging");
                ChainError::Backpressure
            }
            TrySendError::Closed(_) => ChainError::Stopped,
        })
    }

    pub async fn send(&self, input: impl Into<ObserverInput>) -> Result<(), ChainError> {
        let source = self.source.as_ref().ok_or(ChainError::NotStarted)?;
        source
            .send(input.into())
            .await
            .map_err(|_| ChainError::Stopped)
    }

    pub fn head_stream(&self) -> mpsc::Receiver<BeaconChainHead> {
        self.head.subscribe()
    }

    pub fn observable_state_stream(&self) -> mpsc::Receiver<ObservableBeaconState> {
        self.observable_state.subscribe()
    }

    pub fn pending_operations_stream(&self) -> mpsc::Receiver<Arc<PendingOperationsState>> {
        self.pending_operations.subscribe()
    }

    pub fn latest_head(&self) -> Option<BeaconChainHead> {
        self.head.latest()
    }

    pub fn latest_observable_state(&self) -> Option<ObservableBeaconState> {
        self.observable_state.latest()
    }
}

struct Observer {
    storage: Arc<dyn BeaconChainStorage>,
    head_function: Box<dyn HeadFunction>,
    transition: Arc<dyn EmptySlotTransition>,
    cache: LatestAttestations,
    current_slot: Option<Slot>,
    head: Option<BeaconChainHead>,
    aggregates: Option<OffChainAggregates>,
    /// Head state advanced to the current slot, with the root of the head it was built from.
    latest: Option<(B256, Arc<BeaconState>)>,
    observable: Option<ObservableBeaconState>,

    head_stream: Publisher<BeaconChainHead>,
    observable_state_stream: Publisher<ObservableBeaconState>,
    pending_operations_stream: Publisher<Arc<PendingOperationsState>>,
}

impl Observer {
    async fn run(mut self, mut inbox: mpsc::Receiver<ObserverInput>) {
        while let Some(input) = inbox.recv().await {
            if let Err(err) = self.process(input) {
                if err.is_fatal() {
                    error!("Observable state processor halted: {err}");
                    break;
                }
                warn!("Failed to update observable state: {err}");
            }
        }
        info!("Observable state processor stopped");
    }

    fn process(&mut self, input: ObserverInput) -> Result<(), ChainError> {
        match input {
            ObserverInput::NewSlot(slot) => {
                if self.current_slot.is_some_and(|current| current >= slot) {
                    return Ok(());
                }
                self.current_slot = Some(slot);
                // too old to be included in a block of ``slot``
                if let Some(oldest) =
                    slot.checked_sub(SLOTS_PER_EPOCH + MIN_ATTESTATION_INCLUSION_DELAY)
                {
                    let purged = self.cache.purge(oldest);
                    if purged > 0 {
                        debug!(slot, purged, "Purged stale attestations");
                    }
                }
                self.update()
            }
            ObserverInput::Attestation(attestation) => {
                self.add_attestation(&attestation);
                Ok(())
            }
            ObserverInput::ImportedTuple(tuple) => {
                self.remove_included(&tuple.state);
                self.update()
            }
            ObserverInput::OffChainAggregates(aggregates) => {
                debug!(
                    slot = aggregates.slot,
                    head = ?aggregates.head_root,
                    count = aggregates.aggregates.len(),
                    "Off chain aggregates"
                );
                self.aggregates = Some(aggregates);
                self.update()
            }
        }
    }

    fn add_attestation(&mut self, attestation: &Attestation) {
        let state = match (&self.latest, &self.head) {
            (Some((_, state)), _) => state.as_ref(),
            (None, Some(head)) => head.state(),
            (None, None) => {
                debug!("No state to resolve attestation participants yet");
                return;
            }
        };
        let pubkeys = match participants(state, attestation) {
            Ok(pubkeys) => pubkeys,
            Err(err) => {
                debug!(slot = attestation.data.slot, "Unresolvable attestation: {err}");
                return;
            }
        };
        for pubkey in pubkeys {
            self.cache.add(pubkey, attestation);
        }
    }

    /// Forget pending attestations the chain already carries.
    fn remove_included(&mut self, state: &BeaconState) {
        let included = state
            .previous_epoch_attestations
            .iter()
            .chain(state.current_epoch_attestations.iter());
        for pending in included {
            let indices = state.get_attesting_indices(&pending.data, &pending.aggregation_bits);
            let indices = match indices {
                Ok(indices) => indices,
                Err(err) => {
                    warn!(slot = pending.data.slot, "Malformed included attestation: {err}");
                    continue;
                }
            };
            for index in indices {
                if let Some(validator) = state.validators.get(index as usize) {
                    self.cache.remove_included(&validator.pubkey, pending.data.slot);
                }
            }
        }
    }

    fn update(&mut self) -> Result<(), ChainError> {
        let Some(slot) = self.current_slot else {
            return Ok(());
        };

        let pending = Arc::new(self.cache.snapshot());
        if self.pending_operations_stream.latest().as_ref() != Some(&pending) {
            self.pending_operations_stream.publish(pending.clone());
        }

        let head = self.update_head(&pending)?;
        let latest_slot_state = self.advance(&head, slot)?;

        let pending_operations: Arc<dyn PendingOperations> = match &self.aggregates {
            Some(aggregates) if aggregates.head_root == head.root() => Arc::new(
                ChurnPendingOperations::new(aggregates.clone(), pending),
            ),
            _ => pending,
        };
        let observable = ObservableBeaconState {
            head: head.block().clone(),
            latest_slot_state,
            pending_operations,
        };
        if self.observable.as_ref() != Some(&observable) {
            debug!(slot, head = ?head.root(), "Publishing observable state");
            self.observable_state_stream.publish(observable.clone());
            self.observable = Some(observable);
        }
        Ok(())
    }

    fn update_head(
        &mut self,
        pending: &PendingOperationsState,
    ) -> Result<BeaconChainHead, ChainError> {
        let block = self
            .head_function
            .get_head(&|pubkey| pending.find_attestation(pubkey))?;
        let root = block.block_root();
        if let Some(head) = self.head.as_ref().filter(|head| head.root() == root) {
            return Ok(head.clone());
        }

        let tuple = self
            .storage
            .get_tuple(root)?
            .ok_or(ChainError::MissingHeadTuple { root })?;
        let head = BeaconChainHead::new(Arc::new(tuple));
        info!(slot = head.block().slot, root = ?root, "New chain head");
        self.head_stream.publish(head.clone());
        self.head = Some(head.clone());
        Ok(head)
    }

    /// The head state advanced through empty slots up to ``slot``.
    fn advance(
        &mut self,
        head: &BeaconChainHead,
        slot: Slot,
    ) -> anyhow::Result<Arc<BeaconState>> {
        let root = head.root();
        let base = match &self.latest {
            Some((latest_root, state)) if *latest_root == root && state.slot <= slot => {
                if state.slot == slot {
                    return Ok(state.clone());
                }
                state.as_ref()
            }
            _ => head.state(),
        };
        let state = Arc::new(self.transition.apply(base, slot)?);
        self.latest = Some((root, state.clone()));
        Ok(state)
    }
}

fn participants(state: &BeaconState, attestation: &Attestation) -> anyhow::Result<Vec<PubKey>> {
    let indices = state.get_attesting_indices(&attestation.data, &attestation.aggregation_bits)?;
    Ok(state
        .get_pubkeys(&indices)?
        .into_iter()
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ream_consensus::transition::ProcessSlotsTransition;
    use ream_pool::test_utils::TestChain;
    use ream_storage::InMemoryStorage;
    use tokio::time::timeout;

    use super::*;
    use crate::head::LmdGhostHeadFunction;

    const WAIT: Duration = Duration::from_secs(10);

    struct Fixture {
        chain: TestChain,
        storage: InMemoryStorage,
        processor: ObservableStateProcessor,
    }

    impl Fixture {
        fn new() -> Self {
            let chain = TestChain::new(64);
            let storage = chain.storage();
            let mut processor = ObservableStateProcessor::new(
                Arc::new(storage.clone()),
                Box::new(LmdGhostHeadFunction::new(Arc::new(storage.clone()))),
                Arc::new(ProcessSlotsTransition),
                64,
            );
            processor.start(&TaskSpawner::current()).unwrap();
            Self {
                chain,
                storage,
                processor,
            }
        }

        fn import(
            &self,
            parent: &BeaconTuple,
            slot: Slot,
            attestations: Vec<Attestation>,
        ) -> BeaconTuple {
            let tuple = self.chain.produce(parent, slot, attestations);
            self.storage.put_tuple(tuple.clone()).unwrap();
            tuple
        }
    }

    async fn next<T>(stream: &mut mpsc::Receiver<T>) -> T {
        timeout(WAIT, stream.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_new_slot_publishes_head_then_state() {
        let fixture = Fixture::new();
        let mut heads = fixture.processor.head_stream();
        let mut states = fixture.processor.observable_state_stream();

        fixture.processor.send(ObserverInput::NewSlot(3)).await.unwrap();

        let state = next(&mut states).await;
        assert!(fixture.processor.latest_head().is_some());
        assert_eq!(state.head, fixture.chain.genesis.block);
        assert_eq!(state.latest_slot_state.slot, 3);
        assert!(state.pending_operations.attestations().is_empty());
        assert_eq!(next(&mut heads).await.root(), fixture.chain.genesis.root());
    }

    #[tokio::test]
    async fn test_unchanged_state_is_not_republished() {
        let fixture = Fixture::new();
        let mut states = fixture.processor.observable_state_stream();

        fixture.processor.send(ObserverInput::NewSlot(1)).await.unwrap();
        next(&mut states).await;

        // same slot again, and an import of a block fork choice already knows
        fixture.processor.send(ObserverInput::NewSlot(1)).await.unwrap();
        fixture
            .processor
            .send(fixture.chain.genesis.clone())
            .await
            .unwrap();
        assert!(timeout(Duration::from_millis(200), states.recv()).await.is_err());

        fixture.processor.send(ObserverInput::NewSlot(2)).await.unwrap();
        assert_eq!(next(&mut states).await.latest_slot_state.slot, 2);
    }

    #[tokio::test]
    async fn test_votes_move_head() {
        let fixture = Fixture::new();
        let genesis = fixture.chain.genesis.clone();
        let a = fixture.import(&genesis, 1, vec![]);
        let b = fixture.import(&genesis, 2, vec![]);
        let (winner, loser) = if a.root() > b.root() { (a, b) } else { (b, a) };
        let mut heads = fixture.processor.head_stream();

        fixture.processor.send(ObserverInput::NewSlot(3)).await.unwrap();
        assert_eq!(next(&mut heads).await.root(), winner.root());

        for position in 0..fixture.chain.committee_size(3) {
            let vote = fixture.chain.attest(&loser, 3, position);
            fixture.processor.send(vote).await.unwrap();
        }
        fixture.processor.send(ObserverInput::NewSlot(4)).await.unwrap();

        let head = next(&mut heads).await;
        assert_eq!(head.root(), loser.root());
        assert_eq!(head.tuple.as_ref(), &loser);
    }

    #[tokio::test]
    async fn test_included_attestations_leave_pending_operations() {
        let fixture = Fixture::new();
        let genesis = fixture.chain.genesis.clone();
        let attestation = fixture.chain.attest(&genesis, 1, 0);
        let mut pending = fixture.processor.pending_operations_stream();
        let mut states = fixture.processor.observable_state_stream();

        fixture.processor.send(ObserverInput::NewSlot(2)).await.unwrap();
        assert!(next(&mut pending).await.is_empty());

        fixture.processor.send(attestation.clone()).await.unwrap();
        fixture.processor.send(ObserverInput::NewSlot(3)).await.unwrap();
        let operations = next(&mut pending).await;
        assert_eq!(operations.attestations(), vec![attestation.clone()]);

        let block = fixture.import(&genesis, 2, vec![attestation]);
        fixture.processor.send(block.clone()).await.unwrap();
        assert!(next(&mut pending).await.is_empty());
        loop {
            let state = next(&mut states).await;
            if state.head == block.block {
                assert!(state.pending_operations.attestations().is_empty());
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_aggregates_of_head_back_pending_operations() {
        let fixture = Fixture::new();
        let genesis = fixture.chain.genesis.clone();
        let first = fixture.chain.attest(&genesis, 1, 0);
        let second = fixture.chain.attest(&genesis, 1, 1);
        let mut states = fixture.processor.observable_state_stream();

        fixture.processor.send(ObserverInput::NewSlot(2)).await.unwrap();
        fixture.processor.send(first.clone()).await.unwrap();
        fixture.processor.send(ObserverInput::NewSlot(3)).await.unwrap();
        next(&mut states).await;
        let state = next(&mut states).await;
        assert_eq!(state.pending_operations.attestations(), vec![first.clone()]);

        // aggregates computed on another head are not used
        let other = OffChainAggregates {
            head_root: B256::repeat_byte(9),
            slot: 3,
            aggregates: vec![second.clone()],
        };
        fixture.processor.send(other).await.unwrap();
        assert!(timeout(Duration::from_millis(200), states.recv()).await.is_err());

        let aggregates = OffChainAggregates {
            head_root: genesis.root(),
            slot: 3,
            aggregates: vec![first.clone(), second.clone()],
        };
        fixture.processor.send(aggregates).await.unwrap();
        let state = next(&mut states).await;
        let operations = &state.pending_operations;
        assert_eq!(operations.attestations(), vec![first.clone(), second.clone()]);
        assert_eq!(operations.peek_aggregated_attestations(1, 3), vec![first.clone()]);

        let pubkey = participants(&genesis.state, &first).unwrap().remove(0);
        assert_eq!(operations.find_attestation(&pubkey), Some(first));
    }

    struct Detached(BeaconBlock);

    impl HeadFunction for Detached {
        fn get_head(
            &self,
            _latest_attestation: &dyn Fn(&PubKey) -> Option<Attestation>,
        ) -> Result<BeaconBlock, ChainError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_missing_head_tuple_halts() {
        let chain = TestChain::new(64);
        let storage = chain.storage();
        let detached = chain.produce(&chain.genesis, 1, vec![]);
        let mut processor = ObservableStateProcessor::new(
            Arc::new(storage),
            Box::new(Detached(detached.block)),
            Arc::new(ProcessSlotsTransition),
            4,
        );
        assert!(matches!(
            processor.submit(ObserverInput::NewSlot(1)),
            Err(ChainError::NotStarted)
        ));
        processor.start(&TaskSpawner::current()).unwrap();
        assert!(matches!(
            processor.start(&TaskSpawner::current()),
            Err(ChainError::AlreadyStarted)
        ));

        let stopped = timeout(WAIT, async {
            let mut slot = 1;
            while processor.send(ObserverInput::NewSlot(slot)).await.is_ok() {
                slot += 1;
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(stopped.is_ok());
        assert!(processor.latest_head().is_none());
        assert!(processor.latest_observable_state().is_none());
    }
}
