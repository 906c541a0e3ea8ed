use std::sync::Arc;

use ream_consensus::transition::EmptySlotTransition;
use ream_executor::{publisher::Publisher, TaskSpawner};
use ream_storage::BeaconChainStorage;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::info;

use crate::{
    checker::{SanityChecker, TimeFrameFilter},
    churn::{InMemoryAttestationChurn, OffChainAggregates},
    config::PoolConfig,
    error::PoolError,
    input::{PoolInput, ReceivedAttestation},
    processor::{
        stage_channel, ChurnProcessor, DoubleWorkProcessor, EncodingProcessor,
        IdentificationProcessor, SanityProcessor, TimeProcessor, VerificationProcessor,
    },
    registry::{ProcessedAttestations, UnknownAttestationPool},
    verifier::{AttestationVerifier, BatchVerifier},
};

/// The attestation pool wired from in-memory components.
///
/// Inputs are submitted through [`InMemoryAttestationPool::submit`] once the pool is started.
/// Outcomes are observed through the streams: every attestation that passes or fails
/// verification, those waiting for an unknown block, those whose block is known, and the off
/// chain aggregates recomputed for each head and slot.
pub struct InMemoryAttestationPool {
    config: PoolConfig,
    storage: Arc<dyn BeaconChainStorage>,
    transition: Arc<dyn EmptySlotTransition>,
    verifier: Arc<dyn BatchVerifier>,
    source: Option<mpsc::Sender<PoolInput>>,

    valid: Publisher<ReceivedAttestation>,
    invalid: Publisher<ReceivedAttestation>,
    unknown: Publisher<ReceivedAttestation>,
    identified: Publisher<ReceivedAttestation>,
    aggregates: Publisher<OffChainAggregates>,
}

impl InMemoryAttestationPool {
    pub fn new(
        config: PoolConfig,
        storage: Arc<dyn BeaconChainStorage>,
        transition: Arc<dyn EmptySlotTransition>,
    ) -> Self {
        let verifier = Arc::new(AttestationVerifier::new(storage.clone(), transition.clone()));
        Self::with_verifier(config, storage, transition, verifier)
    }

    pub fn with_verifier(
        config: PoolConfig,
        storage: Arc<dyn BeaconChainStorage>,
        transition: Arc<dyn EmptySlotTransition>,
        verifier: Arc<dyn BatchVerifier>,
    ) -> Self {
        let capacity = config.channel_capacity;
        Self {
            config,
            storage,
            transition,
            verifier,
            source: None,
            valid: Publisher::new("valid_attestations", capacity),
            invalid: Publisher::new("invalid_attestations", capacity),
            unknown: Publisher::new("unknown_attestations", capacity),
            identified: Publisher::new("identified_attestations", capacity),
            aggregates: Publisher::replay_last("off_chain_aggregates", capacity),
        }
    }

    /// Spawn one task per stage and connect them.
    pub fn start(&mut self, spawner: &TaskSpawner) -> Result<(), PoolError> {
        if self.source.is_some() {
            return Err(PoolError::AlreadyStarted);
        }
        let config = &self.config;
        let capacity = config.channel_capacity;

        let (to_churn, churn_inbox) = stage_channel("churn", capacity);
        let (to_verification, verification_inbox) = stage_channel("verification", capacity);
        let (to_identification, identification_inbox) =
            stage_channel("identification", capacity);
        let (to_encoding, encoding_inbox) = stage_channel("encoding", capacity);
        let (to_double_work, double_work_inbox) = stage_channel("double_work", capacity);
        let (to_sanity, sanity_inbox) = stage_channel("sanity", capacity);
        let (source, time_inbox) = mpsc::channel(capacity.max(1));

        let churn = ChurnProcessor::new(
            Box::new(InMemoryAttestationChurn::new(
                config.max_attestation_lookahead,
                config.max_churn_attestations,
            )),
            self.transition.clone(),
            self.aggregates.clone(),
        );
        let verification = VerificationProcessor::new(
            self.verifier.clone(),
            spawner.clone(),
            config.verifier_buffer_size,
            config.verifier_interval,
            to_churn,
            self.valid.clone(),
            self.invalid.clone(),
        );
        let identification = IdentificationProcessor::new(
            UnknownAttestationPool::new(
                self.storage.clone(),
                config.max_attestation_lookahead,
                config.max_unknown_attestations,
            ),
            to_verification,
            self.identified.clone(),
            self.unknown.clone(),
            self.invalid.clone(),
        );
        let encoding = EncodingProcessor::new(
            config.max_threads,
            spawner.clone(),
            to_identification,
            self.invalid.clone(),
        )?;
        let double_work = DoubleWorkProcessor::new(
            ProcessedAttestations::new(config.max_processed_attestations),
            to_encoding,
        );
        let sanity =
            SanityProcessor::new(SanityChecker::new(), to_double_work, self.invalid.clone());
        let time = TimeProcessor::new(TimeFrameFilter::new(config.lookahead_slots()), to_sanity);

        spawner.spawn("pool_churn", churn.run(churn_inbox));
        spawner.spawn("pool_verification", verification.run(verification_inbox));
        spawner.spawn("pool_identification", identification.run(identification_inbox));
        spawner.spawn("pool_encoding", encoding.run(encoding_inbox));
        spawner.spawn("pool_double_work", double_work.run(double_work_inbox));
        spawner.spawn("pool_sanity", sanity.run(sanity_inbox));
        spawner.spawn("pool_time", time.run(time_inbox));

        self.source = Some(source);
        info!(config = ?self.config, "Attestation pool started");
        Ok(())
    }

    /// Submit ``input`` without waiting. Fails with [`PoolError::Backpressure`] when the first
    /// stage can not keep up.
    pub fn submit(&self, input: impl Into<PoolInput>) -> Result<(), PoolError> {
        let source = self.source.as_ref().ok_or(PoolError::NotStarted)?;
        source.try_send(input.into()).map_err(|err| match err {
            TrySendError::Full(_) => PoolError::Backpressure,
            TrySendError::Closed(_) => PoolError::Stopped,
        })
    }

    /// Submit ``input``, waiting for the first stage to have room.
    pub async fn send(&self, input: impl Into<PoolInput>) -> Result<(), PoolError> {
        let source = self.source.as_ref().ok_or(PoolError::NotStarted)?;
        source
            .send(input.into())
            .await
            .map_err(|_| PoolError::Stopped)
    }

    pub fn is_started(&self) -> bool {
        self.source.is_some()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn valid_attestations(&self) -> mpsc::Receiver<ReceivedAttestation> {
        self.valid.subscribe()
    }

    pub fn invalid_attestations(&self) -> mpsc::Receiver<ReceivedAttestation> {
        self.invalid.subscribe()
    }

    pub fn unknown_attestations(&self) -> mpsc::Receiver<ReceivedAttestation> {
        self.unknown.subscribe()
    }

    pub fn identified_attestations(&self) -> mpsc::Receiver<ReceivedAttestation> {
        self.identified.subscribe()
    }

    pub fn off_chain_aggregates(&self) -> mpsc::Receiver<OffChainAggregates> {
        self.aggregates.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ream_consensus::{checkpoint::Checkpoint, transition::ProcessSlotsTransition};
    use ream_executor::ReamExecutor;
    use ream_storage::InMemoryStorage;
    use tokio::time::timeout;

    use super::*;
    use crate::test_utils::{attestation_with, received, TestChain};

    const WAIT: Duration = Duration::from_secs(10);

    fn config() -> PoolConfig {
        PoolConfig {
            max_threads: 2,
            verifier_buffer_size: 16,
            verifier_interval: Duration::from_millis(10),
            channel_capacity: 256,
            ..Default::default()
        }
    }

    fn started(storage: &InMemoryStorage) -> InMemoryAttestationPool {
        let mut pool = InMemoryAttestationPool::new(
            config(),
            Arc::new(storage.clone()),
            Arc::new(ProcessSlotsTransition),
        );
        pool.start(&TaskSpawner::current()).unwrap();
        pool
    }

    async fn prime(pool: &InMemoryAttestationPool, storage: &InMemoryStorage, slot: u64) {
        pool.send(PoolInput::FinalizedCheckpoint(
            storage.get_finalized_checkpoint().unwrap(),
        ))
        .await
        .unwrap();
        pool.send(PoolInput::NewSlot(slot)).await.unwrap();
    }

    async fn nothing_on<T>(stream: &mut mpsc::Receiver<T>) -> bool {
        timeout(Duration::from_millis(200), stream.recv()).await.is_err()
    }

    #[tokio::test]
    async fn test_not_started() {
        let storage = InMemoryStorage::new();
        let pool = InMemoryAttestationPool::new(
            config(),
            Arc::new(storage),
            Arc::new(ProcessSlotsTransition),
        );
        assert!(matches!(pool.submit(PoolInput::NewSlot(1)), Err(PoolError::NotStarted)));
    }

    #[tokio::test]
    async fn test_start_twice() {
        let chain = TestChain::new(64);
        let mut pool = started(&chain.storage());
        assert!(matches!(
            pool.start(&TaskSpawner::current()),
            Err(PoolError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn test_identified_once_and_deduplicated() {
        let chain = TestChain::new(64);
        let storage = chain.storage();
        let pool = started(&storage);
        let mut identified = pool.identified_attestations();
        prime(&pool, &storage, 100).await;

        let attestation = received(attestation_with(96, 0, 1, |a| {
            a.data.beacon_block_root = chain.genesis.root()
        }));
        pool.send(attestation.clone()).await.unwrap();
        assert_eq!(
            timeout(WAIT, identified.recv()).await.unwrap(),
            Some(attestation.clone())
        );

        pool.send(attestation).await.unwrap();
        assert!(nothing_on(&mut identified).await);
    }

    #[tokio::test]
    async fn test_unknown_block_attestation_waits_for_import() {
        let chain = TestChain::new(64);
        let storage = chain.storage();
        let pool = started(&storage);
        let mut identified = pool.identified_attestations();
        let mut unknown = pool.unknown_attestations();
        let mut valid = pool.valid_attestations();
        prime(&pool, &storage, 2).await;

        let block = chain.produce(&chain.genesis, 1, vec![]);
        let attestation = received(chain.attest(&block, 2, 0));
        pool.send(attestation.clone()).await.unwrap();

        assert_eq!(
            timeout(WAIT, unknown.recv()).await.unwrap(),
            Some(attestation.clone())
        );
        assert!(nothing_on(&mut valid).await);
        assert!(nothing_on(&mut identified).await);

        storage.put_tuple(block.clone()).unwrap();
        pool.send(PoolInput::ImportedBlock(block.block.clone()))
            .await
            .unwrap();

        assert_eq!(
            timeout(WAIT, identified.recv()).await.unwrap(),
            Some(attestation.clone())
        );
        assert_eq!(
            timeout(WAIT, valid.recv()).await.unwrap(),
            Some(attestation)
        );
        assert!(nothing_on(&mut identified).await);
    }

    #[tokio::test]
    async fn test_verified_attestations_are_aggregated() {
        let chain = TestChain::new(128);
        let storage = chain.storage();
        let block = chain.produce(&chain.genesis, 1, vec![]);
        storage.put_tuple(block.clone()).unwrap();

        let pool = started(&storage);
        let mut valid = pool.valid_attestations();
        let mut invalid = pool.invalid_attestations();
        let mut aggregates = pool.off_chain_aggregates();
        prime(&pool, &storage, 1).await;
        pool.send(PoolInput::ChainHead(Arc::new(block.clone())))
            .await
            .unwrap();

        let signed = (0..3)
            .map(|position| received(chain.attest(&block, 1, position)))
            .collect::<Vec<_>>();
        let mut forged = received(chain.attest(&block, 1, 3));
        forged.message.signature = signed[0].message.signature.clone();

        for attestation in signed.iter().chain([&forged]) {
            pool.send(attestation.clone()).await.unwrap();
        }
        for _ in 0..signed.len() {
            let attestation = timeout(WAIT, valid.recv()).await.unwrap().unwrap();
            assert!(signed.contains(&attestation));
        }
        assert_eq!(timeout(WAIT, invalid.recv()).await.unwrap(), Some(forged));

        pool.send(PoolInput::NewSlot(2)).await.unwrap();
        let off_chain = loop {
            let off_chain = timeout(WAIT, aggregates.recv()).await.unwrap().unwrap();
            if off_chain.slot == 2 {
                break off_chain;
            }
        };
        assert_eq!(off_chain.head_root, block.root());
        assert_eq!(off_chain.aggregates.len(), 1);
        assert_eq!(off_chain.aggregates[0].aggregation_bits.num_set_bits(), 3);
    }

    #[test]
    fn test_backpressure() {
        let chain = TestChain::new(64);
        let mut pool = InMemoryAttestationPool::new(
            PoolConfig {
                channel_capacity: 1,
                ..config()
            },
            Arc::new(chain.storage()),
            Arc::new(ProcessSlotsTransition),
        );
        // the stages are spawned on a runtime that is never driven
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let executor = ReamExecutor::with_runtime(runtime);
        pool.start(&executor.spawner()).unwrap();

        let checkpoint = Checkpoint::default();
        pool.submit(PoolInput::FinalizedCheckpoint(checkpoint)).unwrap();
        assert!(matches!(
            pool.submit(PoolInput::FinalizedCheckpoint(checkpoint)),
            Err(PoolError::Backpressure)
        ));
    }
}
