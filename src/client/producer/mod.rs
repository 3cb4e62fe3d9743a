//! Batched, optionally idempotent or transactional production.
//!
//! A [`BatchProducer`] batches [`Record`]s destined for one
//! [`PartitionClient`] through an [`Aggregator`], flushing either when the
//! aggregator runs out of room or after a configurable linger elapses. All
//! callers waiting on the same batch see the same outcome, so the error type
//! returned by [`BatchProducer::produce`] is `Arc<Error>` rather than
//! `Error` directly.
//!
//! [`TransactionManager`] sits above one or more `PartitionClient`s and
//! drives the KIP-98 transaction protocol (`InitProducerId`,
//! `AddPartitionsToTxn`, `AddOffsetsToTxn`, `TxnOffsetCommit`, `EndTxn`).

pub mod aggregator;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use self::aggregator::{Aggregator, TryPush};
use crate::backoff::{BackoffConfig, ErrorOrThrottle};
use crate::client::controller::maybe_retry;
use crate::client::error::{Error, RequestContext, Result};
use crate::client::partition::PartitionClient;
use crate::connection::{
    BrokerCache, BrokerCacheGeneration, BrokerConnection, BrokerConnector, MessengerTransport,
};
use crate::protocol::messages::{
    AddOffsetsToTxnRequest, AddPartitionsToTxnRequest, AddPartitionsToTxnRequestTopic,
    CoordinatorType, EndTxnRequest, FindCoordinatorRequest, InitProducerIdRequest,
    TxnOffsetCommitRequest, TxnOffsetCommitRequestPartition, TxnOffsetCommitRequestTopic,
};
use crate::protocol::record::{
    ControlBatchOrRecords, RecordBatch, RecordBatchCompression, RecordBatchTimestampType,
};
use crate::record::Record;
use crate::throttle::maybe_throttle;

/// Acknowledgement levels accepted by [`BatchProducer::produce`] and
/// [`Transaction::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredAcks {
    /// Fire-and-forget; the broker does not send a response.
    None,
    /// Wait for the partition leader only.
    Leader,
    /// Wait for the full in-sync replica set.
    All,
}

impl RequiredAcks {
    fn as_i16(&self) -> i16 {
        match self {
            Self::None => 0,
            Self::Leader => 1,
            Self::All => -1,
        }
    }
}

const DEFAULT_TIMEOUT_MS: i32 = 30_000;
const DEFAULT_TRANSACTION_TIMEOUT_MS: i32 = 60_000;

#[derive(Debug, Clone, Copy)]
struct ProducerIdentity {
    producer_id: i64,
    producer_epoch: i16,
    next_sequence: i32,
}

/// Builder for [`BatchProducer`].
#[derive(Debug)]
pub struct BatchProducerBuilder {
    client: Arc<PartitionClient>,
    linger: Duration,
    compression: RecordBatchCompression,
    acks: RequiredAcks,
    idempotent: bool,
    backoff_config: Arc<BackoffConfig>,
}

impl BatchProducerBuilder {
    pub fn new(client: Arc<PartitionClient>) -> Self {
        Self {
            client,
            linger: Duration::ZERO,
            compression: RecordBatchCompression::NoCompression,
            acks: RequiredAcks::All,
            idempotent: false,
            backoff_config: Default::default(),
        }
    }

    /// How long to wait, after the first record of a batch is pushed, before
    /// flushing it even if it isn't full. `Duration::ZERO` (the default)
    /// flushes every batch as soon as a record is pushed.
    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    pub fn with_compression(mut self, compression: RecordBatchCompression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_required_acks(mut self, acks: RequiredAcks) -> Self {
        self.acks = acks;
        self
    }

    /// Enables the idempotent producer: a producer identity is lazily
    /// obtained via `InitProducerId` on first send, and every batch carries
    /// a monotonic sequence number so the broker can de-duplicate retries.
    ///
    /// Requires [`RequiredAcks::All`]; [`Self::build`] enforces this.
    pub fn with_idempotence(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    pub fn with_backoff_config(mut self, backoff_config: BackoffConfig) -> Self {
        self.backoff_config = Arc::new(backoff_config);
        self
    }

    pub fn build<A>(self, aggregator: A) -> Result<BatchProducer<A>>
    where
        A: Aggregator,
    {
        if self.idempotent && self.acks != RequiredAcks::All {
            return Err(Error::UserError(
                "Idempotent producer requires acks to be ALL (-1).".to_string(),
            ));
        }

        let shared = Arc::new(Shared {
            client: self.client,
            backoff_config: self.backoff_config,
            compression: self.compression,
            acks: self.acks,
            idempotent: self.idempotent,
            linger: self.linger,
            inner: Mutex::new(Inner {
                aggregator,
                waiters: Vec::new(),
            }),
            identity: Mutex::new(None),
        });

        let linger_task = (!shared.linger.is_zero())
            .then(|| spawn_linger_task(Arc::downgrade(&shared), shared.linger));

        Ok(BatchProducer {
            shared,
            linger_task,
        })
    }
}

struct Inner<A: Aggregator> {
    aggregator: A,
    /// One reply slot per input currently buffered in `aggregator`. Always
    /// the same length as the aggregator's own pending-record count, since
    /// both only grow (in lockstep, under this same lock) on a successful
    /// `try_push` and only shrink together on `flush`.
    waiters: Vec<oneshot::Sender<std::result::Result<i64, Arc<Error>>>>,
}

struct Shared<A: Aggregator> {
    client: Arc<PartitionClient>,
    backoff_config: Arc<BackoffConfig>,
    compression: RecordBatchCompression,
    acks: RequiredAcks,
    idempotent: bool,
    linger: Duration,
    inner: Mutex<Inner<A>>,
    identity: Mutex<Option<ProducerIdentity>>,
}

impl<A> Shared<A>
where
    A: Aggregator,
{
    async fn ensure_identity(&self) -> Result<ProducerIdentity> {
        let mut guard = self.identity.lock().await;
        if let Some(identity) = *guard {
            return Ok(identity);
        }

        let req = &InitProducerIdRequest {
            transactional_id: None,
            transaction_timeout_ms: DEFAULT_TRANSACTION_TIMEOUT_MS,
            producer_id: None,
            producer_epoch: None,
            tagged_fields: None,
        };

        let client = &self.client;
        let resp = maybe_retry(&self.backoff_config, client.as_ref(), "init_producer_id", || async move {
            let (broker, gen) = client
                .as_ref()
                .get()
                .await
                .map_err(|err| ErrorOrThrottle::Error((err, None)))?;
            let resp = broker
                .request(req)
                .await
                .map_err(|err| ErrorOrThrottle::Error((err.into(), Some(gen))))?;

            maybe_throttle(Some(resp.throttle_time_ms))?;

            if let Some(protocol_error) = resp.error {
                return Err(ErrorOrThrottle::Error((
                    Error::ServerError {
                        protocol_error,
                        error_message: None,
                        request: RequestContext::Topic(client.topic().to_string()),
                        response: None,
                        is_virtual: false,
                    },
                    Some(gen),
                )));
            }

            Ok(resp)
        })
        .await?;

        let identity = ProducerIdentity {
            producer_id: resp.producer_id,
            producer_epoch: resp.producer_epoch,
            next_sequence: 0,
        };
        *guard = Some(identity);

        Ok(identity)
    }

    /// Drains whatever is currently buffered and sends it as one batch,
    /// waking every waiter with the outcome.
    async fn flush(&self) {
        let (records, waiters) = {
            let mut inner = self.inner.lock().await;
            let (records, _tags) = inner.aggregator.flush();
            let waiters = std::mem::take(&mut inner.waiters);
            (records, waiters)
        };

        if records.is_empty() {
            return;
        }

        match self.send_batch(records).await {
            Ok(base_offset) => {
                for (i, waiter) in waiters.into_iter().enumerate() {
                    let _ = waiter.send(Ok(base_offset + i as i64));
                }
            }
            Err(err) => {
                let err = Arc::new(err);
                for waiter in waiters {
                    let _ = waiter.send(Err(Arc::clone(&err)));
                }
            }
        }
    }

    async fn send_batch(&self, records: Vec<Record>) -> Result<i64> {
        let identity = if self.idempotent {
            Some(self.ensure_identity().await?)
        } else {
            None
        };

        let first_timestamp_ms = records[0].timestamp.timestamp_millis();
        let last_offset_delta = (records.len() - 1) as i32;
        let max_timestamp = records
            .iter()
            .map(|r| r.timestamp.timestamp_millis())
            .max()
            .unwrap_or(first_timestamp_ms);

        let protocol_records = records
            .into_iter()
            .enumerate()
            .map(|(i, r)| r.into_protocol_record(first_timestamp_ms, i as i32))
            .collect();

        let base_sequence = identity.map(|i| i.next_sequence).unwrap_or(-1);

        let batch = RecordBatch {
            base_offset: 0,
            partition_leader_epoch: -1,
            last_offset_delta,
            first_timestamp: first_timestamp_ms,
            max_timestamp,
            producer_id: identity.map(|i| i.producer_id).unwrap_or(-1),
            producer_epoch: identity.map(|i| i.producer_epoch).unwrap_or(-1),
            base_sequence,
            records: ControlBatchOrRecords::Records(protocol_records),
            compression: self.compression,
            is_transactional: false,
            timestamp_type: RecordBatchTimestampType::CreateTime,
        };

        let batch_len = last_offset_delta + 1;

        let resp = self
            .client
            .produce(batch, None, self.acks.as_i16(), DEFAULT_TIMEOUT_MS)
            .await?;

        if let Some(protocol_error) = resp.error {
            if protocol_error.fences_producer() {
                self.identity.lock().await.take();
                return Err(Error::ServerError {
                    protocol_error,
                    error_message: resp.error_message,
                    request: RequestContext::Topic(self.client.topic().to_string()),
                    response: None,
                    is_virtual: false,
                });
            }

            if protocol_error == crate::protocol::error::Error::DuplicateSequenceNumber {
                // idempotent replay: the broker already appended this exact
                // batch and is telling us so, not rejecting it.
                debug!(topic = self.client.topic(), "duplicate sequence number treated as success");
            } else {
                return Err(Error::ServerError {
                    protocol_error,
                    error_message: resp.error_message,
                    request: RequestContext::Topic(self.client.topic().to_string()),
                    response: None,
                    is_virtual: false,
                });
            }
        }

        if let Some(mut identity) = identity {
            identity.next_sequence += batch_len;
            *self.identity.lock().await = Some(identity);
        }

        Ok(resp.base_offset)
    }
}

fn spawn_linger_task<A>(shared: Weak<Shared<A>>, linger: Duration) -> JoinHandle<()>
where
    A: Aggregator,
{
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(linger).await;
            let Some(shared) = shared.upgrade() else {
                break;
            };
            shared.flush().await;
        }
    })
}

/// Batches [`Record`]s for a single [`PartitionClient`] via an [`Aggregator`]
/// and writes them out either as soon as the batch fills up or after a
/// configured linger, whichever comes first.
///
/// Built with [`BatchProducerBuilder`].
#[derive(Debug)]
pub struct BatchProducer<A: Aggregator> {
    shared: Arc<Shared<A>>,
    linger_task: Option<JoinHandle<()>>,
}

impl<A: Aggregator> std::fmt::Debug for Shared<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("topic", &self.client.topic())
            .field("partition", &self.client.partition())
            .field("linger", &self.linger)
            .field("idempotent", &self.idempotent)
            .finish_non_exhaustive()
    }
}

impl<A> BatchProducer<A>
where
    A: Aggregator,
{
    /// Pushes `input` into the pending batch and returns the offset the
    /// broker assigned the resulting record once its batch is flushed.
    ///
    /// All callers waiting on the same flush observe the same `Arc<Error>`
    /// on failure.
    pub async fn produce(&self, input: A::Input) -> std::result::Result<i64, Arc<Error>> {
        let mut input = input;
        loop {
            let rx = {
                let mut inner = self.shared.inner.lock().await;
                let was_empty = inner.waiters.is_empty();

                let pushed = inner
                    .aggregator
                    .try_push(input)
                    .map_err(|e| Arc::new(Error::UserError(e.to_string())))?;

                match pushed {
                    TryPush::Aggregated(_tag) => {
                        let (tx, rx) = oneshot::channel();
                        inner.waiters.push(tx);
                        Ok(rx)
                    }
                    TryPush::NoCapacity(returned) => {
                        if was_empty {
                            return Err(Arc::new(Error::UserError(
                                "record does not fit within the configured batch size".to_string(),
                            )));
                        }
                        input = returned;
                        Err(())
                    }
                }
            };

            match rx {
                Ok(rx) => {
                    if self.shared.linger.is_zero() {
                        self.shared.flush().await;
                    }

                    return rx.await.unwrap_or_else(|_| {
                        Err(Arc::new(Error::InvalidResponse(
                            "producer dropped the reply channel before flushing".to_string(),
                        )))
                    });
                }
                Err(()) => {
                    // the pending batch had no room; flush it and retry the
                    // push against the now-empty aggregator.
                    self.shared.flush().await;
                }
            }
        }
    }

    /// Flushes whatever is currently buffered, even if the linger hasn't
    /// elapsed yet.
    pub async fn flush(&self) {
        self.shared.flush().await;
    }
}

impl<A: Aggregator> Drop for BatchProducer<A> {
    fn drop(&mut self) {
        if let Some(task) = self.linger_task.take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
struct TransactionIdentity {
    producer_id: i64,
    producer_epoch: i16,
}

#[derive(Debug)]
enum TransactionState {
    Idle,
    Active { token: u64 },
    Fenced,
}

/// A consumer group membership added to a transaction via
/// [`Transaction::add_consumer`], enabling [`Transaction::add_offset`].
#[derive(Debug, Clone)]
pub struct TransactionConsumer {
    pub group_id: String,
    pub generation_id: i32,
    pub member_id: String,
}

/// Drives the KIP-98 transaction protocol for one `transactional_id`.
///
/// Obtained from [`crate::client::Client::transactional_producer`]. Only one
/// [`Transaction`] may be live at a time; [`Self::begin_transaction`] rejects
/// a second attempt while one is active.
pub struct TransactionManager {
    transactional_id: String,
    brokers: Arc<BrokerConnector>,
    backoff_config: Arc<BackoffConfig>,
    coordinator: Mutex<(Option<BrokerConnection>, BrokerCacheGeneration)>,
    identity: Mutex<Option<TransactionIdentity>>,
    state: Mutex<TransactionState>,
    next_token: AtomicU64,
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("transactional_id", &self.transactional_id)
            .finish_non_exhaustive()
    }
}

impl TransactionManager {
    pub(crate) fn new(
        transactional_id: String,
        brokers: Arc<BrokerConnector>,
        backoff_config: Arc<BackoffConfig>,
    ) -> Self {
        Self {
            transactional_id,
            brokers,
            backoff_config,
            coordinator: Mutex::new((None, BrokerCacheGeneration::START)),
            identity: Mutex::new(None),
            state: Mutex::new(TransactionState::Idle),
            next_token: AtomicU64::new(0),
        }
    }

    async fn ensure_identity(&self) -> Result<TransactionIdentity> {
        let mut guard = self.identity.lock().await;
        if let Some(identity) = guard.clone() {
            return Ok(identity);
        }

        let req = &InitProducerIdRequest {
            transactional_id: Some(self.transactional_id.clone()),
            transaction_timeout_ms: DEFAULT_TRANSACTION_TIMEOUT_MS,
            producer_id: None,
            producer_epoch: None,
            tagged_fields: None,
        };

        let resp = maybe_retry(&self.backoff_config, self, "init_producer_id", || async move {
            let (broker, gen) = self
                .get()
                .await
                .map_err(|err| ErrorOrThrottle::Error((err, None)))?;
            let resp = broker
                .request(req)
                .await
                .map_err(|err| ErrorOrThrottle::Error((err.into(), Some(gen))))?;

            maybe_throttle(Some(resp.throttle_time_ms))?;

            if let Some(protocol_error) = resp.error {
                return Err(ErrorOrThrottle::Error((
                    Error::ServerError {
                        protocol_error,
                        error_message: None,
                        request: RequestContext::Group(self.transactional_id.clone()),
                        response: None,
                        is_virtual: false,
                    },
                    Some(gen),
                )));
            }

            Ok(resp)
        })
        .await?;

        let identity = TransactionIdentity {
            producer_id: resp.producer_id,
            producer_epoch: resp.producer_epoch,
        };
        *guard = Some(identity.clone());

        Ok(identity)
    }

    /// Starts a new transaction. Fails if one is already active.
    pub async fn begin_transaction(self: &Arc<Self>) -> Result<Transaction> {
        let mut state = self.state.lock().await;
        if let TransactionState::Active { .. } = *state {
            return Err(Error::UserError(
                "There is already an active transaction.".to_string(),
            ));
        }

        self.ensure_identity().await?;

        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        *state = TransactionState::Active { token };

        Ok(Transaction {
            manager: Arc::clone(self),
            token,
            partitions: Mutex::new(BTreeSet::new()),
            consumers: Mutex::new(Vec::new()),
            completed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    async fn check_active(&self, token: u64) -> Result<()> {
        let state = self.state.lock().await;
        match *state {
            TransactionState::Active { token: active } if active == token => Ok(()),
            TransactionState::Fenced => Err(Error::UserError(
                "The producer is in use by another transaction.".to_string(),
            )),
            _ => Err(Error::UserError(
                "The producer is in use by another transaction.".to_string(),
            )),
        }
    }

    async fn complete(&self, token: u64, fenced: bool) {
        let mut state = self.state.lock().await;
        if let TransactionState::Active { token: active } = *state {
            if active == token {
                *state = if fenced {
                    TransactionState::Fenced
                } else {
                    TransactionState::Idle
                };
                if fenced {
                    self.identity.lock().await.take();
                }
            }
        }
    }
}

#[async_trait]
impl BrokerCache for &TransactionManager {
    type R = MessengerTransport;
    type E = Error;

    async fn get(&self) -> Result<(Arc<Self::R>, BrokerCacheGeneration)> {
        let mut current = self.coordinator.lock().await;
        if let Some(broker) = &current.0 {
            return Ok((Arc::clone(broker), current.1));
        }

        info!("creating a new transaction coordinator broker connection");

        let req = &FindCoordinatorRequest {
            key: self.transactional_id.clone(),
            key_type: CoordinatorType::Transaction,
            coordinator_keys: vec![],
            tagged_fields: None,
        };

        let coordinator_id = maybe_retry(&self.backoff_config, *self, "find_coordinator", || async move {
            let (broker, gen) = self
                .brokers
                .as_ref()
                .get()
                .await
                .map_err(|err| ErrorOrThrottle::Error((err.into(), None)))?;

            let resp = broker
                .request(req)
                .await
                .map_err(|err| ErrorOrThrottle::Error((err.into(), Some(gen))))?;

            maybe_throttle(resp.throttle_time_ms)?;

            if let Some(protocol_error) = resp.error_code {
                return Err(ErrorOrThrottle::Error((
                    Error::ServerError {
                        protocol_error,
                        error_message: resp.error_message,
                        request: RequestContext::Group(self.transactional_id.clone()),
                        response: None,
                        is_virtual: false,
                    },
                    Some(gen),
                )));
            }

            Ok(resp.node_id)
        })
        .await?;

        let coordinator = self.brokers.connect(coordinator_id).await?.ok_or_else(|| {
            Error::InvalidResponse(format!(
                "transaction coordinator {coordinator_id} not found in metadata response"
            ))
        })?;

        current.0 = Some(Arc::clone(&coordinator));
        current.1.bump();

        Ok((coordinator, current.1))
    }

    async fn invalidate(&self, reason: &'static str, gen: BrokerCacheGeneration) {
        let mut guard = self.coordinator.lock().await;

        if guard.1 != gen {
            debug!(
                message = "stale invalidation request for transaction coordinator cache",
                reason,
                current_gen = guard.1.get(),
                request_gen = gen.get(),
            );
            return;
        }

        info!(message = "invalidating cached transaction coordinator broker", reason);
        guard.0.take();
    }
}

/// A single live transaction obtained from
/// [`TransactionManager::begin_transaction`].
///
/// Every method checks that the owning [`TransactionManager`] still
/// considers this instance's `token` active, so that a `Transaction` handle
/// outlived by a newer one (or by the manager fencing itself on
/// `INVALID_PRODUCER_EPOCH`) rejects further use instead of silently
/// operating on the wrong transaction.
pub struct Transaction {
    manager: Arc<TransactionManager>,
    token: u64,
    partitions: Mutex<BTreeSet<(String, i32)>>,
    consumers: Mutex<Vec<TransactionConsumer>>,
    completed: std::sync::atomic::AtomicBool,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("transactional_id", &self.manager.transactional_id)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl Transaction {
    fn check_usable(&self, op: &str) -> Result<()> {
        if self.completed.load(Ordering::SeqCst) {
            return Err(Error::UserError(format!(
                "Cannot {op} an already completed transaction."
            )));
        }
        Ok(())
    }

    /// Writes `records` to `partition_client`, issuing `AddPartitionsToTxn`
    /// first if this transaction hasn't touched that partition yet.
    pub async fn send(
        &self,
        partition_client: &PartitionClient,
        records: Vec<Record>,
    ) -> Result<i64> {
        self.check_usable("send to")?;
        self.manager.check_active(self.token).await?;

        if records.is_empty() {
            return Err(Error::UserError("cannot send an empty batch".to_string()));
        }

        let key = (
            partition_client.topic().to_string(),
            partition_client.partition(),
        );

        let is_new_partition = {
            let mut partitions = self.partitions.lock().await;
            partitions.insert(key.clone())
        };

        let identity = self.manager.ensure_identity().await?;

        if is_new_partition {
            self.add_partitions_to_txn(identity.clone(), &key.0, key.1)
                .await?;
        }

        let first_timestamp_ms = records[0].timestamp.timestamp_millis();
        let last_offset_delta = (records.len() - 1) as i32;
        let max_timestamp = records
            .iter()
            .map(|r| r.timestamp.timestamp_millis())
            .max()
            .unwrap_or(first_timestamp_ms);

        let protocol_records = records
            .into_iter()
            .enumerate()
            .map(|(i, r)| r.into_protocol_record(first_timestamp_ms, i as i32))
            .collect();

        let batch = RecordBatch {
            base_offset: 0,
            partition_leader_epoch: -1,
            last_offset_delta,
            first_timestamp: first_timestamp_ms,
            max_timestamp,
            producer_id: identity.producer_id,
            producer_epoch: identity.producer_epoch,
            base_sequence: 0,
            records: ControlBatchOrRecords::Records(protocol_records),
            compression: RecordBatchCompression::NoCompression,
            is_transactional: true,
            timestamp_type: RecordBatchTimestampType::CreateTime,
        };

        let resp = partition_client
            .produce(
                batch,
                Some(self.manager.transactional_id.clone()),
                RequiredAcks::All.as_i16(),
                DEFAULT_TIMEOUT_MS,
            )
            .await?;

        if let Some(protocol_error) = resp.error {
            if protocol_error.fences_producer() {
                self.manager.complete(self.token, true).await;
                self.completed.store(true, Ordering::SeqCst);
            }
            return Err(Error::ServerError {
                protocol_error,
                error_message: resp.error_message,
                request: RequestContext::Topic(key.0),
                response: None,
                is_virtual: false,
            });
        }

        Ok(resp.base_offset)
    }

    async fn add_partitions_to_txn(
        &self,
        identity: TransactionIdentity,
        topic: &str,
        partition: i32,
    ) -> Result<()> {
        let req = &AddPartitionsToTxnRequest {
            transactional_id: self.manager.transactional_id.clone(),
            producer_id: identity.producer_id,
            producer_epoch: identity.producer_epoch,
            topics: vec![AddPartitionsToTxnRequestTopic {
                name: topic.to_string(),
                partitions: vec![partition],
                tagged_fields: None,
            }],
            tagged_fields: None,
        };

        let manager = self.manager.as_ref();
        maybe_retry(&manager.backoff_config, manager, "add_partitions_to_txn", || async move {
            let (broker, gen) = manager
                .get()
                .await
                .map_err(|err| ErrorOrThrottle::Error((err, None)))?;
            let resp = broker
                .request(req)
                .await
                .map_err(|err| ErrorOrThrottle::Error((err.into(), Some(gen))))?;

            maybe_throttle(Some(resp.throttle_time_ms))?;

            for topic_result in &resp.results {
                for partition_result in &topic_result.results {
                    if let Some(protocol_error) = partition_result.error {
                        return Err(ErrorOrThrottle::Error((
                            Error::ServerError {
                                protocol_error,
                                error_message: None,
                                request: RequestContext::Topic(topic_result.name.clone()),
                                response: None,
                                is_virtual: false,
                            },
                            Some(gen),
                        )));
                    }
                }
            }

            Ok(())
        })
        .await
    }

    /// Records `consumer`'s membership so that [`Self::add_offset`] can
    /// later commit offsets for its group inside this transaction.
    pub async fn add_consumer(&self, consumer: TransactionConsumer) -> Result<()> {
        self.check_usable("use")?;
        self.manager.check_active(self.token).await?;

        let identity = self.manager.ensure_identity().await?;

        let manager = self.manager.as_ref();
        let req = &AddOffsetsToTxnRequest {
            transactional_id: manager.transactional_id.clone(),
            producer_id: identity.producer_id,
            producer_epoch: identity.producer_epoch,
            group_id: consumer.group_id.clone(),
            tagged_fields: None,
        };

        maybe_retry(&manager.backoff_config, manager, "add_offsets_to_txn", || async move {
            let (broker, gen) = manager
                .get()
                .await
                .map_err(|err| ErrorOrThrottle::Error((err, None)))?;
            let resp = broker
                .request(req)
                .await
                .map_err(|err| ErrorOrThrottle::Error((err.into(), Some(gen))))?;

            maybe_throttle(Some(resp.throttle_time_ms))?;

            if let Some(protocol_error) = resp.error {
                return Err(ErrorOrThrottle::Error((
                    Error::ServerError {
                        protocol_error,
                        error_message: None,
                        request: RequestContext::Group(req.group_id.clone()),
                        response: None,
                        is_virtual: false,
                    },
                    Some(gen),
                )));
            }

            Ok(())
        })
        .await?;

        self.consumers.lock().await.push(consumer);
        Ok(())
    }

    /// Commits `(topic, partition, offset)` as consumed by `group_id` inside
    /// this transaction. `group_id` must already have been registered via
    /// [`Self::add_consumer`].
    pub async fn add_offset(
        &self,
        group_id: &str,
        topic: &str,
        partition: i32,
        offset: i64,
    ) -> Result<()> {
        self.check_usable("use")?;
        self.manager.check_active(self.token).await?;

        let consumer = {
            let consumers = self.consumers.lock().await;
            consumers
                .iter()
                .find(|c| c.group_id == group_id)
                .cloned()
                .ok_or_else(|| {
                    Error::UserError(format!(
                        "group '{group_id}' was not added to this transaction via add_consumer"
                    ))
                })?
        };

        let identity = self.manager.ensure_identity().await?;
        let manager = self.manager.as_ref();

        let req = &TxnOffsetCommitRequest {
            transactional_id: manager.transactional_id.clone(),
            group_id: consumer.group_id.clone(),
            producer_id: identity.producer_id,
            producer_epoch: identity.producer_epoch,
            generation_id: Some(consumer.generation_id),
            member_id: Some(consumer.member_id.clone()),
            group_instance_id: None,
            topics: vec![TxnOffsetCommitRequestTopic {
                name: topic.to_string(),
                partitions: vec![TxnOffsetCommitRequestPartition {
                    partition_index: partition,
                    committed_offset: offset,
                    committed_leader_epoch: None,
                    committed_metadata: None,
                    tagged_fields: None,
                }],
                tagged_fields: None,
            }],
            tagged_fields: None,
        };

        maybe_retry(&manager.backoff_config, manager, "txn_offset_commit", || async move {
            let (broker, gen) = manager
                .get()
                .await
                .map_err(|err| ErrorOrThrottle::Error((err, None)))?;
            let resp = broker
                .request(req)
                .await
                .map_err(|err| ErrorOrThrottle::Error((err.into(), Some(gen))))?;

            maybe_throttle(Some(resp.throttle_time_ms))?;

            for topic_result in &resp.topics {
                for partition_result in &topic_result.partitions {
                    if let Some(protocol_error) = partition_result.error {
                        return Err(ErrorOrThrottle::Error((
                            Error::ServerError {
                                protocol_error,
                                error_message: None,
                                request: RequestContext::Group(group_id.to_string()),
                                response: None,
                                is_virtual: false,
                            },
                            Some(gen),
                        )));
                    }
                }
            }

            Ok(())
        })
        .await
    }

    async fn end(&self, committed: bool) -> Result<()> {
        let op = if committed { "commit" } else { "abort" };
        self.check_usable(op)?;
        self.manager.check_active(self.token).await?;

        let identity = self.manager.ensure_identity().await?;
        let manager = self.manager.as_ref();

        let req = &EndTxnRequest {
            transactional_id: manager.transactional_id.clone(),
            producer_id: identity.producer_id,
            producer_epoch: identity.producer_epoch,
            committed,
            tagged_fields: None,
        };

        let result = maybe_retry(&manager.backoff_config, manager, "end_txn", || async move {
            let (broker, gen) = manager
                .get()
                .await
                .map_err(|err| ErrorOrThrottle::Error((err, None)))?;
            let resp = broker
                .request(req)
                .await
                .map_err(|err| ErrorOrThrottle::Error((err.into(), Some(gen))))?;

            maybe_throttle(Some(resp.throttle_time_ms))?;

            if let Some(protocol_error) = resp.error {
                return Err(ErrorOrThrottle::Error((
                    Error::ServerError {
                        protocol_error,
                        error_message: None,
                        request: RequestContext::Group(manager.transactional_id.clone()),
                        response: None,
                        is_virtual: false,
                    },
                    Some(gen),
                )));
            }

            Ok(())
        })
        .await;

        let fenced = matches!(
            &result,
            Err(Error::ServerError { protocol_error, .. }) if protocol_error.fences_producer()
        );

        self.manager.complete(self.token, fenced).await;
        self.completed.store(true, Ordering::SeqCst);

        if fenced {
            warn!(
                transactional_id = manager.transactional_id,
                "producer fenced while ending transaction, identity cleared"
            );
            // A fencing error on commit/abort is terminal for this
            // transaction by definition; it already happened, so there's
            // nothing left to retry.
            return Ok(());
        }

        result
    }

    pub async fn commit(&self) -> Result<()> {
        self.end(true).await
    }

    pub async fn abort(&self) -> Result<()> {
        self.end(false).await
    }

    /// Releases this transaction without talking to the broker. Used to
    /// recover from a setup error before anything was sent.
    pub async fn cancel(&self) {
        self.completed.store(true, Ordering::SeqCst);
        self.manager.complete(self.token, false).await;
    }
}
