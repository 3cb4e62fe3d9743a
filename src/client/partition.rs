//! Per-partition produce, fetch and offset lookups.
//!
//! A [`PartitionClient`] pins itself to the current leader of one
//! `(topic, partition)` pair, discovered and cached through
//! [`MetadataCache`]. It is the thing [`super::producer`] batches writes
//! onto and [`super::consumer`] fetches from; cluster-wide operations live
//! on [`super::Client`]/[`super::controller::ControllerClient`] instead.

use std::ops::{ControlFlow, Range};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::backoff::{Backoff, BackoffConfig, ErrorOrThrottle};
use crate::client::error::{Error, RequestContext, Result};
use crate::client::metadata_cache::MetadataCache;
use crate::connection::{
    BrokerCache, BrokerCacheGeneration, BrokerConnection, BrokerConnector, MessengerTransport,
};
use crate::protocol::messages::{
    FetchRequest, FetchRequestPartition, FetchRequestTopic, IsolationLevel, ListOffsetsRequest,
    ListOffsetsRequestPartition, ListOffsetsRequestTopic, ProduceRequest,
    ProduceRequestPartitionData, ProduceRequestTopicData, ProduceResponsePartitionResponse,
};
use crate::protocol::primitives::Records;
use crate::protocol::record::RecordBatch;
use crate::record::{Record, RecordAndOffset};
use crate::throttle::maybe_throttle;

/// Special timestamps accepted by `ListOffsets` ([KIP-79]).
///
/// [KIP-79]: https://cwiki.apache.org/confluence/pages/viewpage.action?pageId=65868090
mod list_offsets_timestamp {
    pub(super) const LATEST: i64 = -1;
    pub(super) const EARLIEST: i64 = -2;
}

/// Which end of the log [`PartitionClient::get_offset`] should resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetAt {
    Earliest,
    Latest,
}

/// What to do when the requested partition is missing from cluster metadata.
///
/// A freshly created topic can take a moment to show up in every broker's
/// view of the cluster, so callers that just issued `create_topic` usually
/// want [`Self::Retry`]; callers that expect the topic to already exist want
/// a prompt [`Self::Error`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownTopicHandling {
    Error,
    Retry,
}

/// A client pinned to one partition's current leader.
#[derive(Debug)]
pub struct PartitionClient {
    topic: String,
    partition: i32,
    brokers: Arc<BrokerConnector>,
    metadata: MetadataCache,
    unknown_topic_handling: UnknownTopicHandling,
    backoff_config: Arc<BackoffConfig>,
    isolation_level: IsolationLevel,

    current_broker: Mutex<(Option<BrokerConnection>, BrokerCacheGeneration)>,
}

impl PartitionClient {
    pub(crate) async fn new(
        topic: String,
        partition: i32,
        brokers: Arc<BrokerConnector>,
        unknown_topic_handling: UnknownTopicHandling,
        backoff_config: Arc<BackoffConfig>,
        isolation_level: IsolationLevel,
    ) -> Result<Self> {
        let metadata = MetadataCache::new(Arc::clone(&brokers));

        let client = Self {
            topic,
            partition,
            brokers,
            metadata,
            unknown_topic_handling,
            backoff_config,
            isolation_level,
            current_broker: Mutex::new((None, BrokerCacheGeneration::START)),
        };

        // Resolve the leader once up front so a genuinely missing
        // topic/partition fails at construction time rather than on the
        // first produce/fetch call.
        client.leader_id(false).await?;

        Ok(client)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Resolves the current leader broker ID for this partition, consulting
    /// [`MetadataCache`] and honoring [`UnknownTopicHandling`].
    async fn leader_id(&self, force: bool) -> Result<i32> {
        match self.unknown_topic_handling {
            UnknownTopicHandling::Error => self.resolve_leader(force).await?.ok_or_else(|| {
                Error::InvalidResponse(format!(
                    "partition {} of topic '{}' not found in cluster metadata",
                    self.partition, self.topic
                ))
            }),
            UnknownTopicHandling::Retry => {
                let mut backoff = Backoff::new(&self.backoff_config);

                backoff
                    .retry_with_backoff("resolve partition leader", || async {
                        match self.resolve_leader(force).await {
                            Ok(Some(leader_id)) => ControlFlow::Break(Ok(leader_id)),
                            Ok(None) => {
                                debug!(
                                    topic = %self.topic,
                                    partition = self.partition,
                                    "partition not yet present in cluster metadata, retrying",
                                );
                                ControlFlow::Continue(ErrorOrThrottle::Error(()))
                            }
                            Err(e) => ControlFlow::Break(Err(e)),
                        }
                    })
                    .await
                    .map_err(Error::RetryFailed)?
            }
        }
    }

    async fn resolve_leader(&self, force: bool) -> Result<Option<i32>> {
        let topic = self.metadata.get(&self.topic, force).await?;

        if let Some(protocol_error) = topic.error {
            return Err(Error::ServerError {
                protocol_error,
                error_message: None,
                request: RequestContext::Topic(self.topic.clone()),
                response: None,
                is_virtual: false,
            });
        }

        Ok(topic
            .partitions
            .iter()
            .find(|p| p.partition_index == self.partition)
            .map(|p| p.leader_id))
    }

    /// Produces one already-built [`RecordBatch`] to this partition.
    ///
    /// Returns the raw per-partition response so callers that need to
    /// interpret idempotence-related error codes (`OUT_OF_ORDER_SEQUENCE`,
    /// `INVALID_PRODUCER_EPOCH`, ...) can do so; errors that mean "this
    /// wasn't actually the leader" are resolved transparently by
    /// invalidating the cached connection/metadata and surfacing a retryable
    /// [`Error::ServerError`] instead, so [`super::producer`] doesn't have to
    /// special-case them.
    pub async fn produce(
        &self,
        batch: RecordBatch,
        transactional_id: Option<String>,
        acks: i16,
        timeout_ms: i32,
    ) -> Result<ProduceResponsePartitionResponse> {
        let mut backoff = Backoff::new(&self.backoff_config);

        backoff
            .retry_with_backoff("produce", || async {
                let (partition_response, gen) = {
                    let batch = &batch;
                    let transactional_id = &transactional_id;

                    match super::controller::maybe_retry(&self.backoff_config, self, "produce", || async move {
                        let (broker, gen) = self
                            .get()
                            .await
                            .map_err(|e| ErrorOrThrottle::Error((e, None)))?;

                        let request = &ProduceRequest {
                            transactional_id: transactional_id.clone(),
                            acks,
                            timeout_ms,
                            topic_data: vec![ProduceRequestTopicData {
                                name: self.topic.clone(),
                                partition_data: vec![ProduceRequestPartitionData {
                                    index: self.partition,
                                    records: Records(vec![batch.clone()]),
                                    tagged_fields: None,
                                }],
                                tagged_fields: None,
                            }],
                            tagged_fields: None,
                        };

                        let response = broker
                            .request(request)
                            .await
                            .map_err(|e| ErrorOrThrottle::Error((e.into(), Some(gen))))?;

                        maybe_throttle(response.throttle_time_ms)?;

                        let topic_response = response
                            .responses
                            .into_iter()
                            .find(|t| t.name == self.topic)
                            .ok_or_else(|| {
                                ErrorOrThrottle::Error((
                                    Error::InvalidResponse(format!(
                                        "produce response did not cover topic '{}'",
                                        self.topic
                                    )),
                                    None,
                                ))
                            })?;

                        let partition_response = topic_response
                            .partition_responses
                            .into_iter()
                            .find(|p| p.index == self.partition)
                            .ok_or_else(|| {
                                ErrorOrThrottle::Error((
                                    Error::InvalidResponse(format!(
                                        "produce response for topic '{}' did not cover partition {}",
                                        self.topic, self.partition
                                    )),
                                    None,
                                ))
                            })?;

                        Ok((partition_response, gen))
                    })
                    .await
                    {
                        Ok(v) => v,
                        Err(e) => return ControlFlow::Break(Err(e)),
                    }
                };

                if let Some(protocol_error) = partition_response.error {
                    if protocol_error.refreshes_metadata() {
                        self.invalidate("produce: stale leader", gen).await;
                        self.metadata.invalidate(&self.topic).await;

                        debug!(
                            topic = %self.topic,
                            partition = self.partition,
                            %protocol_error,
                            "partition leader moved, re-resolving and retrying produce",
                        );
                        return ControlFlow::Continue(ErrorOrThrottle::Error(()));
                    }

                    return ControlFlow::Break(Err(Error::ServerError {
                        protocol_error,
                        error_message: partition_response.error_message,
                        request: RequestContext::Topic(self.topic.clone()),
                        response: None,
                        is_virtual: false,
                    }));
                }

                ControlFlow::Break(Ok(partition_response))
            })
            .await
            .map_err(Error::RetryFailed)?
    }

    /// Fetches records starting at `offset`, bounded by `bytes` and
    /// `max_wait_ms`. Returns the records found together with the
    /// partition's current high watermark.
    pub async fn fetch_records(
        &self,
        offset: i64,
        bytes: Range<i32>,
        max_wait_ms: i32,
    ) -> Result<(Vec<RecordAndOffset>, i64)> {
        let mut backoff = Backoff::new(&self.backoff_config);

        backoff
            .retry_with_backoff("fetch", || async {
                let (broker, gen) = match self.get().await {
                    Ok(v) => v,
                    Err(e) => return ControlFlow::Break(Err(e)),
                };

                let request = &FetchRequest {
                    replica_id: -1,
                    max_wait_ms,
                    min_bytes: bytes.start,
                    max_bytes: Some(bytes.end),
                    isolation_level: Some(self.isolation_level),
                    session_id: None,
                    session_epoch: None,
                    topics: vec![FetchRequestTopic {
                        topic: self.topic.clone(),
                        partitions: vec![FetchRequestPartition {
                            partition: self.partition,
                            current_leader_epoch: None,
                            fetch_offset: offset,
                            log_start_offset: None,
                            partition_max_bytes: bytes.end,
                        }],
                    }],
                    forgotten_topics_data: vec![],
                    rack_id: None,
                };

                let response = match broker.request(request).await {
                    Ok(r) => r,
                    Err(e) => {
                        self.invalidate("fetch: request failed", gen).await;
                        let e: Error = e.into();
                        if e.can_retry() {
                            return ControlFlow::Continue(ErrorOrThrottle::Error(()));
                        }
                        return ControlFlow::Break(Err(e));
                    }
                };

                if let Some(protocol_error) = response.error_code {
                    return ControlFlow::Break(Err(Error::ServerError {
                        protocol_error,
                        error_message: None,
                        request: RequestContext::Topic(self.topic.clone()),
                        response: None,
                        is_virtual: false,
                    }));
                }

                let topic_response = match response
                    .responses
                    .into_iter()
                    .find(|t| t.topic == self.topic)
                    .ok_or_else(|| {
                        Error::InvalidResponse(format!(
                            "fetch response did not cover topic '{}'",
                            self.topic
                        ))
                    }) {
                    Ok(v) => v,
                    Err(e) => return ControlFlow::Break(Err(e)),
                };

                let partition_response = match topic_response
                    .partitions
                    .into_iter()
                    .find(|p| p.partition_index == self.partition)
                    .ok_or_else(|| {
                        Error::InvalidResponse(format!(
                            "fetch response for topic '{}' did not cover partition {}",
                            self.topic, self.partition
                        ))
                    }) {
                    Ok(v) => v,
                    Err(e) => return ControlFlow::Break(Err(e)),
                };

                if let Some(protocol_error) = partition_response.error_code {
                    if protocol_error.refreshes_metadata() {
                        self.invalidate("fetch: stale leader", gen).await;
                        self.metadata.invalidate(&self.topic).await;
                        return ControlFlow::Continue(ErrorOrThrottle::Error(()));
                    }

                    return ControlFlow::Break(Err(Error::ServerError {
                        protocol_error,
                        error_message: None,
                        request: RequestContext::Topic(self.topic.clone()),
                        response: None,
                        is_virtual: false,
                    }));
                }

                let records = partition_response
                    .records
                    .0
                    .into_iter()
                    .flat_map(|batch| {
                        let base_offset = batch.base_offset;
                        let first_timestamp_ms = batch.first_timestamp;

                        let records: Vec<crate::protocol::record::Record> = match batch.records {
                            crate::protocol::record::ControlBatchOrRecords::Records(records) => records,
                            crate::protocol::record::ControlBatchOrRecords::ControlBatch(_) => vec![],
                        };

                        records.into_iter().map(move |record| {
                            let offset = base_offset + i64::from(record.offset_delta);
                            RecordAndOffset {
                                record: Record::from_protocol_record(record, first_timestamp_ms),
                                offset,
                            }
                        })
                    })
                    .collect();

                ControlFlow::Break(Ok((records, partition_response.high_watermark)))
            })
            .await
            .map_err(Error::RetryFailed)?
    }

    /// Looks up the earliest or latest available offset for this partition.
    pub async fn get_offset(&self, at: OffsetAt) -> Result<i64> {
        let timestamp = match at {
            OffsetAt::Earliest => list_offsets_timestamp::EARLIEST,
            OffsetAt::Latest => list_offsets_timestamp::LATEST,
        };

        let mut backoff = Backoff::new(&self.backoff_config);

        backoff
            .retry_with_backoff("list_offsets", || async {
                let (partition_response, gen) = match super::controller::maybe_retry(
                    &self.backoff_config,
                    self,
                    "list_offsets",
                    || async move {
                        let (broker, gen) = self
                            .get()
                            .await
                            .map_err(|e| ErrorOrThrottle::Error((e, None)))?;

                        let request = &ListOffsetsRequest {
                            replica_id: -1,
                            isolation_level: Some(self.isolation_level),
                            topics: vec![ListOffsetsRequestTopic {
                                name: self.topic.clone(),
                                partitions: vec![ListOffsetsRequestPartition {
                                    partition_index: self.partition,
                                    timestamp,
                                    max_num_offsets: Some(1),
                                    current_leader_epoch: None,
                                    tagged_fields: None,
                                }],
                                tagged_fields: None,
                            }],
                            tagged_fields: None,
                        };

                        let response = broker
                            .request(request)
                            .await
                            .map_err(|e| ErrorOrThrottle::Error((e.into(), Some(gen))))?;

                        let topic_response = response
                            .topics
                            .into_iter()
                            .find(|t| t.name == self.topic)
                            .ok_or_else(|| {
                                ErrorOrThrottle::Error((
                                    Error::InvalidResponse(format!(
                                        "list_offsets response did not cover topic '{}'",
                                        self.topic
                                    )),
                                    None,
                                ))
                            })?;

                        let partition_response = topic_response
                            .partitions
                            .into_iter()
                            .find(|p| p.partition_index == self.partition)
                            .ok_or_else(|| {
                                ErrorOrThrottle::Error((
                                    Error::InvalidResponse(format!(
                                        "list_offsets response for topic '{}' did not cover partition {}",
                                        self.topic, self.partition
                                    )),
                                    None,
                                ))
                            })?;

                        Ok((partition_response, gen))
                    },
                )
                .await
                {
                    Ok(v) => v,
                    Err(e) => return ControlFlow::Break(Err(e)),
                };

                if let Some(protocol_error) = partition_response.error_code {
                    if protocol_error.refreshes_metadata() {
                        self.invalidate("list_offsets: stale leader", gen).await;
                        self.metadata.invalidate(&self.topic).await;
                        return ControlFlow::Continue(ErrorOrThrottle::Error(()));
                    }

                    return ControlFlow::Break(Err(Error::ServerError {
                        protocol_error,
                        error_message: None,
                        request: RequestContext::Topic(self.topic.clone()),
                        response: None,
                        is_virtual: false,
                    }));
                }

                let offset = partition_response
                    .offset
                    .or_else(|| partition_response.old_style_offsets.and_then(|o| o.first().copied()))
                    .ok_or_else(|| {
                        Error::InvalidResponse(format!(
                            "list_offsets response for topic '{}' partition {} carried no offset",
                            self.topic, self.partition
                        ))
                    });

                ControlFlow::Break(offset)
            })
            .await
            .map_err(Error::RetryFailed)?
    }
}

/// Caches the partition's current leader connection.
#[async_trait]
impl BrokerCache for &PartitionClient {
    type R = MessengerTransport;
    type E = Error;

    async fn get(&self) -> Result<(Arc<Self::R>, BrokerCacheGeneration)> {
        let mut current = self.current_broker.lock().await;
        if let Some(broker) = &current.0 {
            return Ok((Arc::clone(broker), current.1));
        }

        info!(
            topic = %self.topic,
            partition = self.partition,
            "creating new partition leader connection",
        );

        let leader_id = self.leader_id(false).await?;
        let broker = self.brokers.connect(leader_id).await?.ok_or_else(|| {
            Error::InvalidResponse(format!(
                "leader {leader_id} of partition {} of topic '{}' not found in cluster topology",
                self.partition, self.topic
            ))
        })?;

        current.0 = Some(Arc::clone(&broker));
        current.1.bump();

        Ok((broker, current.1))
    }

    async fn invalidate(&self, reason: &'static str, gen: BrokerCacheGeneration) {
        let mut guard = self.current_broker.lock().await;

        if guard.1 != gen {
            debug!(
                reason,
                current_gen = guard.1.get(),
                request_gen = gen.get(),
                "stale invalidation request for partition leader cache",
            );
            return;
        }

        info!(reason, topic = %self.topic, partition = self.partition, "invalidating cached partition leader");
        guard.0.take();
    }
}

/// A simple Murmur2-based partitioner matching the default Java client's
/// `DefaultPartitioner`, for callers that want to shard writes across a
/// topic's partitions by key instead of targeting one partition directly.
///
/// Hashes `key` and reduces it modulo `num_partitions`; returns `0` for an
/// empty key or `num_partitions <= 0` the same way the Java client does for
/// a null key (round-robins at a higher layer instead).
pub fn partition_for_key(key: &[u8], num_partitions: i32) -> i32 {
    if num_partitions <= 0 {
        return 0;
    }

    let hash = murmur2(key) & 0x7fff_ffff;
    (hash % (num_partitions as u32)) as i32
}

/// Murmur2 (32-bit, seed 0x9747b28c), the variant used by Kafka's Java
/// client for key-based partitioning.
fn murmur2(data: &[u8]) -> u32 {
    const SEED: u32 = 0x9747b28c;
    const M: u32 = 0x5bd1e995;
    const R: u32 = 24;

    let mut h: u32 = SEED ^ (data.len() as u32);
    let mut chunks = data.chunks_exact(4);

    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h = h.wrapping_mul(M);
        h ^= k;
    }

    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let mut k = 0u32;
        for (i, byte) in remainder.iter().enumerate() {
            k |= (*byte as u32) << (8 * i);
        }
        h ^= k;
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;

    h
}
