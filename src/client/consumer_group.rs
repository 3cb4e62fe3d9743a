//! Kafka separates storage from compute. Storage is handled by the brokers and
//! compute is mainly handled by consumers or frameworks built on top of consumers
//! (Kafka Streams, ksqlDB). Consumer groups play a key role in the effectiveness
//! and scalability of Kafka consumers.
//!
//! https://developer.confluent.io/courses/architecture/consumer-group-protocol

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::backoff::ErrorOrThrottle;
use crate::client::controller::maybe_retry;
use crate::client::error::{Error, ProtocolError, RequestContext};
use crate::connection::{
    BrokerCache, BrokerCacheGeneration, BrokerConnection, BrokerConnector, MessengerTransport,
};
use crate::protocol::messages::{
    ConsumerGroupHeartbeatRequest, ConsumerGroupMemberAssignment, ConsumerGroupMemberMetadata,
    CoordinatorType, FindCoordinatorRequest, HeartbeatRequest, JoinGroupProtocol,
    JoinGroupRequest, JoinGroupResponseMember, LeaveGroupRequest, OffsetCommitRequest,
    OffsetFetchRequest, OffsetFetchResponseTopic, PartitionAssignment, SyncGroupRequest,
    SyncGroupRequestAssignment, TopicCommit,
};
use crate::protocol::traits::WriteType;
use crate::throttle::maybe_throttle;
use crate::topic::Topic;
use crate::BackoffConfig;

/// DEFAULT_SESSION_TIMEOUT_MS contains the default interval the coordinator will wait
/// for a heartbeat before marking a consumer as dead.
pub const DEFAULT_SESSION_TIMEOUT_MS: i32 = 10 * 1000; // 10s

/// DEFAULT_REBALANCE_TIMEOUT_MS contains the amount of time the coordinator will wait
/// for consumers to issue a join group once a rebalance has been requested.
pub const DEFAULT_REBALANCE_TIMEOUT_MS: i32 = 60 * 1000; // 60s

pub const BALANCE_STRATEGY_RANGE: &str = "range";
pub const BALANCE_STRATEGY_ROUNDROBIN: &str = "roundrobin";

/// A caller-supplied partition-assignment strategy for the classic protocol.
/// Given the subscribed topics and every group member's `JoinGroup` metadata,
/// returns the assignment plan as `member_id -> partitions`, same as the
/// built-in [`range`]/[`round_robin`] strategies. Only the member the
/// coordinator names as group leader ever calls this.
pub type Assigner = Arc<
    dyn Fn(&[Topic], Vec<JoinGroupResponseMember>) -> BTreeMap<String, Vec<PartitionAssignment>>
        + Send
        + Sync,
>;

/// Pairs a custom [`Assigner`] with the protocol name it's offered under, so
/// the coordinator selects it the same way it selects `range`/`roundrobin`.
#[derive(Clone)]
pub struct CustomAssignor {
    pub name: String,
    pub assign: Assigner,
}

impl std::fmt::Debug for CustomAssignor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomAssignor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Which consumer group membership protocol a [`ConsumerGroup`] speaks with
/// the coordinator.
///
/// `Classic` is the original `JoinGroup`/`SyncGroup`/`Heartbeat` dance.
/// `Modern` is the single-RPC `ConsumerGroupHeartbeat` protocol introduced by
/// KIP-848: the coordinator hands out assignments directly in the heartbeat
/// response instead of via a separate `SyncGroup` call, and membership is
/// tracked by a monotonic `member_epoch` rather than a `generation_id`. The
/// higher-level join/heartbeat/leave state machine is otherwise the same.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupProtocol {
    #[default]
    Classic,
    Modern,
}

/// ConsumerGroup is a helper for consuming topics, it doesn't consume topics,
/// you have to consume and commit offsets it by yourself.
///
/// N.B. you have to refresh metadata and check if you should restart it
#[derive(Debug)]
pub struct ConsumerGroup {
    group: String,
    member_id: String,
    group_instance_id: Option<String>,

    protocol: GroupProtocol,
    // classic protocol's generation_id and modern protocol's member_epoch
    // occupy the same wire position and type in every request that carries
    // one, so a single counter serves both.
    epoch: AtomicI32,
    backoff: Arc<BackoffConfig>,

    assignment: ConsumerGroupMemberAssignment,

    brokers: Arc<BrokerConnector>,
    coordinator: Mutex<(Option<BrokerConnection>, BrokerCacheGeneration)>,
}

impl ConsumerGroup {
    pub(crate) async fn new(
        brokers: Arc<BrokerConnector>,
        backoff: Arc<BackoffConfig>,
        group: String,
        topics: &[Topic],
        protocol: GroupProtocol,
        custom_assignor: Option<CustomAssignor>,
    ) -> Result<Self, Error> {
        let req = &FindCoordinatorRequest {
            key: group.clone(),
            key_type: CoordinatorType::Group,
            coordinator_keys: vec![],
            tagged_fields: None,
        };

        let coordinator_id =
            maybe_retry(&backoff, brokers.as_ref(), "find_coordinator", || async {
                let (broker, gen) = brokers
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
                            request: RequestContext::Group(req.key.clone()),
                            response: None,
                            is_virtual: false,
                        },
                        Some(gen),
                    )));
                }

                Ok(resp.node_id)
            })
            .await?;

        let coordinator = match brokers.as_ref().connect(coordinator_id).await? {
            Some(broker) => broker,
            None => {
                return Err(Error::InvalidResponse(
                    "connect to coordinator failed".to_string(),
                ))
            }
        };

        match protocol {
            GroupProtocol::Classic => {
                Self::join_classic(brokers, backoff, group, topics, coordinator, custom_assignor)
                    .await
            }
            GroupProtocol::Modern => {
                // KIP-848 assignment is computed server-side by the coordinator's
                // configured assignor; there's no client-side leader computation
                // to plug a custom strategy into.
                Self::join_modern(brokers, backoff, group, topics, coordinator).await
            }
        }
    }

    async fn join_classic(
        brokers: Arc<BrokerConnector>,
        backoff: Arc<BackoffConfig>,
        group: String,
        topics: &[Topic],
        coordinator: BrokerConnection,
        custom_assignor: Option<CustomAssignor>,
    ) -> Result<Self, Error> {
        let resp = maybe_retry(&backoff, brokers.as_ref(), "join_group", || {
            let coordinator = coordinator.clone();
            let group = group.clone();
            let custom_assignor = custom_assignor.clone();

            async move {
                let metadata = ConsumerGroupMemberMetadata {
                    version: 0,
                    topics: topics.iter().map(|t| t.name.clone()).collect(),
                    user_data: vec![],
                    owned_partitions: vec![],
                    generation_id: 0,
                    rack_id: None,
                };
                let mut buf = Vec::new();
                metadata.write(&mut buf).expect("encode success");

                // offered in preference order: the coordinator picks the first
                // protocol every member of the group supports. A caller-supplied
                // assignor is offered ahead of the built-ins so it wins whenever
                // every member of the group understands it.
                let mut protocols = Vec::with_capacity(3);
                if let Some(custom) = &custom_assignor {
                    protocols.push(JoinGroupProtocol {
                        name: custom.name.clone(),
                        metadata: buf.clone(),
                        tagged_fields: None,
                    });
                }
                protocols.push(JoinGroupProtocol {
                    name: BALANCE_STRATEGY_RANGE.to_string(),
                    metadata: buf.clone(),
                    tagged_fields: None,
                });
                protocols.push(JoinGroupProtocol {
                    name: BALANCE_STRATEGY_ROUNDROBIN.to_string(),
                    metadata: buf,
                    tagged_fields: None,
                });

                let mut req = JoinGroupRequest {
                    group_id: group,
                    session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
                    rebalance_timeout_ms: DEFAULT_REBALANCE_TIMEOUT_MS,
                    member_id: "".to_string(),
                    group_instance_id: None,
                    protocol_type: "consumer".to_string(),
                    protocols,
                    tagged_fields: None,
                };

                let resp = loop {
                    let resp = coordinator
                        .request(&req)
                        .await
                        .map_err(|err| ErrorOrThrottle::Error((err.into(), None)))?;

                    maybe_throttle(resp.throttle_time_ms)?;

                    if let Some(protocol_error) = resp.error_code {
                        match protocol_error {
                            ProtocolError::MemberIdRequired => {
                                req.member_id = resp.member_id;
                                continue;
                            }
                            _ => {
                                return Err(ErrorOrThrottle::Error((
                                    Error::ServerError {
                                        protocol_error,
                                        error_message: None,
                                        request: RequestContext::Group(req.group_id.clone()),
                                        response: None,
                                        is_virtual: false,
                                    },
                                    None,
                                )))
                            }
                        }
                    } else {
                        break resp;
                    }
                };

                maybe_throttle(resp.throttle_time_ms)?;

                if let Some(err) = resp.error_code {
                    return Err(ErrorOrThrottle::Error((
                        Error::ServerError {
                            protocol_error: err,
                            error_message: None,
                            request: RequestContext::Group(req.group_id.clone()),
                            response: None,
                            is_virtual: false,
                        },
                        None,
                    )));
                }

                Ok(resp)
            }
        })
        .await?;

        let assignments = if resp.leader == resp.member_id {
            let plan = match resp.protocol_name.as_ref() {
                BALANCE_STRATEGY_ROUNDROBIN => round_robin(&topics, resp.members),
                BALANCE_STRATEGY_RANGE => range(&topics, resp.members),
                name => match custom_assignor.as_ref().filter(|c| c.name == name) {
                    Some(custom) => (custom.assign)(&topics, resp.members),
                    None => {
                        return Err(Error::InvalidResponse(format!(
                            "invalid protocol {}",
                            resp.protocol_name
                        )))
                    }
                },
            };

            plan.into_iter()
                .map(|(member_id, topics)| {
                    let assignment = ConsumerGroupMemberAssignment {
                        version: 0,
                        topics,
                        user_data: vec![],
                    };

                    let mut buf = Vec::new();
                    assignment
                        .write(&mut buf)
                        .expect("write ConsumerGroupMemberAssignment success");

                    SyncGroupRequestAssignment {
                        member_id,
                        assignment: buf,
                        tagged_fields: None,
                    }
                })
                .collect()
        } else {
            vec![]
        };

        let req = &SyncGroupRequest {
            group_id: group.clone(),
            generation_id: resp.generation_id,
            member_id: resp.member_id,
            group_instance_id: None,
            protocol_type: Some("consumer".to_string()),
            protocol_name: Some(resp.protocol_name.clone()),
            assignments,
            tagged_fields: None,
        };
        let assignment = maybe_retry(&backoff, brokers.as_ref(), "sync_group", || {
            let coordinator = coordinator.clone();

            async move {
                let resp = coordinator
                    .request(req)
                    .await
                    .map_err(|err| ErrorOrThrottle::Error((err.into(), None)))?;

                maybe_throttle(resp.throttle_time_ms)?;

                match resp.error_code {
                    None => Ok(resp.assignments),
                    Some(protocol_error) => Err(ErrorOrThrottle::Error((
                        Error::ServerError {
                            protocol_error,
                            error_message: None,
                            request: RequestContext::Group(req.group_id.clone()),
                            response: None,
                            is_virtual: false,
                        },
                        None,
                    ))),
                }
            }
        })
        .await?;

        Ok(ConsumerGroup {
            group,
            member_id: req.member_id.clone(),
            group_instance_id: None,
            protocol: GroupProtocol::Classic,
            epoch: AtomicI32::new(resp.generation_id),
            backoff,
            brokers,
            assignment,
            coordinator: Mutex::new((Some(coordinator), BrokerCacheGeneration::START)),
        })
    }

    /// Joins via the modern single-RPC `ConsumerGroupHeartbeat` protocol
    /// (KIP-848): `member_epoch: 0` asks the coordinator to admit us as a
    /// new member, which replies with a generated `member_id`, our starting
    /// epoch, and our initial assignment in one round trip.
    async fn join_modern(
        brokers: Arc<BrokerConnector>,
        backoff: Arc<BackoffConfig>,
        group: String,
        topics: &[Topic],
        coordinator: BrokerConnection,
    ) -> Result<Self, Error> {
        let subscribed_topic_names: Vec<String> = topics.iter().map(|t| t.name.clone()).collect();

        let resp = maybe_retry(
            &backoff,
            brokers.as_ref(),
            "consumer_group_heartbeat",
            || {
                let coordinator = coordinator.clone();
                let group = group.clone();
                let subscribed_topic_names = subscribed_topic_names.clone();

                async move {
                    let req = &ConsumerGroupHeartbeatRequest {
                        group_id: group,
                        member_id: String::new(),
                        member_epoch: 0,
                        instance_id: None,
                        rack_id: None,
                        rebalance_timeout_ms: Some(DEFAULT_REBALANCE_TIMEOUT_MS),
                        subscribed_topic_names: Some(subscribed_topic_names),
                        server_assignor: None,
                        topic_partitions: None,
                        tagged_fields: None,
                    };

                    let resp = coordinator
                        .request(req)
                        .await
                        .map_err(|err| ErrorOrThrottle::Error((err.into(), None)))?;

                    maybe_throttle(resp.throttle_time_ms)?;

                    if let Some(protocol_error) = resp.error {
                        return Err(ErrorOrThrottle::Error((
                            Error::ServerError {
                                protocol_error,
                                error_message: resp.error_message.clone(),
                                request: RequestContext::Group(req.group_id.clone()),
                                response: None,
                                is_virtual: false,
                            },
                            None,
                        )));
                    }

                    Ok(resp)
                }
            },
        )
        .await?;

        let member_id = resp.member_id.clone().ok_or_else(|| {
            Error::InvalidResponse("coordinator did not assign a member id".to_string())
        })?;

        let assignment = ConsumerGroupMemberAssignment {
            version: 0,
            topics: resp
                .assignment
                .topic_partitions
                .into_iter()
                .map(|tp| PartitionAssignment {
                    topic: tp.topic,
                    partitions: tp.partitions,
                })
                .collect(),
            user_data: vec![],
        };

        Ok(ConsumerGroup {
            group,
            member_id,
            group_instance_id: None,
            protocol: GroupProtocol::Modern,
            epoch: AtomicI32::new(resp.member_epoch),
            backoff,
            brokers,
            assignment,
            coordinator: Mutex::new((Some(coordinator), BrokerCacheGeneration::START)),
        })
    }

    pub async fn heartbeat(&self) -> Result<(), Error> {
        match self.protocol {
            GroupProtocol::Classic => self.heartbeat_classic().await,
            GroupProtocol::Modern => self.heartbeat_modern().await,
        }
    }

    async fn heartbeat_classic(&self) -> Result<(), Error> {
        let req = &HeartbeatRequest {
            group_id: self.group.clone(),
            generation_id: self.epoch.load(Ordering::SeqCst),
            member_id: self.member_id.clone(),
            group_instance_id: None,
            tagged_fields: None,
        };

        maybe_retry(&self.backoff, self, "heartbeat", || async move {
            let (broker, gen) = self
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
                        error_message: None,
                        request: RequestContext::Group(req.group_id.to_string()),
                        response: None,
                        is_virtual: false,
                    },
                    Some(gen),
                )));
            }

            Ok(())
        })
        .await
    }

    /// Sends a bare `ConsumerGroupHeartbeat` carrying our current epoch and
    /// no subscription changes. An empty `assignment.topic_partitions` in
    /// the response means our assignment hasn't changed; a non-empty one
    /// means the coordinator is handing out a new one. This crate doesn't
    /// apply a modern-protocol reassignment in place: it reports it as a
    /// `RebalanceInProgress`-style condition so the caller rejoins through
    /// the same full-rejoin path the classic protocol uses, trading away
    /// some of KIP-848's lighter-weight incremental rebalancing for a single
    /// state machine shared by both protocols.
    async fn heartbeat_modern(&self) -> Result<(), Error> {
        let req = &ConsumerGroupHeartbeatRequest {
            group_id: self.group.clone(),
            member_id: self.member_id.clone(),
            member_epoch: self.epoch.load(Ordering::SeqCst),
            instance_id: self.group_instance_id.clone(),
            rack_id: None,
            rebalance_timeout_ms: None,
            subscribed_topic_names: None,
            server_assignor: None,
            topic_partitions: None,
            tagged_fields: None,
        };

        maybe_retry(&self.backoff, self, "consumer_group_heartbeat", || async move {
            let (broker, gen) = self
                .get()
                .await
                .map_err(|err| ErrorOrThrottle::Error((err.into(), None)))?;
            let resp = broker
                .request(req)
                .await
                .map_err(|err| ErrorOrThrottle::Error((err.into(), Some(gen))))?;

            maybe_throttle(resp.throttle_time_ms)?;

            if let Some(protocol_error) = resp.error {
                return Err(ErrorOrThrottle::Error((
                    Error::ServerError {
                        protocol_error,
                        error_message: resp.error_message.clone(),
                        request: RequestContext::Group(req.group_id.clone()),
                        response: None,
                        is_virtual: false,
                    },
                    Some(gen),
                )));
            }

            self.epoch.store(resp.member_epoch, Ordering::SeqCst);

            if !resp.assignment.topic_partitions.is_empty() {
                return Err(ErrorOrThrottle::Error((
                    Error::ServerError {
                        protocol_error: ProtocolError::RebalanceInProgress,
                        error_message: None,
                        request: RequestContext::Group(req.group_id.clone()),
                        response: None,
                        is_virtual: true,
                    },
                    None,
                )));
            }

            Ok(())
        })
        .await
    }

    pub async fn leave(&self) -> Result<(), Error> {
        match self.protocol {
            GroupProtocol::Classic => self.leave_classic().await,
            GroupProtocol::Modern => self.leave_modern().await,
        }
    }

    async fn leave_classic(&self) -> Result<(), Error> {
        let req = &LeaveGroupRequest {
            group_id: self.group.clone(),
            member_id: self.member_id.clone(),
            members: vec![],
            tagged_fields: None,
        };

        maybe_retry(&self.backoff, self, "leave_group", || async move {
            let (broker, gen) = self
                .get()
                .await
                .map_err(|err| ErrorOrThrottle::Error((err, None)))?;
            let resp = broker
                .request(req)
                .await
                .map_err(|err| ErrorOrThrottle::Error((err.into(), Some(gen))))?;

            maybe_throttle(resp.throttle_time_ms)?;

            if let Some(protocol_error) = resp.error_code {
                return Err(ErrorOrThrottle::Error((
                    Error::ServerError {
                        protocol_error,
                        error_message: None,
                        request: RequestContext::Group(req.group_id.clone()),
                        response: None,
                        is_virtual: false,
                    },
                    None,
                )));
            }

            Ok(())
        })
        .await
    }

    /// Leaving the modern protocol is just another heartbeat, with
    /// `member_epoch: -1` telling the coordinator to drop this member
    /// immediately instead of waiting for the session timeout.
    async fn leave_modern(&self) -> Result<(), Error> {
        let req = &ConsumerGroupHeartbeatRequest {
            group_id: self.group.clone(),
            member_id: self.member_id.clone(),
            member_epoch: -1,
            instance_id: self.group_instance_id.clone(),
            rack_id: None,
            rebalance_timeout_ms: None,
            subscribed_topic_names: None,
            server_assignor: None,
            topic_partitions: None,
            tagged_fields: None,
        };

        maybe_retry(&self.backoff, self, "consumer_group_heartbeat_leave", || async move {
            let (broker, gen) = self
                .get()
                .await
                .map_err(|err| ErrorOrThrottle::Error((err, None)))?;
            let resp = broker
                .request(req)
                .await
                .map_err(|err| ErrorOrThrottle::Error((err.into(), Some(gen))))?;

            maybe_throttle(resp.throttle_time_ms)?;

            if let Some(protocol_error) = resp.error {
                return Err(ErrorOrThrottle::Error((
                    Error::ServerError {
                        protocol_error,
                        error_message: resp.error_message.clone(),
                        request: RequestContext::Group(req.group_id.clone()),
                        response: None,
                        is_virtual: false,
                    },
                    None,
                )));
            }

            Ok(())
        })
        .await
    }

    pub async fn offsets(&self) -> Result<Vec<OffsetFetchResponseTopic>, Error> {
        let req = &OffsetFetchRequest {
            group_id: self.group.to_string(),
            topics: vec![],
            require_stable: false,
            groups: vec![],
            tagged_fields: None,
        };

        maybe_retry(&self.backoff, self, "offset_fetch", || async move {
            let (broker, gen) = self
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
                        error_message: None,
                        request: RequestContext::Group(req.group_id.clone()),
                        response: None,
                        is_virtual: false,
                    },
                    None,
                )));
            }

            Ok(resp.topics)
        })
        .await
    }

    pub async fn commit(&self, topics: Vec<TopicCommit>) -> Result<(), Error> {
        let req = &OffsetCommitRequest {
            group_id: self.group.clone(),
            // the classic protocol's generation_id and the modern protocol's
            // member_epoch share this wire position; whichever we're
            // speaking, our current epoch counter is the right value here.
            generation_id: self.epoch.load(Ordering::SeqCst),
            member_id: self.member_id.clone(),
            retention_time_ms: 0,
            group_instance_id: self.group_instance_id.clone(),
            topics,
            tagged_fields: None,
        };

        let (results, gen) = maybe_retry(&self.backoff, self, "offset_commit", || async move {
            let (broker, gen) = self
                .get()
                .await
                .map_err(|err| ErrorOrThrottle::Error((err.into(), None)))?;
            let resp = broker
                .request(req)
                .await
                .map_err(|err| ErrorOrThrottle::Error((err.into(), Some(gen))))?;

            maybe_throttle(resp.throttle_time_ms)?;

            Ok((resp.topics, gen))
        })
        .await?;

        let mut fenced = None;

        for topic in &results {
            for partition in &topic.partitions {
                if let Some(err) = partition.error_code {
                    match err {
                        ProtocolError::NotLeaderOrFollower
                        | ProtocolError::LeaderNotAvailable
                        | ProtocolError::CoordinatorNotAvailable
                        | ProtocolError::NotCoordinator => {
                            // not a critical error, we just need to redispatch
                            self.invalidate("", gen).await;
                        }
                        ProtocolError::OffsetMetadataTooLarge
                        | ProtocolError::InvalidCommitOffsetSize => {
                            // nothing we can do about this, just tell the user and carry on
                            error!(
                                message = "Offset metadata is too large",
                                topic = topic.name,
                                partition = partition.partition_index,
                                %err
                            )
                        }
                        ProtocolError::OffsetNotAvailable => {
                            // nothing wrong but we didn't commit, we'll get it next time round
                        }
                        ProtocolError::FencedInstanceId => {
                            // our static membership identity was stolen by another member
                            // using the same group.instance.id; nothing downstream of this
                            // commit is trustworthy, so stop processing and let the caller
                            // rejoin with a fresh membership.
                            fenced.get_or_insert(err);
                        }
                        ProtocolError::UnknownTopicOrPartition => {
                            // TODO: handle this error
                            self.invalidate("", gen).await;
                        }
                        _ => {
                            self.invalidate("", gen).await;
                        }
                    }
                }
            }
        }

        if let Some(protocol_error) = fenced {
            return Err(Error::ServerError {
                protocol_error,
                error_message: None,
                request: RequestContext::Group(self.group.clone()),
                response: None,
                is_virtual: false,
            });
        }

        Ok(())
    }

    pub fn assignment(&self) -> &[PartitionAssignment] {
        &self.assignment.topics
    }
}

/// Caches the coordinator broker
#[async_trait]
impl BrokerCache for &ConsumerGroup {
    type R = MessengerTransport;
    type E = Error;

    async fn get(&self) -> Result<(Arc<Self::R>, BrokerCacheGeneration), Self::E> {
        let mut current = self.coordinator.lock().await;
        if let Some(broker) = &current.0 {
            return Ok((Arc::clone(broker), current.1));
        }

        info!("creating a new coordinator broker connection");

        // find the coordinator
        let req = &FindCoordinatorRequest {
            key: self.group.clone(),
            key_type: CoordinatorType::Group,
            coordinator_keys: vec![],
            tagged_fields: None,
        };

        let coordinator_id = maybe_retry(&self.backoff, *self, "find_coordinator", || async move {
            // we don't need to connect to controller, every broker can handle this request.
            //
            // See: https://developer.confluent.io/courses/architecture/consumer-group-protocol/#step-1--find-group-coordinator
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

            Ok(resp.node_id)
        })
        .await?;

        let coordinator = self.brokers.connect(coordinator_id).await?.ok_or_else(|| {
            Error::InvalidResponse(format!(
                "coordinator {} not found in metadata response",
                coordinator_id
            ))
        })?;

        current.0 = Some(Arc::clone(&coordinator));
        current.1.bump();

        Ok((coordinator, current.1))
    }

    async fn invalidate(&self, reason: &'static str, gen: BrokerCacheGeneration) {
        let mut guard = self.coordinator.lock().await;

        if guard.1 != gen {
            // stale request
            debug!(
                message = "stale invalidation request for coordinator cache",
                reason,
                current_gen = guard.1.get(),
                request_gen = gen.get(),
            );

            return;
        }

        info!(message = "invalidating cached coordinator broker", reason);

        guard.0.take();
    }
}

fn round_robin(
    topics: &[Topic],
    members: Vec<JoinGroupResponseMember>,
) -> BTreeMap<String, Vec<PartitionAssignment>> {
    let mut plan = BTreeMap::default();

    let mut i = 0;
    let n = members.len();
    for topic in topics {
        for partition in topic.partitions.keys() {
            let member = loop {
                let member = &members[i % n];
                i += 1;

                if member.metadata.topics.contains(&topic.name) {
                    break &member.member_id;
                }
            };

            let tp = match plan.get_mut(member) {
                Some(tp) => tp,
                None => {
                    plan.entry(member.clone()).or_insert_with(|| {
                        vec![PartitionAssignment {
                            topic: topic.name.to_string(),
                            partitions: vec![*partition],
                        }]
                    });

                    continue;
                }
            };

            match tp.iter_mut().find(|a| a.topic == topic.name) {
                Some(assignment) => {
                    assignment.partitions.push(*partition);
                }
                None => tp.push(PartitionAssignment {
                    topic: topic.name.clone(),
                    partitions: vec![*partition],
                }),
            }
        }
    }

    plan
}

fn range(
    topics: &[Topic],
    members: Vec<JoinGroupResponseMember>,
) -> BTreeMap<String, Vec<PartitionAssignment>> {
    let mut plan = BTreeMap::default();

    // build members by topic map
    let mut mbt: BTreeMap<String, Vec<String>> = BTreeMap::default();
    for JoinGroupResponseMember {
        member_id,
        metadata,
        ..
    } in members
    {
        for topic in metadata.topics {
            mbt.entry(topic)
                .and_modify(|ids| ids.push(member_id.clone()))
                .or_insert(vec![member_id.clone()]);
        }
    }

    // assemble plan
    for (topic_name, mut ids) in mbt {
        ids.sort();
        ids.dedup();

        let topic = topics
            .into_iter()
            .find(|topic| topic.name == topic_name)
            .expect("topic must exist");
        let partitions_per_consumer = topic.partitions.len() / ids.len();
        let consumers_with_extra_partition = topic.partitions.len() % ids.len();

        for (index, id) in ids.into_iter().enumerate() {
            let min = index * partitions_per_consumer
                + std::cmp::min(consumers_with_extra_partition, index);
            let extra = if index < consumers_with_extra_partition {
                1
            } else {
                0
            };

            let max = min + partitions_per_consumer + extra;
            let mut part = topic.partitions.keys().copied().collect::<Vec<_>>();
            let partitions = part.drain(min..max).collect::<Vec<_>>();
            if partitions.is_empty() {
                continue;
            }

            plan.entry(id)
                .and_modify(|pas: &mut Vec<PartitionAssignment>| {
                    pas.push(PartitionAssignment {
                        topic: topic.name.clone(),
                        partitions: partitions.clone(),
                    })
                })
                .or_insert(vec![PartitionAssignment {
                    topic: topic.name.clone(),
                    partitions,
                }]);
        }
    }

    plan
}
