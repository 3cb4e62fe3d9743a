use async_trait::async_trait;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::protocol::messages::{
    CreateTopicRequest, CreateTopicsRequest, DeleteGroupResult, DeleteGroupsRequest,
    DeleteTopicsRequest, DescribeGroupsRequest, DescribeGroupsResponseGroup, FindCoordinatorRequest,
    JoinGroupProtocol, JoinGroupRequest, ListGroupsRequest, ListGroupsResponseGroup,
    MetadataResponse,
};
use crate::{
    backoff::{Backoff, BackoffConfig, ErrorOrThrottle},
    client::{Error, Result},
    connection::{
        BrokerCache, BrokerCacheGeneration, BrokerConnection, BrokerConnector, MessengerTransport,
        MetadataLookupMode,
    },
    messenger::RequestError,
    protocol::{
        error::Error as ProtocolError,
        messages::find_coordinator::CoordinatorType,
    },
    throttle::maybe_throttle,
    validation::ExactlyOne,
};

use super::error::RequestContext;

/// DEFAULT_SESSION_TIMEOUT_MS contains the default interval the coordinator will wait
/// for a heartbeat before marking a consumer as dead.
const DEFAULT_SESSION_TIMEOUT_MS: i32 = 30 * 1000;

/// DEFAULT_REBALANCE_TIMEOUT_MS contains the amount of time the coordinator will wait
/// for consumers to issue a join group once a rebalance has been requested.
const DEFAULT_REBALANCE_TIMEOUT_MS: i32 = 30 * 1000;

#[derive(Debug)]
pub struct ControllerClient {
    brokers: Arc<BrokerConnector>,

    backoff_config: Arc<BackoffConfig>,

    /// Current broker connection if any
    current_broker: Mutex<(Option<BrokerConnection>, BrokerCacheGeneration)>,
}

impl ControllerClient {
    pub(super) fn new(brokers: Arc<BrokerConnector>, backoff_config: Arc<BackoffConfig>) -> Self {
        Self {
            brokers,
            backoff_config,
            current_broker: Mutex::new((None, BrokerCacheGeneration::START)),
        }
    }

    /// Create a topic
    pub async fn create_topic(
        &self,
        name: impl Into<String> + Send,
        num_partitions: i32,
        replication_factor: i16,
        timeout_ms: i32,
    ) -> Result<()> {
        let request = &CreateTopicsRequest {
            topics: vec![CreateTopicRequest {
                name: name.into(),
                num_partitions,
                replication_factor,
                assignments: vec![],
                configs: vec![],
                tagged_fields: None,
            }],
            timeout_ms,
            validate_only: None,
            tagged_fields: None,
        };

        maybe_retry(&self.backoff_config, self, "create_topic", || async move {
            let (broker, gen) = self
                .get()
                .await
                .map_err(|e| ErrorOrThrottle::Error((e, None)))?;
            let response = broker
                .request(request)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e.into(), Some(gen))))?;

            maybe_throttle(response.throttle_time_ms)?;

            let topic = response
                .topics
                .exactly_one()
                .map_err(|e| ErrorOrThrottle::Error((Error::exactly_one_topic(e), Some(gen))))?;

            match topic.error {
                None => Ok(()),
                Some(protocol_error) => Err(ErrorOrThrottle::Error((
                    Error::ServerError {
                        protocol_error,
                        error_message: topic.error_message,
                        request: RequestContext::Topic(topic.name),
                        response: None,
                        is_virtual: false,
                    },
                    Some(gen),
                ))),
            }
        })
        .await?;

        // Refresh the cache now there is definitely a new topic to observe.
        let _ = self.brokers.refresh_metadata().await;

        Ok(())
    }

    /// Delete a topic
    pub async fn delete_topic(
        &self,
        name: impl Into<String> + Send,
        timeout_ms: i32,
    ) -> Result<()> {
        let request = &DeleteTopicsRequest {
            topic_names: vec![name.into()],
            timeout_ms,
            tagged_fields: None,
        };

        maybe_retry(&self.backoff_config, self, "delete_topic", || async move {
            let (broker, gen) = self
                .get()
                .await
                .map_err(|e| ErrorOrThrottle::Error((e, None)))?;
            let response = broker
                .request(request)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e.into(), Some(gen))))?;

            maybe_throttle(response.throttle_time_ms)?;

            let topic = response
                .responses
                .exactly_one()
                .map_err(|e| ErrorOrThrottle::Error((Error::exactly_one_topic(e), Some(gen))))?;

            match topic.error {
                None => Ok(()),
                Some(protocol_error) => Err(ErrorOrThrottle::Error((
                    Error::ServerError {
                        protocol_error,
                        error_message: topic.error_message,
                        request: RequestContext::Topic(topic.name),
                        response: None,
                        is_virtual: false,
                    },
                    Some(gen),
                ))),
            }
        })
        .await?;

        // Refresh the cache now there is definitely a new topic to observe.
        let _ = self.brokers.refresh_metadata().await;

        Ok(())
    }

    /// Delete a consumer group.
    pub async fn delete_group(&self, group_id: impl Into<String> + Send) -> Result<()> {
        let group_id = group_id.into();
        let request = &DeleteGroupsRequest {
            group_names: vec![group_id.clone()],
            tagged_fields: None,
        };

        maybe_retry(&self.backoff_config, self, "delete_group", || async move {
            let (broker, gen) = self
                .get()
                .await
                .map_err(|e| ErrorOrThrottle::Error((e, None)))?;
            let response = broker
                .request(request)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e.into(), Some(gen))))?;

            let result: DeleteGroupResult = response
                .results
                .exactly_one()
                .map_err(|e| ErrorOrThrottle::Error((Error::exactly_one_group(e), Some(gen))))?;

            match result.error_code {
                None => Ok(()),
                Some(protocol_error) => Err(ErrorOrThrottle::Error((
                    Error::ServerError {
                        protocol_error,
                        error_message: None,
                        request: RequestContext::Group(group_id.clone()),
                        response: None,
                        is_virtual: false,
                    },
                    Some(gen),
                ))),
            }
        })
        .await
    }

    pub async fn describe_groups(
        &self,
        groups: &[String],
    ) -> Result<Vec<DescribeGroupsResponseGroup>> {
        let request = &DescribeGroupsRequest {
            groups: groups.to_vec(),
            include_authorized_operations: false,
            tagged_fields: None,
        };

        maybe_retry(
            &self.backoff_config,
            self,
            "describe_groups",
            || async move {
                let (broker, gen) = self
                    .get()
                    .await
                    .map_err(|err| ErrorOrThrottle::Error((err, None)))?;
                let response = broker
                    .request(request)
                    .await
                    .map_err(|e| ErrorOrThrottle::Error((e.into(), Some(gen))))?;

                Ok(response.groups)
            },
        )
        .await
    }

    pub async fn list_groups(&self) -> Result<Vec<ListGroupsResponseGroup>> {
        let request = &ListGroupsRequest {
            states_filter: vec![],
            tagged_fields: None,
        };

        maybe_retry(&self.backoff_config, self, "list_groups", || async move {
            let (broker, gen) = self
                .get()
                .await
                .map_err(|e| ErrorOrThrottle::Error((e, None)))?;
            let response = broker
                .request(request)
                .await
                .map_err(|e| ErrorOrThrottle::Error((e.into(), Some(gen))))?;

            maybe_throttle(response.throttle_time_ms)?;

            Ok(response.groups)
        })
        .await
    }

    /// join_group join the group and return member_id
    pub async fn join_group(&self, group_id: &str) -> Result<String> {
        let req = &JoinGroupRequest {
            group_id: group_id.to_string(),
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            rebalance_timeout_ms: DEFAULT_REBALANCE_TIMEOUT_MS,
            member_id: "".to_owned(),
            group_instance_id: None,
            protocol_type: "consumer".to_string(),
            protocols: vec![JoinGroupProtocol {
                name: "roundrobin".to_string(),
                metadata: vec![],
                tagged_fields: None,
            }],
            tagged_fields: None,
        };

        maybe_retry(&self.backoff_config, self, "join_groups", || async move {
            let coordinator_id = self.get_coordinator(group_id).await?;

            let broker = self
                .brokers
                .connect(coordinator_id)
                .await
                .map_err(|err| ErrorOrThrottle::Error((err.into(), None)))?
                .ok_or(ErrorOrThrottle::Error((
                    Error::InvalidResponse(format!("Coordinator {} not found", coordinator_id)),
                    None,
                )))?;

            let resp = broker
                .request(req)
                .await
                .map_err(|err| ErrorOrThrottle::Error((err.into(), None)))?;

            maybe_throttle(resp.throttle_time_ms)?;

            match resp.error_code {
                None => Ok(resp.member_id),
                Some(protocol_error) => Err(ErrorOrThrottle::Error((
                    Error::ServerError {
                        protocol_error,
                        error_message: Some("join group failed".to_string()),
                        request: RequestContext::Group(group_id.to_string()),
                        response: None,
                        is_virtual: false,
                    },
                    None,
                ))),
            }
        })
        .await
    }

    async fn get_coordinator(
        &self,
        key: &str,
    ) -> std::result::Result<i32, ErrorOrThrottle<(Error, Option<BrokerCacheGeneration>)>> {
        let (broker, gen) = self
            .get()
            .await
            .map_err(|err| ErrorOrThrottle::Error((err, None)))?;

        let req = &FindCoordinatorRequest {
            key: key.to_string(),
            key_type: CoordinatorType::Group,
            coordinator_keys: vec![],
            tagged_fields: None,
        };

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
                    request: RequestContext::Group(key.to_string()),
                    response: None,
                    is_virtual: false,
                },
                Some(gen),
            )));
        }

        Ok(resp.node_id)
    }

    pub async fn metadata(&self) -> Result<MetadataResponse> {
        let (metadata, _gen) = self
            .brokers
            .request_metadata(&MetadataLookupMode::ArbitraryBroker, Some(vec![]))
            .await?;

        Ok(metadata)
    }

    /// Retrieve the broker ID of the controller
    async fn get_controller_id(&self) -> Result<i32> {
        // Request an uncached, fresh copy of the metadata.
        let (metadata, _gen) = self
            .brokers
            .request_metadata(&MetadataLookupMode::ArbitraryBroker, Some(vec![]))
            .await?;

        let controller_id = metadata
            .controller_id
            .ok_or_else(|| Error::InvalidResponse("Leader is NULL".to_owned()))?;

        Ok(controller_id)
    }
}

/// Caches the cluster controller broker.
#[async_trait]
impl BrokerCache for &ControllerClient {
    type R = MessengerTransport;
    type E = Error;

    async fn get(&self) -> Result<(Arc<Self::R>, BrokerCacheGeneration)> {
        let mut current_broker = self.current_broker.lock().await;
        if let Some(broker) = &current_broker.0 {
            return Ok((Arc::clone(broker), current_broker.1));
        }

        info!("Creating new controller broker connection",);

        let controller_id = self.get_controller_id().await?;
        let broker = self.brokers.connect(controller_id).await?.ok_or_else(|| {
            Error::InvalidResponse(format!(
                "Controller {} not found in metadata response",
                controller_id
            ))
        })?;

        current_broker.0 = Some(Arc::clone(&broker));
        current_broker.1.bump();

        Ok((broker, current_broker.1))
    }

    async fn invalidate(&self, reason: &'static str, gen: BrokerCacheGeneration) {
        let mut guard = self.current_broker.lock().await;

        if guard.1 != gen {
            // stale request
            debug!(
                reason,
                current_gen = guard.1.get(),
                request_gen = gen.get(),
                "stale invalidation request for arbitrary broker cache",
            );
            return;
        }

        info!(reason, "Invalidating cached controller broker",);
        guard.0.take();
    }
}

/// Takes a `request_name` and a function yielding a fallible future
/// and handles certain classes of error
pub(crate) async fn maybe_retry<B, R, F, T>(
    backoff_config: &BackoffConfig,
    broker_cache: B,
    request_name: &str,
    f: R,
) -> Result<T>
where
    B: BrokerCache,
    R: (Fn() -> F) + Send + Sync,
    F: std::future::Future<
            Output = Result<T, ErrorOrThrottle<(Error, Option<BrokerCacheGeneration>)>>,
        > + Send,
{
    let mut backoff = Backoff::new(backoff_config);

    backoff
        .retry_with_backoff(request_name, || async {
            let (error, cache_gen) = match f().await {
                Ok(v) => {
                    return ControlFlow::Break(Ok(v));
                }
                Err(ErrorOrThrottle::Throttle(t)) => {
                    return ControlFlow::Continue(ErrorOrThrottle::Throttle(t));
                }
                Err(ErrorOrThrottle::Error(e)) => e,
            };

            match error {
                // broken connection
                Error::Request(RequestError::Poisoned(_) | RequestError::IO(_))
                | Error::Connection(_) => {
                    if let Some(cache_gen) = cache_gen {
                        broker_cache
                            .invalidate("controller client: connection broken", cache_gen)
                            .await
                    }
                }

                // our broker is actually not the controller
                Error::ServerError {
                    protocol_error: ProtocolError::NotController,
                    ..
                } => {
                    if let Some(cache_gen) = cache_gen {
                        broker_cache
                            .invalidate(
                                "controller client: server error: not controller",
                                cache_gen,
                            )
                            .await;
                    }
                }

                // everything else: defer to the protocol error table (or the
                // connection-layer catch-alls in `Error::can_retry`) rather
                // than treating every remaining case as fatal.
                _ if error.can_retry() => {
                    debug!(
                        e=%error,
                        request_name,
                        "retryable error, retrying",
                    );
                }

                // fatal
                _ => {
                    error!(
                        e=%error,
                        request_name,
                        "request encountered fatal error",
                    );
                    return ControlFlow::Break(Err(error));
                }
            }
            ControlFlow::Continue(ErrorOrThrottle::Error(error))
        })
        .await
        .map_err(Error::RetryFailed)?
}
