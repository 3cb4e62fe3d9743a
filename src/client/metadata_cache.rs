//! A small TTL cache in front of [`BrokerConnector::request_metadata`],
//! keyed by topic name.
//!
//! [`PartitionClient`](super::partition::PartitionClient) looks up its
//! leader through here on every produce/fetch call; without a cache that
//! would mean a metadata round trip per call. The cache is refreshed
//! single-flight: concurrent callers for the same (stale or missing) topic
//! serialize on the same lock and only one of them actually talks to a
//! broker, the same way [`crate::connection::BrokerConnector`]'s own
//! arbitrary-broker slot does.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::client::{Error, Result};
use crate::connection::{BrokerConnector, MetadataLookupMode};
use crate::protocol::messages::MetadataResponseTopic;

/// How long a cached topic entry is trusted before a lookup triggers a
/// refresh.
const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct CachedTopic {
    topic: MetadataResponseTopic,
    fetched_at: Instant,
}

pub(crate) struct MetadataCache {
    brokers: Arc<BrokerConnector>,
    ttl: Duration,
    topics: Mutex<HashMap<String, CachedTopic>>,
}

impl MetadataCache {
    pub(crate) fn new(brokers: Arc<BrokerConnector>) -> Self {
        Self {
            brokers,
            ttl: DEFAULT_TTL,
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached metadata for `topic`, refreshing it first if it's
    /// missing, stale, or `force` is set.
    pub(crate) async fn get(&self, topic: &str, force: bool) -> Result<MetadataResponseTopic> {
        let mut topics = self.topics.lock().await;

        if !force {
            if let Some(cached) = topics.get(topic) {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.topic.clone());
                }
            }
        }

        let (response, _gen) = self
            .brokers
            .request_metadata(
                &MetadataLookupMode::ArbitraryBroker,
                Some(vec![topic.to_owned()]),
            )
            .await?;

        let found = response
            .topics
            .into_iter()
            .find(|t| t.name == topic)
            .ok_or_else(|| {
                Error::InvalidResponse(format!(
                    "metadata response did not cover requested topic '{topic}'"
                ))
            })?;

        topics.insert(
            topic.to_owned(),
            CachedTopic {
                topic: found.clone(),
                fetched_at: Instant::now(),
            },
        );

        Ok(found)
    }

    /// Drops any cached entry for `topic`, forcing the next [`Self::get`] to
    /// refresh regardless of age.
    pub(crate) async fn invalidate(&self, topic: &str) {
        self.topics.lock().await.remove(topic);
    }
}
