//! Connection pool: establishes per-broker [`Messenger`] connections,
//! negotiates API versions and (optionally) SASL on connect, tracks cluster
//! topology, and caches connections so repeated lookups for the "current
//! controller" or "the coordinator for group X" reuse one live socket.
//!
//! [`BrokerConnector`] is the pool itself. [`BrokerCache`] is the generic
//! cache contract every long-lived sub-client (the pool's own arbitrary-
//! broker slot, [`crate::client::controller::ControllerClient`]'s
//! controller slot, [`crate::client::consumer_group::ConsumerGroup`]'s
//! coordinator slot) implements so `client::controller::maybe_retry` can
//! invalidate a stale cached connection without knowing which kind it is.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub mod topology;
pub mod transport;

pub use topology::{Broker, BrokerTopology};
pub use transport::{SaslConfig, TlsConfig};

use transport::sasl::{GssapiAuthenticator, OauthBearerCredentials, ScramClient, ScramMechanism};
use transport::Transport;

use crate::backoff::BackoffConfig;
use crate::messenger::{Messenger, RequestError};
use crate::protocol::messages::{
    ApiVersionsRequest, ApiVersionsResponseApiKey, MetadataRequest, MetadataRequestTopic,
    MetadataResponse, SaslAuthenticateRequest, SaslAuthenticateResponse, SaslHandshakeRequest,
};
use crate::protocol::api_version::ApiVersionRange;

/// A [`Messenger`] wired up over this crate's concrete [`Transport`].
pub(crate) type MessengerTransport = Messenger<tokio::io::WriteHalf<Transport>>;

/// A shared handle to one broker's connection.
pub(crate) type BrokerConnection = Arc<MessengerTransport>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] transport::Error),

    #[error("request error: {0}")]
    Request(#[from] RequestError),

    #[error("SASL authentication failed: {0}")]
    Sasl(String),

    #[error("no broker available to connect to")]
    NoBroker,

    #[error(
        "failed to connect to any of {} bootstrap broker(s): {}",
        errors.len(),
        errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    )]
    NoBrokerAvailable { errors: Vec<Error> },

    #[error("broker {broker_id} is not present in the cached cluster topology")]
    UnknownBroker { broker_id: i32 },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A monotonic stamp paired with a cached [`BrokerConnection`].
///
/// A caller that got a connection at generation `g` and later found it
/// broken calls [`BrokerCache::invalidate`] with `g`; if the cache has since
/// moved on to a newer connection (a concurrent caller already replaced it),
/// the generations no longer match and the invalidation is a no-op instead
/// of evicting a connection nobody has complained about yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerCacheGeneration(i64);

impl BrokerCacheGeneration {
    pub const START: Self = Self(0);

    pub fn bump(&mut self) {
        self.0 += 1;
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

/// A cache of one cached broker connection, shared between the connection
/// pool itself and every sub-client that pins a connection to a specific
/// logical broker (controller, group coordinator, ...).
#[async_trait]
pub trait BrokerCache: Send + Sync {
    type R: Send + Sync;
    type E: Send;

    /// Returns the cached connection, establishing one if necessary.
    async fn get(&self) -> std::result::Result<(Arc<Self::R>, BrokerCacheGeneration), Self::E>;

    /// Evicts the cached connection if it is still at generation `gen`.
    async fn invalidate(&self, reason: &'static str, r#gen: BrokerCacheGeneration);
}

/// Which broker a metadata lookup should be sent to.
#[derive(Debug, Clone)]
pub enum MetadataLookupMode {
    /// Any broker will do; prefer one already known to the topology, else
    /// fall back to a bootstrap broker.
    ArbitraryBroker,

    /// Ask this specific broker (e.g. because it is a known partition
    /// leader and its view is wanted specifically).
    SpecificBroker(i32),
}

/// Owns the bootstrap configuration, the cached cluster topology, and every
/// live broker connection. Cheap to clone via `Arc`; every sub-client shares
/// one instance.
pub struct BrokerConnector {
    bootstrap_brokers: Vec<String>,
    client_id: Arc<str>,
    tls_config: TlsConfig,
    socks5_proxy: Option<String>,
    sasl_config: Option<SaslConfig>,
    max_message_size: usize,
    #[allow(dead_code)]
    backoff_config: Arc<BackoffConfig>,

    pub(crate) topology: BrokerTopology,

    /// Connections keyed by broker ID, reused across lookups for the same
    /// broker regardless of why it was contacted.
    cached_connections: Mutex<HashMap<i32, BrokerConnection>>,

    /// Per-broker locks held while dialing, so concurrent cache misses for
    /// the same broker coalesce onto one connect instead of racing.
    connect_locks: Mutex<HashMap<i32, Arc<Mutex<()>>>>,

    /// The connection used for metadata lookups that don't target a
    /// specific broker.
    current_arbitrary_broker: Mutex<(Option<BrokerConnection>, BrokerCacheGeneration)>,

    /// Held while dialing a fresh arbitrary-broker connection, so
    /// concurrent cache misses coalesce the same way [`Self::connect_locks`]
    /// does for specific brokers.
    arbitrary_connect_lock: Mutex<()>,
}

impl std::fmt::Debug for BrokerConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConnector")
            .field("bootstrap_brokers", &self.bootstrap_brokers)
            .field("client_id", &self.client_id)
            .field("topology", &self.topology)
            .finish_non_exhaustive()
    }
}

impl BrokerConnector {
    pub(crate) fn new(
        bootstrap_brokers: Vec<String>,
        client_id: Arc<str>,
        tls_config: TlsConfig,
        socks5_proxy: Option<String>,
        sasl_config: Option<SaslConfig>,
        max_message_size: usize,
        backoff_config: Arc<BackoffConfig>,
    ) -> Self {
        Self {
            bootstrap_brokers,
            client_id,
            tls_config,
            socks5_proxy,
            sasl_config,
            max_message_size,
            backoff_config,
            topology: BrokerTopology::default(),
            cached_connections: Mutex::new(HashMap::new()),
            connect_locks: Mutex::new(HashMap::new()),
            current_arbitrary_broker: Mutex::new((None, BrokerCacheGeneration::START)),
            arbitrary_connect_lock: Mutex::new(()),
        }
    }

    /// Addresses worth trying for a lookup that doesn't care which broker
    /// answers: known cluster members if we have them, else the bootstrap
    /// list the client was built with.
    fn arbitrary_broker_addrs(&self) -> Vec<String> {
        if self.topology.is_empty() {
            self.bootstrap_brokers.clone()
        } else {
            self.topology
                .get_brokers()
                .into_iter()
                .map(|b| b.to_string())
                .collect()
        }
    }

    async fn connect_addr(&self, addr: &str) -> Result<BrokerConnection> {
        let transport = Transport::connect(
            addr,
            self.tls_config.clone(),
            self.socks5_proxy.clone(),
            Some(Duration::from_secs(10)),
        )
        .await?;

        let (read_half, write_half) = tokio::io::split(transport);
        let messenger = Messenger::new(
            read_half,
            write_half,
            self.max_message_size,
            Arc::clone(&self.client_id),
        );

        negotiate_versions(&messenger).await?;

        let messenger = Arc::new(messenger);

        if let Some(sasl_config) = &self.sasl_config {
            let session_lifetime_ms = authenticate(&messenger, sasl_config).await?;
            if let Some(lifetime_ms) = session_lifetime_ms.filter(|ms| *ms > 0) {
                spawn_reauth_timer(Arc::clone(&messenger), sasl_config.clone(), lifetime_ms);
            }
        }

        Ok(messenger)
    }

    /// Returns a cached or freshly established connection to `broker_id`,
    /// or `None` if that broker is not present in the cached topology.
    ///
    /// Concurrent callers that miss the cache for the same `broker_id`
    /// coalesce onto a single dial: the first one through acquires the
    /// per-broker connect lock and the rest wait on it, then observe the
    /// connection it just populated instead of racing their own connects.
    pub(crate) async fn connect(&self, broker_id: i32) -> Result<Option<BrokerConnection>> {
        if let Some(conn) = self.cached_connection(broker_id).await {
            return Ok(Some(conn));
        }

        let lock = {
            let mut locks = self.connect_locks.lock().await;
            Arc::clone(
                locks
                    .entry(broker_id)
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let _guard = lock.lock().await;

        if let Some(conn) = self.cached_connection(broker_id).await {
            return Ok(Some(conn));
        }

        let broker = match self.topology.get_broker(broker_id).await {
            Some(b) => b,
            None => return Ok(None),
        };

        let conn = self.connect_addr(&broker.to_string()).await?;

        let mut cache = self.cached_connections.lock().await;
        cache.insert(broker_id, Arc::clone(&conn));
        Ok(Some(conn))
    }

    async fn cached_connection(&self, broker_id: i32) -> Option<BrokerConnection> {
        let cache = self.cached_connections.lock().await;
        cache
            .get(&broker_id)
            .filter(|conn| !conn.is_poisoned())
            .map(Arc::clone)
    }

    async fn cached_arbitrary_broker(&self) -> Option<(BrokerConnection, BrokerCacheGeneration)> {
        let current = self.current_arbitrary_broker.lock().await;
        current
            .0
            .as_ref()
            .filter(|conn| !conn.is_poisoned())
            .map(|conn| (Arc::clone(conn), current.1))
    }

    /// Runs a `Metadata` request against the broker `mode` selects.
    pub(crate) async fn request_metadata(
        &self,
        mode: &MetadataLookupMode,
        topics: Option<Vec<String>>,
    ) -> Result<(MetadataResponse, BrokerCacheGeneration)> {
        let request = &MetadataRequest {
            topics: topics.map(|names| {
                names
                    .into_iter()
                    .map(|name| MetadataRequestTopic {
                        name,
                        tagged_fields: None,
                    })
                    .collect()
            }),
            allow_auto_topic_creation: Some(false),
            include_cluster_authorized_operations: None,
            include_topic_authorized_operations: None,
            tagged_fields: None,
        };

        match mode {
            MetadataLookupMode::ArbitraryBroker => {
                let (broker, r#gen) = self.get().await?;
                let response = broker.request(request).await?;
                Ok((response, r#gen))
            }
            MetadataLookupMode::SpecificBroker(broker_id) => {
                let broker = self.connect(*broker_id).await?.ok_or(Error::UnknownBroker {
                    broker_id: *broker_id,
                })?;
                let response = broker.request(request).await?;
                Ok((response, BrokerCacheGeneration::START))
            }
        }
    }

    /// Refreshes the cached topology from an uncached, fresh `Metadata`
    /// response covering every topic.
    pub(crate) async fn refresh_metadata(&self) -> Result<()> {
        let (response, _gen) = self
            .request_metadata(&MetadataLookupMode::ArbitraryBroker, Some(vec![]))
            .await?;
        self.topology.update(&response.brokers);
        Ok(())
    }
}

/// Caches the connection used for lookups that don't target a specific
/// broker.
#[async_trait]
impl BrokerCache for &BrokerConnector {
    type R = MessengerTransport;
    type E = Error;

    async fn get(&self) -> Result<(Arc<Self::R>, BrokerCacheGeneration)> {
        if let Some(hit) = self.cached_arbitrary_broker().await {
            return Ok(hit);
        }

        let _guard = self.arbitrary_connect_lock.lock().await;

        // a concurrent caller may have already dialed and populated the
        // cache while this task waited for the lock above.
        if let Some(hit) = self.cached_arbitrary_broker().await {
            return Ok(hit);
        }

        info!("creating new arbitrary broker connection");

        let addrs = self.arbitrary_broker_addrs();
        if addrs.is_empty() {
            return Err(Error::NoBroker);
        }

        let mut errors = Vec::with_capacity(addrs.len());
        for addr in &addrs {
            match self.connect_addr(addr).await {
                Ok(conn) => {
                    let mut current = self.current_arbitrary_broker.lock().await;
                    current.0 = Some(Arc::clone(&conn));
                    current.1.bump();
                    return Ok((conn, current.1));
                }
                Err(err) => {
                    debug!(%err, addr, "failed to connect to broker, trying next bootstrap address");
                    errors.push(err);
                }
            }
        }

        Err(Error::NoBrokerAvailable { errors })
    }

    async fn invalidate(&self, reason: &'static str, r#gen: BrokerCacheGeneration) {
        let mut guard = self.current_arbitrary_broker.lock().await;

        if guard.1 != r#gen {
            debug!(
                reason,
                current_gen = guard.1.get(),
                request_gen = r#gen.get(),
                "stale invalidation request for arbitrary broker cache",
            );
            return;
        }

        info!(reason, "invalidating cached arbitrary broker connection");
        guard.0.take();
    }
}

/// Runs the `ApiVersions` handshake and caches the broker's supported
/// ranges on `messenger`.
async fn negotiate_versions(messenger: &MessengerTransport) -> Result<()> {
    let request = ApiVersionsRequest {
        client_software_name: Some(env!("CARGO_PKG_NAME").to_string()),
        client_software_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        tagged_fields: None,
    };

    let response = messenger.request(&request).await?;

    if let Some(err) = response.error_code {
        return Err(Error::InvalidResponse(format!(
            "broker rejected ApiVersions: {err}"
        )));
    }

    let versions: HashMap<_, _> = response
        .api_keys
        .into_iter()
        .map(|k: ApiVersionsResponseApiKey| {
            (k.api_key, ApiVersionRange::new(k.min_version.0, k.max_version.0))
        })
        .collect();

    messenger.set_version_ranges(versions);

    Ok(())
}

/// Runs `SaslHandshake` followed by the mechanism-specific `SaslAuthenticate`
/// round trip(s). Returns the broker's advertised `session_lifetime_ms`, if
/// any, so the caller can arm a re-authentication timer.
async fn authenticate(
    messenger: &MessengerTransport,
    sasl_config: &SaslConfig,
) -> Result<Option<i64>> {
    let handshake_request = SaslHandshakeRequest::new(sasl_config.mechanism_name());
    let handshake_response = messenger.request(&handshake_request).await?;

    if let Some(err) = handshake_response.error_code {
        return Err(Error::Sasl(format!(
            "handshake rejected ({err}), broker supports: {:?}",
            handshake_response.mechanisms
        )));
    }

    match sasl_config {
        SaslConfig::Plain(creds) => {
            let request = SaslAuthenticateRequest::new(transport::sasl::plain_auth_bytes(creds));
            let response = messenger.request(&request).await?;
            check_auth_response(&response)?;
            Ok(response.session_lifetime_ms)
        }
        SaslConfig::ScramSha256(creds) => scram_authenticate(messenger, ScramMechanism::Sha256, creds).await,
        SaslConfig::ScramSha512(creds) => scram_authenticate(messenger, ScramMechanism::Sha512, creds).await,
        SaslConfig::OauthBearer(callback) => {
            let creds = callback().await.map_err(Error::Sasl)?;
            let request = SaslAuthenticateRequest::new(oauth_bearer_auth_bytes(&creds));
            let response = messenger.request(&request).await?;
            check_auth_response(&response)?;
            Ok(response.session_lifetime_ms)
        }
        SaslConfig::Gssapi(negotiator) => gssapi_authenticate(messenger, negotiator.as_ref()).await,
    }
}

async fn scram_authenticate(
    messenger: &MessengerTransport,
    mechanism: ScramMechanism,
    creds: &transport::sasl::Credentials,
) -> Result<Option<i64>> {
    let client = ScramClient::new(mechanism, creds);

    let first_request = SaslAuthenticateRequest::new(client.client_first_message());
    let first_response = messenger.request(&first_request).await?;
    check_auth_response(&first_response)?;

    let final_message = client
        .client_final_message(&first_response.auth_bytes)
        .map_err(|e| Error::Sasl(e.to_string()))?;

    let final_request = SaslAuthenticateRequest::new(final_message);
    let final_response = messenger.request(&final_request).await?;
    check_auth_response(&final_response)?;

    client
        .verify_server_final(&final_response.auth_bytes)
        .map_err(|e| Error::Sasl(e.to_string()))?;

    Ok(final_response.session_lifetime_ms)
}

/// Drives a caller-supplied [`GssapiAuthenticator`] through as many
/// `SaslAuthenticate` round trips as `step` needs.
async fn gssapi_authenticate(
    messenger: &MessengerTransport,
    negotiator: &dyn GssapiAuthenticator,
) -> Result<Option<i64>> {
    let mut challenge = Vec::new();
    loop {
        let (token, done) = negotiator.step(&challenge).map_err(Error::Sasl)?;
        let request = SaslAuthenticateRequest::new(token);
        let response = messenger.request(&request).await?;
        check_auth_response(&response)?;

        if done {
            return Ok(response.session_lifetime_ms);
        }
        challenge = response.auth_bytes;
    }
}

/// Spawns a background task that re-runs the SASL exchange at 80% of the
/// broker-advertised session lifetime, for as long as `messenger` is alive.
/// A re-auth failure poisons the connection the same way a broken read loop
/// does, since the broker will drop the session once the original lifetime
/// elapses regardless.
fn spawn_reauth_timer(
    messenger: Arc<MessengerTransport>,
    sasl_config: SaslConfig,
    mut lifetime_ms: i64,
) {
    tokio::spawn(async move {
        loop {
            let delay = Duration::from_millis((lifetime_ms as u64 * 8) / 10);
            tokio::time::sleep(delay).await;

            if messenger.is_poisoned() {
                return;
            }

            match authenticate(&messenger, &sasl_config).await {
                Ok(Some(next_lifetime_ms)) if next_lifetime_ms > 0 => {
                    info!("re-authenticated SASL session");
                    lifetime_ms = next_lifetime_ms;
                }
                Ok(_) => {
                    debug!("re-authenticated SASL session, broker stopped advertising a session lifetime");
                    return;
                }
                Err(err) => {
                    debug!(%err, "SASL re-authentication failed, connection will be dropped");
                    return;
                }
            }
        }
    });
}

fn check_auth_response(response: &SaslAuthenticateResponse) -> Result<()> {
    match response.error_code {
        None => Ok(()),
        Some(err) => Err(Error::Sasl(format!(
            "{err}{}",
            response
                .error_message
                .as_deref()
                .map(|m| format!(": {m}"))
                .unwrap_or_default()
        ))),
    }
}

/// Frames an OAUTHBEARER initial response per RFC 7628: `n,,` GS2 header
/// followed by `\x01`-separated `key=value` attributes, terminated by two
/// `\x01` bytes.
fn oauth_bearer_auth_bytes(creds: &OauthBearerCredentials) -> Vec<u8> {
    let mut msg = format!("n,,\x01auth=Bearer {}", creds.token);
    for (key, value) in &creds.extensions {
        msg.push('\x01');
        msg.push_str(key);
        msg.push('=');
        msg.push_str(value);
    }
    msg.push_str("\x01\x01");
    msg.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_cache_generation_bump() {
        let mut gen = BrokerCacheGeneration::START;
        assert_eq!(gen.get(), 0);
        gen.bump();
        assert_eq!(gen.get(), 1);
        gen.bump();
        assert_eq!(gen.get(), 2);
    }

    #[test]
    fn oauth_bearer_framing() {
        let creds = OauthBearerCredentials {
            token: "tok".to_string(),
            extensions: vec![("host".to_string(), "example.com".to_string())],
        };
        let bytes = oauth_bearer_auth_bytes(&creds);
        let got = String::from_utf8(bytes).unwrap();
        assert_eq!(got, "n,,\x01auth=Bearer tok\x01host=example.com\x01\x01");
    }
}
