//! Correlation-ID multiplexed request/response engine for a single broker
//! connection.
//!
//! A [`Messenger`] owns one [`Transport`](crate::connection::transport::Transport)
//! and lets many callers share it concurrently: each [`Messenger::request`]
//! call assigns itself a fresh correlation ID, writes its frame under a
//! write-side mutex, and then waits on a oneshot channel that the background
//! [`read_task`] fulfils once a response frame with a matching correlation ID
//! comes off the wire. A broker connection is otherwise ordered (TCP), but
//! nothing says responses arrive in request order, so correlation IDs are the
//! only thing tying a write to its eventual read.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::protocol::api_key::ApiKey;
use crate::protocol::api_version::{ApiVersion, ApiVersionRange};
use crate::protocol::messages::{
    ReadVersionedError, ReadVersionedType, RequestBody, RequestHeader, ResponseHeader,
    WriteVersionedError, WriteVersionedType,
};
use crate::protocol::traits::{ReadError, ReadType, WriteError, WriteType};

/// Maximum frame size this crate will ever try to allocate for a response,
/// regardless of what a misbehaving broker claims in its length prefix.
const MAX_FRAME_SIZE_HARD_LIMIT: usize = 1024 * 1024 * 1024;

/// How long [`Messenger::request`] waits for a response before giving up on
/// it. A broker that never answers (network black hole, overloaded enough to
/// never schedule the response) must not wedge callers forever.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RequestError {
    #[error("connection is poisoned, a previous request corrupted the stream")]
    Poisoned(Arc<RequestError>),

    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),

    #[error("cannot read data: {0}")]
    ReadError(#[from] ReadError),

    #[error("cannot write data: {0}")]
    WriteError(#[from] WriteError),

    #[error("cannot read versioned data: {0}")]
    ReadVersionedError(#[from] ReadVersionedError),

    #[error("cannot write versioned data: {0}")]
    WriteVersionedError(#[from] WriteVersionedError),

    #[error("response frame of {size} bytes exceeds the configured limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("broker does not support API {api_key:?} in any version this client can speak")]
    NoVersionMatch { api_key: ApiKey },

    #[error("the connection was closed before a response arrived")]
    Disconnected,

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// The negotiated version range per API key for one broker connection,
/// learned once via `ApiVersions` and then reused for every subsequent
/// request on this connection.
#[derive(Debug, Default)]
pub struct VersionRanges(HashMap<ApiKey, ApiVersionRange>);

impl VersionRanges {
    pub fn get(&self, api_key: ApiKey) -> Option<ApiVersionRange> {
        self.0.get(&api_key).copied()
    }

    /// Picks the highest version both this client and the broker support.
    ///
    /// Falls back to the client's own max version when the broker's
    /// supported range for this API is unknown (e.g. before `ApiVersions`
    /// has run, which is only the case while negotiating `ApiVersions`
    /// itself).
    fn negotiate(&self, api_key: ApiKey, client_range: ApiVersionRange) -> Option<ApiVersion> {
        match self.get(api_key) {
            None => Some(client_range.max()),
            Some(broker_range) => {
                let lo = client_range.min().0.max(broker_range.min().0);
                let hi = client_range.max().0.min(broker_range.max().0);
                (lo <= hi).then_some(ApiVersion(hi))
            }
        }
    }
}

struct PendingRequest {
    response_header_version: ApiVersion,
    channel: oneshot::Sender<Result<Vec<u8>, Arc<RequestError>>>,
}

struct SharedState {
    pending: Mutex<HashMap<i32, PendingRequest>>,
    correlation_id: AtomicI32,
    poison: Mutex<Option<Arc<RequestError>>>,
    versions: Mutex<VersionRanges>,
    max_message_size: usize,
    client_id: Arc<str>,
    request_timeout: Duration,
}

impl SharedState {
    fn poisoned(&self) -> Option<Arc<RequestError>> {
        self.poison.lock().clone()
    }

    fn poison_with(&self, err: RequestError) -> Arc<RequestError> {
        let err = Arc::new(err);
        let mut guard = self.poison.lock();
        if guard.is_none() {
            *guard = Some(Arc::clone(&err));
        }
        // fail every request still waiting on a response; nothing more will
        // ever arrive on a dead connection.
        for (_, pending) in self.pending.lock().drain() {
            let _ = pending.channel.send(Err(Arc::clone(&err)));
        }
        err
    }
}

/// Drives one broker connection: multiplexes concurrent [`Messenger::request`]
/// calls over a single [`Transport`](crate::connection::transport::Transport).
pub struct Messenger<W> {
    write_half: AsyncMutex<W>,
    state: Arc<SharedState>,
    read_task: JoinHandle<()>,
}

impl<W> std::fmt::Debug for Messenger<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger").finish_non_exhaustive()
    }
}

impl<W> Drop for Messenger<W> {
    fn drop(&mut self) {
        self.read_task.abort();
    }
}

impl<W> Messenger<W>
where
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    pub fn new<R>(read_half: R, write_half: W, max_message_size: usize, client_id: Arc<str>) -> Self
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        let state = Arc::new(SharedState {
            pending: Mutex::new(HashMap::new()),
            correlation_id: AtomicI32::new(0),
            poison: Mutex::new(None),
            versions: Mutex::new(VersionRanges::default()),
            max_message_size,
            client_id,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        });

        let read_task = tokio::spawn(read_loop(read_half, Arc::clone(&state)));

        Self {
            write_half: AsyncMutex::new(write_half),
            state,
            read_task,
        }
    }

    /// Overrides the negotiated version table, e.g. after an `ApiVersions`
    /// round trip.
    pub fn set_version_ranges(&self, versions: HashMap<ApiKey, ApiVersionRange>) {
        *self.state.versions.lock() = VersionRanges(versions);
    }

    pub fn version_ranges(&self) -> HashMap<ApiKey, ApiVersionRange> {
        self.state.versions.lock().0.clone()
    }

    /// Whether the connection has already failed and will refuse every
    /// further request.
    pub fn is_poisoned(&self) -> bool {
        self.state.poisoned().is_some()
    }

    /// Sends `body` and awaits its response, picking the highest mutually
    /// supported version for `R::API_KEY`.
    pub async fn request<R>(&self, body: &R) -> Result<R::ResponseBody, RequestError>
    where
        R: RequestBody + WriteVersionedType<Cursor<Vec<u8>>> + Send + Sync,
        R::ResponseBody: ReadVersionedType<Cursor<Vec<u8>>>,
    {
        if let Some(err) = self.state.poisoned() {
            return Err(RequestError::Poisoned(err));
        }

        let request_version = {
            let versions = self.state.versions.lock();
            versions
                .negotiate(R::API_KEY, R::API_VERSION_RANGE)
                .ok_or(RequestError::NoVersionMatch {
                    api_key: R::API_KEY,
                })?
        };

        let request_header_version =
            if request_version >= R::FIRST_TAGGED_FIELD_IN_REQUEST_VERSION {
                ApiVersion(2)
            } else {
                ApiVersion(1)
            };
        let response_header_version =
            if request_version >= R::FIRST_TAGGED_FIELD_IN_RESPONSE_VERSION {
                ApiVersion(1)
            } else {
                ApiVersion(0)
            };

        let correlation_id = self.state.correlation_id.fetch_add(1, Ordering::SeqCst);

        let header = RequestHeader {
            request_api_key: R::API_KEY,
            request_api_version: request_version,
            correlation_id,
            client_id: Some(self.state.client_id.to_string()),
            tagged_fields: (request_header_version.0 >= 2).then(Default::default),
        };

        let mut payload = Cursor::new(Vec::new());
        header
            .write_versioned(&mut payload, request_header_version)
            .map_err(RequestError::from)?;
        body.write_versioned(&mut payload, request_version)
            .map_err(RequestError::from)?;
        let payload = payload.into_inner();

        let (tx, rx) = oneshot::channel();
        self.state.pending.lock().insert(
            correlation_id,
            PendingRequest {
                response_header_version,
                channel: tx,
            },
        );

        if let Err(err) = self.write_frame(&payload).await {
            self.state.pending.lock().remove(&correlation_id);
            let err = self.state.poison_with(err);
            return Err(RequestError::Poisoned(err));
        }

        let data = match tokio::time::timeout(self.state.request_timeout, rx).await {
            Ok(Ok(Ok(data))) => data,
            Ok(Ok(Err(err))) => return Err(RequestError::Poisoned(err)),
            Ok(Err(_)) => return Err(RequestError::Disconnected),
            Err(_) => {
                self.state.pending.lock().remove(&correlation_id);
                return Err(RequestError::Timeout(self.state.request_timeout));
            }
        };

        let mut cursor = Cursor::new(data);
        R::ResponseBody::read_versioned(&mut cursor, request_version).map_err(RequestError::from)
    }

    async fn write_frame(&self, payload: &[u8]) -> Result<(), RequestError> {
        let len = i32::try_from(payload.len()).map_err(|_| {
            RequestError::FrameTooLarge {
                size: payload.len(),
                limit: i32::MAX as usize,
            }
        })?;

        let mut writer = self.write_half.lock().await;
        writer.write_all(&len.to_be_bytes()).await?;
        writer.write_all(payload).await?;
        writer.flush().await?;
        Ok(())
    }
}

async fn read_loop<R>(mut read_half: R, state: Arc<SharedState>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        match read_one_frame(&mut read_half, state.max_message_size).await {
            Ok(frame) => {
                if let Err(err) = dispatch_frame(&state, frame) {
                    debug!(%err, "failed to dispatch response frame");
                    state.poison_with(err);
                    return;
                }
            }
            Err(err) => {
                error!(%err, "broker connection read loop terminated");
                state.poison_with(err);
                return;
            }
        }
    }
}

async fn read_one_frame<R>(read_half: &mut R, max_message_size: usize) -> Result<Vec<u8>, RequestError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    read_half.read_exact(&mut len_buf).await?;
    let len = i32::from_be_bytes(len_buf);
    let len = usize::try_from(len).map_err(|_| RequestError::FrameTooLarge {
        size: len as usize,
        limit: max_message_size,
    })?;

    let limit = max_message_size.min(MAX_FRAME_SIZE_HARD_LIMIT);
    if len > limit {
        return Err(RequestError::FrameTooLarge { size: len, limit });
    }

    let mut buf = vec![0u8; len];
    read_half.read_exact(&mut buf).await?;
    Ok(buf)
}

fn dispatch_frame(state: &SharedState, frame: Vec<u8>) -> Result<(), RequestError> {
    // the correlation ID lives in the first 4 bytes of every response header
    // regardless of flexible-version status, so peek it before we know which
    // pending request (and therefore which header version) it belongs to.
    if frame.len() < 4 {
        return Err(RequestError::ReadError(ReadError::Malformed(
            "response frame shorter than a correlation id".into(),
        )));
    }
    let correlation_id = i32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);

    let pending = state
        .pending
        .lock()
        .remove(&correlation_id)
        .ok_or_else(|| {
            RequestError::ReadError(ReadError::Malformed(
                format!("no pending request for correlation id {correlation_id}").into(),
            ))
        })?;

    let mut cursor = Cursor::new(frame);
    let header = ResponseHeader::read_versioned(&mut cursor, pending.response_header_version)
        .map_err(RequestError::from)?;
    debug_assert_eq!(header.correlation_id, correlation_id);

    let offset = cursor.position() as usize;
    let rest = cursor.into_inner().split_off(offset);
    let _ = pending.channel.send(Ok(rest));

    Ok(())
}
