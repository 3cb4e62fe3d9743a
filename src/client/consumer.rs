//! Group-coordinated consumption: join a [`super::consumer_group::ConsumerGroup`],
//! fetch each assigned partition through its own [`super::partition::PartitionClient`],
//! and hand records back as a single merged [`MessagesStream`].
//!
//! A [`Consumer`] owns a background supervisor task that multiplexes three
//! concerns which must never block each other: the heartbeat (so the broker
//! doesn't evict us while a long fetch poll is in flight), rebalance
//! recovery (rejoin the group, refresh committed offsets, rebuild the fetch
//! tasks), and autocommit. Each assigned partition gets its own fetch task on
//! a pool separate from the heartbeat so a slow broker can't starve it.
//!
//! `Consumer` and `MessagesStream` hold a cyclic relationship in spirit (the
//! stream needs to reach back into the consumer to commit offsets; the
//! consumer needs to know whether a stream is still alive before it allows
//! `close(force=false)`). We break the cycle the usual way: [`MessagesStream`]
//! holds a strong [`Arc<ConsumerState>`] plus a `Arc<()>` liveness marker, and
//! `Consumer` only holds a `Weak<()>` back-reference to that marker.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::consumer_group::{ConsumerGroup, CustomAssignor, GroupProtocol};
use crate::client::error::{Error, ProtocolError, Result};
use crate::client::partition::{OffsetAt, PartitionClient, UnknownTopicHandling};
use crate::client::Client;
use crate::protocol::messages::{OffsetFetchResponseTopic, PartitionAssignment, PartitionCommit, TopicCommit};
use crate::record::{Record, RecordAndOffset};
use crate::topic::Topic;

/// Where a newly started partition cursor should begin.
#[derive(Debug, Clone)]
pub enum StartOffset {
    /// Start at the log's earliest retained offset.
    Earliest,

    /// Start at the partition's current high watermark.
    Latest,

    /// Start at the group's last committed offset, falling back per `fallback` if there is
    /// none.
    Committed,

    /// Start at a caller-supplied offset, keyed by `(topic, partition)`. Every partition the
    /// group gets assigned must have an entry; a missing one is an error, not a silent fallback.
    Manual(BTreeMap<(String, i32), i64>),
}

/// What to do when [`StartOffset::Committed`] finds nothing committed, or a partition fetch
/// comes back `OFFSET_OUT_OF_RANGE` (the committed/cached offset has aged out of the log).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackOffset {
    /// Surface an error instead of guessing.
    Fail,
    Earliest,
    Latest,
}

/// Offset commit policy.
#[derive(Debug, Clone, Copy)]
pub enum Autocommit {
    /// The caller commits explicitly via [`Message::commit`] or [`Consumer::commit`].
    Disabled,

    /// Commit `offset + 1` as soon as a message is handed to the caller.
    Immediate,

    /// Commit the highest offset observed per partition on this cadence, and once more on
    /// [`Consumer::close`].
    Interval(Duration),
}

#[derive(Debug, Clone, Copy)]
struct FetchOpts {
    min_bytes: i32,
    max_bytes: i32,
    max_wait_ms: i32,
}

impl Default for FetchOpts {
    fn default() -> Self {
        Self {
            min_bytes: 1,
            max_bytes: 32 * 1024 * 1024,
            max_wait_ms: 500,
        }
    }
}

/// Reference-counted set of topics a group's streams care about.
///
/// A topic's count is the number of active streams tracking it; it is removed once the count
/// drops back to zero. Used so that two streams subscribing to the same topic only trigger one
/// rejoin.
#[derive(Debug, Default)]
pub(crate) struct TopicsMap {
    counts: BTreeMap<String, u32>,
}

impl TopicsMap {
    /// Returns `true` if this transitioned the topic from untracked to tracked (0 -> 1).
    pub(crate) fn track(&mut self, topic: &str) -> bool {
        match self.counts.get_mut(topic) {
            Some(count) => {
                *count += 1;
                false
            }
            None => {
                self.counts.insert(topic.to_string(), 1);
                true
            }
        }
    }

    /// Returns `true` if this transitioned the topic from tracked to untracked (1 -> 0).
    pub(crate) fn untrack(&mut self, topic: &str) -> bool {
        match self.counts.get_mut(topic) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.counts.remove(topic);
                true
            }
            None => false,
        }
    }

    pub(crate) fn track_all<'a>(&mut self, topics: impl IntoIterator<Item = &'a str>) -> bool {
        topics.into_iter().fold(false, |changed, t| self.track(t) || changed)
    }

    pub(crate) fn untrack_all<'a>(&mut self, topics: impl IntoIterator<Item = &'a str>) -> bool {
        topics.into_iter().fold(false, |changed, t| self.untrack(t) || changed)
    }

    pub(crate) fn current(&self) -> Vec<String> {
        self.counts.keys().cloned().collect()
    }
}

/// One delivered record, still attached to the consumer it came from so it can be committed
/// individually under [`Autocommit::Disabled`].
#[derive(Debug)]
pub struct Message {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub high_watermark: i64,
    pub record: Record,

    state: Weak<ConsumerState>,
}

impl Message {
    /// Commits `offset + 1` for this message's partition.
    pub async fn commit(&self) -> Result<()> {
        let state = self
            .state
            .upgrade()
            .ok_or_else(|| Error::UserError("consumer has already been closed".to_string()))?;

        commit_one(&state, &self.topic, self.partition, self.offset + 1).await
    }
}

struct ConsumerState {
    client: Arc<Client>,
    group_id: String,
    group_protocol: GroupProtocol,
    custom_assignor: Option<CustomAssignor>,
    group: Mutex<Arc<ConsumerGroup>>,
    topics_map: Mutex<TopicsMap>,

    /// Held for reading by every in-flight fetch; held for writing while a rejoin is refreshing
    /// committed offsets and rebuilding assignments, so fetches never race a rejoin.
    offsets_lock: RwLock<()>,

    highest_offsets: Mutex<BTreeMap<(String, i32), i64>>,

    shutdown: Arc<Notify>,
    rejoin: Arc<Notify>,
    rejoin_requested: AtomicBool,
    stream_alive: Weak<()>,

    heartbeat_interval: Duration,
}

/// Builder for a [`Consumer`] / [`MessagesStream`] pair joined to one consumer group.
pub struct ConsumerBuilder {
    client: Arc<Client>,
    group_id: String,
    group_protocol: GroupProtocol,
    custom_assignor: Option<CustomAssignor>,
    topics: Vec<Topic>,
    start_offset: StartOffset,
    fallback_offset: FallbackOffset,
    autocommit: Autocommit,
    fetch_opts: FetchOpts,
    queue_size: usize,
    heartbeat_interval: Duration,
}

impl ConsumerBuilder {
    pub fn new(client: Arc<Client>, group_id: String, topics: Vec<Topic>) -> Self {
        Self {
            client,
            group_id,
            group_protocol: GroupProtocol::default(),
            custom_assignor: None,
            topics,
            start_offset: StartOffset::Committed,
            fallback_offset: FallbackOffset::Earliest,
            autocommit: Autocommit::Disabled,
            fetch_opts: FetchOpts::default(),
            queue_size: 128,
            heartbeat_interval: Duration::from_secs(3),
        }
    }

    /// Selects which consumer group membership protocol to speak with the
    /// coordinator. Defaults to [`GroupProtocol::Classic`].
    pub fn with_group_protocol(mut self, group_protocol: GroupProtocol) -> Self {
        self.group_protocol = group_protocol;
        self
    }

    /// Offers a custom partition-assignment strategy to the coordinator
    /// alongside the built-in `range`/`roundrobin` ones. Only takes effect
    /// under [`GroupProtocol::Classic`].
    pub fn with_custom_assignor(mut self, custom_assignor: CustomAssignor) -> Self {
        self.custom_assignor = Some(custom_assignor);
        self
    }

    pub fn with_start_offset(mut self, start_offset: StartOffset) -> Self {
        self.start_offset = start_offset;
        self
    }

    pub fn with_fallback_offset(mut self, fallback_offset: FallbackOffset) -> Self {
        self.fallback_offset = fallback_offset;
        self
    }

    pub fn with_autocommit(mut self, autocommit: Autocommit) -> Self {
        self.autocommit = autocommit;
        self
    }

    pub fn with_bytes(mut self, min_bytes: i32, max_bytes: i32) -> Self {
        self.fetch_opts.min_bytes = min_bytes;
        self.fetch_opts.max_bytes = max_bytes;
        self
    }

    pub fn with_max_wait_ms(mut self, max_wait_ms: i32) -> Self {
        self.fetch_opts.max_wait_ms = max_wait_ms;
        self
    }

    /// Bounds how many undelivered messages may sit in [`MessagesStream`]'s buffer; this is the
    /// backpressure knob between the fetch tasks and whoever is draining the stream.
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn with_heartbeat_interval(mut self, heartbeat_interval: Duration) -> Self {
        self.heartbeat_interval = heartbeat_interval;
        self
    }

    pub async fn build(self) -> Result<(Consumer, MessagesStream)> {
        let group = self
            .client
            .consumer_group_with_assignor(
                self.group_id.clone(),
                &self.topics,
                self.group_protocol,
                self.custom_assignor.clone(),
            )
            .await?;

        let mut topics_map = TopicsMap::default();
        topics_map.track_all(self.topics.iter().map(|t| t.name.as_str()));

        let stream_marker = Arc::new(());
        let (tx, rx) = mpsc::channel(self.queue_size);

        let state = Arc::new(ConsumerState {
            client: Arc::clone(&self.client),
            group_id: self.group_id,
            group_protocol: self.group_protocol,
            custom_assignor: self.custom_assignor,
            group: Mutex::new(Arc::new(group)),
            topics_map: Mutex::new(topics_map),
            offsets_lock: RwLock::new(()),
            highest_offsets: Mutex::new(BTreeMap::new()),
            shutdown: Arc::new(Notify::new()),
            rejoin: Arc::new(Notify::new()),
            rejoin_requested: AtomicBool::new(false),
            stream_alive: Arc::downgrade(&stream_marker),
            heartbeat_interval: self.heartbeat_interval,
        });

        let supervisor = tokio::spawn(supervisor_loop(
            Arc::clone(&state),
            self.topics,
            self.start_offset,
            self.fallback_offset,
            self.autocommit,
            self.fetch_opts,
            tx,
        ));

        Ok((
            Consumer {
                state: Arc::clone(&state),
                supervisor: Mutex::new(Some(supervisor)),
            },
            MessagesStream {
                receiver: rx,
                _marker: stream_marker,
            },
        ))
    }
}

/// Handle for group membership: heartbeats, commits, and topic (un)subscription all go through
/// this while [`MessagesStream`] delivers the records.
pub struct Consumer {
    state: Arc<ConsumerState>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("group_id", &self.state.group_id)
            .finish_non_exhaustive()
    }
}

impl Consumer {
    /// Commits caller-supplied offsets directly, bypassing autocommit.
    pub async fn commit(&self, topics: Vec<TopicCommit>) -> Result<()> {
        let group = self.state.group.lock().await.clone();
        group.commit(topics).await
    }

    pub async fn offsets(&self) -> Result<Vec<OffsetFetchResponseTopic>> {
        let group = self.state.group.lock().await.clone();
        group.offsets().await
    }

    /// Starts tracking additional topics; if any of them weren't already tracked by another
    /// stream, triggers a group rejoin to pick up their partitions.
    pub async fn track_topics(&self, topics: impl IntoIterator<Item = String>) {
        let names: Vec<String> = topics.into_iter().collect();
        let changed = {
            let mut map = self.state.topics_map.lock().await;
            map.track_all(names.iter().map(String::as_str))
        };

        if changed {
            self.state.request_rejoin();
        }
    }

    /// Stops tracking topics; if any drop to a zero count, triggers a rejoin so the group stops
    /// holding partitions for them.
    pub async fn untrack_topics(&self, topics: impl IntoIterator<Item = String>) {
        let names: Vec<String> = topics.into_iter().collect();
        let changed = {
            let mut map = self.state.topics_map.lock().await;
            map.untrack_all(names.iter().map(String::as_str))
        };

        if changed {
            self.state.request_rejoin();
        }
    }

    /// Leaves the group and stops all background tasks.
    ///
    /// Fails with a [`Error::UserError`] if the paired [`MessagesStream`] is still alive and
    /// `force` is `false`; `force = true` shortcut-closes without waiting for a final autocommit.
    pub async fn close(&self, force: bool) -> Result<()> {
        if !force && self.state.stream_alive.strong_count() > 0 {
            return Err(Error::UserError(
                "Cannot leave group while consuming messages.".to_string(),
            ));
        }

        self.state.shutdown.notify_waiters();

        if let Some(handle) = self.supervisor.lock().await.take() {
            if force {
                handle.abort();
            } else {
                let _ = handle.await;
            }
        }

        let group = self.state.group.lock().await.clone();
        group.leave().await
    }
}

impl ConsumerState {
    fn request_rejoin(&self) {
        self.rejoin_requested.store(true, Ordering::SeqCst);
        self.rejoin.notify_one();
    }
}

/// The lazy, potentially infinite sequence of [`Message`]s coming out of one [`Consumer`].
pub struct MessagesStream {
    receiver: mpsc::Receiver<Result<Message>>,
    _marker: Arc<()>,
}

impl futures::Stream for MessagesStream {
    type Item = Result<Message>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

async fn commit_one(state: &ConsumerState, topic: &str, partition: i32, offset: i64) -> Result<()> {
    let group = state.group.lock().await.clone();
    group
        .commit(vec![TopicCommit {
            name: topic.to_string(),
            partitions: vec![PartitionCommit {
                partition_index: partition,
                committed_offset: offset,
                commit_timestamp: -1,
                committed_leader_epoch: -1,
                committed_metadata: None,
                tagged_fields: None,
            }],
            tagged_fields: None,
        }])
        .await
}

async fn commit_highest(state: &ConsumerState) -> Result<()> {
    let snapshot: Vec<_> = {
        let highest = state.highest_offsets.lock().await;
        highest.iter().map(|(k, v)| (k.clone(), *v)).collect()
    };

    if snapshot.is_empty() {
        return Ok(());
    }

    let mut by_topic: BTreeMap<String, Vec<PartitionCommit>> = BTreeMap::new();
    for ((topic, partition), offset) in snapshot {
        by_topic.entry(topic).or_default().push(PartitionCommit {
            partition_index: partition,
            committed_offset: offset,
            commit_timestamp: -1,
            committed_leader_epoch: -1,
            committed_metadata: None,
            tagged_fields: None,
        });
    }

    let topics = by_topic
        .into_iter()
        .map(|(name, partitions)| TopicCommit {
            name,
            partitions,
            tagged_fields: None,
        })
        .collect();

    let group = state.group.lock().await.clone();
    group.commit(topics).await
}

/// Resolves the starting offset for one partition and spawns its fetch task.
async fn spawn_one_fetcher(
    state: &Arc<ConsumerState>,
    topic: &str,
    partition: i32,
    start_offset: &StartOffset,
    fallback_offset: FallbackOffset,
    autocommit: Autocommit,
    fetch_opts: FetchOpts,
    committed: Option<&[OffsetFetchResponseTopic]>,
    tx: &mpsc::Sender<Result<Message>>,
) -> Result<JoinHandle<()>> {
    let pc = state
        .client
        .partition_client(topic.to_string(), partition, UnknownTopicHandling::Retry)
        .await?;

    let offset = match start_offset {
        StartOffset::Earliest => pc.get_offset(OffsetAt::Earliest).await?,
        StartOffset::Latest => pc.get_offset(OffsetAt::Latest).await?,
        StartOffset::Committed => {
            let committed_offset = committed.and_then(|topics| {
                topics.iter().find(|t| t.name == topic).and_then(|t| {
                    t.partitions
                        .iter()
                        .find(|p| p.partition_index == partition)
                        .map(|p| p.committed_offset)
                })
            });

            match committed_offset {
                Some(o) if o >= 0 => o,
                _ => resolve_fallback(&pc, fallback_offset, topic, partition, "no committed offset").await?,
            }
        }
        StartOffset::Manual(offsets) => {
            *offsets
                .get(&(topic.to_string(), partition))
                .ok_or_else(|| {
                    Error::UserError(format!(
                        "no manual start offset supplied for topic '{topic}' partition {partition}"
                    ))
                })?
        }
    };

    let state = Arc::clone(state);
    let tx = tx.clone();

    Ok(tokio::spawn(async move {
        run_fetcher(state, pc, offset, fetch_opts, fallback_offset, autocommit, tx).await;
    }))
}

async fn resolve_fallback(
    pc: &PartitionClient,
    fallback_offset: FallbackOffset,
    topic: &str,
    partition: i32,
    reason: &str,
) -> Result<i64> {
    match fallback_offset {
        FallbackOffset::Fail => Err(Error::UserError(format!(
            "{reason} for topic '{topic}' partition {partition} and fallback policy is Fail"
        ))),
        FallbackOffset::Earliest => pc.get_offset(OffsetAt::Earliest).await,
        FallbackOffset::Latest => pc.get_offset(OffsetAt::Latest).await,
    }
}

/// Joins the group (or a fresh membership after a rejoin), resolves every assigned partition's
/// starting offset, and spawns one fetch task per partition.
async fn spawn_fetchers(
    state: &Arc<ConsumerState>,
    group: &ConsumerGroup,
    start_offset: &StartOffset,
    fallback_offset: FallbackOffset,
    autocommit: Autocommit,
    fetch_opts: FetchOpts,
    tx: &mpsc::Sender<Result<Message>>,
) -> Result<Vec<JoinHandle<()>>> {
    let committed = match start_offset {
        StartOffset::Committed => Some(group.offsets().await?),
        _ => None,
    };

    let mut handles = Vec::new();
    for PartitionAssignment { topic, partitions } in group.assignment() {
        for &partition in partitions {
            let handle = spawn_one_fetcher(
                state,
                topic,
                partition,
                start_offset,
                fallback_offset,
                autocommit,
                fetch_opts,
                committed.as_deref(),
                tx,
            )
            .await?;
            handles.push(handle);
        }
    }

    Ok(handles)
}

async fn run_fetcher(
    state: Arc<ConsumerState>,
    pc: PartitionClient,
    mut offset: i64,
    fetch_opts: FetchOpts,
    fallback_offset: FallbackOffset,
    autocommit: Autocommit,
    tx: mpsc::Sender<Result<Message>>,
) {
    let topic = pc.topic().to_string();
    let partition = pc.partition();
    let message_state = Arc::downgrade(&state);
    let mut reseeked = false;

    loop {
        let fetch_result = {
            let _guard = state.offsets_lock.read().await;
            pc.fetch_records(
                offset,
                fetch_opts.min_bytes..fetch_opts.max_bytes,
                fetch_opts.max_wait_ms,
            )
            .await
        };

        match fetch_result {
            Ok((records, high_watermark)) => {
                reseeked = false;

                for RecordAndOffset { record, offset: record_offset } in records {
                    offset = record_offset + 1;

                    match autocommit {
                        Autocommit::Immediate => {
                            if let Err(err) = commit_one(&state, &topic, partition, offset).await {
                                warn!(%err, topic, partition, "autocommit failed");
                            }
                        }
                        Autocommit::Interval(_) => {
                            state
                                .highest_offsets
                                .lock()
                                .await
                                .insert((topic.clone(), partition), offset);
                        }
                        Autocommit::Disabled => {}
                    }

                    let message = Message {
                        topic: topic.clone(),
                        partition,
                        offset: record_offset,
                        high_watermark,
                        record,
                        state: Weak::clone(&message_state),
                    };

                    if tx.send(Ok(message)).await.is_err() {
                        debug!(topic, partition, "receiver dropped, stopping fetch task");
                        return;
                    }
                }
            }
            Err(Error::ServerError { protocol_error, .. })
                if protocol_error == ProtocolError::OffsetOutOfRange && !reseeked =>
            {
                reseeked = true;

                match resolve_fallback(&pc, fallback_offset, &topic, partition, "offset out of range").await {
                    Ok(new_offset) => offset = new_offset,
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                }
            }
            Err(err) => {
                // `PartitionClient::fetch_records` already retries transient
                // failures (broken connections, stale-leader metadata
                // refreshes) up to its own backoff deadline, so whatever
                // reaches here either exhausted that budget or was fatal to
                // begin with. Keep looping only for the former; a fatal
                // error (bad credentials, unsupported API, ...) will just
                // fail again identically on every subsequent attempt.
                let retry = err.can_retry();

                if tx.send(Err(err)).await.is_err() {
                    return;
                }

                if !retry {
                    debug!(topic, partition, "fetch task stopping after fatal error");
                    return;
                }

                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }
}

async fn supervisor_loop(
    state: Arc<ConsumerState>,
    mut topics: Vec<Topic>,
    start_offset: StartOffset,
    fallback_offset: FallbackOffset,
    autocommit: Autocommit,
    fetch_opts: FetchOpts,
    tx: mpsc::Sender<Result<Message>>,
) {
    let mut fetch_tasks = {
        let group = state.group.lock().await.clone();
        match spawn_fetchers(&state, &group, &start_offset, fallback_offset, autocommit, fetch_opts, &tx).await {
            Ok(tasks) => tasks,
            Err(err) => {
                let _ = tx.send(Err(err)).await;
                return;
            }
        }
    };

    let mut heartbeat_ticker = tokio::time::interval(state.heartbeat_interval);
    let mut autocommit_ticker = match autocommit {
        Autocommit::Interval(interval) => Some(tokio::time::interval(interval)),
        _ => None,
    };

    loop {
        tokio::select! {
            _ = state.shutdown.notified() => {
                for task in fetch_tasks.drain(..) {
                    task.abort();
                }
                break;
            }

            _ = heartbeat_ticker.tick() => {
                let group = state.group.lock().await.clone();
                match group.heartbeat().await {
                    Ok(()) => {}
                    Err(Error::ServerError { protocol_error, .. })
                        if protocol_error == ProtocolError::RebalanceInProgress
                            || protocol_error.cancels_membership() =>
                    {
                        info!(reason = %protocol_error, "rejoining consumer group");
                        if !rejoin(&state, &mut topics, &start_offset, fallback_offset, autocommit, fetch_opts, &tx, &mut fetch_tasks).await {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(%err, "heartbeat failed, will retry next tick");
                    }
                }
            }

            _ = state.rejoin.notified() => {
                if state.rejoin_requested.swap(false, Ordering::SeqCst) {
                    topics = match state.client.list_topics().await {
                        Ok(all) => {
                            let tracked = state.topics_map.lock().await.current();
                            all.into_iter().filter(|t| tracked.contains(&t.name)).collect()
                        }
                        Err(err) => {
                            warn!(%err, "failed to list topics for subscription change, keeping current subscription");
                            continue;
                        }
                    };

                    if !rejoin(&state, &mut topics, &start_offset, fallback_offset, autocommit, fetch_opts, &tx, &mut fetch_tasks).await {
                        break;
                    }
                }
            }

            _ = maybe_tick(&mut autocommit_ticker) => {
                match commit_highest(&state).await {
                    Ok(()) => {}
                    Err(Error::ServerError { protocol_error, .. }) if protocol_error.cancels_membership() => {
                        info!(reason = %protocol_error, "rejoining consumer group after commit fencing");
                        if !rejoin(&state, &mut topics, &start_offset, fallback_offset, autocommit, fetch_opts, &tx, &mut fetch_tasks).await {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(%err, "periodic autocommit failed");
                    }
                }
            }
        }
    }

    if !matches!(autocommit, Autocommit::Disabled) {
        if let Err(err) = commit_highest(&state).await {
            warn!(%err, "final autocommit on close failed");
        }
    }
}

/// Rejoins the group under the current (possibly just-changed) topic set and respawns fetch
/// tasks for the new assignment. Returns `false` if the supervisor should stop.
async fn rejoin(
    state: &Arc<ConsumerState>,
    topics: &mut Vec<Topic>,
    start_offset: &StartOffset,
    fallback_offset: FallbackOffset,
    autocommit: Autocommit,
    fetch_opts: FetchOpts,
    tx: &mpsc::Sender<Result<Message>>,
    fetch_tasks: &mut Vec<JoinHandle<()>>,
) -> bool {
    for task in fetch_tasks.drain(..) {
        task.abort();
    }

    let _write_guard = state.offsets_lock.write().await;

    let joined = tokio::select! {
        result = state.client.consumer_group_with_assignor(
            state.group_id.clone(),
            topics,
            state.group_protocol,
            state.custom_assignor.clone(),
        ) => Some(result),
        _ = state.shutdown.notified() => None,
    };

    let new_group = match joined {
        Some(Ok(group)) => group,
        Some(Err(err)) => {
            let _ = tx.send(Err(err)).await;
            return false;
        }
        // `close()` raced the rejoin: the join chain resolves to nothing, no error.
        None => return false,
    };

    *state.group.lock().await = Arc::new(new_group);
    let group = state.group.lock().await.clone();

    // Held until every new fetch task has been spawned: nothing is allowed to issue a fetch
    // against the old assignment (or the not-yet-ready new one) while this is true.
    match spawn_fetchers(state, &group, start_offset, fallback_offset, autocommit, fetch_opts, tx).await {
        Ok(tasks) => {
            *fetch_tasks = tasks;
            true
        }
        Err(err) => {
            let _ = tx.send(Err(err)).await;
            false
        }
    }
}

async fn maybe_tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_map_counts_and_transitions() {
        let mut map = TopicsMap::default();

        assert!(map.track("a"));
        assert!(!map.track("a"));
        assert_eq!(map.current(), vec!["a".to_string()]);

        assert!(!map.untrack("a"));
        assert_eq!(map.current(), vec!["a".to_string()]);

        assert!(map.untrack("a"));
        assert!(map.current().is_empty());
    }

    #[test]
    fn topics_map_untrack_unknown_topic_is_a_noop() {
        let mut map = TopicsMap::default();
        assert!(!map.untrack("never-tracked"));
    }

    #[test]
    fn topics_map_track_all_reports_change_only_once() {
        let mut map = TopicsMap::default();
        assert!(map.track_all(["a", "b"]));
        assert!(!map.track_all(["a", "b"]));
        assert!(map.track_all(["a", "b", "c"]));
    }
}
