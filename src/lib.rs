//! A native, async Kafka client.
//!
//! [`protocol`] implements the wire format; [`messenger`] multiplexes
//! request/response frames over one broker connection; [`connection`] pools
//! those connections and tracks cluster topology; [`client`] builds on top
//! of the pool to offer [`client::Client`] (cluster-wide operations),
//! [`client::partition::PartitionClient`] (per-partition produce/fetch),
//! [`client::producer`] (batched, optionally idempotent/transactional
//! writes), and [`client::consumer_group::ConsumerGroup`] /
//! [`client::consumer::MessagesStream`] (group membership and
//! partition-balanced consumption).
//!
//! Start with [`ClientBuilder`].

pub mod backoff;
mod build_info;
pub mod client;
pub mod connection;
mod messenger;
pub mod protocol;
pub mod record;
pub mod topic;
mod throttle;
mod validation;

pub use backoff::BackoffConfig;
pub use client::{Client, ClientBuilder};
pub use messenger::RequestError;
