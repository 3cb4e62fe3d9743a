//! Identifies this client to brokers in request headers and `ApiVersions`.

/// Default `client_id` sent on every request when [`ClientBuilder::client_id`]
/// is not set.
///
/// [`ClientBuilder::client_id`]: crate::client::ClientBuilder::client_id
pub const DEFAULT_CLIENT_ID: &str = concat!("rskafka-core-", env!("CARGO_PKG_VERSION"));
