//! The top-level error type returned by every sub-client.
//!
//! Low-level errors (codec, transport, retry) are wrapped with `#[from]` and
//! re-exported here exactly as they bubble up through [`crate::connection`]
//! and [`crate::messenger`]. [`Error::ServerError`] additionally carries a
//! [`RequestContext`] identifying which named resource (topic or group) the
//! failing request targeted, since a single broker error code can originate
//! from several call sites.

use std::fmt;

use thiserror::Error;

use crate::backoff::BackoffError;
use crate::protocol::api_key::ApiKey;
pub use crate::protocol::error::Error as ProtocolError;
use crate::validation::ExactlyOneError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Names the resource a request was acting on, for diagnostics attached to
/// [`Error::ServerError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestContext {
    Topic(String),
    Group(String),
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topic(name) => write!(f, "topic '{name}'"),
            Self::Group(name) => write!(f, "group '{name}'"),
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Transport-level failure not already wrapped by [`Self::Connection`],
    /// e.g. DNS resolution of a bootstrap broker.
    #[error("network error: {0}")]
    NetworkError(#[from] std::io::Error),

    /// A deadline (request timeout or backoff budget) was exceeded.
    #[error("timed out: {0}")]
    TimeoutError(String),

    /// SASL handshake, credential provider, or token validation failed.
    #[error("authentication error: {0}")]
    AuthenticationError(String),

    /// Broker connection setup or framing failed.
    #[error("broker connection error: {0}")]
    Connection(crate::connection::Error),

    /// A request was sent but the response could not be correlated back to
    /// it, or the connection that was carrying it died.
    #[error("request error: {0}")]
    Request(crate::messenger::RequestError),

    /// The broker accepted and answered the request, but the response itself
    /// carries a non-zero error code.
    #[error(
        "server error {protocol_error} processing {request}{}",
        error_message
            .as_deref()
            .map(|m| format!(": {m}"))
            .unwrap_or_default()
    )]
    ServerError {
        protocol_error: ProtocolError,
        error_message: Option<String>,
        request: RequestContext,
        /// Debug rendering of the offending response, when available.
        response: Option<String>,
        /// Set when the error was synthesized locally (e.g. a missing
        /// per-partition entry) rather than reported by the broker.
        is_virtual: bool,
    },

    /// The negotiated API version range for this broker does not include an
    /// API this client needs, or the broker returned an unknown API key.
    #[error("API {api_key:?} is not supported by this broker")]
    UnsupportedApiError { api_key: ApiKey },

    /// Invalid arguments or state-machine misuse, e.g. leaving a group while
    /// still consuming.
    #[error("invalid usage: {0}")]
    UserError(String),

    /// The response was well-formed but did not contain what the caller
    /// needed (missing entry, wrong count, ...).
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Several independent attempts failed, e.g. every bootstrap broker.
    #[error("{message}")]
    MultipleErrors { message: String, errors: Vec<Error> },

    /// The retry loop exhausted its backoff budget.
    #[error("giving up: {0}")]
    RetryFailed(#[from] BackoffError),
}

impl From<crate::connection::Error> for Error {
    fn from(err: crate::connection::Error) -> Self {
        match err {
            crate::connection::Error::NoBrokerAvailable { errors } => Self::multiple(
                "failed to connect to any bootstrap broker",
                errors.into_iter().map(Self::from).collect(),
            ),
            other => Self::Connection(other),
        }
    }
}

impl From<crate::messenger::RequestError> for Error {
    fn from(err: crate::messenger::RequestError) -> Self {
        match err {
            crate::messenger::RequestError::Timeout(d) => {
                Self::TimeoutError(format!("no response within {d:?}"))
            }
            other => Self::Request(other),
        }
    }
}

impl Error {
    pub(crate) fn exactly_one_topic(err: ExactlyOneError) -> Self {
        Self::InvalidResponse(format!("expected response to cover exactly one topic: {err}"))
    }

    pub(crate) fn exactly_one_group(err: ExactlyOneError) -> Self {
        Self::InvalidResponse(format!("expected response to cover exactly one group: {err}"))
    }

    pub(crate) fn multiple(message: impl Into<String>, errors: Vec<Error>) -> Self {
        Self::MultipleErrors {
            message: message.into(),
            errors,
        }
    }

    /// Whether the failing operation might succeed if retried unchanged.
    ///
    /// Connection-layer failures and timeouts are always worth a retry;
    /// broker error codes defer to their own table
    /// ([`ProtocolError::can_retry`]). Everything else — bad arguments,
    /// unsupported APIs, responses that don't parse into what was asked for
    /// — is fatal.
    pub fn can_retry(&self) -> bool {
        match self {
            Self::NetworkError(_) | Self::TimeoutError(_) | Self::Connection(_) => true,
            Self::Request(_) => true,
            Self::ServerError { protocol_error, .. } => protocol_error.can_retry(),
            Self::AuthenticationError(_)
            | Self::UnsupportedApiError { .. }
            | Self::UserError(_)
            | Self::InvalidResponse(_)
            | Self::MultipleErrors { .. }
            | Self::RetryFailed(_) => false,
        }
    }
}
