//! Error taxonomy for the device runtime.
//!
//! None of these types leak transport- or parser-specific error types past
//! the adapter boundary that produced them; callers only ever see the
//! variants defined here.

use thiserror::Error;

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration source could not be read or parsed.
    #[error("failed to load configuration: {0}")]
    Source(#[from] config::ConfigError),
}

/// The caller violated a documented precondition.
///
/// Validation errors are never retried; they are returned to the caller
/// as-is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `MAX_LATENCY` was set without a `GEOLOCATION`.
    #[error("GEOLOCATION is required whenever MAX_LATENCY is set")]
    MissingGeolocation,

    /// `updateRequirements` was called with a value equal to the active one.
    #[error("requirements are unchanged from the active set")]
    DuplicateRequirements,

    /// `init` was called while the supervisor is already running.
    #[error("supervisor is already running")]
    AlreadyRunning,

    /// `updateRequirements`/`stop` was called while the supervisor is not
    /// running.
    #[error("supervisor is not running")]
    NotRunning,

    /// `call`/`callAsync` referenced a `LocalFunctionId` that was never
    /// registered (or belongs to a different runtime instance).
    #[error("function id was not registered with this runtime")]
    UnknownFunction,
}

/// An outbound HTTP request failed, or the remote reported a server error.
///
/// Receiving a [`TransportError`] forces the adapter that produced it to
/// set its connection flag to `false`; the state machine reacts to that
/// through its guards.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP client could not complete the request (DNS, TLS, connect,
    /// timeout, ...).
    #[error("transport failure calling {endpoint}: {source}")]
    Request {
        /// The endpoint that was being called.
        endpoint: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The remote responded with a status code outside the documented
    /// success set.
    #[error("unexpected status {status} from {endpoint}: {body}")]
    Status {
        /// The endpoint that was called.
        endpoint: String,
        /// The HTTP status code received.
        status: u16,
        /// A truncated response body, for diagnostics.
        body: String,
    },

    /// Authentication was rejected (401/403). Treated as a connection-loss
    /// transport error so the supervisor re-authenticates.
    #[error("authentication rejected by {endpoint}")]
    Unauthorized {
        /// The endpoint that rejected the credentials.
        endpoint: String,
    },

    /// The response body could not be decoded into the expected shape.
    #[error("malformed response from {endpoint}: {source}")]
    Decode {
        /// The endpoint whose response could not be decoded.
        endpoint: String,
        /// The underlying decode error.
        #[source]
        source: reqwest::Error,
    },
}

/// The call queue was at capacity; nothing was enqueued.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("call queue is at capacity")]
pub struct CapacityError;

/// Error surfaced by the Cognit Frontend Adapter's `register_or_update`,
/// which validates requirements locally before issuing a request.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// See [`ValidationError`].
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// See [`TransportError`].
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Top-level error returned by the [`crate::DeviceRuntime`] facade.
#[derive(Debug, Error)]
pub enum CognitError {
    /// See [`ConfigError`].
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// See [`ValidationError`].
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// See [`CapacityError`].
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// See [`TransportError`].
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<AdapterError> for CognitError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Validation(e) => Self::Validation(e),
            AdapterError::Transport(e) => Self::Transport(e),
        }
    }
}
