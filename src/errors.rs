//! Error taxonomy for the dispatch core.
//!
//! Callers and tests match on the literal error text, so every sentinel
//! must render exactly as listed here. [`DispatchError::should_failover`]
//! decides whether an error moves the dispatcher to the next candidate
//! host/profile or is returned to the caller as-is.

use thiserror::Error;

/// Errors surfaced by the dispatch core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Generic lookup miss (profiles, cache items, event fields).
    #[error("NOT_FOUND")]
    NotFound,

    /// No routing profile matched the event.
    #[error("NOT_FOUND:PROFILE")]
    ProfileNotFound,

    /// No host matched the event, or the host registry has no such host.
    #[error("HOST_NOT_FOUND")]
    HostNotFound,

    /// Wrapper applied by the orchestrator around resolution failures.
    #[error("DISPATCHER_ERROR:{0}")]
    Dispatcher(String),

    /// A required field is absent from the request.
    #[error("MANDATORY_IE_MISSING: [{0}]")]
    MandatoryIeMissing(String),

    /// The resolved API key does not grant the called method.
    #[error("UNAUTHORIZED_API")]
    UnauthorizedApi,

    /// The API key has no backing attribute profile.
    #[error("UNKNOWN_API_KEY")]
    UnknownApiKey,

    /// The service method is not of the `Subsystem.Method` shape.
    #[error("UNSUPPORTED_SERVICE_METHOD")]
    UnsupportedServiceMethod,

    /// The remote connection dropped before a reply arrived.
    #[error("DISCONNECTED")]
    Disconnected,

    /// The remote host did not answer within its reply timeout.
    #[error("REPLY_TIMEOUT")]
    ReplyTimeout,

    /// The remote host refused the connection attempt.
    #[error("connection refused")]
    ConnectionRefused,

    /// A cached value could not be cast to the expected type.
    #[error("CAST_FAILED")]
    CastFailed,

    /// The call context was cancelled or its deadline passed.
    #[error("CANCELLED")]
    Cancelled,

    /// Internal failure in a collaborator.
    #[error("SERVER_ERROR")]
    ServerError,

    /// A strategy or option parameter is not representable as an integer.
    #[error("cannot convert field <{0}> to int")]
    InvalidFieldConversion(String),

    /// The profile declares a strategy this core does not implement.
    #[error("unsupported dispatch strategy: <{0}>")]
    UnsupportedStrategy(String),

    /// Application-level error propagated verbatim from a backend subsystem.
    #[error("{0}")]
    Backend(String),
}

impl DispatchError {
    /// Whether the dispatcher should try the next candidate instead of
    /// returning this error to the caller.
    ///
    /// Only transport-level failures qualify; application errors (including
    /// a backend `NOT_FOUND`) must reach the caller unchanged.
    pub fn should_failover(&self) -> bool {
        matches!(
            self,
            DispatchError::Disconnected
                | DispatchError::ReplyTimeout
                | DispatchError::ConnectionRefused
        )
    }

    /// Wrap a resolution failure the way the orchestrator surfaces it.
    pub fn dispatcher(err: &DispatchError) -> Self {
        DispatchError::Dispatcher(err.to_string())
    }
}
