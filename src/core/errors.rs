use thiserror::Error;

/// Error taxonomy for the analysis engine (spec §7).
///
/// Only `InvalidInput` and `DeadlineExceeded` are meant to reach a caller
/// directly; every other variant is recovered locally (retry, backoff,
/// downgraded to an empty detector result) before it can propagate out of
/// a detector or the RPC fabric.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("transient RPC failure: {0}")]
    TransientRpc(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("all endpoints failed")]
    AllEndpointsFailed,

    #[error("analysis deadline exceeded")]
    DeadlineExceeded,

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Whether this error class is safe to retry against a fresh endpoint.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::TransientRpc(_) | EngineError::RateLimited(_)
        )
    }
}
