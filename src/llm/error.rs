use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a completion backend for a single attempt.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl BackendError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::Transport(_)
                | BackendError::RateLimited(_)
                | BackendError::Server(_)
                | BackendError::MalformedResponse(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("remote call failed after {attempts} attempt(s): {source}")]
    RemoteCallFailed {
        attempts: u32,
        #[source]
        source: BackendError,
    },

    #[error("blocked by safety check: {0}")]
    SafetyBlocked(String),

    #[error("malformed cache file {}: {reason}", path.display())]
    MalformedCacheFile { path: PathBuf, reason: String },

    #[error("cache file I/O error: {0}")]
    CacheIo(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(BackendError::Transport("reset".into()).is_retryable());
        assert!(BackendError::RateLimited("slow down".into()).is_retryable());
        assert!(BackendError::Server("502".into()).is_retryable());
        assert!(BackendError::MalformedResponse("no choices".into()).is_retryable());
        assert!(!BackendError::Authentication("bad key".into()).is_retryable());
        assert!(!BackendError::InvalidRequest("bad param".into()).is_retryable());
    }

    #[test]
    fn test_remote_call_failed_message() {
        let err = ClientError::RemoteCallFailed {
            attempts: 3,
            source: BackendError::Server("overloaded".into()),
        };
        assert_eq!(
            err.to_string(),
            "remote call failed after 3 attempt(s): server error: overloaded"
        );
    }
}
