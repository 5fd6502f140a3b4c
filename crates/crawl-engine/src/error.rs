//! Engine error taxonomy.
//!
//! `EngineError` is the closed set of outcomes named in the spec's error
//! handling design (§7): `NoTasks`, `RetryLater`, `InvalidStatus`,
//! `InvalidTaskFormat`, `InvalidPageData`, `PolicyDenied`,
//! `TokenBucketDenied`, `ContextCanceled`, plus the three "internal
//! collaborator failed"
//! variants (`InternalBroker`, `InternalCache`, `InternalDb`). Every
//! variant classifies into an `ErrorCategory` (Transient / Permanent /
//! RateLimited) which is what the worker loop's retry-vs-drop decision
//! actually dispatches on.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no tasks available")]
    NoTasks,

    #[error("retry later: {0}")]
    RetryLater(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("invalid task format: {0}")]
    InvalidTaskFormat(String),

    #[error("invalid page data: {0}")]
    InvalidPageData(String),

    #[error("denied by politeness policy for host {0}")]
    PolicyDenied(String),

    #[error("token bucket denied a request for host {0}")]
    TokenBucketDenied(String),

    #[error("context canceled")]
    ContextCanceled,

    #[error("broker error: {0}")]
    InternalBroker(String),

    #[error("cache error: {0}")]
    InternalCache(String),

    #[error("metadata store error: {0}")]
    InternalDb(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Redis(e) if e.is_connection_dropped() || e.is_connection_refusal())
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Redis(e) => e.is_timeout(),
            Self::RetryLater(_) => true,
            _ => false,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NoTasks => ErrorCategory::Transient,
            Self::RetryLater(_) => ErrorCategory::RateLimited,
            Self::InvalidStatus(_) => ErrorCategory::Permanent,
            Self::InvalidTaskFormat(_) => ErrorCategory::Permanent,
            Self::InvalidPageData(_) => ErrorCategory::Permanent,
            Self::PolicyDenied(_) => ErrorCategory::Permanent,
            Self::TokenBucketDenied(_) => ErrorCategory::RateLimited,
            Self::ContextCanceled => ErrorCategory::Permanent,
            Self::InternalBroker(_) | Self::InternalCache(_) | Self::InternalDb(_) => {
                ErrorCategory::Transient
            }
            Self::Redis(e) => {
                let msg = e.to_string().to_lowercase();
                if msg.contains("busy") || msg.contains("loading") {
                    ErrorCategory::RateLimited
                } else {
                    ErrorCategory::Transient
                }
            }
            Self::Serialization(_) => ErrorCategory::Permanent,
        }
    }
}

/// Classification driving the retry-vs-drop decision in the worker loop
/// (component G) and the per-topic error recovery table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transient,
    Permanent,
    RateLimited,
}

impl ErrorCategory {
    /// Whether a task experiencing this category of error should ever be
    /// rescheduled. `Permanent` errors are dropped (or, for `crawl_page`,
    /// simply not re-emitted) rather than retried.
    pub fn should_retry(self) -> bool {
        !matches!(self, ErrorCategory::Permanent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_errors_are_never_retried() {
        assert!(!ErrorCategory::Permanent.should_retry());
        assert!(ErrorCategory::Transient.should_retry());
        assert!(ErrorCategory::RateLimited.should_retry());
    }

    #[test]
    fn invalid_task_format_is_permanent() {
        let err = EngineError::InvalidTaskFormat("empty url".into());
        assert_eq!(err.category(), ErrorCategory::Permanent);
    }

    #[test]
    fn policy_denied_is_permanent_not_retried() {
        let err = EngineError::PolicyDenied("example.com".into());
        assert_eq!(err.category(), ErrorCategory::Permanent);
        assert!(!err.category().should_retry());
    }

    #[test]
    fn token_bucket_denied_is_rate_limited_not_dropped() {
        let err = EngineError::TokenBucketDenied("example.com".into());
        assert_eq!(err.category(), ErrorCategory::RateLimited);
        assert!(err.category().should_retry());
    }

    #[test]
    fn retry_later_is_rate_limited() {
        let err = EngineError::RetryLater("429".into());
        assert_eq!(err.category(), ErrorCategory::RateLimited);
        assert!(err.category().should_retry());
    }

    #[test]
    fn internal_broker_errors_are_transient() {
        let err = EngineError::InternalBroker("connection reset".into());
        assert_eq!(err.category(), ErrorCategory::Transient);
    }
}
