//! Error types for the session core.

use crate::types::{DeliveryMode, SubscriptionId};
use thiserror::Error;

/// Main error type for session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Invalid key pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Push subscriptions require a callback")]
    MissingCallback,

    #[error("Session is closed")]
    SessionClosed,

    #[error("Subscription not found: {0}")]
    NotFound(SubscriptionId),

    #[error("Reliable queue of {subscription} exceeded its limit of {limit} bytes")]
    ResourceExhausted {
        subscription: SubscriptionId,
        limit: usize,
    },

    #[error("Subscription {subscription} is in {mode:?} mode")]
    WrongMode {
        subscription: SubscriptionId,
        mode: DeliveryMode,
    },

    #[error("Failed to spawn push worker: {0}")]
    WorkerSpawn(String),
}

impl SessionError {
    pub(crate) fn invalid_key(key: &str, reason: impl Into<String>) -> Self {
        SessionError::InvalidKey {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        SessionError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error should abort the caller's current workflow.
    ///
    /// `NotFound` is a warning: the requested state (subscription gone) already holds.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SessionError::NotFound(_))
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Config(e.to_string())
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
