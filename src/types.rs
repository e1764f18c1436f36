//! Core types shared across the session core.

use crate::keyexpr::Key;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a subscription.
///
/// Issued from a per-session counter and never reused, so a stale id can only
/// ever resolve to `NotFound`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Publication order stamp (per-session counter, not wall-clock).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub u64);

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ts({})", self.0)
    }
}

/// Drop policy of a subscription's delivery queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    /// Bounded queue; the oldest sample is dropped on overflow.
    BestEffort,
    /// Unbounded queue; samples are only removed by consumption or close.
    #[default]
    Reliable,
}

/// How samples reach the subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Callback invoked as soon as a sample is enqueued.
    Push,
    /// Samples wait until the consumer drains them.
    #[default]
    Pull,
}

/// One published message.
#[derive(Clone, PartialEq, Eq)]
pub struct Sample {
    pub key: Key,
    pub payload: Bytes,
    pub timestamp: Timestamp,
}

impl Sample {
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("key", &self.key.as_str())
            .field("payload_len", &self.payload.len())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Session counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Active subscriptions.
    pub subscriptions: usize,
    /// Successful `publish` calls.
    pub published: u64,
    /// Samples handed to subscription queues.
    pub delivered: u64,
    /// Samples evicted from best-effort queues.
    pub dropped: u64,
}
