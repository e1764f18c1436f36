//! Subscription options and callback types.

use crate::types::{DeliveryMode, Reliability, Sample};
use std::sync::Arc;

/// Push-mode sample handler.
pub type Callback = Arc<dyn Fn(Sample) + Send + Sync + 'static>;

/// Wrap a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(Sample) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Options for a new subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SubscriptionOptions {
    /// Queue drop policy.
    /// Default: Reliable
    pub reliability: Reliability,

    /// Push (callback) or pull (explicit drain).
    /// Default: Pull
    pub mode: DeliveryMode,

    /// Best-effort queue bound (None = session default).
    pub capacity: Option<usize>,
}

impl SubscriptionOptions {
    /// Reliable pull subscription, as used by the pull example program.
    pub fn pull() -> Self {
        Self {
            mode: DeliveryMode::Pull,
            ..Default::default()
        }
    }

    /// Reliable push subscription.
    pub fn push() -> Self {
        Self {
            mode: DeliveryMode::Push,
            ..Default::default()
        }
    }

    pub fn best_effort(self) -> Self {
        Self {
            reliability: Reliability::BestEffort,
            ..self
        }
    }

    pub fn reliable(self) -> Self {
        Self {
            reliability: Reliability::Reliable,
            ..self
        }
    }

    pub fn with_capacity(self, capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..self
        }
    }
}
