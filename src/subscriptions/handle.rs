//! Caller-side subscription handle.

use crate::error::{Result, SessionError};
use crate::keyexpr::KeyPattern;
use crate::session::SessionInner;
use crate::types::{DeliveryMode, Reliability, Sample, SubscriptionId};
use std::sync::{Arc, Weak};
use std::time::Duration;

use super::registry::Subscription;

/// Handle returned by `Session::subscribe`.
///
/// Dropping the handle does not undeclare the subscription; call
/// [`Subscriber::undeclare`] or `Session::unsubscribe`. The handle only holds a
/// weak reference to its session, so it may safely outlive it.
pub struct Subscriber {
    subscription: Arc<Subscription>,
    session: Weak<SessionInner>,
}

impl Subscriber {
    pub(crate) fn new(subscription: Arc<Subscription>, session: Weak<SessionInner>) -> Self {
        Self {
            subscription,
            session,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.subscription.id()
    }

    pub fn pattern(&self) -> &KeyPattern {
        self.subscription.pattern()
    }

    pub fn reliability(&self) -> Reliability {
        self.subscription.reliability()
    }

    pub fn mode(&self) -> DeliveryMode {
        self.subscription.mode()
    }

    /// Pop the oldest buffered sample (pull mode).
    pub fn try_pull(&self) -> Result<Option<Sample>> {
        self.subscription.try_pull()
    }

    /// Wait up to `timeout` for a sample (pull mode).
    pub fn pull_timeout(&self, timeout: Duration) -> Result<Option<Sample>> {
        self.subscription.pull_timeout(timeout)
    }

    /// Take every buffered sample (pull mode).
    pub fn drain(&self) -> Result<Vec<Sample>> {
        self.subscription.drain()
    }

    /// Feed every buffered sample to `handler` and return how many there were.
    pub fn pull_with<F>(&self, handler: F) -> Result<usize>
    where
        F: Fn(Sample),
    {
        self.subscription.pull_with(handler)
    }

    /// Samples waiting in the queue.
    pub fn pending(&self) -> usize {
        self.subscription.pending()
    }

    /// Samples evicted by the best-effort policy.
    pub fn dropped(&self) -> u64 {
        self.subscription.dropped()
    }

    /// Remove the subscription from its session.
    pub fn undeclare(self) -> Result<()> {
        let session = self.session.upgrade().ok_or(SessionError::SessionClosed)?;
        session.unsubscribe(self.subscription.id())
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id())
            .field("pattern", &self.pattern().as_str())
            .field("mode", &self.mode())
            .field("reliability", &self.reliability())
            .finish()
    }
}
