//! Session: owns the registry and routes publications to subscriptions.

use crate::error::{Result, SessionError};
use crate::keyexpr::{Key, KeyPattern};
use crate::publication::{ListenerSet, MatchingListener, Publisher, Stamper};
use crate::subscriptions::{
    CloseReason, Callback, Enqueued, QueueLimits, Subscriber, SubscriptionOptions,
    SubscriptionRegistry,
};
use crate::types::{Sample, SessionStats, SubscriptionId, Timestamp};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default best-effort queue bound, in samples.
pub const DEFAULT_BEST_EFFORT_CAPACITY: usize = 256;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Where push callbacks run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushDispatch {
    /// On the publishing thread, before `publish` returns.
    #[default]
    Inline,
    /// On one dedicated thread per push subscription.
    Worker,
}

/// Session configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Best-effort queue bound used when a subscription sets none.
    /// Default: 256
    pub best_effort_capacity: usize,

    /// Max buffered payload bytes per reliable queue (None = unbounded).
    pub reliable_queue_limit: Option<usize>,

    /// Where push callbacks run.
    pub push_dispatch: PushDispatch,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            best_effort_capacity: DEFAULT_BEST_EFFORT_CAPACITY,
            reliable_queue_limit: None,
            push_dispatch: PushDispatch::Inline,
        }
    }
}

impl SessionConfig {
    /// Set a single field from its JSON representation.
    ///
    /// ```ignore
    /// config.insert_json("push_dispatch", "\"worker\"")?;
    /// config.insert_json("reliable_queue_limit", "1048576")?;
    /// ```
    pub fn insert_json(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "best_effort_capacity" => self.best_effort_capacity = serde_json::from_str(value)?,
            "reliable_queue_limit" => self.reliable_queue_limit = serde_json::from_str(value)?,
            "push_dispatch" => self.push_dispatch = serde_json::from_str(value)?,
            other => {
                return Err(SessionError::Config(format!(
                    "unknown configuration key '{}'",
                    other
                )))
            }
        }
        Ok(())
    }

    /// Check structural validity.
    pub fn validate(&self) -> Result<()> {
        if self.best_effort_capacity == 0 {
            return Err(SessionError::Config(
                "best_effort_capacity must be greater than zero".to_string(),
            ));
        }
        if self.reliable_queue_limit == Some(0) {
            return Err(SessionError::Config(
                "reliable_queue_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shared session state. Handles hold it through `Arc` or `Weak`.
pub(crate) struct SessionInner {
    id: u64,
    config: SessionConfig,
    registry: SubscriptionRegistry,
    stamper: Stamper,
    listeners: ListenerSet,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl SessionInner {
    fn ensure_open(&self) -> Result<()> {
        if self.registry.is_closed() {
            return Err(SessionError::SessionClosed);
        }
        Ok(())
    }

    /// Stamp and fan out one publication.
    ///
    /// Every matching subscription is attempted; the first delivery error is
    /// returned after the fan-out completes.
    pub(crate) fn put(&self, key: Key, payload: Bytes) -> Result<Timestamp> {
        let targets = self.registry.matching_for(&key)?;
        let sample = self.stamper.stamp(key, payload);
        let timestamp = sample.timestamp;

        let mut first_error = None;
        for subscription in targets {
            match subscription.deliver(sample.clone()) {
                Ok(Enqueued::Queued) => {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Enqueued::EvictedOldest) => {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Enqueued::Closed) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                self.published.fetch_add(1, Ordering::Relaxed);
                Ok(timestamp)
            }
        }
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let subscription = self.registry.remove(id)?;
        subscription.shutdown(CloseReason::Undeclared);
        self.listeners.refresh(&self.registry);
        tracing::debug!(session = self.id, subscription = %id, "undeclared subscription");
        Ok(())
    }

    pub(crate) fn matching_status(&self, key: &Key) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.registry.any_match(key))
    }

    pub(crate) fn register_listener(&self, key: Key, buffer: usize) -> Result<MatchingListener> {
        self.ensure_open()?;
        let matching = self.registry.any_match(&key);
        self.listeners.register(key, buffer, matching)
    }

    fn close(&self) -> Result<()> {
        let subscriptions = self.registry.close()?;
        let count = subscriptions.len();
        for subscription in subscriptions {
            subscription.shutdown(CloseReason::SessionClosed);
        }
        self.listeners.close();
        tracing::debug!(session = self.id, subscriptions = count, "session closed");
        Ok(())
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if !self.registry.is_closed() {
            let _ = self.close();
        }
    }
}

/// An open pub/sub session.
///
/// Cheap to clone; clones share the same registry. Independent sessions never
/// share state. A session is torn down by [`Session::close`] (or when the last
/// clone, publisher and callback holding it are dropped).
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Open a session with an empty registry.
    pub fn open(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(session = id, ?config, "opening session");

        Ok(Self {
            inner: Arc::new(SessionInner {
                id,
                config,
                registry: SubscriptionRegistry::new(),
                stamper: Stamper::new(),
                listeners: ListenerSet::new(),
                published: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        })
    }

    /// Process-unique session number (for diagnostics).
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    // --- Publication ---

    /// Publish `payload` under `key` to every matching subscription.
    ///
    /// Returns the publication's timestamp. Samples evicted from best-effort
    /// queues are not errors; a reliable queue over its byte limit is.
    pub fn publish(&self, key: &str, payload: impl Into<Bytes>) -> Result<Timestamp> {
        self.inner.ensure_open()?;
        let key = Key::new(key)?;
        self.inner.put(key, payload.into())
    }

    /// Declare a publisher for a fixed key, validated once.
    pub fn declare_publisher(&self, key: &str) -> Result<Publisher> {
        self.inner.ensure_open()?;
        let key = Key::new(key)?;
        Ok(Publisher::new(key, Arc::clone(&self.inner)))
    }

    // --- Subscription ---

    /// Subscribe to every key matching `pattern`.
    ///
    /// Push mode requires `callback`; pull mode ignores it.
    pub fn subscribe(
        &self,
        pattern: &str,
        options: SubscriptionOptions,
        callback: Option<Callback>,
    ) -> Result<Subscriber> {
        self.inner.ensure_open()?;
        let pattern = KeyPattern::new(pattern)?;
        if options.capacity == Some(0) {
            return Err(SessionError::Config(
                "subscription capacity must be greater than zero".to_string(),
            ));
        }

        let limits = QueueLimits {
            capacity: self.inner.config.best_effort_capacity,
            byte_limit: self.inner.config.reliable_queue_limit,
        };
        let subscription = self.inner.registry.add(
            pattern,
            options,
            callback,
            self.inner.config.push_dispatch,
            limits,
        )?;

        tracing::debug!(
            session = self.inner.id,
            subscription = %subscription.id(),
            pattern = %subscription.pattern(),
            mode = ?options.mode,
            reliability = ?options.reliability,
            "declared subscription"
        );
        self.inner.listeners.refresh(&self.inner.registry);

        Ok(Subscriber::new(subscription, Arc::downgrade(&self.inner)))
    }

    /// Push-mode subscribe with a closure.
    pub fn subscribe_with<F>(
        &self,
        pattern: &str,
        options: SubscriptionOptions,
        handler: F,
    ) -> Result<Subscriber>
    where
        F: Fn(Sample) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(handler);
        self.subscribe(pattern, options, Some(callback))
    }

    /// Remove a subscription. Unknown or already removed ids yield `NotFound`.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.inner.unsubscribe(id)
    }

    /// Pop the oldest sample of a pull subscription.
    pub fn try_pull(&self, id: SubscriptionId) -> Result<Option<Sample>> {
        self.inner.registry.get(id)?.try_pull()
    }

    // --- Introspection ---

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            subscriptions: self.inner.registry.len(),
            published: self.inner.published.load(Ordering::Relaxed),
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
        }
    }

    /// Samples a subscription's best-effort queue has evicted.
    pub fn dropped_count(&self, id: SubscriptionId) -> Result<u64> {
        Ok(self.inner.registry.get(id)?.dropped())
    }

    /// Timestamp of the most recent publication.
    pub fn last_timestamp(&self) -> Timestamp {
        self.inner.stamper.last()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.registry.is_closed()
    }

    // --- Lifecycle ---

    /// Close the session and release every subscription.
    ///
    /// Waits for deliveries already running; no callback runs after this
    /// returns. Closing twice yields `SessionClosed`.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .field("subscriptions", &self.inner.registry.len())
            .finish()
    }
}
