//! Subscription registry and the per-subscription delivery state.

use crate::error::{Result, SessionError};
use crate::keyexpr::{Key, KeyPattern};
use crate::session::PushDispatch;
use crate::types::{DeliveryMode, Reliability, Sample, SubscriptionId};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::queue::{CloseReason, DeliveryQueue, Enqueued};
use super::types::{Callback, SubscriptionOptions};

/// Queue bounds resolved from session defaults and subscription options.
#[derive(Clone, Copy, Debug)]
pub struct QueueLimits {
    pub capacity: usize,
    pub byte_limit: Option<usize>,
}

/// How samples leave the queue.
enum Sink {
    Pull,
    /// Callback runs on the publishing thread.
    Inline(Callback),
    /// Callback runs on a dedicated thread draining the queue.
    Worker(Mutex<Option<JoinHandle<()>>>),
}

/// One active subscription.
pub struct Subscription {
    id: SubscriptionId,
    pattern: KeyPattern,
    options: SubscriptionOptions,
    queue: Arc<DeliveryQueue>,
    sink: Sink,
}

impl Subscription {
    /// Build the subscription, spawning its push worker if needed.
    ///
    /// Push mode requires a callback; pull mode ignores it.
    pub fn new(
        id: SubscriptionId,
        pattern: KeyPattern,
        options: SubscriptionOptions,
        callback: Option<Callback>,
        dispatch: PushDispatch,
        limits: QueueLimits,
    ) -> Result<Self> {
        let queue = Arc::new(DeliveryQueue::new(
            id,
            options.reliability,
            options.capacity.unwrap_or(limits.capacity),
            limits.byte_limit,
        ));

        let sink = match (options.mode, callback) {
            (DeliveryMode::Pull, _) => Sink::Pull,
            (DeliveryMode::Push, None) => return Err(SessionError::MissingCallback),
            (DeliveryMode::Push, Some(callback)) => match dispatch {
                PushDispatch::Inline => Sink::Inline(callback),
                PushDispatch::Worker => {
                    let handle = spawn_worker(id, Arc::clone(&queue), callback)?;
                    Sink::Worker(Mutex::new(Some(handle)))
                }
            },
        };

        Ok(Self {
            id,
            pattern,
            options,
            queue,
            sink,
        })
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn pattern(&self) -> &KeyPattern {
        &self.pattern
    }

    pub fn reliability(&self) -> Reliability {
        self.options.reliability
    }

    pub fn mode(&self) -> DeliveryMode {
        self.options.mode
    }

    pub fn matches(&self, key: &Key) -> bool {
        self.pattern.matches(key)
    }

    /// Route one sample into this subscription.
    pub fn deliver(&self, sample: Sample) -> Result<Enqueued> {
        match &self.sink {
            Sink::Inline(callback) => self.queue.push(sample, |s| callback(s)),
            Sink::Pull | Sink::Worker(_) => self.queue.enqueue(sample),
        }
    }

    pub fn try_pull(&self) -> Result<Option<Sample>> {
        self.check_pull()?;
        Ok(self.queue.try_pull())
    }

    pub fn pull_timeout(&self, timeout: Duration) -> Result<Option<Sample>> {
        self.check_pull()?;
        let sample = self.queue.pull_timeout(timeout);
        if sample.is_none() {
            if let Some(reason) = self.queue.closed() {
                return Err(reason.into_error(self.id));
            }
        }
        Ok(sample)
    }

    pub fn drain(&self) -> Result<Vec<Sample>> {
        self.check_pull()?;
        Ok(self.queue.drain())
    }

    /// Hand every buffered sample to `handler`, oldest first.
    pub fn pull_with<F>(&self, handler: F) -> Result<usize>
    where
        F: Fn(Sample),
    {
        self.check_pull()?;
        Ok(self.queue.drain_push(handler))
    }

    /// Samples currently buffered.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.closed().is_some()
    }

    /// Close the queue and wait for in-flight deliveries.
    ///
    /// A worker is joined unless the caller is that worker.
    pub fn shutdown(&self, reason: CloseReason) {
        self.queue.close(reason);

        if let Sink::Worker(handle) = &self.sink {
            let handle = handle.lock().take();
            if let Some(handle) = handle {
                if handle.thread().id() == thread::current().id() {
                    return;
                }
                if handle.join().is_err() {
                    tracing::debug!(subscription = %self.id, "push worker panicked");
                }
            }
        }
    }

    fn check_pull(&self) -> Result<()> {
        if self.options.mode != DeliveryMode::Pull {
            return Err(SessionError::WrongMode {
                subscription: self.id,
                mode: self.options.mode,
            });
        }
        if let Some(reason) = self.queue.closed() {
            return Err(reason.into_error(self.id));
        }
        Ok(())
    }
}

fn spawn_worker(
    id: SubscriptionId,
    queue: Arc<DeliveryQueue>,
    callback: Callback,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("herald-push-{}", id.0))
        .spawn(move || {
            tracing::trace!(subscription = %id, "push worker started");
            while let Some(sample) = queue.pull_blocking() {
                callback(sample);
            }
            tracing::trace!(subscription = %id, "push worker stopped");
        })
        .map_err(|e| SessionError::WorkerSpawn(e.to_string()))
}

struct RegistryState {
    /// Ids are issued in increasing order, so key order is insertion order.
    entries: BTreeMap<SubscriptionId, Arc<Subscription>>,
    closed: bool,
}

/// Active subscriptions of one session, plus its liveness flag.
pub struct SubscriptionRegistry {
    state: RwLock<RegistryState>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                entries: BTreeMap::new(),
                closed: false,
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create and register a subscription.
    pub fn add(
        &self,
        pattern: KeyPattern,
        options: SubscriptionOptions,
        callback: Option<Callback>,
        dispatch: PushDispatch,
        limits: QueueLimits,
    ) -> Result<Arc<Subscription>> {
        if self.is_closed() {
            return Err(SessionError::SessionClosed);
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let subscription = Arc::new(Subscription::new(
            id, pattern, options, callback, dispatch, limits,
        )?);

        let inserted = {
            let mut state = self.state.write();
            if state.closed {
                false
            } else {
                state.entries.insert(id, Arc::clone(&subscription));
                true
            }
        };

        if !inserted {
            subscription.shutdown(CloseReason::SessionClosed);
            return Err(SessionError::SessionClosed);
        }
        Ok(subscription)
    }

    /// Unregister a subscription. The caller shuts it down.
    pub fn remove(&self, id: SubscriptionId) -> Result<Arc<Subscription>> {
        let mut state = self.state.write();
        if state.closed {
            return Err(SessionError::SessionClosed);
        }
        state.entries.remove(&id).ok_or(SessionError::NotFound(id))
    }

    pub fn get(&self, id: SubscriptionId) -> Result<Arc<Subscription>> {
        let state = self.state.read();
        if state.closed {
            return Err(SessionError::SessionClosed);
        }
        state
            .entries
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    /// Subscriptions whose pattern matches `key`, in insertion order.
    ///
    /// Only holds the read lock while collecting the snapshot.
    pub fn matching_for(&self, key: &Key) -> Result<Vec<Arc<Subscription>>> {
        let state = self.state.read();
        if state.closed {
            return Err(SessionError::SessionClosed);
        }
        Ok(state
            .entries
            .values()
            .filter(|sub| sub.matches(key))
            .cloned()
            .collect())
    }

    /// Whether any active subscription matches `key`.
    pub fn any_match(&self, key: &Key) -> bool {
        let state = self.state.read();
        !state.closed && state.entries.values().any(|sub| sub.matches(key))
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Mark closed and hand back every subscription for shutdown.
    ///
    /// Fails with `SessionClosed` if already closed.
    pub fn close(&self) -> Result<Vec<Arc<Subscription>>> {
        let mut state = self.state.write();
        if state.closed {
            return Err(SessionError::SessionClosed);
        }
        state.closed = true;
        let entries = std::mem::take(&mut state.entries);
        Ok(entries.into_values().collect())
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
