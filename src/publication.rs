//! Publish path: sample stamping, declared publishers and matching status.

use crate::error::{Result, SessionError};
use crate::keyexpr::Key;
use crate::session::SessionInner;
use crate::subscriptions::SubscriptionRegistry;
use crate::types::{Sample, Timestamp};
use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Issues the per-session publication order.
pub(crate) struct Stamper {
    last: AtomicU64,
}

impl Stamper {
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Build a sample carrying the next timestamp. The first is `Timestamp(1)`.
    pub fn stamp(&self, key: Key, payload: Bytes) -> Sample {
        let timestamp = Timestamp(self.last.fetch_add(1, Ordering::SeqCst) + 1);
        Sample {
            key,
            payload,
            timestamp,
        }
    }

    pub fn last(&self) -> Timestamp {
        Timestamp(self.last.load(Ordering::SeqCst))
    }
}

/// A key declared once and published to repeatedly.
pub struct Publisher {
    key: Key,
    session: Arc<SessionInner>,
}

impl Publisher {
    pub(crate) fn new(key: Key, session: Arc<SessionInner>) -> Self {
        Self { key, session }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Publish `payload` under the declared key.
    pub fn put(&self, payload: impl Into<Bytes>) -> Result<Timestamp> {
        self.session.put(self.key.clone(), payload.into())
    }

    /// Whether any active subscription would receive a put right now.
    pub fn matching_status(&self) -> Result<bool> {
        self.session.matching_status(&self.key)
    }

    /// Get notified whenever the matching status changes.
    ///
    /// At most `buffer` unread notifications are held; a listener that falls
    /// further behind is dropped and its channel disconnects.
    pub fn matching_listener(&self, buffer: usize) -> Result<MatchingListener> {
        self.session.register_listener(self.key.clone(), buffer)
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher").field("key", &self.key).finish()
    }
}

/// Emitted when a publisher gains its first or loses its last matching
/// subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingStatus {
    pub matching: bool,
}

/// Receiving end of a matching status listener.
pub struct MatchingListener {
    pub id: u64,
    /// Channel to receive status changes.
    pub receiver: Receiver<MatchingStatus>,
}

impl MatchingListener {
    /// Receive the next change (blocking).
    pub fn recv(&self) -> std::result::Result<MatchingStatus, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a change (non-blocking).
    pub fn try_recv(&self) -> std::result::Result<MatchingStatus, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<MatchingStatus, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

struct ListenerEntry {
    id: u64,
    key: Key,
    sender: Sender<MatchingStatus>,
    /// Last status reported (or the status at registration).
    matching: bool,
}

impl ListenerEntry {
    /// Returns false if the listener should be dropped.
    fn update(&mut self, matching: bool) -> bool {
        if matching == self.matching {
            return true;
        }
        self.matching = matching;
        match self.sender.try_send(MatchingStatus { matching }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

struct Listeners {
    entries: Vec<ListenerEntry>,
    closed: bool,
}

/// Matching listeners of one session.
pub(crate) struct ListenerSet {
    state: Mutex<Listeners>,
    next_id: AtomicU64,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Listeners {
                entries: Vec::new(),
                closed: false,
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Fails with `SessionClosed` once [`ListenerSet::close`] has run.
    pub fn register(&self, key: Key, buffer: usize, matching: bool) -> Result<MatchingListener> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SessionError::SessionClosed);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = bounded(buffer);
        state.entries.push(ListenerEntry {
            id,
            key,
            sender,
            matching,
        });
        Ok(MatchingListener { id, receiver })
    }

    /// Re-evaluate every listener against the registry, notifying changes.
    pub fn refresh(&self, registry: &SubscriptionRegistry) {
        let mut state = self.state.lock();
        state.entries.retain_mut(|entry| {
            let keep = entry.update(registry.any_match(&entry.key));
            if !keep {
                tracing::debug!(listener = entry.id, key = %entry.key, "dropping matching listener");
            }
            keep
        });
    }

    /// Report `matching: false` to listeners that last saw a match, then
    /// release all of them.
    pub fn close(&self) {
        let entries = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.entries)
        };
        for mut entry in entries {
            entry.update(false);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamps_start_at_one_and_increase() {
        let stamper = Stamper::new();
        let key = Key::new("a/b").unwrap();
        assert_eq!(stamper.last(), Timestamp(0));
        let first = stamper.stamp(key.clone(), Bytes::from_static(b"1"));
        let second = stamper.stamp(key, Bytes::from_static(b"2"));
        assert_eq!(first.timestamp, Timestamp(1));
        assert_eq!(second.timestamp, Timestamp(2));
        assert_eq!(stamper.last(), Timestamp(2));
    }

    #[test]
    fn test_listener_reports_changes_only() {
        let set = ListenerSet::new();
        let listener = set.register(Key::new("a").unwrap(), 4, false).unwrap();

        let mut state = set.state.lock();
        assert!(state.entries[0].update(false));
        assert!(state.entries[0].update(true));
        assert!(state.entries[0].update(true));
        drop(state);

        assert_eq!(listener.try_recv().unwrap(), MatchingStatus { matching: true });
        assert!(listener.try_recv().is_err());
    }

    #[test]
    fn test_full_listener_is_dropped() {
        let set = ListenerSet::new();
        let _listener = set.register(Key::new("a").unwrap(), 1, false).unwrap();

        let mut state = set.state.lock();
        assert!(state.entries[0].update(true));
        // Nobody read the first notification
        assert!(!state.entries[0].update(false));
    }

    #[test]
    fn test_close_reports_loss_of_match() {
        let set = ListenerSet::new();
        let was_matching = set.register(Key::new("a").unwrap(), 4, true).unwrap();
        let never_matched = set.register(Key::new("b").unwrap(), 4, false).unwrap();

        set.close();
        assert_eq!(set.len(), 0);
        assert_eq!(was_matching.try_recv().unwrap(), MatchingStatus { matching: false });
        assert!(never_matched.try_recv().is_err());
    }

    #[test]
    fn test_register_after_close_is_refused() {
        let set = ListenerSet::new();
        let early = set.register(Key::new("a").unwrap(), 4, false).unwrap();
        set.close();

        let late = set.register(Key::new("a").unwrap(), 4, true);
        assert!(matches!(late, Err(SessionError::SessionClosed)));
        assert_eq!(set.len(), 0);
        // The sender was released, so the early listener sees the disconnect
        assert!(early.recv().is_err());
    }
}
