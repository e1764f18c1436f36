//! Per-subscription delivery queue.

use crate::error::{Result, SessionError};
use crate::types::{Reliability, Sample, SubscriptionId};
use parking_lot::{Condvar, Mutex, ReentrantMutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Why a queue stopped accepting samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The subscription was undeclared.
    Undeclared,
    /// The owning session was closed.
    SessionClosed,
}

impl CloseReason {
    pub(crate) fn into_error(self, id: SubscriptionId) -> SessionError {
        match self {
            CloseReason::Undeclared => SessionError::NotFound(id),
            CloseReason::SessionClosed => SessionError::SessionClosed,
        }
    }
}

/// What happened to an enqueued sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueued {
    /// Appended.
    Queued,
    /// Appended after evicting the oldest buffered sample.
    EvictedOldest,
    /// The queue is closed; the sample was discarded.
    Closed,
}

struct QueueState {
    samples: VecDeque<Sample>,
    /// Buffered payload bytes.
    bytes: usize,
    closed: Option<CloseReason>,
}

impl QueueState {
    fn pop(&mut self) -> Option<Sample> {
        let sample = self.samples.pop_front()?;
        self.bytes -= sample.payload_len();
        Some(sample)
    }
}

/// FIFO buffer between the publish fan-out and one subscriber.
pub struct DeliveryQueue {
    owner: SubscriptionId,
    reliability: Reliability,
    /// Best-effort bound, in samples.
    capacity: usize,
    /// Reliable bound, in payload bytes.
    byte_limit: Option<usize>,
    state: Mutex<QueueState>,
    available: Condvar,
    /// Held by whichever thread is currently handing samples to the callback.
    /// Only ever try-locked on the delivery path, so a callback that publishes
    /// elsewhere never waits on another subscription's deliverer. Re-entrant
    /// so a callback may publish to its own subscription or undeclare it.
    delivery: ReentrantMutex<()>,
    dropped: AtomicU64,
}

impl DeliveryQueue {
    pub fn new(
        owner: SubscriptionId,
        reliability: Reliability,
        capacity: usize,
        byte_limit: Option<usize>,
    ) -> Self {
        Self {
            owner,
            reliability,
            capacity,
            byte_limit,
            state: Mutex::new(QueueState {
                samples: VecDeque::new(),
                bytes: 0,
                closed: None,
            }),
            available: Condvar::new(),
            delivery: ReentrantMutex::new(()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append a sample according to the reliability policy.
    ///
    /// Reliable queues only fail when a byte limit is configured and would be
    /// exceeded; the sample is then rejected, never silently lost.
    pub fn enqueue(&self, sample: Sample) -> Result<Enqueued> {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed.is_some() {
                return Ok(Enqueued::Closed);
            }

            match self.reliability {
                Reliability::Reliable => {
                    if let Some(limit) = self.byte_limit {
                        if state.bytes + sample.payload_len() > limit {
                            return Err(SessionError::ResourceExhausted {
                                subscription: self.owner,
                                limit,
                            });
                        }
                    }
                    state.bytes += sample.payload_len();
                    state.samples.push_back(sample);
                    Enqueued::Queued
                }
                Reliability::BestEffort => {
                    state.bytes += sample.payload_len();
                    state.samples.push_back(sample);
                    if state.samples.len() > self.capacity {
                        state.pop();
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        Enqueued::EvictedOldest
                    } else {
                        Enqueued::Queued
                    }
                }
            }
        };

        self.available.notify_one();
        Ok(outcome)
    }

    /// Remove and return the oldest sample.
    pub fn try_pull(&self) -> Option<Sample> {
        self.state.lock().pop()
    }

    /// Wait up to `timeout` for a sample. Returns `None` on timeout or close.
    pub fn pull_timeout(&self, timeout: Duration) -> Option<Sample> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(sample) = state.pop() {
                return Some(sample);
            }
            if state.closed.is_some() {
                return None;
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                return state.pop();
            }
        }
    }

    /// Block until a sample arrives. Returns `None` once the queue is closed.
    pub fn pull_blocking(&self) -> Option<Sample> {
        let mut state = self.state.lock();
        loop {
            if state.closed.is_some() {
                return None;
            }
            if let Some(sample) = state.pop() {
                return Some(sample);
            }
            self.available.wait(&mut state);
        }
    }

    /// Remove every buffered sample, oldest first.
    pub fn drain(&self) -> Vec<Sample> {
        let mut state = self.state.lock();
        state.bytes = 0;
        state.samples.drain(..).collect()
    }

    /// Enqueue and hand the sample to `callback`.
    ///
    /// If another thread is already delivering to this queue, the sample is
    /// left for that thread and this call returns without waiting.
    pub fn push<F>(&self, sample: Sample, callback: F) -> Result<Enqueued>
    where
        F: Fn(Sample),
    {
        let outcome = self.enqueue(sample)?;
        self.drain_push(callback);
        Ok(outcome)
    }

    /// Pass every buffered sample to `callback` in FIFO order, removing each.
    ///
    /// Whoever holds the delivery lock drains; a caller that cannot take it
    /// returns at once. The state lock is released while the callback runs.
    /// Returns the number of samples this call delivered.
    pub fn drain_push<F>(&self, callback: F) -> usize
    where
        F: Fn(Sample),
    {
        let mut delivered = 0;
        loop {
            let Some(guard) = self.delivery.try_lock() else {
                return delivered;
            };
            delivered += self.deliver_buffered(&callback);
            drop(guard);

            // A sample enqueued after the last pop but before the unlock was
            // left to us by a caller whose try_lock failed.
            if !self.has_deliverable() {
                return delivered;
            }
        }
    }

    fn deliver_buffered<F>(&self, callback: &F) -> usize
    where
        F: Fn(Sample),
    {
        let mut delivered = 0;
        loop {
            let next = {
                let mut state = self.state.lock();
                if state.closed.is_some() {
                    break;
                }
                state.pop()
            };
            match next {
                Some(sample) => {
                    callback(sample);
                    delivered += 1;
                }
                None => break,
            }
        }
        delivered
    }

    fn has_deliverable(&self) -> bool {
        let state = self.state.lock();
        state.closed.is_none() && !state.samples.is_empty()
    }

    /// Stop accepting samples, release the buffer and wake blocked pullers.
    ///
    /// Returns once no push delivery is running on another thread. The first
    /// reason recorded wins.
    pub fn close(&self, reason: CloseReason) {
        {
            let mut state = self.state.lock();
            state.closed.get_or_insert(reason);
            state.samples.clear();
            state.bytes = 0;
        }
        self.available.notify_all();
        drop(self.delivery.lock());
    }

    pub fn closed(&self) -> Option<CloseReason> {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffered payload bytes.
    pub fn bytes(&self) -> usize {
        self.state.lock().bytes
    }

    /// Samples evicted by the best-effort policy so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn reliability(&self) -> Reliability {
        self.reliability
    }
}
