//! Bounded producer/consumer event queue
//!
//! Any thread may enqueue; exactly one consumer drains in FIFO order.
//! Insertion past the configured capacity drops the event and counts it,
//! so producers never block on the audit trail. Shutdown is a terminate
//! flag plus a broadcast, after which the consumer drains whatever is
//! still queued and exits.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

use super::event::AuditEvent;

struct QueueInner {
    events: VecDeque<AuditEvent>,
    terminate: bool,
}

/// Capacity-bounded FIFO between audit producers and the consumer thread
pub struct BoundedEventQueue {
    inner: Mutex<QueueInner>,
    events_arrived: Condvar,
    max_depth: usize,
    dropped: AtomicU64,
}

impl BoundedEventQueue {
    pub fn new(max_depth: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                events: VecDeque::new(),
                terminate: false,
            }),
            events_arrived: Condvar::new(),
            max_depth,
            dropped: AtomicU64::new(0),
        }
    }

    /// Append an event and signal the consumer.
    ///
    /// Returns false when the queue is full (the event is dropped and
    /// counted) or the queue is terminating. Never blocks.
    pub fn enqueue(&self, event: AuditEvent) -> bool {
        let mut inner = self.inner.lock();
        if inner.terminate {
            drop(inner);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if inner.events.len() >= self.max_depth {
            drop(inner);
            log::warn!("Dropping audit event {}: queue full", event.id);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        inner.events.push_back(event);
        drop(inner);
        self.events_arrived.notify_one();
        true
    }

    /// Consumer side: block until an event is available or termination
    /// empties the queue.
    ///
    /// Returns `None` only when terminating and empty, so everything
    /// queued before shutdown is drained before the consumer exits. The
    /// caller processes the returned event outside the queue lock.
    pub fn wait_next(&self) -> Option<AuditEvent> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(event) = inner.events.pop_front() {
                return Some(event);
            }
            if inner.terminate {
                return None;
            }
            self.events_arrived.wait(&mut inner);
        }
    }

    /// Set the terminate flag and wake the consumer even if it is
    /// idle-waiting.
    pub fn terminate(&self) {
        let mut inner = self.inner.lock();
        inner.terminate = true;
        drop(inner);
        self.events_arrived.notify_all();
    }

    /// Current queue depth
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }

    /// Events rejected because the queue was full or terminating
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Configured capacity
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}
