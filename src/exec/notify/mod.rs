//! Cross-thread connection notification channel
//!
//! A background worker must be able to wake the specific suspended
//! connection that submitted its work, and that connection may already
//! have been torn down. Workers therefore never hold references into
//! connection state: they hold a [`CookieHandle`], an opaque
//! generation-tagged identifier resolved through the [`CookieRegistry`].
//! A stale handle resolves to "not found" and the notification becomes a
//! counted no-op instead of a dangling dereference.
//!
//! Discipline per outstanding asynchronous action: exactly one worker
//! writes the result before signaling, and only the connection's own
//! thread reads it after observing the signal.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::types::EngineStatus;

/// Opaque identifier for one connection's suspension point.
///
/// The generation distinguishes reuses of the same slot: a handle kept
/// past its connection's teardown never resolves to the slot's new
/// occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CookieHandle {
    slot: u32,
    generation: u32,
}

impl std::fmt::Display for CookieHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cookie {}:{}", self.slot, self.generation)
    }
}

#[derive(Debug)]
struct CookieInner {
    /// Last asynchronous result set by a worker
    aiostat: EngineStatus,
    /// Whether the connection is parked waiting for a notification
    ewouldblock: bool,
}

/// Shared per-connection suspension state
#[derive(Debug)]
pub struct CookieState {
    inner: Mutex<CookieInner>,
    ready_tx: Sender<CookieHandle>,
}

impl CookieState {
    fn new(ready_tx: Sender<CookieHandle>) -> Self {
        Self {
            inner: Mutex::new(CookieInner {
                aiostat: EngineStatus::Success,
                ewouldblock: false,
            }),
            ready_tx,
        }
    }
}

struct CookieSlot {
    generation: u32,
    state: Arc<CookieState>,
}

/// Process-wide table of live connection cookies.
///
/// Initialized at startup and torn down at shutdown alongside the rest of
/// the core; connections register on accept and unregister on close.
pub struct CookieRegistry {
    slots: DashMap<u32, CookieSlot>,
    /// Recycled (slot, next generation) pairs
    free: Mutex<Vec<(u32, u32)>>,
    next_slot: AtomicU32,
    stale_notifications: AtomicU64,
}

impl CookieRegistry {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            free: Mutex::new(Vec::new()),
            next_slot: AtomicU32::new(0),
            stale_notifications: AtomicU64::new(0),
        }
    }

    /// Register a new connection. `ready_tx` is the channel its event
    /// loop drains to learn which cookies became runnable again.
    pub fn register(&self, ready_tx: Sender<CookieHandle>) -> Cookie {
        let (slot, generation) = match self.free.lock().pop() {
            Some(recycled) => recycled,
            None => (self.next_slot.fetch_add(1, Ordering::Relaxed), 0),
        };
        let state = Arc::new(CookieState::new(ready_tx));
        self.slots.insert(
            slot,
            CookieSlot {
                generation,
                state: state.clone(),
            },
        );
        Cookie {
            handle: CookieHandle { slot, generation },
            state,
        }
    }

    /// Remove a connection's cookie. Outstanding handles held by workers
    /// become stale; notifying them is a guarded no-op.
    pub fn unregister(&self, handle: CookieHandle) -> bool {
        let removed = self
            .slots
            .remove_if(&handle.slot, |_, slot| slot.generation == handle.generation)
            .is_some();
        if removed {
            self.free
                .lock()
                .push((handle.slot, handle.generation.wrapping_add(1)));
        }
        removed
    }

    fn resolve(&self, handle: CookieHandle) -> Option<Arc<CookieState>> {
        self.slots.get(&handle.slot).and_then(|slot| {
            if slot.generation == handle.generation {
                Some(slot.state.clone())
            } else {
                None
            }
        })
    }

    /// Store a worker's result and wake the owning connection.
    ///
    /// The result is written and the would-block flag cleared under the
    /// per-connection lock before the readiness signal is sent, so the
    /// connection thread never observes the signal without the result.
    /// Returns false (and counts) when the handle no longer resolves.
    pub fn notify(&self, handle: CookieHandle, status: EngineStatus) -> bool {
        match self.resolve(handle) {
            Some(state) => {
                {
                    let mut inner = state.inner.lock();
                    inner.aiostat = status;
                    inner.ewouldblock = false;
                }
                if state.ready_tx.try_send(handle).is_err() {
                    // Receiver already gone: the connection is mid-teardown.
                    self.stale_notifications.fetch_add(1, Ordering::Relaxed);
                    return false;
                }
                true
            }
            None => {
                log::debug!("Ignoring notification for dead {}", handle);
                self.stale_notifications.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Notifications that arrived for already-destroyed cookies
    pub fn stale_notification_count(&self) -> u64 {
        self.stale_notifications.load(Ordering::Relaxed)
    }

    /// Number of live cookies
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no connections are registered
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for CookieRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CookieRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieRegistry")
            .field("live", &self.slots.len())
            .field(
                "stale_notifications",
                &self.stale_notifications.load(Ordering::Relaxed),
            )
            .finish()
    }
}

/// Connection-side view of its registry slot.
///
/// Only the owning connection thread calls these accessors; workers go
/// through [`CookieRegistry::notify`] with the handle.
#[derive(Debug, Clone)]
pub struct Cookie {
    handle: CookieHandle,
    state: Arc<CookieState>,
}

impl Cookie {
    /// Handle workers use to address this cookie
    #[inline(always)]
    pub fn handle(&self) -> CookieHandle {
        self.handle
    }

    /// Read the last asynchronous result
    pub fn aiostat(&self) -> EngineStatus {
        self.state.inner.lock().aiostat
    }

    /// Overwrite the asynchronous result slot
    pub fn set_aiostat(&self, status: EngineStatus) {
        self.state.inner.lock().aiostat = status;
    }

    /// Set or clear the would-block flag
    pub fn set_ewouldblock(&self, blocked: bool) {
        self.state.inner.lock().ewouldblock = blocked;
    }

    /// Whether the connection is currently parked on asynchronous work
    pub fn is_ewouldblock(&self) -> bool {
        self.state.inner.lock().ewouldblock
    }
}
