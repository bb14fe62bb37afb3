//! Server registry: the backend pool and its liveness/claim state.
//!
//! # Responsibilities
//! - Own the ordered, static list of backends
//! - Serialize every read and write of `alive`/`claimed` behind one lock
//! - Hand out exclusive claims (test-and-set in a single critical section)
//! - Wake queued work when a backend is released or comes back up

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use crate::load_balancer::backend::{AddressError, Backend, BackendAddress, BackendId};

/// Mutable flags of a single backend.
#[derive(Debug, Clone, Copy)]
struct SlotState {
    alive: bool,
    claimed: bool,
}

/// Point-in-time view of one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStatus {
    pub id: BackendId,
    pub address: String,
    pub alive: bool,
    pub claimed: bool,
}

/// Concurrent-safe pool of backends.
#[derive(Debug)]
pub struct ServerRegistry {
    backends: Vec<Arc<Backend>>,
    state: Mutex<Vec<SlotState>>,
    /// Fired on release and on a dead → alive transition.
    available: Notify,
    claims: AtomicU64,
    releases: AtomicU64,
}

impl ServerRegistry {
    /// Build a registry from parsed addresses. Every backend starts alive and
    /// unclaimed; the first probe cycle corrects liveness.
    pub fn new(addresses: Vec<BackendAddress>) -> Arc<Self> {
        let backends: Vec<Arc<Backend>> = addresses
            .into_iter()
            .enumerate()
            .map(|(i, address)| Arc::new(Backend::new(BackendId(i), address)))
            .collect();
        let state = vec![
            SlotState {
                alive: true,
                claimed: false,
            };
            backends.len()
        ];

        Arc::new(Self {
            backends,
            state: Mutex::new(state),
            available: Notify::new(),
            claims: AtomicU64::new(0),
            releases: AtomicU64::new(0),
        })
    }

    /// Parse configured addresses and build a registry.
    pub fn from_addresses<S: AsRef<str>>(addresses: &[S]) -> Result<Arc<Self>, AddressError> {
        let parsed = addresses
            .iter()
            .map(|a| BackendAddress::parse(a.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(parsed))
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SlotState>> {
        // Flags are plain booleans, so a poisoned lock still holds usable state.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of backends in the pool.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// All backends, in pool order.
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn backend(&self, id: BackendId) -> Option<&Arc<Backend>> {
        self.backends.get(id.0)
    }

    /// Claim the first live, unclaimed backend in pool order.
    pub fn try_claim(self: &Arc<Self>) -> Option<BackendClaim> {
        self.try_claim_excluding(None)
    }

    /// Like [`try_claim`](Self::try_claim) but never returns `skip`.
    pub fn try_claim_excluding(self: &Arc<Self>, skip: Option<BackendId>) -> Option<BackendClaim> {
        let mut state = self.lock();
        let index = state
            .iter()
            .enumerate()
            .position(|(i, slot)| slot.alive && !slot.claimed && Some(BackendId(i)) != skip)?;
        state[index].claimed = true;
        drop(state);

        self.claims.fetch_add(1, Ordering::Relaxed);
        Some(BackendClaim {
            registry: Arc::clone(self),
            backend: Arc::clone(&self.backends[index]),
        })
    }

    fn release(&self, id: BackendId) {
        let mut state = self.lock();
        let slot = &mut state[id.0];
        debug_assert!(slot.claimed, "{id} released without a claim");
        slot.claimed = false;
        drop(state);

        self.releases.fetch_add(1, Ordering::Relaxed);
        self.available.notify_waiters();
    }

    /// Record a probe result. Returns the previous liveness.
    pub fn set_alive(&self, id: BackendId, alive: bool) -> bool {
        let mut state = self.lock();
        let previous = std::mem::replace(&mut state[id.0].alive, alive);
        drop(state);

        if alive && !previous {
            self.available.notify_waiters();
        }
        previous
    }

    pub fn is_alive(&self, id: BackendId) -> bool {
        self.lock()[id.0].alive
    }

    pub fn is_claimed(&self, id: BackendId) -> bool {
        self.lock()[id.0].claimed
    }

    /// Resolves after the next release or revival. Futures created before the
    /// event fires are woken even if they were not yet polled.
    pub fn available(&self) -> Notified<'_> {
        self.available.notified()
    }

    /// Snapshot of every backend's flags, taken under one lock.
    pub fn snapshot(&self) -> Vec<BackendStatus> {
        let state = self.lock();
        self.backends
            .iter()
            .zip(state.iter())
            .map(|(backend, slot)| BackendStatus {
                id: backend.id(),
                address: backend.address().to_string(),
                alive: slot.alive,
                claimed: slot.claimed,
            })
            .collect()
    }

    /// Total successful claims and releases since startup.
    pub fn claim_counts(&self) -> (u64, u64) {
        (
            self.claims.load(Ordering::Relaxed),
            self.releases.load(Ordering::Relaxed),
        )
    }
}

/// Exclusive, temporary ownership of a backend.
///
/// Dropping the claim releases the backend, so every exit path of a forward
/// attempt (success, error, cancellation) releases exactly once.
#[derive(Debug)]
pub struct BackendClaim {
    registry: Arc<ServerRegistry>,
    backend: Arc<Backend>,
}

impl BackendClaim {
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn id(&self) -> BackendId {
        self.backend.id()
    }

    /// Release the backend now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for BackendClaim {
    fn drop(&mut self) {
        self.registry.release(self.backend.id());
    }
}
