//! Admission queue and retry worker.
//!
//! # Responsibilities
//! - Admit requests that found no free backend (bounded; full ⇒ 503)
//! - Retry the claim for the head of the queue until a backend frees up
//! - Run forward attempts in a task set owned by the worker
//! - Deliver each outcome on the request's own reply channel
//! - Reap requests whose caller went away
//!
//! A queue slot travels with the queued item. It is freed when the worker
//! hands the item to a backend or drops it, so queued items never outnumber
//! the capacity. Items whose caller went away are swept from the backlog on
//! every wakeup of the worker.
//!
//! ```text
//! submit() ──try_send──▶ [ channel ] ──recv──▶ backlog (VecDeque)
//!    ▲                                              │ claim (notify / 100ms)
//!    │ oneshot reply                                ▼
//!    └──────────────────────────────── forward task (JoinSet)
//!                                         │ transient failure
//!                                         └──▶ enqueue again
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinSet;
use tokio::time;

use crate::load_balancer::{BackendClaim, BackendId, ServerRegistry};
use crate::observability::metrics;
use crate::proxy::error::RouteError;
use crate::proxy::forwarder::Forwarder;
use crate::proxy::{InboundRequest, RouteResult};

/// One occupied place in the queue.
#[derive(Debug)]
struct QueueSlot {
    permit: Option<OwnedSemaphorePermit>,
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        drop(self.permit.take());
        metrics::set_queue_depth(self.capacity - self.slots.available_permits());
    }
}

/// A request waiting for a backend.
pub struct PendingRequest {
    request: InboundRequest,
    reply: oneshot::Sender<RouteResult>,
    /// Backend that just failed this request; skipped on the next attempt.
    avoid: Option<BackendId>,
    slot: QueueSlot,
}

/// Producer side of the admission queue.
#[derive(Debug, Clone)]
pub struct AdmissionQueue {
    tx: mpsc::Sender<PendingRequest>,
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionQueue {
    /// Create a queue holding at most `capacity` pending requests.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PendingRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let queue = Self {
            tx,
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        };
        (queue, rx)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Requests currently queued, not counting those being forwarded.
    pub fn depth(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Queue `request` and wait for its outcome.
    ///
    /// Fails fast with [`RouteError::QueueFull`] when every slot is taken.
    /// Dropping the returned future abandons the request.
    pub async fn submit(&self, request: InboundRequest, avoid: Option<BackendId>) -> RouteResult {
        let (reply, outcome) = oneshot::channel();
        self.enqueue(request, reply, avoid);

        // A dropped sender means the worker shut down without answering.
        outcome.await.unwrap_or(Err(RouteError::Unavailable))
    }

    /// Put a request on the queue. Any failure to queue is answered on
    /// `reply`.
    fn enqueue(
        &self,
        request: InboundRequest,
        reply: oneshot::Sender<RouteResult>,
        avoid: Option<BackendId>,
    ) {
        let permit = match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                tracing::warn!(
                    caller = %request.caller_ip,
                    capacity = self.capacity,
                    "Admission queue full, rejecting request"
                );
                metrics::record_queue_rejected();
                let _ = reply.send(Err(RouteError::QueueFull));
                return;
            }
            Err(TryAcquireError::Closed) => {
                let _ = reply.send(Err(RouteError::Unavailable));
                return;
            }
        };
        let slot = QueueSlot {
            permit: Some(permit),
            slots: Arc::clone(&self.slots),
            capacity: self.capacity,
        };
        metrics::set_queue_depth(self.depth());

        let pending = PendingRequest {
            request,
            reply,
            avoid,
            slot,
        };
        match self.tx.try_send(pending) {
            Ok(()) => {}
            Err(TrySendError::Full(pending)) => {
                let _ = pending.reply.send(Err(RouteError::QueueFull));
            }
            Err(TrySendError::Closed(pending)) => {
                let _ = pending.reply.send(Err(RouteError::Unavailable));
            }
        }
    }
}

/// Single consumer of the admission queue.
pub struct RetryWorker {
    rx: mpsc::Receiver<PendingRequest>,
    queue: AdmissionQueue,
    registry: Arc<ServerRegistry>,
    forwarder: Forwarder,
    retry_delay: Duration,
    backlog: VecDeque<PendingRequest>,
    in_flight: JoinSet<()>,
}

impl RetryWorker {
    pub fn new(
        rx: mpsc::Receiver<PendingRequest>,
        queue: AdmissionQueue,
        registry: Arc<ServerRegistry>,
        forwarder: Forwarder,
        retry_delay: Duration,
    ) -> Self {
        Self {
            rx,
            queue,
            registry,
            forwarder,
            retry_delay,
            backlog: VecDeque::new(),
            in_flight: JoinSet::new(),
        }
    }

    /// Drain the queue until shutdown. In-flight attempts are aborted on
    /// exit, which releases their claims; waiting callers see 503.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            capacity = self.queue.capacity(),
            retry_delay_ms = self.retry_delay.as_millis() as u64,
            "Retry worker starting"
        );

        let registry = Arc::clone(&self.registry);
        loop {
            // Subscribe before claiming so a release in between is not missed.
            let available = registry.available();
            self.reap_abandoned();
            self.dispatch_ready();
            let waiting = !self.backlog.is_empty();

            tokio::select! {
                _ = shutdown.recv() => break,
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Forward task failed");
                    }
                }
                pending = self.rx.recv() => match pending {
                    Some(pending) => self.backlog.push_back(pending),
                    None => break,
                },
                _ = available, if waiting => {}
                _ = time::sleep(self.retry_delay), if waiting => {}
            }
        }

        self.in_flight.shutdown().await;
        tracing::info!(dropped = self.backlog.len(), "Retry worker stopped");
    }

    /// Drop queued requests whose caller stopped waiting.
    fn reap_abandoned(&mut self) {
        let before = self.backlog.len();
        self.backlog.retain(|pending| !pending.reply.is_closed());
        let reaped = before - self.backlog.len();
        if reaped > 0 {
            tracing::debug!(reaped, "Dropped queued requests abandoned by their callers");
        }
    }

    /// Hand queued requests to free backends, head first, until none is free.
    fn dispatch_ready(&mut self) {
        while let Some(head) = self.backlog.front_mut() {
            match self.registry.try_claim_excluding(head.avoid) {
                Some(claim) => {
                    if let Some(pending) = self.backlog.pop_front() {
                        self.spawn_forward(claim, pending);
                    }
                }
                None => {
                    // The avoided backend is only skipped once.
                    head.avoid = None;
                    break;
                }
            }
        }
    }

    fn spawn_forward(&mut self, claim: BackendClaim, pending: PendingRequest) {
        let PendingRequest {
            request,
            mut reply,
            slot,
            ..
        } = pending;
        // Forwarding requests no longer count against the queue.
        drop(slot);

        let forwarder = self.forwarder.clone();
        let queue = self.queue.clone();

        self.in_flight.spawn(async move {
            let backend = claim.id();

            let result = tokio::select! {
                result = forwarder.forward(claim, &request) => result,
                _ = reply.closed() => {
                    tracing::debug!(
                        caller = %request.caller_ip,
                        backend = %backend,
                        "Caller went away, abandoning forward"
                    );
                    return;
                }
            };

            match result {
                Err(e) if e.is_transient() => {
                    tracing::debug!(
                        backend = %backend,
                        reason = e.reason(),
                        "Requeueing after transient failure"
                    );
                    queue.enqueue(request, reply, Some(backend));
                }
                result => {
                    let _ = reply.send(result.map_err(RouteError::from));
                }
            }
        });
    }
}
