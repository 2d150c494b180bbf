//! # Mutation Gateway
//!
//! The only path by which edits reach the backend.
//!
//! ## Semantics
//!
//! ### Ordering
//! - One lane per (kind, id); a lane runs one submission at a time
//! - Calls on the same lane run in call order (FIFO)
//! - Calls on different lanes proceed independently
//!
//! ### Completion
//! - Each call runs on its own task; dropping the caller's future stops
//!   waiting for the result but never cancels the submission
//!
//! ### Success
//! - The snapshot store is invalidated exactly once, before the lane is released
//! - Nothing is written into the snapshot directly
//!
//! ### Failure
//! - The classified error is returned as-is
//! - No invalidation; the snapshot stays as it was

use crate::backend::MutationSink;
use crate::errors::MutationError;
use crate::model::{ChangeSet, EntityRef};
use crate::snapshot::SnapshotStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn, Instrument};

/// Acknowledgement of a change the backend accepted
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChange {
    pub target: EntityRef,
    pub changes: ChangeSet,

    /// Gateway-wide acknowledgement order
    pub sequence: u64,

    /// Snapshot generation that will reflect the change
    pub generation: u64,
}

/// Queue bookkeeping for one entity
#[derive(Default)]
struct Lane {
    /// Calls queued or running
    pending: usize,
    /// Resolves when the most recently queued call releases the lane
    tail: Option<oneshot::Receiver<()>>,
}

struct GatewayInner {
    sink: Arc<dyn MutationSink>,
    store: SnapshotStore,
    lanes: Mutex<HashMap<EntityRef, Lane>>,
    sequence: AtomicU64,
}

impl GatewayInner {
    fn lanes(&self) -> MutexGuard<'_, HashMap<EntityRef, Lane>> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a place at the back of `target`'s lane
    fn enqueue(self: &Arc<Self>, target: &EntityRef) -> (LaneTurn, Option<oneshot::Receiver<()>>) {
        let (done, tail) = oneshot::channel();
        let mut lanes = self.lanes();
        let lane = lanes.entry(target.clone()).or_default();
        lane.pending += 1;
        let previous = lane.tail.replace(tail);

        let turn = LaneTurn {
            inner: self.clone(),
            target: target.clone(),
            _done: done,
        };
        (turn, previous)
    }

    async fn run(
        self: Arc<Self>,
        turn: LaneTurn,
        previous: Option<oneshot::Receiver<()>>,
        changes: ChangeSet,
    ) -> Result<AppliedChange, MutationError> {
        if let Some(previous) = previous {
            // Err only means the predecessor's task died; its turn is over either way
            let _ = previous.await;
        }

        let target = turn.target.clone();
        debug!("Submitting change");
        let outcome = self
            .sink
            .submit(&target, &changes)
            .await
            .map(|()| self.store.invalidate());
        drop(turn);

        match outcome {
            Ok(generation) => {
                let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                info!(sequence, generation, "Change applied");
                Ok(AppliedChange {
                    target,
                    changes,
                    sequence,
                    generation,
                })
            }
            Err(failure) => {
                let error = MutationError::classify(failure);
                warn!(error = %error, "Change rejected");
                Err(error)
            }
        }
    }
}

/// One call's claim on a lane, released on drop even if the task dies
struct LaneTurn {
    inner: Arc<GatewayInner>,
    target: EntityRef,
    /// Dropped after the bookkeeping below, waking the next call in line
    _done: oneshot::Sender<()>,
}

impl Drop for LaneTurn {
    fn drop(&mut self) {
        let mut lanes = self.inner.lanes();
        let idle = match lanes.get_mut(&self.target) {
            Some(lane) => {
                lane.pending = lane.pending.saturating_sub(1);
                lane.pending == 0
            }
            None => false,
        };
        if idle {
            lanes.remove(&self.target);
            debug!(entity = %self.target, "Lane idle, dropped");
        }
    }
}

#[derive(Clone)]
pub struct MutationGateway {
    inner: Arc<GatewayInner>,
}

impl MutationGateway {
    pub fn new(sink: Arc<dyn MutationSink>, store: SnapshotStore) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                sink,
                store,
                lanes: Mutex::new(HashMap::new()),
                sequence: AtomicU64::new(0),
            }),
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.inner.store
    }

    /// Whether a submission for `target` is queued or running
    pub fn in_flight(&self, target: &EntityRef) -> bool {
        self.inner.lanes().contains_key(target)
    }

    /// Number of lanes with queued or running work
    pub fn busy_lanes(&self) -> usize {
        self.inner.lanes().len()
    }

    /// Apply a partial change to one entity
    ///
    /// Must be called inside a tokio runtime. The submission is queued as soon
    /// as the future is first polled and runs to completion from then on.
    #[instrument(skip_all, fields(entity = %target, changed = changes.len()))]
    pub async fn apply(&self, target: EntityRef, changes: ChangeSet) -> Result<AppliedChange, MutationError> {
        let (turn, previous) = self.inner.enqueue(&target);
        let task = tokio::spawn(
            self.inner
                .clone()
                .run(turn, previous, changes)
                .in_current_span(),
        );

        match task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(MutationError::Unknown(format!("submission of {} panicked", target))),
            Err(_) => Err(MutationError::Transient(format!("submission of {} was cancelled", target))),
        }
    }
}

impl std::fmt::Debug for MutationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationGateway")
            .field("busy_lanes", &self.busy_lanes())
            .field("sequence", &self.inner.sequence.load(Ordering::SeqCst))
            .finish()
    }
}
