//! # Snapshot Store
//!
//! Holds the one authoritative page snapshot every panel reads from.
//!
//! ## Lifecycle
//!
//! ```text
//! invalidate() ──► fetch ──► replace snapshot ──► notify all listeners
//!      ▲             │
//!      └─ coalesced ─┘  (calls during a fetch schedule exactly one more)
//! ```
//!
//! The snapshot is never patched in place. Each successful fetch installs a
//! new `Arc<Snapshot>`, and every listener is notified from a single loop
//! before anything else can observe the store, so no panel sees a mix of old
//! and new state. A failed fetch keeps the last good snapshot visible and
//! marks it stale; nothing retries until the next `invalidate()`.

use crate::backend::PageSource;
use crate::errors::MutationError;
use crate::listeners::{Listeners, Subscription};
use crate::model::PageSnapshot;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// One fetched page, immutable once published
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Increments with each successful fetch
    pub version: u64,

    /// Invalidation generation this fetch covers
    pub generation: u64,

    pub fetched_at: DateTime<Utc>,

    pub page: PageSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotStatus {
    /// Nothing has loaded yet
    Loading,
    /// The last fetch succeeded
    Fresh,
    /// The last fetch failed; any snapshot still visible is the last good one
    Stale(MutationError),
}

#[derive(Debug, Clone)]
pub enum SnapshotEvent {
    Updated(Arc<Snapshot>),
    FetchFailed {
        error: MutationError,
        last_good: Option<Arc<Snapshot>>,
    },
}

struct StoreState {
    current: Option<Arc<Snapshot>>,
    status: SnapshotStatus,
    /// Invalidations requested so far
    requested: u64,
    fetching: bool,
    versions: u64,
}

struct StoreInner {
    source: Arc<dyn PageSource>,
    state: Mutex<StoreState>,
    listeners: Listeners<SnapshotEvent>,
    /// Highest generation covered by a completed fetch
    covered: watch::Sender<u64>,
}

impl StoreInner {
    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_fetches(self: Arc<Self>) {
        let mut guard = FetchLoopGuard {
            inner: self.clone(),
            finished: false,
        };

        loop {
            let generation = self.state().requested;
            debug!(generation, "Snapshot fetch started");

            let result = self.source.fetch_page().await;

            let event = {
                let mut state = self.state();
                match result {
                    Ok(page) => {
                        state.versions += 1;
                        let snapshot = Arc::new(Snapshot {
                            version: state.versions,
                            generation,
                            fetched_at: Utc::now(),
                            page,
                        });
                        state.current = Some(snapshot.clone());
                        state.status = SnapshotStatus::Fresh;
                        info!(version = snapshot.version, generation, "Snapshot updated");
                        SnapshotEvent::Updated(snapshot)
                    }
                    Err(failure) => {
                        let error = MutationError::Transient(failure.message);
                        state.status = SnapshotStatus::Stale(error.clone());
                        warn!(error = %error, generation, "Snapshot fetch failed, keeping last good snapshot");
                        SnapshotEvent::FetchFailed {
                            error,
                            last_good: state.current.clone(),
                        }
                    }
                }
            };

            self.listeners.notify(&event);
            self.covered.send_replace(generation);

            let mut state = self.state();
            if state.requested > generation {
                debug!(requested = state.requested, generation, "Coalesced invalidation pending, fetching again");
                continue;
            }
            state.fetching = false;
            break;
        }

        guard.finished = true;
    }
}

/// Unwedges the store when the fetch loop dies without finishing
///
/// The abandoned generations count as covered by a failed fetch so that
/// `settled()` resolves and the next `invalidate()` starts a new loop.
struct FetchLoopGuard {
    inner: Arc<StoreInner>,
    finished: bool,
}

impl Drop for FetchLoopGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let requested = {
            let mut state = self.inner.state();
            state.fetching = false;
            state.status = SnapshotStatus::Stale(MutationError::Transient("page fetch aborted".to_string()));
            state.requested
        };
        error!(requested, "Snapshot fetch loop aborted");
        self.inner.covered.send_replace(requested);
    }
}

/// Shared handle to the page snapshot; clones refer to the same store
#[derive(Clone)]
pub struct SnapshotStore {
    inner: Arc<StoreInner>,
}

impl SnapshotStore {
    pub fn new(source: Arc<dyn PageSource>) -> Self {
        let (covered, _) = watch::channel(0);
        Self {
            inner: Arc::new(StoreInner {
                source,
                state: Mutex::new(StoreState {
                    current: None,
                    status: SnapshotStatus::Loading,
                    requested: 0,
                    fetching: false,
                    versions: 0,
                }),
                listeners: Listeners::new(),
                covered,
            }),
        }
    }

    /// Last successfully fetched snapshot, or `None` while pending
    pub fn get(&self) -> Option<Arc<Snapshot>> {
        self.inner.state().current.clone()
    }

    pub fn status(&self) -> SnapshotStatus {
        self.inner.state().status.clone()
    }

    /// Invalidation generation requested so far
    pub fn generation(&self) -> u64 {
        self.inner.state().requested
    }

    pub fn is_fetching(&self) -> bool {
        self.inner.state().fetching
    }

    /// Attach a listener; the first one triggers the initial fetch
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SnapshotEvent) + Send + Sync + 'static,
    {
        let subscription = self.inner.listeners.subscribe(listener);

        let never_requested = self.inner.state().requested == 0;
        if never_requested {
            self.invalidate();
        }

        subscription
    }

    /// Schedule a refetch; returns the generation that will cover it
    ///
    /// Must be called inside a tokio runtime. While a fetch is in flight the
    /// request is folded into one follow-up fetch.
    pub fn invalidate(&self) -> u64 {
        let (generation, start) = {
            let mut state = self.inner.state();
            state.requested += 1;
            if state.fetching {
                debug!(requested = state.requested, "Invalidation coalesced into in-flight fetch");
                (state.requested, false)
            } else {
                state.fetching = true;
                (state.requested, true)
            }
        };

        if !start {
            return generation;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(self.inner.clone().run_fetches());
                generation
            }
            Err(err) => {
                error!(error = %err, "Cannot refetch snapshot outside a tokio runtime");
                // No loop started, so nothing may wait on this generation
                let mut state = self.inner.state();
                state.requested -= 1;
                state.fetching = false;
                state.requested
            }
        }
    }

    /// Resolve once every invalidation requested so far has a completed fetch
    pub async fn settled(&self) {
        let target = self.generation();
        let mut covered = self.inner.covered.subscribe();
        let _ = covered.wait_for(|generation| *generation >= target).await;
    }

    /// Invalidate and wait for the resulting fetch
    pub async fn refresh(&self) -> SnapshotStatus {
        self.invalidate();
        self.settled().await;
        self.status()
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state();
        f.debug_struct("SnapshotStore")
            .field("version", &state.current.as_ref().map(|s| s.version))
            .field("status", &state.status)
            .field("requested", &state.requested)
            .field("fetching", &state.fetching)
            .finish()
    }
}
