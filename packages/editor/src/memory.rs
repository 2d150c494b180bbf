//! # In-Memory Backend
//!
//! A process-local implementation of every backend seam. Used by the CLI
//! (persisted as JSON between runs) and by tests, which also drive its
//! latency and failure controls.

use crate::backend::{HistorySource, MutationSink, PageSource};
use crate::errors::BackendFailure;
use crate::model::{
    ChangeSet, EntityKind, EntityRef, HistoryEntry, PageSnapshot, PatchError, TokenOverrides,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Everything the backend persists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendState {
    pub page: PageSnapshot,

    #[serde(default)]
    pub history: Vec<HistoryEntry>,

    #[serde(default)]
    pub next_history_id: u64,
}

/// Submission bookkeeping, in the order the backend observed it
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitEvent {
    Started(EntityRef),
    Finished(EntityRef),
}

#[derive(Default)]
struct Faults {
    fetch: VecDeque<BackendFailure>,
    submit: VecDeque<BackendFailure>,
    append: VecDeque<BackendFailure>,
    submit_delay: Option<Duration>,
}

pub struct MemoryBackend {
    state: Mutex<BackendState>,
    author: String,
    faults: Mutex<Faults>,
    fetch_gate: Mutex<Option<Arc<Semaphore>>>,
    fetches: AtomicUsize,
    submits: AtomicUsize,
    events: Mutex<Vec<SubmitEvent>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryBackend {
    pub fn new(page: PageSnapshot) -> Self {
        Self::with_state(BackendState {
            page,
            ..BackendState::default()
        })
    }

    pub fn with_state(state: BackendState) -> Self {
        Self {
            state: Mutex::new(state),
            author: "editor".to_string(),
            faults: Mutex::new(Faults::default()),
            fetch_gate: Mutex::new(None),
            fetches: AtomicUsize::new(0),
            submits: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Identity stamped on appended history entries
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn state(&self) -> BackendState {
        lock(&self.state).clone()
    }

    pub fn page(&self) -> PageSnapshot {
        lock(&self.state).page.clone()
    }

    /// Number of fetches started so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of submissions started so far
    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn submit_events(&self) -> Vec<SubmitEvent> {
        lock(&self.events).clone()
    }

    /// Make every subsequent fetch wait for [`MemoryBackend::release_fetch`]
    pub fn hold_fetches(&self) {
        *lock(&self.fetch_gate) = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let one held fetch complete
    pub fn release_fetch(&self) {
        if let Some(gate) = lock(&self.fetch_gate).as_ref() {
            gate.add_permits(1);
        }
    }

    /// Stop holding fetches and release any that are waiting
    pub fn open_fetches(&self) {
        if let Some(gate) = lock(&self.fetch_gate).take() {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn fail_next_fetch(&self, failure: BackendFailure) {
        lock(&self.faults).fetch.push_back(failure);
    }

    pub fn fail_next_submit(&self, failure: BackendFailure) {
        lock(&self.faults).submit.push_back(failure);
    }

    pub fn fail_next_append(&self, failure: BackendFailure) {
        lock(&self.faults).append.push_back(failure);
    }

    /// Simulated network latency for each submission
    pub fn set_submit_delay(&self, delay: Option<Duration>) {
        lock(&self.faults).submit_delay = delay;
    }

    fn apply(&self, target: &EntityRef, changes: &ChangeSet) -> Result<(), BackendFailure> {
        let mut state = lock(&self.state);
        let page = &mut state.page;

        page.apply_patch(target, changes).map_err(|err| match err {
            PatchError::Missing(target) => BackendFailure::new(404, format!("{} does not exist", target)),
            PatchError::InvalidField { field, reason } => {
                BackendFailure::new(422, "invalid changeset").with_field(field, reason)
            }
        })?;

        // Only one featured widget per page; the newest wins
        if target.kind == EntityKind::Widget && changes.get("is_featured") == Some(&Value::Bool(true)) {
            for widget in page.widgets.iter_mut().filter(|w| w.id != target.id) {
                widget.is_featured = false;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl PageSource for MemoryBackend {
    async fn fetch_page(&self) -> Result<PageSnapshot, BackendFailure> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let gate = lock(&self.fetch_gate).clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|_| BackendFailure::unreachable("fetch gate closed"))?
                .forget();
        }

        if let Some(failure) = lock(&self.faults).fetch.pop_front() {
            return Err(failure);
        }

        Ok(self.page())
    }
}

#[async_trait]
impl MutationSink for MemoryBackend {
    async fn submit(&self, target: &EntityRef, changes: &ChangeSet) -> Result<(), BackendFailure> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        lock(&self.events).push(SubmitEvent::Started(target.clone()));

        let delay = lock(&self.faults).submit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        let queued = lock(&self.faults).submit.pop_front();
        let result = match queued {
            Some(failure) => Err(failure),
            None => self.apply(target, changes),
        };

        lock(&self.events).push(SubmitEvent::Finished(target.clone()));
        result
    }
}

#[async_trait]
impl HistorySource for MemoryBackend {
    async fn fetch_history(&self) -> Result<Vec<HistoryEntry>, BackendFailure> {
        Ok(lock(&self.state).history.clone())
    }

    async fn append_history(&self, overrides: &TokenOverrides) -> Result<HistoryEntry, BackendFailure> {
        if let Some(failure) = lock(&self.faults).append.pop_front() {
            return Err(failure);
        }

        let mut state = lock(&self.state);
        state.next_history_id += 1;

        // Clock skew must not reorder the log
        let now = Utc::now();
        let created_at = match state.history.last() {
            Some(last) if last.created_at > now => last.created_at,
            _ => now,
        };

        let entry = HistoryEntry {
            id: state.next_history_id,
            created_at,
            created_by: self.author.clone(),
            overrides: overrides.clone(),
        };
        state.history.push(entry.clone());
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page() -> PageSnapshot {
        serde_json::from_value(json!({
            "widgets": [
                { "id": "a", "type": "link", "position": 0 },
                { "id": "b", "type": "link", "position": 1, "is_featured": true }
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_featured_is_exclusive_server_side() {
        let backend = MemoryBackend::new(page());
        backend
            .submit(&EntityRef::widget("a"), &ChangeSet::new().set("is_featured", true))
            .await
            .unwrap();

        let page = backend.page();
        let featured: Vec<_> = page.featured_widgets().map(|w| w.id.as_str()).collect();
        assert_eq!(featured, vec!["a"]);
    }

    #[tokio::test]
    async fn test_unknown_entity_is_404() {
        let backend = MemoryBackend::new(page());
        let failure = backend
            .submit(&EntityRef::widget("zzz"), &ChangeSet::new().set("position", 3))
            .await
            .unwrap_err();
        assert_eq!(failure.status, Some(404));
        assert_eq!(
            backend.submit_events(),
            vec![
                SubmitEvent::Started(EntityRef::widget("zzz")),
                SubmitEvent::Finished(EntityRef::widget("zzz")),
            ]
        );
    }

    #[tokio::test]
    async fn test_queued_failures_are_consumed_in_order() {
        let backend = MemoryBackend::new(page());
        backend.fail_next_fetch(BackendFailure::unreachable("offline"));

        assert!(backend.fetch_page().await.is_err());
        assert!(backend.fetch_page().await.is_ok());
        assert_eq!(backend.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_history_ids_increase() {
        let backend = MemoryBackend::new(page()).with_author("sam");
        let first = backend.append_history(&TokenOverrides::new()).await.unwrap();
        let second = backend.append_history(&TokenOverrides::new()).await.unwrap();

        assert_eq!(first.id + 1, second.id);
        assert!(second.created_at >= first.created_at);
        assert_eq!(second.created_by, "sam");
        assert_eq!(backend.fetch_history().await.unwrap().len(), 2);
    }
}
