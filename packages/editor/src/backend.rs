//! # Backend Collaborators
//!
//! Seams to the remote page API. The session core only knows these traits;
//! transport, auth and timeouts live behind them.

use crate::errors::BackendFailure;
use crate::model::{ChangeSet, EntityRef, HistoryEntry, PageSnapshot, TokenOverrides};
use async_trait::async_trait;
use std::sync::Arc;

/// Fetches the authoritative page
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self) -> Result<PageSnapshot, BackendFailure>;
}

/// Submits a partial change to one entity
#[async_trait]
pub trait MutationSink: Send + Sync {
    async fn submit(&self, target: &EntityRef, changes: &ChangeSet) -> Result<(), BackendFailure>;
}

/// Token-override history storage
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_history(&self) -> Result<Vec<HistoryEntry>, BackendFailure>;

    /// Append a new entry; the backend stamps id, author and time
    async fn append_history(&self, overrides: &TokenOverrides) -> Result<HistoryEntry, BackendFailure>;
}

/// The three collaborators a session talks to
#[derive(Clone)]
pub struct Backend {
    pub pages: Arc<dyn PageSource>,
    pub mutations: Arc<dyn MutationSink>,
    pub history: Arc<dyn HistorySource>,
}

impl Backend {
    /// Use one object for every seam
    pub fn single<B>(backend: Arc<B>) -> Self
    where
        B: PageSource + MutationSink + HistorySource + 'static,
    {
        Self {
            pages: backend.clone(),
            mutations: backend.clone(),
            history: backend,
        }
    }
}
