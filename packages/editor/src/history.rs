//! # History Ledger
//!
//! Append-only log of token-override documents.
//!
//! ## Design
//!
//! - Every save appends a new entry; nothing is ever removed or rewritten
//! - Saves are serialized, so the newest entry is the document last applied
//! - A save whose append fails reports `HistoryError::Unrecorded`
//! - Restoring an entry saves its document again, producing a new entry
//! - Entries are ordered by creation time, then id
//! - `diff` flattens a document into dot-separated leaf paths for preview
//!
//! ## Example
//!
//! ```rust,ignore
//! let ledger = HistoryLedger::new(backend.history.clone(), gateway, "theme");
//! ledger.load().await?;
//!
//! let entry = ledger.save(overrides).await?;
//! let preview = ledger.diff(entry.id)?;
//!
//! // Later: bring that state back as a fresh save
//! ledger.restore(entry.id).await?;
//! ```

use crate::backend::HistorySource;
use crate::errors::{HistoryError, MutationError};
use crate::model::{ChangeSet, EntityId, EntityRef, HistoryEntry, TokenOverrides, TOKEN_OVERRIDES_FIELD};
use crate::mutations::MutationGateway;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, instrument, warn, Instrument};

/// One leaf of a flattened override document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenChange {
    pub path: String,
    pub value: Value,
}

/// A path whose value differs between two entries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenDelta {
    pub path: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Flatten a document depth-first into `(dot.path, leaf)` pairs
///
/// Nested objects are recursed into in iteration order; arrays, `null` and
/// scalars are leaves. An empty nested object contributes nothing.
pub fn flatten(overrides: &Map<String, Value>) -> Vec<TokenChange> {
    let mut out = Vec::new();
    flatten_into(overrides, None, &mut out);
    out
}

fn flatten_into(map: &Map<String, Value>, prefix: Option<&str>, out: &mut Vec<TokenChange>) {
    for (key, value) in map {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key.clone(),
        };

        match value {
            Value::Object(nested) => flatten_into(nested, Some(&path), out),
            leaf => out.push(TokenChange {
                path,
                value: leaf.clone(),
            }),
        }
    }
}

/// Paths that differ from `from` to `to`
///
/// Paths in `from` come first in its order, then paths only `to` has.
pub fn compare(from: &TokenOverrides, to: &TokenOverrides) -> Vec<TokenDelta> {
    let before = flatten(from);
    let after = flatten(to);

    let lookup = |changes: &[TokenChange], path: &str| {
        changes
            .iter()
            .find(|c| c.path == path)
            .map(|c| c.value.clone())
    };

    let mut deltas: Vec<TokenDelta> = before
        .iter()
        .filter_map(|old| {
            let new = lookup(&after, &old.path);
            (new.as_ref() != Some(&old.value)).then(|| TokenDelta {
                path: old.path.clone(),
                before: Some(old.value.clone()),
                after: new,
            })
        })
        .collect();

    deltas.extend(
        after
            .iter()
            .filter(|new| lookup(&before, &new.path).is_none())
            .map(|new| TokenDelta {
                path: new.path.clone(),
                before: None,
                after: Some(new.value.clone()),
            }),
    );

    deltas
}

struct LedgerInner {
    source: Arc<dyn HistorySource>,
    gateway: MutationGateway,
    token_settings: EntityId,
    /// Oldest first
    entries: Mutex<Vec<HistoryEntry>>,
    /// Held across apply + append so the log and the server agree on the latest save
    writes: tokio::sync::Mutex<()>,
}

impl LedgerInner {
    fn entries(&self) -> MutexGuard<'_, Vec<HistoryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn append(&self, overrides: TokenOverrides) -> Result<HistoryEntry, MutationError> {
        let entry = self
            .source
            .append_history(&overrides)
            .await
            .map_err(MutationError::classify)?;

        let mut entries = self.entries();
        // Keep the log sorted even if the backend clock went backwards
        let position = entries
            .iter()
            .rposition(|e| (e.created_at, e.id) <= (entry.created_at, entry.id))
            .map_or(0, |i| i + 1);
        entries.insert(position, entry.clone());

        info!(id = entry.id, created_by = %entry.created_by, "History entry recorded");
        Ok(entry)
    }

    async fn save(self: Arc<Self>, overrides: TokenOverrides) -> Result<HistoryEntry, HistoryError> {
        let _turn = self.writes.lock().await;

        let target = EntityRef::token_settings(self.token_settings.clone());
        let changes = ChangeSet::new().set(TOKEN_OVERRIDES_FIELD, Value::Object(overrides.clone()));
        self.gateway.apply(target, changes).await?;

        match self.append(overrides.clone()).await {
            Ok(entry) => Ok(entry),
            Err(source) => {
                warn!(error = %source, "Token settings applied but history append failed");
                Err(HistoryError::Unrecorded { overrides, source })
            }
        }
    }
}

/// Shared handle to the token-override log; clones refer to the same log
#[derive(Clone)]
pub struct HistoryLedger {
    inner: Arc<LedgerInner>,
}

impl HistoryLedger {
    pub fn new(source: Arc<dyn HistorySource>, gateway: MutationGateway, token_settings: impl Into<EntityId>) -> Self {
        Self {
            inner: Arc::new(LedgerInner {
                source,
                gateway,
                token_settings: token_settings.into(),
                entries: Mutex::new(Vec::new()),
                writes: tokio::sync::Mutex::new(()),
            }),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<HistoryEntry>> {
        self.inner.entries()
    }

    /// Replace the local log with the backend's
    pub async fn load(&self) -> Result<usize, MutationError> {
        let mut fetched = self
            .inner
            .source
            .fetch_history()
            .await
            .map_err(MutationError::classify)?;
        fetched.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

        let count = fetched.len();
        *self.entries() = fetched;
        info!(entries = count, "History loaded");
        Ok(count)
    }

    /// Append a new entry for `overrides` without touching the token settings
    ///
    /// This is how a caller finishes a save that came back `Unrecorded`.
    #[instrument(skip_all)]
    pub async fn record(&self, overrides: TokenOverrides) -> Result<HistoryEntry, MutationError> {
        let _turn = self.inner.writes.lock().await;
        self.inner.append(overrides).await
    }

    /// Most recent first
    pub fn list(&self) -> Vec<HistoryEntry> {
        self.entries().iter().rev().cloned().collect()
    }

    pub fn latest(&self) -> Option<HistoryEntry> {
        self.entries().last().cloned()
    }

    pub fn get(&self, id: u64) -> Option<HistoryEntry> {
        self.entries().iter().find(|e| e.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn require(&self, id: u64) -> Result<HistoryEntry, MutationError> {
        self.get(id)
            .ok_or_else(|| MutationError::NotFound(format!("history entry {}", id)))
    }

    /// Flattened view of one entry's document
    pub fn diff(&self, id: u64) -> Result<Vec<TokenChange>, MutationError> {
        Ok(flatten(&self.require(id)?.overrides))
    }

    /// What changes going from entry `from` to entry `to`
    pub fn compare(&self, from: u64, to: u64) -> Result<Vec<TokenDelta>, MutationError> {
        let from = self.require(from)?;
        let to = self.require(to)?;
        Ok(compare(&from.overrides, &to.overrides))
    }

    /// Save `overrides` as the page's token settings and log it
    ///
    /// Saves run one at a time on their own task: a caller that stops
    /// waiting does not cancel the save, and the newest entry always matches
    /// the token settings last applied.
    #[instrument(skip_all)]
    pub async fn save(&self, overrides: TokenOverrides) -> Result<HistoryEntry, HistoryError> {
        let task = tokio::spawn(self.inner.clone().save(overrides).in_current_span());

        match task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(MutationError::Unknown("history save panicked".to_string()).into()),
            Err(_) => Err(MutationError::Transient("history save was cancelled".to_string()).into()),
        }
    }

    /// Re-apply a past entry's document as a new save
    #[instrument(skip(self))]
    pub async fn restore(&self, id: u64) -> Result<HistoryEntry, HistoryError> {
        let entry = match self.require(id) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(id, "Cannot restore unknown history entry");
                return Err(err.into());
            }
        };

        let restored = self.save(entry.overrides).await?;
        info!(from = id, to = restored.id, "History entry restored");
        Ok(restored)
    }
}

impl std::fmt::Debug for HistoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryLedger")
            .field("token_settings", &self.inner.token_settings)
            .field("entries", &self.len())
            .finish()
    }
}
