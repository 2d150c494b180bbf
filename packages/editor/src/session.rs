//! # Edit Session Management
//!
//! An EditSession is one user's editing view of a page: the shared snapshot,
//! the three selection registries, the mutation gateway, pending optimistic
//! patches and the token-override history.

use crate::backend::Backend;
use crate::config::SessionConfig;
use crate::errors::{EditorError, MutationError};
use crate::history::HistoryLedger;
use crate::model::{ChangeSet, EntityRef, PageSnapshot};
use crate::mutations::{AppliedChange, MutationGateway};
use crate::overlay::OptimisticOverlay;
use crate::selection::{IntegrationSelection, SocialIconSelection, WidgetSelection};
use crate::snapshot::{Snapshot, SnapshotStatus, SnapshotStore};
use std::sync::Arc;
use tracing::{debug, info};

pub struct EditSession {
    /// Unique session identifier
    pub id: String,

    config: SessionConfig,
    store: SnapshotStore,
    gateway: MutationGateway,
    widgets: WidgetSelection,
    social_icons: SocialIconSelection,
    integrations: IntegrationSelection,
    overlay: Arc<OptimisticOverlay>,
    history: HistoryLedger,
}

impl EditSession {
    pub fn new(id: impl Into<String>, backend: Backend, config: SessionConfig) -> Self {
        let store = SnapshotStore::new(backend.pages.clone());
        let gateway = MutationGateway::new(backend.mutations.clone(), store.clone());
        let history = HistoryLedger::new(
            backend.history.clone(),
            gateway.clone(),
            config.token_settings_id.clone(),
        );

        Self {
            id: id.into(),
            config,
            store,
            gateway,
            widgets: WidgetSelection::new(),
            social_icons: SocialIconSelection::new(),
            integrations: IntegrationSelection::new(),
            overlay: Arc::new(OptimisticOverlay::new()),
            history,
        }
    }

    /// Load the first snapshot and the history log
    pub async fn open(&self) -> Result<(), EditorError> {
        if let SnapshotStatus::Stale(err) = self.store.refresh().await {
            return Err(err.into());
        }
        self.history.load().await?;
        info!(session = %self.id, "Session opened");
        Ok(())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn gateway(&self) -> &MutationGateway {
        &self.gateway
    }

    pub fn history(&self) -> &HistoryLedger {
        &self.history
    }

    pub fn overlay(&self) -> &OptimisticOverlay {
        &self.overlay
    }

    pub fn widgets(&self) -> &WidgetSelection {
        &self.widgets
    }

    pub fn social_icons(&self) -> &SocialIconSelection {
        &self.social_icons
    }

    pub fn integrations(&self) -> &IntegrationSelection {
        &self.integrations
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.store.get()
    }

    pub fn status(&self) -> SnapshotStatus {
        self.store.status()
    }

    /// Current snapshot with pending optimistic patches on top
    pub fn view(&self) -> Option<PageSnapshot> {
        let snapshot = self.store.get()?;
        self.overlay.reconcile(&snapshot);
        Some(self.overlay.view(&snapshot.page))
    }

    pub async fn apply(&self, target: EntityRef, changes: ChangeSet) -> Result<AppliedChange, MutationError> {
        self.gateway.apply(target, changes).await
    }

    /// Apply while showing the change locally until the server's copy lands
    ///
    /// The submission and its bookkeeping run on their own task, so a caller
    /// that stops waiting leaves neither a lost change nor a stuck patch.
    pub async fn apply_optimistic(
        &self,
        target: EntityRef,
        changes: ChangeSet,
    ) -> Result<AppliedChange, MutationError> {
        let ticket = self.overlay.track(target.clone(), changes.clone());
        let gateway = self.gateway.clone();

        let task = tokio::spawn(async move {
            let result = gateway.apply(target, changes).await;
            if let Ok(applied) = &result {
                ticket.confirm(applied.generation);
            }
            result
        });

        match task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(MutationError::Unknown("optimistic apply panicked".to_string())),
            Err(_) => Err(MutationError::Transient("optimistic apply was cancelled".to_string())),
        }
    }

    pub fn invalidate(&self) {
        self.store.invalidate();
    }

    pub async fn settled(&self) {
        self.store.settled().await;
    }

    /// Clear widget / social-icon selections whose entity left the snapshot
    ///
    /// Returns how many selections were cleared.
    pub fn prune_selections(&self) -> usize {
        let Some(snapshot) = self.store.get() else {
            return 0;
        };

        let cleared = [
            self.widgets.clear_if_absent(&snapshot.page),
            self.social_icons.clear_if_absent(&snapshot.page),
        ]
        .into_iter()
        .filter(|cleared| *cleared)
        .count();

        if cleared > 0 {
            debug!(cleared, version = snapshot.version, "Pruned stale selections");
        }
        cleared
    }

    /// Number of optimistic patches not yet reconciled
    pub fn pending_count(&self) -> usize {
        self.overlay.pending().len()
    }
}

impl std::fmt::Debug for EditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("id", &self.id)
            .field("store", &self.store)
            .field("gateway", &self.gateway)
            .field("history", &self.history)
            .finish()
    }
}
