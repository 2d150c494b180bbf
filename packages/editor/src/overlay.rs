//! # Optimistic Overlay
//!
//! Pending local patches layered over the snapshot so a panel can show an
//! edit before the backend confirms it.
//!
//! ## Reconciliation
//!
//! ```text
//! push ──► InFlight ──ok──► Confirmed{generation} ──snapshot covers generation──► dropped
//!              │
//!              └──err──► dropped
//! ```
//!
//! Once a snapshot fetched after the confirmation arrives, the server's
//! version of the entity wins and the local patch is discarded.

use crate::model::{ChangeSet, EntityRef, PageSnapshot};
use crate::snapshot::Snapshot;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchState {
    InFlight,
    /// Accepted; the invalidation generation that will carry it
    Confirmed { generation: u64 },
}

/// Local patch waiting for the server's copy
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPatch {
    pub id: u64,
    pub target: EntityRef,
    pub changes: ChangeSet,
    pub state: PatchState,
}

#[derive(Debug, Default)]
pub struct OptimisticOverlay {
    patches: Mutex<Vec<PendingPatch>>,
    next_id: AtomicU64,
}

impl OptimisticOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    fn patches(&self) -> MutexGuard<'_, Vec<PendingPatch>> {
        self.patches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a patch as in flight; returns its id
    pub fn push(&self, target: EntityRef, changes: ChangeSet) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.patches().push(PendingPatch {
            id,
            target,
            changes,
            state: PatchState::InFlight,
        });
        id
    }

    /// Push a patch and hold it until confirmed; dropping the ticket discards it
    pub fn track(self: &Arc<Self>, target: EntityRef, changes: ChangeSet) -> PatchTicket {
        let id = self.push(target, changes);
        PatchTicket {
            overlay: self.clone(),
            id,
            settled: false,
        }
    }

    pub fn confirm(&self, id: u64, generation: u64) {
        if let Some(patch) = self.patches().iter_mut().find(|p| p.id == id) {
            patch.state = PatchState::Confirmed { generation };
        }
    }

    /// Drop a patch the backend rejected
    pub fn discard(&self, id: u64) {
        self.patches().retain(|p| p.id != id);
    }

    /// Drop confirmed patches the snapshot already reflects
    pub fn reconcile(&self, snapshot: &Snapshot) -> usize {
        let mut patches = self.patches();
        let before = patches.len();
        patches.retain(|p| match p.state {
            PatchState::Confirmed { generation } => generation > snapshot.generation,
            PatchState::InFlight => true,
        });
        let dropped = before - patches.len();
        if dropped > 0 {
            debug!(dropped, version = snapshot.version, "Reconciled optimistic patches");
        }
        dropped
    }

    pub fn pending(&self) -> Vec<PendingPatch> {
        self.patches().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.patches().is_empty()
    }

    /// `page` with every remaining patch applied in submission order
    pub fn view(&self, page: &PageSnapshot) -> PageSnapshot {
        let mut view = page.clone();
        for patch in self.patches().iter() {
            // The entity may have been deleted server-side meanwhile
            if let Err(err) = view.apply_patch(&patch.target, &patch.changes) {
                warn!(entity = %patch.target, error = %err, "Skipping optimistic patch");
            }
        }
        view
    }
}

/// Outcome slot for one pushed patch
///
/// Whatever ends the submission (rejection, a dead task) without a
/// confirmation drops the ticket, and the patch goes with it.
#[must_use = "dropping a PatchTicket discards the patch"]
#[derive(Debug)]
pub struct PatchTicket {
    overlay: Arc<OptimisticOverlay>,
    id: u64,
    settled: bool,
}

impl PatchTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Keep the patch until a snapshot covering `generation` arrives
    pub fn confirm(mut self, generation: u64) {
        self.overlay.confirm(self.id, generation);
        self.settled = true;
    }
}

impl Drop for PatchTicket {
    fn drop(&mut self) {
        if !self.settled {
            self.overlay.discard(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn page() -> PageSnapshot {
        serde_json::from_value(json!({
            "settings": { "title": "Old" },
            "widgets": [{ "id": "a", "type": "link" }]
        }))
        .unwrap()
    }

    fn snapshot(generation: u64, page: PageSnapshot) -> Snapshot {
        Snapshot {
            version: generation,
            generation,
            fetched_at: Utc::now(),
            page,
        }
    }

    #[test]
    fn test_view_applies_pending_patches() {
        let overlay = OptimisticOverlay::new();
        overlay.push(EntityRef::page_settings("page"), ChangeSet::new().set("title", "New"));

        let view = overlay.view(&page());
        assert_eq!(view.settings["title"], json!("New"));
    }

    #[test]
    fn test_discard_on_failure() {
        let overlay = OptimisticOverlay::new();
        let id = overlay.push(EntityRef::widget("a"), ChangeSet::new().set("effect", "x"));
        overlay.discard(id);
        assert!(overlay.is_empty());
        assert_eq!(overlay.view(&page()), page());
    }

    #[test]
    fn test_server_wins_once_snapshot_covers_confirmation() {
        let overlay = OptimisticOverlay::new();
        let id = overlay.push(EntityRef::widget("a"), ChangeSet::new().set("effect", "local"));
        overlay.confirm(id, 3);

        // Older fetch: keep showing the local patch
        assert_eq!(overlay.reconcile(&snapshot(2, page())), 0);
        assert_eq!(overlay.pending().len(), 1);

        // Server version is authoritative even if it differs
        let mut server = page();
        server
            .apply_patch(&EntityRef::widget("a"), &ChangeSet::new().set("effect", "server"))
            .unwrap();
        assert_eq!(overlay.reconcile(&snapshot(3, server.clone())), 1);
        assert_eq!(overlay.view(&server), server);
    }

    #[test]
    fn test_ticket_discards_unless_confirmed() {
        let overlay = Arc::new(OptimisticOverlay::new());

        let dropped = overlay.track(EntityRef::widget("a"), ChangeSet::new().set("effect", "x"));
        assert_eq!(overlay.pending().len(), 1);
        drop(dropped);
        assert!(overlay.is_empty());

        let kept = overlay.track(EntityRef::widget("a"), ChangeSet::new().set("effect", "y"));
        let id = kept.id();
        kept.confirm(4);
        assert_eq!(overlay.pending()[0].id, id);
        assert_eq!(overlay.pending()[0].state, PatchState::Confirmed { generation: 4 });
    }

    #[test]
    fn test_in_flight_survives_reconcile() {
        let overlay = OptimisticOverlay::new();
        overlay.push(EntityRef::widget("a"), ChangeSet::new().set("effect", "x"));
        assert_eq!(overlay.reconcile(&snapshot(10, page())), 0);
    }

    #[test]
    fn test_patch_on_deleted_entity_is_skipped() {
        let overlay = OptimisticOverlay::new();
        overlay.push(EntityRef::widget("gone"), ChangeSet::new().set("effect", "x"));
        assert_eq!(overlay.view(&page()), page());
    }
}
