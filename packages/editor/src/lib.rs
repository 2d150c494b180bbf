//! # Linkpage Editor
//!
//! Editing-session core for a link-in-bio page editor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ panels: read snapshot + selection, call     │
//! │         apply / invalidate / history        │
//! └─────────────────────────────────────────────┘
//!          ↓ apply                ↑ notify
//! ┌──────────────────┐   ┌──────────────────────┐
//! │ MutationGateway  │──►│ SnapshotStore        │
//! │  FIFO per entity │inv│  one snapshot, swaps │
//! └──────────────────┘   └──────────────────────┘
//!          ↑ save/restore          ↓ fetch
//! ┌──────────────────┐   ┌──────────────────────┐
//! │ HistoryLedger    │   │ backend collaborators│
//! │  append-only     │   │  (PageSource, ...)   │
//! └──────────────────┘   └──────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Backend is source of truth**: the snapshot is only ever replaced by a fetch
//! 2. **One writer path**: every edit goes through the gateway, which invalidates
//! 3. **No races per entity**: same-entity mutations queue behind each other
//! 4. **History never shrinks**: restore is a new save, not an undo
//! 5. **Independent selections**: widget, social icon and integration slots
//!
//! ## Usage
//!
//! ```rust,ignore
//! use linkpage_editor::{Backend, ChangeSet, EditSession, EntityRef, MemoryBackend, SessionConfig};
//!
//! let backend = Arc::new(MemoryBackend::new(page));
//! let session = EditSession::new("client-1", Backend::single(backend), SessionConfig::default());
//! session.open().await?;
//!
//! session.widgets().select(Some("7".into()));
//! session
//!     .apply(EntityRef::widget("7"), ChangeSet::new().set("is_featured", true))
//!     .await?;
//! session.settled().await;
//! ```

mod backend;
mod config;
mod errors;
mod history;
mod listeners;
mod memory;
mod model;
mod mutations;
mod overlay;
mod selection;
mod session;
mod snapshot;

pub use backend::{Backend, HistorySource, MutationSink, PageSource};
pub use config::{SessionConfig, DEFAULT_CONFIG_NAME};
pub use errors::{BackendFailure, EditorError, ErrorKind, HistoryError, MutationError};
pub use history::{compare, flatten, HistoryLedger, TokenChange, TokenDelta};
pub use listeners::{Listeners, Subscription};
pub use memory::{BackendState, MemoryBackend, SubmitEvent};
pub use model::{
    ChangeSet, EntityId, EntityKind, EntityRef, HistoryEntry, PageSettings, PageSnapshot, PatchError, Platform,
    SocialIcon, TokenOverrides, Widget, TOKEN_OVERRIDES_FIELD,
};
pub use mutations::{AppliedChange, MutationGateway};
pub use overlay::{OptimisticOverlay, PatchState, PatchTicket, PendingPatch};
pub use selection::{
    IntegrationSelection, IntegrationSlot, SelectionChange, SelectionRegistry, SelectionSlot, SocialIconSelection,
    SocialIconSlot, WidgetSelection, WidgetSlot,
};
pub use session::EditSession;
pub use snapshot::{Snapshot, SnapshotEvent, SnapshotStatus, SnapshotStore};
