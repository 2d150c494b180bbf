//! # Selection Registries
//!
//! Single-slot stores naming which entity of a kind is being edited.
//!
//! There is one registry per kind and they never touch each other: a user can
//! have a widget and an integration selected at the same time in different
//! panels. A registry does not clear itself when its entity disappears from the
//! snapshot; callers that want that call [`SelectionRegistry::clear_if_absent`].

use crate::listeners::{Listeners, Subscription};
use crate::model::{EntityId, EntityKind, EntityRef, PageSnapshot};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Marker naming the entity kind a registry holds
pub trait SelectionSlot: Send + Sync + 'static {
    const KIND: EntityKind;
}

#[derive(Debug)]
pub struct WidgetSlot;

#[derive(Debug)]
pub struct SocialIconSlot;

#[derive(Debug)]
pub struct IntegrationSlot;

impl SelectionSlot for WidgetSlot {
    const KIND: EntityKind = EntityKind::Widget;
}

impl SelectionSlot for SocialIconSlot {
    const KIND: EntityKind = EntityKind::SocialIcon;
}

impl SelectionSlot for IntegrationSlot {
    const KIND: EntityKind = EntityKind::Integration;
}

pub type WidgetSelection = SelectionRegistry<WidgetSlot>;
pub type SocialIconSelection = SelectionRegistry<SocialIconSlot>;
pub type IntegrationSelection = SelectionRegistry<IntegrationSlot>;

/// Selection change delivered to listeners
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionChange {
    pub kind: EntityKind,
    pub previous: Option<EntityId>,
    pub current: Option<EntityId>,
}

pub struct SelectionRegistry<K: SelectionSlot> {
    selected: Arc<Mutex<Option<EntityId>>>,
    listeners: Listeners<SelectionChange>,
    _kind: PhantomData<K>,
}

impl<K: SelectionSlot> Clone for SelectionRegistry<K> {
    fn clone(&self) -> Self {
        Self {
            selected: self.selected.clone(),
            listeners: self.listeners.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: SelectionSlot> Default for SelectionRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: SelectionSlot> SelectionRegistry<K> {
    pub fn new() -> Self {
        Self {
            selected: Arc::new(Mutex::new(None)),
            listeners: Listeners::new(),
            _kind: PhantomData,
        }
    }

    pub fn kind(&self) -> EntityKind {
        K::KIND
    }

    fn slot(&self) -> MutexGuard<'_, Option<EntityId>> {
        self.selected.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Select an id, or clear with `None`; last write wins
    ///
    /// Returns the previous selection. Listeners hear about actual changes only.
    pub fn select(&self, id: Option<EntityId>) -> Option<EntityId> {
        let previous = std::mem::replace(&mut *self.slot(), id.clone());

        if previous != id {
            let kind = K::KIND;
            debug!(kind = %kind, previous = ?previous, current = ?id, "Selection changed");
            self.listeners.notify(&SelectionChange {
                kind: K::KIND,
                previous: previous.clone(),
                current: id,
            });
        }

        previous
    }

    pub fn clear(&self) -> Option<EntityId> {
        self.select(None)
    }

    pub fn current(&self) -> Option<EntityId> {
        self.slot().clone()
    }

    pub fn current_ref(&self) -> Option<EntityRef> {
        self.current().map(|id| EntityRef::new(K::KIND, id))
    }

    pub fn is_selected(&self, id: &EntityId) -> bool {
        self.slot().as_ref() == Some(id)
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SelectionChange) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    /// Clear the selection if `page` no longer holds the selected entity
    ///
    /// Never called by the core itself.
    pub fn clear_if_absent(&self, page: &PageSnapshot) -> bool {
        match self.current_ref() {
            Some(target) if !page.contains(&target) => {
                self.clear();
                true
            }
            _ => false,
        }
    }
}

impl<K: SelectionSlot> std::fmt::Debug for SelectionRegistry<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionRegistry")
            .field("kind", &K::KIND)
            .field("selected", &self.current())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_registries_are_independent() {
        let widgets = WidgetSelection::new();
        let integrations = IntegrationSelection::new();

        widgets.select(Some("7".into()));
        integrations.select(Some("google".into()));

        assert_eq!(widgets.current(), Some(EntityId::from("7")));
        assert_eq!(integrations.current(), Some(EntityId::from("google")));

        integrations.clear();
        assert_eq!(widgets.current(), Some(EntityId::from("7")));
    }

    #[test]
    fn test_last_write_wins() {
        let widgets = WidgetSelection::new();
        assert_eq!(widgets.select(Some("1".into())), None);
        assert_eq!(widgets.select(Some("2".into())), Some("1".into()));
        assert!(widgets.is_selected(&"2".into()));
        assert_eq!(widgets.current_ref(), Some(EntityRef::widget("2")));
    }

    #[test]
    fn test_listeners_hear_changes_only() {
        let icons = SocialIconSelection::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let _sub = icons.subscribe(move |change| {
            assert_eq!(change.kind, EntityKind::SocialIcon);
            c.fetch_add(1, Ordering::SeqCst);
        });

        icons.select(Some("s1".into()));
        icons.select(Some("s1".into()));
        icons.select(None);
        icons.select(None);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_clear_if_absent_is_explicit() {
        let page: PageSnapshot = serde_json::from_value(json!({
            "widgets": [{ "id": "a", "type": "link" }]
        }))
        .unwrap();

        let widgets = WidgetSelection::new();
        widgets.select(Some("a".into()));
        assert!(!widgets.clear_if_absent(&page));
        assert_eq!(widgets.current(), Some("a".into()));

        widgets.select(Some("gone".into()));
        assert!(widgets.clear_if_absent(&page));
        assert_eq!(widgets.current(), None);
    }
}
