//! # Page Model
//!
//! Value types shared by every part of the editing session.
//!
//! A [`PageSnapshot`] is what the backend hands back on each fetch. It is never
//! edited in place by the session: changes go out through the mutation gateway
//! and come back as a whole new snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Arbitrarily nested mapping from design-token name to value
pub type TokenOverrides = Map<String, Value>;

/// Flat page settings (title, footer fields, publish status, ...)
pub type PageSettings = Map<String, Value>;

/// Opaque identifier of an editable entity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Category of editable object
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Widget,
    SocialIcon,
    Integration,
    PageSettings,
    /// The page's design-token customization
    TokenSettings,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Widget,
        EntityKind::SocialIcon,
        EntityKind::Integration,
        EntityKind::PageSettings,
        EntityKind::TokenSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Widget => "widget",
            EntityKind::SocialIcon => "social_icon",
            EntityKind::Integration => "integration",
            EntityKind::PageSettings => "page_settings",
            EntityKind::TokenSettings => "token_settings",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (kind, id) pair naming one entity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<EntityId>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn widget(id: impl Into<EntityId>) -> Self {
        Self::new(EntityKind::Widget, id)
    }

    pub fn social_icon(id: impl Into<EntityId>) -> Self {
        Self::new(EntityKind::SocialIcon, id)
    }

    pub fn integration(id: impl Into<EntityId>) -> Self {
        Self::new(EntityKind::Integration, id)
    }

    pub fn page_settings(id: impl Into<EntityId>) -> Self {
        Self::new(EntityKind::PageSettings, id)
    }

    pub fn token_settings(id: impl Into<EntityId>) -> Self {
        Self::new(EntityKind::TokenSettings, id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Partial field patch; fields not present are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet(Map<String, Value>);

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Map<String, Value>> for ChangeSet {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Social platforms a page can link to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Tiktok,
    Youtube,
    X,
    Facebook,
    Linkedin,
    Github,
    Spotify,
    Soundcloud,
    Twitch,
    Discord,
    Pinterest,
    Snapchat,
    Threads,
    Mastodon,
    Bluesky,
    Email,
    Website,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: EntityId,

    #[serde(rename = "type")]
    pub widget_type: String,

    #[serde(default)]
    pub position: i64,

    /// At most one widget per page carries this (enforced by the backend)
    #[serde(default)]
    pub is_featured: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,

    /// Per-type settings (link url, embed id, ...)
    #[serde(default)]
    pub settings: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialIcon {
    pub id: EntityId,
    pub platform: Platform,
    pub url: String,

    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Full state of one page as fetched from the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    #[serde(default)]
    pub settings: PageSettings,

    /// Ordered by `position`
    #[serde(default)]
    pub widgets: Vec<Widget>,

    #[serde(default)]
    pub social_icons: Vec<SocialIcon>,

    /// Integration id → integration settings
    #[serde(default)]
    pub integrations: Map<String, Value>,

    #[serde(default)]
    pub token_overrides: TokenOverrides,
}

impl PageSnapshot {
    pub fn widget(&self, id: &EntityId) -> Option<&Widget> {
        self.widgets.iter().find(|w| &w.id == id)
    }

    pub fn social_icon(&self, id: &EntityId) -> Option<&SocialIcon> {
        self.social_icons.iter().find(|s| &s.id == id)
    }

    pub fn featured_widgets(&self) -> impl Iterator<Item = &Widget> {
        self.widgets.iter().filter(|w| w.is_featured)
    }

    /// Whether the snapshot holds the named entity
    ///
    /// Page and token settings are singletons and always present.
    pub fn contains(&self, target: &EntityRef) -> bool {
        match target.kind {
            EntityKind::Widget => self.widget(&target.id).is_some(),
            EntityKind::SocialIcon => self.social_icon(&target.id).is_some(),
            EntityKind::Integration => self.integrations.contains_key(target.id.as_str()),
            EntityKind::PageSettings | EntityKind::TokenSettings => true,
        }
    }

    /// Merge a changeset into the named entity
    ///
    /// Pure field-level merge. Cross-entity rules such as featured exclusivity
    /// belong to the backend and are not applied here.
    pub fn apply_patch(&mut self, target: &EntityRef, changes: &ChangeSet) -> Result<(), PatchError> {
        match target.kind {
            EntityKind::Widget => {
                let widget = self
                    .widgets
                    .iter_mut()
                    .find(|w| w.id == target.id)
                    .ok_or_else(|| PatchError::Missing(target.clone()))?;
                merge_into(widget, changes)?;
                self.widgets.sort_by_key(|w| w.position);
                Ok(())
            }
            EntityKind::SocialIcon => {
                let icon = self
                    .social_icons
                    .iter_mut()
                    .find(|s| s.id == target.id)
                    .ok_or_else(|| PatchError::Missing(target.clone()))?;
                merge_into(icon, changes)
            }
            EntityKind::Integration => {
                let entry = self
                    .integrations
                    .entry(target.id.as_str().to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !entry.is_object() {
                    *entry = Value::Object(Map::new());
                }
                if let Value::Object(fields) = entry {
                    for (key, value) in changes.fields() {
                        fields.insert(key.clone(), value.clone());
                    }
                }
                Ok(())
            }
            EntityKind::PageSettings => {
                for (key, value) in changes.fields() {
                    self.settings.insert(key.clone(), value.clone());
                }
                Ok(())
            }
            EntityKind::TokenSettings => {
                match changes.get(TOKEN_OVERRIDES_FIELD) {
                    Some(Value::Object(overrides)) => {
                        self.token_overrides = overrides.clone();
                        Ok(())
                    }
                    Some(other) => Err(PatchError::InvalidField {
                        field: TOKEN_OVERRIDES_FIELD.to_string(),
                        reason: format!("expected an object, got {}", other),
                    }),
                    None => Ok(()),
                }
            }
        }
    }
}

/// Changeset field carrying a full token-override document
pub const TOKEN_OVERRIDES_FIELD: &str = "token_overrides";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatchError {
    #[error("Entity not found: {0}")]
    Missing(EntityRef),

    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

/// Round-trip through JSON so field values are type-checked by serde
fn merge_into<T>(entity: &mut T, changes: &ChangeSet) -> Result<(), PatchError>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    let mut value = serde_json::to_value(&*entity).map_err(|e| PatchError::InvalidField {
        field: String::new(),
        reason: e.to_string(),
    })?;

    if let Value::Object(fields) = &mut value {
        for (key, patch) in changes.fields() {
            if key == "id" {
                return Err(PatchError::InvalidField {
                    field: key.clone(),
                    reason: "id is immutable".to_string(),
                });
            }
            fields.insert(key.clone(), patch.clone());
        }
    }

    *entity = serde_json::from_value(value).map_err(|e| PatchError::InvalidField {
        field: changes
            .fields()
            .keys()
            .next()
            .cloned()
            .unwrap_or_default(),
        reason: e.to_string(),
    })?;
    Ok(())
}

/// One immutable saved version of the token-override document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub overrides: TokenOverrides,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> PageSnapshot {
        serde_json::from_value(json!({
            "settings": { "title": "Hello" },
            "widgets": [
                { "id": "a", "type": "link", "position": 0 },
                { "id": "b", "type": "embed", "position": 1, "is_featured": true }
            ],
            "social_icons": [
                { "id": "s1", "platform": "github", "url": "https://github.com/me" }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_snapshot_deserializes_with_defaults() {
        let page = sample();
        assert_eq!(page.widgets.len(), 2);
        assert!(!page.widgets[0].is_featured);
        assert!(page.social_icons[0].is_active);
        assert_eq!(page.social_icons[0].platform, Platform::Github);
        assert!(page.token_overrides.is_empty());
    }

    #[test]
    fn test_patch_leaves_missing_fields_untouched() {
        let mut page = sample();
        let target = EntityRef::widget("a");
        page.apply_patch(&target, &ChangeSet::new().set("effect", "shake"))
            .unwrap();

        let widget = page.widget(&"a".into()).unwrap();
        assert_eq!(widget.effect.as_deref(), Some("shake"));
        assert_eq!(widget.widget_type, "link");
        assert_eq!(widget.position, 0);
    }

    #[test]
    fn test_patch_does_not_enforce_featured_exclusivity() {
        let mut page = sample();
        page.apply_patch(&EntityRef::widget("a"), &ChangeSet::new().set("is_featured", true))
            .unwrap();
        assert_eq!(page.featured_widgets().count(), 2);
    }

    #[test]
    fn test_patch_reorders_widgets_by_position() {
        let mut page = sample();
        page.apply_patch(&EntityRef::widget("a"), &ChangeSet::new().set("position", 5))
            .unwrap();
        assert_eq!(page.widgets[0].id.as_str(), "b");
    }

    #[test]
    fn test_patch_rejects_bad_values() {
        let mut page = sample();
        let err = page
            .apply_patch(&EntityRef::social_icon("s1"), &ChangeSet::new().set("platform", "myspace"))
            .unwrap_err();
        assert!(matches!(err, PatchError::InvalidField { .. }));

        let err = page
            .apply_patch(&EntityRef::widget("a"), &ChangeSet::new().set("id", "z"))
            .unwrap_err();
        assert!(matches!(err, PatchError::InvalidField { .. }));
    }

    #[test]
    fn test_patch_missing_entity() {
        let mut page = sample();
        let err = page
            .apply_patch(&EntityRef::widget("nope"), &ChangeSet::new().set("position", 1))
            .unwrap_err();
        assert_eq!(err, PatchError::Missing(EntityRef::widget("nope")));
    }

    #[test]
    fn test_token_settings_replace_whole_document() {
        let mut page = sample();
        let overrides = json!({ "colors": { "primary": "#fff" } });
        page.apply_patch(
            &EntityRef::token_settings("theme"),
            &ChangeSet::new().set(TOKEN_OVERRIDES_FIELD, overrides.clone()),
        )
        .unwrap();
        assert_eq!(Value::Object(page.token_overrides.clone()), overrides);
    }

    #[test]
    fn test_entity_kind_names() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityRef::widget("7").to_string(), "widget:7");
    }
}
