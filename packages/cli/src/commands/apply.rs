use super::report_error;
use crate::workspace::Workspace;
use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;
use linkpage_editor::{ChangeSet, EntityKind, EntityRef, PageSnapshot};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Entity kind (widget, social_icon, integration, page_settings, token_settings)
    pub kind: String,

    /// Entity id
    pub id: String,

    /// Changeset as a JSON object, e.g. '{"is_featured": true}'
    pub changes: String,
}

pub fn parse_kind(name: &str) -> Result<EntityKind> {
    EntityKind::parse(name).ok_or_else(|| {
        let known: Vec<_> = EntityKind::ALL.iter().map(|k| k.as_str()).collect();
        anyhow!("Unknown entity kind: {}. Use one of: {}", name, known.join(", "))
    })
}

pub async fn apply(args: ApplyArgs, cwd: &Path) -> Result<()> {
    let kind = parse_kind(&args.kind)?;
    let changes: ChangeSet = serde_json::from_str(&args.changes)
        .with_context(|| format!("Changeset must be a JSON object: {}", args.changes))?;
    let target = EntityRef::new(kind, args.id);

    let workspace = Workspace::open(cwd)?;
    let session = workspace.session().await?;

    let applied = match session.apply(target.clone(), changes).await {
        Ok(applied) => applied,
        Err(err) => {
            report_error(&err);
            return Err(anyhow!("{} was not changed", target));
        }
    };

    session.settled().await;
    workspace.save()?;

    println!(
        "{} Applied {} field(s) to {} (#{})",
        "✓".green(),
        applied.changes.len(),
        target.to_string().bright_white(),
        applied.sequence
    );

    if let Some(snapshot) = session.snapshot() {
        if let Some(entity) = describe_entity(&snapshot.page, &target) {
            println!("{}", serde_json::to_string_pretty(&entity)?);
        }
    }

    Ok(())
}

fn describe_entity(page: &PageSnapshot, target: &EntityRef) -> Option<Value> {
    match target.kind {
        EntityKind::Widget => page.widget(&target.id).and_then(|w| serde_json::to_value(w).ok()),
        EntityKind::SocialIcon => page.social_icon(&target.id).and_then(|s| serde_json::to_value(s).ok()),
        EntityKind::Integration => page.integrations.get(target.id.as_str()).cloned(),
        EntityKind::PageSettings => Some(Value::Object(page.settings.clone())),
        EntityKind::TokenSettings => Some(Value::Object(page.token_overrides.clone())),
    }
}
