use crate::workspace::Workspace;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use linkpage_editor::{PageSnapshot, SnapshotStatus};
use std::path::Path;

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Print the raw snapshot as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn show(args: ShowArgs, cwd: &Path) -> Result<()> {
    let workspace = Workspace::open(cwd)?;
    let session = workspace.session().await?;

    let Some(snapshot) = session.snapshot() else {
        println!("{}", "Loading...".dimmed());
        return Ok(());
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot.page)?);
        return Ok(());
    }

    let status = match session.status() {
        SnapshotStatus::Fresh => "fresh".green(),
        SnapshotStatus::Loading => "loading".yellow(),
        SnapshotStatus::Stale(_) => "stale".red(),
    };
    println!("📄 {} (v{}, {})", "Page".bold(), snapshot.version, status);
    print_page(&snapshot.page);
    Ok(())
}

pub fn print_page(page: &PageSnapshot) {
    println!();
    println!("{}", "Settings".bright_blue().bold());
    for (key, value) in &page.settings {
        println!("  {:<16} {}", key, value);
    }

    println!();
    println!("{}", "Widgets".bright_blue().bold());
    for widget in &page.widgets {
        let marker = if widget.is_featured { "★".yellow() } else { " ".normal() };
        let effect = widget.effect.as_deref().unwrap_or("-");
        println!(
            "  {} {:<6} {:<10} pos={} effect={}",
            marker, widget.id.as_str(), widget.widget_type, widget.position, effect
        );
    }

    println!();
    println!("{}", "Social icons".bright_blue().bold());
    for icon in &page.social_icons {
        let state = if icon.is_active { "on".green() } else { "off".dimmed() };
        println!("  {:<6} {:<12} {} [{}]", icon.id.as_str(), format!("{:?}", icon.platform), icon.url, state);
    }

    if !page.integrations.is_empty() {
        println!();
        println!("{}", "Integrations".bright_blue().bold());
        for (id, settings) in &page.integrations {
            println!("  {:<10} {}", id, settings);
        }
    }
}
