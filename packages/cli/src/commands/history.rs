use super::{report_error, report_history_error};
use crate::workspace::Workspace;
use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use linkpage_editor::{HistoryEntry, TokenOverrides};
use std::path::Path;

#[derive(Debug, Args)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub command: HistoryCommand,
}

#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
    /// List saved token overrides, newest first
    List,

    /// Show the flattened document of one entry
    Diff { id: u64 },

    /// Show what changes going from one entry to another
    Compare { from: u64, to: u64 },

    /// Save a token-override document (JSON object)
    Save { overrides: String },

    /// Bring back an entry's document as a new save
    Restore { id: u64 },
}

pub async fn history(args: HistoryArgs, cwd: &Path) -> Result<()> {
    let workspace = Workspace::open(cwd)?;
    let session = workspace.session().await?;
    let ledger = session.history();

    match args.command {
        HistoryCommand::List => {
            let entries = ledger.list();
            if entries.is_empty() {
                println!("{}", "No history yet".dimmed());
            }
            for entry in entries.iter().take(workspace.config().history_limit) {
                print_entry(entry);
            }
            if entries.len() > workspace.config().history_limit {
                println!("  {}", format!("... {} older", entries.len() - workspace.config().history_limit).dimmed());
            }
        }

        HistoryCommand::Diff { id } => {
            let changes = ledger.diff(id).map_err(|err| {
                report_error(&err);
                anyhow!("Cannot diff entry {}", id)
            })?;
            for change in changes {
                println!("  {} = {}", change.path.bright_white(), change.value);
            }
        }

        HistoryCommand::Compare { from, to } => {
            let deltas = ledger.compare(from, to).map_err(|err| {
                report_error(&err);
                anyhow!("Cannot compare {} with {}", from, to)
            })?;
            if deltas.is_empty() {
                println!("{}", "No differences".dimmed());
            }
            for delta in deltas {
                match (delta.before, delta.after) {
                    (Some(before), Some(after)) => {
                        println!("  {} {}: {} → {}", "~".yellow(), delta.path, before, after)
                    }
                    (Some(before), None) => println!("  {} {}: {}", "-".red(), delta.path, before),
                    (None, Some(after)) => println!("  {} {}: {}", "+".green(), delta.path, after),
                    (None, None) => {}
                }
            }
        }

        HistoryCommand::Save { overrides } => {
            let overrides: TokenOverrides = serde_json::from_str(&overrides)
                .with_context(|| "Overrides must be a JSON object".to_string())?;
            let saved = ledger.save(overrides).await;
            if let Err(err) = &saved {
                report_history_error(err);
                if err.is_applied() {
                    session.settled().await;
                    workspace.save()?;
                }
            }
            let entry = saved.map_err(|_| anyhow!("Token overrides were not saved"))?;
            session.settled().await;
            workspace.save()?;
            println!("{} Saved entry #{}", "✓".green(), entry.id);
        }

        HistoryCommand::Restore { id } => {
            let restored = ledger.restore(id).await;
            if let Err(err) = &restored {
                report_history_error(err);
                if err.is_applied() {
                    session.settled().await;
                    workspace.save()?;
                }
            }
            let entry = restored.map_err(|_| anyhow!("Entry {} was not restored", id))?;
            session.settled().await;
            workspace.save()?;
            println!("{} Restored #{} as new entry #{}", "✓".green(), id, entry.id);
        }
    }

    Ok(())
}

fn print_entry(entry: &HistoryEntry) {
    println!(
        "  #{:<4} {}  {}  ({} tokens)",
        entry.id,
        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
        entry.created_by.bright_white(),
        linkpage_editor::flatten(&entry.overrides).len()
    );
}
