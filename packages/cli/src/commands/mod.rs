pub mod apply;
pub mod history;
pub mod init;
pub mod show;

pub use apply::{apply, ApplyArgs};
pub use history::{history, HistoryArgs};
pub use init::{init, InitArgs};
pub use show::{show, ShowArgs};

use colored::Colorize;
use linkpage_editor::{HistoryError, MutationError};

/// Print a classified failure the way each class deserves
pub fn report_error(err: &MutationError) {
    match err {
        MutationError::ValidationRejected { message, fields } => {
            eprintln!("{} {}", "✗ Rejected:".red().bold(), message);
            for (field, reason) in fields {
                eprintln!("    {} {}", format!("{}:", field).yellow(), reason);
            }
        }
        MutationError::NotFound(message) => {
            eprintln!("{} {}", "✗ Not found:".red().bold(), message);
        }
        MutationError::Conflict(message) => {
            eprintln!("{} {}", "⚠️  Conflict:".yellow().bold(), message);
        }
        MutationError::Transient(message) => {
            eprintln!("{} {}", "⚠️  Temporary failure:".yellow().bold(), message);
        }
        MutationError::Unknown(message) => {
            eprintln!("{} {}", "✗".red().bold(), message);
        }
    }

    if let Some(hint) = retry_hint(err) {
        eprintln!("    {}", hint);
    }
}

/// Like [`report_error`], plus a note when the settings changed anyway
pub fn report_history_error(err: &HistoryError) {
    match err {
        HistoryError::Mutation(err) => report_error(err),
        HistoryError::Unrecorded { source, .. } => {
            eprintln!(
                "{} token settings were applied but not added to history",
                "⚠️  Partially saved:".yellow().bold()
            );
            report_error(source);
        }
    }
}

fn retry_hint(err: &MutationError) -> Option<&'static str> {
    if !err.is_retryable() {
        return None;
    }
    match err {
        MutationError::Conflict(_) => Some("Someone else changed this entity. Run `linkpage show` and try again."),
        _ => Some("Safe to retry."),
    }
}
