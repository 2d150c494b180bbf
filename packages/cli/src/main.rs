mod commands;
mod workspace;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{apply, history, init, show, ApplyArgs, HistoryArgs, InitArgs, ShowArgs};
use tracing_subscriber::EnvFilter;

/// Linkpage CLI - edit a link-in-bio page from the terminal
#[derive(Parser, Debug)]
#[command(name = "linkpage")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log editor internals to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a config and sample page
    Init(InitArgs),

    /// Print the current page
    Show(ShowArgs),

    /// Apply a changeset to one entity
    Apply(ApplyArgs),

    /// Browse, save and restore token overrides
    History(HistoryArgs),
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match std::env::current_dir() {
        Ok(cwd) => match cli.command {
            Command::Init(args) => init(args, &cwd),
            Command::Show(args) => show(args, &cwd).await,
            Command::Apply(args) => apply(args, &cwd).await,
            Command::History(args) => history(args, &cwd).await,
        },
        Err(err) => Err(anyhow::anyhow!("Cannot get current directory: {}", err)),
    };

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
