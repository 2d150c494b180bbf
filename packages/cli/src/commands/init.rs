use crate::workspace::write_state;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use linkpage_editor::{BackendState, PageSnapshot, SessionConfig, DEFAULT_CONFIG_NAME};
use serde_json::json;
use std::fs;
use std::path::Path;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Identity stamped on history entries
    #[arg(short, long, default_value = "editor")]
    pub author: String,

    /// Force overwrite existing config and data
    #[arg(short, long)]
    pub force: bool,
}

pub fn init(args: InitArgs, cwd: &Path) -> Result<()> {
    let config_path = cwd.join(DEFAULT_CONFIG_NAME);

    // Check if config already exists
    if config_path.exists() && !args.force {
        println!(
            "{} {} already exists",
            "⚠️".yellow(),
            DEFAULT_CONFIG_NAME.bright_white()
        );
        println!("Use --force to overwrite");
        return Ok(());
    }

    println!("{}", "📝 Initializing link page...".bright_blue().bold());

    let config = SessionConfig {
        author: args.author,
        ..SessionConfig::default()
    };
    fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;
    println!("  {} Created {}", "✓".green(), DEFAULT_CONFIG_NAME);

    let state = BackendState {
        page: sample_page()?,
        ..BackendState::default()
    };
    write_state(&config.data_path(cwd), &state)?;
    println!("  {} Created {}", "✓".green(), config.data_file);

    println!();
    println!("{}", "✅ Page initialized!".green().bold());
    println!();
    println!("Next steps:");
    println!("  1. Run: linkpage show");
    println!("  2. Run: linkpage apply widget w1 '{{\"is_featured\": true}}'");
    println!("  3. Run: linkpage history save '{{\"colors\": {{\"primary\": \"#3366ff\"}}}}'");

    Ok(())
}

fn sample_page() -> Result<PageSnapshot> {
    let page = serde_json::from_value(json!({
        "settings": {
            "title": "My links",
            "footer_text": "Thanks for stopping by",
            "published": false,
            "title_effect": "none"
        },
        "widgets": [
            { "id": "w1", "type": "link", "position": 0, "settings": { "url": "https://example.com", "label": "Website" } },
            { "id": "w2", "type": "podcast", "position": 1, "is_featured": true, "settings": { "rss_url": "https://example.com/feed.xml" } },
            { "id": "w3", "type": "blog", "position": 2, "effect": "shake" }
        ],
        "social_icons": [
            { "id": "s1", "platform": "instagram", "url": "https://instagram.com/me" },
            { "id": "s2", "platform": "github", "url": "https://github.com/me", "is_active": false }
        ],
        "integrations": {
            "google": { "tracking_id": "" }
        }
    }))?;
    Ok(page)
}
