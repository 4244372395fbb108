//! Interactive bus console.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use botbus::{Console, ConsoleConfig, JsonSettingsStore};

#[derive(Parser, Debug)]
#[command(
    name = "botbus",
    version,
    about = "Interactive console for the bot message bus"
)]
struct Args {
    /// Context to bind at startup
    #[arg(short, long)]
    context: Option<String>,

    /// Settings file (JSON, keyed by context name)
    #[arg(long, default_value = "botbus-settings.json")]
    settings: PathBuf,

    /// Prompt name shown before each line
    #[arg(long, default_value = "botbus")]
    prompt: String,

    /// History file; omit to skip history persistence
    #[arg(long)]
    history: Option<PathBuf>,

    /// Router executable spawned by `start_bot`
    #[arg(long, default_value = "botbus-router")]
    router_bin: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so they interleave with, but never corrupt, the
    // prompt on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let store = Arc::new(JsonSettingsStore::new(&args.settings));
    let config = ConsoleConfig {
        prompt_name: args.prompt,
        initial_context: args.context,
        history_file: args.history,
        router_bin: args.router_bin,
        settings_path: Some(args.settings),
        ..ConsoleConfig::default()
    };

    Console::new(store, config).run().await?;
    Ok(())
}
