//! The botbus routing process.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use botbus::{
    DirScanDiscovery, Discovery, JsonSettingsStore, ManifestDiscovery, Router, SettingsStore,
};

#[derive(Parser, Debug)]
#[command(
    name = "botbus-router",
    version,
    about = "Routing process for the bot message bus"
)]
struct Args {
    /// Context whose settings drive this router
    #[arg(long, default_value = "default")]
    context: String,

    /// Settings file (JSON, keyed by context name)
    #[arg(long, default_value = "botbus-settings.json")]
    settings: PathBuf,

    /// JSON manifest of adapters; takes precedence over --plugin-dir
    #[arg(long)]
    plugin_manifest: Option<PathBuf>,

    /// Directory scanned for adapter executables
    #[arg(long, default_value = "adapters")]
    plugin_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store = JsonSettingsStore::new(&args.settings);
    let settings = store.context(&args.context)?.with_context(|| {
        format!(
            "no context named {:?} in {}; create one from the console with `create_context {}`",
            args.context,
            args.settings.display(),
            args.context
        )
    })?;

    let discovery: Box<dyn Discovery> = match &args.plugin_manifest {
        Some(path) => Box::new(ManifestDiscovery::new(path)),
        None => Box::new(DirScanDiscovery::new(&args.plugin_dir)),
    };

    let mut router = Router::new(settings.name.clone());
    router.boot(&settings, discovery.as_ref())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    router.serve(&settings, shutdown_rx).await?;
    Ok(())
}
