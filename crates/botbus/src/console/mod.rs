//! The interactive console: a foreground loop reading lines and a background
//! loop polling the bus.
//!
//! The two loops share nothing but the transport, which tolerates concurrent
//! `publish` and `try_receive`. Shutdown is cooperative: end-of-input flips a
//! watch flag that the background loop observes within one poll interval.

mod commands;
pub mod history;
pub mod render;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::bus::envelope::Contents;
use crate::bus::transport::BusTransport;
use crate::command::dispatcher::{DispatchOutcome, Dispatcher};
use crate::command::registry::{CommandRegistry, Flow};
use crate::context::CurrentContext;
use crate::settings::SettingsStore;

use commands::{
    ContextCommand, ContextsCommand, CreateContextCommand, Shared, StartBotCommand,
    UpdateContextCommand,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("console io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Shown as `<name>: ` before each read. Fixed for the process lifetime.
    pub prompt_name: String,
    /// Source identifier stamped on published envelopes.
    pub source: String,
    /// Context bound at startup, if any.
    pub initial_context: Option<String>,
    pub history_file: Option<PathBuf>,
    /// Router executable for `start_bot`.
    pub router_bin: PathBuf,
    /// Settings file path handed to spawned routers.
    pub settings_path: Option<PathBuf>,
    /// Cadence of the background bus poll. A latency/CPU trade-off, not a
    /// correctness requirement.
    pub poll_interval: Duration,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            prompt_name: "botbus".to_string(),
            source: "console".to_string(),
            initial_context: None,
            history_file: None,
            router_bin: PathBuf::from("botbus-router"),
            settings_path: None,
            poll_interval: Duration::from_millis(500),
        }
    }
}

pub struct Console {
    transport: Arc<BusTransport>,
    shared: Shared,
    dispatcher: Dispatcher,
    config: ConsoleConfig,
}

impl Console {
    pub fn new(store: Arc<dyn SettingsStore>, config: ConsoleConfig) -> Self {
        let transport = Arc::new(BusTransport::new());
        let current = Arc::new(CurrentContext::new());
        let shared = Shared {
            store,
            transport: Arc::clone(&transport),
            current: Arc::clone(&current),
        };

        let mut registry = CommandRegistry::new();
        registry.register("context", Arc::new(ContextCommand(shared.clone())));
        registry.register("contexts", Arc::new(ContextsCommand(shared.clone())));
        registry.register(
            "create_context",
            Arc::new(CreateContextCommand(shared.clone())),
        );
        registry.register(
            "update_context",
            Arc::new(UpdateContextCommand(shared.clone())),
        );
        registry.register(
            "start_bot",
            Arc::new(StartBotCommand {
                current: Arc::clone(&current),
                router_bin: config.router_bin.clone(),
                settings_path: config.settings_path.clone(),
            }),
        );

        let dispatcher = Dispatcher::new(
            registry,
            Arc::clone(&transport),
            current,
            config.source.clone(),
        );

        Self {
            transport,
            shared,
            dispatcher,
            config,
        }
    }

    /// Run until end-of-input.
    pub async fn run(self) -> Result<(), ConsoleError> {
        let prompt = format!("{}: ", self.config.prompt_name);

        println!("botbus {VERSION}");
        println!(
            "    Type \"help\" for console help or \"commands\" for bus commands\n    \
             NOTE: \"commands\" only answers while a router is running\n"
        );

        let mut history = match &self.config.history_file {
            Some(path) => history::load(path).unwrap_or_else(|err| {
                tracing::warn!(path = %path.display(), error = %err, "Failed to load history");
                Vec::new()
            }),
            None => Vec::new(),
        };

        if let Some(name) = &self.config.initial_context
            && let Err(err) = self.shared.switch(name).await
        {
            println!("could not bind context {name:?}: {err}");
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener = tokio::spawn(listen_loop(
            Arc::clone(&self.transport),
            shutdown_rx,
            prompt.clone(),
            self.config.poll_interval,
        ));

        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("{prompt}");
            let _ = std::io::stdout().flush();

            let Some(line) = lines.next_line().await? else {
                // End-of-input: the only terminal transition.
                println!();
                break;
            };
            if !line.trim().is_empty() {
                history.push(line.clone());
            }

            match self.dispatcher.dispatch(&line).await {
                Ok(DispatchOutcome::Handled(Flow::Stop)) => break,
                Ok(DispatchOutcome::Handled(Flow::Continue)) => {}
                Ok(DispatchOutcome::Forwarded { missing_context }) => {
                    if missing_context {
                        println!("{}", render::no_context_notice());
                    }
                }
                Err(err) => println!("error: {err}"),
            }
        }

        let _ = shutdown_tx.send(true);
        let _ = listener.await;

        if let Some(path) = &self.config.history_file
            && let Err(err) = history::save(path, &history)
        {
            tracing::warn!(path = %path.display(), error = %err, "Failed to save history");
        }

        self.transport.stop().await;
        Ok(())
    }
}

/// Background loop: poll the transport, render responses, watch for shutdown.
async fn listen_loop(
    transport: Arc<BusTransport>,
    mut shutdown: watch::Receiver<bool>,
    prompt: String,
    poll_interval: Duration,
) {
    let mut poll = tokio::time::interval(poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = poll.tick() => {
                drain_pending(&transport, &prompt);
            }
        }
    }
    tracing::trace!("Console listener exiting");
}

/// Render everything already queued on the subscribe side.
fn drain_pending(transport: &BusTransport, prompt: &str) {
    loop {
        match transport.try_receive() {
            Ok(Some(envelope)) => match envelope.contents {
                Contents::Response { original, response } => {
                    print!("\n{}", render::render_response(&original, &response));
                    print!("{prompt}");
                    let _ = std::io::stdout().flush();
                }
                Contents::Command { .. } => {
                    tracing::trace!(source = %envelope.source, "Ignoring non-response envelope");
                }
            },
            Ok(None) => break,
            Err(fault) => {
                tracing::warn!(error = %fault, "Bus receive fault");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn listener_observes_shutdown_within_one_interval() {
        let transport = Arc::new(BusTransport::new());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(listen_loop(
            transport,
            rx,
            "test: ".to_string(),
            Duration::from_millis(100),
        ));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .expect("listener did not exit within one poll interval")
            .unwrap();
    }

    #[tokio::test]
    async fn listener_exits_when_the_console_is_dropped() {
        let transport = Arc::new(BusTransport::new());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(listen_loop(
            transport,
            rx,
            "test: ".to_string(),
            Duration::from_millis(100),
        ));

        drop(tx);
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .expect("listener did not exit after the sender was dropped")
            .unwrap();
    }
}
