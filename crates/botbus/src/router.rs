//! The central routing process consoles and adapters talk to.
//!
//! Flow:
//! 1. Boot: run discovery, register adapters with the lifecycle manager,
//!    apply per-adapter settings, start the context's starting adapters
//! 2. Listen on the context's publish address (clients publish CMD here) and
//!    subscribe address (RSP is broadcast to everyone connected there)
//! 3. Answer the commands the router itself understands; relay everything
//!    else unchanged - some adapter may understand it
//! 4. On shutdown: stop every tracked adapter, close the listeners
//!
//! A crashed adapter is not detected here; the bus simply stops carrying its
//! responses.

use std::io;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bus::codec::MultipartCodec;
use crate::bus::envelope::{Contents, Envelope, FieldValue};
use crate::context::{AddressError, parse_address};
use crate::discovery::{Discovery, DiscoveryError};
use crate::process::ProcessManager;
use crate::settings::ContextSettings;

const ROUTER_COMMANDS: &[&str] = &["commands", "help", "ping", "start", "status"];

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("router io error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

pub struct Router {
    name: String,
    manager: ProcessManager,
}

impl Router {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            manager: ProcessManager::new(),
        }
    }

    /// Register discovered adapters, apply their settings, and start the
    /// context's starting adapters. Per-name start failures are logged and
    /// boot continues.
    pub fn boot(
        &mut self,
        settings: &ContextSettings,
        discovery: &dyn Discovery,
    ) -> Result<(), RouterError> {
        let plugins = discovery.discover()?;
        self.manager.register(
            plugins
                .into_iter()
                .map(|plugin| (plugin.name, plugin.executable_path)),
        );

        for (name, tokens) in &settings.adapter_settings {
            if let Err(err) = self.manager.update(name, tokens.clone()) {
                tracing::warn!(name = %name, error = %err, "Settings for unregistered adapter");
            }
        }

        let report = self.manager.start(settings.starting_adapters.iter());
        for (name, err) in &report.failed {
            tracing::warn!(name = %name, error = %err, "Starting adapter failed");
        }
        Ok(())
    }

    /// Bind the context's listeners and serve until the shutdown flag flips.
    pub async fn serve(
        self,
        settings: &ContextSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), RouterError> {
        let inbound = TcpListener::bind(parse_address(&settings.publish_address)?).await?;
        let outbound = TcpListener::bind(parse_address(&settings.subscribe_address)?).await?;
        self.serve_on(inbound, outbound, shutdown).await
    }

    /// Serve on pre-bound listeners.
    pub async fn serve_on(
        mut self,
        inbound: TcpListener,
        outbound: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), RouterError> {
        let (envelope_tx, mut envelope_rx) = mpsc::channel::<Envelope>(64);
        let mut subscribers: Vec<FramedWrite<TcpStream, MultipartCodec>> = Vec::new();

        tracing::info!(
            name = %self.name,
            inbound = %inbound.local_addr()?,
            outbound = %outbound.local_addr()?,
            "Router listening"
        );

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                accepted = inbound.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!(%peer, "Publisher connected");
                            tokio::spawn(inbound_reader(
                                FramedRead::new(stream, MultipartCodec::new()),
                                envelope_tx.clone(),
                            ));
                        }
                        Err(err) => tracing::warn!(error = %err, "Inbound accept failed"),
                    }
                }

                accepted = outbound.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!(%peer, "Subscriber connected");
                            subscribers.push(FramedWrite::new(stream, MultipartCodec::new()));
                        }
                        Err(err) => tracing::warn!(error = %err, "Outbound accept failed"),
                    }
                }

                Some(envelope) = envelope_rx.recv() => {
                    let outgoing = self.route(envelope);
                    broadcast(&mut subscribers, outgoing).await;
                }
            }
        }

        self.manager.stop_all();
        tracing::info!(name = %self.name, "Router exiting");
        Ok(())
    }

    /// Answer commands the router understands; relay everything else.
    fn route(&mut self, envelope: Envelope) -> Envelope {
        match &envelope.contents {
            Contents::Command { command, args, .. } => {
                match self.answer(command, args) {
                    Some(response) => response,
                    None => {
                        tracing::debug!(command = %command, "Relaying unhandled command");
                        envelope
                    }
                }
            }
            // Adapter responses pass through to every subscriber.
            Contents::Response { .. } => envelope,
        }
    }

    fn answer(&mut self, command: &str, args: &str) -> Option<Envelope> {
        let source = self.name.clone();
        match command {
            "ping" => Some(Envelope::response(source, "ping", "pong")),

            "commands" => Some(Envelope::response(
                source,
                "commands",
                FieldValue::list(ROUTER_COMMANDS.iter().copied()),
            )),

            "status" => {
                let running = self.manager.running();
                let mut lines = vec![
                    "ok".to_string(),
                    format!("{} adapters running", running.len()),
                ];
                lines.extend(running);
                Some(Envelope::response(
                    source,
                    "status",
                    FieldValue::List(lines),
                ))
            }

            "start" => {
                let report = self.manager.start(args.split_whitespace());
                let mut lines: Vec<String> = report
                    .started
                    .iter()
                    .map(|name| format!("started {name}"))
                    .collect();
                lines.extend(report.failed.iter().map(|(_, err)| err.to_string()));
                if lines.is_empty() {
                    lines.push("nothing to start".to_string());
                }
                Some(Envelope::response(source, "start", FieldValue::List(lines)))
            }

            "help" => {
                let text = router_doc(args)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("no help for {args:?}"));
                Some(Envelope::response(source, "help", text))
            }

            _ => None,
        }
    }
}

fn router_doc(topic: &str) -> Option<&'static str> {
    match topic {
        "ping" => Some("liveness check; answers pong"),
        "commands" => Some("list every command this router understands"),
        "status" => Some("summarize running adapters"),
        "start" => Some("start <name ...>: start registered adapters by name"),
        "help" => Some("help <topic>: describe a router command"),
        _ => None,
    }
}

/// Feed decoded envelopes from one publisher connection into the route loop.
///
/// Malformed frames are dropped with a log entry; a disconnect ends the task.
async fn inbound_reader(
    mut frames: FramedRead<TcpStream, MultipartCodec>,
    tx: mpsc::Sender<Envelope>,
) {
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(parts) => match Envelope::from_parts(&parts) {
                Ok(envelope) => {
                    if tx.send(envelope).await.is_err() {
                        break;
                    }
                }
                Err(err) => tracing::warn!(error = %err, "Dropping malformed envelope"),
            },
            Err(err) => {
                tracing::debug!(error = %err, "Publisher disconnected");
                break;
            }
        }
    }
}

/// Best-effort fan-out; subscribers that fail to take the write are dropped.
async fn broadcast(
    subscribers: &mut Vec<FramedWrite<TcpStream, MultipartCodec>>,
    envelope: Envelope,
) {
    let mut index = 0;
    while index < subscribers.len() {
        match subscribers[index].send(envelope.clone()).await {
            Ok(()) => index += 1,
            Err(err) => {
                tracing::debug!(error = %err, "Subscriber dropped");
                subscribers.swap_remove(index);
            }
        }
    }
}
