//! Publish/subscribe socket pair for one bus context.
//!
//! The transport owns exactly one outbound (publish) and one inbound
//! (subscribe) connection at a time; both connect to the router, which
//! listens. Publishing is fire-and-forget. Receiving is a non-blocking poll
//! backed by a reader task that decodes frames into a channel, so the polling
//! task can also observe a cooperative shutdown flag promptly.
//!
//! Publish and receive use independent sockets behind independent locks, so
//! concurrent `publish` / `try_receive` need no shared lock. Rebinding takes
//! both, which makes a context switch appear atomic to the polling task.

use std::io;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

use super::codec::MultipartCodec;
use super::envelope::Envelope;
use crate::context::{AddressError, BusContext, parse_address};

/// Socket-level failure, distinct from "nothing to receive".
#[derive(Debug, thiserror::Error)]
pub enum TransportFault {
    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    #[error("subscribe socket closed")]
    Closed,
}

#[derive(Default)]
struct Subscriber {
    frames: Option<mpsc::UnboundedReceiver<Result<Envelope, TransportFault>>>,
    reader: Option<JoinHandle<()>>,
}

/// The publish/subscribe socket pair.
#[derive(Default)]
pub struct BusTransport {
    publisher: tokio::sync::Mutex<Option<FramedWrite<TcpStream, MultipartCodec>>>,
    subscriber: std::sync::Mutex<Subscriber>,
    /// Most recently bound context, kept so `start` can reopen after `stop`.
    context: std::sync::Mutex<Option<BusContext>>,
}

impl BusTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect both sockets to a context's addresses.
    ///
    /// Replaces any existing binding, disconnecting the previous sockets
    /// first (a no-op if none were bound). Binding the same addresses again
    /// still performs the disconnect+reconnect.
    pub async fn bind(&self, context: &BusContext) -> Result<(), TransportFault> {
        let publish_addr = parse_address(&context.publish_address)?;
        let subscribe_addr = parse_address(&context.subscribe_address)?;

        self.stop().await;

        let publish = TcpStream::connect(&publish_addr).await?;
        let subscribe = TcpStream::connect(&subscribe_addr).await?;
        tracing::debug!(publish = %publish_addr, subscribe = %subscribe_addr, "Bus transport bound");

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(subscribe_reader(
            FramedRead::new(subscribe, MultipartCodec::new()),
            tx,
        ));

        *self.publisher.lock().await = Some(FramedWrite::new(publish, MultipartCodec::new()));
        {
            let mut sub = self.lock_subscriber();
            sub.frames = Some(rx);
            sub.reader = Some(reader);
        }
        *self
            .context
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(context.clone());
        Ok(())
    }

    /// Reopen the sockets using the most recently bound context.
    ///
    /// A no-op when nothing has ever been bound.
    pub async fn start(&self) -> Result<(), TransportFault> {
        let context = self
            .context
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        match context {
            Some(context) => self.bind(&context).await,
            None => Ok(()),
        }
    }

    /// Close both sockets. Idempotent, and safe to call from a different task
    /// than the one that bound - the transport is shared between the
    /// foreground and background loops.
    pub async fn stop(&self) {
        if self.publisher.lock().await.take().is_some() {
            tracing::debug!("Publish socket closed");
        }
        let reader = {
            let mut sub = self.lock_subscriber();
            sub.frames = None;
            sub.reader.take()
        };
        if let Some(reader) = reader {
            reader.abort();
            tracing::debug!("Subscribe socket closed");
        }
    }

    /// Fire-and-forget send; no acknowledgement is expected or waited for.
    ///
    /// With no binding the envelope is dropped with a log entry, not an
    /// error - pub/sub semantics, the message simply has nowhere to go yet.
    pub async fn publish(&self, envelope: Envelope) -> Result<(), TransportFault> {
        let mut publisher = self.publisher.lock().await;
        match publisher.as_mut() {
            Some(sink) => {
                sink.send(envelope).await?;
                Ok(())
            }
            None => {
                tracing::debug!("Publish with no binding, dropping envelope");
                Ok(())
            }
        }
    }

    /// Non-blocking poll of the subscribe side.
    ///
    /// Returns immediately whether or not a message is pending. A closed
    /// subscribe socket is surfaced as a fault exactly once; afterwards the
    /// transport counts as unbound until the next `bind`.
    pub fn try_receive(&self) -> Result<Option<Envelope>, TransportFault> {
        let mut sub = self.lock_subscriber();
        let Some(frames) = sub.frames.as_mut() else {
            return Ok(None);
        };
        match frames.try_recv() {
            Ok(item) => item.map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                sub.frames = None;
                Err(TransportFault::Closed)
            }
        }
    }

    fn lock_subscriber(&self) -> std::sync::MutexGuard<'_, Subscriber> {
        self.subscriber
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Decode inbound frames into the receive channel.
///
/// Malformed envelopes are dropped with a log entry and polling continues;
/// only transport-level errors end the task.
async fn subscribe_reader(
    mut frames: FramedRead<TcpStream, MultipartCodec>,
    tx: mpsc::UnboundedSender<Result<Envelope, TransportFault>>,
) {
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(parts) => match Envelope::from_parts(&parts) {
                Ok(envelope) => {
                    if tx.send(Ok(envelope)).is_err() {
                        break;
                    }
                }
                Err(err) => tracing::warn!(error = %err, "Dropping malformed envelope"),
            },
            Err(err) => {
                let _ = tx.send(Err(TransportFault::Io(err)));
                break;
            }
        }
    }
    tracing::trace!("Subscribe reader exiting");
}
