//! Input dispatch: local handler vs. forward-to-bus.
//!
//! A line of input is split on the first whitespace run into `(command,
//! args)`, keeping the full original line for relay. Registered local
//! commands run in-process with no bus traffic; everything else is packaged
//! into a `CMD` envelope and published. `help` resolves locally when the
//! topic has attached documentation and forwards otherwise.

use std::sync::Arc;

use crate::bus::envelope::Envelope;
use crate::bus::transport::BusTransport;
use crate::console::render;
use crate::context::CurrentContext;

use super::registry::{CommandError, CommandRegistry, Flow, RESERVED_REMOTE};

/// Split a line into its command token and remaining argument text.
pub fn split_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line.split_once(char::is_whitespace) {
        Some((command, rest)) => Some((command, rest.trim_start())),
        None => Some((line, "")),
    }
}

/// What happened to a dispatched line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handled in-process.
    Handled(Flow),
    /// Published as a `CMD` envelope. `missing_context` flags that no bus
    /// context was bound at the time - the command went out anyway, but it
    /// will vanish unacknowledged unless a router is listening, and the
    /// console must make that obvious.
    Forwarded { missing_context: bool },
}

pub struct Dispatcher {
    registry: CommandRegistry,
    transport: Arc<BusTransport>,
    current: Arc<CurrentContext>,
    source: String,
}

impl Dispatcher {
    pub fn new(
        registry: CommandRegistry,
        transport: Arc<BusTransport>,
        current: Arc<CurrentContext>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            transport,
            current,
            source: source.into(),
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub async fn dispatch(&self, line: &str) -> Result<DispatchOutcome, CommandError> {
        let Some((command, args)) = split_line(line) else {
            return Ok(DispatchOutcome::Handled(Flow::Continue));
        };

        if command == "help" {
            return self.help(args, line).await;
        }

        if let Some(handler) = self.registry.handler(command) {
            let flow = handler.run(args).await?;
            return Ok(DispatchOutcome::Handled(flow));
        }

        self.forward(command, args, line).await
    }

    /// `help` with no topic lists local commands; a topic with local
    /// documentation is answered directly; anything else is forwarded and the
    /// remote side answers as an ordinary `RSP`.
    async fn help(&self, topic: &str, line: &str) -> Result<DispatchOutcome, CommandError> {
        if topic.is_empty() {
            let mut names = self.registry.names();
            names.push("help".to_string());
            names.push(RESERVED_REMOTE.to_string());
            names.sort();
            names.dedup();
            print!("{}", render::section("Commands", names.iter()));
            return Ok(DispatchOutcome::Handled(Flow::Continue));
        }

        if let Some(doc) = self.registry.doc(topic) {
            println!("{doc}");
            return Ok(DispatchOutcome::Handled(Flow::Continue));
        }

        self.forward("help", topic, line).await
    }

    async fn forward(
        &self,
        command: &str,
        args: &str,
        line: &str,
    ) -> Result<DispatchOutcome, CommandError> {
        tracing::debug!(command = %command, "Forwarding command over the bus");
        self.transport
            .publish(Envelope::command(&self.source, command, args, line.trim()))
            .await?;
        Ok(DispatchOutcome::Forwarded {
            missing_context: !self.current.is_set(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::codec::MultipartCodec;
    use crate::bus::envelope::Contents;
    use crate::command::registry::CommandHandler;
    use crate::context::BusContext;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_util::codec::FramedRead;

    struct Counter(AtomicUsize);

    #[async_trait]
    impl CommandHandler for Counter {
        async fn run(&self, _args: &str) -> Result<Flow, CommandError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Flow::Continue)
        }
    }

    async fn bound_dispatcher(
        registry: CommandRegistry,
    ) -> (Dispatcher, TcpListener, Arc<CurrentContext>) {
        let pub_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let sub_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let context = BusContext::new(
            pub_listener.local_addr().unwrap().to_string(),
            sub_listener.local_addr().unwrap().to_string(),
        );

        let transport = Arc::new(BusTransport::new());
        transport.bind(&context).await.unwrap();

        let current = Arc::new(CurrentContext::new());
        let dispatcher = Dispatcher::new(registry, transport, Arc::clone(&current), "console");
        (dispatcher, pub_listener, current)
    }

    #[test]
    fn split_line_takes_the_first_token() {
        assert_eq!(split_line("foo bar baz"), Some(("foo", "bar baz")));
        assert_eq!(split_line("foo"), Some(("foo", "")));
        assert_eq!(split_line("  foo   bar  "), Some(("foo", "bar")));
        assert_eq!(split_line(""), None);
        assert_eq!(split_line("   "), None);
    }

    #[tokio::test]
    async fn unregistered_command_forwards_exactly_one_envelope() {
        let (dispatcher, pub_listener, _current) = bound_dispatcher(CommandRegistry::new()).await;

        let outcome = dispatcher.dispatch("foo bar").await.unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Forwarded {
                missing_context: true
            }
        );

        let (accepted, _) = pub_listener.accept().await.unwrap();
        let mut frames = FramedRead::new(accepted, MultipartCodec::new());
        let parts = frames.next().await.unwrap().unwrap();
        let envelope = Envelope::from_parts(&parts).unwrap();

        assert_eq!(envelope.source, "console");
        match envelope.contents {
            Contents::Command {
                command,
                args,
                line,
            } => {
                assert_eq!(command, "foo");
                assert_eq!(args, "bar");
                assert_eq!(line, "foo bar");
            }
            Contents::Response { .. } => panic!("wrong kind"),
        }

        // Exactly one publish: nothing else shows up on the socket.
        let more = tokio::time::timeout(Duration::from_millis(100), frames.next()).await;
        assert!(more.is_err());
    }

    #[tokio::test]
    async fn local_command_produces_no_bus_traffic() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let mut registry = CommandRegistry::new();
        registry.register("tally", Arc::clone(&counter) as Arc<dyn CommandHandler>);

        let (dispatcher, pub_listener, _current) = bound_dispatcher(registry).await;

        let outcome = dispatcher.dispatch("tally up").await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Handled(Flow::Continue));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        let (accepted, _) = pub_listener.accept().await.unwrap();
        let mut frames = FramedRead::new(accepted, MultipartCodec::new());
        let nothing = tokio::time::timeout(Duration::from_millis(100), frames.next()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn reserved_name_is_forwarded() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let mut registry = CommandRegistry::new();
        registry.register(RESERVED_REMOTE, Arc::clone(&counter) as Arc<dyn CommandHandler>);

        let (dispatcher, pub_listener, current) = bound_dispatcher(registry).await;
        current.set("default");

        let outcome = dispatcher.dispatch("commands").await.unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Forwarded {
                missing_context: false
            }
        );
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);

        let (accepted, _) = pub_listener.accept().await.unwrap();
        let mut frames = FramedRead::new(accepted, MultipartCodec::new());
        let parts = frames.next().await.unwrap().unwrap();
        match Envelope::from_parts(&parts).unwrap().contents {
            Contents::Command { command, .. } => assert_eq!(command, RESERVED_REMOTE),
            Contents::Response { .. } => panic!("wrong kind"),
        }
    }

    #[tokio::test]
    async fn help_with_unknown_topic_is_forwarded() {
        let (dispatcher, pub_listener, _current) = bound_dispatcher(CommandRegistry::new()).await;

        let outcome = dispatcher.dispatch("help weather").await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Forwarded { .. }));

        let (accepted, _) = pub_listener.accept().await.unwrap();
        let mut frames = FramedRead::new(accepted, MultipartCodec::new());
        let parts = frames.next().await.unwrap().unwrap();
        match Envelope::from_parts(&parts).unwrap().contents {
            Contents::Command { command, args, .. } => {
                assert_eq!(command, "help");
                assert_eq!(args, "weather");
            }
            Contents::Response { .. } => panic!("wrong kind"),
        }
    }

    #[tokio::test]
    async fn help_with_documented_topic_stays_local() {
        struct Documented;

        #[async_trait]
        impl CommandHandler for Documented {
            async fn run(&self, _args: &str) -> Result<Flow, CommandError> {
                Ok(Flow::Continue)
            }

            fn doc(&self) -> Option<&str> {
                Some("switch the active context")
            }
        }

        let mut registry = CommandRegistry::new();
        registry.register("context", Arc::new(Documented));
        let (dispatcher, pub_listener, _current) = bound_dispatcher(registry).await;

        let outcome = dispatcher.dispatch("help context").await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Handled(Flow::Continue));

        let (accepted, _) = pub_listener.accept().await.unwrap();
        let mut frames = FramedRead::new(accepted, MultipartCodec::new());
        let nothing = tokio::time::timeout(Duration::from_millis(100), frames.next()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn blank_lines_are_ignored() {
        let (dispatcher, _pub_listener, _current) = bound_dispatcher(CommandRegistry::new()).await;
        let outcome = dispatcher.dispatch("   ").await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Handled(Flow::Continue));
    }
}
