//! Local command registration.
//!
//! The registry answers "is this a known local command" for the dispatcher.
//! The reserved name `commands` is never local: it is meant to be satisfied
//! by the remote side, which returns the live list of everything it
//! understands.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::transport::TransportFault;
use crate::process::LifecycleError;
use crate::settings::SettingsError;

/// Reserved command name, always forwarded over the bus.
pub const RESERVED_REMOTE: &str = "commands";

/// What a handler tells the console loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Transport(#[from] TransportFault),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Usage(String),
}

/// A local command: runs entirely within the console process, no bus traffic.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(&self, args: &str) -> Result<Flow, CommandError>;

    /// Help text shown for `help <name>`.
    fn doc(&self) -> Option<&str> {
        None
    }
}

#[derive(Default)]
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, overwriting any same-name entry.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Look up a handler for local invocation. The reserved name is excluded
    /// even if something registered under it.
    pub fn handler(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        if name == RESERVED_REMOTE {
            return None;
        }
        self.handlers.get(name).cloned()
    }

    pub fn doc(&self, name: &str) -> Option<String> {
        self.handler(name)?.doc().map(str::to_string)
    }

    /// True iff the first whitespace-delimited token of `line` is a
    /// registered local command.
    pub fn is_local(&self, line: &str) -> bool {
        match line.split_whitespace().next() {
            Some(first) => self.handler(first).is_some(),
            None => false,
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl CommandHandler for Noop {
        async fn run(&self, _args: &str) -> Result<Flow, CommandError> {
            Ok(Flow::Continue)
        }

        fn doc(&self) -> Option<&str> {
            Some("does nothing")
        }
    }

    #[test]
    fn first_token_decides_locality() {
        let mut registry = CommandRegistry::new();
        registry.register("context", Arc::new(Noop));

        assert!(registry.is_local("context"));
        assert!(registry.is_local("context testing"));
        assert!(!registry.is_local("status"));
        assert!(!registry.is_local(""));
        assert!(!registry.is_local("   "));
    }

    #[test]
    fn reserved_name_is_never_local() {
        let mut registry = CommandRegistry::new();
        assert!(!registry.is_local(RESERVED_REMOTE));

        // Even an explicit registration does not make it local.
        registry.register(RESERVED_REMOTE, Arc::new(Noop));
        assert!(!registry.is_local(RESERVED_REMOTE));
        assert!(registry.handler(RESERVED_REMOTE).is_none());
    }

    #[test]
    fn registration_overwrites_same_name() {
        let mut registry = CommandRegistry::new();
        registry.register("context", Arc::new(Noop));
        registry.register("context", Arc::new(Noop));
        assert_eq!(registry.names(), vec!["context".to_string()]);
    }

    #[test]
    fn doc_comes_from_the_handler() {
        let mut registry = CommandRegistry::new();
        registry.register("context", Arc::new(Noop));

        assert_eq!(registry.doc("context"), Some("does nothing".to_string()));
        assert_eq!(registry.doc("missing"), None);
    }
}
