//! Built-in local commands: context switching, settings editing, and
//! launching a router for the current context.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::transport::BusTransport;
use crate::command::registry::{CommandError, CommandHandler, Flow};
use crate::context::CurrentContext;
use crate::settings::{ContextSettings, SettingsStore};

use super::render;

const DEFAULT_PUBLISH_ADDRESS: &str = "tcp://127.0.0.1:4000";
const DEFAULT_SUBSCRIBE_ADDRESS: &str = "tcp://127.0.0.1:4001";

/// State the built-in commands operate on.
#[derive(Clone)]
pub(crate) struct Shared {
    pub store: Arc<dyn SettingsStore>,
    pub transport: Arc<BusTransport>,
    pub current: Arc<CurrentContext>,
}

impl Shared {
    /// Bind the transport to a stored context and remember its name.
    ///
    /// An unknown context is a user-facing message, not an error.
    pub async fn switch(&self, name: &str) -> Result<(), CommandError> {
        let Some(settings) = self.store.context(name)? else {
            println!("no stored context named {name:?}");
            return Ok(());
        };
        self.transport.bind(&settings.bus_context()).await?;
        self.current.set(name);
        println!("context: {name}");
        Ok(())
    }

    /// Re-bind after a settings change when `name` is the active context.
    async fn rebind_if_current(&self, name: &str) -> Result<(), CommandError> {
        if self.current.get().as_deref() == Some(name) {
            self.switch(name).await?;
        }
        Ok(())
    }
}

/// `context [name]` - show the active context, or switch to another one.
pub(crate) struct ContextCommand(pub Shared);

#[async_trait]
impl CommandHandler for ContextCommand {
    async fn run(&self, args: &str) -> Result<Flow, CommandError> {
        if args.is_empty() {
            match self.0.current.get() {
                Some(name) => println!("\n{name}\n"),
                None => println!("\nNONE SET\n"),
            }
        } else {
            self.0.switch(args).await?;
        }
        Ok(Flow::Continue)
    }

    fn doc(&self) -> Option<&str> {
        Some("show the active context, or `context <name>` to switch")
    }
}

/// `contexts [name]` - list stored contexts, or switch if one is named.
pub(crate) struct ContextsCommand(pub Shared);

#[async_trait]
impl CommandHandler for ContextsCommand {
    async fn run(&self, args: &str) -> Result<Flow, CommandError> {
        if args.is_empty() {
            let names = self.0.store.contexts()?;
            print!("\n{}", render::section("contexts", names.iter()));
        } else {
            self.0.switch(args).await?;
        }
        Ok(Flow::Continue)
    }

    fn doc(&self) -> Option<&str> {
        Some("list stored contexts, or `contexts <name>` to switch")
    }
}

/// `create_context <name> [key=value ...]` - store a new context bundle.
pub(crate) struct CreateContextCommand(pub Shared);

#[async_trait]
impl CommandHandler for CreateContextCommand {
    async fn run(&self, args: &str) -> Result<Flow, CommandError> {
        let (name, overrides) = parse_settings_args(args)?;
        let mut settings =
            ContextSettings::new(name, DEFAULT_PUBLISH_ADDRESS, DEFAULT_SUBSCRIBE_ADDRESS);
        for (key, value) in overrides {
            apply_setting(&mut settings, key, value)?;
        }
        self.0.store.create(&settings)?;
        println!("created context {name:?}");
        self.0.rebind_if_current(name).await?;
        Ok(Flow::Continue)
    }

    fn doc(&self) -> Option<&str> {
        Some(
            "create_context <name> [publish_address=..] [subscribe_address=..] \
             [monitor_address=..] [starting_adapters=a,b]",
        )
    }
}

/// `update_context <name> [key=value ...]` - edit a stored context bundle.
pub(crate) struct UpdateContextCommand(pub Shared);

#[async_trait]
impl CommandHandler for UpdateContextCommand {
    async fn run(&self, args: &str) -> Result<Flow, CommandError> {
        let (name, overrides) = parse_settings_args(args)?;
        let Some(mut settings) = self.0.store.context(name)? else {
            println!("no stored context named {name:?}");
            return Ok(Flow::Continue);
        };
        for (key, value) in overrides {
            apply_setting(&mut settings, key, value)?;
        }
        self.0.store.update(&settings)?;
        println!("updated context {name:?}");
        self.0.rebind_if_current(name).await?;
        Ok(Flow::Continue)
    }

    fn doc(&self) -> Option<&str> {
        Some("update_context <name> [key=value ...]; re-binds if the context is active")
    }
}

/// `start_bot [context]` - spawn a router process for a context.
pub(crate) struct StartBotCommand {
    pub current: Arc<CurrentContext>,
    pub router_bin: PathBuf,
    pub settings_path: Option<PathBuf>,
}

#[async_trait]
impl CommandHandler for StartBotCommand {
    async fn run(&self, args: &str) -> Result<Flow, CommandError> {
        let context = if args.is_empty() {
            self.current.get().unwrap_or_else(|| "default".to_string())
        } else {
            args.to_string()
        };

        let mut command = tokio::process::Command::new(&self.router_bin);
        command.arg("--context").arg(&context).stdin(Stdio::null());
        if let Some(path) = &self.settings_path {
            command.arg("--settings").arg(path);
        }
        let child = command.spawn()?;

        tracing::info!(context = %context, pid = child.id(), "Router spawned");
        println!("router starting for context {context:?}");
        Ok(Flow::Continue)
    }

    fn doc(&self) -> Option<&str> {
        Some("spawn a router for the given context (default: the active one)")
    }
}

fn parse_settings_args(args: &str) -> Result<(&str, Vec<(&str, &str)>), CommandError> {
    let mut tokens = args.split_whitespace();
    let name = tokens
        .next()
        .ok_or_else(|| CommandError::Usage("a context name is required".to_string()))?;

    let mut overrides = Vec::new();
    for token in tokens {
        let (key, value) = token.split_once('=').ok_or_else(|| {
            CommandError::Usage(format!("expected key=value, got {token:?}"))
        })?;
        overrides.push((key, value));
    }
    Ok((name, overrides))
}

fn apply_setting(
    settings: &mut ContextSettings,
    key: &str,
    value: &str,
) -> Result<(), CommandError> {
    match key {
        "publish_address" => settings.publish_address = value.to_string(),
        "subscribe_address" => settings.subscribe_address = value.to_string(),
        "monitor_address" => settings.monitor_address = value.to_string(),
        "starting_adapters" => {
            settings.starting_adapters = value
                .split(',')
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
        _ => return Err(CommandError::Usage(format!("unknown setting {key:?}"))),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::JsonSettingsStore;
    use tokio::net::TcpListener;

    async fn shared_with_store() -> (tempfile::TempDir, Shared) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonSettingsStore::new(dir.path().join("settings.json")));
        let shared = Shared {
            store,
            transport: Arc::new(BusTransport::new()),
            current: Arc::new(CurrentContext::new()),
        };
        (dir, shared)
    }

    #[tokio::test]
    async fn switching_binds_and_remembers_the_context() {
        let (_dir, shared) = shared_with_store().await;

        let pub_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let sub_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let settings = ContextSettings::new(
            "testing",
            pub_listener.local_addr().unwrap().to_string(),
            sub_listener.local_addr().unwrap().to_string(),
        );
        shared.store.create(&settings).unwrap();

        ContextCommand(shared.clone()).run("testing").await.unwrap();

        assert_eq!(shared.current.get(), Some("testing".to_string()));
        assert!(pub_listener.accept().await.is_ok());
    }

    #[tokio::test]
    async fn switching_to_an_unknown_context_changes_nothing() {
        let (_dir, shared) = shared_with_store().await;

        ContextCommand(shared.clone()).run("ghost").await.unwrap();
        assert_eq!(shared.current.get(), None);
    }

    #[tokio::test]
    async fn create_context_stores_the_bundle() {
        let (_dir, shared) = shared_with_store().await;

        CreateContextCommand(shared.clone())
            .run("dev publish_address=tcp://127.0.0.1:5000 starting_adapters=irc,xmpp")
            .await
            .unwrap();

        let stored = shared.store.context("dev").unwrap().unwrap();
        assert_eq!(stored.publish_address, "tcp://127.0.0.1:5000");
        assert_eq!(stored.subscribe_address, DEFAULT_SUBSCRIBE_ADDRESS);
        assert_eq!(
            stored.starting_adapters,
            vec!["irc".to_string(), "xmpp".to_string()]
        );
    }

    #[tokio::test]
    async fn update_context_requires_an_existing_bundle() {
        let (_dir, shared) = shared_with_store().await;

        UpdateContextCommand(shared.clone())
            .run("ghost monitor_address=tcp://127.0.0.1:6000")
            .await
            .unwrap();
        assert!(shared.store.contexts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_setting_key_is_a_usage_error() {
        let (_dir, shared) = shared_with_store().await;

        let err = CreateContextCommand(shared.clone())
            .run("dev color=green")
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Usage(_)));
    }

    #[tokio::test]
    async fn start_bot_surfaces_spawn_failures() {
        let current = Arc::new(CurrentContext::new());
        let command = StartBotCommand {
            current,
            router_bin: PathBuf::from("/nonexistent/botbus-router"),
            settings_path: None,
        };

        let err = command.run("default").await.unwrap_err();
        assert!(matches!(err, CommandError::Io(_)));
    }

    #[test]
    fn settings_args_parse_name_then_pairs() {
        let (name, overrides) = parse_settings_args("dev a=1 b=two").unwrap();
        assert_eq!(name, "dev");
        assert_eq!(overrides, vec![("a", "1"), ("b", "two")]);

        assert!(parse_settings_args("").is_err());
        assert!(parse_settings_args("dev not-a-pair").is_err());
    }
}
