//! Persisted per-context settings.
//!
//! The store is keyed by context name and hands back plain attribute bundles;
//! the console and router only depend on the [`SettingsStore`] trait, so the
//! backing storage is swappable. [`JsonSettingsStore`] is the file-backed
//! implementation shipped here.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::context::BusContext;

/// Attribute bundle for one named context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSettings {
    pub name: String,
    pub publish_address: String,
    pub subscribe_address: String,
    #[serde(default)]
    pub monitor_address: String,
    /// Adapters the router starts at boot, in order.
    #[serde(default)]
    pub starting_adapters: Vec<String>,
    /// Per-adapter argv tokens, applied via the lifecycle manager before start.
    #[serde(default)]
    pub adapter_settings: HashMap<String, Vec<String>>,
}

impl ContextSettings {
    pub fn new(
        name: impl Into<String>,
        publish_address: impl Into<String>,
        subscribe_address: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            publish_address: publish_address.into(),
            subscribe_address: subscribe_address.into(),
            monitor_address: String::new(),
            starting_adapters: Vec::new(),
            adapter_settings: HashMap::new(),
        }
    }

    /// The address pair clients bind to for this context.
    ///
    /// Addresses are named from the client's perspective: clients publish to
    /// `publish_address` and subscribe at `subscribe_address`; the router
    /// listens on both.
    pub fn bus_context(&self) -> BusContext {
        BusContext::new(&self.publish_address, &self.subscribe_address)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("no context named {0:?}")]
    UnknownContext(String),

    #[error("context {0:?} already exists")]
    DuplicateContext(String),

    #[error("settings file error: {0}")]
    Io(#[from] io::Error),

    #[error("settings file is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

/// Storage for context settings, keyed by context name.
pub trait SettingsStore: Send + Sync {
    fn context(&self, name: &str) -> Result<Option<ContextSettings>, SettingsError>;
    fn create(&self, settings: &ContextSettings) -> Result<(), SettingsError>;
    fn update(&self, settings: &ContextSettings) -> Result<(), SettingsError>;
    fn contexts(&self) -> Result<Vec<String>, SettingsError>;
}

/// File-backed store: one JSON object mapping context name to its bundle.
///
/// Reads the whole file on every call - the file is tiny and a console
/// session touches it rarely.
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<BTreeMap<String, ContextSettings>, SettingsError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, contexts: &BTreeMap<String, ContextSettings>) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(contexts)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl SettingsStore for JsonSettingsStore {
    fn context(&self, name: &str) -> Result<Option<ContextSettings>, SettingsError> {
        Ok(self.load()?.get(name).cloned())
    }

    fn create(&self, settings: &ContextSettings) -> Result<(), SettingsError> {
        let mut contexts = self.load()?;
        if contexts.contains_key(&settings.name) {
            return Err(SettingsError::DuplicateContext(settings.name.clone()));
        }
        contexts.insert(settings.name.clone(), settings.clone());
        self.save(&contexts)
    }

    fn update(&self, settings: &ContextSettings) -> Result<(), SettingsError> {
        let mut contexts = self.load()?;
        if !contexts.contains_key(&settings.name) {
            return Err(SettingsError::UnknownContext(settings.name.clone()));
        }
        contexts.insert(settings.name.clone(), settings.clone());
        self.save(&contexts)
    }

    fn contexts(&self) -> Result<Vec<String>, SettingsError> {
        Ok(self.load()?.keys().cloned().collect())
    }
}
