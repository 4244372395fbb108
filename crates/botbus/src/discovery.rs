//! Plugin discovery: resolving installed adapters to `{name, executable}`
//! pairs.
//!
//! The lifecycle manager does not assume any particular discovery mechanism;
//! it only consumes the [`Discovery`] trait. Two implementations ship here: a
//! JSON manifest and a directory scan. A registry service or package index
//! would slot in the same way.

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One discovered plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSpec {
    pub name: String,
    pub executable_path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("discovery failed: {0}")]
    Io(#[from] io::Error),

    #[error("plugin manifest is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

pub trait Discovery: Send + Sync {
    fn discover(&self) -> Result<Vec<PluginSpec>, DiscoveryError>;
}

/// Reads a JSON manifest: an array of `{"name", "executable_path"}` objects.
///
/// A configured-but-missing manifest is an error; an explicitly listed file
/// should exist.
pub struct ManifestDiscovery {
    path: PathBuf,
}

impl ManifestDiscovery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Discovery for ManifestDiscovery {
    fn discover(&self) -> Result<Vec<PluginSpec>, DiscoveryError> {
        let bytes = std::fs::read(&self.path)?;
        let plugins: Vec<PluginSpec> = serde_json::from_slice(&bytes)?;
        tracing::debug!(manifest = %self.path.display(), count = plugins.len(), "Discovered plugins");
        Ok(plugins)
    }
}

/// Treats every executable file directly under a directory as a plugin named
/// after its file stem.
///
/// A missing directory yields no plugins rather than an error, so a fresh
/// installation with nothing deployed yet boots cleanly.
pub struct DirScanDiscovery {
    dir: PathBuf,
}

impl DirScanDiscovery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Discovery for DirScanDiscovery {
    fn discover(&self) -> Result<Vec<PluginSpec>, DiscoveryError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(dir = %self.dir.display(), "Plugin directory missing, nothing discovered");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        let mut plugins = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !is_executable_file(&path)? {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            plugins.push(PluginSpec {
                name: name.to_string(),
                executable_path: path,
            });
        }
        plugins.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::debug!(dir = %self.dir.display(), count = plugins.len(), "Discovered plugins");
        Ok(plugins)
    }
}

#[cfg(unix)]
fn is_executable_file(path: &std::path::Path) -> io::Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = std::fs::metadata(path)?;
    Ok(metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable_file(path: &std::path::Path) -> io::Result<bool> {
    Ok(std::fs::metadata(path)?.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_discovery_reads_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("plugins.json");
        std::fs::write(
            &manifest,
            r#"[
                {"name": "irc", "executable_path": "/opt/adapters/irc"},
                {"name": "xmpp", "executable_path": "/opt/adapters/xmpp"}
            ]"#,
        )
        .unwrap();

        let plugins = ManifestDiscovery::new(&manifest).discover().unwrap();
        assert_eq!(plugins.len(), 2);
        assert_eq!(plugins[0].name, "irc");
        assert_eq!(plugins[1].executable_path, PathBuf::from("/opt/adapters/xmpp"));
    }

    #[test]
    fn manifest_discovery_requires_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ManifestDiscovery::new(dir.path().join("missing.json"))
            .discover()
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Io(_)));
    }

    #[cfg(unix)]
    #[test]
    fn dir_scan_finds_executables_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("irc");
        std::fs::write(&exe, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a plugin").unwrap();

        let plugins = DirScanDiscovery::new(dir.path()).discover().unwrap();
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].name, "irc");
        assert_eq!(plugins[0].executable_path, exe);
    }

    #[test]
    fn dir_scan_tolerates_a_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let plugins = DirScanDiscovery::new(dir.path().join("nowhere"))
            .discover()
            .unwrap();
        assert!(plugins.is_empty());
    }
}
