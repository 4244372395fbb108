//! Subprocess lifecycle manager for adapter/plugin processes.
//!
//! Registrations come from plugin discovery at startup; settings accumulate
//! per name until `start` spawns the executable with those tokens as its
//! argument list. Handles are tracked per name until the process exits or
//! the manager is torn down.
//!
//! There is no restart or backoff policy: a crashed adapter is observed only
//! as silence on the bus.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("no registration named {0:?}")]
    UnknownRegistration(String),

    #[error("failed to spawn {name:?}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
struct Registration {
    executable: PathBuf,
    settings: Vec<String>,
}

/// Per-name outcome of a batch `start`.
///
/// One bad name never prevents the others from starting; failures are
/// reported here instead of aborting the batch.
#[derive(Debug, Default)]
pub struct StartReport {
    pub started: Vec<String>,
    pub failed: Vec<(String, LifecycleError)>,
}

impl StartReport {
    pub fn all_started(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Default)]
pub struct ProcessManager {
    registered: HashMap<String, Registration>,
    running: HashMap<String, Child>,
}

impl ProcessManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-register name -> executable pairs, overwriting same-name entries.
    pub fn register<I, S>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (S, PathBuf)>,
        S: Into<String>,
    {
        for (name, executable) in pairs {
            let name = name.into();
            tracing::debug!(name = %name, executable = %executable.display(), "Registered adapter");
            self.registered.insert(
                name,
                Registration {
                    executable,
                    settings: Vec::new(),
                },
            );
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registered.contains_key(name)
    }

    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registered.keys().cloned().collect();
        names.sort();
        names
    }

    /// Replace the accumulated settings for a registration.
    pub fn update(&mut self, name: &str, settings: Vec<String>) -> Result<(), LifecycleError> {
        match self.registered.get_mut(name) {
            Some(registration) => {
                registration.settings = settings;
                Ok(())
            }
            None => Err(LifecycleError::UnknownRegistration(name.to_string())),
        }
    }

    pub fn settings(&self, name: &str) -> Option<&[String]> {
        self.registered
            .get(name)
            .map(|registration| registration.settings.as_slice())
    }

    /// Spawn each named registration with its settings as the argument list.
    ///
    /// Starting an already-running name replaces the tracked handle; the old
    /// process is killed first so there is one handle per name.
    pub fn start<I, S>(&mut self, names: I) -> StartReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = StartReport::default();
        for name in names {
            let name = name.as_ref();
            match self.start_one(name) {
                Ok(()) => report.started.push(name.to_string()),
                Err(err) => {
                    tracing::warn!(name = %name, error = %err, "Adapter failed to start");
                    report.failed.push((name.to_string(), err));
                }
            }
        }
        report
    }

    fn start_one(&mut self, name: &str) -> Result<(), LifecycleError> {
        let registration = self
            .registered
            .get(name)
            .ok_or_else(|| LifecycleError::UnknownRegistration(name.to_string()))?;

        let child = Command::new(&registration.executable)
            .args(&registration.settings)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LifecycleError::Spawn {
                name: name.to_string(),
                source,
            })?;

        tracing::info!(
            name = %name,
            executable = %registration.executable.display(),
            pid = child.id(),
            "Adapter started"
        );

        if let Some(mut previous) = self.running.insert(name.to_string(), child) {
            if previous.try_wait().ok().flatten().is_none() {
                let _ = previous.start_kill();
            }
        }
        Ok(())
    }

    /// Names with live handles. Exited children are reaped and forgotten.
    pub fn running(&mut self) -> Vec<String> {
        self.running
            .retain(|name, child| match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(name = %name, %status, "Adapter exited");
                    false
                }
                Ok(None) => true,
                Err(err) => {
                    tracing::warn!(name = %name, error = %err, "Failed to poll adapter");
                    false
                }
            });
        let mut names: Vec<String> = self.running.keys().cloned().collect();
        names.sort();
        names
    }

    /// Terminate every tracked process. Idempotent; processes that already
    /// exited are skipped without error.
    pub fn stop_all(&mut self) {
        for (name, mut child) in self.running.drain() {
            match child.try_wait() {
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => {
                    tracing::info!(name = %name, "Stopping adapter");
                    if let Err(err) = child.start_kill() {
                        tracing::warn!(name = %name, error = %err, "Failed to kill adapter");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleeper() -> PathBuf {
        PathBuf::from("/bin/sleep")
    }

    #[tokio::test]
    async fn update_unknown_registration_fails_and_changes_nothing() {
        let mut manager = ProcessManager::new();
        manager.register([("real", sleeper())]);

        let err = manager
            .update("ghost", vec!["--x".to_string()])
            .unwrap_err();
        assert!(matches!(err, LifecycleError::UnknownRegistration(name) if name == "ghost"));
        assert!(!manager.is_registered("ghost"));
        assert!(manager.settings("real").unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_replaces_settings() {
        let mut manager = ProcessManager::new();
        manager.register([("real", sleeper())]);

        manager
            .update("real", vec!["30".to_string()])
            .unwrap();
        assert_eq!(manager.settings("real"), Some(&["30".to_string()][..]));

        manager.update("real", vec!["60".to_string()]).unwrap();
        assert_eq!(manager.settings("real"), Some(&["60".to_string()][..]));
    }

    #[tokio::test]
    async fn start_tolerates_partial_failure() {
        let mut manager = ProcessManager::new();
        manager.register([("sleeper", sleeper())]);
        manager.update("sleeper", vec!["30".to_string()]).unwrap();

        let report = manager.start(["sleeper", "ghost"]);

        assert_eq!(report.started, vec!["sleeper".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "ghost");
        assert!(matches!(
            report.failed[0].1,
            LifecycleError::UnknownRegistration(_)
        ));
        assert!(!report.all_started());

        assert_eq!(manager.running(), vec!["sleeper".to_string()]);
        manager.stop_all();
    }

    #[tokio::test]
    async fn spawn_failure_is_reported_per_name() {
        let mut manager = ProcessManager::new();
        manager.register([("broken", PathBuf::from("/nonexistent/adapter"))]);

        let report = manager.start(["broken"]);
        assert!(report.started.is_empty());
        assert!(matches!(report.failed[0].1, LifecycleError::Spawn { .. }));
        assert!(manager.running().is_empty());
    }

    #[tokio::test]
    async fn stop_all_is_idempotent() {
        let mut manager = ProcessManager::new();
        manager.register([("sleeper", sleeper())]);
        manager.update("sleeper", vec!["30".to_string()]).unwrap();
        assert!(manager.start(["sleeper"]).all_started());

        manager.stop_all();
        assert!(manager.running().is_empty());
        manager.stop_all();
    }

    #[tokio::test]
    async fn exited_children_are_reaped() {
        let mut manager = ProcessManager::new();
        manager.register([("quick", PathBuf::from("/bin/true"))]);
        assert!(manager.start(["quick"]).all_started());

        // Give the child a moment to exit, then observe the reap.
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            if manager.running().is_empty() {
                return;
            }
        }
        panic!("child was never reaped");
    }
}
