//! Bus context: the address pair identifying which router instance the
//! console currently talks to.
//!
//! Exactly one context is active at a time. The context value is owned by the
//! console and passed explicitly into [`BusTransport::bind`] - there is no
//! ambient global.
//!
//! [`BusTransport::bind`]: crate::bus::transport::BusTransport::bind

/// Address pair for one router instance.
///
/// Addresses accept `tcp://host:port` or bare `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusContext {
    /// Where this process publishes (the router's inbound endpoint).
    pub publish_address: String,
    /// Where this process subscribes (the router's outbound endpoint).
    pub subscribe_address: String,
}

impl BusContext {
    pub fn new(publish_address: impl Into<String>, subscribe_address: impl Into<String>) -> Self {
        Self {
            publish_address: publish_address.into(),
            subscribe_address: subscribe_address.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid bus address {addr:?}: {reason}")]
pub struct AddressError {
    pub addr: String,
    pub reason: &'static str,
}

/// Normalize a bus address to a `host:port` pair suitable for socket connects.
pub fn parse_address(addr: &str) -> Result<String, AddressError> {
    let bare = addr.strip_prefix("tcp://").unwrap_or(addr);
    let err = |reason| AddressError {
        addr: addr.to_string(),
        reason,
    };

    let (host, port) = bare.rsplit_once(':').ok_or_else(|| err("missing port"))?;
    if host.is_empty() {
        return Err(err("missing host"));
    }
    if port.parse::<u16>().is_err() {
        return Err(err("port is not a number"));
    }
    Ok(bare.to_string())
}

/// Name of the currently-bound context, shared between the dispatcher and the
/// context-switching commands.
#[derive(Debug, Default)]
pub struct CurrentContext(std::sync::Mutex<Option<String>>);

impl CurrentContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.lock().clone()
    }

    pub fn set(&self, name: impl Into<String>) {
        *self.lock() = Some(name.into());
    }

    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheme_prefixed_address() {
        assert_eq!(
            parse_address("tcp://127.0.0.1:4000").unwrap(),
            "127.0.0.1:4000"
        );
    }

    #[test]
    fn parses_bare_address() {
        assert_eq!(parse_address("localhost:4001").unwrap(), "localhost:4001");
    }

    #[test]
    fn rejects_missing_port() {
        assert!(parse_address("tcp://127.0.0.1").is_err());
        assert!(parse_address("127.0.0.1:robot").is_err());
        assert!(parse_address(":4000").is_err());
    }

    #[test]
    fn current_context_tracks_name() {
        let current = CurrentContext::new();
        assert!(!current.is_set());
        assert_eq!(current.get(), None);

        current.set("default");
        assert!(current.is_set());
        assert_eq!(current.get(), Some("default".to_string()));
    }
}
