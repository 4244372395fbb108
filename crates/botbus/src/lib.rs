//! botbus: an interactive console, a routing process, and externally spawned
//! adapters, coordinated over an asynchronous pub/sub message bus.

pub mod bus;
pub mod command;
pub mod console;
pub mod context;
pub mod discovery;
pub mod process;
pub mod router;
pub mod settings;

pub use bus::envelope::{Contents, Envelope, FieldValue, Kind, MalformedEnvelope};
pub use bus::transport::{BusTransport, TransportFault};

pub use command::dispatcher::{DispatchOutcome, Dispatcher, split_line};
pub use command::registry::{
    CommandError, CommandHandler, CommandRegistry, Flow, RESERVED_REMOTE,
};

pub use console::{Console, ConsoleConfig, ConsoleError};
pub use context::{AddressError, BusContext, CurrentContext, parse_address};
pub use discovery::{DirScanDiscovery, Discovery, DiscoveryError, ManifestDiscovery, PluginSpec};
pub use process::{LifecycleError, ProcessManager, StartReport};
pub use router::{Router, RouterError};
pub use settings::{ContextSettings, JsonSettingsStore, SettingsError, SettingsStore};
