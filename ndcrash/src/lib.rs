//! Out-of-process crash reporting client.
//!
//! [`init`] takes over the fatal signals. When one of them fires, the handler
//! puts the previous disposition back, captures a [`CrashRecord`] and sends
//! it to the collector listening on an abstract `AF_UNIX` socket, blocking
//! until that collector acknowledges. Returning from the handler then lets
//! the previous disposition handle the fault as it normally would.

pub mod capture;
pub mod config;
pub mod error;
mod handler;
pub mod lifecycle;
pub mod registry;
pub mod transport;

pub use config::{AbstractAddress, ReporterConfig};
pub use error::{ConfigError, DeliveryError, DeliveryResult, InitError};
pub use lifecycle::{deinit, init, init_with, is_initialized};
pub use ndcrash_common::{CONTEXT_SIZE, CrashRecord, DEFAULT_SOCKET_NAME, MONITORED_SIGNALS};
pub use transport::deliver;
