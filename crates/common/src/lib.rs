//! Common runtime pieces for usb-dm
//!
//! This crate provides the I/O half of the monitor client: endpoint
//! parsing, the TCP transport with telnet option handling, the
//! line-oriented session, the reconciling [`Monitor`], error handling,
//! logging setup and test utilities shared by the other crates.

pub mod endpoint;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod session;
pub mod telnet;
pub mod test_utils;
pub mod transport;

pub use endpoint::{DEFAULT_MONITOR_PORT, Endpoint};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use monitor::{BatchReport, CommandOutcome, Monitor};
pub use session::{ConnectOptions, Session, SessionTiming};
pub use transport::{TcpTransport, Transport};
