//! Common error types
//!
//! Failures are split the way callers need to tell them apart: no session
//! at all, a session that could not be established, a session that broke,
//! and text the protocol layer could not make sense of. A command the
//! hypervisor rejects is not an error; see [`crate::monitor::CommandOutcome`].

use crate::endpoint::Endpoint;
use protocol::ProtocolError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Operation needs a session and none is open
    #[error("Not connected to monitor")]
    NotConnected,

    /// Endpoint answered, but never with a monitor banner
    #[error("Monitor is already in use (gave up after {attempts} attempts)")]
    MonitorInUse { attempts: u32 },

    /// Endpoint could not be reached at all
    #[error("Could not connect to monitor at {endpoint}: {source}")]
    Unreachable {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    /// Connect retries ran past the caller's deadline
    #[error("Connect deadline exceeded after {elapsed:?}")]
    ConnectDeadline { elapsed: Duration },

    /// Peer closed or reset an open session
    #[error("Connection to monitor lost: {0}")]
    ConnectionLost(#[source] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error only means no session was open
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Error::NotConnected)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
