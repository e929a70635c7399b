//! Test utilities for usb-dm
//!
//! Provides a scripted transport double, canned monitor listings and
//! helper functions for testing across crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{HOST_LISTING, ScriptedTransport};
//! use protocol::INFO_USBHOST;
//!
//! let transport = ScriptedTransport::new().with_reply(INFO_USBHOST, HOST_LISTING);
//! assert!(transport.writes().is_empty());
//! ```

use crate::endpoint::Endpoint;
use crate::monitor::Monitor;
use crate::session::{ConnectOptions, Session, SessionTiming};
use crate::transport::Transport;
use protocol::Dialect;
use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Banner a monitor prints on connect
pub const QEMU_BANNER: &str = "QEMU 8.2.2 monitor - type 'help' for more information\r\n(qemu) ";

/// `info usbhost` body: a flash drive, a mouse receiver and a keyboard
pub const HOST_LISTING: &str = "  Bus 1, Addr 2, Port 1, Speed 480 Mb/s\r\n    Class 00: USB device 0781:5567, Cruzer Blade\r\n  Bus 1, Addr 3, Port 2, Speed 12 Mb/s\r\n    Class 03: USB device 046d:c52b, USB Receiver\r\n  Bus 2, Addr 4, Port 1.4, Speed 1.5 Mb/s\r\n    Class 03: USB device 413c:2113, Dell KB216 Wired Keyboard\r\n";

/// `info usb` body: the mouse receiver (with alias) and keyboard attached
pub const VM_LISTING: &str = "  Device 0.0, Port 1, Speed 12 Mb/s, Product QEMU USB Tablet\r\n  Device 0.2, Port 2, Speed 12 Mb/s, Product USB Receiver, ID: mouse\r\n  Device 0.3, Port 3, Speed 1.5 Mb/s, Product Dell KB216 Wired Keyboard\r\n";

/// Response of a rejected add
pub const ADD_REJECTED: &str = "could not add USB device 'host:0781:5567'\r\n";

#[derive(Debug)]
struct ScriptState {
    banner: String,
    banners: VecDeque<String>,
    replies: Vec<(String, String)>,
    pending: String,
    writes: Vec<String>,
    opens: u32,
    open: bool,
    refuse: bool,
    broken: bool,
}

/// In-memory [`Transport`] answering commands from a script
///
/// Clones share state, so a test can keep one handle for inspection
/// after moving another into a session. Every written line is recorded.
/// A written command is echoed and followed by the reply registered for
/// the longest matching command prefix, then a `(qemu) ` prompt.
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    endpoint: Endpoint,
    state: Arc<Mutex<ScriptState>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// Transport whose every open yields [`QEMU_BANNER`]
    pub fn new() -> Self {
        Self::with_banner(QEMU_BANNER)
    }

    /// Transport whose every open yields `banner`
    pub fn with_banner(banner: &str) -> Self {
        Self {
            endpoint: Endpoint::new("scripted", 4444),
            state: Arc::new(Mutex::new(ScriptState {
                banner: banner.to_string(),
                banners: VecDeque::new(),
                replies: Vec::new(),
                pending: String::new(),
                writes: Vec::new(),
                opens: 0,
                open: false,
                refuse: false,
                broken: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().expect("script state poisoned")
    }

    /// Answer commands starting with `command` with `response`
    pub fn with_reply(self, command: &str, response: &str) -> Self {
        self.set_reply(command, response);
        self
    }

    /// Replace or register the answer to `command`
    pub fn set_reply(&self, command: &str, response: &str) {
        let mut state = self.state();
        state.replies.retain(|(prefix, _)| prefix != command);
        state.replies.push((command.to_string(), response.to_string()));
    }

    /// Use `banner` for the next open instead of the default
    pub fn queue_banner(&self, banner: &str) {
        self.state().banners.push_back(banner.to_string());
    }

    /// Fail every subsequent open with `ConnectionRefused`
    pub fn refuse_connections(&self) {
        self.state().refuse = true;
    }

    /// Fail every subsequent write and read with `BrokenPipe`
    pub fn break_pipe(&self) {
        self.state().broken = true;
    }

    /// Lines written so far, without newlines
    pub fn writes(&self) -> Vec<String> {
        self.state().writes.clone()
    }

    /// Written lines that are not listing queries
    pub fn commands(&self) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter(|line| !line.starts_with("info "))
            .collect()
    }

    /// Number of successful opens
    pub fn opens(&self) -> u32 {
        self.state().opens
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }
}

impl Transport for ScriptedTransport {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn open(&mut self, _timeout: Duration) -> io::Result<()> {
        let mut state = self.state();
        if state.refuse {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
        }
        state.opens += 1;
        state.open = true;
        state.broken = false;
        let banner = match state.banners.pop_front() {
            Some(banner) => banner,
            None => state.banner.clone(),
        };
        state.pending = banner;
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        let mut state = self.state();
        state.open = false;
        state.pending.clear();
        Ok(())
    }

    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state();
        if state.broken {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        if !state.open {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }

        let line = String::from_utf8_lossy(bytes).trim_end_matches('\n').to_string();
        let reply = state
            .replies
            .iter()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, response)| response.clone())
            .unwrap_or_default();

        state.pending.push_str(&line);
        state.pending.push_str("\r\n");
        state.pending.push_str(&reply);
        state.pending.push_str("(qemu) ");
        state.writes.push(line);
        Ok(())
    }

    async fn read_available(&mut self) -> io::Result<Vec<u8>> {
        let mut state = self.state();
        if state.broken {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        if !state.open {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        Ok(std::mem::take(&mut state.pending).into_bytes())
    }
}

/// Transport preloaded with [`HOST_LISTING`] and [`VM_LISTING`]
pub fn scripted_listings() -> ScriptedTransport {
    ScriptedTransport::new()
        .with_reply(protocol::INFO_USBHOST, HOST_LISTING)
        .with_reply(protocol::INFO_USB, VM_LISTING)
}

/// Monitor over `transport` without settle delays
pub fn scripted_monitor(transport: &ScriptedTransport, dialect: Dialect) -> Monitor<ScriptedTransport> {
    Monitor::new(
        Session::with_timing(transport.clone(), SessionTiming::immediate()),
        dialect,
    )
}

/// Connect options that never sleep between attempts
pub fn fast_connect_options() -> ConnectOptions {
    ConnectOptions::default().with_retry_wait(Duration::ZERO)
}

/// Timeout error for tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutError;

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out")
    }
}

impl std::error::Error for TimeoutError {}

/// Run a future with a timeout
///
/// # Example
/// ```
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// #[tokio::test]
/// async fn test_with_timeout() {
///     let result = with_timeout(DEFAULT_TEST_TIMEOUT, async {
///         42
///     }).await;
///     assert_eq!(result.unwrap(), 42);
/// }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_reply_with_echo() {
        let mut transport = scripted_listings();
        transport.open(DEFAULT_TEST_TIMEOUT).await.unwrap();
        let banner = transport.read_available().await.unwrap();
        assert_eq!(banner, QEMU_BANNER.as_bytes());

        transport.write_all(b"info usb\n").await.unwrap();
        let response = String::from_utf8(transport.read_available().await.unwrap()).unwrap();
        assert!(response.starts_with("info usb\r\n"));
        assert!(response.contains("USB Receiver"));
        assert!(!response.contains("Cruzer Blade"));
        assert!(response.ends_with("(qemu) "));
    }

    #[tokio::test]
    async fn test_longest_prefix_wins() {
        let mut transport = scripted_listings();
        transport.open(DEFAULT_TEST_TIMEOUT).await.unwrap();
        transport.read_available().await.unwrap();

        transport.write_all(b"info usbhost\n").await.unwrap();
        let response = String::from_utf8(transport.read_available().await.unwrap()).unwrap();
        assert!(response.contains("Cruzer Blade"));
    }

    #[tokio::test]
    async fn test_writes_recorded_across_clones() {
        let handle = ScriptedTransport::new();
        let mut transport = handle.clone();
        transport.open(DEFAULT_TEST_TIMEOUT).await.unwrap();
        transport.write_all(b"usb_add host:0781:5567\n").await.unwrap();
        transport.write_all(b"info usb\n").await.unwrap();

        assert_eq!(handle.writes(), vec!["usb_add host:0781:5567", "info usb"]);
        assert_eq!(handle.commands(), vec!["usb_add host:0781:5567"]);
    }

    #[tokio::test]
    async fn test_with_timeout_elapses() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
        })
        .await;
        assert_eq!(result, Err(TimeoutError));
    }
}
