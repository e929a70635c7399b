//! Line-oriented monitor session
//!
//! The monitor frames nothing: a response is "done" once a short settle
//! delay has passed and the socket buffer has been drained. Every read is
//! therefore a best-effort snapshot of what the monitor has printed so far.
//!
//! The session tracks whether it holds a live, handshaken connection and
//! drops that flag as soon as the peer goes away.

use crate::transport::Transport;
use crate::{Error, Result};
use protocol::is_monitor_banner;
use std::io;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, trace, warn};

/// Default wait between handshake attempts
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_millis(250);

/// Default number of handshake retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default bound on a single TCP connect
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay before draining the socket after a write
pub const READ_SETTLE: Duration = Duration::from_millis(50);

/// Delay after closing, letting the monitor release its single client slot
pub const DISCONNECT_SETTLE: Duration = Duration::from_millis(100);

/// How a session connects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Retry when the endpoint answers without a monitor banner
    pub retry: bool,
    /// Fixed wait between attempts
    pub retry_wait: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Bound on each TCP connect
    pub connect_timeout: Duration,
    /// Bound on the whole connect call, retries included
    pub deadline: Option<Duration>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            retry: true,
            retry_wait: DEFAULT_RETRY_WAIT,
            max_retries: DEFAULT_MAX_RETRIES,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            deadline: None,
        }
    }
}

impl ConnectOptions {
    /// Give up at the first missing banner
    pub fn without_retry(mut self) -> Self {
        self.retry = false;
        self
    }

    pub fn with_retry_wait(mut self, retry_wait: Duration) -> Self {
        self.retry_wait = retry_wait;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Settle delays around reads and disconnects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    pub read_settle: Duration,
    pub disconnect_settle: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            read_settle: READ_SETTLE,
            disconnect_settle: DISCONNECT_SETTLE,
        }
    }
}

impl SessionTiming {
    /// No settle delays, for transports that answer synchronously
    pub fn immediate() -> Self {
        Self {
            read_settle: Duration::ZERO,
            disconnect_settle: Duration::ZERO,
        }
    }
}

/// Errors meaning the peer is gone rather than a local failure
fn is_connection_loss(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

/// A handshaken, line-oriented session over a [`Transport`]
#[derive(Debug)]
pub struct Session<T> {
    transport: T,
    connected: bool,
    timing: SessionTiming,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Self::with_timing(transport, SessionTiming::default())
    }

    pub fn with_timing(transport: T, timing: SessionTiming) -> Self {
        Self {
            transport,
            connected: false,
            timing,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Open the stream and verify the monitor banner
    ///
    /// Returns immediately when already connected. When the banner is
    /// missing (typically because another client holds the monitor) the
    /// stream is closed and, if `options.retry` allows, reopened after
    /// `options.retry_wait`, up to `options.max_retries` more times.
    ///
    /// # Errors
    ///
    /// - [`Error::Unreachable`] when the stream cannot be opened
    /// - [`Error::MonitorInUse`] when retries run out without a banner
    /// - [`Error::ConnectDeadline`] when `options.deadline` would be passed
    /// - [`Error::ConnectionLost`] when the peer drops during the handshake
    pub async fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        if self.connected {
            debug!("Already connected to {}", self.transport.endpoint());
            return Ok(());
        }

        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            if let Err(source) = self.transport.open(options.connect_timeout).await {
                self.connected = false;
                warn!("Could not open {}: {}", self.transport.endpoint(), source);
                return Err(Error::Unreachable {
                    endpoint: self.transport.endpoint().clone(),
                    source,
                });
            }

            let banner = match self.drain().await {
                Ok(banner) => banner,
                Err(e) => {
                    self.close_quietly().await;
                    return Err(Error::ConnectionLost(e));
                }
            };

            if is_monitor_banner(&banner) {
                self.connected = true;
                info!(
                    "Connected to monitor at {} (attempt {})",
                    self.transport.endpoint(),
                    attempts
                );
                return Ok(());
            }

            self.close_quietly().await;

            if !options.retry || attempts > options.max_retries {
                warn!(
                    "No monitor banner from {} after {} attempts",
                    self.transport.endpoint(),
                    attempts
                );
                return Err(Error::MonitorInUse { attempts });
            }

            if let Some(deadline) = options.deadline {
                let elapsed = started.elapsed();
                if elapsed + options.retry_wait > deadline {
                    return Err(Error::ConnectDeadline { elapsed });
                }
            }

            debug!(
                "No monitor banner from {} (attempt {}), retrying in {:?}",
                self.transport.endpoint(),
                attempts,
                options.retry_wait
            );
            sleep(options.retry_wait).await;
        }
    }

    /// Close the stream and wait for the monitor to free its client slot
    pub async fn disconnect(&mut self) {
        self.close_quietly().await;
        info!("Disconnected from monitor at {}", self.transport.endpoint());
        sleep(self.timing.disconnect_settle).await;
    }

    async fn close_quietly(&mut self) {
        self.connected = false;
        if let Err(e) = self.transport.close().await {
            debug!("Error while closing {}: {}", self.transport.endpoint(), e);
        }
    }

    /// Send one line, newline appended
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] without a session; [`Error::ConnectionLost`]
    /// when the peer has gone, after which the session counts as closed.
    pub async fn write_line(&mut self, text: &str) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');

        trace!("> {}", text);
        match self.transport.write_all(line.as_bytes()).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.on_io_error(e)),
        }
    }

    /// Wait the read settle delay, then return everything buffered
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] without a session; [`Error::ConnectionLost`]
    /// when the peer has gone, after which the session counts as closed.
    pub async fn read_available(&mut self) -> Result<String> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        match self.drain().await {
            Ok(text) => Ok(text),
            Err(e) => Err(self.on_io_error(e)),
        }
    }

    /// Read regardless of the connected flag, used during the handshake
    async fn drain(&mut self) -> io::Result<String> {
        sleep(self.timing.read_settle).await;
        let bytes = self.transport.read_available().await?;
        trace!("< {} bytes", bytes.len());
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn on_io_error(&mut self, err: io::Error) -> Error {
        if is_connection_loss(&err) {
            warn!("Lost connection to {}: {}", self.transport.endpoint(), err);
            self.connected = false;
            Error::ConnectionLost(err)
        } else {
            Error::Io(err)
        }
    }
}
