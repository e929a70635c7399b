//! Byte-stream transports to a monitor
//!
//! [`Transport`] is the seam between the session logic and the socket.
//! [`TcpTransport`] talks to a real monitor over TCP; tests substitute
//! [`crate::test_utils::ScriptedTransport`].

use crate::endpoint::Endpoint;
use crate::telnet::TelnetFilter;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Read buffer size for draining the socket
const READ_CHUNK: usize = 4096;

/// Raw stream operations the session builds on
///
/// Implementations do no retrying and keep no connection flag of their
/// own beyond whether a stream is open.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Address this transport connects to
    fn endpoint(&self) -> &Endpoint;

    /// Open a fresh stream, dropping any previous one
    async fn open(&mut self, timeout: Duration) -> io::Result<()>;

    /// Close the stream; a no-op when nothing is open
    async fn close(&mut self) -> io::Result<()>;

    /// Write all bytes to the stream
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Return whatever the peer has sent so far, without waiting
    async fn read_available(&mut self) -> io::Result<Vec<u8>>;
}

fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport is not open")
}

/// TCP transport with telnet negotiation stripped from the stream
#[derive(Debug)]
pub struct TcpTransport {
    endpoint: Endpoint,
    stream: Option<TcpStream>,
    telnet: TelnetFilter,
}

impl TcpTransport {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            stream: None,
            telnet: TelnetFilter::new(),
        }
    }
}

impl Transport for TcpTransport {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn open(&mut self, timeout: Duration) -> io::Result<()> {
        self.stream = None;
        let stream = tokio::time::timeout(timeout, TcpStream::connect(self.endpoint.address()))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(true)?;

        debug!("Opened TCP stream to {}", self.endpoint);
        self.stream = Some(stream);
        self.telnet = TelnetFilter::new();
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        if let Some(mut stream) = self.stream.take() {
            match stream.shutdown().await {
                Ok(()) => {}
                // Peer already went away
                Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
                Err(e) => return Err(e),
            }
            debug!("Closed TCP stream to {}", self.endpoint);
        }
        Ok(())
    }

    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stream = self.stream.as_mut().ok_or_else(not_open)?;
        stream.write_all(bytes).await?;
        stream.flush().await
    }

    async fn read_available(&mut self) -> io::Result<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or_else(not_open)?;
        let mut chunk = [0u8; READ_CHUNK];
        let mut data = Vec::new();
        let mut replies = Vec::new();
        let mut received = 0;

        loop {
            match stream.try_read(&mut chunk) {
                Ok(0) => {
                    if received == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "monitor closed the connection",
                        ));
                    }
                    break;
                }
                Ok(n) => {
                    received += n;
                    self.telnet.feed(&chunk[..n], &mut data, &mut replies);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }

        if !replies.is_empty() {
            trace!("Refusing {} bytes of telnet options", replies.len());
            stream.write_all(&replies).await?;
        }

        Ok(data)
    }
}
