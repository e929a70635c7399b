//! Monitor endpoint addresses

use crate::{Error, Result};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

/// Telnet port, used when the endpoint names none
pub const DEFAULT_MONITOR_PORT: u16 = 23;

/// Host and port of a monitor's control socket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Address tuple accepted by `tokio::net::TcpStream::connect`
    pub fn address(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    /// Parse `host:port`; a missing or non-numeric port means port 23
    ///
    /// IPv6 hosts are written in brackets (`[::1]:4444`). A bare IPv6
    /// address is accepted as a host with the default port.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();

        if let Some(rest) = s.strip_prefix('[') {
            let Some((host, tail)) = rest.split_once(']') else {
                return Err(Error::Config(format!("Monitor endpoint '{}' has an unclosed '['", s)));
            };
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(port),
                None if tail.is_empty() => DEFAULT_MONITOR_PORT,
                None => {
                    return Err(Error::Config(format!("Unexpected text after ']' in monitor endpoint '{}'", s)));
                }
            };
            if host.parse::<Ipv6Addr>().is_err() {
                return Err(Error::Config(format!("Monitor endpoint '{}' is not an IPv6 address", s)));
            }
            return Ok(Self::new(host, port));
        }

        if s.parse::<Ipv6Addr>().is_ok() {
            return Ok(Self::new(s, DEFAULT_MONITOR_PORT));
        }

        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => (host, parse_port(port)),
            None => (s, DEFAULT_MONITOR_PORT),
        };

        if host.is_empty() {
            return Err(Error::Config(format!("Monitor endpoint '{}' has no host", s)));
        }
        if host.contains(':') {
            return Err(Error::Config(format!(
                "Monitor endpoint '{}' is ambiguous; write IPv6 hosts as [address]:port",
                s
            )));
        }

        Ok(Self::new(host, port))
    }
}

fn parse_port(port: &str) -> u16 {
    port.parse::<u16>().unwrap_or(DEFAULT_MONITOR_PORT)
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_and_port() {
        let endpoint: Endpoint = "192.168.1.2:4444".parse().unwrap();
        assert_eq!(endpoint, Endpoint::new("192.168.1.2", 4444));
        assert_eq!(endpoint.to_string(), "192.168.1.2:4444");
    }

    #[test]
    fn test_default_port() {
        assert_eq!("localhost".parse::<Endpoint>().unwrap().port, 23);
        assert_eq!("localhost:".parse::<Endpoint>().unwrap().port, 23);
        assert_eq!("localhost:telnet".parse::<Endpoint>().unwrap().port, 23);
    }

    #[test]
    fn test_missing_host() {
        assert!(":4444".parse::<Endpoint>().is_err());
        assert!("".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_ipv6_hosts() {
        let endpoint: Endpoint = "[::1]:4444".parse().unwrap();
        assert_eq!(endpoint, Endpoint::new("::1", 4444));
        assert_eq!(endpoint.to_string(), "[::1]:4444");

        assert_eq!("[fe80::1]".parse::<Endpoint>().unwrap(), Endpoint::new("fe80::1", 23));
        assert_eq!("::1".parse::<Endpoint>().unwrap(), Endpoint::new("::1", 23));
    }

    #[test]
    fn test_malformed_ipv6_hosts() {
        assert!("[::1".parse::<Endpoint>().is_err());
        assert!("[::1]4444".parse::<Endpoint>().is_err());
        assert!("[monitor]:4444".parse::<Endpoint>().is_err());
        assert!("fe80::zz:4444".parse::<Endpoint>().is_err());
    }
}
