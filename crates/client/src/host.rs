//! Facts about the machine the client runs on

use std::fs;
use std::net::Ipv4Addr;
use tracing::debug;

/// Kernel routing table
const ROUTE_TABLE: &str = "/proc/net/route";

/// `RTF_GATEWAY` route flag
const RTF_GATEWAY: u32 = 0x2;

/// Name of this machine, empty if it cannot be read
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_default()
}

/// Default IPv4 gateway, which from inside a guest is usually the host
pub fn default_gateway() -> Option<Ipv4Addr> {
    match fs::read_to_string(ROUTE_TABLE) {
        Ok(table) => parse_route_table(&table),
        Err(e) => {
            debug!("Cannot read {}: {}", ROUTE_TABLE, e);
            None
        }
    }
}

/// Gateway of the first default route in `/proc/net/route` text
///
/// Addresses in the table are hex in host byte order.
pub fn parse_route_table(table: &str) -> Option<Ipv4Addr> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (destination, gateway, flags) = (fields.get(1)?, fields.get(2)?, fields.get(3)?);
        let flags = u32::from_str_radix(flags, 16).ok()?;
        if *destination != "00000000" || flags & RTF_GATEWAY == 0 {
            return None;
        }
        let gateway = u32::from_str_radix(gateway, 16).ok()?;
        Some(Ipv4Addr::from(gateway.to_le_bytes()))
    })
}
