//! Parsers for the monitor's USB listings
//!
//! Neither listing is framed or structured. Data lines are indented with
//! at least one space; everything else (banner, prompt, echoed command) is
//! skipped. A data line is a comma-separated list of `Key value` elements.
//!
//! `info usb` prints one line per device attached to the VM:
//!
//! ```text
//!   Device 0.2, Port 1, Speed 480 Mb/s, Product Cruzer Blade, ID: stick
//! ```
//!
//! `info usbhost` prints two lines per device visible to the host:
//!
//! ```text
//!   Bus 1, Addr 2, Port 1, Speed 480 Mb/s
//!     Class 00: USB device 0781:5567, Cruzer Blade
//! ```

use crate::error::{ProtocolError, Result};
use crate::record::DeviceRecord;
use tracing::trace;

/// Length of a `vvvv:pppp` identifier at the end of a `Class` line
const HOST_ID_LEN: usize = 9;

/// Element prefix marking an operator-assigned alias in `info usb`
const USER_ID_KEY: &str = "id:";

/// Data lines of a listing, trimmed, in order
fn data_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .filter(|line| line.starts_with(' '))
        .map(str::trim)
        .filter(|line| !line.is_empty())
}

/// Split a trimmed data line into its comma-separated elements
pub fn split_elements(line: &str) -> Vec<&str> {
    line.split(',')
        .map(|element| element.strip_prefix(' ').unwrap_or(element))
        .filter(|element| !element.is_empty())
        .collect()
}

/// Split one element into a lower-case key and its value
///
/// The key is the text up to the first space; the value is everything
/// after it. An element without a space is a key with an empty value.
pub fn parse_attribute(element: &str) -> (String, &str) {
    match element.split_once(' ') {
        Some((key, value)) => (key.to_lowercase(), value),
        None => (element.to_lowercase(), ""),
    }
}

fn parse_record(elements: &[&str]) -> DeviceRecord {
    let mut record = DeviceRecord::new();
    for element in elements {
        let (key, value) = parse_attribute(element);
        if key == USER_ID_KEY {
            record.set("userid", value);
        } else {
            record.set(&key, value);
        }
    }
    record
}

/// Last `HOST_ID_LEN` characters of `text`
fn trailing_id(text: &str) -> &str {
    let start = text
        .char_indices()
        .rev()
        .nth(HOST_ID_LEN - 1)
        .map(|(index, _)| index)
        .unwrap_or(0);
    &text[start..]
}

/// Parse an `info usb` response into one record per attached device
pub fn parse_vm_devices(text: &str) -> Vec<DeviceRecord> {
    data_lines(text)
        .map(|line| {
            let record = parse_record(&split_elements(line));
            trace!(?record, "Parsed VM device line");
            record
        })
        .collect()
}

/// Parse an `info usbhost` response into one record per host device
///
/// A `Bus` line starts a record. The `Class` line that follows sets its
/// `product` (second element) and `id` (last nine characters of the first
/// element). A `Class` line with no product name leaves `product` unset.
///
/// # Errors
///
/// [`ProtocolError::OrphanContinuation`] when a `Class` line comes before
/// any `Bus` line.
pub fn parse_host_devices(text: &str) -> Result<Vec<DeviceRecord>> {
    let mut records: Vec<DeviceRecord> = Vec::new();

    for line in data_lines(text) {
        let elements = split_elements(line);
        let Some(first) = elements.first() else {
            continue;
        };

        if first.starts_with('B') {
            records.push(parse_record(&elements));
        } else if first.starts_with('C') {
            let record = records
                .last_mut()
                .ok_or_else(|| ProtocolError::OrphanContinuation {
                    line: line.to_string(),
                })?;
            if let Some(product) = elements.get(1) {
                record.set("product", *product);
            }
            record.set("id", trailing_id(first));
        }
    }

    Ok(records)
}
