//! Device records parsed from monitor listings
//!
//! A record holds whatever attributes a listing line happened to carry.
//! The attributes the rest of the system relies on get their own fields;
//! anything else the hypervisor prints is kept in [`DeviceRecord::extra`]
//! so no key from the response is lost.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute names with a dedicated field
pub const KNOWN_KEYS: [&str; 9] = [
    "bus", "addr", "port", "speed", "class", "product", "device", "id", "userid",
];

/// A single USB device as reported by the monitor
///
/// Every field is optional: which ones are present depends on the listing
/// (`info usb` or `info usbhost`) and on the hypervisor version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Host bus number
    pub bus: Option<String>,
    /// Host device address on the bus
    pub addr: Option<String>,
    /// Port path
    pub port: Option<String>,
    /// Link speed, e.g. `480 Mb/s`
    pub speed: Option<String>,
    /// Class line prefix from the host listing
    pub class: Option<String>,
    /// Product description, used to match host and VM listings
    pub product: Option<String>,
    /// Hypervisor slot id of an attached device (e.g. `0.2`)
    pub device: Option<String>,
    /// Vendor:product id
    pub id: Option<String>,
    /// Operator-assigned alias of an attached device
    pub userid: Option<String>,
    /// Attributes without a dedicated field
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl DeviceRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Option<&Option<String>> {
        Some(match key {
            "bus" => &self.bus,
            "addr" => &self.addr,
            "port" => &self.port,
            "speed" => &self.speed,
            "class" => &self.class,
            "product" => &self.product,
            "device" => &self.device,
            "id" => &self.id,
            "userid" => &self.userid,
            _ => return None,
        })
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut Option<String>> {
        Some(match key {
            "bus" => &mut self.bus,
            "addr" => &mut self.addr,
            "port" => &mut self.port,
            "speed" => &mut self.speed,
            "class" => &mut self.class,
            "product" => &mut self.product,
            "device" => &mut self.device,
            "id" => &mut self.id,
            "userid" => &mut self.userid,
            _ => return None,
        })
    }

    /// Look up an attribute by its lower-case name
    pub fn get(&self, key: &str) -> Option<&str> {
        match self.slot(key) {
            Some(value) => value.as_deref(),
            None => self.extra.get(key).map(String::as_str),
        }
    }

    /// Set an attribute by its lower-case name, replacing any previous value
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.slot_mut(key) {
            Some(slot) => *slot = Some(value),
            None => {
                self.extra.insert(key.to_string(), value);
            }
        }
    }

    /// Whether the attribute is present
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// All present attributes, known keys first, then extras in key order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        KNOWN_KEYS
            .iter()
            .filter_map(|key| self.get(key).map(|value| (*key, value)))
            .chain(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Number of present attributes
    pub fn len(&self) -> usize {
        self.fields().count()
    }

    /// Whether no attribute is present
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy every attribute of `other` into `self`, overwriting on conflict
    pub fn merge_from(&mut self, other: &DeviceRecord) {
        for (key, value) in other.fields() {
            self.set(key, value);
        }
    }

    /// A record carrying a slot id is attached to the VM
    pub fn is_attached(&self) -> bool {
        self.device.is_some()
    }
}
