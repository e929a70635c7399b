//! Command dialects for adding and removing USB devices
//!
//! Hypervisor versions differ only in how a device is added and removed.
//! The legacy dialect uses `usb_add`/`usb_del` with slot ids; the
//! qdev dialect uses `device_add`/`device_del` with device ids.

use crate::error::{ProtocolError, Result};
use crate::identifier::VendorProduct;
use crate::reconcile::{alias_for, slot_for};
use crate::record::DeviceRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Syntax of the add and remove commands
pub trait CommandDialect {
    /// Command attaching the device named by a normalized identifier
    fn add_command(&self, identifier: &str) -> Result<String>;

    /// Value the remove command needs for `identifier`
    ///
    /// `attached` is the reconciled list of devices currently attached.
    fn removal_target(&self, identifier: &str, attached: &[DeviceRecord]) -> Result<String>;

    /// Command detaching `target` as returned by [`Self::removal_target`]
    fn remove_command(&self, target: &str) -> String;
}

/// `usb_add <id>` / `usb_del <slot>`
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyDialect;

impl CommandDialect for LegacyDialect {
    fn add_command(&self, identifier: &str) -> Result<String> {
        Ok(format!("usb_add {identifier}"))
    }

    fn removal_target(&self, identifier: &str, attached: &[DeviceRecord]) -> Result<String> {
        Ok(slot_for(identifier, attached))
    }

    fn remove_command(&self, target: &str) -> String {
        format!("usb_del {target}")
    }
}

/// `device_add usb-host,...` / `device_del <id>`
#[derive(Debug, Clone, Copy, Default)]
pub struct QdevDialect;

impl CommandDialect for QdevDialect {
    fn add_command(&self, identifier: &str) -> Result<String> {
        let ids = VendorProduct::parse(identifier)?;
        Ok(format!(
            "device_add usb-host,vendorid=0x{},productid=0x{},id={}",
            ids.vendor,
            ids.product,
            ids.device_tag()
        ))
    }

    /// Prefers the operator-assigned alias, else the id used when adding
    fn removal_target(&self, identifier: &str, attached: &[DeviceRecord]) -> Result<String> {
        match alias_for(identifier, attached) {
            Some(alias) => Ok(alias),
            None => Ok(VendorProduct::parse(identifier)?.device_tag()),
        }
    }

    fn remove_command(&self, target: &str) -> String {
        format!("device_del {target}")
    }
}

/// Dialect selected per virtual machine in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    /// `usb_add` / `usb_del`, hypervisors before qdev USB passthrough
    #[serde(alias = "usb_add", alias = "legacy")]
    UsbAdd,
    /// `device_add` / `device_del`
    #[default]
    #[serde(alias = "device_add", alias = "qdev")]
    DeviceAdd,
}

impl Dialect {
    fn inner(&self) -> &'static dyn CommandDialect {
        match self {
            Dialect::UsbAdd => &LegacyDialect,
            Dialect::DeviceAdd => &QdevDialect,
        }
    }
}

impl CommandDialect for Dialect {
    fn add_command(&self, identifier: &str) -> Result<String> {
        self.inner().add_command(identifier)
    }

    fn removal_target(&self, identifier: &str, attached: &[DeviceRecord]) -> Result<String> {
        self.inner().removal_target(identifier, attached)
    }

    fn remove_command(&self, target: &str) -> String {
        self.inner().remove_command(target)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::UsbAdd => write!(f, "usb-add"),
            Dialect::DeviceAdd => write!(f, "device-add"),
        }
    }
}

impl FromStr for Dialect {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "usb-add" | "usb_add" | "legacy" => Ok(Dialect::UsbAdd),
            "device-add" | "device_add" | "qdev" => Ok(Dialect::DeviceAdd),
            _ => Err(ProtocolError::UnknownDialect(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attached_stick(userid: Option<&str>) -> Vec<DeviceRecord> {
        let mut record = DeviceRecord::new();
        record.set("id", "0781:5567");
        record.set("product", "Cruzer Blade");
        record.set("device", "0.2");
        if let Some(userid) = userid {
            record.set("userid", userid);
        }
        vec![record]
    }

    #[test]
    fn test_legacy_commands() {
        let dialect = LegacyDialect;
        assert_eq!(dialect.add_command("host:0781:5567").unwrap(), "usb_add host:0781:5567");
        assert_eq!(
            dialect.removal_target("host:0781:5567", &attached_stick(None)).unwrap(),
            "0.2"
        );
        assert_eq!(dialect.removal_target("0.5", &attached_stick(None)).unwrap(), "0.5");
        assert_eq!(dialect.remove_command("0.2"), "usb_del 0.2");
    }

    #[test]
    fn test_qdev_commands() {
        let dialect = QdevDialect;
        assert_eq!(
            dialect.add_command("host:0781:5567").unwrap(),
            "device_add usb-host,vendorid=0x0781,productid=0x5567,id=device-0781-5567"
        );
        assert_eq!(dialect.remove_command("stick"), "device_del stick");
    }

    #[test]
    fn test_qdev_removal_prefers_alias() {
        let dialect = QdevDialect;
        assert_eq!(
            dialect.removal_target("0781:5567", &attached_stick(Some("stick"))).unwrap(),
            "stick"
        );
        assert_eq!(
            dialect.removal_target("0781:5567", &attached_stick(None)).unwrap(),
            "device-0781-5567"
        );
    }

    #[test]
    fn test_qdev_rejects_bare_names() {
        assert!(QdevDialect.add_command("tablet").is_err());
    }

    #[test]
    fn test_dialect_dispatch() {
        assert_eq!(Dialect::UsbAdd.add_command("host:0781:5567").unwrap(), "usb_add host:0781:5567");
        assert!(Dialect::DeviceAdd.add_command("host:0781:5567").unwrap().starts_with("device_add "));
        assert_eq!(Dialect::default(), Dialect::DeviceAdd);
    }

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("usb_add".parse::<Dialect>().unwrap(), Dialect::UsbAdd);
        assert_eq!("Device-Add".parse::<Dialect>().unwrap(), Dialect::DeviceAdd);
        assert!("hmp".parse::<Dialect>().is_err());
        assert_eq!(Dialect::UsbAdd.to_string().parse::<Dialect>().unwrap(), Dialect::UsbAdd);
    }
}
