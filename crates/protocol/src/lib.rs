//! Protocol library for usb-dm
//!
//! This crate holds the text side of the hypervisor monitor protocol:
//! parsing the `info usb` and `info usbhost` listings into device records,
//! reconciling the two listings by product description, normalizing
//! vendor:product identifiers and building add/remove commands in either
//! command dialect. It performs no I/O.
//!
//! # Example
//!
//! ```
//! use protocol::{attached, parse_host_devices, parse_vm_devices, reconcile};
//!
//! let host = parse_host_devices(
//!     "  Bus 1, Addr 2, Port 1, Speed 480 Mb/s\n    Class 00: USB device 0781:5567, Cruzer Blade\n",
//! )
//! .unwrap();
//! let vm = parse_vm_devices("  Device 0.2, Port 1, Speed 480 Mb/s, Product Cruzer Blade\n");
//!
//! let devices = attached(reconcile(host, &vm));
//! assert_eq!(devices[0].id.as_deref(), Some("0781:5567"));
//! assert_eq!(devices[0].device.as_deref(), Some("0.2"));
//! ```

pub mod dialect;
pub mod error;
pub mod identifier;
pub mod parse;
pub mod reconcile;
pub mod record;
pub mod response;

pub use dialect::{CommandDialect, Dialect, LegacyDialect, QdevDialect};
pub use error::{ProtocolError, Result};
pub use identifier::{HOST_PREFIX, VendorProduct, normalize_identifier, strip_host_prefix};
pub use parse::{parse_host_devices, parse_vm_devices};
pub use reconcile::{alias_for, attached, find_by_identifier, reconcile, slot_for};
pub use record::DeviceRecord;
pub use response::{INFO_USB, INFO_USBHOST, is_monitor_banner, is_rejection};
