//! Vendor:product identifiers
//!
//! Operators and config files name devices by `vvvv:pppp`, optionally
//! namespaced as `host:vvvv:pppp`. For lookups both spellings are the
//! same device.

use crate::error::{ProtocolError, Result};
use std::fmt;

/// Namespace pinning a device to host passthrough
pub const HOST_PREFIX: &str = "host:";

/// Namespace of disk-backed devices, never rewritten
const DISK_NAMESPACE: &str = "disk";

/// Drop a leading `host:` namespace
pub fn strip_host_prefix(identifier: &str) -> &str {
    identifier.strip_prefix(HOST_PREFIX).unwrap_or(identifier)
}

/// Prefix bare `vvvv:pppp` identifiers with `host:`
///
/// Identifiers that are already namespaced (more than one colon), belong
/// to the `disk:` namespace, or whose halves are not four characters each
/// are returned unchanged.
pub fn normalize_identifier(identifier: &str) -> String {
    let parts: Vec<&str> = identifier.split(':').collect();
    let bare_pair = parts.len() == 2
        && parts[0] != DISK_NAMESPACE
        && parts[0].len() == 4
        && parts[1].len() == 4;

    if bare_pair {
        format!("{HOST_PREFIX}{identifier}")
    } else {
        identifier.to_string()
    }
}

/// Vendor and product halves of an identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VendorProduct {
    pub vendor: String,
    pub product: String,
}

impl VendorProduct {
    /// Take the last two colon-separated parts of `identifier`
    ///
    /// Any namespace in front (`host:`, `disk:`) is ignored.
    pub fn parse(identifier: &str) -> Result<Self> {
        let mut parts = identifier.rsplit(':');
        match (parts.next(), parts.next()) {
            (Some(product), Some(vendor)) if !vendor.is_empty() && !product.is_empty() => {
                Ok(Self {
                    vendor: vendor.to_string(),
                    product: product.to_string(),
                })
            }
            _ => Err(ProtocolError::InvalidIdentifier(identifier.to_string())),
        }
    }

    /// Deterministic device id used when adding with `device_add`
    pub fn device_tag(&self) -> String {
        format!("device-{}-{}", self.vendor, self.product)
    }
}

impl fmt::Display for VendorProduct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.vendor, self.product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_host_prefix() {
        assert_eq!(strip_host_prefix("host:aaaa:bbbb"), "aaaa:bbbb");
        assert_eq!(strip_host_prefix("aaaa:bbbb"), "aaaa:bbbb");
        assert_eq!(strip_host_prefix("disk:aaaa:bbbb"), "disk:aaaa:bbbb");
    }

    #[test]
    fn test_normalize_bare_pair() {
        assert_eq!(normalize_identifier("abcd:1234"), "host:abcd:1234");
    }

    #[test]
    fn test_normalize_leaves_namespaced_alone() {
        assert_eq!(normalize_identifier("host:abcd:1234"), "host:abcd:1234");
        assert_eq!(normalize_identifier("disk:abcd:1234"), "disk:abcd:1234");
        assert_eq!(normalize_identifier("abcd:1234:extra"), "abcd:1234:extra");
    }

    #[test]
    fn test_normalize_leaves_odd_lengths_alone() {
        assert_eq!(normalize_identifier("abc:1234"), "abc:1234");
        assert_eq!(normalize_identifier("tablet"), "tablet");
        assert_eq!(normalize_identifier("disk:file"), "disk:file");
    }

    #[test]
    fn test_vendor_product_parse() {
        let ids = VendorProduct::parse("host:0781:5567").unwrap();
        assert_eq!(ids.vendor, "0781");
        assert_eq!(ids.product, "5567");
        assert_eq!(ids.device_tag(), "device-0781-5567");
        assert_eq!(ids.to_string(), "0781:5567");
    }

    #[test]
    fn test_vendor_product_rejects_bare_name() {
        assert!(VendorProduct::parse("tablet").is_err());
        assert!(VendorProduct::parse(":5567").is_err());
    }
}
