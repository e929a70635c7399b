//! Reconciliation of host and VM device listings
//!
//! The two listings share no key except the product description, so a
//! host record absorbs every VM record whose product matches it. Records
//! without a product never match. When several VM records share one
//! product string, later ones overwrite fields merged from earlier ones.

use crate::identifier::strip_host_prefix;
use crate::record::DeviceRecord;
use tracing::trace;

/// Merge VM records into the matching host records
///
/// Returns the host records, in host order, each updated in place with
/// the fields of every VM record carrying the same product.
pub fn reconcile(mut host: Vec<DeviceRecord>, vm: &[DeviceRecord]) -> Vec<DeviceRecord> {
    for host_device in &mut host {
        for vm_device in vm {
            let matched = matches!(
                (&host_device.product, &vm_device.product),
                (Some(host_product), Some(vm_product)) if host_product == vm_product
            );
            if matched {
                trace!(
                    product = vm_device.product.as_deref(),
                    slot = vm_device.device.as_deref(),
                    "Merging VM device into host device"
                );
                host_device.merge_from(vm_device);
            }
        }
    }
    host
}

/// Keep only records attached to the VM
pub fn attached(records: Vec<DeviceRecord>) -> Vec<DeviceRecord> {
    records.into_iter().filter(DeviceRecord::is_attached).collect()
}

/// First record whose `id` equals `identifier`, ignoring a `host:` prefix
pub fn find_by_identifier<'a>(
    identifier: &str,
    records: &'a [DeviceRecord],
) -> Option<&'a DeviceRecord> {
    let identifier = strip_host_prefix(identifier);
    records
        .iter()
        .find(|record| record.id.as_deref() == Some(identifier))
}

/// Slot id of the record matching `identifier`
///
/// Falls back to `identifier` itself so that a value which already is a
/// slot id passes through unchanged.
pub fn slot_for(identifier: &str, records: &[DeviceRecord]) -> String {
    find_by_identifier(identifier, records)
        .and_then(|record| record.device.clone())
        .unwrap_or_else(|| identifier.to_string())
}

/// Operator-assigned alias of the first record matching `identifier`
pub fn alias_for(identifier: &str, records: &[DeviceRecord]) -> Option<String> {
    find_by_identifier(identifier, records).and_then(|record| record.userid.clone())
}
