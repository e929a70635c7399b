//! Integration tests for listing parsing and reconciliation
//!
//! Uses listings captured from real monitors plus generated listings for
//! property checks.
//!
//! Run with: `cargo test -p protocol --test listing_tests`

use proptest::prelude::*;
use protocol::{
    CommandDialect, Dialect, DeviceRecord, ProtocolError, attached, find_by_identifier,
    normalize_identifier, parse_host_devices, parse_vm_devices, reconcile, slot_for,
};

const HOST_LISTING: &str = "\
info usbhost\r
  Bus 1, Addr 2, Port 1, Speed 480 Mb/s\r
    Class 00: USB device 0781:5567, Cruzer Blade\r
  Bus 1, Addr 3, Port 2, Speed 12 Mb/s\r
    Class 03: USB device 046d:c52b, USB Receiver\r
  Bus 2, Addr 4, Port 1.4, Speed 1.5 Mb/s\r
    Class 03: USB device 413c:2113, Dell KB216 Wired Keyboard\r
  Bus 3, Addr 1, Port 0, Speed 5000 Mb/s\r
    Class 09: USB device 1d6b:0003\r
(qemu) ";

const VM_LISTING: &str = "\
info usb\r
  Device 0.0, Port 1, Speed 12 Mb/s, Product QEMU USB Tablet, ID: input0\r
  Device 0.2, Port 2, Speed 12 Mb/s, Product USB Receiver, ID: mouse\r
  Device 0.3, Port 3, Speed 1.5 Mb/s, Product Dell KB216 Wired Keyboard\r
(qemu) ";

mod parsing {
    use super::*;

    #[test]
    fn test_host_listing_records() {
        let devices = parse_host_devices(HOST_LISTING).expect("Failed to parse");
        let ids: Vec<_> = devices.iter().map(|d| d.id.as_deref().unwrap()).collect();
        assert_eq!(ids, vec!["0781:5567", "046d:c52b", "413c:2113", "1d6b:0003"]);
        assert_eq!(devices[2].product.as_deref(), Some("Dell KB216 Wired Keyboard"));
        assert_eq!(devices[3].product, None);
    }

    #[test]
    fn test_vm_listing_records() {
        let devices = parse_vm_devices(VM_LISTING);
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].userid.as_deref(), Some("input0"));
        assert_eq!(devices[2].userid, None);
        assert_eq!(devices[2].get("speed"), Some("1.5 Mb/s"));
    }

    #[test]
    fn test_class_line_id_comes_from_its_first_element() {
        // A bus line followed by an unindented line and a class line
        let text = "  Bus 0, Port 0: \nDevice 1.1, Speed 480, Product my-device\n  Class 9: USB device abcd:1234, my-device\n";
        let devices = parse_host_devices(text).expect("Failed to parse");
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].product.as_deref(), Some("my-device"));
        assert_eq!(devices[0].id.as_deref(), Some("abcd:1234"));
        assert_eq!(devices[0].get("port"), Some("0:"));
    }

    #[test]
    fn test_class_line_first_is_rejected() {
        let text = "  Class 00: USB device 0781:5567, Cruzer Blade\n  Bus 1, Addr 2\n";
        assert_eq!(
            parse_host_devices(text),
            Err(ProtocolError::OrphanContinuation {
                line: "Class 00: USB device 0781:5567, Cruzer Blade".to_string()
            })
        );
    }
}

mod reconciliation {
    use super::*;

    fn merged() -> Vec<DeviceRecord> {
        reconcile(
            parse_host_devices(HOST_LISTING).unwrap(),
            &parse_vm_devices(VM_LISTING),
        )
    }

    #[test]
    fn test_reconciled_view() {
        let devices = merged();
        assert_eq!(devices.len(), 4);
        assert!(!devices[0].is_attached());
        assert_eq!(devices[1].device.as_deref(), Some("0.2"));
        assert_eq!(devices[1].userid.as_deref(), Some("mouse"));
        assert_eq!(devices[2].device.as_deref(), Some("0.3"));
        // The emulated tablet has no host counterpart
        assert!(devices.iter().all(|d| d.product.as_deref() != Some("QEMU USB Tablet")));
    }

    #[test]
    fn test_attached_view() {
        let devices = attached(merged());
        let ids: Vec<_> = devices.iter().filter_map(|d| d.id.as_deref()).collect();
        assert_eq!(ids, vec!["046d:c52b", "413c:2113"]);
    }

    #[test]
    fn test_prefix_stripping_agrees() {
        let devices = attached(merged());
        assert_eq!(
            find_by_identifier("host:046d:c52b", &devices).is_some(),
            find_by_identifier("046d:c52b", &devices).is_some()
        );
        assert_eq!(
            find_by_identifier("host:0781:5567", &devices).is_some(),
            find_by_identifier("0781:5567", &devices).is_some()
        );
    }

    #[test]
    fn test_duplicate_products_last_write_wins() {
        let host = parse_host_devices(
            "  Bus 1, Addr 2, Port 1, Speed 12 Mb/s\n    Class 03: USB device aaaa:bbbb, Gamepad\n",
        )
        .unwrap();
        let vm = parse_vm_devices(
            "  Device 0.2, Port 1, Speed 12 Mb/s, Product Gamepad, ID: pad1\n  Device 0.3, Port 2, Speed 12 Mb/s, Product Gamepad, ID: pad2\n",
        );

        let forward = reconcile(host.clone(), &vm);
        let reversed: Vec<_> = vm.iter().rev().cloned().collect();
        let backward = reconcile(host, &reversed);

        assert_eq!(forward[0].device.as_deref(), Some("0.3"));
        assert_eq!(forward[0].userid.as_deref(), Some("pad2"));
        assert_eq!(backward[0].device.as_deref(), Some("0.2"));
        assert_ne!(forward, backward);
    }

    #[test]
    fn test_commands_for_reconciled_devices() {
        let devices = attached(merged());
        let id = normalize_identifier("413c:2113");

        assert_eq!(Dialect::UsbAdd.add_command(&id).unwrap(), "usb_add host:413c:2113");
        assert_eq!(slot_for(&id, &devices), "0.3");
        assert_eq!(
            Dialect::UsbAdd.removal_target(&id, &devices).unwrap(),
            "0.3"
        );
        assert_eq!(
            Dialect::DeviceAdd.removal_target("046d:c52b", &devices).unwrap(),
            "mouse"
        );
        assert_eq!(
            Dialect::DeviceAdd.removal_target(&id, &devices).unwrap(),
            "device-413c-2113"
        );
    }
}

fn host_listing_strategy() -> impl Strategy<Value = (usize, String)> {
    prop::collection::vec(
        (1u8..8, 1u8..128, any::<u16>(), any::<u16>(), "[A-Za-z][A-Za-z0-9 ]{0,20}"),
        0..8,
    )
    .prop_map(|devices| {
        let mut text = String::from("info usbhost\r\n");
        for (bus, addr, vendor, product, name) in &devices {
            text.push_str(&format!(
                "  Bus {bus}, Addr {addr}, Port {bus}.{addr}, Speed 480 Mb/s\r\n"
            ));
            text.push_str(&format!(
                "    Class 00: USB device {vendor:04x}:{product:04x}, {}\r\n",
                name.trim_end()
            ));
        }
        text.push_str("(qemu) ");
        (devices.len(), text)
    })
}

proptest! {
    #[test]
    fn prop_host_parsing_is_idempotent((count, text) in host_listing_strategy()) {
        let first = parse_host_devices(&text).unwrap();
        let second = parse_host_devices(&text).unwrap();
        prop_assert_eq!(first.len(), count);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_host_ids_are_vendor_product((_, text) in host_listing_strategy()) {
        for device in parse_host_devices(&text).unwrap() {
            let id = device.id.unwrap();
            prop_assert_eq!(id.len(), 9);
            prop_assert_eq!(id.as_bytes()[4], b':');
        }
    }
}
