//! Monitor commands and response interpretation
//!
//! Responses carry no status code. A command failed if its output
//! mentions "could not"; a session is a monitor if the banner names QEMU.

/// Lists devices attached to the VM
pub const INFO_USB: &str = "info usb";

/// Lists devices visible to the hypervisor host
pub const INFO_USBHOST: &str = "info usbhost";

/// Substring the monitor prints when a command is rejected
pub const REJECTION_MARKER: &str = "could not";

/// Substring a genuine monitor banner contains
pub const BANNER_MARKER: &str = "QEMU";

/// Whether a command response reports failure
pub fn is_rejection(response: &str) -> bool {
    response.contains(REJECTION_MARKER)
}

/// Whether the text read after connecting is a monitor banner
pub fn is_monitor_banner(banner: &str) -> bool {
    banner.contains(BANNER_MARKER)
}
