//! User-facing text printed by the shell

pub const WELCOME: &str = "Limited QEMU Monitor Wrapper for USB management\nType 'help' for a list of commands.";

pub const HELP: &str = "\
- help - List commands
- exit - Exit limited monitor
- version - Show version
- wait [seconds] - Wait for an amount of time
- reload - Reload config file
- reload [path] - Load another config file
- update - Update config file from 'configuration-url'
- update [url] - Update config file from url
- monitor - Show monitor information
- list - List USB devices connected to virtual machine
- hostlist - List USB devices connected to host
- set - Show available virtual machines
- set [name] - Set active machine by name
- add - Add all USB devices
- add [id] - Add USB device by id
- add [name] - Add USB device by specified name
- remove - Remove all USB devices
- remove [id] - Remove USB device by id
- remove [name] - Remove USB device by specified name";

// Monitor
pub const MONITOR_NOT_SET: &str = "No monitor set.";
pub const MONITOR_CANNOT_CONNECT: &str = "Could not connect to monitor.";

// Shell
pub const NO_VM_SET: &str = "No virtual machine is set. Set one with the 'set' command.";
pub const INVALID_VM: &str = "Invalid virtual machine.";
pub const VMS: &str = "Virtual Machines: ";
pub const DEVICE_CONNECTED: &str = "[Connected]";
pub const ACTIVE: &str = "[Active]";
pub const UNKNOWN: &str = "Unknown";
pub const UNKNOWN_COMMAND: &str = "Unknown command. Type 'help' for a list of commands.";
pub const INVALID_WAIT: &str = "Wait needs a non-negative number of seconds.";
pub const NO_DEVICES: &str = "No matching devices.";

// Config
pub const CONFIG_CANNOT_LOAD_NEW: &str = "Cannot load new configuration.";
pub const CONFIG_CANNOT_RELOAD: &str = "Could not reload configuration file.";
pub const CONFIG_RELOADED: &str = "Reloaded configuration file.";
pub const CONFIG_URL_NOT_SET: &str = "No configuration url set.";
pub const CONFIG_UPDATED_FROM_URL: &str = "Updated configuration from url.";
pub const CONFIG_REWRITE: &str = "Adding required elements. Please modify them in your config.\nReload by typing 'reload' after you are finished.";
pub const CONFIG_LOOKED_FOR: &str = "Looked for a configuration file named";

pub fn missing_element(section: &str) -> String {
    format!("Element '{}' missing from config.", section)
}

pub fn set_active(name: &str) -> String {
    format!("'{}' set as active virtual machine.", name)
}

pub fn current_vm(name: Option<&str>) -> String {
    format!("Currently set Virtual Machine: {}", name.unwrap_or("None"))
}

pub fn vm_device(id: Option<&str>, slot: Option<&str>, product: Option<&str>) -> String {
    format!(
        "- ID: {} / Device: {} / {}",
        id.unwrap_or(UNKNOWN),
        slot.unwrap_or(UNKNOWN),
        product.unwrap_or_default()
    )
}

pub fn host_device(id: Option<&str>, product: Option<&str>, connected: bool) -> String {
    let mut line = format!(
        "- ID: {} / {}",
        id.unwrap_or(UNKNOWN),
        product.unwrap_or(UNKNOWN)
    );
    if connected {
        line.push(' ');
        line.push_str(DEVICE_CONNECTED);
    }
    line
}

pub fn monitor_error(err: &common::Error) -> String {
    format!("Monitor error: {}", err)
}

pub fn added(ids: &[String]) -> String {
    format!("Added device(s): {}", ids.join(", "))
}

pub fn cannot_add(ids: &[String]) -> String {
    format!("Could not add device(s): {}", ids.join(", "))
}

pub fn removed(ids: &[String]) -> String {
    format!("Removed device(s): {}", ids.join(", "))
}

pub fn cannot_remove(ids: &[String]) -> String {
    format!("Could not remove device(s): {}", ids.join(", "))
}
