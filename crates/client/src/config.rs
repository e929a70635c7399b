//! Client configuration management
//!
//! The configuration names the USB devices the operator cares about, the
//! host machine and the virtual machines with their monitor addresses.
//! Files are YAML or TOML, chosen by extension.

use anyhow::{Context, Result, anyhow};
use common::Endpoint;
use protocol::{Dialect, strip_host_prefix};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Config file name searched in the current directory
pub const SHORT_NAME: &str = "usb_dm_config";

/// Config file name searched in the current, config and home directories
pub const LONG_NAME: &str = "qemu_usb_device_manager_config";

/// Recognised config file extensions, in search order
pub const EXTENSIONS: [&str; 3] = ["yml", "yaml", "toml"];

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "QEMU_USB_DEVICE_MANAGER_CONFIG";

/// Sections every config must carry
pub const REQUIRED_SECTIONS: [&str; 3] = ["usb-devices", "host-machine", "virtual-machines"];

/// Serialization format of a config file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// `.yml` and `.yaml` are YAML, everything else TOML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Toml,
        }
    }
}

/// What the bulk `add` and `remove` commands do with a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceAction {
    /// Invisible to every command
    #[serde(alias = "ignored", alias = "disable", alias = "disabled")]
    Ignore,
    /// Added in bulk, never removed in bulk
    #[serde(alias = "add only", alias = "addonly", alias = "add_only")]
    AddOnly,
    /// Removed in bulk, never added in bulk
    #[serde(alias = "remove only", alias = "removeonly", alias = "remove_only")]
    RemoveOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbDevice {
    /// `vvvv:pppp` identifier
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<DeviceAction>,
}

impl UsbDevice {
    fn is_ignored(&self) -> bool {
        self.action == Some(DeviceAction::Ignore)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HostMachine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Monitor IP for `:port` monitors; `-` means detect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachine {
    /// `host:port`, or `:port` to derive the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<String>,
    /// Guest hostname, used to pick the machine when none is named
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<Dialect>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClientConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usb_devices: Option<BTreeMap<String, UsbDevice>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_machine: Option<HostMachine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_machines: Option<BTreeMap<String, VirtualMachine>>,
}

impl ClientConfig {
    /// Parse config text in the given format
    pub fn parse(text: &str, format: ConfigFormat) -> Result<Self> {
        let config = match format {
            ConfigFormat::Yaml if text.trim().is_empty() => ClientConfig::default(),
            ConfigFormat::Yaml => serde_yaml::from_str(text).context("Invalid YAML configuration")?,
            ConfigFormat::Toml => toml::from_str(text).context("Invalid TOML configuration")?,
        };
        Ok(config)
    }

    /// Render the config in the given format
    pub fn render(&self, format: ConfigFormat) -> Result<String> {
        let text = match format {
            ConfigFormat::Yaml => {
                serde_yaml::to_string(self).context("Failed to serialize configuration")?
            }
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).context("Failed to serialize configuration")?
            }
        };
        Ok(text)
    }

    /// Load configuration from `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::parse(&content, ConfigFormat::from_path(path))
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!("Loaded configuration from: {}", path.display());
        debug!(
            "Config: {} usb devices, {} virtual machines",
            config.usb_devices.as_ref().map_or(0, BTreeMap::len),
            config.virtual_machines.as_ref().map_or(0, BTreeMap::len)
        );
        Ok(config)
    }

    /// Save configuration to `path` in the format its extension names
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.render(ConfigFormat::from_path(path))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Required sections absent from this config
    pub fn missing_sections(&self) -> Vec<&'static str> {
        let present = [
            self.usb_devices.is_some(),
            self.host_machine.is_some(),
            self.virtual_machines.is_some(),
        ];
        REQUIRED_SECTIONS
            .iter()
            .zip(present)
            .filter(|(_, present)| !present)
            .map(|(name, _)| *name)
            .collect()
    }

    /// Insert empty required sections, returning the names inserted
    pub fn fill_missing_sections(&mut self) -> Vec<&'static str> {
        let missing = self.missing_sections();
        self.usb_devices.get_or_insert_with(BTreeMap::new);
        self.host_machine.get_or_insert_with(HostMachine::default);
        self.virtual_machines.get_or_insert_with(BTreeMap::new);
        missing
    }

    /// Configured devices that are not ignored, by alias
    pub fn devices(&self) -> impl Iterator<Item = (&str, &UsbDevice)> {
        self.usb_devices
            .iter()
            .flatten()
            .filter(|(_, device)| !device.is_ignored())
            .map(|(alias, device)| (alias.as_str(), device))
    }

    /// Non-ignored device with this alias
    pub fn device(&self, alias: &str) -> Option<&UsbDevice> {
        self.devices()
            .find(|(name, _)| *name == alias)
            .map(|(_, device)| device)
    }

    /// Ids a bare `add` attaches
    pub fn add_defaults(&self) -> Vec<String> {
        self.devices()
            .filter(|(_, device)| device.action != Some(DeviceAction::RemoveOnly))
            .map(|(_, device)| device.id.clone())
            .collect()
    }

    /// Ids a bare `remove` detaches
    pub fn remove_defaults(&self) -> Vec<String> {
        self.devices()
            .filter(|(_, device)| device.action != Some(DeviceAction::AddOnly))
            .map(|(_, device)| device.id.clone())
            .collect()
    }

    /// Turn command arguments into ids present on the host
    ///
    /// An alias maps to its configured id and anything containing `:` is
    /// taken as an id. Other arguments are dropped, as are ids that
    /// `host_ids` does not list: the hypervisor misbehaves when asked to
    /// pass through a device that is not plugged in.
    pub fn resolve_arguments<S: AsRef<str>>(&self, args: &[S], host_ids: &[String]) -> Vec<String> {
        args.iter()
            .filter_map(|arg| {
                let arg = arg.as_ref();
                let id = match self.device(arg) {
                    Some(device) => device.id.clone(),
                    None if arg.contains(':') => arg.to_string(),
                    None => {
                        warn!("'{}' is neither a configured device nor an id", arg);
                        return None;
                    }
                };
                if host_ids.iter().any(|host| host == strip_host_prefix(&id)) {
                    Some(id)
                } else {
                    warn!("Device {} is not plugged into the host", id);
                    None
                }
            })
            .collect()
    }

    /// Names of all virtual machines
    pub fn machine_names(&self) -> Vec<&str> {
        self.virtual_machines
            .iter()
            .flatten()
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn virtual_machine(&self, name: &str) -> Option<&VirtualMachine> {
        self.virtual_machines.as_ref()?.get(name)
    }

    /// Whether `local_hostname` is the configured host machine
    pub fn is_host_machine(&self, local_hostname: &str) -> bool {
        let hostname = self
            .host_machine
            .as_ref()
            .and_then(|host| host.hostname.as_deref())
            .unwrap_or_default();
        hostname == local_hostname
    }

    /// Virtual machine whose guest hostname is `hostname`
    pub fn machine_for_hostname(&self, hostname: &str) -> Option<&str> {
        self.virtual_machines
            .iter()
            .flatten()
            .find(|(_, vm)| vm.hostname.as_deref() == Some(hostname))
            .map(|(name, _)| name.as_str())
    }

    /// Monitor endpoint of `vm`, or `None` when it names no monitor
    ///
    /// A `:port` monitor takes its IP from `host-machine.ip-address`. When
    /// that is `-` or absent the IP is `127.0.0.1` on the host machine and
    /// `gateway()` anywhere else.
    pub fn monitor_endpoint(
        &self,
        vm: &VirtualMachine,
        local_hostname: &str,
        gateway: impl FnOnce() -> Option<Ipv4Addr>,
    ) -> Result<Option<Endpoint>> {
        let Some(monitor) = vm.monitor.as_deref() else {
            return Ok(None);
        };

        let Some(port) = monitor.strip_prefix(':') else {
            return Ok(Some(monitor.parse::<Endpoint>()?));
        };

        let configured = self
            .host_machine
            .as_ref()
            .and_then(|host| host.ip_address.as_deref())
            .filter(|ip| *ip != "-");

        let host = match configured {
            Some(ip) => ip.to_string(),
            None if self.is_host_machine(local_hostname) => Ipv4Addr::LOCALHOST.to_string(),
            None => gateway()
                .ok_or_else(|| anyhow!("Cannot determine the host machine's address for monitor '{}'", monitor))?
                .to_string(),
        };

        Ok(Some(format!("{}:{}", host, port).parse::<Endpoint>()?))
    }
}

/// Expand `~` in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Directories searched for [`LONG_NAME`], with a label each
pub fn search_directories() -> Vec<(&'static str, PathBuf)> {
    let mut directories = Vec::new();
    if let Ok(current) = env::current_dir() {
        directories.push(("Current directory", current));
    }
    if let Some(config) = dirs::config_dir() {
        directories.push(("Config directory", config.join("usb-dm")));
    }
    if let Some(home) = dirs::home_dir() {
        directories.push(("Home directory", home));
    }
    directories
}

/// First `<stem>.<ext>` file found, trying directories in order
pub fn find_file<'a>(
    directories: impl IntoIterator<Item = &'a Path>,
    stem: &str,
) -> Option<PathBuf> {
    directories.into_iter().find_map(|directory| {
        EXTENSIONS
            .iter()
            .map(|extension| directory.join(format!("{}.{}", stem, extension)))
            .find(|path| path.is_file())
    })
}

/// Locate a config file when none was given on the command line
pub fn find_config_file() -> Option<PathBuf> {
    let directories = search_directories();

    let current = env::current_dir().ok();
    current
        .as_deref()
        .and_then(|dir| find_file([dir], SHORT_NAME))
        .or_else(|| find_file(directories.iter().map(|(_, dir)| dir.as_path()), LONG_NAME))
        .or_else(|| {
            env::var(CONFIG_ENV)
                .ok()
                .map(|path| expand_path(&path))
                .filter(|path| path.is_file())
        })
}
