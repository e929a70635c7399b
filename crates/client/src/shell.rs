//! Interactive command shell
//!
//! Each line is one command. Commands that touch the monitor open a
//! session, run their exchange and close it again, so the monitor's single
//! client slot is held only for the duration of one command.

use crate::config::{ClientConfig, expand_path};
use crate::host;
use crate::messages;
use crate::update::update_config;
use anyhow::{Context, Result};
use common::{BatchReport, ConnectOptions, Monitor, TcpTransport};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Whether the shell keeps reading commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Add,
    Remove,
}

/// Split a line into command and arguments
fn parse_command(line: &str) -> (&str, Vec<&str>) {
    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default();
    (command, words.collect())
}

/// Monitor client for the named machine, if it has a monitor
fn build_monitor(config: &ClientConfig, name: &str) -> Result<Option<Monitor<TcpTransport>>> {
    let Some(vm) = config.virtual_machine(name) else {
        return Ok(None);
    };
    let hostname = host::local_hostname();
    let endpoint = config.monitor_endpoint(vm, &hostname, host::default_gateway)?;
    Ok(endpoint.map(|endpoint| Monitor::tcp(endpoint, vm.dialect.unwrap_or_default())))
}

pub struct Shell {
    config_path: PathBuf,
    config: ClientConfig,
    machine_name: Option<String>,
    monitor: Option<Monitor<TcpTransport>>,
    connect_options: ConnectOptions,
}

impl Shell {
    /// Load the config at `config_path` and select a machine
    pub fn open<W: Write>(
        config_path: PathBuf,
        machine_name: Option<String>,
        out: &mut W,
    ) -> Result<Self> {
        let mut shell = Self {
            config_path,
            config: ClientConfig::default(),
            machine_name,
            monitor: None,
            connect_options: ConnectOptions::default(),
        };
        shell.reload(out)?;
        Ok(shell)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Read the config file again, repairing missing sections
    fn reload<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let mut config = ClientConfig::load(&self.config_path)?;

        let missing = config.fill_missing_sections();
        if !missing.is_empty() {
            for section in &missing {
                writeln!(out, "{}", messages::missing_element(section))?;
            }
            writeln!(out, "{}", messages::CONFIG_REWRITE)?;
            config
                .save(&self.config_path)
                .context("Cannot rewrite configuration")?;
        }

        if self.machine_name.is_none() {
            let hostname = host::local_hostname();
            if !config.is_host_machine(&hostname) {
                self.machine_name = config.machine_for_hostname(&hostname).map(str::to_string);
            }
        }

        let monitor = match self.machine_name.as_deref() {
            Some(name) => build_monitor(&config, name)?,
            None => None,
        };

        self.config = config;
        self.monitor = monitor;
        Ok(())
    }

    /// Selected machine, if the config still knows it
    fn active_machine(&self) -> Option<&str> {
        self.machine_name
            .as_deref()
            .filter(|name| self.config.virtual_machine(name).is_some())
    }

    /// Run one command line
    pub async fn execute<W: Write>(&mut self, line: &str, out: &mut W) -> Result<Flow> {
        let (command, args) = parse_command(line);
        debug!("Shell command: {} {:?}", command, args);

        match command {
            "" => {}
            "help" => writeln!(out, "{}", messages::HELP)?,
            "exit" | "quit" => return Ok(Flow::Exit),
            "version" => writeln!(out, "{}", env!("CARGO_PKG_VERSION"))?,
            "wait" | "sleep" => self.command_wait(&args, out).await?,
            "reload" => self.command_reload(&args, out)?,
            "update" => {
                self.command_update(&args, out).await?;
                self.command_reload(&[], out)?;
            }
            "monitor" => self.command_monitor(out)?,
            "set" => self.command_set(&args, out)?,
            "list" | "hostlist" | "listhost" | "add" | "remove" | "rem" | "del"
                if self.active_machine().is_none() =>
            {
                writeln!(out, "{}", messages::NO_VM_SET)?
            }
            "list" => self.command_list(out).await?,
            "hostlist" | "listhost" => self.command_hostlist(out).await?,
            "add" => self.command_change(Change::Add, &args, out).await?,
            "remove" | "rem" | "del" => self.command_change(Change::Remove, &args, out).await?,
            _ => writeln!(out, "{}", messages::UNKNOWN_COMMAND)?,
        }

        Ok(Flow::Continue)
    }

    async fn command_wait<W: Write>(&mut self, args: &[&str], out: &mut W) -> Result<()> {
        let Some(seconds) = args.first() else {
            return Ok(());
        };
        match seconds
            .parse::<f64>()
            .ok()
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
        {
            Some(duration) => tokio::time::sleep(duration).await,
            None => writeln!(out, "{}", messages::INVALID_WAIT)?,
        }
        Ok(())
    }

    fn command_reload<W: Write>(&mut self, args: &[&str], out: &mut W) -> Result<()> {
        if let Some(path) = args.first() {
            self.config_path = expand_path(path);
        }

        match self.reload(out) {
            Ok(()) => writeln!(out, "{}", messages::CONFIG_RELOADED)?,
            Err(e) => {
                warn!("Reload of {} failed: {:#}", self.config_path.display(), e);
                writeln!(out, "{}", messages::CONFIG_CANNOT_RELOAD)?;
            }
        }
        Ok(())
    }

    async fn command_update<W: Write>(&mut self, args: &[&str], out: &mut W) -> Result<()> {
        let previous = self.config.configuration_url.clone();
        if let Some(url) = args.first() {
            self.config.configuration_url = Some(url.to_string());
        }

        let Some(url) = self.config.configuration_url.clone() else {
            writeln!(out, "{}", messages::CONFIG_URL_NOT_SET)?;
            return Ok(());
        };

        match update_config(&url, &self.config_path).await {
            Ok(()) => writeln!(out, "{}", messages::CONFIG_UPDATED_FROM_URL)?,
            Err(e) => {
                warn!("Update from {} failed: {:#}", url, e);
                self.config.configuration_url = previous;
                writeln!(out, "{}", messages::CONFIG_CANNOT_LOAD_NEW)?;
            }
        }
        Ok(())
    }

    fn command_monitor<W: Write>(&self, out: &mut W) -> Result<()> {
        match &self.monitor {
            Some(monitor) => {
                writeln!(out, "Host: {}", monitor.endpoint())?;
                writeln!(out, "Dialect: {}", monitor.dialect())?;
            }
            None => writeln!(out, "{}", messages::MONITOR_NOT_SET)?,
        }
        Ok(())
    }

    fn command_set<W: Write>(&mut self, args: &[&str], out: &mut W) -> Result<()> {
        if let Some(name) = args.first() {
            if self.config.virtual_machine(name).is_none() {
                writeln!(out, "{}", messages::INVALID_VM)?;
            } else {
                match build_monitor(&self.config, name) {
                    Ok(monitor) => {
                        self.machine_name = Some(name.to_string());
                        self.monitor = monitor;
                        writeln!(out, "{}", messages::set_active(name))?;
                        return Ok(());
                    }
                    Err(e) => {
                        warn!("Cannot select {}: {:#}", name, e);
                        writeln!(out, "{:#}", e)?;
                    }
                }
            }
        }

        writeln!(out, "{}", messages::current_vm(self.machine_name.as_deref()))?;
        writeln!(out, "{}", messages::VMS)?;
        for name in self.config.machine_names() {
            if Some(name) == self.machine_name.as_deref() {
                writeln!(out, "- {} {}", name, messages::ACTIVE)?;
            } else {
                writeln!(out, "- {}", name)?;
            }
        }
        Ok(())
    }

    /// Connect the selected machine's monitor, telling the user on failure
    async fn connect_monitor<W: Write>(
        &mut self,
        out: &mut W,
    ) -> Result<Option<&mut Monitor<TcpTransport>>> {
        let Some(monitor) = self.monitor.as_mut() else {
            writeln!(out, "{}", messages::MONITOR_NOT_SET)?;
            return Ok(None);
        };

        match monitor.connect(&self.connect_options).await {
            Ok(()) => Ok(Some(monitor)),
            Err(e) => {
                warn!("Could not connect to {}: {}", monitor.endpoint(), e);
                writeln!(out, "{}", messages::MONITOR_CANNOT_CONNECT)?;
                Ok(None)
            }
        }
    }

    async fn command_list<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let Some(monitor) = self.connect_monitor(out).await? else {
            return Ok(());
        };
        let devices = monitor.list_vm_devices().await;
        monitor.disconnect().await;

        match devices {
            Ok(devices) => {
                for device in devices {
                    writeln!(
                        out,
                        "{}",
                        messages::vm_device(
                            device.userid.as_deref(),
                            device.device.as_deref(),
                            device.product.as_deref()
                        )
                    )?;
                }
            }
            Err(e) => {
                warn!("Listing VM devices failed: {}", e);
                writeln!(out, "{}", messages::monitor_error(&e))?;
            }
        }
        Ok(())
    }

    async fn command_hostlist<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let Some(monitor) = self.connect_monitor(out).await? else {
            return Ok(());
        };
        let devices = monitor.list_devices_reconciled().await;
        monitor.disconnect().await;

        match devices {
            Ok(devices) => {
                for device in devices {
                    writeln!(
                        out,
                        "{}",
                        messages::host_device(
                            device.id.as_deref(),
                            device.product.as_deref(),
                            device.is_attached()
                        )
                    )?;
                }
            }
            Err(e) => {
                warn!("Listing host devices failed: {}", e);
                writeln!(out, "{}", messages::monitor_error(&e))?;
            }
        }
        Ok(())
    }

    /// Ids of devices currently plugged into the host
    async fn host_ids<W: Write>(&mut self, out: &mut W) -> Result<Option<Vec<String>>> {
        let Some(monitor) = self.connect_monitor(out).await? else {
            return Ok(None);
        };
        let devices = monitor.list_host_devices().await;
        monitor.disconnect().await;

        match devices {
            Ok(devices) => Ok(Some(devices.into_iter().filter_map(|d| d.id).collect())),
            Err(e) => {
                warn!("Listing host devices failed: {}", e);
                writeln!(out, "{}", messages::monitor_error(&e))?;
                Ok(None)
            }
        }
    }

    async fn command_change<W: Write>(
        &mut self,
        change: Change,
        args: &[&str],
        out: &mut W,
    ) -> Result<()> {
        let ids = if args.is_empty() {
            match change {
                Change::Add => self.config.add_defaults(),
                Change::Remove => self.config.remove_defaults(),
            }
        } else {
            let Some(host_ids) = self.host_ids(out).await? else {
                return Ok(());
            };
            self.config.resolve_arguments(args, &host_ids)
        };

        if ids.is_empty() {
            writeln!(out, "{}", messages::NO_DEVICES)?;
            return Ok(());
        }

        let Some(monitor) = self.connect_monitor(out).await? else {
            return Ok(());
        };
        let report = match change {
            Change::Add => monitor.add_devices(&ids, true).await,
            Change::Remove => monitor.remove_devices(&ids).await,
        };
        monitor.disconnect().await;

        let failed = match report {
            Ok(report) if report.succeeded() => None,
            Ok(report) => Some(failed_ids(&report)),
            Err(e) => {
                warn!("Device change failed: {}", e);
                writeln!(out, "{}", messages::monitor_error(&e))?;
                Some(ids.clone())
            }
        };

        let line = match (change, failed) {
            (Change::Add, None) => messages::added(&ids),
            (Change::Add, Some(failed)) => messages::cannot_add(&failed),
            (Change::Remove, None) => messages::removed(&ids),
            (Change::Remove, Some(failed)) => messages::cannot_remove(&failed),
        };
        writeln!(out, "{}", line)?;
        Ok(())
    }
}

fn failed_ids(report: &BatchReport) -> Vec<String> {
    report.failures().map(str::to_string).collect()
}
