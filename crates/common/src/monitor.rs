//! Monitor client for USB passthrough
//!
//! Issues listing and add/remove commands over a [`Session`], parses the
//! listings and reconciles them into one view of host devices annotated
//! with their VM attachment. Nothing is cached: every operation queries
//! the monitor afresh.
//!
//! A command the hypervisor rejects is reported as
//! [`CommandOutcome::Rejected`], not as an error, and so is an identifier
//! the dialect cannot express ([`CommandOutcome::Invalid`]). Errors are
//! reserved for a missing session, a broken connection and unparseable
//! listings.

use crate::endpoint::Endpoint;
use crate::session::{ConnectOptions, Session};
use crate::transport::{TcpTransport, Transport};
use crate::Result;
use protocol::{
    CommandDialect, DeviceRecord, Dialect, INFO_USB, INFO_USBHOST, ProtocolError, attached, find_by_identifier,
    is_rejection, normalize_identifier, parse_host_devices, parse_vm_devices, reconcile, slot_for,
};
use tracing::{debug, info, warn};

/// Result of one add or remove command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Command sent and not rejected
    Applied,
    /// Device already attached; nothing was sent
    SkippedDuplicate,
    /// Monitor answered with a failure message
    Rejected { response: String },
    /// Identifier has no command in this dialect; nothing was sent
    Invalid { reason: String },
}

impl CommandOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CommandOutcome::Applied)
    }
}

/// Outcomes of a command applied to a list of devices, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub entries: Vec<(String, CommandOutcome)>,
}

impl BatchReport {
    /// True only if every device was sent and accepted
    ///
    /// A duplicate that was skipped counts as failure even though nothing
    /// went wrong for it, so a batch containing an already-attached device
    /// never reports success.
    pub fn succeeded(&self) -> bool {
        self.entries.iter().all(|(_, outcome)| outcome.is_applied())
    }

    /// Identifiers whose command was not applied
    pub fn failures(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, outcome)| !outcome.is_applied())
            .map(|(identifier, _)| identifier.as_str())
    }
}

/// Client for a single VM's monitor
#[derive(Debug)]
pub struct Monitor<T> {
    session: Session<T>,
    dialect: Dialect,
}

impl Monitor<TcpTransport> {
    /// Monitor reached over TCP at `endpoint`
    pub fn tcp(endpoint: Endpoint, dialect: Dialect) -> Self {
        Self::new(Session::new(TcpTransport::new(endpoint)), dialect)
    }
}

impl<T: Transport> Monitor<T> {
    pub fn new(session: Session<T>, dialect: Dialect) -> Self {
        Self { session, dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.session.transport().endpoint()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub async fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        self.session.connect(options).await
    }

    pub async fn disconnect(&mut self) {
        self.session.disconnect().await
    }

    /// Send a command and return whatever the monitor printed in reply
    pub async fn query(&mut self, command: &str) -> Result<String> {
        debug!("Monitor command: {}", command);
        self.session.write_line(command).await?;
        let response = self.session.read_available().await?;
        debug!("Monitor replied with {} bytes", response.len());
        Ok(response)
    }

    /// Devices attached to the VM, one record per `info usb` line
    pub async fn list_vm_devices(&mut self) -> Result<Vec<DeviceRecord>> {
        let response = self.query(INFO_USB).await?;
        Ok(parse_vm_devices(&response))
    }

    /// Devices visible to the host, one record per `info usbhost` entry
    pub async fn list_host_devices(&mut self) -> Result<Vec<DeviceRecord>> {
        let response = self.query(INFO_USBHOST).await?;
        Ok(parse_host_devices(&response)?)
    }

    /// Host devices, each merged with the VM devices sharing its product
    pub async fn list_devices_reconciled(&mut self) -> Result<Vec<DeviceRecord>> {
        let host = self.list_host_devices().await?;
        let vm = self.list_vm_devices().await?;
        Ok(reconcile(host, &vm))
    }

    /// Host devices currently attached to the VM
    pub async fn list_attached_devices(&mut self) -> Result<Vec<DeviceRecord>> {
        Ok(attached(self.list_devices_reconciled().await?))
    }

    /// Whether the device with this vendor:product id is attached
    pub async fn is_identifier_connected(&mut self, identifier: &str) -> Result<bool> {
        let devices = self.list_attached_devices().await?;
        Ok(find_by_identifier(identifier, &devices).is_some())
    }

    /// Slot id of the attached device with this identifier
    ///
    /// Returns `identifier` unchanged when no attached device matches.
    /// Pass `prefetched` to reuse an attached-device list already fetched.
    pub async fn resolve_slot(
        &mut self,
        identifier: &str,
        prefetched: Option<&[DeviceRecord]>,
    ) -> Result<String> {
        match prefetched {
            Some(devices) => Ok(slot_for(identifier, devices)),
            None => {
                let devices = self.list_attached_devices().await?;
                Ok(slot_for(identifier, &devices))
            }
        }
    }

    async fn run_command(&mut self, command: &str) -> Result<CommandOutcome> {
        let response = self.query(command).await?;
        if is_rejection(&response) {
            warn!("Monitor rejected '{}': {}", command, response.trim());
            Ok(CommandOutcome::Rejected { response })
        } else {
            Ok(CommandOutcome::Applied)
        }
    }

    /// Attach one device
    ///
    /// Bare `vvvv:pppp` identifiers gain a `host:` prefix first. With
    /// `skip_duplicates`, an already attached device is left alone and
    /// nothing is sent.
    pub async fn add_device(
        &mut self,
        identifier: &str,
        skip_duplicates: bool,
    ) -> Result<CommandOutcome> {
        let identifier = normalize_identifier(identifier);

        if skip_duplicates && self.is_identifier_connected(&identifier).await? {
            info!("Device {} is already attached, skipping", identifier);
            return Ok(CommandOutcome::SkippedDuplicate);
        }

        let command = match self.dialect.add_command(&identifier) {
            Ok(command) => command,
            Err(e) => return Ok(invalid(&identifier, e)),
        };
        let outcome = self.run_command(&command).await?;
        if outcome.is_applied() {
            info!("Added device {}", identifier);
        }
        Ok(outcome)
    }

    /// Attach each device in turn
    ///
    /// Attachment state is re-read for every device, so an identifier
    /// repeated in the list is skipped the second time.
    pub async fn add_devices<S: AsRef<str>>(
        &mut self,
        identifiers: &[S],
        skip_duplicates: bool,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for identifier in identifiers {
            let identifier = identifier.as_ref();
            let outcome = self.add_device(identifier, skip_duplicates).await?;
            report.entries.push((identifier.to_string(), outcome));
        }
        Ok(report)
    }

    async fn remove_with(
        &mut self,
        identifier: &str,
        attached: &[DeviceRecord],
    ) -> Result<CommandOutcome> {
        let target = match self.dialect.removal_target(identifier, attached) {
            Ok(target) => target,
            Err(e) => return Ok(invalid(identifier, e)),
        };
        let command = self.dialect.remove_command(&target);
        let outcome = self.run_command(&command).await?;
        if outcome.is_applied() {
            info!("Removed device {} ({})", identifier, target);
        }
        Ok(outcome)
    }

    /// Detach one device
    ///
    /// The identifier is resolved against the attached devices: to its
    /// slot id for `usb_del`, or to its alias (falling back to the id used
    /// by `device_add`) for `device_del`. There is no duplicate guard.
    pub async fn remove_device(&mut self, identifier: &str) -> Result<CommandOutcome> {
        let attached = self.list_attached_devices().await?;
        self.remove_with(identifier, &attached).await
    }

    /// Detach each device in turn, resolving all against one listing
    pub async fn remove_devices<S: AsRef<str>>(&mut self, identifiers: &[S]) -> Result<BatchReport> {
        let attached = self.list_attached_devices().await?;
        let mut report = BatchReport::default();
        for identifier in identifiers {
            let identifier = identifier.as_ref();
            let outcome = self.remove_with(identifier, &attached).await?;
            report.entries.push((identifier.to_string(), outcome));
        }
        Ok(report)
    }
}

fn invalid(identifier: &str, err: ProtocolError) -> CommandOutcome {
    warn!("Skipping device {}: {}", identifier, err);
    CommandOutcome::Invalid {
        reason: err.to_string(),
    }
}
