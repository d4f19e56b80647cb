//! Device sessions.
//!
//! The remediator drives devices through two small traits: a [`Connector`] opens one
//! [`DeviceSession`] per target, and the session runs show commands in privileged mode and
//! configuration command sets in configuration mode. [`TelnetConnector`] is the real
//! implementation: a telnet transport with RFC 854 option handling, a prompt state machine
//! for login, privilege escalation and mode switching, and an optional SSH login probe.
//!
//! # Main Components
//!
//! - [`TelnetClient`] - One logged-in telnet CLI session with state tracking
//! - [`TelnetConnector`] - Opens [`TelnetClient`]s with the run's session settings
//! - [`Output`] - Command execution results

use async_trait::async_trait;
use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::RegexSet;
use std::time::Duration;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;

use crate::config::SessionSettings;
use crate::credentials::Credentials;
use crate::device::{DeviceHandler, IGNORE_START_LINE};
use crate::error::ConnectError;
use crate::inventory::DeviceTarget;

pub use telnet::TelnetCodec;

/// The output result of a command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    /// False when the device printed an error line.
    pub success: bool,
    /// Output with the echoed command and the trailing prompt removed.
    pub content: String,
    /// Everything received, including mode switch commands and prompts.
    pub all: String,
    /// Prompt captured by the state machine after command execution.
    pub prompt: Option<String>,
}

/// A logged-in management session on one device.
#[async_trait]
pub trait DeviceSession: Send {
    /// Runs a show command in privileged mode.
    async fn send_command(&mut self, command: &str, timeout: Duration)
    -> Result<Output, ConnectError>;

    /// Enters configuration mode, runs every command, and returns to privileged mode.
    ///
    /// Fails with [`ConnectError::CommandRejected`] on the first command the device refuses.
    async fn send_config_set(
        &mut self,
        commands: &[String],
        timeout: Duration,
    ) -> Result<Output, ConnectError>;

    /// Closes the session. Safe to call more than once.
    async fn disconnect(&mut self) -> Result<(), ConnectError>;
}

/// Opens sessions to devices.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Session: DeviceSession + 'static;

    async fn connect(
        &self,
        target: &DeviceTarget,
        credentials: &Credentials,
    ) -> Result<Self::Session, ConnectError>;

    /// Attempts an SSH login to the target and disconnects right away.
    async fn probe_ssh(
        &self,
        target: &DeviceTarget,
        credentials: &Credentials,
    ) -> Result<(), ConnectError>;
}

/// A telnet CLI session with prompt state tracking.
pub struct TelnetClient {
    device_addr: String,
    sender: Sender<String>,
    recv: Receiver<String>,
    handler: DeviceHandler,
    prompt: String,
    io_task: Option<JoinHandle<()>>,
}

/// Connects to devices over telnet using the run's session settings.
#[derive(Debug, Clone, Default)]
pub struct TelnetConnector {
    settings: SessionSettings,
}

impl TelnetConnector {
    pub fn new(settings: SessionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }
}

#[async_trait]
impl Connector for TelnetConnector {
    type Session = TelnetClient;

    async fn connect(
        &self,
        target: &DeviceTarget,
        credentials: &Credentials,
    ) -> Result<TelnetClient, ConnectError> {
        TelnetClient::connect(target, self.settings.telnet_port, credentials, &self.settings)
            .await
    }

    async fn probe_ssh(
        &self,
        target: &DeviceTarget,
        credentials: &Credentials,
    ) -> Result<(), ConnectError> {
        probe::probe_ssh(
            &target.address,
            self.settings.ssh_port,
            credentials,
            self.settings.connect_timeout,
        )
        .await
    }
}

/// Lines a device prints when it refuses the login.
static AUTH_FAILED: Lazy<RegexSet> = Lazy::new(|| {
    match RegexSet::new([
        r"(?i)^%\s*login invalid",
        r"(?i)^%\s*authentication failed",
        r"(?i)^%\s*access denied",
        r"(?i)^%\s*bad passwords?",
        r"(?i)^login incorrect",
    ]) {
        Ok(set) => set,
        Err(err) => panic!("invalid AUTH_FAILED regex set: {err}"),
    }
});

mod client;
mod probe;
mod telnet;
