//! # ssh-enabler - Bulk SSHv2 remediation for telnet-only Cisco IOS devices
//!
//! `ssh-enabler` logs in to network devices over telnet, checks whether SSH is enabled,
//! and applies the smallest set of configuration commands that brings each device to
//! SSH version 2 with an RSA key, while leaving telnet enabled on the management lines.
//!
//! ## Features
//!
//! - **Posture-driven remediation**: `show ip ssh` output decides whether a key is
//!   generated, the protocol version is forced, or only the vty transport is refreshed
//! - **Prompt state machine**: Login, privileged and configuration modes are tracked from
//!   the device prompt, with automatic answers to login, paging and confirmation questions
//! - **Bounded fan-out**: Devices run in isolated tokio tasks under a concurrency limit
//! - **Failure isolation**: Unreachable, rejected and misbehaving devices are logged to a
//!   failure log and never stop the run
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ssh_enabler::config::SessionSettings;
//! use ssh_enabler::credentials::Credentials;
//! use ssh_enabler::dispatcher::Dispatcher;
//! use ssh_enabler::failure_log::FailureLog;
//! use ssh_enabler::inventory::DeviceTarget;
//! use ssh_enabler::remediator::{RemediationOptions, Remediator};
//! use ssh_enabler::session::TelnetConnector;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = SessionSettings::default();
//!     let remediator = Remediator::new(
//!         Arc::new(TelnetConnector::new(settings)),
//!         Arc::new(Credentials::new("netops", "secret")),
//!         Arc::new(FailureLog::open("SSHEnableFailure.log")?),
//!         RemediationOptions::from_session(&settings),
//!     );
//!     let dispatcher = Dispatcher::new(remediator, 20);
//!
//!     let outcome = dispatcher
//!         .remediate_one(DeviceTarget::new("10.0.0.1", "router1"))
//!         .await;
//!     println!("{}", outcome.transcript);
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`dispatcher::Dispatcher`] - Runs remediations concurrently with a bound
//! - [`remediator::Remediator`] - Per-device connect/inspect/apply/verify/persist lifecycle
//! - [`posture`] - Classification of `show ip ssh` output and remediation plans
//! - [`session::TelnetConnector`] - Telnet sessions with prompt tracking
//! - [`device::DeviceHandler`] - Prompt state machine and mode transitions
//! - [`failure_log::FailureLog`] - Append-only log of failed devices

pub mod config;
pub mod credentials;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod failure_log;
pub mod inventory;
pub mod logging;
pub mod posture;
pub mod prompt;
pub mod remediator;
pub mod report;
pub mod session;
pub mod templates;
