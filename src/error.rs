//! Error types for device sessions, inventory loading and remediation failures.
//!
//! [`ConnectError`] covers everything that can go wrong while talking to a device.
//! Every variant maps onto exactly one [`FailureKind`], the operator-facing taxonomy
//! that ends up on the console and in the failure log.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError;

/// Errors that can occur while connecting to or driving a device.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The TCP connection or the login exchange did not finish in time.
    #[error("connect timeout after {0}s")]
    ConnectTimeout(u64),

    /// The device could not be reached at the socket level.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The device rejected the username or password.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// Logged in, but privileged (enable) mode could not be reached.
    #[error("privileged mode not reachable, prompt is '{0}'")]
    PrivilegeDenied(String),

    /// The target state cannot be reached from the current state.
    #[error("unreachable state {0}")]
    UnreachableState(String),

    /// The device handler was built from invalid patterns.
    #[error("invalid device handler config: {0}")]
    InvalidDeviceHandlerConfig(String),

    /// The telnet channel was closed while waiting for a prompt.
    #[error("channel disconnect on wait prompt")]
    ChannelDisconnectError,

    /// The session has already been closed.
    #[error("connect closed")]
    ConnectClosedError,

    /// Command execution timed out.
    ///
    /// The error contains the partial output received before the timeout.
    #[error("exec command timeout: {0}")]
    ExecTimeout(String),

    /// The device answered a command with an error line.
    #[error("command '{command}' rejected: {output}")]
    CommandRejected { command: String, output: String },

    /// An error occurred in the async-ssh2-tokio library.
    #[error("async ssh2 error: {0}")]
    Ssh2Error(#[from] async_ssh2_tokio::Error),

    /// Failed to send data through the channel.
    #[error("Failed to send data: {0}")]
    SendDataError(#[from] SendError<String>),

    #[error("internal error: {0}")]
    InternalServerError(String),
}

impl ConnectError {
    /// Maps a session error onto the operator-facing failure taxonomy.
    ///
    /// Timeouts and lost channels mean the device stopped answering, whether that
    /// happened during login or halfway through a configuration push.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ConnectError::ConnectTimeout(_)
            | ConnectError::ConnectFailed(_)
            | ConnectError::ChannelDisconnectError
            | ConnectError::ConnectClosedError
            | ConnectError::ExecTimeout(_)
            | ConnectError::SendDataError(_) => FailureKind::Unreachable,
            ConnectError::AuthRejected(_) => FailureKind::AuthRejected,
            ConnectError::PrivilegeDenied(_)
            | ConnectError::UnreachableState(_)
            | ConnectError::InvalidDeviceHandlerConfig(_)
            | ConnectError::CommandRejected { .. }
            | ConnectError::Ssh2Error(_)
            | ConnectError::InternalServerError(_) => FailureKind::Other,
        }
    }
}

/// Device-local failure classes. None of them is fatal to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network failure or the device stopped responding.
    Unreachable,
    /// The device refused the operator's credentials.
    AuthRejected,
    /// Privilege problems and unexpected device responses.
    Other,
}

impl FailureKind {
    /// One-line console message for a failed device.
    pub fn console_hint(&self, name: &str) -> String {
        match self {
            FailureKind::Unreachable => {
                format!("Telnet is not working to {name}. Ensure device is reachable.")
            }
            FailureKind::AuthRejected => format!(
                "Check your Username/Password for {name}. Make sure you have an account on this device."
            ),
            FailureKind::Other => format!(
                "Something else has gone wrong on {name}. Ensure you have the correct priv level."
            ),
        }
    }

    /// Remediation hint written to the failure log.
    pub fn log_hint(&self, name: &str, inventory: &str) -> String {
        match self {
            FailureKind::Unreachable => format!(
                "Telnet is not working to {name}. Ensure device is reachable. Verify correct IP in [{inventory}]"
            ),
            FailureKind::AuthRejected => format!(
                "Check your username/password to {name}. Make sure you have an account on this device."
            ),
            FailureKind::Other => {
                format!("Ensure your permissions are correct for {name}")
            }
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Unreachable => "unreachable",
            FailureKind::AuthRejected => "auth_rejected",
            FailureKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Errors raised while reading the device inventory.
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("failed to read inventory {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("inventory header is missing column '{0}'")]
    MissingColumn(&'static str),

    #[error("inventory is empty")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_classified_as_unreachable() {
        assert_eq!(
            ConnectError::ConnectTimeout(60).failure_kind(),
            FailureKind::Unreachable
        );
        assert_eq!(
            ConnectError::ExecTimeout(String::new()).failure_kind(),
            FailureKind::Unreachable
        );
    }

    #[test]
    fn credential_rejection_is_its_own_kind() {
        let err = ConnectError::AuthRejected("% Login invalid".to_string());
        assert_eq!(err.failure_kind(), FailureKind::AuthRejected);
    }

    #[test]
    fn privilege_problems_fall_into_other() {
        let err = ConnectError::PrivilegeDenied("router1>".to_string());
        assert_eq!(err.failure_kind(), FailureKind::Other);
    }

    #[test]
    fn hints_name_the_device() {
        for kind in [
            FailureKind::Unreachable,
            FailureKind::AuthRejected,
            FailureKind::Other,
        ] {
            assert!(kind.console_hint("core-sw1").contains("core-sw1"));
            assert!(kind.log_hint("core-sw1", "DeviceDB.csv").contains("core-sw1"));
        }
    }
}
