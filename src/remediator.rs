//! Per-device remediation state machine.
//!
//! One [`Remediator::remediate`] call owns a device from connect to disconnect:
//!
//! ```text
//! Connecting -> Inspecting -> {AlreadyV2 | NeedsV2Only | NeedsFullSetup}
//!            -> Applying -> Verifying -> Persisting -> Disconnecting
//! ```
//!
//! Any stage can fail. A failure is classified into a [`FailureKind`], printed as a one-line
//! hint, appended to the failure log and returned as the device's outcome; it never
//! propagates to the caller.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::{self, SessionSettings};
use crate::credentials::Credentials;
use crate::error::{ConnectError, FailureKind};
use crate::failure_log::{FailureRecord, FailureSink};
use crate::inventory::DeviceTarget;
use crate::posture::{
    POSTURE_QUERY, RemediationPlan, SAVE_CONFIG, SshState, StepBudget, VTY_SECTION_QUERY,
};
use crate::session::{Connector, DeviceSession};

const BANNER_FILL: &str = "====================";

/// Where in the lifecycle a device currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Connecting,
    Inspecting,
    Applying,
    Verifying,
    Persisting,
    Disconnecting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Connecting => "connecting",
            Stage::Inspecting => "inspecting",
            Stage::Applying => "applying",
            Stage::Verifying => "verifying",
            Stage::Persisting => "persisting",
            Stage::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Final status of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Key generation and/or protocol change were pushed and saved.
    Applied,
    /// SSH v2 was already on; only the transport safety net was re-applied.
    AlreadyCompliant,
    Failed(FailureKind),
}

/// Result of remediating one device. Produced exactly once per device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RemediationOutcome {
    pub target: DeviceTarget,
    pub status: OutcomeStatus,
    /// Classification, when the posture query got that far.
    pub state: Option<SshState>,
    /// Console text: the bannered transcript, or the failure hint.
    pub transcript: String,
    pub elapsed_ms: u64,
}

impl RemediationOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed(_))
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self.status {
            OutcomeStatus::Failed(kind) => Some(kind),
            _ => None,
        }
    }
}

/// Timeouts and switches for a remediation run.
#[derive(Debug, Clone)]
pub struct RemediationOptions {
    pub command_timeout: Duration,
    pub keygen_timeout: Duration,
    pub probe_ssh: bool,
    /// Inventory name quoted in "verify the IP" hints.
    pub inventory_label: String,
}

impl RemediationOptions {
    pub fn from_session(session: &SessionSettings) -> Self {
        Self {
            command_timeout: session.command_timeout,
            keygen_timeout: session.keygen_timeout,
            ..Self::default()
        }
    }

    fn budget(&self, budget: StepBudget) -> Duration {
        match budget {
            StepBudget::Standard => self.command_timeout,
            StepBudget::KeyGeneration => self.keygen_timeout,
        }
    }
}

impl Default for RemediationOptions {
    fn default() -> Self {
        let session = SessionSettings::default();
        Self {
            command_timeout: session.command_timeout,
            keygen_timeout: session.keygen_timeout,
            probe_ssh: false,
            inventory_label: config::DEFAULT_INVENTORY.to_string(),
        }
    }
}

/// A failure tagged with the stage it happened in.
#[derive(Debug)]
struct StageFailure {
    stage: Stage,
    error: ConnectError,
}

fn at(stage: Stage) -> impl FnOnce(ConnectError) -> StageFailure {
    move |error| StageFailure { stage, error }
}

/// Transcript bounded by Begin/End banners naming the device.
struct Transcript {
    name: String,
    text: String,
}

impl Transcript {
    fn begin(name: &str) -> Self {
        Self {
            name: name.to_string(),
            text: format!("{BANNER_FILL}Begin {name}{BANNER_FILL}\n"),
        }
    }

    fn line(&mut self, line: impl AsRef<str>) {
        self.text.push_str(line.as_ref());
        self.text.push('\n');
    }

    fn block(&mut self, block: &str) {
        let block = block.trim_end();
        if !block.is_empty() {
            self.line(block);
        }
    }

    fn finish(mut self) -> String {
        self.text
            .push_str(&format!("{BANNER_FILL}End {}{BANNER_FILL}", self.name));
        self.text
    }
}

/// Drives devices through the remediation lifecycle.
pub struct Remediator<C: Connector> {
    connector: Arc<C>,
    credentials: Arc<Credentials>,
    failure_log: Arc<dyn FailureSink>,
    options: RemediationOptions,
}

impl<C: Connector> Remediator<C> {
    pub fn new(
        connector: Arc<C>,
        credentials: Arc<Credentials>,
        failure_log: Arc<dyn FailureSink>,
        options: RemediationOptions,
    ) -> Self {
        Self {
            connector,
            credentials,
            failure_log,
            options,
        }
    }

    pub fn options(&self) -> &RemediationOptions {
        &self.options
    }

    /// Remediates one device. Never fails: errors become a `Failed` outcome.
    pub async fn remediate(&self, target: DeviceTarget) -> RemediationOutcome {
        let started = Instant::now();
        let name = target.display_name.clone();
        debug!("{} connecting", target);

        let mut session = match self.connector.connect(&target, &self.credentials).await {
            Ok(session) => session,
            Err(err) => {
                return self.fail(target, Stage::Connecting, err, started);
            }
        };

        let mut transcript = Transcript::begin(&name);
        let result = self.run(&target, &mut session, &mut transcript).await;

        // Close before any further connection attempt to the same device.
        if let Err(err) = session.disconnect().await {
            debug!("{} error while {}: {}", target, Stage::Disconnecting, err);
        }
        drop(session);

        let state = match result {
            Ok(state) => state,
            Err(failure) => {
                debug!("{} partial transcript:\n{}", target, transcript.text);
                return self.fail(target, failure.stage, failure.error, started);
            }
        };

        if self.options.probe_ssh {
            match self.connector.probe_ssh(&target, &self.credentials).await {
                Ok(()) => transcript.line(format!("SSH login check on {name}: ok")),
                Err(err) => {
                    warn!("{} SSH login check failed: {}", target, err);
                    transcript.line(format!("SSH login check on {name}: failed ({err})"));
                }
            }
        }

        let status = match state {
            SshState::AlreadyV2 => OutcomeStatus::AlreadyCompliant,
            SshState::NeedsV2Only | SshState::NeedsFullSetup => OutcomeStatus::Applied,
        };
        info!("{} remediated: {:?} ({:?})", target, status, state);

        RemediationOutcome {
            target,
            status,
            state: Some(state),
            transcript: transcript.finish(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Inspect, decide, apply, verify and persist on an open session.
    async fn run(
        &self,
        target: &DeviceTarget,
        session: &mut C::Session,
        transcript: &mut Transcript,
    ) -> Result<SshState, StageFailure> {
        let name = &target.display_name;
        let timeout = self.options.command_timeout;

        let posture = session
            .send_command(POSTURE_QUERY, timeout)
            .await
            .map_err(at(Stage::Inspecting))?;
        let plan = RemediationPlan::from_posture(&posture.content);
        debug!("{} classified as {:?}", target, plan.state);
        transcript.line(plan.summary(name));
        transcript.block(&posture.content);

        for step in &plan.steps {
            debug!("{} applying {:?}", target, step.kind);
            session
                .send_config_set(&step.commands, self.options.budget(step.budget))
                .await
                .map_err(at(Stage::Applying))?;
        }
        transcript.line("Applied:");
        for command in plan.commands() {
            transcript.line(format!("  {command}"));
        }

        let vty = session
            .send_command(VTY_SECTION_QUERY, timeout)
            .await
            .map_err(at(Stage::Verifying))?;
        transcript.block(&vty.content);

        let saved = session
            .send_command(SAVE_CONFIG, timeout)
            .await
            .map_err(at(Stage::Persisting))?;
        if !saved.success {
            return Err(StageFailure {
                stage: Stage::Persisting,
                error: ConnectError::CommandRejected {
                    command: SAVE_CONFIG.to_string(),
                    output: saved.content.trim().to_string(),
                },
            });
        }

        Ok(plan.state)
    }

    fn fail(
        &self,
        target: DeviceTarget,
        stage: Stage,
        err: ConnectError,
        started: Instant,
    ) -> RemediationOutcome {
        warn!("{} failed while {}: {}", target, stage, err);
        let mut outcome = self.record_failure(target, err.failure_kind());
        outcome.elapsed_ms = started.elapsed().as_millis() as u64;
        outcome
    }

    /// Logs a failed device and builds its outcome.
    pub(crate) fn record_failure(&self, target: DeviceTarget, kind: FailureKind) -> RemediationOutcome {
        let name = &target.display_name;
        let record = FailureRecord::new(
            name.clone(),
            kind,
            kind.log_hint(name, &self.options.inventory_label),
        );
        if let Err(err) = self.failure_log.append(&record) {
            error!("failed to write failure log for {}: {}", name, err);
        }
        RemediationOutcome {
            transcript: kind.console_hint(name),
            target,
            status: OutcomeStatus::Failed(kind),
            state: None,
            elapsed_ms: 0,
        }
    }
}
