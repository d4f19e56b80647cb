//! SSH posture classification and the remediation plan it implies.
//!
//! The posture query output is matched against an ordered rule table; the first rule whose
//! marker appears in the text decides the [`SshState`]. Each state maps to a fixed list of
//! configuration steps. Nothing here talks to a device, so the whole policy can be tested
//! from captured text alone.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Posture query sent in privileged mode.
pub const POSTURE_QUERY: &str = "show ip ssh | include SSH";
/// Re-reads the management line configuration after the change.
pub const VTY_SECTION_QUERY: &str = "show run | section include line vty";
/// Saves the running configuration.
pub const SAVE_CONFIG: &str = "wr";

pub const KEY_GENERATION: &str = "crypto key generate rsa modulus 2048";
pub const FORCE_VERSION_2: &str = "ip ssh version 2";
pub const MANAGEMENT_LINES: &str = "line vty 0 15";
/// Telnet stays in the accepted list; SSH is only ever added.
pub const TRANSPORT_ACCEPT: &str = "transport input telnet ssh";

pub const V2_ENABLED_MARKER: &str = "SSH Enabled - version 2.0";
pub const V1_99_ENABLED_MARKER: &str = "SSH Enabled - version 1.99";

/// Classified SSH state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SshState {
    /// SSH v2 already running; only the transport safety net is re-applied.
    AlreadyV2,
    /// Key material exists but the protocol is 1.99 (v1 and v2 mixed).
    NeedsV2Only,
    /// No usable key material.
    NeedsFullSetup,
}

/// Ordered classification rules: (marker, state). First hit wins.
pub const CLASSIFICATION_RULES: &[(&str, SshState)] = &[
    (V2_ENABLED_MARKER, SshState::AlreadyV2),
    (V1_99_ENABLED_MARKER, SshState::NeedsV2Only),
];

/// State used when no rule matches.
pub const FALLBACK_STATE: SshState = SshState::NeedsFullSetup;

/// Classifies raw posture query output.
pub fn classify(output: &str) -> SshState {
    CLASSIFICATION_RULES
        .iter()
        .find(|(marker, _)| output.contains(marker))
        .map(|(_, state)| *state)
        .unwrap_or(FALLBACK_STATE)
}

/// What a configuration step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    GenerateKey,
    ForceVersion2,
    AcceptTransport,
}

/// Which timeout budget a step runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepBudget {
    Standard,
    /// RSA key generation is slow on device hardware.
    KeyGeneration,
}

/// A group of configuration-mode commands pushed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlanStep {
    pub kind: StepKind,
    pub commands: Vec<String>,
    pub budget: StepBudget,
}

impl PlanStep {
    fn new(kind: StepKind, commands: &[&str], budget: StepBudget) -> Self {
        Self {
            kind,
            commands: commands.iter().map(|c| c.to_string()).collect(),
            budget,
        }
    }

    pub fn generate_key() -> Self {
        Self::new(
            StepKind::GenerateKey,
            &[KEY_GENERATION],
            StepBudget::KeyGeneration,
        )
    }

    pub fn force_version_2() -> Self {
        Self::new(
            StepKind::ForceVersion2,
            &[FORCE_VERSION_2],
            StepBudget::Standard,
        )
    }

    pub fn accept_transport() -> Self {
        Self::new(
            StepKind::AcceptTransport,
            &[MANAGEMENT_LINES, TRANSPORT_ACCEPT],
            StepBudget::Standard,
        )
    }
}

/// Configuration steps decided for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RemediationPlan {
    pub state: SshState,
    pub steps: Vec<PlanStep>,
}

impl RemediationPlan {
    pub fn for_state(state: SshState) -> Self {
        let steps = match state {
            SshState::AlreadyV2 => vec![PlanStep::accept_transport()],
            SshState::NeedsV2Only => {
                vec![PlanStep::force_version_2(), PlanStep::accept_transport()]
            }
            SshState::NeedsFullSetup => vec![
                PlanStep::generate_key(),
                PlanStep::force_version_2(),
                PlanStep::accept_transport(),
            ],
        };
        Self { state, steps }
    }

    /// Classifies posture output and plans the steps in one go.
    pub fn from_posture(output: &str) -> Self {
        Self::for_state(classify(output))
    }

    /// All commands in the order they are pushed.
    pub fn commands(&self) -> Vec<&str> {
        self.steps
            .iter()
            .flat_map(|step| step.commands.iter().map(String::as_str))
            .collect()
    }

    /// Operator-facing explanation of the classification.
    pub fn summary(&self, name: &str) -> String {
        match self.state {
            SshState::AlreadyV2 => format!("Looks like SSH v2 is already enabled for {name}."),
            SshState::NeedsV2Only => format!(
                "Looks like a crypto key has been generated but SSH v2 is not set on {name}."
            ),
            SshState::NeedsFullSetup => format!(
                "No SSH key found on {name}. Generating an RSA key and enabling SSH v2."
            ),
        }
    }
}
