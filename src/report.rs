//! Console text and the JSON run report.

use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local};
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};

use crate::posture::{FORCE_VERSION_2, KEY_GENERATION, MANAGEMENT_LINES, TRANSPORT_ACCEPT};
use crate::remediator::{OutcomeStatus, RemediationOutcome};

const RULE: &str = "###################################################";

/// Text printed before any device is touched.
pub fn startup_banner() -> String {
    format!(
        "Ensure \"ip domain-name\" is set on all devices.\n\
         This script will attempt to run these commands:\n\
         conf t\n\
         {KEY_GENERATION}\n\
         # the above command takes a while, so the wait is longer.\n\
         {FORCE_VERSION_2}\n\
         {MANAGEMENT_LINES}\n\
         {TRANSPORT_ACCEPT}\n\
         # telnet stays enabled for safety.\n\
         *** test with one device first! ***\n"
    )
}

/// Outcome counts for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Summary {
    pub applied: usize,
    pub already_compliant: usize,
    pub failed: usize,
}

impl Summary {
    pub fn from_outcomes(outcomes: &[RemediationOutcome]) -> Self {
        outcomes
            .iter()
            .fold(Summary::default(), |mut summary, outcome| {
                match outcome.status {
                    OutcomeStatus::Applied => summary.applied += 1,
                    OutcomeStatus::AlreadyCompliant => summary.already_compliant += 1,
                    OutcomeStatus::Failed(_) => summary.failed += 1,
                }
                summary
            })
    }

    pub fn total(&self) -> usize {
        self.applied + self.already_compliant + self.failed
    }
}

/// Closing block with counts, failure log location and wall-clock time.
pub fn render_summary(summary: &Summary, failure_log: &Path, elapsed: Duration) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "{RULE}\n");
    let _ = writeln!(
        text,
        "Complete! {} device(s): {} applied, {} already compliant, {} failed.",
        summary.total(),
        summary.applied,
        summary.already_compliant,
        summary.failed
    );
    let _ = writeln!(text, "See {} for errors!", failure_log.display());
    let _ = writeln!(text, "Total time for script: {}\n", format_elapsed(elapsed));
    text.push_str(RULE);
    text
}

/// `H:MM:SS.mmm`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!(
        "{}:{:02}:{:02}.{:03}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        elapsed.subsec_millis()
    )
}

/// Machine-readable record of a run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunReport {
    pub started_at: DateTime<Local>,
    pub elapsed_ms: u64,
    pub summary: Summary,
    pub outcomes: Vec<RemediationOutcome>,
}

impl RunReport {
    pub fn new(
        started_at: DateTime<Local>,
        elapsed: Duration,
        outcomes: Vec<RemediationOutcome>,
    ) -> Self {
        Self {
            started_at,
            elapsed_ms: elapsed.as_millis() as u64,
            summary: Summary::from_outcomes(&outcomes),
            outcomes,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// JSON schema of [`RunReport`].
pub fn report_schema() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&schema_for!(RunReport))
}
