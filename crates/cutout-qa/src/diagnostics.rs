//! Evaluation diagnostics: per-check timing and outcomes.
//!
//! Every evaluation collects these alongside its result so slow checks
//! and recovered check failures can be spotted without a debugger.
//!
//! Timestamps come from the `web-time` crate, which uses
//! `performance.now()` on WASM and `std::time::Instant` on native.
//! Durations are serialized as fractional seconds (`f64`) because
//! `std::time::Duration` does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::profile::SubjectCase;
use crate::types::{CheckKind, CheckResult, Dimensions, HardFailReason, Severity};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom("duration seconds must be finite and non-negative")
        })
    }
}

/// Diagnostics from one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationDiagnostics {
    /// Image size.
    pub dimensions: Dimensions,
    /// Profile that was applied.
    pub case: SubjectCase,
    /// Checks in the order they ran.
    pub checks: Vec<CheckDiagnostics>,
    /// The gate that ended the run, if any.
    pub hard_fail_reason: Option<HardFailReason>,
    /// Wall-clock duration of the whole evaluation.
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

/// Timing and outcome of one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckDiagnostics {
    /// Which check.
    pub kind: CheckKind,
    /// Wall-clock duration.
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// What it concluded.
    pub outcome: CheckOutcome,
}

/// How a check ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    /// The check produced its own result.
    Completed {
        /// Whether it passed.
        passed: bool,
        /// Reported severity.
        severity: Severity,
        /// Measured value.
        value: f64,
        /// Score penalty.
        penalty: f64,
    },
    /// The check failed internally and a neutral result was substituted.
    Recovered {
        /// The error message.
        error: String,
    },
}

impl CheckOutcome {
    /// Outcome of a check that returned `result`.
    #[must_use]
    pub const fn completed(result: &CheckResult) -> Self {
        Self::Completed {
            passed: result.passed,
            severity: result.severity,
            value: result.value,
            penalty: result.penalty,
        }
    }
}

impl EvaluationDiagnostics {
    /// Sum of the per-check durations.
    #[must_use]
    pub fn checks_duration(&self) -> Duration {
        self.checks.iter().map(|c| c.duration).sum()
    }

    /// Checks that failed internally.
    pub fn recovered(&self) -> impl Iterator<Item = &CheckDiagnostics> {
        self.checks
            .iter()
            .filter(|c| matches!(c.outcome, CheckOutcome::Recovered { .. }))
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Evaluation Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)  Case: {}",
            self.dimensions.width,
            self.dimensions.height,
            self.dimensions.pixel_count(),
            self.case.code(),
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        if let Some(reason) = self.hard_fail_reason {
            lines.push(format!("Hard fail: {} ({})", reason.code(), reason.describe()));
        }
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Check", "Duration", "% Total", "Outcome"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for check in &self.checks {
            let ms = duration_ms(check.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "{:<24} {ms:>8.3}ms {pct:>9.1}%  {}",
                check.kind.name(),
                format_outcome(&check.outcome),
            ));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_outcome(outcome: &CheckOutcome) -> String {
    match outcome {
        CheckOutcome::Completed {
            passed,
            severity,
            value,
            penalty,
        } => {
            let status = if *passed { "pass" } else { "FLAG" };
            format!("{status} {severity:?} value={value:.4} penalty={penalty:.3}")
        }
        CheckOutcome::Recovered { error } => format!("recovered: {error}"),
    }
}
