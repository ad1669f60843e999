//! Verification report and its aggregate.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
    Warn,
}

impl CheckStatus {
    pub fn label(self) -> &'static str {
        match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Warn => "WARN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VerificationSummary {
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
}

impl VerificationSummary {
    pub fn tally(checks: &[CheckResult]) -> Self {
        checks.iter().fold(Self::default(), |mut summary, check| {
            match check.status {
                CheckStatus::Pass => summary.passed += 1,
                CheckStatus::Fail => summary.failed += 1,
                CheckStatus::Warn => summary.warnings += 1,
            }
            summary
        })
    }
}

/// Immutable once built; the summary is always derived from `checks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    timestamp: DateTime<Utc>,
    hostname: String,
    summary: VerificationSummary,
    checks: Vec<CheckResult>,
}

impl VerificationReport {
    pub fn new(hostname: impl Into<String>, checks: Vec<CheckResult>) -> Self {
        Self::at(Utc::now(), hostname, checks)
    }

    pub fn at(timestamp: DateTime<Utc>, hostname: impl Into<String>, checks: Vec<CheckResult>) -> Self {
        Self {
            timestamp,
            hostname: hostname.into(),
            summary: VerificationSummary::tally(&checks),
            checks,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn summary(&self) -> VerificationSummary {
        self.summary
    }

    pub fn checks(&self) -> &[CheckResult] {
        &self.checks
    }

    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|check| check.name == name)
    }

    /// Warnings never affect the outcome.
    pub fn success(&self) -> bool {
        self.summary.failed == 0
    }

    pub fn exit_code(&self) -> u8 {
        if self.success() { 0 } else { 1 }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
