//! Assertion context and reporting sinks.
//!
//! Every scenario plans a fixed number of assertions up front. A scenario
//! passes only if it records exactly that many outcomes, all of them pass,
//! and nothing unexpected went wrong on the side (a failed `close`, a
//! handle missing part of the capability set).

use std::fmt;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::StoreError;
use crate::handle::{HandleRef, conforms};

/// One recorded assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub passed: bool,
    pub description: String,
    /// What went wrong, for failed outcomes.
    pub detail: Option<String>,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed { "ok" } else { "not ok" };
        match &self.detail {
            Some(detail) => write!(f, "{mark} - {} ({detail})", self.description),
            None => write!(f, "{mark} - {}", self.description),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Assertion context
// ------------------------------------------------------------------------------------------------

/// Per-scenario assertion context.
#[derive(Debug)]
pub struct Assert {
    name: String,
    plan: usize,
    outcomes: Vec<Outcome>,
    unexpected: Vec<String>,
}

impl Assert {
    pub fn new(name: impl Into<String>, plan: usize) -> Self {
        Self {
            name: name.into(),
            plan,
            outcomes: Vec::with_capacity(plan),
            unexpected: Vec::new(),
        }
    }

    fn record(&mut self, passed: bool, description: &str, detail: Option<String>) {
        let outcome = Outcome {
            passed,
            description: description.to_string(),
            detail,
        };
        debug!(scenario = %self.name, "{outcome}");
        self.outcomes.push(outcome);
    }

    /// Passes if `condition` holds.
    pub fn ok(&mut self, condition: bool, description: &str) {
        let detail = (!condition).then(|| "expected true".to_string());
        self.record(condition, description, detail);
    }

    /// Passes if `condition` does not hold.
    pub fn not_ok(&mut self, condition: bool, description: &str) {
        let detail = condition.then(|| "expected false".to_string());
        self.record(!condition, description, detail);
    }

    /// Passes if `result` carries no error.
    pub fn error<T>(&mut self, result: &Result<T, StoreError>, description: &str) {
        match result {
            Ok(_) => self.record(true, description, None),
            Err(e) => self.record(false, description, Some(e.to_string())),
        }
    }

    /// Exact equality. Passes only for equal scalars; arrays and objects
    /// are never exactly equal to anything, use
    /// [`deep_equal`](Self::deep_equal) for those.
    pub fn is(&mut self, actual: &Result<Value, StoreError>, expected: &Value, description: &str) {
        match actual {
            Ok(value) if value == expected && !is_container(expected) => {
                self.record(true, description, None)
            }
            Ok(value) => self.record(
                false,
                description,
                Some(format!("expected exactly {expected}, got {value}")),
            ),
            Err(e) => self.record(false, description, Some(e.to_string())),
        }
    }

    /// Structural equality.
    pub fn deep_equal(
        &mut self,
        actual: &Result<Value, StoreError>,
        expected: &Value,
        description: &str,
    ) {
        match actual {
            Ok(value) if value == expected => self.record(true, description, None),
            Ok(value) => self.record(
                false,
                description,
                Some(format!("expected {expected}, got {value}")),
            ),
            Err(e) => self.record(false, description, Some(e.to_string())),
        }
    }

    /// Records an error outside the planned assertions.
    pub fn unexpected(&mut self, context: &str, error: impl fmt::Display) {
        warn!(scenario = %self.name, "{context}: {error}");
        self.unexpected.push(format!("{context}: {error}"));
    }

    /// Flags `db` if it does not expose the full capability set.
    pub fn conforming(&mut self, db: &HandleRef) {
        if !conforms(db.as_ref()) {
            self.unexpected("factory output", "handle does not expose the full capability set");
        }
    }

    /// Closes `db`, recording a failure as unexpected.
    pub async fn close(&mut self, db: &HandleRef) {
        if let Err(e) = db.close().await {
            self.unexpected("close", e);
        }
    }

    pub fn finish(self) -> Report {
        Report {
            name: self.name,
            plan: self.plan,
            outcomes: self.outcomes,
            unexpected: self.unexpected,
        }
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

// ------------------------------------------------------------------------------------------------
// Reports
// ------------------------------------------------------------------------------------------------

/// Result of one scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub name: String,
    pub plan: usize,
    pub outcomes: Vec<Outcome>,
    pub unexpected: Vec<String>,
}

impl Report {
    pub fn passed(&self) -> bool {
        self.outcomes.len() == self.plan
            && self.outcomes.iter().all(|o| o.passed)
            && self.unexpected.is_empty()
    }

    /// Outcomes that did not pass.
    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }
}

/// Where finished reports go.
pub trait Sink: Send {
    fn report(&mut self, report: &Report);
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct Collector {
    reports: Vec<Report>,
}

impl Collector {
    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn get(&self, name: &str) -> Option<&Report> {
        self.reports.iter().find(|r| r.name == name)
    }

    pub fn into_reports(self) -> Vec<Report> {
        self.reports
    }
}

impl Sink for Collector {
    fn report(&mut self, report: &Report) {
        self.reports.push(report.clone());
    }
}

/// Logs every outcome through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl Sink for TracingSink {
    fn report(&mut self, report: &Report) {
        for outcome in &report.outcomes {
            if outcome.passed {
                info!(scenario = %report.name, "{outcome}");
            } else {
                warn!(scenario = %report.name, "{outcome}");
            }
        }
        for error in &report.unexpected {
            warn!(scenario = %report.name, "unexpected error: {error}");
        }
        if report.outcomes.len() != report.plan {
            warn!(
                scenario = %report.name,
                planned = report.plan,
                recorded = report.outcomes.len(),
                "assertion count does not match plan"
            );
        }
    }
}

/// Totals across a suite run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    /// Names of failed scenarios, in run order.
    pub failures: Vec<String>,
}

impl Summary {
    pub(crate) fn record(&mut self, report: &Report) {
        if report.passed() {
            self.passed += 1;
        } else {
            self.failed += 1;
            self.failures.push(report.name.clone());
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}
