//! Failure reporting capability.
//!
//! Validators thread an explicit sink instead of a global test context.
//! Hard failures are returned as errors and propagated with `?`; soft
//! failures are recorded on the sink and the validator continues.

use std::fmt;
use std::sync::Mutex;

use crate::error::ValidationError;

/// Severity of a recorded entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Recorded, scenario continues.
    Soft,
    /// The validator aborted on this failure.
    Hard,
}

/// One recorded failure.
#[derive(Debug, Clone)]
pub struct Failure {
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Soft => write!(f, "[soft] {}", self.message),
            Severity::Hard => write!(f, "[hard] {}", self.message),
        }
    }
}

/// Sink for validator failures.
///
/// `fail` records the failure and hands back the error the caller must
/// propagate — the core never swallows an assertion failure.
pub trait ReportSink: Send + Sync {
    /// Record a soft failure; the validator continues.
    fn soft(&self, message: String);

    /// Record a hard failure and build the error to propagate.
    #[must_use]
    fn fail(&self, error: ValidationError) -> ValidationError;
}

/// Sink that keeps failures in memory for later inspection by the
/// orchestrator (or a test).
#[derive(Debug, Default)]
pub struct RecordingSink {
    failures: Mutex<Vec<Failure>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    #[must_use]
    pub fn failures(&self) -> Vec<Failure> {
        self.failures.lock().expect("sink poisoned").clone()
    }

    /// True when no failure of any severity was recorded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.lock().expect("sink poisoned").is_empty()
    }

    fn record(&self, severity: Severity, message: String) {
        self.failures
            .lock()
            .expect("sink poisoned")
            .push(Failure { severity, message });
    }
}

impl ReportSink for RecordingSink {
    fn soft(&self, message: String) {
        tracing::warn!(%message, "soft validation failure");
        self.record(Severity::Soft, message);
    }

    fn fail(&self, error: ValidationError) -> ValidationError {
        tracing::error!(%error, "validation failure");
        self.record(Severity::Hard, error.to_string());
        error
    }
}

/// Sink that only logs, for callers that rely purely on returned errors.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn soft(&self, message: String) {
        tracing::warn!(%message, "soft validation failure");
    }

    fn fail(&self, error: ValidationError) -> ValidationError {
        tracing::error!(%error, "validation failure");
        error
    }
}
