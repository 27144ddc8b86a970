//! Post-provisioning validation for freshly bootstrapped cluster worker
//! nodes.
//!
//! Given a live VM (Linux or Windows) that just registered as a worker
//! node, this crate asserts the node reached its expected state: installed
//! packages and versions, running services, kernel/network/runtime
//! configuration, and cluster-reported conditions (taints, GPU health,
//! filesystem health).
//!
//! The building blocks:
//!
//! - [`exec`] — sends a script to the VM through a relay pod and returns a
//!   normalized result (exit code, stdout, stderr), plus the exit-code
//!   assertion wrapper nearly every check goes through.
//! - [`template`] — per-platform command templates (POSIX / PowerShell).
//! - [`compare`] — the comparison and normalization policies.
//! - [`poll`] — fixed-interval convergence polling against the cluster's
//!   node-status API, with deadline and cancellation.
//! - [`validators`] — one declarative check per observable property.
//!
//! Provisioning the VM, establishing the relay and reporting results to a
//! test framework belong to the orchestrator; it hands this crate a
//! [`scenario::Scenario`] and consumes the returned errors plus whatever
//! the [`report::ReportSink`] recorded.

pub mod cluster;
pub mod compare;
pub mod config;
pub mod error;
pub mod exec;
pub mod poll;
pub mod report;
pub mod scenario;
pub mod settings;
pub mod template;
pub mod validators;

#[cfg(test)]
pub(crate) mod testutil;

pub use cluster::{
    ClusterNodes, ConditionObservation, ConditionStatus, ConditionTarget, NodeSnapshot,
    NodeStatusSource,
};
pub use config::HarnessConfig;
pub use error::{Result, ValidationError};
pub use exec::relay::RelayExecutor;
pub use exec::{ExecutionResult, ExitCode, Interpreter, Platform, PodRef, RemoteExecutor, Script, Target};
pub use poll::{poll_until, ConditionPoller, PollState};
pub use report::{Failure, RecordingSink, ReportSink, Severity};
pub use scenario::Scenario;
pub use settings::WindowsSettings;
