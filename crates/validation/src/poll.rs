//! Convergence polling.
//!
//! The conditions awaited here (GPU fault detection, filesystem-corruption
//! detection) are produced by an independent daemon on the node with
//! bounded but asynchronous latency, so a fixed-interval poll with a
//! generous deadline is the coordination primitive. No backoff, no jitter.
//!
//! Termination semantics: a poll only succeeds when the target was observed
//! in a freshly fetched snapshot; transient fetch errors keep the loop
//! polling; the deadline converts a still-unmet target into a timeout; and
//! an external cancellation is observed at every tick, including while a
//! fetch is in flight.

use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::{ConditionObservation, ConditionTarget, NodeStatusSource};
use crate::error::{Result, ValidationError};

/// Observable state of a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Polling,
    Succeeded,
    TimedOut,
    Cancelled,
}

/// Drive a fetch function until it yields a value, the deadline elapses or
/// the token is cancelled. The first fetch happens immediately.
///
/// `subject` and `node` name what is being awaited, for logs and for the
/// timeout/cancellation errors.
pub async fn poll_until<T, F, Fut>(
    poll_interval: Duration,
    timeout: Duration,
    subject: &str,
    node: &str,
    cancel: &CancellationToken,
    mut fetch: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<Option<T>>>,
{
    let deadline = Instant::now() + timeout;
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut state = PollState::Polling;
    debug!(subject, node, ?poll_interval, ?timeout, "poll started");

    loop {
        debug_assert_eq!(state, PollState::Polling);
        // Biased: cancellation wins over the deadline, the deadline wins
        // over a tick that becomes ready at the same instant.
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                state = PollState::Cancelled;
                info!(subject, node, ?state, "poll cancelled");
                return Err(ValidationError::Cancelled {
                    condition: subject.to_string(),
                    node: node.to_string(),
                });
            }
            () = sleep_until(deadline) => {
                state = PollState::TimedOut;
                info!(subject, node, ?state, "poll deadline elapsed");
                return Err(ValidationError::Timeout {
                    condition: subject.to_string(),
                    node: node.to_string(),
                    elapsed_secs: timeout.as_secs(),
                });
            }
            _ = ticker.tick() => {
                // Cancellation and the deadline must interrupt a slow fetch
                // as well; a fetch that never resolves cannot block the loop.
                let fetched = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        state = PollState::Cancelled;
                        info!(subject, node, ?state, "poll cancelled during fetch");
                        return Err(ValidationError::Cancelled {
                            condition: subject.to_string(),
                            node: node.to_string(),
                        });
                    }
                    () = sleep_until(deadline) => {
                        state = PollState::TimedOut;
                        info!(subject, node, ?state, "poll deadline elapsed during fetch");
                        return Err(ValidationError::Timeout {
                            condition: subject.to_string(),
                            node: node.to_string(),
                            elapsed_secs: timeout.as_secs(),
                        });
                    }
                    fetched = fetch() => fetched,
                };
                match fetched {
                    Ok(Some(value)) => {
                        state = PollState::Succeeded;
                        info!(subject, node, ?state, "poll target observed");
                        return Ok(value);
                    }
                    Ok(None) => {}
                    // Transient fetch failures are tolerated; the external
                    // API may be momentarily unavailable.
                    Err(err) => warn!(subject, node, error = %err, "poll fetch failed, retrying"),
                }
            }
        }
    }
}

/// Fixed-interval poller for cluster-reported node conditions.
#[derive(Debug, Clone, Copy)]
pub struct ConditionPoller {
    pub interval: Duration,
    pub timeout: Duration,
}

impl ConditionPoller {
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Wait until the node reports a condition matching `target`, returning
    /// the observation from the snapshot it was first seen in.
    pub async fn wait_for_condition(
        &self,
        source: &dyn NodeStatusSource,
        node: &str,
        target: &ConditionTarget,
        cancel: &CancellationToken,
    ) -> Result<ConditionObservation> {
        let subject = format!("{}/{}", target.condition_type, target.reason);
        poll_until(self.interval, self.timeout, &subject, node, cancel, move || async move {
            let snapshot = source.fetch(node).await?;
            Ok(snapshot.find_condition(target).cloned())
        })
        .await
    }

    /// Wait until at least one unit of `resource` is allocatable on the
    /// node (e.g. `nvidia.com/gpu` after the device plugin comes up).
    pub async fn wait_for_allocatable(
        &self,
        source: &dyn NodeStatusSource,
        node: &str,
        resource: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        poll_until(self.interval, self.timeout, resource, node, cancel, move || async move {
            let snapshot = source.fetch(node).await?;
            Ok(snapshot.has_allocatable(resource).then_some(()))
        })
        .await
    }
}
