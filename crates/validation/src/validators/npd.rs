//! node-problem-detector checks and filesystem-corruption fault injection.

use std::time::Duration;

use crate::cluster::{ConditionStatus, ConditionTarget};
use crate::compare;
use crate::error::Result;
use crate::poll::ConditionPoller;
use crate::scenario::Scenario;

/// Filesystem corruption surfaces through the journal scraper, which is
/// slower than the GPU plugin; the deadline is sized accordingly.
const FS_CORRUPTION_INTERVAL: Duration = Duration::from_secs(10);
const FS_CORRUPTION_TIMEOUT: Duration = Duration::from_secs(6 * 60);

/// Assert the node-problem-detector service is active.
pub async fn validate_node_problem_detector(s: &Scenario) -> Result<()> {
    s.exec_expect(
        "systemctl is-active node-problem-detector",
        0,
        "Node Problem Detector (NPD) service validation failed",
    )
    .await?;
    Ok(())
}

/// Inject a filesystem-corruption marker into the Docker journal and wait
/// for NPD to raise the corresponding node condition.
pub async fn validate_npd_filesystem_corruption(s: &Scenario) -> Result<()> {
    s.exec_expect(
        "test -f /etc/node-problem-detector.d/custom-plugin-monitor/custom-fs-corruption-monitor.json",
        0,
        "NPD Custom Plugin configuration for FilesystemCorruptionProblem not found",
    )
    .await?;

    // The monitor greps the docker unit journal, so a log line is enough
    // to simulate the corruption.
    s.exec_expect(
        "sudo systemd-run --unit=docker --no-block bash -c 'echo \"structure needs cleaning\"'",
        0,
        "Failed to simulate filesystem corruption problem",
    )
    .await?;

    let poller = ConditionPoller::new(FS_CORRUPTION_INTERVAL, FS_CORRUPTION_TIMEOUT);
    let target = ConditionTarget::new("FilesystemCorruptionProblem", "FilesystemCorruptionDetected");
    let observation = poller
        .wait_for_condition(s.nodes.as_ref(), &s.node_name, &target, &s.cancel)
        .await
        .map_err(|err| s.fail(err))?;

    if observation.status != ConditionStatus::True {
        return Err(s.fail_assertion(format!(
            "expected FilesystemCorruptionProblem condition to be True on node, got {:?}",
            observation.status
        )));
    }
    compare::assert_contains(
        observation.message.as_deref().unwrap_or_default(),
        "Found 'structure needs cleaning' in Docker journal.",
        "FilesystemCorruptionProblem condition message",
    )
    .map_err(|err| s.fail(err))?;
    Ok(())
}
