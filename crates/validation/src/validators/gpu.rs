//! NVIDIA GPU checks and GPU fault injection.

use std::time::Duration;

use tracing::warn;

use crate::cluster::{ConditionObservation, ConditionStatus, ConditionTarget};
use crate::compare;
use crate::error::Result;
use crate::poll::ConditionPoller;
use crate::scenario::Scenario;

/// How long NPD is given to notice a GPU count change.
const GPU_CONDITION_INTERVAL: Duration = Duration::from_secs(2);
const GPU_CONDITION_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Assert nvidia-smi runs successfully.
pub async fn validate_nvidia_smi_installed(s: &Scenario) -> Result<()> {
    s.exec_expect("sudo nvidia-smi", 0, "could not execute nvidia-smi command")
        .await?;
    Ok(())
}

/// Assert nvidia-smi is absent: the command must fail and the shell must
/// report it as not found.
pub async fn validate_nvidia_smi_not_installed(s: &Scenario) -> Result<()> {
    let result = s
        .exec_expect("sudo nvidia-smi", 1, "nvidia-smi is expected to be absent")
        .await?;
    compare::assert_contains(
        &result.stderr,
        "nvidia-smi: command not found",
        "nvidia-smi stderr",
    )
    .map_err(|err| s.fail(err))?;
    Ok(())
}

/// Assert nvidia-modprobe runs successfully.
pub async fn validate_nvidia_modprobe_installed(s: &Scenario) -> Result<()> {
    s.exec_expect("sudo nvidia-modprobe", 0, "could not execute nvidia-modprobe command")
        .await?;
    Ok(())
}

/// Assert the GRID license is applied and nvidia-gridd is active.
pub async fn validate_nvidia_grid_license_valid(s: &Scenario) -> Result<()> {
    let steps = vec![
        // Empty when the license is missing; the || true keeps set -e quiet.
        "license_status=$(sudo nvidia-smi -q | grep 'License Status' | grep 'Licensed' || true)"
            .to_string(),
        "if [ -z \"$license_status\" ]; then echo 'License status not valid or not found'; exit 1; fi"
            .to_string(),
        "active_status=$(sudo systemctl is-active nvidia-gridd)".to_string(),
        "if [ \"$active_status\" != \"active\" ]; then echo \"nvidia-gridd is not active: $active_status\"; exit 1; fi"
            .to_string(),
    ];
    s.exec_steps_expect(
        &steps,
        0,
        "failed to validate nvidia-smi license state or nvidia-gridd service status",
    )
    .await?;
    Ok(())
}

/// Assert nvidia-persistenced is active.
pub async fn validate_nvidia_persistenced_running(s: &Scenario) -> Result<()> {
    let steps = vec![
        "active_status=$(sudo systemctl is-active nvidia-persistenced.service)".to_string(),
        "if [ \"$active_status\" != \"active\" ]; then echo \"nvidia-persistenced is not active: $active_status\"; exit 1; fi"
            .to_string(),
    ];
    s.exec_steps_expect(&steps, 0, "failed to validate nvidia-persistenced.service status")
        .await?;
    Ok(())
}

/// Wait until the device plugin makes at least one `nvidia.com/gpu`
/// allocatable on the node, using the scenario's configured poll cadence.
/// Scheduling a workload pod onto the GPU stays with the orchestrator.
pub async fn wait_for_allocatable_gpu(s: &Scenario) -> Result<()> {
    s.poller()
        .wait_for_allocatable(s.nodes.as_ref(), &s.node_name, "nvidia.com/gpu", &s.cancel)
        .await
        .map_err(|err| s.fail(err))
}

/// Assert the NPD GPU-count plugin configuration is deployed.
pub async fn validate_npd_gpu_count_plugin(s: &Scenario) -> Result<()> {
    s.exec_expect(
        "test -f /etc/node-problem-detector.d/custom-plugin-monitor/gpu_checks/custom-plugin-gpu-count.json",
        0,
        "NPD GPU count plugin configuration does not exist",
    )
    .await?;
    Ok(())
}

/// Flip the NPD GPU-checks toggle on and restart the daemon.
pub async fn enable_gpu_npd_toggle(s: &Scenario) -> Result<()> {
    let steps = vec![
        "echo '{\"enable-npd-gpu-checks\": \"true\"}' | sudo tee /etc/node-problem-detector.d/public-settings.json"
            .to_string(),
        "sudo systemctl restart node-problem-detector".to_string(),
        "sudo systemctl is-active node-problem-detector".to_string(),
    ];
    s.exec_steps_expect(
        &steps,
        0,
        "could not enable GPU NPD toggle and restart the node-problem-detector service",
    )
    .await?;
    Ok(())
}

fn assert_condition_status(
    s: &Scenario,
    observation: &ConditionObservation,
    expected: ConditionStatus,
) -> Result<()> {
    if observation.status == expected {
        Ok(())
    } else {
        Err(s.fail_assertion(format!(
            "expected condition {} to be {expected:?}, got {:?}",
            observation.condition_type, observation.status
        )))
    }
}

fn assert_condition_message(
    s: &Scenario,
    observation: &ConditionObservation,
    needle: &str,
) -> Result<()> {
    let message = observation.message.as_deref().unwrap_or_default();
    compare::assert_contains(
        message,
        needle,
        &format!("condition {} message", observation.condition_type),
    )
    .map_err(|err| s.fail(err))
}

/// Wait for NPD to report the baseline GPU count: condition `GPUMissing`
/// with reason `NoGPUMissing`, status False, all GPUs present.
pub async fn validate_npd_gpu_count_condition(s: &Scenario) -> Result<()> {
    let poller = ConditionPoller::new(GPU_CONDITION_INTERVAL, GPU_CONDITION_TIMEOUT);
    let target = ConditionTarget::new("GPUMissing", "NoGPUMissing");
    let observation = poller
        .wait_for_condition(s.nodes.as_ref(), &s.node_name, &target, &s.cancel)
        .await
        .map_err(|err| s.fail(err))?;
    assert_condition_status(s, &observation, ConditionStatus::False)?;
    assert_condition_message(s, &observation, "All GPUs are present")
}

/// Unbind one GPU from the nvidia driver and wait for NPD to flag the
/// missing device, then re-bind it.
///
/// The re-bind runs regardless of the poll outcome so the VM leaves this
/// validator in its original state even when the assertion fails.
pub async fn validate_npd_gpu_count_after_failure(s: &Scenario) -> Result<()> {
    let disable = vec![
        "sudo systemctl stop nvidia-persistenced.service || true".to_string(),
        // Persistence off, compute mode back to default, then unbind.
        "sudo nvidia-smi -i 0 -pm 0".to_string(),
        "sudo nvidia-smi -i 0 -c 0".to_string(),
        // sed converts the bus id into the format the driver sysfs expects.
        "PCI_ID=$(sudo nvidia-smi -i 0 --query-gpu=pci.bus_id --format=csv,noheader | sed 's/^0000//')"
            .to_string(),
        "echo ${PCI_ID} | tee /tmp/validation_disabled_pci_id".to_string(),
        "echo ${PCI_ID} | sudo tee /sys/bus/pci/drivers/nvidia/unbind".to_string(),
    ];
    s.exec_steps_expect(&disable, 0, "failed to disable GPU").await?;

    let poller = ConditionPoller::new(GPU_CONDITION_INTERVAL, GPU_CONDITION_TIMEOUT);
    let target = ConditionTarget::new("GPUMissing", "GPUMissing");
    let poll_outcome = poller
        .wait_for_condition(s.nodes.as_ref(), &s.node_name, &target, &s.cancel)
        .await;

    // Re-bind before looking at the poll outcome.
    let rebind = [
        "cat /tmp/validation_disabled_pci_id | sudo tee /sys/bus/pci/drivers/nvidia/bind"
            .to_string(),
        "rm -f /tmp/validation_disabled_pci_id".to_string(),
    ]
    .join("\n");
    if let Err(err) = s.exec(&rebind).await {
        warn!(error = %err, "failed to re-bind GPU after fault injection");
    }

    let observation = poll_outcome.map_err(|err| s.fail(err))?;
    assert_condition_status(s, &observation, ConditionStatus::True)?;
    assert_condition_message(
        s,
        &observation,
        "Expected to see 8 GPUs but found 7. FaultCode: NHC2009",
    )
}
