//! systemd service checks.

use std::collections::BTreeMap;

use crate::compare;
use crate::error::Result;
use crate::scenario::Scenario;

/// Assert a systemd unit is active. The status output is printed first so
/// a failure leaves usable logs in the captured stdout.
pub async fn validate_systemd_unit_is_running(s: &Scenario, service: &str) -> Result<()> {
    let steps = vec![
        format!("systemctl -n 5 status {service} || true"),
        format!("systemctl is-active {service}"),
    ];
    s.exec_steps_expect(&steps, 0, &format!("service {service} is not running"))
        .await?;
    Ok(())
}

/// Assert a systemd unit is not in the failed state. `systemctl is-failed`
/// exits zero exactly when the unit failed, so this is an inverted check.
pub async fn validate_systemd_unit_is_not_failed(s: &Scenario, service: &str) -> Result<()> {
    let steps = vec![
        format!("systemctl --no-pager -n 5 status {service} || true"),
        format!("systemctl is-failed {service}"),
    ];
    let result = s.exec(&steps.join("\n")).await?;
    if result.exit_code.matches(0) {
        return Err(s.fail_assertion(format!(
            "unit {service:?} is in a failed state\nSTDOUT:\n{}\n\nSTDERR:\n{}",
            result.stdout, result.stderr
        )));
    }
    Ok(())
}

/// Kill a service and assert systemd brings it back with a new PID within
/// `restart_timeout_secs`.
pub async fn validate_service_can_restart(
    s: &Scenario,
    service: &str,
    restart_timeout_secs: u32,
) -> Result<()> {
    let steps = vec![
        format!("(systemctl -n 5 status {service} || true)"),
        format!("systemctl is-active {service}"),
        // Remember the PID so we can prove the process was replaced.
        format!("INITIAL_PID=`sudo pgrep {service}`"),
        "echo INITIAL_PID: $INITIAL_PID".to_string(),
        // systemctl kill rather than kill -9: container restrictions stop
        // us signalling the process directly.
        format!("sudo systemctl kill {service}"),
        format!("sleep {restart_timeout_secs}"),
        format!("(systemctl -n 5 status {service} || true)"),
        format!("systemctl is-active {service}"),
        format!("POST_PID=`sudo pgrep {service}`"),
        "echo POST_PID: $POST_PID".to_string(),
        "if [[ \"$INITIAL_PID\" == \"$POST_PID\" ]]; then echo PID did not change after restart, failing validator. ; exit 1; fi"
            .to_string(),
    ];
    s.exec_steps_expect(&steps, 0, "command to restart service failed")
        .await?;
    Ok(())
}

/// Assert the containerd unit file carries the expected ulimit settings.
pub async fn validate_ulimit_settings(
    s: &Scenario,
    ulimits: &BTreeMap<String, String>,
) -> Result<()> {
    let keys: Vec<&str> = ulimits.keys().map(String::as_str).collect();
    let body = format!(
        "sudo systemctl cat containerd.service | grep -E -i '{}'",
        keys.join("|")
    );
    let result = s
        .exec_expect(&body, 0, "could not read containerd.service file")
        .await?;
    for (name, value) in ulimits {
        compare::assert_contains(
            &result.stdout,
            &format!("{name}={value}"),
            &format!("expected ulimit {name} set to {value}"),
        )
        .map_err(|err| s.fail(err))?;
    }
    Ok(())
}

/// Assert a service's journal contains the expected content.
pub async fn validate_journalctl_output(
    s: &Scenario,
    service: &str,
    expected_content: &str,
) -> Result<()> {
    let body = format!("sudo journalctl -u {service} | grep -q '{expected_content}'");
    s.exec_expect(
        &body,
        0,
        &format!("expected content '{expected_content}' not found in {service} service logs"),
    )
    .await?;
    Ok(())
}
