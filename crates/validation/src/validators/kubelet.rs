//! kubelet configuration and lifecycle checks.

use crate::compare;
use crate::error::{Result, ValidationError};
use crate::scenario::Scenario;

/// Assert kubelet was started with a syntactically valid `--node-ip` flag:
/// one address single-stack, two dual-stack.
pub async fn validate_kubelet_node_ip(s: &Scenario) -> Result<()> {
    let result = s
        .exec_expect("sudo cat /etc/default/kubelet", 0, "could not read kubelet config")
        .await?;
    compare::extract_node_ips(&result.stdout).map_err(|err| s.fail(err))?;
    Ok(())
}

/// Scan the kubelet journal for lifecycle events. kubelet must have
/// started and never stopped since boot. Findings are soft so both
/// polarities are reported in one pass.
pub async fn validate_kubelet_has_not_stopped(s: &Scenario) -> Result<()> {
    let result = s
        .exec_expect(
            "sudo journalctl -u kubelet",
            0,
            "could not retrieve kubelet logs with journalctl",
        )
        .await?;
    let stdout = result.stdout.to_lowercase();
    if let Err(err) = compare::assert_not_contains(&stdout, "stopped kubelet", "kubelet journal") {
        s.sink.soft(err.to_string());
    }
    if let Err(err) = compare::assert_contains(&stdout, "started kubelet", "kubelet journal") {
        s.sink.soft(err.to_string());
    }
    Ok(())
}

/// Assert no unit under /etc/systemd/system restarts kubelet. The grep is
/// expected to find nothing, so exit code 1 is the passing outcome.
pub async fn validate_services_do_not_restart_kubelet(s: &Scenario) -> Result<()> {
    s.exec_expect(
        "sudo grep -rl 'restart[[:space:]]\\+kubelet' /etc/systemd/system/",
        1,
        "expected to find no services containing 'restart kubelet' in /etc/systemd/system/",
    )
    .await?;
    Ok(())
}

/// Assert kubelet runs with the expected `--config` flag.
pub async fn validate_kubelet_has_flags(s: &Scenario, config_file_path: &str) -> Result<()> {
    let result = s
        .exec_expect(
            "sudo journalctl -u kubelet",
            0,
            "could not retrieve kubelet logs with journalctl",
        )
        .await?;
    let flag = format!("FLAG: --config=\"{config_file_path}\"");
    compare::assert_contains(&result.stdout, &flag, "kubelet flags")
        .map_err(|err| s.fail(err))?;
    Ok(())
}

/// Assert the node registered exactly the taints passed to kubelet's
/// `--register-with-taints`, rendered `key=value:effect` comma-joined.
pub async fn validate_taints(s: &Scenario, expected_taints: &str) -> Result<()> {
    let snapshot = s
        .nodes
        .fetch(&s.node_name)
        .await
        .map_err(|err| s.fail(ValidationError::Cluster(err)))?;
    let actual = snapshot.taint_string();
    if actual == expected_taints {
        Ok(())
    } else {
        Err(s.fail_assertion(format!(
            "expected node {:?} to have taints {expected_taints:?}, but got {actual:?}",
            s.node_name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{MockNodeStatusSource, NodeSnapshot};
    use crate::exec::Platform;
    use crate::testutil::{canned_executor, scenario_with};

    fn nodes_with_taints(taints: &[&str]) -> MockNodeStatusSource {
        let snapshot = NodeSnapshot {
            taints: taints.iter().map(ToString::to_string).collect(),
            ..Default::default()
        };
        let mut nodes = MockNodeStatusSource::new();
        nodes
            .expect_fetch()
            .returning(move |_| Ok(snapshot.clone()));
        nodes
    }

    #[tokio::test]
    async fn node_ip_flag_is_validated_from_kubelet_defaults() {
        let config = "KUBELET_FLAGS=--node-ip=10.0.0.4,fd00::1 --v=2\n";
        let (s, _sink) = scenario_with(
            Platform::Ubuntu,
            canned_executor(0, config, ""),
            MockNodeStatusSource::new(),
        );
        assert!(validate_kubelet_node_ip(&s).await.is_ok());

        let (s, _sink) = scenario_with(
            Platform::Ubuntu,
            canned_executor(0, "KUBELET_FLAGS=--v=2\n", ""),
            MockNodeStatusSource::new(),
        );
        assert!(validate_kubelet_node_ip(&s).await.is_err());
    }

    #[tokio::test]
    async fn stopped_kubelet_is_reported_softly() {
        let journal = "Jan 01 Started Kubelet.\nJan 02 Stopped Kubelet.\n";
        let (s, sink) = scenario_with(
            Platform::Ubuntu,
            canned_executor(0, journal, ""),
            MockNodeStatusSource::new(),
        );
        assert!(validate_kubelet_has_not_stopped(&s).await.is_ok());
        let failures = sink.failures();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.contains("stopped kubelet"));
    }

    #[tokio::test]
    async fn taints_compare_exactly_in_cluster_order() {
        let (mut s, _sink) = scenario_with(
            Platform::Ubuntu,
            crate::exec::MockRemoteExecutor::new(),
            nodes_with_taints(&["sku=gpu:NoSchedule", "dedicated=ml:NoExecute"]),
        );
        assert!(validate_taints(&s, "sku=gpu:NoSchedule,dedicated=ml:NoExecute")
            .await
            .is_ok());

        s.nodes = std::sync::Arc::new(nodes_with_taints(&["sku=gpu:NoSchedule"]));
        let err = validate_taints(&s, "sku=gpu:NoSchedule,dedicated=ml:NoExecute")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("sku=gpu:NoSchedule"));
    }
}
