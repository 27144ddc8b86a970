//! Package and container-runtime version checks.

use tracing::info;

use crate::compare;
use crate::error::{Result, ValidationError};
use crate::exec::Platform;
use crate::scenario::Scenario;

/// Assert a package of the given version shows up in the platform's
/// installed-package list.
///
/// A missing package is recorded as a soft failure (the scenario keeps
/// collecting findings); a platform without a known package manager is a
/// setup error.
pub async fn validate_installed_package_version(
    s: &Scenario,
    component: &str,
    version: &str,
) -> Result<()> {
    info!(component, version, "asserting package is installed on the VM");
    let list_command = match s.target.platform {
        Platform::Ubuntu => "sudo apt list --installed",
        Platform::Mariner | Platform::AzureLinux => "sudo dnf list installed",
        Platform::Windows => {
            return Err(s.fail(ValidationError::Setup(format!(
                "package list command not implemented for platform {}",
                s.target.platform
            ))))
        }
    };
    let result = s
        .exec_expect(list_command, 0, "could not get package list")
        .await?;
    let found = result
        .stdout
        .lines()
        .any(|line| line.contains(component) && line.contains(version));
    if !found {
        s.sink.soft(format!(
            "expected to find {component} {version} in the installed packages, but did not"
        ));
    }
    Ok(())
}

/// Gate and verify containerd 2.x: exactly one version pinned to the 2.
/// line, installed as a package, and a warning-free config when dumped
/// from an unprivileged sibling pod.
pub async fn validate_containerd_two_properties(s: &Scenario, versions: &[String]) -> Result<()> {
    let version = compare::require_single_version_with_prefix(versions, "2.", "moby-containerd")
        .map_err(|err| s.fail(err))?;

    validate_installed_package_version(s, "moby-containerd", version).await?;

    let result = s.exec_on_debug_pod("containerd config dump").await?;
    compare::assert_not_contains(
        &result.stdout,
        "level=warning",
        "containerd config dump must convert the config without warnings",
    )
    .map_err(|err| s.fail(err))?;
    Ok(())
}

/// Gate and verify runc 1.2.x.
pub async fn validate_runc_twelve_properties(s: &Scenario, versions: &[String]) -> Result<()> {
    let version = compare::require_single_version_with_prefix(versions, "1.2.", "moby-runc")
        .map_err(|err| s.fail(err))?;
    validate_installed_package_version(s, "moby-runc", version).await
}

/// Assert the containerd image store holds at least two distinct
/// kube-proxy versions (an upgrade must leave the previous one behind).
/// All findings are soft: the scenario continues either way.
pub async fn validate_multiple_kube_proxy_versions(s: &Scenario) -> Result<()> {
    let result = s
        .exec("sudo ctr --namespace k8s.io images list | grep kube-proxy | awk '{print $1}' | grep -oE '[0-9]+\\.[0-9]+\\.[0-9]+'")
        .await?;
    if !result.exit_code.matches(0) {
        s.sink.soft(format!(
            "failed to list kube-proxy images: {}",
            result.stderr
        ));
        return Ok(());
    }
    let versions = compare::distinct_versions(&result.stdout);
    match compare::assert_multiple_versions(&versions, "kube-proxy") {
        Ok(()) => info!(?versions, "multiple kube-proxy versions exist"),
        Err(err) => s.sink.soft(err.to_string()),
    }
    Ok(())
}

/// Assert the NRI plugin socket is present (enabled by default under
/// containerd 2).
pub async fn validate_container_runtime_plugins(s: &Scenario) -> Result<()> {
    super::files::validate_directory_content(s, "/var/run/nri", &["nri.sock"]).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{MockDebugPodLocator, MockNodeStatusSource};
    use crate::exec::relay::MockPodCommandRunner;
    use crate::exec::{ExecutionResult, ExitCode, MockRemoteExecutor, Platform, PodRef};
    use crate::report::Severity;
    use crate::testutil::{canned_executor, scenario_with, scenario_with_pods};

    fn debug_pod_returning(dump: &str) -> (MockPodCommandRunner, MockDebugPodLocator) {
        let mut locator = MockDebugPodLocator::new();
        locator.expect_debug_pod_for_node().returning(|_| {
            Ok(PodRef {
                name: "debugnwcfg".to_string(),
                namespace: "default".to_string(),
            })
        });
        let dump = dump.to_string();
        let mut runner = MockPodCommandRunner::new();
        runner.expect_run_in_pod().returning(move |_, _| {
            Ok(ExecutionResult {
                exit_code: ExitCode::Code(0),
                stdout: dump.clone(),
                stderr: String::new(),
            })
        });
        (runner, locator)
    }

    #[tokio::test]
    async fn containerd_gate_rejects_before_any_remote_call() {
        // Mock executor with no expectations: a remote call would panic.
        let (s, _sink) = scenario_with(
            Platform::Ubuntu,
            MockRemoteExecutor::new(),
            MockNodeStatusSource::new(),
        );

        let none: Vec<String> = vec![];
        assert!(validate_containerd_two_properties(&s, &none)
            .await
            .unwrap_err()
            .is_setup());

        let wrong_line = vec!["1.7.25".to_string()];
        assert!(validate_containerd_two_properties(&s, &wrong_line)
            .await
            .is_err());

        let two = vec!["2.0.0".to_string(), "2.1.0".to_string()];
        assert!(validate_runc_twelve_properties(&s, &two).await.is_err());
    }

    #[tokio::test]
    async fn containerd_config_dump_must_convert_without_warnings() {
        let installed = "moby-containerd/now 2.0.0-ubuntu22.04u1 amd64 [installed,local]\n";
        let versions = vec!["2.0.0".to_string()];

        let (runner, locator) = debug_pod_returning("[plugins]\n  [plugins.'io.containerd.cri']\n");
        let (s, sink) = scenario_with_pods(
            Platform::Ubuntu,
            canned_executor(0, installed, ""),
            MockNodeStatusSource::new(),
            runner,
            locator,
        );
        assert!(validate_containerd_two_properties(&s, &versions).await.is_ok());
        assert!(sink.is_clean());

        let (runner, locator) =
            debug_pod_returning("time=\"...\" level=warning msg=\"deprecated config\"\n[plugins]\n");
        let (s, sink) = scenario_with_pods(
            Platform::Ubuntu,
            canned_executor(0, installed, ""),
            MockNodeStatusSource::new(),
            runner,
            locator,
        );
        let err = validate_containerd_two_properties(&s, &versions)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("level=warning"));
        assert!(!sink.is_clean());
    }

    #[tokio::test]
    async fn missing_package_is_a_soft_failure() {
        let stdout = "moby-runc/now 1.2.5-ubuntu22.04u1 amd64 [installed,local]\n";
        let (s, sink) = scenario_with(
            Platform::Ubuntu,
            canned_executor(0, stdout, ""),
            MockNodeStatusSource::new(),
        );
        assert!(validate_installed_package_version(&s, "moby-containerd", "2.0.0")
            .await
            .is_ok());
        let failures = sink.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].severity, Severity::Soft);
    }

    #[tokio::test]
    async fn package_listing_is_unsupported_on_windows() {
        let (s, _sink) = scenario_with(
            Platform::Windows,
            MockRemoteExecutor::new(),
            MockNodeStatusSource::new(),
        );
        assert!(validate_installed_package_version(&s, "moby-runc", "1.2.5")
            .await
            .unwrap_err()
            .is_setup());
    }

    #[tokio::test]
    async fn kube_proxy_version_findings_are_soft() {
        let (s, sink) = scenario_with(
            Platform::Ubuntu,
            canned_executor(0, "1.31.1\n", ""),
            MockNodeStatusSource::new(),
        );
        assert!(validate_multiple_kube_proxy_versions(&s).await.is_ok());
        assert!(sink.failures()[0].message.contains("only one"));

        let (s, sink) = scenario_with(
            Platform::Ubuntu,
            canned_executor(0, "1.31.1\n1.31.2\n", ""),
            MockNodeStatusSource::new(),
        );
        assert!(validate_multiple_kube_proxy_versions(&s).await.is_ok());
        assert!(sink.is_clean());
    }
}
