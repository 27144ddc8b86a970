//! Windows-specific checks: registry-reported versions, process command
//! lines and CNI configuration.

use tracing::info;

use crate::compare::{self, Normalize};
use crate::error::Result;
use crate::scenario::Scenario;
use crate::settings::WindowsSettings;

use super::files::{validate_json_file_does_not_have_field, validate_json_file_has_field};

const CNI_CONFLIST: &str = "/k/azurecni/netconf/10-azure.conflist";

/// Assert a running process was started with each of the expected CLI
/// arguments.
pub async fn validate_windows_process_has_cli_arguments(
    s: &Scenario,
    process_name: &str,
    arguments: &[&str],
) -> Result<()> {
    let body = format!(
        "(Get-CimInstance Win32_Process -Filter \"name='{process_name}'\")[0].CommandLine"
    );
    let result = s
        .exec_expect(&body, 0, "could not read the process command line")
        .await?;
    let actual: Vec<&str> = result.stdout.split_whitespace().collect();
    for expected in arguments {
        if !actual.contains(expected) {
            return Err(s.fail_assertion(format!(
                "expected process {process_name} to run with argument {expected:?}\nCommand line:\n{}",
                result.stdout
            )));
        }
    }
    Ok(())
}

/// Compare the VM's registry-reported build string against the major build
/// recorded for this Windows version in the local settings reference file.
pub async fn validate_windows_version_from_settings(
    s: &Scenario,
    settings: &WindowsSettings,
    windows_version: &str,
) -> Result<()> {
    let os_major = settings
        .os_major_version(windows_version)
        .map_err(|err| s.fail(err))?;

    let result = s
        .exec_expect(
            "(Get-ItemProperty -Path \"HKLM:\\SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion\" -Name BuildLabEx).BuildLabEx",
            0,
            "could not read BuildLabEx from the registry",
        )
        .await?;
    let build_lab = result.stdout.trim();
    info!(windows_version, %os_major, build_lab, "comparing Windows build");
    compare::assert_contains(build_lab, &os_major, "registry BuildLabEx")
        .map_err(|err| s.fail(err))?;
    Ok(())
}

/// Assert the registry-reported product name.
pub async fn validate_windows_product_name(s: &Scenario, product_name: &str) -> Result<()> {
    let result = s
        .exec_expect(
            "(Get-ItemProperty \"HKLM:\\SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion\").ProductName",
            0,
            "could not read ProductName from the registry",
        )
        .await?;
    compare::assert_eq_normalized(
        &result.stdout,
        product_name,
        Normalize::TrimLowercase,
        "Windows product name",
    )
    .map_err(|err| s.fail(err))
}

/// Assert the registry-reported display version (e.g. `21H2`).
pub async fn validate_windows_display_version(s: &Scenario, display_version: &str) -> Result<()> {
    let result = s
        .exec_expect(
            "(Get-ItemProperty \"HKLM:\\SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion\").DisplayVersion",
            0,
            "could not read DisplayVersion from the registry",
        )
        .await?;
    compare::assert_eq_normalized(
        &result.stdout,
        display_version,
        Normalize::TrimLowercase,
        "Windows display version",
    )
    .map_err(|err| s.fail(err))
}

/// Assert the Windows CNI configuration delegates IPAM to azure-cns, which
/// is how Cilium presents on Windows nodes.
pub async fn validate_cilium_is_running_windows(s: &Scenario) -> Result<()> {
    validate_json_file_has_field(s, CNI_CONFLIST, "plugins.ipam.type", "azure-cns").await
}

/// Assert the Windows CNI configuration does not delegate IPAM to
/// azure-cns.
pub async fn validate_cilium_is_not_running_windows(s: &Scenario) -> Result<()> {
    validate_json_file_does_not_have_field(s, CNI_CONFLIST, "plugins.ipam.type", "azure-cns").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockNodeStatusSource;
    use crate::exec::Platform;
    use crate::testutil::{canned_executor, scenario_with};

    #[tokio::test]
    async fn process_arguments_must_all_be_present() {
        let cmdline = "c:\\k\\kubelet.exe --v=2 --node-labels=agentpool=wp0 --max-pods=30\r\n";
        let (s, _sink) = scenario_with(
            Platform::Windows,
            canned_executor(0, cmdline, ""),
            MockNodeStatusSource::new(),
        );
        assert!(validate_windows_process_has_cli_arguments(
            &s,
            "kubelet.exe",
            &["--v=2", "--max-pods=30"]
        )
        .await
        .is_ok());

        let err = validate_windows_process_has_cli_arguments(&s, "kubelet.exe", &["--v=4"])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--v=4"));
    }

    #[tokio::test]
    async fn product_name_comparison_is_normalized() {
        let (s, _sink) = scenario_with(
            Platform::Windows,
            canned_executor(0, "  Windows Server 2022 Datacenter\r\n", ""),
            MockNodeStatusSource::new(),
        );
        assert!(
            validate_windows_product_name(&s, "windows server 2022 datacenter")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn build_lab_must_contain_settings_major_version() {
        let settings = WindowsSettings::from_json(
            r#"{"WindowsBaseVersions": {"2022-containerd": {"base_image_version": "20348.2700.240911"}}}"#,
        )
        .unwrap();
        let (s, _sink) = scenario_with(
            Platform::Windows,
            canned_executor(0, "20348.1.amd64fre.fe_release.210507-1500\r\n", ""),
            MockNodeStatusSource::new(),
        );
        assert!(
            validate_windows_version_from_settings(&s, &settings, "2022-containerd")
                .await
                .is_ok()
        );

        let err = validate_windows_version_from_settings(&s, &settings, "2019-containerd")
            .await
            .unwrap_err();
        assert!(err.is_setup());
    }
}
