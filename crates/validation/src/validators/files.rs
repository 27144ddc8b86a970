//! File and directory content checks.

use serde_json::Value;

use crate::compare::{self, json_value_text};
use crate::error::{Result, ValidationError};
use crate::scenario::Scenario;

/// Assert a directory listing contains every expected entry.
pub async fn validate_directory_content(
    s: &Scenario,
    path: &str,
    files: &[&str],
) -> Result<()> {
    let result = s
        .exec_expect(
            &format!("sudo ls -la {path}"),
            0,
            "could not get directory contents",
        )
        .await?;
    for file in files {
        compare::assert_contains(
            &result.stdout,
            file,
            &format!("directory {path} is missing expected entry {file}"),
        )
        .map_err(|err| s.fail(err))?;
    }
    Ok(())
}

/// Assert a directory exists and has at least one entry.
pub async fn validate_non_empty_directory(s: &Scenario, dir: &str) -> Result<()> {
    s.exec_expect(
        &format!("sudo ls -1q {dir} | grep -q '^.*$'"),
        0,
        "either could not find expected directory, or it is empty",
    )
    .await?;
    Ok(())
}

/// Assert a file contains `contents` as a literal substring. A missing
/// file fails on every platform.
pub async fn validate_file_has_content(s: &Scenario, file: &str, contents: &str) -> Result<()> {
    let body = s.template().file_has_content(file, contents);
    s.exec_expect(
        &body,
        0,
        "could not validate file has contents - might mean file does not have contents, might mean something went wrong",
    )
    .await?;
    Ok(())
}

/// Assert a file does not contain `contents`.
///
/// Rejects an empty needle before touching the VM: an empty string is
/// contained in everything, so the check would be vacuous. Missing-file
/// semantics are the platform template's (POSIX passes, Windows exits 2).
pub async fn validate_file_excludes_content(s: &Scenario, file: &str, contents: &str) -> Result<()> {
    if contents.is_empty() {
        return Err(s.fail(ValidationError::Setup(format!(
            "cannot validate that a file excludes an empty string. Filename: {file}"
        ))));
    }
    let body = s.template().file_excludes_content(file, contents);
    s.exec_expect(
        &body,
        0,
        "could not validate file excludes contents - might mean file does have contents, might mean something went wrong",
    )
    .await?;
    Ok(())
}

/// Fetch a JSON file from the node and extract a dotted-path field.
pub async fn get_json_field_from_file(s: &Scenario, file: &str, json_path: &str) -> Result<String> {
    let body = s.template().print_file(file);
    let result = s
        .exec_expect(&body, 0, "could not read JSON file from node")
        .await?;
    let document: Value = serde_json::from_str(result.stdout.trim()).map_err(|err| {
        s.fail_assertion(format!(
            "file {file} is not valid JSON: {err}\nContent:\n{}",
            result.stdout
        ))
    })?;
    compare::json_field(&document, json_path)
        .map(json_value_text)
        .ok_or_else(|| {
            s.fail_assertion(format!(
                "file {file} has no field at path {json_path:?}\nContent:\n{}",
                result.stdout
            ))
        })
}

/// Assert a dotted-path field of a remote JSON file equals `expected`.
pub async fn validate_json_file_has_field(
    s: &Scenario,
    file: &str,
    json_path: &str,
    expected: &str,
) -> Result<()> {
    let actual = get_json_field_from_file(s, file, json_path).await?;
    if actual == expected {
        Ok(())
    } else {
        Err(s.fail_assertion(format!(
            "expected field {json_path:?} of {file} to be {expected:?}, got {actual:?}"
        )))
    }
}

/// Assert a dotted-path field of a remote JSON file is absent or differs
/// from `value_not_to_be`.
pub async fn validate_json_file_does_not_have_field(
    s: &Scenario,
    file: &str,
    json_path: &str,
    value_not_to_be: &str,
) -> Result<()> {
    let actual = get_json_field_from_file(s, file, json_path).await?;
    if actual == value_not_to_be {
        Err(s.fail_assertion(format!(
            "expected field {json_path:?} of {file} to differ from {value_not_to_be:?}"
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockNodeStatusSource;
    use crate::exec::{MockRemoteExecutor, Platform};
    use crate::testutil::{canned_executor, scenario_with};

    #[tokio::test]
    async fn excludes_content_rejects_empty_needle_without_executing() {
        // No executor expectation: any remote call would panic the mock.
        let (s, sink) = scenario_with(
            Platform::Ubuntu,
            MockRemoteExecutor::new(),
            MockNodeStatusSource::new(),
        );
        let err = validate_file_excludes_content(&s, "/etc/hosts", "")
            .await
            .unwrap_err();
        assert!(err.is_setup());
        assert!(!sink.is_clean());
    }

    #[tokio::test]
    async fn directory_content_reports_missing_entry() {
        let listing = "total 8\n-rw-r--r-- 1 root root 0 azure.json\n";
        let (s, _sink) = scenario_with(
            Platform::Ubuntu,
            canned_executor(0, listing, ""),
            MockNodeStatusSource::new(),
        );
        assert!(validate_directory_content(&s, "/etc/kubernetes", &["azure.json"])
            .await
            .is_ok());
        let err = validate_directory_content(&s, "/etc/kubernetes", &["kubelet.conf"])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("kubelet.conf"));
    }

    #[tokio::test]
    async fn json_field_equality_and_inequality() {
        let conflist = r#"{"plugins": [{"ipam": {"type": "azure-cns"}}]}"#;
        let (s, _sink) = scenario_with(
            Platform::Windows,
            canned_executor(0, conflist, ""),
            MockNodeStatusSource::new(),
        );
        assert!(validate_json_file_has_field(
            &s,
            "/k/azurecni/netconf/10-azure.conflist",
            "plugins.ipam.type",
            "azure-cns"
        )
        .await
        .is_ok());
        assert!(validate_json_file_does_not_have_field(
            &s,
            "/k/azurecni/netconf/10-azure.conflist",
            "plugins.ipam.type",
            "azure-cns"
        )
        .await
        .is_err());
    }
}
