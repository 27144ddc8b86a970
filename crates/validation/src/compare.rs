//! Comparison and normalization policies shared by the validators.
//!
//! Every policy reports through [`ValidationError`]: assertion failures for
//! state mismatches, setup errors for malformed checks. Diagnostics always
//! carry the full observed text so a failure is reproducible from logs.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{Result, ValidationError};

/// Assert `haystack` contains `needle` as a literal substring.
pub fn assert_contains(haystack: &str, needle: &str, context: &str) -> Result<()> {
    if haystack.contains(needle) {
        Ok(())
    } else {
        Err(ValidationError::Assertion(format!(
            "{context}: expected to find {needle:?}, but did not.\nObserved:\n{haystack}"
        )))
    }
}

/// Assert `haystack` does not contain `needle`.
///
/// An empty needle trivially passes and is therefore rejected as a
/// test-authoring error, regardless of remote state.
pub fn assert_not_contains(haystack: &str, needle: &str, context: &str) -> Result<()> {
    if needle.is_empty() {
        return Err(ValidationError::Setup(format!(
            "{context}: cannot assert exclusion of the empty string"
        )));
    }
    if haystack.contains(needle) {
        Err(ValidationError::Assertion(format!(
            "{context}: expected not to find {needle:?}, but did.\nObserved:\n{haystack}"
        )))
    } else {
        Ok(())
    }
}

/// Normalization applied before an exact equality comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalize {
    /// Strip surrounding whitespace.
    Trim,
    /// Strip surrounding whitespace and lower-case.
    TrimLowercase,
}

fn apply(norm: Normalize, s: &str) -> String {
    match norm {
        Normalize::Trim => s.trim().to_string(),
        Normalize::TrimLowercase => s.trim().to_lowercase(),
    }
}

/// Assert exact equality after normalizing both sides.
pub fn assert_eq_normalized(actual: &str, expected: &str, norm: Normalize, context: &str) -> Result<()> {
    let actual_n = apply(norm, actual);
    let expected_n = apply(norm, expected);
    if actual_n == expected_n {
        Ok(())
    } else {
        Err(ValidationError::Assertion(format!(
            "{context}: expected {expected_n:?}, got {actual_n:?} (raw: {actual:?})"
        )))
    }
}

fn node_ip_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"--node-ip=([0-9a-fA-F.,:]*)").expect("static regex"))
}

/// Extract the `--node-ip=` flag value from free-text kubelet configuration
/// and validate it.
///
/// One address is the single-stack case, two the dual-stack case; anything
/// else (missing flag, empty value, three or more addresses, or a token
/// that does not parse as an IP) is fatal.
pub fn extract_node_ips(stdout: &str) -> Result<Vec<IpAddr>> {
    let captured = node_ip_regex()
        .captures(stdout)
        .map(|c| c[1].to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ValidationError::Assertion(format!(
                "could not find kubelet flag --node-ip\nStdout:\n{stdout}"
            ))
        })?;

    let tokens: Vec<&str> = captured.split(',').collect();
    if tokens.len() > 2 {
        return Err(ValidationError::Assertion(format!(
            "expected at most two --node-ip addresses, but got {}\nStdout:\n{stdout}",
            tokens.len()
        )));
    }

    tokens
        .iter()
        .map(|token| {
            token.parse::<IpAddr>().map_err(|_| {
                ValidationError::Assertion(format!(
                    "--node-ip value {token:?} is not a valid IP address\nStdout:\n{stdout}"
                ))
            })
        })
        .collect()
}

/// Collect the distinct non-empty lines of `stdout` (one version per line).
#[must_use]
pub fn distinct_versions(stdout: &str) -> BTreeSet<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Assert that at least two distinct versions were observed.
pub fn assert_multiple_versions(versions: &BTreeSet<String>, component: &str) -> Result<()> {
    match versions.len() {
        0 => Err(ValidationError::Assertion(format!(
            "no {component} versions found"
        ))),
        1 => Err(ValidationError::Assertion(format!(
            "only one {component} version exists: {versions:?}"
        ))),
        _ => Ok(()),
    }
}

/// Gate for checks pinned to a major/minor line: the caller must supply
/// exactly one version and it must start with `prefix`. Checked before any
/// remote call is attempted.
pub fn require_single_version_with_prefix<'a>(
    versions: &'a [String],
    prefix: &str,
    component: &str,
) -> Result<&'a str> {
    if versions.len() != 1 {
        return Err(ValidationError::Setup(format!(
            "expected exactly one version for {component} but got {}",
            versions.len()
        )));
    }
    let version = versions[0].as_str();
    if !version.starts_with(prefix) {
        return Err(ValidationError::Setup(format!(
            "expected {component} version to start with {prefix:?}, got {version:?}"
        )));
    }
    Ok(version)
}

/// Look up a dotted-path field in a JSON document.
///
/// Path segments index into objects by key; a segment applied to an array
/// maps over its elements and returns the first hit, which covers CNI
/// conflist documents where `plugins` is an array.
#[must_use]
pub fn json_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items
                .iter()
                .find_map(|item| item.as_object().and_then(|map| map.get(segment)))?,
            _ => return None,
        };
    }
    Some(current)
}

/// Render a JSON value the way it reads in config files: bare strings
/// without quotes, everything else via its JSON form.
#[must_use]
pub fn json_value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn contains_failure_embeds_observed_text() {
        let err = assert_contains("abc", "xyz", "log check").unwrap_err();
        assert!(err.to_string().contains("abc"));
        assert!(err.to_string().contains("xyz"));
    }

    #[test]
    fn not_contains_rejects_empty_needle() {
        let err = assert_not_contains("anything", "", "exclusion check").unwrap_err();
        assert!(err.is_setup());
    }

    #[test]
    fn not_contains_passes_and_fails() {
        assert!(assert_not_contains("abc", "xyz", "c").is_ok());
        assert!(assert_not_contains("abc", "b", "c").is_err());
    }

    #[test]
    fn eq_normalized_trims_and_lowercases() {
        assert!(assert_eq_normalized("  Windows Server 2022 Datacenter \r\n",
            "windows server 2022 datacenter", Normalize::TrimLowercase, "product").is_ok());
        assert!(assert_eq_normalized("a", "b", Normalize::Trim, "c").is_err());
    }

    #[test]
    fn node_ip_single_stack() {
        let ips = extract_node_ips("kubelet --node-ip=10.0.0.4 --v=2").unwrap();
        assert_eq!(ips, vec!["10.0.0.4".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn node_ip_dual_stack() {
        let ips = extract_node_ips("--node-ip=10.0.0.4,fd00::1").unwrap();
        assert_eq!(ips.len(), 2);
        assert!(ips[1].is_ipv6());
    }

    #[test]
    fn node_ip_missing_or_empty_flag_is_fatal() {
        assert!(extract_node_ips("kubelet --v=2").is_err());
        assert!(extract_node_ips("--node-ip=").is_err());
    }

    #[test]
    fn node_ip_three_addresses_is_fatal() {
        let err = extract_node_ips("--node-ip=10.0.0.4,fd00::1,10.0.0.5").unwrap_err();
        assert!(err.to_string().contains("at most two"));
    }

    #[test]
    fn node_ip_garbage_token_is_fatal() {
        assert!(extract_node_ips("--node-ip=10.0.0.999").is_err());
    }

    #[test]
    fn version_cardinality() {
        let none = distinct_versions("");
        let one = distinct_versions("1.2.3\n1.2.3\n");
        let two = distinct_versions("1.2.3\n1.2.4\n");
        assert!(assert_multiple_versions(&none, "kube-proxy")
            .unwrap_err()
            .to_string()
            .contains("no kube-proxy versions"));
        assert!(assert_multiple_versions(&one, "kube-proxy")
            .unwrap_err()
            .to_string()
            .contains("only one"));
        assert!(assert_multiple_versions(&two, "kube-proxy").is_ok());
    }

    #[test]
    fn version_prefix_gate() {
        let empty: Vec<String> = vec![];
        assert!(require_single_version_with_prefix(&empty, "2.", "moby-containerd")
            .unwrap_err()
            .is_setup());
        let two = vec!["2.0.0".into(), "2.0.1".into()];
        assert!(require_single_version_with_prefix(&two, "2.", "moby-containerd").is_err());
        let wrong = vec!["1.7.2".into()];
        assert!(require_single_version_with_prefix(&wrong, "2.", "moby-containerd").is_err());
        let good = vec!["1.2.5".into()];
        assert_eq!(
            require_single_version_with_prefix(&good, "1.2.", "moby-runc").unwrap(),
            "1.2.5"
        );
    }

    #[test]
    fn json_field_walks_objects_and_arrays() {
        let doc = json!({
            "cniVersion": "0.3.0",
            "plugins": [
                {"type": "azure-vnet"},
                {"ipam": {"type": "azure-cns"}}
            ]
        });
        let field = json_field(&doc, "plugins.ipam.type").unwrap();
        assert_eq!(json_value_text(field), "azure-cns");
        assert!(json_field(&doc, "plugins.ipam.missing").is_none());
    }
}
