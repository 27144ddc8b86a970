//! Kernel, firewall and DNS configuration checks.

use std::collections::BTreeMap;

use crate::compare;
use crate::error::Result;
use crate::scenario::Scenario;

/// Assert every custom sysctl reports the expected value.
pub async fn validate_sysctl_config(
    s: &Scenario,
    custom_sysctls: &BTreeMap<String, String>,
) -> Result<()> {
    let keys: Vec<&str> = custom_sysctls.keys().map(String::as_str).collect();
    // The sed collapses sysctl's multi-value whitespace so the key = value
    // containment check below matches what sysctl prints.
    let body = format!(
        "sudo sysctl {} | sed -E 's/([0-9])\\s+([0-9])/\\1 \\2/g'",
        keys.join(" ")
    );
    let result = s.exec_expect(&body, 0, "sysctl command failed").await?;
    for (name, value) in custom_sysctls {
        compare::assert_contains(
            &result.stdout,
            &format!("{name} = {value}"),
            &format!("expected sysctl {name} set to {value}"),
        )
        .map_err(|err| s.fail(err))?;
    }
    Ok(())
}

/// Assert the iptables rule installed for IMDS restriction is present in
/// the given table.
pub async fn validate_imds_restriction_rule(s: &Scenario, table: &str) -> Result<()> {
    let body = format!(
        "sudo iptables -t {table} -S | grep -q 'AKS managed: added by AgentBaker ensureIMDSRestriction for IMDS restriction feature'"
    );
    s.exec_expect(&body, 0, "expected to find IMDS restriction rule, but did not")
        .await?;
    Ok(())
}

/// Assert the localdns service is up and active.
pub async fn validate_localdns_service(s: &Scenario) -> Result<()> {
    let service = "localdns";
    let steps = vec![
        format!("(systemctl -n 5 status {service} || true)"),
        format!("systemctl is-active {service}"),
    ];
    s.exec_steps_expect(&steps, 0, "localdns service is not up and running")
        .await?;
    Ok(())
}

/// Resolve an external domain through the localdns cluster listener and
/// assert the answer came back clean from the listener IP. Both findings
/// are soft so one pass reports them together.
pub async fn validate_localdns_resolution(s: &Scenario) -> Result<()> {
    let test_domain = "bing.com";
    let body = format!("dig {test_domain} +timeout=1 +tries=1");
    let result = s.exec_expect(&body, 0, "dns resolution failed").await?;
    if let Err(err) = compare::assert_contains(&result.stdout, "status: NOERROR", "dig answer") {
        s.sink.soft(err.to_string());
    }
    if let Err(err) =
        compare::assert_contains(&result.stdout, "SERVER: 169.254.10.10", "dig answer")
    {
        s.sink.soft(err.to_string());
    }
    Ok(())
}
