//! Cluster-side view of the node under test.
//!
//! The pollers and taint/resource checks read node state through the
//! [`NodeStatusSource`] seam; the kube-backed implementation lives here as
//! well. Every fetch returns a fresh snapshot — nothing is cached between
//! poll iterations.

use std::collections::BTreeMap;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ListParams};
use kube::Client;
use serde::{Deserialize, Serialize};

use crate::exec::PodRef;

/// Status of a node condition as reported by the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl From<&str> for ConditionStatus {
    fn from(s: &str) -> Self {
        match s {
            "True" => Self::True,
            "False" => Self::False,
            _ => Self::Unknown,
        }
    }
}

/// A named condition observed on the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionObservation {
    /// Condition type, e.g. "GPUMissing" or "FilesystemCorruptionProblem".
    pub condition_type: String,
    pub status: ConditionStatus,
    /// Machine-readable reason reported by the producing daemon.
    pub reason: Option<String>,
    /// Human-readable message with details.
    pub message: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// The condition a convergence poll is waiting for: a type plus the exact
/// reason the producing daemon sets when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionTarget {
    pub condition_type: String,
    pub reason: String,
}

impl ConditionTarget {
    #[must_use]
    pub fn new(condition_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            reason: reason.into(),
        }
    }

    /// Whether an observation satisfies this target.
    #[must_use]
    pub fn matches(&self, observation: &ConditionObservation) -> bool {
        observation.condition_type == self.condition_type
            && observation.reason.as_deref() == Some(self.reason.as_str())
    }
}

/// Freshly fetched view of a node's cluster-reported state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub conditions: Vec<ConditionObservation>,
    /// Taints in `key=value:effect` form, in cluster order.
    pub taints: Vec<String>,
    /// Allocatable resources, quantity strings keyed by resource name.
    pub allocatable: BTreeMap<String, String>,
}

impl NodeSnapshot {
    /// First condition matching the target, if present.
    #[must_use]
    pub fn find_condition(&self, target: &ConditionTarget) -> Option<&ConditionObservation> {
        self.conditions.iter().find(|c| target.matches(c))
    }

    /// Taints rendered the way kubelet's `--register-with-taints` takes
    /// them: comma-joined `key=value:effect`.
    #[must_use]
    pub fn taint_string(&self) -> String {
        self.taints.join(",")
    }

    /// Whether at least one unit of `resource` is allocatable.
    #[must_use]
    pub fn has_allocatable(&self, resource: &str) -> bool {
        self.allocatable
            .get(resource)
            .and_then(|quantity| quantity.trim().parse::<f64>().ok())
            .is_some_and(|units| units >= 1.0)
    }
}

/// Seam for fetching node state; the pollers depend on this, not on kube
/// directly, so convergence logic is testable with canned snapshots.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeStatusSource: Send + Sync {
    /// Fetch a fresh snapshot of the named node.
    async fn fetch(&self, node: &str) -> anyhow::Result<NodeSnapshot>;
}

/// Seam for locating the unprivileged network-debug pod scheduled on the
/// node, used for in-cluster views that must not run on the VM itself.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DebugPodLocator: Send + Sync {
    /// Find the running network-debug pod scheduled on `node_name`.
    async fn debug_pod_for_node(&self, node_name: &str) -> anyhow::Result<PodRef>;
}

/// kube-backed implementation of [`NodeStatusSource`] and
/// [`DebugPodLocator`].
#[derive(Clone)]
pub struct ClusterNodes {
    client: Client,
    debug_namespace: String,
    debug_label: String,
}

impl ClusterNodes {
    #[must_use]
    pub fn new(client: Client, debug_namespace: impl Into<String>, debug_label: impl Into<String>) -> Self {
        Self {
            client,
            debug_namespace: debug_namespace.into(),
            debug_label: debug_label.into(),
        }
    }
}

#[async_trait]
impl DebugPodLocator for ClusterNodes {
    async fn debug_pod_for_node(&self, node_name: &str) -> anyhow::Result<PodRef> {
        let namespace = self.debug_namespace.as_str();
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods
            .list(&ListParams::default().labels(&self.debug_label))
            .await
            .with_context(|| format!("listing debug pods in namespace {namespace}"))?;

        list.items
            .iter()
            .find(|pod| {
                let on_node = pod
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.node_name.as_deref())
                    == Some(node_name);
                let running = pod
                    .status
                    .as_ref()
                    .and_then(|status| status.phase.as_deref())
                    == Some("Running");
                on_node && running
            })
            .and_then(|pod| pod.metadata.name.clone())
            .map(|name| PodRef {
                name,
                namespace: namespace.to_string(),
            })
            .with_context(|| format!("no running debug pod found on node {node_name}"))
    }
}

#[async_trait]
impl NodeStatusSource for ClusterNodes {
    async fn fetch(&self, node: &str) -> anyhow::Result<NodeSnapshot> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node = nodes
            .get(node)
            .await
            .with_context(|| format!("getting node {node}"))?;
        Ok(snapshot_from_node(&node))
    }
}

fn snapshot_from_node(node: &Node) -> NodeSnapshot {
    let status = node.status.as_ref();

    let conditions = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .map(|c| ConditionObservation {
                    condition_type: c.type_.clone(),
                    status: ConditionStatus::from(c.status.as_str()),
                    reason: c.reason.clone(),
                    message: c.message.clone(),
                    last_heartbeat: c.last_heartbeat_time.as_ref().map(|t| t.0),
                })
                .collect()
        })
        .unwrap_or_default();

    let taints = node
        .spec
        .as_ref()
        .and_then(|spec| spec.taints.as_ref())
        .map(|taints| {
            taints
                .iter()
                .map(|taint| {
                    format!(
                        "{}={}:{}",
                        taint.key,
                        taint.value.as_deref().unwrap_or(""),
                        taint.effect
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    let allocatable = status
        .and_then(|s| s.allocatable.as_ref())
        .map(|quantities| {
            quantities
                .iter()
                .map(|(name, quantity)| (name.clone(), quantity.0.clone()))
                .collect()
        })
        .unwrap_or_default();

    NodeSnapshot {
        conditions,
        taints,
        allocatable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(condition_type: &str, reason: &str, status: ConditionStatus) -> ConditionObservation {
        ConditionObservation {
            condition_type: condition_type.to_string(),
            status,
            reason: Some(reason.to_string()),
            message: None,
            last_heartbeat: None,
        }
    }

    #[test]
    fn condition_target_matches_type_and_reason() {
        let target = ConditionTarget::new("GPUMissing", "NoGPUMissing");
        assert!(target.matches(&observation("GPUMissing", "NoGPUMissing", ConditionStatus::False)));
        assert!(!target.matches(&observation("GPUMissing", "GPUMissing", ConditionStatus::True)));
        assert!(!target.matches(&observation("Ready", "NoGPUMissing", ConditionStatus::True)));
    }

    #[test]
    fn snapshot_taint_string_joins_in_order() {
        let snapshot = NodeSnapshot {
            taints: vec![
                "sku=gpu:NoSchedule".to_string(),
                "dedicated=ml:NoExecute".to_string(),
            ],
            ..Default::default()
        };
        assert_eq!(snapshot.taint_string(), "sku=gpu:NoSchedule,dedicated=ml:NoExecute");
    }

    #[test]
    fn allocatable_requires_at_least_one_unit() {
        let mut snapshot = NodeSnapshot::default();
        snapshot
            .allocatable
            .insert("nvidia.com/gpu".to_string(), "8".to_string());
        assert!(snapshot.has_allocatable("nvidia.com/gpu"));

        snapshot
            .allocatable
            .insert("nvidia.com/gpu".to_string(), "0".to_string());
        assert!(!snapshot.has_allocatable("nvidia.com/gpu"));
        assert!(!snapshot.has_allocatable("amd.com/gpu"));
    }
}
