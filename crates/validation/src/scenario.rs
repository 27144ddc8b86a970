//! Scenario context threading the harness capabilities to validators.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cluster::{DebugPodLocator, NodeStatusSource};
use crate::config::HarnessConfig;
use crate::error::{Result, ValidationError};
use crate::exec::assert::execute_and_assert;
use crate::exec::relay::PodCommandRunner;
use crate::exec::{ExecutionResult, RemoteExecutor, Script, Target};
use crate::poll::ConditionPoller;
use crate::report::ReportSink;
use crate::template::CommandTemplate;

/// Everything a validator needs about the node under test.
///
/// Owned by the orchestrator; validators borrow it, run once and retain no
/// state. Concurrency over the shared VM is the orchestrator's problem —
/// this context does no locking.
pub struct Scenario {
    /// Kubernetes node name the VM registered as.
    pub node_name: String,
    /// The VM and its relay path.
    pub target: Target,
    /// Command channel to the VM.
    pub executor: Arc<dyn RemoteExecutor>,
    /// Command channel into sibling pods.
    pub pod_runner: Arc<dyn PodCommandRunner>,
    /// Fresh node-state fetches for pollers, taints and resources.
    pub nodes: Arc<dyn NodeStatusSource>,
    /// Locator for the unprivileged debug pod on this node.
    pub debug_pods: Arc<dyn DebugPodLocator>,
    /// Failure sink.
    pub sink: Arc<dyn ReportSink>,
    /// Cancellation for the enclosing scenario; observed by every poll tick.
    pub cancel: CancellationToken,
    /// Harness configuration.
    pub config: HarnessConfig,
}

impl Scenario {
    /// The command template for this scenario's platform.
    #[must_use]
    pub fn template(&self) -> &'static dyn CommandTemplate {
        self.target.platform.template()
    }

    /// Run a script body on the VM without asserting on the exit code.
    pub async fn exec(&self, body: &str) -> Result<ExecutionResult> {
        let script = Script::for_target(&self.target, body);
        self.executor
            .execute(&self.target, &script)
            .await
            .map_err(|err| self.sink.fail(err))
    }

    /// Run a script body on the VM and assert its exit code. Failures are
    /// recorded on the sink and returned for propagation.
    pub async fn exec_expect(
        &self,
        body: &str,
        expected_exit_code: i32,
        context: &str,
    ) -> Result<ExecutionResult> {
        let script = Script::for_target(&self.target, body);
        execute_and_assert(
            self.executor.as_ref(),
            &self.target,
            &script,
            expected_exit_code,
            context,
        )
        .await
        .map_err(|err| self.sink.fail(err))
    }

    /// Like [`Scenario::exec_expect`] but over a list of steps.
    pub async fn exec_steps_expect(
        &self,
        steps: &[String],
        expected_exit_code: i32,
        context: &str,
    ) -> Result<ExecutionResult> {
        self.exec_expect(&steps.join("\n"), expected_exit_code, context)
            .await
    }

    /// Run a command in the unprivileged debug pod scheduled on this node.
    pub async fn exec_on_debug_pod(&self, command: &str) -> Result<ExecutionResult> {
        let pod = self
            .debug_pods
            .debug_pod_for_node(&self.node_name)
            .await
            .map_err(|err| self.sink.fail(ValidationError::Cluster(err)))?;
        self.pod_runner
            .run_in_pod(&pod, command)
            .await
            .map_err(|err| self.sink.fail(err))
    }

    /// Condition poller with the configured defaults.
    #[must_use]
    pub fn poller(&self) -> ConditionPoller {
        ConditionPoller::new(self.config.poll_interval(), self.config.poll_timeout())
    }

    /// Record a hard failure on the sink and return it for propagation.
    #[must_use]
    pub fn fail(&self, error: ValidationError) -> ValidationError {
        self.sink.fail(error)
    }

    /// Record an assertion failure built from a message.
    #[must_use]
    pub fn fail_assertion(&self, message: String) -> ValidationError {
        self.sink.fail(ValidationError::Assertion(message))
    }
}
