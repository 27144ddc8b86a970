//! kube exec-based executor.
//!
//! Commands reach the VM by exec'ing into the relay (debug) pod running on
//! the cluster and hopping to the VM over ssh with the scenario's private
//! key. The key is written to a mode-600 tempfile inside the pod and
//! removed on exit; it never appears in diagnostics.

use anyhow::anyhow;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams};
use kube::Client;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::error::Result;
use crate::exec::{
    transport_err, ExecutionResult, ExitCode, Interpreter, PodRef, RemoteExecutor, Script, Target,
};

/// Runs a command directly inside a cluster pod (no ssh hop). Used for
/// in-cluster views of the node, e.g. inspecting containerd from an
/// unprivileged sibling pod.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PodCommandRunner: Send + Sync {
    async fn run_in_pod(&self, pod: &PodRef, command: &str) -> Result<ExecutionResult>;
}

/// Executor that reaches the VM through the relay pod.
#[derive(Clone)]
pub struct RelayExecutor {
    client: Client,
}

impl RelayExecutor {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Exec `command` in `pod`, optionally feeding `stdin`, and normalize
    /// the outcome.
    async fn exec_in_pod(
        &self,
        pod: &PodRef,
        command: Vec<String>,
        stdin: Option<&str>,
    ) -> Result<ExecutionResult> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &pod.namespace);
        let params = AttachParams::default()
            .stdin(stdin.is_some())
            .stdout(true)
            .stderr(true);

        let mut attached = pods
            .exec(&pod.name, command, &params)
            .await
            .map_err(transport_err)?;

        if let Some(input) = stdin {
            let mut writer = attached
                .stdin()
                .ok_or_else(|| transport_err(anyhow!("exec channel has no stdin")))?;
            writer
                .write_all(input.as_bytes())
                .await
                .map_err(transport_err)?;
            writer.shutdown().await.map_err(transport_err)?;
        }

        let mut stdout_reader = attached
            .stdout()
            .ok_or_else(|| transport_err(anyhow!("exec channel has no stdout")))?;
        let mut stderr_reader = attached
            .stderr()
            .ok_or_else(|| transport_err(anyhow!("exec channel has no stderr")))?;
        let status = attached
            .take_status()
            .ok_or_else(|| transport_err(anyhow!("exec status already taken")))?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        let (out_read, err_read, status) = tokio::join!(
            stdout_reader.read_to_string(&mut stdout),
            stderr_reader.read_to_string(&mut stderr),
            status,
        );
        out_read.map_err(transport_err)?;
        err_read.map_err(transport_err)?;
        attached.join().await.map_err(transport_err)?;

        let exit_code = exit_code_from_status(status.as_ref());
        debug!(pod = %pod.name, %exit_code, "pod exec finished");
        Ok(ExecutionResult {
            exit_code,
            stdout,
            stderr,
        })
    }
}

/// Map the Kubernetes exec `Status` onto a parsed exit code.
fn exit_code_from_status(status: Option<&Status>) -> ExitCode {
    let Some(status) = status else {
        return ExitCode::Unparseable("exec finished without a status".to_string());
    };
    if status.status.as_deref() == Some("Success") {
        return ExitCode::Code(0);
    }
    status
        .details
        .as_ref()
        .and_then(|details| details.causes.as_ref())
        .and_then(|causes| {
            causes
                .iter()
                .find(|cause| cause.reason.as_deref() == Some("ExitCode"))
        })
        .and_then(|cause| cause.message.as_deref())
        .map_or_else(
            || {
                ExitCode::Unparseable(
                    status
                        .message
                        .clone()
                        .unwrap_or_else(|| "exec failed without an exit code".to_string()),
                )
            },
            ExitCode::parse,
        )
}

/// Shell fragment run in the relay pod: stash the key, hop to the VM, feed
/// the script over stdin. The remote interpreter reads from stdin so the
/// script text never needs argv quoting.
fn hop_command(target: &Target, interpreter: Interpreter) -> String {
    let remote_shell = match interpreter {
        Interpreter::Shell => "sudo bash -s",
        Interpreter::Powershell => "powershell -NoLogo -NonInteractive -Command -",
    };
    format!(
        "keyfile=$(mktemp); trap 'rm -f \"$keyfile\"' EXIT\n\
         cat > \"$keyfile\" <<'VALIDATION_SSH_KEY'\n{key}\nVALIDATION_SSH_KEY\n\
         chmod 600 \"$keyfile\"\n\
         exec ssh -i \"$keyfile\" -o PasswordAuthentication=no -o StrictHostKeyChecking=no \
         -o ConnectTimeout=5 {user}@{ip} {remote_shell}",
        key = target.ssh_private_key.trim_end(),
        user = target.ssh_user,
        ip = target.vm_private_ip,
    )
}

#[async_trait]
impl RemoteExecutor for RelayExecutor {
    async fn execute(&self, target: &Target, script: &Script) -> Result<ExecutionResult> {
        let hop = hop_command(target, script.interpreter());
        let command = vec!["bash".to_string(), "-c".to_string(), hop];
        debug!(
            vm = %target.vm_private_ip,
            relay = %target.relay_pod.name,
            interpreter = ?script.interpreter(),
            "executing script on VM through relay pod"
        );
        self.exec_in_pod(&target.relay_pod, command, Some(script.text()))
            .await
    }
}

#[async_trait]
impl PodCommandRunner for RelayExecutor {
    async fn run_in_pod(&self, pod: &PodRef, command: &str) -> Result<ExecutionResult> {
        let argv = vec!["sh".to_string(), "-c".to_string(), command.to_string()];
        debug!(pod = %pod.name, command, "executing command in pod");
        self.exec_in_pod(pod, argv, None).await
    }
}
