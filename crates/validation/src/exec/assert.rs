//! Exit-code assertion wrapper around the executor.
//!
//! This is the chokepoint through which nearly every non-polling validator
//! reports failure. The message format is a contract other validators rely
//! on for debuggability: it embeds the actual and expected exit codes, the
//! full command text, the caller's context and both captured streams,
//! untruncated.

use crate::error::{Result, ValidationError};
use crate::exec::{ExecutionResult, RemoteExecutor, Script, Target};

/// Run `script` on `target` and assert the exit code equals `expected`.
///
/// The comparison is exact on the canonical integer form; an unparseable
/// exit code never matches. Expecting a non-zero code is valid and used by
/// validators that intentionally invert a check.
pub async fn execute_and_assert(
    executor: &dyn RemoteExecutor,
    target: &Target,
    script: &Script,
    expected: i32,
    context: &str,
) -> Result<ExecutionResult> {
    let result = executor.execute(target, script).await?;
    if result.exit_code.matches(expected) {
        return Ok(result);
    }
    Err(ValidationError::Assertion(format!(
        "exec command exited with code {actual}, expected exit code {expected}\n\
         Command: {command}\n\
         Additional detail: {context}\n\
         STDOUT:\n{stdout}\n\n\
         STDERR:\n{stderr}",
        actual = result.exit_code,
        command = script.text(),
        stdout = result.stdout,
        stderr = result.stderr,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{ExitCode, MockRemoteExecutor, Platform};
    use crate::testutil::test_target;
    use mockall::predicate::always;

    fn executor_returning(raw_exit: &str) -> MockRemoteExecutor {
        let exit = ExitCode::parse(raw_exit);
        let mut executor = MockRemoteExecutor::new();
        executor
            .expect_execute()
            .with(always(), always())
            .returning(move |_, _| {
                Ok(ExecutionResult {
                    exit_code: exit.clone(),
                    stdout: "out".to_string(),
                    stderr: "err".to_string(),
                })
            });
        executor
    }

    #[tokio::test]
    async fn matching_exit_code_passes() {
        let executor = executor_returning("0");
        let target = test_target(Platform::Ubuntu);
        let script = Script::for_target(&target, "true");
        let result = execute_and_assert(&executor, &target, &script, 0, "noop").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn expected_nonzero_exit_code_is_a_valid_expectation() {
        let executor = executor_returning("1");
        let target = test_target(Platform::Ubuntu);
        let script = Script::for_target(&target, "grep -q pattern /none");
        let result = execute_and_assert(&executor, &target, &script, 1, "inverted check").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn mismatch_embeds_command_context_and_streams() {
        let executor = executor_returning("1");
        let target = test_target(Platform::Ubuntu);
        let script = Script::for_target(&target, "systemctl is-active kubelet");
        let err = execute_and_assert(&executor, &target, &script, 0, "kubelet must be active")
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("systemctl is-active kubelet"));
        assert!(message.contains("kubelet must be active"));
        assert!(message.contains("expected exit code 0"));
        assert!(message.contains("STDOUT:\nout"));
        assert!(message.contains("STDERR:\nerr"));
    }

    #[tokio::test]
    async fn unparseable_exit_code_fails_with_raw_text() {
        let executor = executor_returning("command terminated");
        let target = test_target(Platform::Ubuntu);
        let script = Script::for_target(&target, "true");
        let err = execute_and_assert(&executor, &target, &script, 0, "")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("command terminated"));
    }
}
