//! Remote command execution: targets, scripts, normalized results and the
//! executor seam.

pub mod assert;
pub mod relay;

use std::fmt;
use std::net::IpAddr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::template::{self, CommandTemplate};

/// OS flavor of the node under test.
///
/// The flavor granularity (not just Linux/Windows) is needed by checks that
/// depend on the package manager; interpreter selection only cares about
/// [`Platform::is_windows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Ubuntu,
    Mariner,
    AzureLinux,
    Windows,
}

impl Platform {
    /// Whether remote scripts run under PowerShell instead of a POSIX shell.
    #[must_use]
    pub fn is_windows(self) -> bool {
        matches!(self, Self::Windows)
    }

    /// The command template for this platform, selected once per target.
    #[must_use]
    pub fn template(self) -> &'static dyn CommandTemplate {
        template::for_platform(self)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ubuntu => write!(f, "ubuntu"),
            Self::Mariner => write!(f, "mariner"),
            Self::AzureLinux => write!(f, "azurelinux"),
            Self::Windows => write!(f, "windows"),
        }
    }
}

/// Reference to a pod by name and namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodRef {
    pub name: String,
    pub namespace: String,
}

/// Where a command runs: a VM reached through an intermediary relay pod.
///
/// Immutable for the lifetime of a scenario.
#[derive(Debug, Clone)]
pub struct Target {
    /// Private IP of the VM.
    pub vm_private_ip: IpAddr,
    /// Relay (debug) pod the ssh hop goes through.
    pub relay_pod: PodRef,
    /// PEM-encoded private key used for the ssh hop. Treated as a secret;
    /// never included in diagnostics.
    pub ssh_private_key: String,
    /// SSH user on the VM.
    pub ssh_user: String,
    /// OS flavor of the VM.
    pub platform: Platform,
}

/// Script dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpreter {
    Shell,
    Powershell,
}

/// A unit of work to execute remotely. Constructed fresh per validator
/// call; never mutated after construction.
#[derive(Debug, Clone)]
pub struct Script {
    text: String,
    interpreter: Interpreter,
}

impl Script {
    /// Build a script for a target, selecting the interpreter from the
    /// target's platform and prepending the strict-mode preamble so the
    /// first failing step is both fatal and visible in captured output.
    #[must_use]
    pub fn for_target(target: &Target, body: &str) -> Self {
        Self::for_platform(target.platform, body)
    }

    /// Same as [`Script::for_target`] but keyed directly on platform.
    #[must_use]
    pub fn for_platform(platform: Platform, body: &str) -> Self {
        let tpl = platform.template();
        let interpreter = if platform.is_windows() {
            Interpreter::Powershell
        } else {
            Interpreter::Shell
        };
        let text = if body.starts_with(tpl.preamble()) {
            body.to_string()
        } else {
            format!("{}\n{}", tpl.preamble(), body)
        };
        Self { text, interpreter }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn interpreter(&self) -> Interpreter {
        self.interpreter
    }
}

/// Exit code of a remote command, parsed from the raw transport
/// representation. The raw string is preserved for diagnostics when it is
/// not a decimal integer; an unparseable code never equals any expected
/// value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitCode {
    Code(i32),
    Unparseable(String),
}

impl ExitCode {
    /// Parse the transport's string-typed exit code.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<i32>() {
            Ok(code) => Self::Code(code),
            Err(_) => Self::Unparseable(raw.to_string()),
        }
    }

    /// Exact comparison against an expected code, on the parsed form.
    #[must_use]
    pub fn matches(&self, expected: i32) -> bool {
        matches!(self, Self::Code(code) if *code == expected)
    }

    /// True when the command exited zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.matches(0)
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        Self::Code(code)
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{code}"),
            Self::Unparseable(raw) => write!(f, "{raw:?} (unparseable)"),
        }
    }
}

/// Normalized outcome of running a [`Script`] against a [`Target`].
///
/// Produced exactly once per execution; never cached or retried by the
/// core. Any retry is the caller's responsibility and exists only in the
/// convergence pollers.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub exit_code: ExitCode,
    pub stdout: String,
    pub stderr: String,
}

/// The execution seam: sends a script to a target and returns a normalized
/// result.
///
/// Implementations fail only when the channel itself cannot be established
/// or the remote call errors; a successful execution with a non-zero exit
/// code is a normal [`ExecutionResult`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `script` on `target` through the relay.
    async fn execute(&self, target: &Target, script: &Script) -> Result<ExecutionResult>;
}

/// Helper for implementations: wrap a channel error as a transport failure.
pub(crate) fn transport_err(err: impl Into<anyhow::Error>) -> ValidationError {
    ValidationError::Transport(err.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_parses_decimal() {
        assert_eq!(ExitCode::parse("0"), ExitCode::Code(0));
        assert_eq!(ExitCode::parse(" 17\n"), ExitCode::Code(17));
        assert!(ExitCode::parse("0").matches(0));
        assert!(!ExitCode::parse("1").matches(0));
    }

    #[test]
    fn unparseable_exit_code_never_matches() {
        let code = ExitCode::parse("err: connection reset");
        assert!(!code.matches(0));
        assert!(!code.matches(1));
        assert!(code.to_string().contains("unparseable"));
    }

    #[test]
    fn shell_script_gets_strict_mode_preamble() {
        let script = Script::for_platform(Platform::Ubuntu, "systemctl is-active kubelet");
        assert!(script.text().starts_with("set -ex\n"));
        assert_eq!(script.interpreter(), Interpreter::Shell);
    }

    #[test]
    fn powershell_script_gets_stop_preamble() {
        let script = Script::for_platform(Platform::Windows, "Get-Content C:\\k\\config");
        assert!(script.text().starts_with("$ErrorActionPreference = \"Stop\""));
        assert_eq!(script.interpreter(), Interpreter::Powershell);
    }

    #[test]
    fn preamble_is_not_duplicated() {
        let script = Script::for_platform(Platform::Ubuntu, "set -ex\nls -la /etc");
        assert_eq!(script.text().matches("set -ex").count(), 1);
    }
}
