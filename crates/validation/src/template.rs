//! Platform command templates.
//!
//! Platform differences (Windows vs POSIX) change only the command text,
//! quoting and preamble conventions — never the comparison semantics. The
//! template is selected once per target instead of branching inside each
//! validator.

use crate::exec::Platform;

/// Script-building capability, one implementation per platform.
pub trait CommandTemplate: Send + Sync {
    /// Strict-mode preamble prepended to every script so the first failing
    /// step aborts the run and shows up in captured output.
    fn preamble(&self) -> &'static str;

    /// Script body that prints a file's content to stdout, failing if the
    /// file cannot be read.
    fn print_file(&self, path: &str) -> String;

    /// Script body that exits 0 iff `path` contains `needle` as a literal
    /// substring. A missing file is a failure on both platforms.
    fn file_has_content(&self, path: &str, needle: &str) -> String;

    /// Script body that exits 0 iff `path` does not contain `needle`.
    ///
    /// Missing-file semantics differ by platform and are intentional: the
    /// POSIX variant passes when the file is absent, the Windows variant
    /// exits 2. Callers relying on either behavior are covered by tests.
    fn file_excludes_content(&self, path: &str, needle: &str) -> String;
}

struct PosixTemplate;

/// Single-quote a string for a POSIX shell.
pub fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Escape a string for a double-quoted PowerShell literal.
pub fn ps_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('`', "``").replace('"', "`\""))
}

impl CommandTemplate for PosixTemplate {
    fn preamble(&self) -> &'static str {
        "set -ex"
    }

    fn print_file(&self, path: &str) -> String {
        format!("sudo cat {path}")
    }

    fn file_has_content(&self, path: &str, needle: &str) -> String {
        [
            format!("ls -la {path}"),
            format!("sudo cat {path}"),
            format!("sudo grep -q -F -e {} {path}", sh_quote(needle)),
        ]
        .join("\n")
    }

    fn file_excludes_content(&self, path: &str, needle: &str) -> String {
        [
            // Absent file trivially excludes the needle.
            format!("test -f {path} || exit 0"),
            format!("ls -la {path}"),
            format!("sudo cat {path}"),
            format!(
                "if sudo grep -q -F -e {} {path}; then exit 1; fi",
                sh_quote(needle)
            ),
        ]
        .join("\n")
    }
}

struct PowershellTemplate;

impl CommandTemplate for PowershellTemplate {
    fn preamble(&self) -> &'static str {
        "$ErrorActionPreference = \"Stop\""
    }

    fn print_file(&self, path: &str) -> String {
        format!("Get-Content -Raw {path}")
    }

    fn file_has_content(&self, path: &str, needle: &str) -> String {
        [
            format!("dir {path}"),
            format!("Get-Content {path}"),
            format!("if ( -not ( Test-Path -Path {path} ) ) {{ exit 2 }}"),
            format!(
                "if (Select-String -Path {path} -Pattern {} -SimpleMatch -Quiet) {{ exit 0 }} else {{ exit 1 }}",
                ps_quote(needle)
            ),
        ]
        .join("\n")
    }

    fn file_excludes_content(&self, path: &str, needle: &str) -> String {
        [
            format!("dir {path}"),
            format!("Get-Content {path}"),
            format!("if ( -not ( Test-Path -Path {path} ) ) {{ exit 2 }}"),
            format!(
                "if (Select-String -Path {path} -Pattern {} -SimpleMatch -Quiet) {{ exit 1 }} else {{ exit 0 }}",
                ps_quote(needle)
            ),
        ]
        .join("\n")
    }
}

static POSIX: PosixTemplate = PosixTemplate;
static POWERSHELL: PowershellTemplate = PowershellTemplate;

/// Template for a platform, selected once per target.
#[must_use]
pub fn for_platform(platform: Platform) -> &'static dyn CommandTemplate {
    if platform.is_windows() {
        &POWERSHELL
    } else {
        &POSIX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_excludes_content_passes_on_missing_file() {
        let body = for_platform(Platform::Ubuntu).file_excludes_content("/etc/foo", "bad");
        assert!(body.contains("test -f /etc/foo || exit 0"));
    }

    #[test]
    fn posix_has_content_fails_on_missing_file() {
        // No missing-file escape hatch: cat fails under set -ex.
        let body = for_platform(Platform::Ubuntu).file_has_content("/etc/foo", "good");
        assert!(!body.contains("test -f"));
        assert!(body.contains("grep -q -F -e 'good' /etc/foo"));
    }

    #[test]
    fn windows_excludes_content_errors_on_missing_file() {
        let body = for_platform(Platform::Windows).file_excludes_content("C:\\k\\f", "bad");
        assert!(body.contains("exit 2"));
    }

    #[test]
    fn sh_quote_escapes_single_quotes() {
        assert_eq!(sh_quote("it's"), "'it'\\''s'");
    }

    #[test]
    fn ps_quote_escapes_double_quotes() {
        assert_eq!(ps_quote("a\"b"), "\"a`\"b\"");
    }
}
