//! Test execution through a child process

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

use continual_policy_core::{CoreError, TestRunner};

use crate::config::TestsConfig;

/// Runs the configured test command inside the code location.
///
/// A failing test suite is a normal result (`passed: false`); only a command
/// that cannot be started is an error. The child is killed if the call is
/// dropped, so a collaborator deadline also stops the process.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    config: TestsConfig,
}

impl CommandTestRunner {
    pub fn new(config: TestsConfig) -> Self {
        Self { config }
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.config.command.as_str())
            .chain(self.config.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Keep the last `max_bytes` of `text`, cut on a char boundary
fn tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("[truncated]\n{}", &text[start..])
}

#[async_trait]
impl TestRunner for CommandTestRunner {
    async fn run(&self, code_location: &Path) -> continual_policy_core::Result<Value> {
        if !code_location.is_dir() {
            return Err(CoreError::collaborator(
                "test runner",
                format!("'{}' is not a directory", code_location.display()),
            ));
        }

        let command = self.command_line();
        tracing::info!(command = %command, cwd = %code_location.display(), "Running tests");
        let start = Instant::now();

        let output = Command::new(&self.config.command)
            .args(&self.config.args)
            .current_dir(code_location)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                let message = format!("failed to run '{}': {}", command, e);
                CoreError::collaborator("test runner", message)
            })?;

        let passed = output.status.success();
        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(passed, exit_code = ?output.status.code(), duration_ms, "Tests finished");

        let max = self.config.max_output_bytes;
        Ok(json!({
            "command": command,
            "passed": passed,
            "exit_code": output.status.code(),
            "duration_ms": duration_ms,
            "stdout": tail(&String::from_utf8_lossy(&output.stdout), max),
            "stderr": tail(&String::from_utf8_lossy(&output.stderr), max),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn runner(command: &str, args: &[&str]) -> CommandTestRunner {
        CommandTestRunner::new(TestsConfig {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            max_output_bytes: 64,
        })
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("short", 10), "short");
        assert_eq!(tail("0123456789", 4), "[truncated]\n6789");
        // 'é' is two bytes; the cut moves forward to a boundary
        assert_eq!(tail("aé", 1), "[truncated]\n");
    }

    #[test]
    fn test_command_line() {
        assert_eq!(runner("cargo", &["test", "--quiet"]).command_line(), "cargo test --quiet");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reports_pass_and_fail() {
        let dir = TempDir::new().unwrap();

        let ok = runner("sh", &["-c", "echo all good"]).run(dir.path()).await.unwrap();
        assert_eq!(ok["passed"], true);
        assert_eq!(ok["exit_code"], 0);
        assert_eq!(ok["stdout"], "all good\n");

        let failed = runner("sh", &["-c", "echo boom >&2; exit 3"])
            .run(dir.path())
            .await
            .unwrap();
        assert_eq!(failed["passed"], false);
        assert_eq!(failed["exit_code"], 3);
        assert_eq!(failed["stderr"], "boom\n");
    }

    #[tokio::test]
    async fn test_missing_command_is_error() {
        let dir = TempDir::new().unwrap();
        let err = runner("definitely-not-a-real-binary", &[])
            .run(dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Collaborator { collaborator: "test runner", .. }));
    }

    #[tokio::test]
    async fn test_missing_location_is_error() {
        let err = runner("true", &[])
            .run(Path::new("/nonexistent/repo"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
