//! External command execution

use crate::error::{Result, ZeppelinError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::trace;

/// Runs a program and returns its trimmed stdout
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str]) -> Result<String>;
}

/// Runs commands as child processes in the Gas Town root
#[derive(Debug, Clone)]
pub struct ShellRunner {
    root: PathBuf,
    timeout: Duration,
}

impl ShellRunner {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
        }
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        trace!(program, ?args, "Running command");

        let child = Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                ZeppelinError::command(program, format!("timed out after {:?}", self.timeout))
            })?
            .map_err(|e| ZeppelinError::command(program, e.to_string()))?;

        if !output.status.success() {
            return Err(ZeppelinError::command(
                program,
                format!("exited with {}", output.status),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_command_error() {
        let runner = ShellRunner::new(std::env::temp_dir(), Duration::from_secs(1));
        let err = runner
            .run("zeppelin-definitely-not-installed", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ZeppelinError::Command { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_is_trimmed() {
        let runner = ShellRunner::new(std::env::temp_dir(), Duration::from_secs(5));
        let out = runner.run("echo", &["  hello  "]).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let runner = ShellRunner::new(std::env::temp_dir(), Duration::from_secs(5));
        assert!(runner.run("false", &[]).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let runner = ShellRunner::new(std::env::temp_dir(), Duration::from_millis(50));
        let err = runner.run("sleep", &["5"]).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
