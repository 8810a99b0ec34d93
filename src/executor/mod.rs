use anyhow::{Context, Result};
use std::future::Future;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Output of one remote command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self { exit_code: 0, stdout: stdout.into(), stderr: String::new() }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self { exit_code, stdout: String::new(), stderr: stderr.into() }
    }

    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Non-empty, trimmed stdout lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// A remote shell session factory: one call, one round trip, no pooled state.
pub trait RemoteShell: Send + Sync {
    /// Run `command` on `host` and collect its output.
    fn run(&self, host: &str, command: &str) -> impl Future<Output = Result<CommandOutput>> + Send;

    /// Copy a local file to `remote_path` on `host`.
    fn copy_to(
        &self,
        host: &str,
        local_path: &Path,
        remote_path: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// `ssh`/`scp` backed shell, relying on pre-established key trust.
#[derive(Debug, Clone)]
pub struct SshShell {
    user: String,
}

impl SshShell {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }

    fn target(&self, host: &str) -> String {
        format!("{}@{}", self.user, host)
    }
}

const SSH_OPTIONS: [&str; 4] = ["-o", "BatchMode=yes", "-o", "StrictHostKeyChecking=no"];

impl RemoteShell for SshShell {
    async fn run(&self, host: &str, command: &str) -> Result<CommandOutput> {
        debug!("ssh {}: {}", host, command);
        let output = Command::new("ssh")
            .args(SSH_OPTIONS)
            .arg(self.target(host))
            .arg(command)
            .output()
            .await
            .with_context(|| format!("Failed to execute ssh to {host}"))?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn copy_to(&self, host: &str, local_path: &Path, remote_path: &str) -> Result<()> {
        let output = Command::new("scp")
            .args(SSH_OPTIONS)
            .arg(local_path)
            .arg(format!("{}:{}", self.target(host), remote_path))
            .output()
            .await
            .with_context(|| format!("Failed to execute scp to {host}"))?;

        anyhow::ensure!(
            output.status.success(),
            "scp of {} to {}:{} failed: {}",
            local_path.display(),
            host,
            remote_path,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        Ok(())
    }
}
