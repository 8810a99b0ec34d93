use super::settings::AppConfig;
use anyhow::Result;

impl AppConfig {
    /// Validate configuration values are sane.
    pub(crate) fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.port > 0, "Port must be > 0");
        anyhow::ensure!(self.sparse_vsize_factor >= 1, "sparse_vsize_factor must be >= 1");
        anyhow::ensure!(
            self.time_check_rebalance_seconds >= self.rebalance_poll_seconds,
            "time_check_rebalance_seconds must not be shorter than rebalance_poll_seconds"
        );
        anyhow::ensure!(self.quorum_retries <= 10, "quorum_retries must be between 0 and 10");
        anyhow::ensure!(
            self.cell_hosts.iter().all(|h| !h.contains(char::is_whitespace)),
            "cell host names must not contain whitespace"
        );
        anyhow::ensure!(!self.ssh_user.is_empty(), "ssh_user must not be empty");
        Ok(())
    }
}
