use super::settings::AppConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Split a comma separated list, dropping blanks.
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "yes" | "true" | "1")
}

const fn flag(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

impl AppConfig {
    /// Parse the simple KEY="VALUE" config format.
    pub(crate) fn parse_ini(&mut self, contents: &str) {
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"');

                match key {
                    "PORT" => {
                        if let Ok(v) = value.parse() {
                            self.port = v;
                        }
                    }
                    "DB_PATH" => self.db_path = value.to_string(),
                    "CELL_HOSTS" => self.cell_hosts = split_list(value),
                    "ASM_NODES" => self.asm_nodes = split_list(value),
                    "SSH_USER" => self.ssh_user = value.to_string(),
                    "SPARSE_VSIZE_FACTOR" => {
                        if let Ok(v) = value.parse() {
                            self.sparse_vsize_factor = v;
                        }
                    }
                    "REBALANCE_POLL_SECONDS" => {
                        if let Ok(v) = value.parse() {
                            self.rebalance_poll_seconds = v;
                        }
                    }
                    "TIME_CHECK_REBALANCE_SECONDS" => {
                        if let Ok(v) = value.parse() {
                            self.time_check_rebalance_seconds = v;
                        }
                    }
                    "DETAILED_REBALANCE_PROGRESS" => {
                        self.detailed_rebalance_progress = parse_flag(value);
                    }
                    "JOB_POLL_SECONDS" => {
                        if let Ok(v) = value.parse() {
                            self.job_poll_seconds = v;
                        }
                    }
                    "QUORUM_RETRIES" => {
                        if let Ok(v) = value.parse() {
                            self.quorum_retries = v;
                        }
                    }
                    "QUORUM_RETRY_BACKOFF_SECONDS" => {
                        if let Ok(v) = value.parse() {
                            self.quorum_retry_backoff_seconds = v;
                        }
                    }
                    "PRECHECK_CELL_DISK_FREE_SPACE" => {
                        self.precheck_cell_disk_free_space = parse_flag(value);
                    }
                    "ENABLE_QUORUM" => self.enable_quorum = parse_flag(value),
                    "DBAASAPI_BIN" => self.dbaasapi_bin = value.to_string(),
                    "DBAASAPI_REQUEST_DIR" => self.dbaasapi_request_dir = value.to_string(),
                    "GRID_LOG_DIR" => self.grid_log_dir = value.to_string(),
                    "STAGING_DIR" => self.staging_dir = value.to_string(),
                    "GRID_HOME" => self.grid_home = value.to_string(),
                    "ASM_SID" => self.asm_sid = value.to_string(),
                    _ => {} // Ignore unknown keys
                }
            }
        }
    }

    /// Save current config back to the INI file.
    pub fn save(&self) -> Result<()> {
        let contents = format!(
            r#"# diskgroup-lcm configuration
# Auto-generated by the settings endpoint
PORT="{}"
DB_PATH="{}"
CELL_HOSTS="{}"
ASM_NODES="{}"
SSH_USER="{}"
SPARSE_VSIZE_FACTOR="{}"
REBALANCE_POLL_SECONDS="{}"
TIME_CHECK_REBALANCE_SECONDS="{}"
DETAILED_REBALANCE_PROGRESS="{}"
JOB_POLL_SECONDS="{}"
QUORUM_RETRIES="{}"
QUORUM_RETRY_BACKOFF_SECONDS="{}"
PRECHECK_CELL_DISK_FREE_SPACE="{}"
ENABLE_QUORUM="{}"
DBAASAPI_BIN="{}"
DBAASAPI_REQUEST_DIR="{}"
GRID_LOG_DIR="{}"
STAGING_DIR="{}"
GRID_HOME="{}"
ASM_SID="{}"
"#,
            self.port,
            self.db_path,
            self.cell_hosts.join(","),
            self.asm_nodes.join(","),
            self.ssh_user,
            self.sparse_vsize_factor,
            self.rebalance_poll_seconds,
            self.time_check_rebalance_seconds,
            flag(self.detailed_rebalance_progress),
            self.job_poll_seconds,
            self.quorum_retries,
            self.quorum_retry_backoff_seconds,
            flag(self.precheck_cell_disk_free_space),
            flag(self.enable_quorum),
            self.dbaasapi_bin,
            self.dbaasapi_request_dir,
            self.grid_log_dir,
            self.staging_dir,
            self.grid_home,
            self.asm_sid,
        );

        if let Some(parent) = Path::new(&self.config_path).parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&self.config_path, contents)
            .with_context(|| format!("Failed to write config to {}", self.config_path))?;

        Ok(())
    }
}
