use super::defaults::{
    DEFAULT_ASM_SID, DEFAULT_CONFIG_PATH, DEFAULT_DBAASAPI_BIN, DEFAULT_DBAASAPI_REQUEST_DIR,
    DEFAULT_DB_PATH, DEFAULT_GRID_HOME, DEFAULT_GRID_LOG_DIR, DEFAULT_JOB_POLL_SECONDS,
    DEFAULT_PORT, DEFAULT_QUORUM_RETRIES, DEFAULT_QUORUM_RETRY_BACKOFF_SECONDS,
    DEFAULT_REBALANCE_POLL_SECONDS, DEFAULT_SPARSE_VSIZE_FACTOR, DEFAULT_SSH_USER,
    DEFAULT_STAGING_DIR, DEFAULT_TIME_CHECK_REBALANCE_SECONDS,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub port: u16,
    pub db_path: String,
    pub config_path: String,
    /// Storage cell host names, as reachable over ssh.
    pub cell_hosts: Vec<String>,
    /// Cluster nodes running ASM. The first one hosts the agent.
    pub asm_nodes: Vec<String>,
    pub ssh_user: String,
    pub sparse_vsize_factor: u64,
    pub rebalance_poll_seconds: u64,
    /// Interval for the detailed GV$ASM_OPERATION progress query.
    pub time_check_rebalance_seconds: u64,
    pub detailed_rebalance_progress: bool,
    pub job_poll_seconds: u64,
    pub quorum_retries: u32,
    pub quorum_retry_backoff_seconds: u64,
    /// Check free space on cell disks before growing grid disks.
    pub precheck_cell_disk_free_space: bool,
    /// Whether newly created diskgroups get quorum disks.
    pub enable_quorum: bool,
    pub dbaasapi_bin: String,
    pub dbaasapi_request_dir: String,
    pub grid_log_dir: String,
    pub staging_dir: String,
    pub grid_home: String,
    pub asm_sid: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            db_path: DEFAULT_DB_PATH.to_string(),
            config_path: DEFAULT_CONFIG_PATH.to_string(),
            cell_hosts: Vec::new(),
            asm_nodes: Vec::new(),
            ssh_user: DEFAULT_SSH_USER.to_string(),
            sparse_vsize_factor: DEFAULT_SPARSE_VSIZE_FACTOR,
            rebalance_poll_seconds: DEFAULT_REBALANCE_POLL_SECONDS,
            time_check_rebalance_seconds: DEFAULT_TIME_CHECK_REBALANCE_SECONDS,
            detailed_rebalance_progress: false,
            job_poll_seconds: DEFAULT_JOB_POLL_SECONDS,
            quorum_retries: DEFAULT_QUORUM_RETRIES,
            quorum_retry_backoff_seconds: DEFAULT_QUORUM_RETRY_BACKOFF_SECONDS,
            precheck_cell_disk_free_space: true,
            enable_quorum: false,
            dbaasapi_bin: DEFAULT_DBAASAPI_BIN.to_string(),
            dbaasapi_request_dir: DEFAULT_DBAASAPI_REQUEST_DIR.to_string(),
            grid_log_dir: DEFAULT_GRID_LOG_DIR.to_string(),
            staging_dir: DEFAULT_STAGING_DIR.to_string(),
            grid_home: DEFAULT_GRID_HOME.to_string(),
            asm_sid: DEFAULT_ASM_SID.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration, merging defaults with config file values and env overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("DG_CONFIG_PATH") {
            config.config_path = path;
        }

        let cfg_path = Path::new(&config.config_path);
        if cfg_path.exists() {
            let contents = fs::read_to_string(cfg_path)
                .with_context(|| format!("Failed to read config file: {}", config.config_path))?;
            config.parse_ini(&contents);
        }

        if let Ok(path) = std::env::var("DG_DB_PATH") {
            config.db_path = path;
        }
        if let Ok(port) = std::env::var("DG_PORT") {
            config.port = port.parse().context("DG_PORT must be a valid port number")?;
        }
        if let Ok(hosts) = std::env::var("DG_CELL_HOSTS") {
            config.cell_hosts = super::parser::split_list(&hosts);
        }
        if let Ok(nodes) = std::env::var("DG_ASM_NODES") {
            config.asm_nodes = super::parser::split_list(&nodes);
        }

        config.validate()?;
        Ok(config)
    }
}
