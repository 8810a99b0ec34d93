/// Default path of the daemon's KEY="VALUE" config file.
pub(super) const DEFAULT_CONFIG_PATH: &str = "/etc/diskgroup-lcm/diskgroup-lcm.cfg";

/// Default path for the SQLite database holding diskgroup records and operation history.
pub(super) const DEFAULT_DB_PATH: &str = "/var/lib/diskgroup-lcm/lcm.db";

/// Default port the daemon listens on (localhost only).
pub(super) const DEFAULT_PORT: u16 = 7094;

/// Remote user for cell and ASM node sessions.
pub(super) const DEFAULT_SSH_USER: &str = "root";

/// Ratio between a sparse diskgroup's virtual size and its physical size.
pub(super) const DEFAULT_SPARSE_VSIZE_FACTOR: u64 = 10;

/// Seconds between rebalance status polls.
pub(super) const DEFAULT_REBALANCE_POLL_SECONDS: u64 = 30;

/// Seconds between detailed GV$ASM_OPERATION progress queries.
pub(super) const DEFAULT_TIME_CHECK_REBALANCE_SECONDS: u64 = 600;

/// Seconds between agent job status polls.
pub(super) const DEFAULT_JOB_POLL_SECONDS: u64 = 60;

/// Extra attempts when ASM reports the quorum disk as unavailable (ORA-15025).
pub(super) const DEFAULT_QUORUM_RETRIES: u32 = 2;

pub(super) const DEFAULT_QUORUM_RETRY_BACKOFF_SECONDS: u64 = 5;

pub(super) const DEFAULT_DBAASAPI_BIN: &str = "/var/opt/oracle/dbaasapi/dbaasapi";

/// Directory on the ASM node the agent reads request files from.
pub(super) const DEFAULT_DBAASAPI_REQUEST_DIR: &str = "/var/opt/oracle/log/dbaasapi";

/// Directory on the ASM node the agent writes job and info output to.
pub(super) const DEFAULT_GRID_LOG_DIR: &str = "/var/opt/oracle/log/grid";

/// Local directory where request files are staged before copying.
pub(super) const DEFAULT_STAGING_DIR: &str = "/tmp";

pub(super) const DEFAULT_GRID_HOME: &str = "/u01/app/19.0.0.0/grid";

pub(super) const DEFAULT_ASM_SID: &str = "+ASM1";
