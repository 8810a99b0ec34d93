use super::error::{DgResult, DiskgroupError, ErrorKind};
use super::gateway::{AsmAgent, AsmGateway};
use super::reporter::ProgressReporter;
use super::types::{OperationConfig, RebalanceStatus, Tier};
use crate::executor::RemoteShell;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What sqlplus prints for an empty result set.
const NO_ROWS: &str = "no rows selected";

const RUNNING_OPERATIONS_QUERY: &str =
    "select GROUP_NUMBER, STATE, POWER, EST_MINUTES, SOFAR, EST_WORK from GV$ASM_OPERATION where STATE='RUN';";

const ALL_OPERATIONS_QUERY: &str =
    "select GROUP_NUMBER, OPERATION, PASS, STATE, SOFAR, EST_WORK, EST_MINUTES, POWER from GV$ASM_OPERATION ;";

/// Wrap a SQL statement into a shell command that runs it as the grid owner.
pub fn sqlplus_command(grid_home: &str, asm_sid: &str, query: &str) -> String {
    let query = query.replace('$', "\\\\\\$");
    format!(
        "su - grid -c \"ORACLE_HOME={grid_home};export ORACLE_HOME;ORACLE_SID={asm_sid}; export ORACLE_SID;\
         PATH=\\$PATH:\\$ORACLE_HOME/bin;export PATH;echo \\\"{query}\\\" | sqlplus -s / as sysasm\""
    )
}

/// One `RUN` row of the ASM operation table.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRow {
    pub group: String,
    pub power: String,
    pub eta_mins: f64,
    pub percent_done: f64,
}

/// Parse the `RUN` rows of the running-operations query.
pub fn parse_run_rows(output: &str) -> Vec<RunRow> {
    output
        .lines()
        .filter(|l| l.contains("RUN"))
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 6 {
                return None;
            }
            let sofar = cols[4].parse::<f64>().unwrap_or(0.0);
            let est = cols[5].parse::<f64>().unwrap_or(0.0);
            let percent_done = if sofar != 0.0 && est != 0.0 { sofar / est * 100.0 } else { 0.0 };
            Some(RunRow {
                group: cols[0].to_string(),
                power: cols[2].to_string(),
                eta_mins: cols[3].parse().unwrap_or(0.0),
                percent_done,
            })
        })
        .collect()
}

/// Diskgroup name from a `GV$ASM_DISKGROUP` lookup: second column of the first line naming a tier.
pub fn parse_group_name(output: &str) -> Option<String> {
    Tier::ALL.iter().find_map(|tier| {
        output
            .lines()
            .find(|l| l.contains(tier.prefix()))
            .and_then(|l| l.split_whitespace().nth(1))
            .map(str::to_string)
    })
}

#[derive(Debug, Clone, Default)]
struct GroupProgress {
    name: Option<String>,
    cumulative: f64,
    observations: u32,
    power: String,
    max_eta_mins: f64,
}

impl GroupProgress {
    fn average(&self) -> f64 {
        if self.observations == 0 {
            0.0
        } else {
            self.cumulative / f64::from(self.observations)
        }
    }
}

/// Weighted rebalance progress of one operation.
#[derive(Debug, Clone, Default)]
pub struct RebalanceProgressState {
    groups: BTreeMap<String, GroupProgress>,
    /// Averaged percent per diskgroup name.
    percent_by_name: BTreeMap<String, f64>,
    max_overall: u32,
}

impl RebalanceProgressState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn percent_of(&self, diskgroup: &str) -> Option<f64> {
        self.percent_by_name.get(diskgroup).copied()
    }

    #[cfg(test)]
    pub const fn reported_percent(&self) -> u32 {
        self.max_overall
    }

    /// Fold one detailed poll into the state and return the per-diskgroup details.
    ///
    /// `names` maps group numbers to diskgroup names. Diskgroups seen before that
    /// no longer have a running operation are taken as finished.
    pub fn record_poll(&mut self, rows: &[RunRow], names: &BTreeMap<String, String>) -> Vec<Value> {
        let mut polled: BTreeMap<&str, f64> = BTreeMap::new();
        for row in rows {
            let group = self.groups.entry(row.group.clone()).or_default();
            group.cumulative += row.percent_done;
            group.observations += 1;
            group.power.clone_from(&row.power);
            let eta = polled.entry(row.group.as_str()).or_insert(row.eta_mins);
            *eta = eta.max(row.eta_mins);
        }

        let mut details = Vec::new();
        let mut running = Vec::new();
        for (number, max_eta) in polled {
            let Some(group) = self.groups.get_mut(number) else {
                continue;
            };
            group.max_eta_mins = max_eta;
            if let Some(name) = names.get(number) {
                group.name = Some(name.clone());
            }
            let Some(name) = group.name.clone() else {
                debug!("No diskgroup name for group {}", number);
                continue;
            };
            let average = group.average();
            self.percent_by_name.insert(name.clone(), average);
            running.push(name.clone());
            details.push(json!({
                "name": name,
                "status": "ONGOING",
                "est_time_remaining": ((group.max_eta_mins as u64) * 60).to_string(),
                "Rebalance_power": group.power,
                "percentage_task_completed": average as u64,
            }));
        }

        for (name, percent) in &mut self.percent_by_name {
            if !running.contains(name) {
                *percent = 100.0;
            }
        }
        details
    }

    /// Size-weighted overall percent over `weights` (diskgroup name, configured size).
    pub fn overall(&self, weights: &[(String, u64)]) -> u32 {
        let total: u64 = weights.iter().map(|(_, size)| size).sum();
        if total == 0 {
            return 0;
        }
        let overall: f64 = weights
            .iter()
            .map(|(name, size)| self.percent_of(name).unwrap_or(0.0) * (*size as f64 / total as f64))
            .sum();
        overall as u32
    }

    /// Fold a new overall figure into the running maximum and return what should be reported.
    pub fn report(&mut self, weights: &[(String, u64)]) -> u32 {
        self.max_overall = self.max_overall.max(self.overall(weights));
        self.max_overall
    }
}

/// The progress document published while a rebalance runs.
pub fn progress_json(details: Vec<Value>, percent_complete: u32) -> Value {
    json!({
        "stepProgressDetails": {
            "message": "Rebalance is in progress",
            "completedNodes": [],
            "stepSpecificDetails": { "diskgroup_rbal_details": details },
            "percent_complete": percent_complete,
            "status": "InProgress",
        }
    })
}

/// Polls rebalance status until ASM reports a diskgroup done.
pub struct RebalanceMonitor<'a, S, A> {
    shell: &'a S,
    gateway: &'a AsmGateway<'a, A>,
    /// ASM node for the detailed progress queries.
    node: Option<&'a str>,
    cfg: &'a OperationConfig,
    reporter: &'a dyn ProgressReporter,
    cancel: &'a CancellationToken,
}

impl<'a, S: RemoteShell, A: AsmAgent> RebalanceMonitor<'a, S, A> {
    pub const fn new(
        shell: &'a S,
        gateway: &'a AsmGateway<'a, A>,
        node: Option<&'a str>,
        cfg: &'a OperationConfig,
        reporter: &'a dyn ProgressReporter,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self { shell, gateway, node, cfg, reporter, cancel }
    }

    /// Wait for the rebalance of `diskgroup` to finish. There is no timeout.
    pub async fn wait_until_rebalanced(
        &self,
        diskgroup: &str,
        state: &mut RebalanceProgressState,
        weights: &[(String, u64)],
    ) -> DgResult<()> {
        let interval = self.cfg.detailed_progress_interval;
        let mut last_detail = Instant::now();
        loop {
            match self.gateway.rebalance_status(diskgroup).await? {
                RebalanceStatus::Done => break,
                RebalanceStatus::Incomplete if self.cfg.detailed_progress => {
                    if self.nothing_running().await {
                        info!("No rebalance operation left for {}", diskgroup);
                        break;
                    }
                    if last_detail.elapsed() >= interval {
                        last_detail += interval;
                        self.publish_progress(state, weights).await;
                    }
                }
                RebalanceStatus::Incomplete => debug!("Rebalance of {} in progress", diskgroup),
                RebalanceStatus::Other(status) => debug!("Rebalance of {} reports {}", diskgroup, status),
            }

            tokio::select! {
                () = self.cancel.cancelled() => {
                    return Err(DiskgroupError::new(
                        ErrorKind::DgOperationError,
                        format!("wait for rebalance of {diskgroup} cancelled"),
                    ));
                }
                () = tokio::time::sleep(self.cfg.rebalance_poll) => {}
            }
        }
        info!("Diskgroup {} detected to be rebalanced", diskgroup);
        Ok(())
    }

    async fn sql(&self, query: &str) -> anyhow::Result<String> {
        let node = self.node.ok_or_else(|| anyhow::anyhow!("no ASM node configured"))?;
        let cmd = sqlplus_command(&self.cfg.grid_home, &self.cfg.asm_sid, query);
        let out = self.shell.run(node, &cmd).await?;
        anyhow::ensure!(out.success(), "sqlplus on {} exited with {}", node, out.exit_code);
        Ok(out.stdout)
    }

    /// Whether the ASM operation table is empty. Query failures count as "still running".
    async fn nothing_running(&self) -> bool {
        match self.sql(ALL_OPERATIONS_QUERY).await {
            Ok(out) => out.lines().any(|l| l.trim() == NO_ROWS),
            Err(e) => {
                warn!("Could not list ASM operations: {:#}", e);
                false
            }
        }
    }

    async fn publish_progress(&self, state: &mut RebalanceProgressState, weights: &[(String, u64)]) {
        let rows = match self.sql(RUNNING_OPERATIONS_QUERY).await {
            Ok(out) => parse_run_rows(&out),
            Err(e) => {
                warn!("Could not update rebalance status: {:#}", e);
                return;
            }
        };

        let mut names = BTreeMap::new();
        for row in &rows {
            if names.contains_key(&row.group) {
                continue;
            }
            let query = format!(
                "select GROUP_NUMBER, NAME from GV$ASM_DISKGROUP where GROUP_NUMBER='{}';",
                row.group
            );
            match self.sql(&query).await {
                Ok(out) => {
                    if let Some(name) = parse_group_name(&out) {
                        names.insert(row.group.clone(), name);
                    }
                }
                Err(e) => warn!("Could not resolve diskgroup of group {}: {:#}", row.group, e),
            }
        }

        let details = state.record_poll(&rows, &names);
        let percent = state.report(weights);
        info!("Rebalance overall progress {}%", percent);
        self.reporter.rebalance_progress(&progress_json(details, percent));
    }
}
