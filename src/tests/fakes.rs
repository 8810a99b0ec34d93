//! Recording stand-ins for the cells and the ASM agent.

use crate::config::AppConfig;
use crate::db::Database;
use crate::diskgroup::error::DgResult;
use crate::diskgroup::gateway::{AgentResponse, AsmAction, AsmAgent, AsmRequest, PROP_REBALANCE};
use crate::diskgroup::{DiskgroupRecord, OperationConfig, Redundancy, Tier};
use crate::executor::{CommandOutput, RemoteShell};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Every remote call, in the order it was issued.
pub(super) type CallLog = Arc<Mutex<Vec<String>>>;

pub(super) fn new_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub(super) fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Index of the first call containing `pattern`.
pub(super) fn position(log: &CallLog, pattern: &str) -> Option<usize> {
    calls(log).iter().position(|c| c.contains(pattern))
}

/// Calls that change remote state.
pub(super) fn mutating_calls(log: &CallLog) -> Vec<String> {
    calls(log)
        .into_iter()
        .filter(|c| {
            ["asm create", "asm resize", "asm drop", "asm rebalance ", "alter griddisk", "create griddisk", "drop griddisk"]
                .iter()
                .any(|p| c.contains(p))
        })
        .collect()
}

struct Rule {
    host: Option<String>,
    pattern: String,
    output: CommandOutput,
}

/// Shell that answers by the first rule whose pattern the command contains.
pub(super) struct FakeShell {
    log: CallLog,
    rules: Vec<Rule>,
}

impl FakeShell {
    pub(super) fn new(log: CallLog) -> Self {
        Self { log, rules: Vec::new() }
    }

    /// Shell answering the cell queries the validator and grid disk executor make.
    pub(super) fn cells(log: CallLog) -> Self {
        Self::new(log)
            .respond("attributes size where asmDiskGroupName", "20G")
            .respond("attributes name,size,freespace", "CD_00_cell01 10T 5T")
            .respond("attributes name;", "CD_00_cell01\nCD_01_cell01")
    }

    pub(super) fn respond(self, pattern: &str, stdout: &str) -> Self {
        self.rule(None, pattern, CommandOutput::ok(stdout))
    }

    pub(super) fn rule(mut self, host: Option<&str>, pattern: &str, output: CommandOutput) -> Self {
        self.rules.push(Rule { host: host.map(str::to_string), pattern: pattern.to_string(), output });
        self
    }
}

impl RemoteShell for FakeShell {
    async fn run(&self, host: &str, command: &str) -> anyhow::Result<CommandOutput> {
        self.log.lock().unwrap().push(format!("shell {host}: {command}"));
        let output = self
            .rules
            .iter()
            .find(|r| {
                let host_matches = match &r.host {
                    Some(h) => h == host,
                    None => true,
                };
                host_matches && command.contains(&r.pattern)
            })
            .map_or_else(|| CommandOutput::ok(""), |r| r.output.clone());
        Ok(output)
    }

    async fn copy_to(&self, host: &str, _local_path: &Path, remote_path: &str) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(format!("copy {host}: {remote_path}"));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub(super) struct FakeDiskgroup {
    pub total_mb: u64,
    pub used_mb: u64,
    pub os_mb: u64,
}

/// In-memory ASM: two cells with two grid disks each under every diskgroup.
pub(super) struct FakeAgent {
    log: CallLog,
    diskgroups: Mutex<BTreeMap<String, FakeDiskgroup>>,
    failing: Vec<&'static str>,
    quorum_failures: AtomicU32,
    submits: AtomicU32,
    resize_msg: String,
    /// Rebalance states handed out one per status query, then `DONE`.
    rebalance_states: Mutex<VecDeque<&'static str>>,
}

/// Grid disks behind every fake diskgroup.
pub(super) const FAKE_PARTS: u64 = 4;

impl FakeAgent {
    pub(super) fn new(log: CallLog) -> Self {
        Self {
            log,
            diskgroups: Mutex::new(BTreeMap::new()),
            failing: Vec::new(),
            quorum_failures: AtomicU32::new(0),
            submits: AtomicU32::new(0),
            resize_msg: String::new(),
            rebalance_states: Mutex::new(VecDeque::new()),
        }
    }

    /// `total_mb` is what ASM reports, so virtual for sparse diskgroups.
    pub(super) fn with_diskgroup(self, name: &str, total_mb: u64, used_mb: u64, os_mb: u64) -> Self {
        self.diskgroups.lock().unwrap().insert(name.to_string(), FakeDiskgroup { total_mb, used_mb, os_mb });
        self
    }

    pub(super) fn failing(mut self, action: &'static str) -> Self {
        self.failing.push(action);
        self
    }

    pub(super) fn with_quorum_failures(self, n: u32) -> Self {
        self.quorum_failures.store(n, Ordering::SeqCst);
        self
    }

    pub(super) fn with_resize_msg(mut self, msg: &str) -> Self {
        self.resize_msg = msg.to_string();
        self
    }

    pub(super) fn with_rebalance_states(self, states: &[&'static str]) -> Self {
        self.rebalance_states.lock().unwrap().extend(states);
        self
    }

    pub(super) fn submits(&self) -> u32 {
        self.submits.load(Ordering::SeqCst)
    }

    pub(super) fn total_of(&self, name: &str) -> Option<u64> {
        self.diskgroups.lock().unwrap().get(name).map(|d| d.total_mb)
    }

    fn failgroups() -> Value {
        json!({
            "CELL01": { "num_disks": 2, "celldisks": ["CD_00_cell01", "CD_01_cell01"] },
            "CELL02": { "num_disks": 2, "celldisks": ["CD_00_cell02", "CD_01_cell02"] },
        })
    }
}

impl AsmAgent for FakeAgent {
    async fn submit(&self, request: &AsmRequest) -> DgResult<String> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        if request.action != AsmAction::Info {
            self.log.lock().unwrap().push(format!("asm {} {}", request.action.as_str(), request.diskgroup()));
        }
        Ok(format!("job-{n}"))
    }

    async fn wait(&self, _job_id: &str, request: &AsmRequest) -> DgResult<AgentResponse> {
        let pending = self.quorum_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.quorum_failures.store(pending - 1, Ordering::SeqCst);
            return Ok(AgentResponse {
                status: "Failed".to_string(),
                msg: String::new(),
                errmsg: "ORA-15025: could not open disk".to_string(),
            });
        }
        if self.failing.contains(&request.action.as_str()) {
            return Ok(AgentResponse {
                status: "Failed".to_string(),
                msg: String::new(),
                errmsg: "injected failure".to_string(),
            });
        }

        let name = request.diskgroup().to_string();
        let mut msg = String::new();
        let mut diskgroups = self.diskgroups.lock().unwrap();
        match request.action {
            AsmAction::Resize => {
                let slice = request.params.get("new_size").and_then(Value::as_u64).unwrap_or(0);
                let entry =
                    diskgroups.entry(name).or_insert(FakeDiskgroup { total_mb: 0, used_mb: 0, os_mb: 0 });
                entry.total_mb = slice * FAKE_PARTS;
                entry.os_mb = slice;
                msg.clone_from(&self.resize_msg);
            }
            AsmAction::Create => {
                diskgroups.insert(name, FakeDiskgroup { total_mb: 0, used_mb: 0, os_mb: 0 });
            }
            AsmAction::Drop => {
                diskgroups.remove(&name);
            }
            _ => {}
        }
        Ok(AgentResponse { status: "Success".to_string(), msg, errmsg: String::new() })
    }

    async fn read_info(&self, request: &AsmRequest) -> DgResult<Value> {
        let name = request.diskgroup();
        let asks_rebalance = request
            .params
            .get("props")
            .and_then(Value::as_array)
            .is_some_and(|props| props.iter().any(|p| p == PROP_REBALANCE));
        let rebalance = if asks_rebalance {
            self.rebalance_states.lock().unwrap().pop_front().unwrap_or("DONE")
        } else {
            "DONE"
        };
        let diskgroups = self.diskgroups.lock().unwrap();
        let Some(dg) = diskgroups.get(name) else {
            return Ok(json!({}));
        };
        Ok(json!({
            name: {
                "dg_storage_props": { "total_mb": dg.total_mb, "used_mb": dg.used_mb, "os_mb": dg.os_mb },
                "failgroups": Self::failgroups(),
                "rebalance_status": { "status": rebalance },
            }
        }))
    }
}

/// Operation constants with every wait shortened to nothing.
pub(super) fn test_config() -> OperationConfig {
    let app = AppConfig {
        rebalance_poll_seconds: 0,
        time_check_rebalance_seconds: 0,
        job_poll_seconds: 0,
        quorum_retry_backoff_seconds: 0,
        ..AppConfig::default()
    };
    OperationConfig::from_app(&app)
}

pub(super) fn cell_hosts() -> Vec<String> {
    vec!["cell01.example.com".to_string(), "cell02.example.com".to_string()]
}

pub(super) fn record(name: &str, tier: Tier, size_gb: u64, redundancy: Redundancy) -> DiskgroupRecord {
    DiskgroupRecord {
        id: tier.as_str().to_string(),
        name: name.to_string(),
        tier,
        size_gb,
        slice_size_gb: size_gb / FAKE_PARTS,
        sparse_virtual_size_gb: 0,
        quorum: false,
        ocr_vote: tier == Tier::Data,
        redundancy,
        sparse: tier == Tier::Sparse,
    }
}

pub(super) fn store_with(records: &[DiskgroupRecord]) -> Database {
    let db = Database::open_in_memory().unwrap();
    db.run_migrations().unwrap();
    for r in records {
        db.upsert_diskgroup(r).unwrap();
    }
    db
}
