use super::error::{DgResult, DiskgroupError, ErrorKind, KindExt};
use super::types::{OperationConfig, RebalanceStatus, SizeSnapshot, Tier};
use crate::config::AppConfig;
use crate::executor::RemoteShell;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};
use uuid::Uuid;

/// ASM error for a transiently unavailable quorum disk.
const QUORUM_UNAVAILABLE: &str = "ORA-15025";

/// Marker in a resize response while voting disks are being moved.
const VOTE_DISK_RELOCATING: &str = "relocating";

pub(crate) const PROP_STORAGE: &str = "dg_storage_props";
pub(crate) const PROP_FAILGROUPS: &str = "failgroups";
pub(crate) const PROP_REBALANCE: &str = "rebalance_status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmAction {
    Create,
    Resize,
    Drop,
    Rebalance,
    Info,
    RebalanceTimeEstimate,
    RelocateVoteDisk,
}

impl AsmAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Resize => "resize",
            Self::Drop => "drop",
            Self::Rebalance => "rebalance",
            Self::Info => "info",
            Self::RebalanceTimeEstimate => "rebalance_time_estimate",
            Self::RelocateVoteDisk => "relocate_votedisk",
        }
    }
}

/// One request for the ASM agent. Only the params are free-form JSON.
#[derive(Debug, Clone)]
pub struct AsmRequest {
    pub action: AsmAction,
    pub params: Map<String, Value>,
    /// Unique tag used to derive the request's file names.
    pub tag: Uuid,
}

impl AsmRequest {
    pub fn new(action: AsmAction) -> Self {
        let mut params = Map::new();
        params.insert("dbname".into(), Value::from("grid"));
        Self { action, params, tag: Uuid::new_v4() }
    }

    pub fn for_diskgroup(action: AsmAction, diskgroup: &str) -> Self {
        Self::new(action).param("diskgroup", diskgroup)
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn diskgroup(&self) -> &str {
        self.params.get("diskgroup").and_then(Value::as_str).unwrap_or_default()
    }
}

/// Final state of an agent job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentResponse {
    pub status: String,
    pub msg: String,
    pub errmsg: String,
}

impl AgentResponse {
    pub fn succeeded(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}

/// The external ASM management agent.
pub trait AsmAgent: Send + Sync {
    /// Submit a request; returns the agent's job id.
    fn submit(&self, request: &AsmRequest) -> impl Future<Output = DgResult<String>> + Send;

    /// Block until the job reaches a terminal state.
    fn wait(
        &self,
        job_id: &str,
        request: &AsmRequest,
    ) -> impl Future<Output = DgResult<AgentResponse>> + Send;

    /// Read the per-diskgroup properties an `info` request produced.
    fn read_info(&self, request: &AsmRequest) -> impl Future<Output = DgResult<Value>> + Send;
}

/// File locations used by the dbaasapi agent.
#[derive(Debug, Clone)]
pub struct AgentPaths {
    pub bin: String,
    pub request_dir: String,
    pub grid_log_dir: String,
    pub staging_dir: String,
}

impl AgentPaths {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            bin: config.dbaasapi_bin.clone(),
            request_dir: config.dbaasapi_request_dir.clone(),
            grid_log_dir: config.grid_log_dir.clone(),
            staging_dir: config.staging_dir.clone(),
        }
    }
}

/// Agent that drives `dbaasapi` on the first ASM node through a [`RemoteShell`].
pub struct DbaasAgent<'a, S> {
    shell: &'a S,
    node: String,
    paths: AgentPaths,
    poll: std::time::Duration,
    counter: AtomicU64,
}

impl<'a, S: RemoteShell> DbaasAgent<'a, S> {
    pub fn new(
        shell: &'a S,
        node: impl Into<String>,
        paths: AgentPaths,
        poll: std::time::Duration,
    ) -> Self {
        Self { shell, node: node.into(), paths, poll, counter: AtomicU64::new(0) }
    }

    fn output_path(&self, tag: Uuid, action: &str, ext: &str) -> String {
        format!("{}/diskgroupOp{}.{}_{}.{}", self.paths.grid_log_dir, tag.simple(), action, tag, ext)
    }

    fn info_path(&self, request: &AsmRequest) -> String {
        self.output_path(request.tag, request.action.as_str(), "json")
    }

    /// The JSON document the agent expects for `request`.
    pub fn wire_request(&self, request: &AsmRequest) -> Value {
        let mut params = request.params.clone();
        if request.action == AsmAction::Info {
            params.insert("infofile".into(), Value::from(self.info_path(request)));
        }
        json!({
            "object": "db",
            "operation": "diskgroup",
            "action": request.action.as_str(),
            "params": params,
            "outputfile": self.output_path(request.tag, request.action.as_str(), "out"),
            "FLAGS": "",
        })
    }

    /// Stage, copy and run one agent invocation, returning the parsed output file.
    async fn invoke(&self, body: &Value, outputfile: &str) -> DgResult<Value> {
        let uuid = Uuid::new_v4();
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let name = format!("diskgroupOp-{uuid}-{n}_input_{uuid}.json");
        let local = PathBuf::from(&self.paths.staging_dir).join(&name);
        let remote = format!("{}/{}", self.paths.request_dir, name);

        let contents = serde_json::to_vec_pretty(body).kind(ErrorKind::ErrorReadingPayload)?;
        tokio::fs::write(&local, contents).await.kind(ErrorKind::DbaasApiFail)?;
        let copied = self.shell.copy_to(&self.node, &local, &remote).await;
        if let Err(e) = tokio::fs::remove_file(&local).await {
            warn!("Could not remove staged request {}: {}", local.display(), e);
        }
        copied.kind(ErrorKind::DbaasApiFail)?;

        let cmd = format!("nohup {} -i {} < /dev/null > /dev/null 2>&1", self.paths.bin, remote);
        info!("Running agent on {}: {}", self.node, cmd);
        let run = self.shell.run(&self.node, &cmd).await.kind(ErrorKind::DbaasApiFail)?;
        if !run.success() {
            return Err(DiskgroupError::new(
                ErrorKind::DbaasApiFail,
                format!("agent exited with {} on {}", run.exit_code, self.node),
            ));
        }
        self.read_json(outputfile).await
    }

    async fn read_json(&self, path: &str) -> DgResult<Value> {
        let out = self
            .shell
            .run(&self.node, &format!("cat {path}"))
            .await
            .kind(ErrorKind::ErrorReadingPayload)?;
        if !out.success() || out.stdout.trim().is_empty() {
            return Err(DiskgroupError::new(
                ErrorKind::ErrorReadingPayload,
                format!("could not read {path} on {}", self.node),
            ));
        }
        serde_json::from_str(&out.stdout).kind(ErrorKind::ErrorReadingPayload)
    }
}

fn text(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

impl<S: RemoteShell> AsmAgent for DbaasAgent<'_, S> {
    async fn submit(&self, request: &AsmRequest) -> DgResult<String> {
        let body = self.wire_request(request);
        let outputfile = self.output_path(request.tag, request.action.as_str(), "out");
        let out = self.invoke(&body, &outputfile).await?;
        match out.get("id") {
            Some(id) if !id.is_null() => Ok(id.as_str().map_or_else(|| id.to_string(), str::to_string)),
            _ => Err(DiskgroupError::new(
                ErrorKind::DbaasObjJobIdReadFail,
                format!("no job id in {outputfile}"),
            )),
        }
    }

    async fn wait(&self, job_id: &str, request: &AsmRequest) -> DgResult<AgentResponse> {
        loop {
            let status_tag = Uuid::new_v4();
            let outputfile = self.output_path(status_tag, "status", "out");
            let mut params = Map::new();
            params.insert("dbname".into(), Value::from("grid"));
            if request.action == AsmAction::Info {
                params.insert("infofile".into(), Value::from(self.info_path(request)));
            }
            let body = json!({
                "object": "db",
                "action": "status",
                "operation": "diskgroup",
                "id": job_id,
                "params": params,
                "outputfile": outputfile,
                "FLAGS": "",
            });

            let out = self.invoke(&body, &outputfile).await?;
            let status = text(&out, "status");
            if status.is_empty() {
                return Err(DiskgroupError::new(
                    ErrorKind::DbaasApiFail,
                    format!("job {job_id} status output has no status"),
                ));
            }
            if matches!(status.as_str(), "Success" | "Error" | "Failed") {
                return Ok(AgentResponse {
                    status,
                    msg: text(&out, "msg"),
                    errmsg: text(&out, "errmsg"),
                });
            }
            tokio::time::sleep(self.poll).await;
        }
    }

    async fn read_info(&self, request: &AsmRequest) -> DgResult<Value> {
        self.read_json(&self.info_path(request)).await
    }
}

/// Typed front for the agent: retries, info parsing, and one method per action.
pub struct AsmGateway<'a, A> {
    agent: &'a A,
    cfg: &'a OperationConfig,
}

impl<'a, A: AsmAgent> AsmGateway<'a, A> {
    pub const fn new(agent: &'a A, cfg: &'a OperationConfig) -> Self {
        Self { agent, cfg }
    }

    /// Submit and wait, retrying while ASM reports the quorum disk unavailable.
    pub async fn execute(&self, request: &AsmRequest) -> DgResult<AgentResponse> {
        let mut attempt = 0;
        loop {
            info!(
                "Submitting {} for diskgroup '{}' (attempt {})",
                request.action.as_str(),
                request.diskgroup(),
                attempt + 1
            );
            let job_id = self.agent.submit(request).await?;
            let response = self.agent.wait(&job_id, request).await?;

            if response.errmsg.contains(QUORUM_UNAVAILABLE) && attempt < self.cfg.quorum_retries {
                attempt += 1;
                warn!(
                    "{} of '{}' hit {}, retrying in {:?}",
                    request.action.as_str(),
                    request.diskgroup(),
                    QUORUM_UNAVAILABLE,
                    self.cfg.quorum_backoff
                );
                tokio::time::sleep(self.cfg.quorum_backoff).await;
                continue;
            }

            if !response.succeeded() {
                return Err(DiskgroupError::new(
                    ErrorKind::DbaasApiFail,
                    format!(
                        "{} of '{}' ended with {}: {}",
                        request.action.as_str(),
                        request.diskgroup(),
                        response.status,
                        response.errmsg
                    ),
                ));
            }
            return Ok(response);
        }
    }

    /// Fetch the requested properties of one diskgroup.
    pub async fn info(&self, diskgroup: &str, props: &[&str]) -> DgResult<Value> {
        let request = AsmRequest::for_diskgroup(AsmAction::Info, diskgroup).param("props", props.to_vec());
        self.execute(&request).await.map_err(|e| {
            DiskgroupError::new(
                ErrorKind::ErrorFetchingDetails,
                format!("could not fetch info for diskgroup {diskgroup}: {}", e.detail),
            )
        })?;
        self.agent.read_info(&request).await
    }

    /// Physical storage figures of a diskgroup.
    pub async fn storage(&self, diskgroup: &str) -> DgResult<SizeSnapshot> {
        let info = self.info(diskgroup, &[PROP_STORAGE]).await?;
        let raw = parse_storage(&info, diskgroup)?;
        Ok(SizeSnapshot {
            total_mb: self.cfg.physical_for(diskgroup, raw.total_mb),
            used_mb: self.cfg.physical_for(diskgroup, raw.used_mb),
            os_mb: self.cfg.physical_for(diskgroup, raw.os_mb),
        })
    }

    pub async fn failgroups(&self, diskgroup: &str) -> DgResult<Value> {
        let info = self.info(diskgroup, &[PROP_FAILGROUPS]).await?;
        dg_property(&info, diskgroup, PROP_FAILGROUPS, ErrorKind::MissingFgrpPropDict).cloned()
    }

    pub async fn rebalance_status(&self, diskgroup: &str) -> DgResult<RebalanceStatus> {
        let info = self.info(diskgroup, &[PROP_REBALANCE]).await?;
        parse_rebalance_status(&info, diskgroup)
    }

    /// A diskgroup exists when ASM can report its storage properties.
    pub async fn exists(&self, diskgroup: &str) -> bool {
        self.storage(diskgroup).await.is_ok()
    }

    pub async fn create(&self, diskgroup: &str, tier: Tier) -> DgResult<AgentResponse> {
        let request = AsmRequest::for_diskgroup(AsmAction::Create, diskgroup)
            .param("diskgroup_type", tier.as_str());
        self.execute(&request).await
    }

    /// Resize to `new_size_mb` per grid disk (virtual for sparse diskgroups).
    pub async fn resize(
        &self,
        diskgroup: &str,
        new_size_mb: u64,
        failgroup_list: &[String],
        rebalance_power: Option<u32>,
    ) -> DgResult<AgentResponse> {
        let mut request = AsmRequest::for_diskgroup(AsmAction::Resize, diskgroup)
            .param("new_size", new_size_mb);
        if !failgroup_list.is_empty() {
            request = request.param("failgroup_list", failgroup_list.to_vec());
        }
        if let Some(power) = rebalance_power {
            request = request.param("rebalance_power", power);
        }
        self.execute(&request).await
    }

    pub async fn drop_diskgroup(&self, diskgroup: &str, force: bool) -> DgResult<AgentResponse> {
        let mut request = AsmRequest::for_diskgroup(AsmAction::Drop, diskgroup);
        if force {
            request = request.param("force", "yes");
        }
        self.execute(&request).await
    }

    pub async fn rebalance(&self, diskgroups: &[String], power: Option<u32>) -> DgResult<AgentResponse> {
        let mut request = AsmRequest::for_diskgroup(AsmAction::Rebalance, &diskgroups.join(","));
        if let Some(power) = power {
            request = request.param("rebalance_power", power);
        }
        self.execute(&request).await
    }

    /// Ask ASM how long a resize would rebalance for. Informational only.
    pub async fn log_rebalance_estimate(&self, diskgroup: &str, new_size_mb: u64) {
        let request = AsmRequest::for_diskgroup(AsmAction::RebalanceTimeEstimate, diskgroup)
            .param("new_size", new_size_mb);
        match self.execute(&request).await {
            Ok(resp) => info!("Rebalance time estimate for {}: {}", diskgroup, resp.msg),
            Err(e) => warn!("Rebalance time estimate for {} unavailable: {}", diskgroup, e),
        }
    }

    pub async fn relocate_vote_disks(&self) -> DgResult<AgentResponse> {
        self.execute(&AsmRequest::new(AsmAction::RelocateVoteDisk)).await
    }
}

/// Whether a resize response reports voting disks being relocated.
pub fn mentions_vote_relocation(response: &AgentResponse) -> bool {
    response.msg.contains(VOTE_DISK_RELOCATING)
}

fn dg_property<'v>(
    info: &'v Value,
    diskgroup: &str,
    property: &str,
    missing: ErrorKind,
) -> DgResult<&'v Value> {
    if info.is_null() || info.as_object().is_some_and(Map::is_empty) {
        return Err(DiskgroupError::new(
            ErrorKind::NullOutputPayload,
            format!("no readable properties in info output for diskgroup {diskgroup}"),
        ));
    }
    let dg = info.get(diskgroup).filter(|v| !v.is_null()).ok_or_else(|| {
        DiskgroupError::new(
            ErrorKind::MissingPropDict,
            format!("could not find properties for diskgroup {diskgroup}"),
        )
    })?;
    dg.get(property).filter(|v| !v.is_null()).ok_or_else(|| {
        DiskgroupError::new(missing, format!("could not find {property} for diskgroup {diskgroup}"))
    })
}

/// Numeric property that may arrive as a number or as a (possibly scientific) string.
pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Raw (unconverted) storage figures from an info payload.
pub fn parse_storage(info: &Value, diskgroup: &str) -> DgResult<SizeSnapshot> {
    let props = dg_property(info, diskgroup, PROP_STORAGE, ErrorKind::MissingStorPropDict)?;
    let field = |key: &str| -> DgResult<u64> {
        props.get(key).and_then(as_f64).map(|v| v as u64).ok_or_else(|| {
            DiskgroupError::new(
                ErrorKind::MissingStorProp,
                format!("{key} missing for diskgroup {diskgroup}"),
            )
        })
    };
    Ok(SizeSnapshot {
        total_mb: field("total_mb")?,
        used_mb: field("used_mb")?,
        os_mb: props.get("os_mb").and_then(as_f64).map_or(0, |v| v as u64),
    })
}

pub fn parse_rebalance_status(info: &Value, diskgroup: &str) -> DgResult<RebalanceStatus> {
    let props = dg_property(info, diskgroup, PROP_REBALANCE, ErrorKind::MissingReblPropDict)?;
    match props.get("status").and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(RebalanceStatus::parse(s)),
        _ => Err(DiskgroupError::new(
            ErrorKind::MissingReblProp,
            format!("could not find rebalance status for diskgroup {diskgroup}"),
        )),
    }
}
