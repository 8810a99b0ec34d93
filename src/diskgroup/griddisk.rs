use super::error::{DgResult, DiskgroupError, ErrorKind};
use super::types::{slice_size_mb, CellGridDiskTopology, CelldiskType};
use crate::executor::RemoteShell;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{error, info, warn};

/// Text cellcli prints when an alter is rejected, even with a zero exit code.
pub(crate) const ALTER_FAILED_MARKER: &str = "alter failed for reason";

#[allow(clippy::expect_used)]
static FLASH_GRIDDISK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(FD)_0[0-1].*").expect("static regex"));

/// Derive which grid disks of `diskgroup` sit on which cell from its fail-group map.
///
/// `failgroups` is `{CELL: {num_disks, celldisks: [...]}}`. Only cells reporting more
/// than one disk are kept; the celldisk type comes from the first grid disk name.
pub fn derive_topology(diskgroup: &str, failgroups: &Value) -> DgResult<CellGridDiskTopology> {
    let groups = failgroups.as_object().ok_or_else(|| {
        DiskgroupError::new(
            ErrorKind::MissingFgrpPropDict,
            format!("failgroups of {diskgroup} is not a map"),
        )
    })?;
    if groups.is_empty() {
        return Err(DiskgroupError::new(
            ErrorKind::MissingFgrpProp,
            format!("no failgroups reported for {diskgroup}"),
        ));
    }

    let mut cells = BTreeMap::new();
    for (cell, group) in groups {
        let num_disks = group.get("num_disks").and_then(super::gateway::as_f64).unwrap_or(0.0);
        if num_disks <= 1.0 {
            continue;
        }
        let disks: Vec<String> = group
            .get("celldisks")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        if disks.is_empty() {
            return Err(DiskgroupError::new(
                ErrorKind::NullPropertyValue,
                format!("cell {cell} reports no grid disks for {diskgroup}"),
            ));
        }
        cells.insert(cell.to_ascii_uppercase(), disks);
    }

    let griddisks_per_cell = cells.values().next().map_or(0, Vec::len);
    if cells.is_empty() || griddisks_per_cell == 0 {
        return Err(DiskgroupError::new(
            ErrorKind::ErrorFetchingDetails,
            format!("could not derive cell and grid disk counts for {diskgroup}"),
        ));
    }

    for (cell, disks) in cells.iter().filter(|(_, disks)| disks.len() != griddisks_per_cell) {
        warn!(
            "{} has {} grid disks for {}, sizing slices by {} per cell",
            cell,
            disks.len(),
            diskgroup,
            griddisks_per_cell
        );
    }

    let first = cells.values().next().and_then(|d| d.first()).map_or("", String::as_str);
    let celldisk_type = if FLASH_GRIDDISK_RE.is_match(first) {
        CelldiskType::FlashDisk
    } else {
        CelldiskType::HardDisk
    };

    info!(
        "Topology of {}: {} cell(s), {} grid disk(s) per cell, {}",
        diskgroup,
        cells.len(),
        griddisks_per_cell,
        celldisk_type.as_str()
    );
    Ok(CellGridDiskTopology {
        diskgroup: diskgroup.to_string(),
        cells,
        griddisks_per_cell,
        celldisk_type,
    })
}

/// Short, lower-cased host name used to match fail-group cell names.
fn short_name(host: &str) -> String {
    host.split('.').next().unwrap_or(host).to_ascii_lowercase()
}

/// Issues cellcli commands against every storage cell, one cell at a time.
pub struct GridDiskExecutor<'a, S> {
    shell: &'a S,
    /// Cell host names, sorted.
    cells: Vec<String>,
    sparse_vsize_factor: u64,
}

impl<'a, S: RemoteShell> GridDiskExecutor<'a, S> {
    pub fn new(shell: &'a S, cells: &[String], sparse_vsize_factor: u64) -> Self {
        let mut cells = cells.to_vec();
        cells.sort();
        Self { shell, cells, sparse_vsize_factor }
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Configured host behind a fail-group cell key.
    fn host_for(&self, cell_key: &str) -> Option<&str> {
        let wanted = cell_key.to_ascii_lowercase();
        self.cells.iter().find(|h| short_name(h) == wanted).map(String::as_str)
    }

    /// Cells of the topology that map onto configured hosts, in host order.
    fn topology_hosts<'t>(&self, topology: &'t CellGridDiskTopology) -> Vec<(&str, &'t [String])> {
        let mut hosts: Vec<_> = topology
            .cells
            .iter()
            .filter_map(|(cell, disks)| match self.host_for(cell) {
                Some(host) => Some((host, disks.as_slice())),
                None => {
                    warn!("Cell {} of {} is not a configured cell host, skipping", cell, topology.diskgroup);
                    None
                }
            })
            .collect();
        hosts.sort_by(|a, b| a.0.cmp(b.0));
        hosts
    }

    async fn cellcli(&self, host: &str, command: &str, kind: ErrorKind) -> DgResult<String> {
        info!("{}: {}", host, command);
        let out = self
            .shell
            .run(host, command)
            .await
            .map_err(|e| DiskgroupError::new(kind, format!("{host}: {command}: {e:#}")))?;
        if !out.success() {
            return Err(DiskgroupError::new(
                kind,
                format!("{host}: {command} exited with {}: {}", out.exit_code, out.stderr.trim()),
            ));
        }
        Ok(out.stdout)
    }

    /// Refuse to reshape a diskgroup whose grid disks are not all healthy.
    pub async fn reshape_precheck(&self, topology: &CellGridDiskTopology) -> DgResult<()> {
        let cmd = format!(
            "cellcli -e list griddisk attributes name,status,asmmodestatus where asmDiskGroupName = {}",
            topology.diskgroup
        );
        for (host, _) in self.topology_hosts(topology) {
            let out = self.cellcli(host, &cmd, ErrorKind::InvalidState).await?;
            for line in out.lines() {
                let lower = line.to_ascii_lowercase();
                if ["dropped", "offline", "unknown"].iter().any(|s| lower.split_whitespace().any(|w| w == *s)) {
                    return Err(DiskgroupError::new(
                        ErrorKind::InvalidState,
                        format!("grid disk not ready for resize on {host}: {}", line.trim()),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Alter every grid disk of the diskgroup to the slice that `new_size_mb` gives.
    ///
    /// Returns the slice size applied.
    pub async fn resize_griddisks(
        &self,
        topology: &CellGridDiskTopology,
        new_size_mb: u64,
        sparse: bool,
    ) -> DgResult<u64> {
        let slice = topology.slice_mb(new_size_mb);
        if slice == 0 {
            return Err(DiskgroupError::new(
                ErrorKind::InvalidArgs,
                format!("size {new_size_mb} MB is too small for {}", topology.diskgroup),
            ));
        }
        self.reshape_precheck(topology).await?;

        let size_attr = if sparse {
            format!("size={slice}M,virtualSize={}M", slice * self.sparse_vsize_factor)
        } else {
            format!("size={slice}M")
        };

        for (host, celldisks) in self.topology_hosts(topology) {
            info!("Resizing {} grid disk(s) of {} on {}", celldisks.len(), topology.diskgroup, host);
            for celldisk in celldisks {
                let cmd =
                    format!("cellcli -e alter griddisk {}_{} {}", topology.diskgroup, celldisk, size_attr);
                let out = self.cellcli(host, &cmd, ErrorKind::GdResizeFailed).await?;
                if out.contains(ALTER_FAILED_MARKER) {
                    error!("Grid disk resize failed on {}: {}", host, out.trim());
                    return Err(DiskgroupError::new(
                        ErrorKind::GdResizeFailed,
                        format!("{host}: {cmd}: {}", out.trim()),
                    ));
                }
            }
        }
        Ok(slice)
    }

    /// Create the sparse grid disks on every cell; on a failing cell, drop what was made.
    pub async fn create_sparse_griddisks(
        &self,
        prefix: &str,
        celldisk_type: CelldiskType,
        slice_mb: u64,
    ) -> DgResult<()> {
        let slice_gb = slice_mb / 1024;
        let cmd = format!(
            "cellcli -e create griddisk all {} prefix={},size={}G,virtualsize={}G",
            celldisk_type.as_str(),
            prefix,
            slice_gb,
            slice_gb * self.sparse_vsize_factor
        );

        let mut failure = None;
        for host in &self.cells {
            if let Err(e) = self.cellcli(host, &cmd, ErrorKind::GdCreateFailed).await {
                failure = Some(e);
                break;
            }
            info!("Sparse grid disks {} created on {}", prefix, host);
        }

        let Some(err) = failure else {
            return Ok(());
        };
        warn!("Sparse grid disk creation failed, dropping prefix {} on all cells", prefix);
        let drop_cmd = format!("cellcli -e drop griddisk all prefix={prefix}");
        for host in &self.cells {
            if let Err(e) = self.cellcli(host, &drop_cmd, ErrorKind::GdCreateFailed).await {
                error!("Cleanup of sparse grid disks failed on {}: {}", host, e);
                break;
            }
        }
        Err(err)
    }

    pub async fn drop_griddisks(&self, prefix: &str, force: bool) -> DgResult<()> {
        let cmd = if force {
            format!("cellcli -e drop griddisk all prefix={prefix} force")
        } else {
            format!("cellcli -e drop griddisk all prefix={prefix}")
        };
        for host in &self.cells {
            self.cellcli(host, &cmd, ErrorKind::GdDropFailed).await?;
        }
        Ok(())
    }

    /// Names of the grid disks of a diskgroup suffix across all cells, in cell order.
    pub async fn failgroup_list(&self, suffix: &str) -> Vec<String> {
        let cmd = format!(
            "cellcli -e list griddisk ATTRIBUTES NAME,SIZE where NAME like '.*{suffix}_.*' and diskType like '.*Disk';"
        );
        let mut names = Vec::new();
        for host in &self.cells {
            match self.cellcli(host, &cmd, ErrorKind::ErrorFetchingDetails).await {
                Ok(out) => names.extend(
                    out.lines().filter_map(|l| l.split_whitespace().next()).map(str::to_string),
                ),
                Err(e) => warn!("Could not list grid disks on {}: {}", host, e),
            }
        }
        names
    }

    /// Whether the grid disks of `diskgroup` already have the slice `new_size_mb` needs.
    pub async fn griddisks_already_sized(&self, diskgroup: &str, new_size_mb: u64) -> DgResult<bool> {
        let host = self.first_cell()?;
        let celldisks = self.celldisk_names().await?;
        let expected = slice_size_mb(new_size_mb, self.cell_count(), celldisks.len());

        let cmd = format!("cellcli -e list griddisk attributes size where asmDiskGroupName = {diskgroup};");
        let out = self.cellcli(&host, &cmd, ErrorKind::ErrorFetchingDetails).await?;
        let current = out
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .and_then(|l| l.split_whitespace().last())
            .and_then(parse_cell_size_mb)
            .ok_or_else(|| {
                DiskgroupError::new(
                    ErrorKind::InvalidPropValue,
                    format!("could not read grid disk size of {diskgroup} on {host}"),
                )
            })?;
        info!("Grid disks of {} are {} MB, slice for {} MB is {} MB", diskgroup, current, new_size_mb, expected);
        Ok(current >= expected as f64)
    }

    /// Free MB per cell disk, read from the first cell disk of the first cell.
    pub async fn celldisk_free_mb(&self) -> DgResult<f64> {
        let host = self.first_cell()?;
        let cmd = "cellcli -e LIST CELLDISK WHERE name LIKE \\\"CD_.*\\\" attributes name,size,freespace;";
        let out = self.cellcli(&host, cmd, ErrorKind::ErrorFetchingDetails).await?;
        out.lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .and_then(|l| l.split_whitespace().nth(2))
            .and_then(parse_cell_size_mb)
            .ok_or_else(|| {
                DiskgroupError::new(
                    ErrorKind::InvalidPropValue,
                    format!("could not read cell disk free space on {host}"),
                )
            })
    }

    pub async fn celldisk_names(&self) -> DgResult<Vec<String>> {
        let host = self.first_cell()?;
        let cmd = "cellcli -e LIST CELLDISK WHERE name LIKE \\\"CD_.*\\\" attributes name;";
        let out = self.cellcli(&host, cmd, ErrorKind::ErrorFetchingDetails).await?;
        let names: Vec<String> = out
            .lines()
            .filter_map(|l| l.split_whitespace().next())
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Err(DiskgroupError::new(
                ErrorKind::ErrorFetchingDetails,
                format!("no cell disks listed on {host}"),
            ));
        }
        Ok(names)
    }

    fn first_cell(&self) -> DgResult<String> {
        self.cells.first().cloned().ok_or_else(|| {
            DiskgroupError::new(ErrorKind::ErrorFetchingDetails, "no storage cells configured")
        })
    }
}

/// Parse a cellcli size like `1.5T`, `512G` or `2048M` into MB.
pub fn parse_cell_size_mb(value: &str) -> Option<f64> {
    let value = value.trim();
    let (number, factor) = match value.chars().last()? {
        'M' | 'm' => (&value[..value.len() - 1], 1.0),
        'G' | 'g' => (&value[..value.len() - 1], 1024.0),
        'T' | 't' => (&value[..value.len() - 1], 1_048_576.0),
        _ => (value, 1.0),
    };
    number.trim().parse::<f64>().ok().map(|n| n * factor)
}
