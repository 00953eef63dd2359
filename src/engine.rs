use std::fs;
use std::path::PathBuf;

use log::info;

use curtin_api::config::{ConfigEntry, StorageConfig};
use curtin_api::error::{CurtinError, CurtinResultExt, ExecutionError, ReportError, SchemaError};

use crate::context::EngineContext;
use crate::executors::{self, DeviceMap};
use crate::holders;
use crate::lock::StorageLock;
use crate::persisters;
use crate::planner::{self, PlanStep};
use crate::probe::HostTopology;

/// Runs the full `block-meta custom` pipeline: load config, clear holders on
/// every target disk, build the action graph, execute the plan, and persist
/// fstab and the device map (§4).
pub fn run_custom(ctx: &EngineContext) -> Result<(), CurtinError> {
    let _lock = StorageLock::acquire()?;
    ctx.report_stage("lock-acquired");

    let yaml = fs::read_to_string(&ctx.config_path).structured(SchemaError::Yaml)?;
    let config = StorageConfig::from_yaml(&yaml)?;

    ctx.report_stage("clear-holders");
    clear_target_disks(&config)?;

    let graph = config.clone().build_graph()?;
    let plan = planner::plan(&graph)?;
    let mut devices = DeviceMap::default();

    ctx.report_stage("materialize");
    for step in &plan {
        match step {
            PlanStep::Materialize(entry) => {
                ctx.report_stage(&format!("materialize/{}", entry.id()));
                executors::execute(entry, &graph, ctx, &mut devices, config.version)
                    .map_err(|e| attach_probe_diagnostic(e, entry))?;
                reprobe_after_mutation(entry);
            }
            PlanStep::Verify(entry) => {
                ctx.report_stage(&format!("verify/{}", entry.id()));
                crate::verifier::verify(entry, &graph, &mut devices)?
            }
        }
    }

    ctx.report_stage("persist");
    persisters::write_fstab(&config, &devices, &ctx.output_fstab)?;
    persisters::write_device_map(&config, &devices)?;

    let crypttab_path = ctx.target_mount_point.join("etc/crypttab");
    persisters::write_crypttab(&config, &devices, &crypttab_path)?;

    let udev_rules_dir = ctx.target_mount_point.join("etc/udev/rules.d");
    fs::create_dir_all(&udev_rules_dir).structured(ExecutionError::ActionFailed {
        id: "by-dname-rules".into(),
        kind: "persist",
    })?;
    let udev_rules_path = udev_rules_dir.join("50-curtin-by-dname.rules");
    persisters::write_by_dname_rules(&config, &devices, &udev_rules_path)?;

    ctx.report_stage("done");
    info!("Storage configuration applied successfully");
    Ok(())
}

/// Resolves every `disk` entry in `config` to its real device node and runs
/// clear-holders (§2, §4.1) against each one before any plan step executes.
/// All disks are resolved first and only then torn down, so a disk that
/// turns out to be unresolvable fails the whole operation before any other
/// disk has been touched (§11 "disk-safety pre-check").
fn clear_target_disks(config: &StorageConfig) -> Result<(), CurtinError> {
    let disk_paths: Vec<PathBuf> = config
        .config
        .iter()
        .filter_map(|entry| match entry {
            ConfigEntry::Disk(disk) => Some(disk),
            _ => None,
        })
        .map(|disk| {
            osutils::block_devices::resolve_disk(disk).structured(ExecutionError::ActionFailed {
                id: disk.id.clone(),
                kind: "disk",
            })
        })
        .collect::<Result<_, _>>()?;

    for disk_path in &disk_paths {
        holders::clear(disk_path)?;
    }
    Ok(())
}

/// Reprobes the host topology after a mutating action (§4.1, §5). Probe
/// failure here is a warning, not fatal: nothing downstream yet consumes
/// this snapshot directly, only the one taken on executor failure below.
fn reprobe_after_mutation(entry: &ConfigEntry) {
    if let Err(e) = HostTopology::probe() {
        log::debug!("reprobe after '{}' failed: {e:#}", entry.id());
    }
}

/// Attaches an immediate probe snapshot to an executor failure, alongside
/// the entry id and type already carried by [`ExecutionError::ActionFailed`]
/// (§7 "all failures produce ... a probe snapshot taken immediately
/// afterward").
fn attach_probe_diagnostic(err: CurtinError, entry: &ConfigEntry) -> CurtinError {
    let snapshot = match HostTopology::probe() {
        Ok(topology) => format!(
            "{} block device(s), {} raid array(s) visible",
            topology.block_devices.len(),
            topology.raid_arrays.len()
        ),
        Err(probe_err) => format!("probe snapshot unavailable ({probe_err:#})"),
    };
    Err::<(), CurtinError>(err)
        .message(format!(
            "entry '{}' (type '{}') failed; probe snapshot: {snapshot}",
            entry.id(),
            entry.type_name()
        ))
        .unwrap_err()
}
