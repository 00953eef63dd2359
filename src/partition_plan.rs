//! v2 partition-table reconciliation (§4.2, §8 "v2 partition identity").
//!
//! A v1 config treats `partition` actions as a simple append: whatever is
//! already on the disk beyond what's configured is left alone. A v2 config
//! instead diffs the configured partitions for a disk against what's
//! already there and removes anything stale before the plan's own creates
//! run, identifying partitions by their start offset rather than their
//! number so that survivors keep their identity across a reconciliation.

use std::collections::HashSet;
use std::path::Path;

use curtin_api::config::ConfigEntry;
use curtin_api::error::{CurtinError, ReportError};
use curtin_api::graph::ActionGraph;
use osutils::{lsblk, parted};

/// Deletes every existing partition on `disk_path` whose start offset
/// doesn't match any `partition` action configured for `disk_id`. Deletion
/// is identified by offset, never by partition number, so a partition the
/// config intends to keep survives even if its siblings are removed and it
/// is renumbered as a result.
pub fn reconcile(disk_id: &str, disk_path: &Path, graph: &ActionGraph) -> Result<(), anyhow::Error> {
    let configured_offsets: HashSet<u64> = graph
        .topological_order()
        .map_err(|e: CurtinError| e.unstructured("reading the action graph during v2 reconciliation"))?
        .into_iter()
        .filter_map(|entry| match entry {
            ConfigEntry::Partition(p) if p.device == disk_id => p.offset.map(|o| o.bytes()),
            _ => None,
        })
        .collect();

    let disk = lsblk::get(disk_path)?;

    // Delete from the highest partition number down, so removing one
    // doesn't shift the in-kernel number of another still queued for
    // removal.
    let mut stale: Vec<u32> = disk
        .children
        .iter()
        .filter_map(|child| {
            let number = child.partition_number?;
            let start = child.start_bytes()?;
            (!configured_offsets.contains(&start)).then_some(number)
        })
        .collect();
    stale.sort_unstable_by(|a, b| b.cmp(a));

    for number in stale {
        parted::rm(disk_path, number)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use curtin_api::config::Partition;
    use curtin_api::primitives::ByteCount;

    fn graph_with_offsets(disk_id: &str, offsets: &[u64]) -> ActionGraph {
        let entries: Vec<ConfigEntry> = offsets
            .iter()
            .enumerate()
            .map(|(i, &offset)| {
                ConfigEntry::Partition(Partition {
                    id: format!("p{i}"),
                    device: disk_id.to_string(),
                    offset: Some(ByteCount(offset)),
                    ..Default::default()
                })
            })
            .collect();
        ActionGraph::build(entries).unwrap()
    }

    #[test]
    fn reconcile_is_a_no_op_when_the_disk_cannot_be_probed() {
        let graph = graph_with_offsets("disk1", &[1_048_576]);
        let err = reconcile("disk1", Path::new("/dev/nonexistent-curtin-test"), &graph).unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
