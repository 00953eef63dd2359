use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use curtin_api::config::{ConfigEntry, SizeSpec};
use curtin_api::error::{CurtinError, ExecutionError, ReportError, VerificationError};
use curtin_api::graph::ActionGraph;
use osutils::{blkid, lsblk, mdadm, ntfsresize, parted, resize2fs};
use sysdefs::filesystems::FileSystemType;

use crate::executors::DeviceMap;

/// Confirms a `preserve: true` entry matches its declared properties
/// without mutating it, then records its resolved path in `devices` so
/// later actions can reference it by id (§4.6).
pub fn verify(
    entry: &ConfigEntry,
    graph: &ActionGraph,
    devices: &mut DeviceMap,
) -> Result<(), CurtinError> {
    match entry {
        ConfigEntry::Disk(disk) => verify_disk(disk, devices),
        ConfigEntry::Partition(partition) => verify_partition(partition, graph, devices),
        ConfigEntry::Format(format) => verify_format(format, devices),
        ConfigEntry::LvmVolgroup(vg) => verify_lvm_volgroup(vg, devices),
        ConfigEntry::LvmPartition(lv) => verify_lvm_partition(lv, devices),
        ConfigEntry::DmCrypt(crypt) => verify_dm_crypt(crypt, devices),
        ConfigEntry::Raid(raid) => verify_raid(raid, devices),
        ConfigEntry::Bcache(bcache) => verify_bcache(bcache, devices),
        _ => Ok(()),
    }
}

fn verify_disk(
    disk: &curtin_api::config::Disk,
    devices: &mut DeviceMap,
) -> Result<(), CurtinError> {
    let path = osutils::block_devices::resolve_disk(disk)
        .structured(VerificationError::TargetMissing(disk.id.clone()))?;
    let device =
        lsblk::get(&path).structured(VerificationError::TargetMissing(disk.id.clone()))?;

    if let (Some(expected), Some(found)) = (disk.ptable, device.partition_table_type) {
        let matches = matches!(
            (expected, found),
            (
                curtin_api::config::PartitionTableType::Gpt,
                lsblk::PartitionTableType::Gpt
            ) | (
                curtin_api::config::PartitionTableType::Msdos,
                lsblk::PartitionTableType::Mbr
            )
        );
        if !matches {
            return Err(CurtinError::new(VerificationError::FieldMismatch {
                id: disk.id.clone(),
                field: "ptable",
                expected: format!("{expected:?}"),
                found: format!("{found:?}"),
            }));
        }
    }
    devices.insert(&disk.id, path);
    Ok(())
}

fn verify_partition(
    partition: &curtin_api::config::Partition,
    graph: &ActionGraph,
    devices: &mut DeviceMap,
) -> Result<(), CurtinError> {
    if partition.uuid.is_none() && partition.number.is_none() {
        return Err(CurtinError::new(VerificationError::FieldMismatch {
            id: partition.id.clone(),
            field: "uuid/number",
            expected: "at least one set".into(),
            found: "neither set".into(),
        }));
    }

    let disk_path = devices.resolve(&partition.device)?.to_path_buf();
    let number = partition.number.unwrap_or(1);
    let path = crate::executors::partition_device_path(&disk_path, number);

    if partition.resize {
        resize_partition(partition, &disk_path, number, &path, graph)?;
    }

    devices.insert(&partition.id, path);
    Ok(())
}

/// Resizes a preserved partition in place (§4.2 `resize: true`): valid only
/// for `ext2`/`ext3`/`ext4`/`ntfs`, as determined by the `format` entry that
/// targets this partition.
fn resize_partition(
    partition: &curtin_api::config::Partition,
    disk_path: &Path,
    number: u32,
    partition_path: &Path,
    graph: &ActionGraph,
) -> Result<(), CurtinError> {
    let fstype = graph
        .topological_order()?
        .into_iter()
        .find_map(|entry| match entry {
            ConfigEntry::Format(f) if f.device.as_deref() == Some(partition.id.as_str()) => {
                f.fstype.clone()
            }
            _ => None,
        });

    let resizable = matches!(
        fstype,
        Some(FileSystemType::Ext2)
            | Some(FileSystemType::Ext3)
            | Some(FileSystemType::Ext4)
            | Some(FileSystemType::Ntfs)
    );
    if !resizable {
        return Err(CurtinError::new(ExecutionError::UnsupportedResize(
            partition.id.clone(),
        )));
    }

    let action = || -> Result<(), anyhow::Error> {
        let end = match &partition.size {
            Some(SizeSpec::Grow) | None => "100%".to_string(),
            Some(SizeSpec::Bytes(bytes)) => format!("{}B", bytes.bytes()),
        };
        parted::resizepart(disk_path, number, &end)?;

        match fstype {
            Some(FileSystemType::Ntfs) => ntfsresize::run(partition_path)?,
            _ => resize2fs::run(partition_path)?,
        }
        Ok(())
    };
    action().structured(ExecutionError::ActionFailed {
        id: partition.id.clone(),
        kind: "partition-resize",
    })
}

fn verify_format(
    format: &curtin_api::config::Format,
    devices: &mut DeviceMap,
) -> Result<(), CurtinError> {
    let device = format
        .device
        .as_deref()
        .structured(VerificationError::TargetMissing(format.id.clone()))?;
    let block_device = lsblk::get(Path::new(device))
        .structured(VerificationError::TargetMissing(format.id.clone()))?;

    if let Some(expected) = &format.fstype {
        let found = block_device.fstype.clone().unwrap_or_default();
        if found != expected.name() {
            return Err(CurtinError::new(VerificationError::FieldMismatch {
                id: format.id.clone(),
                field: "fstype",
                expected: expected.name().to_string(),
                found,
            }));
        }
    }

    if let Some(expected_uuid) = format.uuid {
        if let Ok(found) = blkid::get_filesystem_uuid(Path::new(device)) {
            if found != expected_uuid {
                return Err(CurtinError::new(VerificationError::FieldMismatch {
                    id: format.id.clone(),
                    field: "uuid",
                    expected: expected_uuid.to_string(),
                    found: found.to_string(),
                }));
            }
        }
    }
    devices.insert(&format.id, PathBuf::from(device));
    Ok(())
}

fn verify_lvm_volgroup(
    vg: &curtin_api::config::LvmVolgroup,
    devices: &mut DeviceMap,
) -> Result<(), CurtinError> {
    let path = PathBuf::from(format!("/dev/{}", vg.name));
    lsblk::get(&path).structured(VerificationError::TargetMissing(vg.id.clone()))?;
    devices.insert(&vg.id, path);
    Ok(())
}

fn verify_lvm_partition(
    lv: &curtin_api::config::LvmPartition,
    devices: &mut DeviceMap,
) -> Result<(), CurtinError> {
    let path = PathBuf::from(format!("/dev/{}/{}", lv.volgroup, lv.name));
    lsblk::get(&path).structured(VerificationError::TargetMissing(lv.id.clone()))?;
    devices.insert(&lv.id, path);
    Ok(())
}

fn verify_dm_crypt(
    crypt: &curtin_api::config::DmCrypt,
    devices: &mut DeviceMap,
) -> Result<(), CurtinError> {
    let path = PathBuf::from(format!("/dev/mapper/{}", crypt.dm_name));
    lsblk::get(&path).structured(VerificationError::TargetMissing(crypt.id.clone()))?;
    devices.insert(&crypt.id, path);
    Ok(())
}

fn verify_raid(
    raid: &curtin_api::config::Raid,
    devices: &mut DeviceMap,
) -> Result<(), CurtinError> {
    let path = PathBuf::from(format!("/dev/{}", raid.name));
    let detail =
        mdadm::detail(&path).structured(VerificationError::TargetMissing(raid.id.clone()))?;

    if let Some(expected_level) = raid.raidlevel {
        if detail.level != expected_level.to_string() {
            return Err(CurtinError::new(VerificationError::FieldMismatch {
                id: raid.id.clone(),
                field: "raidlevel",
                expected: expected_level.to_string(),
                found: detail.level,
            }));
        }
    }

    let expected_members: BTreeSet<PathBuf> = raid
        .devices
        .iter()
        .chain(raid.spare_devices.iter())
        .filter_map(|id| devices.resolve(id).ok().map(Path::to_path_buf))
        .collect();
    let found_members: BTreeSet<PathBuf> = detail.devices.into_iter().collect();
    if !expected_members.is_empty() && expected_members != found_members {
        return Err(CurtinError::new(VerificationError::FieldMismatch {
            id: raid.id.clone(),
            field: "devices",
            expected: format!("{expected_members:?}"),
            found: format!("{found_members:?}"),
        }));
    }

    devices.insert(&raid.id, path);
    Ok(())
}

fn verify_bcache(
    bcache: &curtin_api::config::Bcache,
    devices: &mut DeviceMap,
) -> Result<(), CurtinError> {
    // No osutils module exposes bcache's sysfs binding state, so this only
    // confirms the declared backing/cache devices still resolve; it does
    // not confirm they remain bound to each other.
    devices.resolve(&bcache.backing_device)?;
    devices.resolve(&bcache.cache_device)?;
    let kname = bcache.name.clone().unwrap_or_else(|| "bcache0".to_string());
    devices.insert(&bcache.id, PathBuf::from(format!("/dev/{kname}")));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use curtin_api::config::{Bcache, DmCrypt, LvmPartition, LvmVolgroup, Partition, Raid};
    use curtin_api::error::ErrorKind;

    fn graph_with(entries: Vec<ConfigEntry>) -> ActionGraph {
        ActionGraph::build(entries).unwrap()
    }

    #[test]
    fn verify_partition_rejects_entries_with_neither_uuid_nor_number() {
        let partition = Partition {
            id: "p1".into(),
            device: "d1".into(),
            ..Default::default()
        };
        let graph = graph_with(vec![]);
        let mut devices = DeviceMap::default();

        let err = verify_partition(&partition, &graph, &mut devices).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Verification(_)));
    }

    #[test]
    fn verify_partition_fails_when_its_disk_never_resolved() {
        let partition = Partition {
            id: "p1".into(),
            device: "d1".into(),
            number: Some(1),
            ..Default::default()
        };
        let graph = graph_with(vec![]);
        let mut devices = DeviceMap::default();

        assert!(verify_partition(&partition, &graph, &mut devices).is_err());
    }

    #[test]
    fn resize_partition_rejects_an_unresizable_filesystem() {
        let partition = Partition {
            id: "p1".into(),
            device: "d1".into(),
            number: Some(1),
            resize: true,
            ..Default::default()
        };
        let format = curtin_api::config::Format {
            id: "f1".into(),
            device: Some("p1".into()),
            fstype: Some(FileSystemType::Xfs),
            ..Default::default()
        };
        let graph = graph_with(vec![
            ConfigEntry::Partition(partition.clone()),
            ConfigEntry::Format(format),
        ]);

        let err = resize_partition(
            &partition,
            Path::new("/dev/nonexistent-disk"),
            1,
            Path::new("/dev/nonexistent-disk1"),
            &graph,
        )
        .unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::Execution(ExecutionError::UnsupportedResize(id)) if id == "p1"
        ));
    }

    #[test]
    fn resize_partition_attempts_the_resize_for_an_ext4_filesystem() {
        let partition = Partition {
            id: "p1".into(),
            device: "d1".into(),
            number: Some(1),
            resize: true,
            ..Default::default()
        };
        let format = curtin_api::config::Format {
            id: "f1".into(),
            device: Some("p1".into()),
            fstype: Some(FileSystemType::Ext4),
            ..Default::default()
        };
        let graph = graph_with(vec![
            ConfigEntry::Partition(partition.clone()),
            ConfigEntry::Format(format),
        ]);

        // No such disk exists in the test sandbox, so the underlying
        // `parted`/`resize2fs` invocations fail; this only confirms the
        // fstype gate let the attempt through instead of short-circuiting
        // with `UnsupportedResize`.
        let err = resize_partition(
            &partition,
            Path::new("/dev/nonexistent-disk"),
            1,
            Path::new("/dev/nonexistent-disk1"),
            &graph,
        )
        .unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::Execution(ExecutionError::ActionFailed { kind: "partition-resize", .. })
        ));
    }

    #[test]
    fn verify_lvm_volgroup_fails_when_the_vg_node_is_absent() {
        let vg = LvmVolgroup {
            id: "vg1".into(),
            name: "nonexistent-vg".into(),
            ..Default::default()
        };
        let mut devices = DeviceMap::default();
        assert!(verify_lvm_volgroup(&vg, &mut devices).is_err());
    }

    #[test]
    fn verify_lvm_partition_fails_when_the_lv_node_is_absent() {
        let lv = LvmPartition {
            id: "lv1".into(),
            volgroup: "vg0".into(),
            name: "nonexistent-lv".into(),
            ..Default::default()
        };
        let mut devices = DeviceMap::default();
        assert!(verify_lvm_partition(&lv, &mut devices).is_err());
    }

    #[test]
    fn verify_dm_crypt_fails_when_the_mapper_node_is_absent() {
        let crypt = DmCrypt {
            id: "c1".into(),
            volume: "p1".into(),
            dm_name: "nonexistent-crypt".into(),
            ..Default::default()
        };
        let mut devices = DeviceMap::default();
        assert!(verify_dm_crypt(&crypt, &mut devices).is_err());
    }

    #[test]
    fn verify_raid_fails_when_the_array_is_absent() {
        let raid = Raid {
            id: "r1".into(),
            name: "nonexistent-md0".into(),
            ..Default::default()
        };
        let mut devices = DeviceMap::default();
        assert!(verify_raid(&raid, &mut devices).is_err());
    }

    #[test]
    fn verify_bcache_fails_when_its_backing_device_never_resolved() {
        let bcache = Bcache {
            id: "b1".into(),
            backing_device: "backing".into(),
            cache_device: "cache".into(),
            ..Default::default()
        };
        let mut devices = DeviceMap::default();
        assert!(verify_bcache(&bcache, &mut devices).is_err());
    }

    #[test]
    fn verify_bcache_resolves_with_defaulted_kname_when_unnamed() {
        let bcache = Bcache {
            id: "b1".into(),
            backing_device: "backing".into(),
            cache_device: "cache".into(),
            ..Default::default()
        };
        let mut devices = DeviceMap::default();
        devices.insert("backing", PathBuf::from("/dev/sda1"));
        devices.insert("cache", PathBuf::from("/dev/sdb1"));

        verify_bcache(&bcache, &mut devices).unwrap();
        assert_eq!(
            devices.resolve("b1").unwrap(),
            Path::new("/dev/bcache0")
        );
    }
}
