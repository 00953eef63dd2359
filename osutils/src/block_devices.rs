use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{bail, ensure, Context, Error};

use curtin_api::config::Disk;

use crate::{
    exe::RunAndCheck,
    lsblk::{self, BlockDeviceType},
};

/// A disk config entry resolved to its real path in `/dev` (§3 "Identity of
/// physical disks").
pub struct ResolvedDisk {
    /// Shortcut to the disk id.
    pub id: String,

    /// Reference to the disk configuration.
    pub spec: Disk,

    /// Path to the disk as opened by the executor (`/dev/disk/by-id/...`,
    /// `/dev/mapper/...`, or the literal `path` given).
    pub dev_path: PathBuf,
}

/// Resolves a disk entry's identity to a device node, trying `serial`, `wwn`,
/// `path`, then `multipath` in priority order (§3). A disk resolved by
/// `serial` whose `path` also names a different node only produces a warning,
/// never an error (§8 normative).
pub fn resolve_disk(disk: &Disk) -> Result<PathBuf, Error> {
    if let Some(serial) = &disk.serial {
        let resolved = find_by_id_suffix(serial)
            .with_context(|| format!("Failed to resolve disk '{}' by serial", disk.id))?;
        if let Some(path) = &disk.path {
            if let Ok(path_resolved) = Path::new("/dev/disk/by-path").join(path).canonicalize() {
                let resolved_canon = resolved.canonicalize().unwrap_or_else(|_| resolved.clone());
                if path_resolved != resolved_canon {
                    log::warn!(
                        "Disk '{}': 'path' resolves to a different node than 'serial', using 'serial'",
                        disk.id
                    );
                }
            }
        }
        return Ok(resolved);
    }

    if let Some(wwn) = &disk.wwn {
        return find_by_id_prefix("wwn-", wwn)
            .with_context(|| format!("Failed to resolve disk '{}' by wwn", disk.id));
    }

    if let Some(path) = &disk.path {
        let candidate = Path::new("/dev/disk/by-path").join(path);
        return candidate
            .canonicalize()
            .with_context(|| format!("Failed to resolve disk '{}' by path '{path}'", disk.id));
    }

    if let Some(multipath) = &disk.multipath {
        let candidate = Path::new("/dev/mapper").join(multipath);
        return candidate.canonicalize().with_context(|| {
            format!(
                "Failed to resolve disk '{}' by multipath alias '{multipath}'",
                disk.id
            )
        });
    }

    if let Some(uri) = &disk.iscsi {
        let target = crate::iscsi::IscsiTarget::parse(uri)
            .with_context(|| format!("Failed to resolve disk '{}' by iscsi uri", disk.id))?;
        let by_path_name = format!(
            "ip-{}:{}-iscsi-{}-lun-{}",
            target.host, target.port, target.target_name, target.lun
        );
        let candidate = Path::new("/dev/disk/by-path").join(by_path_name);
        return candidate.canonicalize().with_context(|| {
            format!("Failed to resolve disk '{}' after iscsi login", disk.id)
        });
    }

    bail!(
        "Disk '{}' has no identity field set (serial, wwn, path, multipath, or iscsi)",
        disk.id
    );
}

/// Finds a `/dev/disk/by-id` entry whose name ends with `_<suffix>`, the
/// convention util-linux uses to embed a drive's serial number.
fn find_by_id_suffix(suffix: &str) -> Result<PathBuf, Error> {
    find_by_id(|name| name.ends_with(&format!("_{suffix}")))
}

/// Finds a `/dev/disk/by-id` entry whose name is `<prefix><value>`.
fn find_by_id_prefix(prefix: &str, value: &str) -> Result<PathBuf, Error> {
    let wanted = format!("{prefix}{value}");
    find_by_id(|name| name == wanted)
}

fn find_by_id(matches: impl Fn(&str) -> bool) -> Result<PathBuf, Error> {
    let dir = Path::new("/dev/disk/by-id");
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read '{}'", dir.display()))?
        .flatten()
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(&matches)
                .unwrap_or_default()
        })
        .map(|entry| entry.path())
        .collect();
    candidates.sort();
    let link = candidates
        .into_iter()
        .next()
        .context("No matching entry found in /dev/disk/by-id")?;
    link.canonicalize()
        .with_context(|| format!("Failed to canonicalize '{}'", link.display()))
}

/// Retrieves the symlink for a given block device in '/dev/disk/by-path'.
pub fn block_device_by_path(path: impl AsRef<Path>) -> Result<PathBuf, Error> {
    find_symlink_for_target(path.as_ref(), Path::new("/dev/disk/by-path"))
}

/// Returns the path of the first symlink in directory whose canonical path is target.
pub fn find_symlink_for_target(
    target: impl AsRef<Path>,
    directory: impl AsRef<Path>,
) -> Result<PathBuf, Error> {
    // Ensure that target path is canonicalized
    let target_canonicalized = target.as_ref().canonicalize().context(format!(
        "Failed to canonicalize target path '{}'",
        target.as_ref().display()
    ))?;

    fs::read_dir(directory.as_ref())?
        .flatten()
        .filter(|f| {
            f.file_type()
                .ok()
                .map(|t| t.is_symlink())
                .unwrap_or_default()
        })
        .map(|entry| entry.path())
        .filter(|path| {
            path.canonicalize()
                .map(|p| target_canonicalized == p)
                .unwrap_or_default()
        })
        .min()
        .context(format!(
            "Failed to find symlink for '{}' in directory '{}'",
            target.as_ref().display(),
            directory.as_ref().display()
        ))
}

/// Get the canonicalized path of a disk for a given partition.
pub fn get_disk_for_partition(partition: impl AsRef<Path>) -> Result<PathBuf, Error> {
    let partition_block_device = lsblk::get(partition.as_ref()).with_context(|| {
        format!(
            "Failed to get partition metadata for '{}'",
            partition.as_ref().display(),
        )
    })?;

    ensure!(
        partition_block_device.blkdev_type == BlockDeviceType::Partition,
        "Device '{}' is not a partition",
        partition.as_ref().display()
    );

    partition_block_device.parent_kernel_name.context(format!(
        "Failed to get disk for partition: {:?}, pk_name not found",
        partition.as_ref().display()
    ))
}

/// Check if a device can be stopped. A device can be stopped if it only uses
/// disks that are part of the storage configuration.
///
/// Returns true if the device can be stopped, false if it should not be
/// touched. Returns an error if the device has underlying disks some of which
/// are part of the configuration and some are not.
pub fn can_stop_pre_existing_device(
    used_disks: &HashSet<PathBuf>,
    config_disks: &HashSet<PathBuf>,
) -> Result<bool, Error> {
    let symmetric_diff: HashSet<_> = used_disks
        .symmetric_difference(config_disks)
        .cloned()
        .collect();

    if used_disks.is_disjoint(config_disks) {
        // Device does not have any of its underlying disks mentioned in the
        // configuration, we should not touch it
        Ok(false)
    } else if symmetric_diff.is_empty() || used_disks.is_subset(config_disks) {
        // Device's underlying disks are all part of the configuration, we can
        // unmount and stop the RAID
        Ok(true)
    } else {
        // Device has underlying disks that are not part of the configuration,
        // we cannot touch it, abort
        bail!(
            "A device has underlying disks that are not part of the storage configuration. Used disks: {:?}, configured disks: {:?}",
            used_disks, config_disks
        );
    }
}

/// Force kernel to re-read the partition table of a disk with partx.
///
/// This function has no built in safety checking. The path must be:
///
/// - A valid block device.
/// - If a disk, it must contain a partition table with at least one partition.
pub fn partx_update(disk: impl AsRef<Path>) -> Result<(), Error> {
    Command::new("partx")
        .arg("--update")
        .arg(disk.as_ref())
        .run_and_check()
        .with_context(|| {
            format!(
                "Failed to re-read partition table for disk '{}'",
                disk.as_ref().display()
            )
        })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_can_stop_pre_existing_device() -> Result<(), Error> {
        let raid_disks: HashSet<PathBuf> = ["/dev/sda".into(), "/dev/sdb".into()].into();
        let config_disks: HashSet<PathBuf> = ["/dev/sda".into(), "/dev/sdb".into()].into();
        let config_disks2: HashSet<PathBuf> = ["/dev/sdb".into(), "/dev/sdc".into()].into();
        let config_disks3: HashSet<PathBuf> = ["/dev/sdc".into(), "/dev/sdd".into()].into();
        let config_disks4: HashSet<PathBuf> =
            ["/dev/sda".into(), "/dev/sdb".into(), "/dev/sdc".into()].into();

        // No overlapping disks, should not touch
        let overlap = can_stop_pre_existing_device(&raid_disks, &config_disks3)?;
        assert!(!overlap);

        // Fully overlapping disks, should stop
        let overlap = can_stop_pre_existing_device(&raid_disks, &config_disks)?;
        assert!(overlap);

        // Partially overlapping disks, cannot touch, error.
        let overlap = can_stop_pre_existing_device(&raid_disks, &config_disks2);
        assert!(overlap.is_err());

        // Configured disks are a superset of RAID disks, we can stop
        let overlap = can_stop_pre_existing_device(&raid_disks, &config_disks4)?;
        assert!(overlap);

        Ok(())
    }

    #[test]
    fn test_find_symlink_for_target() {
        let temp_dir = tempfile::tempdir().unwrap();
        let target = temp_dir.path().canonicalize().unwrap();
        let symlink = temp_dir.path().join("symlink");
        std::os::unix::fs::symlink(&target, &symlink).unwrap();
        assert_eq!(
            find_symlink_for_target(&target, temp_dir.path()).unwrap(),
            symlink
        );

        // Pick the first symlink if there are multiple
        let symlink = temp_dir.path().join("asymlink");
        std::os::unix::fs::symlink(&target, &symlink).unwrap();
        assert_eq!(
            find_symlink_for_target(&target, temp_dir.path()).unwrap(),
            symlink
        );
    }

    #[test]
    fn test_find_symlink_for_target_fail_no_symlink() {
        // Return error if no symlink found
        let temp_dir = tempfile::tempdir().unwrap();
        let target = temp_dir.path().canonicalize().unwrap();
        let temp_dir2 = tempfile::tempdir().unwrap();
        assert_eq!(
            find_symlink_for_target(&target, temp_dir2.path())
                .unwrap_err()
                .to_string(),
            format!(
                "Failed to find symlink for '{}' in directory '{}'",
                target.display(),
                temp_dir2.path().display()
            )
        );
    }

    #[test]
    fn test_find_symlink_for_target_fail_bad_target() {
        // Return error if target path is bad
        let target = Path::new("/bad-target-path");
        let temp_dir = tempfile::tempdir().unwrap();
        assert_eq!(
            find_symlink_for_target(target, temp_dir.path())
                .unwrap_err()
                .to_string(),
            format!("Failed to canonicalize target path '{}'", target.display())
        );
    }

    #[test]
    fn test_resolve_disk_requires_an_identity_field() {
        let disk = Disk {
            id: "disk0".into(),
            ..Default::default()
        };
        assert!(resolve_disk(&disk).is_err());
    }
}
