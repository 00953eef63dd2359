use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::Context as _;
use log::{info, warn};

use curtin_api::constants::{HOLDER_QUIESCE_BACKOFF_SECS, HOLDER_QUIESCE_RETRIES};
use curtin_api::error::{CurtinError, HoldersError, ReportError};
use osutils::lsblk::{self, BlockDevice, BlockDeviceType};
use osutils::mount as osmount;
use osutils::{dmsetup, lvm, mdadm, multipath, udevadm, wipefs};

/// Relative dismantle priority among holders at the same tree depth (§4.3
/// "Planning"): mounts first, then cache layers, down to the bare disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HolderKind {
    Mount,
    Bcache,
    Raid,
    LvmLv,
    LvmVg,
    LvmPv,
    Crypt,
    Mpath,
    Partition,
    Disk,
    Other,
}

impl HolderKind {
    fn from_block_device(device: &BlockDevice) -> Self {
        match device.blkdev_type {
            BlockDeviceType::Md => HolderKind::Raid,
            BlockDeviceType::Lvm => HolderKind::LvmLv,
            BlockDeviceType::Crypt => HolderKind::Crypt,
            BlockDeviceType::Mpath | BlockDeviceType::Dm => HolderKind::Mpath,
            BlockDeviceType::Partition => HolderKind::Partition,
            BlockDeviceType::Disk => HolderKind::Disk,
            _ => HolderKind::Other,
        }
    }

    fn priority(self) -> u8 {
        match self {
            HolderKind::Mount => 0,
            HolderKind::Bcache => 1,
            HolderKind::Raid => 2,
            HolderKind::LvmLv => 3,
            HolderKind::LvmVg => 4,
            HolderKind::LvmPv => 5,
            HolderKind::Crypt => 6,
            HolderKind::Mpath => 7,
            HolderKind::Partition => 8,
            HolderKind::Disk => 9,
            HolderKind::Other => 10,
        }
    }
}

/// One holder discovered above a target device (§4.3 "Discovered"). `parent`
/// is the immediate device beneath this holder in the walked tree (the
/// device that becomes rediscoverable if this holder's metadata isn't
/// erased during teardown).
#[derive(Debug, Clone)]
pub struct Holder {
    pub name: String,
    pub kind: HolderKind,
    pub level: u32,
    pub parent: String,
}

/// Walks the block-device tree rooted at `target` and returns every holder
/// found, ordered for teardown: deepest first, then by [`HolderKind`]
/// priority, then by name, so repeated runs against the same topology
/// produce the identical plan.
pub fn discover(target: &Path) -> Result<Vec<Holder>, anyhow::Error> {
    let root = lsblk::get(target)
        .with_context(|| format!("Failed to probe '{}'", target.display()))?;

    let mut holders = Vec::new();
    collect(&root, 0, &root.name, &mut holders);
    holders.sort_by(|a, b| {
        b.level
            .cmp(&a.level)
            .then(a.kind.priority().cmp(&b.kind.priority()))
            .then(a.name.cmp(&b.name))
    });
    Ok(holders)
}

fn collect(device: &BlockDevice, level: u32, parent: &str, out: &mut Vec<Holder>) {
    if level > 0 {
        out.push(Holder {
            name: device.name.clone(),
            kind: HolderKind::from_block_device(device),
            level,
            parent: parent.to_string(),
        });
    }
    for mountpoint in &device.mountpoints {
        out.push(Holder {
            name: mountpoint.display().to_string(),
            kind: HolderKind::Mount,
            level: level + 1,
            parent: device.name.clone(),
        });
    }
    for child in &device.children {
        collect(child, level + 1, &device.name, out);
    }
}

/// Tears down every holder above `target`: first quiesce (stop/deactivate,
/// retrying each step up to [`HOLDER_QUIESCE_RETRIES`] times with
/// [`HOLDER_QUIESCE_BACKOFF_SECS`] backoff), then erase the metadata that
/// would make the quiesced holder rediscoverable (§4.3 "Discovered →
/// Quiesced → TornDown").
pub fn clear(target: &Path) -> Result<(), CurtinError> {
    let holders =
        discover(target).structured(HoldersError::TeardownFailed(target.display().to_string()))?;

    for holder in &holders {
        let mut last_err = None;
        for attempt in 0..HOLDER_QUIESCE_RETRIES {
            match quiesce_one(holder) {
                Ok(()) => {
                    last_err = None;
                    break;
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{} to tear down '{}' failed: {e:#}",
                        attempt + 1,
                        HOLDER_QUIESCE_RETRIES,
                        holder.name
                    );
                    last_err = Some(e);
                    thread::sleep(Duration::from_secs(HOLDER_QUIESCE_BACKOFF_SECS));
                }
            }
        }
        if let Some(e) = last_err {
            Err::<(), anyhow::Error>(e)
                .structured(HoldersError::QuiesceRetriesExhausted(holder.name.clone()))?;
        }
    }

    for holder in &holders {
        tear_down_one(holder)
            .structured(HoldersError::TeardownFailed(holder.name.clone()))?;
    }

    udevadm::settle().structured(HoldersError::TeardownFailed(target.display().to_string()))?;
    info!("All holders cleared above '{}'", target.display());
    Ok(())
}

/// Discovered → Quiesced (§4.3): stop or deactivate a holder without yet
/// erasing any on-disk signature.
fn quiesce_one(holder: &Holder) -> Result<(), anyhow::Error> {
    let path = PathBuf::from(&holder.name);
    match holder.kind {
        HolderKind::Mount => osmount::umount(&path, true),
        HolderKind::Raid => mdadm::stop(&holder.name),
        HolderKind::LvmLv | HolderKind::LvmVg | HolderKind::LvmPv => lvm::pvscan_cache(),
        HolderKind::Crypt => dmsetup::remove(&holder.name),
        HolderKind::Mpath => multipath::flush(&holder.name),
        HolderKind::Bcache | HolderKind::Partition | HolderKind::Disk | HolderKind::Other => {
            Ok(())
        }
    }
}

/// Quiesced → TornDown (§4.3): erase the metadata on `holder.parent` that
/// would otherwise make it rediscoverable as the device type `holder.kind`
/// once the holder itself is gone.
fn tear_down_one(holder: &Holder) -> Result<(), anyhow::Error> {
    let parent = PathBuf::from(&holder.parent);
    match holder.kind {
        HolderKind::Raid => mdadm::zero_superblock(&parent),
        HolderKind::LvmPv => lvm::pvremove(&parent),
        HolderKind::Crypt | HolderKind::Bcache => wipefs::all(&parent),
        HolderKind::Mount
        | HolderKind::LvmLv
        | HolderKind::LvmVg
        | HolderKind::Mpath
        | HolderKind::Partition
        | HolderKind::Disk
        | HolderKind::Other => Ok(()),
    }
}

/// Returns `Ok(())` iff `target` has no remaining holders (`assert-clear`,
/// §6).
pub fn assert_clear(target: &Path) -> Result<(), CurtinError> {
    let holders = discover(target).structured(HoldersError::NotClear(target.display().to_string()))?;
    if holders.is_empty() {
        Ok(())
    } else {
        Err(CurtinError::new(HoldersError::NotClear(
            target.display().to_string(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, blkdev_type: BlockDeviceType) -> BlockDevice {
        BlockDevice {
            name: name.into(),
            blkdev_type,
            ..Default::default()
        }
    }

    #[test]
    fn priority_orders_mounts_before_deeper_layers() {
        assert!(HolderKind::Mount.priority() < HolderKind::LvmLv.priority());
        assert!(HolderKind::LvmLv.priority() < HolderKind::Disk.priority());
        assert!(HolderKind::Disk.priority() < HolderKind::Other.priority());
    }

    #[test]
    fn collect_walks_children_and_mountpoints() {
        let mut lv = device("lv0", BlockDeviceType::Lvm);
        lv.mountpoints.push(PathBuf::from("/data"));

        let mut vg_disk = device("sda1", BlockDeviceType::Partition);
        vg_disk.children.push(lv);

        let mut root = device("sda", BlockDeviceType::Disk);
        root.children.push(vg_disk);

        let mut holders = Vec::new();
        collect(&root, 0, &root.name, &mut holders);

        let names: Vec<&str> = holders.iter().map(|h| h.name.as_str()).collect();
        assert!(names.contains(&"sda1"));
        assert!(names.contains(&"lv0"));
        assert!(names.contains(&"/data"));
        // the root device itself (level 0) is never listed as a holder
        assert!(!names.contains(&"sda"));
    }

    #[test]
    fn discover_sorts_deepest_holders_first() {
        let mut lv = device("lv0", BlockDeviceType::Lvm);
        lv.mountpoints.push(PathBuf::from("/data"));

        let mut part = device("sda1", BlockDeviceType::Partition);
        part.children.push(lv);

        let mut holders = Vec::new();
        collect(&part, 0, &part.name, &mut holders);
        holders.sort_by(|a, b| {
            b.level
                .cmp(&a.level)
                .then(a.kind.priority().cmp(&b.kind.priority()))
                .then(a.name.cmp(&b.name))
        });

        assert_eq!(holders[0].name, "/data");
        assert_eq!(holders.last().unwrap().name, "lv0");
    }
}
