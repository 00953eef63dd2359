use std::collections::{HashMap, HashSet};
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context as _;

use curtin_api::config::{ConfigEntry, EncryptionStyle, PartitionFlag, SizeSpec};
use curtin_api::constants::BIOS_GRUB_PARTITION_SIZE_MIB;
use curtin_api::error::{CurtinError, ExecutionError, ReportError};
use curtin_api::graph::ActionGraph;
use sysdefs::filesystems::FileSystemType;

use osutils::exe::RunAndCheck;
use osutils::filesystems::{MkfsFileSystemType, MountFileSystemType};
use osutils::{bcache, block_devices, dasd, encryption, lvm, mdadm, mkfs, mkswap, mount, parted, sgdisk, udevadm, wipefs, zfs, zpool};

use crate::context::EngineContext;

/// Resolves each config entry id to the device node it materialized to, so
/// later steps (e.g. a `format` action whose `device` names an earlier
/// `partition`) can find the real path (§3 "Action graph").
#[derive(Default)]
pub struct DeviceMap {
    paths: HashMap<String, PathBuf>,
    reconciled_disks: HashSet<String>,
}

impl DeviceMap {
    pub fn insert(&mut self, id: &str, path: PathBuf) {
        self.paths.insert(id.to_string(), path);
    }

    pub fn resolve(&self, id: &str) -> Result<&Path, CurtinError> {
        self.paths
            .get(id)
            .map(PathBuf::as_path)
            .structured(ExecutionError::ActionFailed {
                id: id.to_string(),
                kind: "device-reference",
            })
    }

    fn resolve_anyhow(&self, id: &str) -> Result<PathBuf, anyhow::Error> {
        self.resolve(id)
            .map(Path::to_path_buf)
            .map_err(|e| e.unstructured(format!("resolving device reference '{id}'")))
    }

    /// Returns `true` the first time it's called for a given disk id,
    /// `false` on every later call. Used to run the v2 partition-table
    /// reconciliation (§4.2) exactly once per disk even though several
    /// `partition` actions may target it.
    fn mark_reconciled(&mut self, disk_id: &str) -> bool {
        self.reconciled_disks.insert(disk_id.to_string())
    }
}

/// Materializes a single non-preserved entry (§4.5), recording the device
/// node it produced in `devices`. `version` is the storage config's schema
/// version (§4.2): it only changes behavior for `partition` actions.
pub fn execute(
    entry: &ConfigEntry,
    graph: &ActionGraph,
    ctx: &EngineContext,
    devices: &mut DeviceMap,
    version: u32,
) -> Result<(), CurtinError> {
    log::info!("Executing action '{}' ({})", entry.id(), entry.type_name());
    match entry {
        ConfigEntry::Dasd(dasd_entry) => execute_dasd(dasd_entry, devices),
        ConfigEntry::Disk(disk) => execute_disk(disk, devices),
        ConfigEntry::Partition(partition) => execute_partition(partition, graph, version, devices),
        ConfigEntry::Format(format) => execute_format(format, devices),
        ConfigEntry::Mount(mount_entry) => execute_mount(mount_entry, graph, ctx, devices),
        ConfigEntry::LvmVolgroup(vg) => execute_lvm_volgroup(vg, devices),
        ConfigEntry::LvmPartition(lv) => execute_lvm_partition(lv, devices),
        ConfigEntry::DmCrypt(crypt) => execute_dm_crypt(crypt, devices),
        ConfigEntry::Raid(raid) => execute_raid(raid, devices),
        ConfigEntry::Bcache(bcache_entry) => execute_bcache(bcache_entry, devices),
        ConfigEntry::Zpool(pool) => execute_zpool(pool, devices),
        ConfigEntry::Zfs(dataset) => execute_zfs(dataset, graph, devices),
        ConfigEntry::NvmeController(_) => Ok(()),
        ConfigEntry::Device(device) => {
            devices.insert(&device.id, PathBuf::from(&device.path));
            Ok(())
        }
    }
}

fn execute_dasd(dasd_entry: &curtin_api::config::Dasd, devices: &mut DeviceMap) -> Result<(), CurtinError> {
    let device_path = PathBuf::from(&dasd_entry.device);
    let action = || -> Result<(), anyhow::Error> {
        dasd::format(
            &device_path,
            dasd_entry.disk_layout,
            dasd_entry.blocksize,
            dasd_entry.mode,
        )?;
        dasd::fdasd_auto(&device_path)?;
        udevadm::settle()?;
        Ok(())
    };
    action().structured(ExecutionError::ActionFailed {
        id: dasd_entry.id.clone(),
        kind: "dasd",
    })?;
    devices.insert(&dasd_entry.id, device_path);
    Ok(())
}

fn execute_disk(disk: &curtin_api::config::Disk, devices: &mut DeviceMap) -> Result<(), CurtinError> {
    let action = || -> Result<PathBuf, anyhow::Error> {
        if let Some(uri) = &disk.iscsi {
            let target = osutils::iscsi::IscsiTarget::parse(uri)?;
            osutils::iscsi::connect(&target)?;
        }
        let path = block_devices::resolve_disk(disk)?;
        if let Some(wipe) = disk.wipe {
            wipe_disk(&path, wipe)?;
        }
        if let Some(ptable) = disk.ptable {
            parted::mklabel(&path, ptable)?;
        }
        udevadm::settle()?;
        Ok(path)
    };
    let path = action().structured(ExecutionError::ActionFailed {
        id: disk.id.clone(),
        kind: "disk",
    })?;
    devices.insert(&disk.id, path);
    Ok(())
}

fn wipe_disk(path: &Path, wipe: curtin_api::config::WipeMode) -> Result<(), anyhow::Error> {
    use curtin_api::config::WipeMode;
    match wipe {
        WipeMode::Superblock => sgdisk::zap_all(path).or_else(|_| wipefs::all(path)),
        WipeMode::SuperblockRecursive | WipeMode::Zero | WipeMode::Random => wipefs::all(path),
        WipeMode::Pvremove => lvm::pvremove(path),
    }
}

fn parted_flag_name(flag: PartitionFlag) -> &'static str {
    match flag {
        PartitionFlag::Logical => "logical",
        PartitionFlag::Extended => "extended",
        PartitionFlag::Boot => "boot",
        PartitionFlag::BiosGrub => "bios_grub",
        PartitionFlag::Swap => "swap",
        PartitionFlag::Lvm => "lvm",
        PartitionFlag::Raid => "raid",
        PartitionFlag::Home => "home",
        PartitionFlag::Prep => "prep",
        PartitionFlag::Msftres => "msftres",
    }
}

fn execute_partition(
    partition: &curtin_api::config::Partition,
    graph: &ActionGraph,
    version: u32,
    devices: &mut DeviceMap,
) -> Result<(), CurtinError> {
    let disk_path = devices.resolve(&partition.device)?.to_path_buf();
    let number = partition.number.unwrap_or(1);

    if version == 2 && devices.mark_reconciled(&partition.device) {
        crate::partition_plan::reconcile(&partition.device, &disk_path, graph).structured(
            ExecutionError::ActionFailed {
                id: partition.device.clone(),
                kind: "partition-table",
            },
        )?;
    }

    let action = || -> Result<PathBuf, anyhow::Error> {
        let start = partition
            .offset
            .map(|o| format!("{}B", o.bytes()))
            .unwrap_or_else(|| "1MiB".to_string());

        let end = if partition.flag == Some(PartitionFlag::BiosGrub) {
            format!("{}MiB", BIOS_GRUB_PARTITION_SIZE_MIB + 1)
        } else {
            match &partition.size {
                Some(SizeSpec::Grow) | None => "100%".to_string(),
                Some(SizeSpec::Bytes(bytes)) => format!("{}B", bytes.bytes()),
            }
        };

        parted::mkpart(&disk_path, "ext2", &start, &end)?;

        if let Some(flag) = partition.flag {
            parted::set_flag(&disk_path, number, parted_flag_name(flag), true)?;
        }

        udevadm::settle()?;
        Ok(partition_device_path(&disk_path, number))
    };

    let path = action().structured(ExecutionError::ActionFailed {
        id: partition.id.clone(),
        kind: "partition",
    })?;
    devices.insert(&partition.id, path);
    Ok(())
}

pub(crate) fn partition_device_path(disk: &Path, number: u32) -> PathBuf {
    let disk_str = disk.to_string_lossy();
    if disk_str.chars().last().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        PathBuf::from(format!("{disk_str}p{number}"))
    } else {
        PathBuf::from(format!("{disk_str}{number}"))
    }
}

fn execute_format(format: &curtin_api::config::Format, devices: &mut DeviceMap) -> Result<(), CurtinError> {
    let device_id = format
        .device
        .as_deref()
        .structured(ExecutionError::ActionFailed {
            id: format.id.clone(),
            kind: "format",
        })?;
    let device_path = devices.resolve(device_id)?.to_path_buf();
    let fstype = format
        .fstype
        .clone()
        .structured(ExecutionError::ActionFailed {
            id: format.id.clone(),
            kind: "format",
        })?;

    let action = || -> Result<(), anyhow::Error> {
        if fstype == FileSystemType::Swap {
            mkswap::run(&device_path)?;
        } else {
            let mkfs_type = MkfsFileSystemType::from_api_type(fstype.clone())?;
            mkfs::run(&device_path, mkfs_type)?;
        }
        udevadm::settle()?;
        Ok(())
    };
    action().structured(ExecutionError::ActionFailed {
        id: format.id.clone(),
        kind: "format",
    })?;
    devices.insert(&format.id, device_path);
    Ok(())
}

fn execute_mount(
    mount_entry: &curtin_api::config::Mount,
    graph: &ActionGraph,
    ctx: &EngineContext,
    devices: &mut DeviceMap,
) -> Result<(), CurtinError> {
    let device_id = mount_entry.device.as_deref();
    let device_path = match device_id {
        Some(id) => Some(devices.resolve(id)?.to_path_buf()),
        None => None,
    };

    let referenced_fstype = device_id.and_then(|id| graph.get(id)).and_then(|entry| match entry {
        ConfigEntry::Format(f) => f.fstype.clone(),
        _ => None,
    });
    let is_swap = referenced_fstype == Some(FileSystemType::Swap);

    let action = || -> Result<(), anyhow::Error> {
        if is_swap {
            let device_path = device_path
                .clone()
                .context("swap mount action has no resolved device")?;
            Command::new("swapon").arg(&device_path).run_and_check()?;
            return Ok(());
        }

        let relative_path = mount_entry
            .path
            .as_deref()
            .context("mount action missing target path")?
            .trim_start_matches('/');
        let target = ctx.target_mount_point.join(relative_path);
        mount::ensure_mount_directory(&target)?;

        if osutils::mountpoint::check_is_mountpoint(&target)? {
            return Ok(());
        }

        let fstype = referenced_fstype
            .map(MountFileSystemType::from_api_type)
            .transpose()?
            .unwrap_or(MountFileSystemType::Auto);

        let device_path = device_path.context("mount action has no resolved device")?;
        mount::mount(&device_path, &target, fstype, &mount_entry.options)?;
        Ok(())
    };

    action().structured(ExecutionError::ActionFailed {
        id: mount_entry.id.clone(),
        kind: "mount",
    })
}

fn execute_lvm_volgroup(
    vg: &curtin_api::config::LvmVolgroup,
    devices: &mut DeviceMap,
) -> Result<(), CurtinError> {
    let action = || -> Result<(), anyhow::Error> {
        let device_paths: Vec<PathBuf> = vg
            .devices
            .iter()
            .map(|id| devices.resolve_anyhow(id))
            .collect::<Result<_, _>>()?;
        for path in &device_paths {
            lvm::pvcreate(path)?;
        }
        lvm::vgcreate(&vg.name, &device_paths)?;
        Ok(())
    };
    action().structured(ExecutionError::ActionFailed {
        id: vg.id.clone(),
        kind: "lvm_volgroup",
    })?;
    devices.insert(&vg.id, PathBuf::from(format!("/dev/{}", vg.name)));
    Ok(())
}

fn execute_lvm_partition(
    lv: &curtin_api::config::LvmPartition,
    devices: &mut DeviceMap,
) -> Result<(), CurtinError> {
    let vg_path = devices.resolve(&lv.volgroup)?.to_path_buf();
    let vg_name = vg_path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .structured(ExecutionError::ActionFailed {
            id: lv.id.clone(),
            kind: "lvm_partition",
        })?;

    let action = || -> Result<(), anyhow::Error> {
        let size = match &lv.size {
            Some(SizeSpec::Bytes(bytes)) => Some(*bytes),
            _ => None,
        };
        lvm::lvcreate(&vg_name, &lv.name, size)?;
        Ok(())
    };
    action().structured(ExecutionError::ActionFailed {
        id: lv.id.clone(),
        kind: "lvm_partition",
    })?;
    devices.insert(&lv.id, PathBuf::from(format!("/dev/{vg_name}/{}", lv.name)));
    Ok(())
}

fn execute_dm_crypt(crypt: &curtin_api::config::DmCrypt, devices: &mut DeviceMap) -> Result<(), CurtinError> {
    let volume_path = devices.resolve(&crypt.volume)?.to_path_buf();

    let action = || -> Result<(), anyhow::Error> {
        let key_file = if let Some(keyfile) = &crypt.keyfile {
            PathBuf::from(keyfile)
        } else if let Some(key) = &crypt.key {
            let mut temp = tempfile::NamedTempFile::new()?;
            temp.write_all(key.as_bytes())?;
            let (_, path) = temp.keep()?;
            path
        } else {
            anyhow::bail!("dm_crypt entry has neither 'key' nor 'keyfile'");
        };

        encryption::luks_format(&key_file, &volume_path)?;
        encryption::cryptsetup_open(&key_file, &volume_path, &crypt.dm_name)?;
        Ok(())
    };
    action().structured(ExecutionError::ActionFailed {
        id: crypt.id.clone(),
        kind: "dm_crypt",
    })?;
    devices.insert(&crypt.id, PathBuf::from(format!("/dev/mapper/{}", crypt.dm_name)));
    Ok(())
}

fn execute_raid(raid: &curtin_api::config::Raid, devices: &mut DeviceMap) -> Result<(), CurtinError> {
    let device_paths: Vec<PathBuf> = raid
        .devices
        .iter()
        .chain(raid.spare_devices.iter())
        .map(|id| devices.resolve(id).map(Path::to_path_buf))
        .collect::<Result<_, CurtinError>>()?;

    let level = raid
        .raidlevel
        .structured(ExecutionError::ActionFailed {
            id: raid.id.clone(),
            kind: "raid",
        })?;
    let raid_path = PathBuf::from(format!("/dev/md/{}", raid.name));

    let action = || -> Result<(), anyhow::Error> {
        mdadm::create(&raid_path, level, device_paths)?;
        udevadm::settle()?;
        if let Some(ptable) = raid.ptable {
            parted::mklabel(&raid_path, ptable)?;
        }
        Ok(())
    };
    action().structured(ExecutionError::ActionFailed {
        id: raid.id.clone(),
        kind: "raid",
    })?;
    devices.insert(&raid.id, raid_path);
    Ok(())
}

fn execute_bcache(
    bcache_entry: &curtin_api::config::Bcache,
    devices: &mut DeviceMap,
) -> Result<(), CurtinError> {
    let backing_path = devices.resolve(&bcache_entry.backing_device)?.to_path_buf();
    let cache_path = devices.resolve(&bcache_entry.cache_device)?.to_path_buf();

    let action = || -> Result<(), anyhow::Error> {
        bcache::make_bcache(&backing_path, &cache_path)?;
        udevadm::settle()?;
        Ok(())
    };
    action().structured(ExecutionError::ActionFailed {
        id: bcache_entry.id.clone(),
        kind: "bcache",
    })?;

    let kname = bcache_entry.name.clone().unwrap_or_else(|| "bcache0".to_string());
    if let Some(mode) = bcache_entry.cache_mode {
        bcache::set_cache_mode(&kname, mode).structured(ExecutionError::ActionFailed {
            id: bcache_entry.id.clone(),
            kind: "bcache",
        })?;
    }
    devices.insert(&bcache_entry.id, PathBuf::from(format!("/dev/{kname}")));
    Ok(())
}

fn execute_zpool(pool: &curtin_api::config::Zpool, devices: &mut DeviceMap) -> Result<(), CurtinError> {
    let vdev_paths: Vec<PathBuf> = pool
        .vdevs
        .iter()
        .map(|id| devices.resolve(id).map(Path::to_path_buf))
        .collect::<Result<_, CurtinError>>()?;

    let mut overrides = pool.options.clone();
    if let Some(ashift) = pool.ashift {
        overrides.insert("ashift".to_string(), ashift.to_string());
    }

    let action = || -> Result<(), anyhow::Error> {
        if pool.encryption_style == Some(EncryptionStyle::LuksKeystore) {
            let keystore_device = provision_luks_keystore(&pool.id)?;
            overrides.insert("encryption".to_string(), "aes-256-gcm".to_string());
            overrides.insert("keyformat".to_string(), "raw".to_string());
            overrides.insert(
                "keylocation".to_string(),
                format!("file://{}", keystore_device.display()),
            );
        }
        zpool::create(&pool.pool, &vdev_paths, &overrides)?;
        Ok(())
    };
    action().structured(ExecutionError::ActionFailed {
        id: pool.id.clone(),
        kind: "zpool",
    })?;
    devices.insert(&pool.id, PathBuf::from(format!("/dev/zvol/{}", pool.pool)));
    Ok(())
}

/// Builds a small LUKS-backed key dataset and returns the opened mapper
/// device whose decrypted contents serve as the zpool's raw encryption key
/// (`encryption_style: luks_keystore`, §4.5). The passphrase that unlocks
/// the keystore itself is drawn from `/dev/urandom` and kept only in a
/// transient keyfile, the same way `dm_crypt`'s generated key is handled.
fn provision_luks_keystore(pool_id: &str) -> Result<PathBuf, anyhow::Error> {
    let keystore_path = PathBuf::from(format!("/run/curtin-zpool-keystore-{pool_id}.img"));
    {
        let file = std::fs::File::create(&keystore_path).with_context(|| {
            format!(
                "Failed to create zpool keystore backing file '{}'",
                keystore_path.display()
            )
        })?;
        file.set_len(1024 * 1024)
            .context("Failed to size zpool keystore backing file")?;
    }

    let mut unlock_passphrase = vec![0u8; 32];
    std::fs::File::open("/dev/urandom")
        .context("Failed to open /dev/urandom for zpool keystore passphrase")?
        .read_exact(&mut unlock_passphrase)
        .context("Failed to read zpool keystore passphrase")?;

    let mut passphrase_file = tempfile::NamedTempFile::new()?;
    passphrase_file.write_all(&unlock_passphrase)?;
    let (_, passphrase_path) = passphrase_file.keep()?;

    encryption::luks_format(&passphrase_path, &keystore_path)?;

    let dm_name = format!("curtin-zpool-keystore-{pool_id}");
    encryption::cryptsetup_open(&passphrase_path, &keystore_path, &dm_name)?;

    Ok(PathBuf::from(format!("/dev/mapper/{dm_name}")))
}

fn execute_zfs(
    dataset: &curtin_api::config::Zfs,
    graph: &ActionGraph,
    devices: &mut DeviceMap,
) -> Result<(), CurtinError> {
    // `dataset.pool` names the `zpool` entry's id; the real pool name lives
    // on that entry's own `pool` field.
    let pool_name = graph
        .get(&dataset.pool)
        .and_then(|entry| match entry {
            ConfigEntry::Zpool(p) => Some(p.pool.clone()),
            _ => None,
        })
        .structured(ExecutionError::ActionFailed {
            id: dataset.id.clone(),
            kind: "zfs",
        })?;

    let action = || -> Result<(), anyhow::Error> {
        zfs::create(&pool_name, &dataset.dataset, &dataset.properties)?;
        Ok(())
    };
    action().structured(ExecutionError::ActionFailed {
        id: dataset.id.clone(),
        kind: "zfs",
    })?;
    devices.insert(
        &dataset.id,
        PathBuf::from(format!("/{pool_name}/{}", dataset.dataset)),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_map_resolve_fails_for_an_unknown_id() {
        let devices = DeviceMap::default();
        assert!(devices.resolve("missing").is_err());
    }

    #[test]
    fn device_map_resolve_returns_the_inserted_path() {
        let mut devices = DeviceMap::default();
        devices.insert("p1", PathBuf::from("/dev/sda1"));
        assert_eq!(devices.resolve("p1").unwrap(), Path::new("/dev/sda1"));
    }

    #[test]
    fn device_map_resolve_anyhow_wraps_the_missing_id_in_context() {
        let devices = DeviceMap::default();
        let err = devices.resolve_anyhow("missing").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn partition_device_path_inserts_p_before_the_number_on_nvme_style_disks() {
        let path = partition_device_path(Path::new("/dev/nvme0n1"), 2);
        assert_eq!(path, Path::new("/dev/nvme0n1p2"));
    }

    #[test]
    fn partition_device_path_appends_the_number_directly_on_sd_style_disks() {
        let path = partition_device_path(Path::new("/dev/sda"), 2);
        assert_eq!(path, Path::new("/dev/sda2"));
    }

    #[test]
    fn parted_flag_name_maps_bios_grub_to_parteds_underscored_form() {
        assert_eq!(parted_flag_name(PartitionFlag::BiosGrub), "bios_grub");
    }

    #[test]
    fn parted_flag_name_maps_every_other_flag_to_its_lowercase_form() {
        assert_eq!(parted_flag_name(PartitionFlag::Boot), "boot");
        assert_eq!(parted_flag_name(PartitionFlag::Lvm), "lvm");
        assert_eq!(parted_flag_name(PartitionFlag::Msftres), "msftres");
    }
}
