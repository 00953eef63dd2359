use serde::{Deserialize, Serialize};
use sysdefs::filesystems::FileSystemType;
use uuid::Uuid;

use super::partition_type::{PartitionFlag, PartitionType};
use super::raid_level::RaidLevel;
use super::size_spec::SizeSpec;
use crate::primitives::ByteCount;

/// Disk partition table kind (§3 invariant 4, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionTableType {
    Msdos,
    Gpt,
    Vtoc,
}

/// `wipe` policy applied to a disk before a new table is created, or to a
/// partition/device during holder teardown (§4.3, §4.5, §8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WipeMode {
    Superblock,
    SuperblockRecursive,
    Pvremove,
    Zero,
    Random,
}

/// `cache_mode` for a `bcache` action (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    Writethrough,
    Writeback,
    Writearound,
    None,
}

/// `encryption_style` for a `zpool` action (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncryptionStyle {
    LuksKeystore,
}

/// `transport` for an `nvme_controller` action (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NvmeTransport {
    Pcie,
    Tcp,
}

/// `disk_layout` for a `dasd` action (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DasdDiskLayout {
    Cdl,
    Ldl,
}

/// `mode` for a `dasd` action (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DasdFormatMode {
    Quick,
    Full,
    Expand,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Disk {
    pub id: String,
    pub serial: Option<String>,
    pub wwn: Option<String>,
    pub path: Option<String>,
    pub multipath: Option<String>,
    pub iscsi: Option<String>,
    pub nvme_controller: Option<String>,
    pub ptable: Option<PartitionTableType>,
    pub wipe: Option<WipeMode>,
    pub preserve: bool,
    pub grub_device: bool,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Partition {
    pub id: String,
    pub device: String,
    pub size: Option<SizeSpec>,
    pub offset: Option<ByteCount>,
    pub flag: Option<PartitionFlag>,
    pub partition_type: Option<PartitionType>,
    pub number: Option<u32>,
    pub preserve: bool,
    pub resize: bool,
    pub uuid: Option<Uuid>,
    pub partition_name: Option<String>,
    pub attrs: Vec<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Format {
    pub id: String,
    pub device: Option<String>,
    pub fstype: Option<FileSystemType>,
    pub uuid: Option<Uuid>,
    pub label: Option<String>,
    pub extra_options: Vec<String>,
    pub preserve: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Mount {
    pub id: String,
    pub device: Option<String>,
    pub path: Option<String>,
    pub spec: Option<String>,
    pub options: Vec<String>,
    pub freq: Option<u32>,
    pub passno: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct LvmVolgroup {
    pub id: String,
    pub name: String,
    pub devices: Vec<String>,
    pub preserve: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct LvmPartition {
    pub id: String,
    pub volgroup: String,
    pub name: String,
    pub size: Option<SizeSpec>,
    pub preserve: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct DmCrypt {
    pub id: String,
    pub volume: String,
    pub dm_name: String,
    pub key: Option<String>,
    pub keyfile: Option<String>,
    pub options: Vec<String>,
    pub preserve: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Raid {
    pub id: String,
    pub name: String,
    pub raidlevel: Option<RaidLevel>,
    pub devices: Vec<String>,
    pub spare_devices: Vec<String>,
    pub metadata: Option<String>,
    pub ptable: Option<PartitionTableType>,
    pub preserve: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Bcache {
    pub id: String,
    pub name: Option<String>,
    pub backing_device: String,
    pub cache_device: String,
    pub cache_mode: Option<CacheMode>,
    pub preserve: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Zpool {
    pub id: String,
    pub pool: String,
    pub vdevs: Vec<String>,
    pub ashift: Option<u8>,
    pub options: std::collections::BTreeMap<String, String>,
    pub encryption_style: Option<EncryptionStyle>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Zfs {
    pub id: String,
    pub pool: String,
    pub dataset: String,
    pub properties: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct NvmeController {
    pub id: String,
    pub transport: Option<NvmeTransport>,
    pub tcp_addr: Option<String>,
    pub tcp_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Device {
    pub id: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Dasd {
    pub id: String,
    pub device: String,
    pub disk_layout: Option<DasdDiskLayout>,
    pub blocksize: Option<u32>,
    pub label: Option<String>,
    pub mode: Option<DasdFormatMode>,
}

/// One entry of the `storage.config` sequence (§3). Internally tagged on
/// `type`, matching the YAML shape `{ id: ..., type: ..., ... }` exactly;
/// unknown fields inside a recognized type are rejected by the member
/// structs' `deny_unknown_fields`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfigEntry {
    Dasd(Dasd),
    Disk(Disk),
    Partition(Partition),
    Format(Format),
    Mount(Mount),
    LvmVolgroup(LvmVolgroup),
    LvmPartition(LvmPartition),
    DmCrypt(DmCrypt),
    Raid(Raid),
    Bcache(Bcache),
    Zpool(Zpool),
    Zfs(Zfs),
    NvmeController(NvmeController),
    Device(Device),
}

impl ConfigEntry {
    pub fn id(&self) -> &str {
        match self {
            ConfigEntry::Dasd(e) => &e.id,
            ConfigEntry::Disk(e) => &e.id,
            ConfigEntry::Partition(e) => &e.id,
            ConfigEntry::Format(e) => &e.id,
            ConfigEntry::Mount(e) => &e.id,
            ConfigEntry::LvmVolgroup(e) => &e.id,
            ConfigEntry::LvmPartition(e) => &e.id,
            ConfigEntry::DmCrypt(e) => &e.id,
            ConfigEntry::Raid(e) => &e.id,
            ConfigEntry::Bcache(e) => &e.id,
            ConfigEntry::Zpool(e) => &e.id,
            ConfigEntry::Zfs(e) => &e.id,
            ConfigEntry::NvmeController(e) => &e.id,
            ConfigEntry::Device(e) => &e.id,
        }
    }

    /// `type` discriminant as it appears in the config and in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigEntry::Dasd(_) => "dasd",
            ConfigEntry::Disk(_) => "disk",
            ConfigEntry::Partition(_) => "partition",
            ConfigEntry::Format(_) => "format",
            ConfigEntry::Mount(_) => "mount",
            ConfigEntry::LvmVolgroup(_) => "lvm_volgroup",
            ConfigEntry::LvmPartition(_) => "lvm_partition",
            ConfigEntry::DmCrypt(_) => "dm_crypt",
            ConfigEntry::Raid(_) => "raid",
            ConfigEntry::Bcache(_) => "bcache",
            ConfigEntry::Zpool(_) => "zpool",
            ConfigEntry::Zfs(_) => "zfs",
            ConfigEntry::NvmeController(_) => "nvme_controller",
            ConfigEntry::Device(_) => "device",
        }
    }

    pub fn preserve(&self) -> bool {
        match self {
            ConfigEntry::Disk(e) => e.preserve,
            ConfigEntry::Partition(e) => e.preserve,
            ConfigEntry::Format(e) => e.preserve,
            ConfigEntry::LvmVolgroup(e) => e.preserve,
            ConfigEntry::LvmPartition(e) => e.preserve,
            ConfigEntry::Raid(e) => e.preserve,
            ConfigEntry::Bcache(e) => e.preserve,
            ConfigEntry::DmCrypt(e) => e.preserve,
            ConfigEntry::Dasd(_)
            | ConfigEntry::Mount(_)
            | ConfigEntry::Zpool(_)
            | ConfigEntry::Zfs(_)
            | ConfigEntry::NvmeController(_)
            | ConfigEntry::Device(_) => false,
        }
    }

    /// IDs of other entries this one references by field, used to build the
    /// action graph's edges (§3 "Action graph").
    pub fn references(&self) -> Vec<&str> {
        match self {
            ConfigEntry::Dasd(e) => vec![e.device.as_str()],
            ConfigEntry::Disk(e) => e.nvme_controller.as_deref().into_iter().collect(),
            ConfigEntry::Partition(e) => vec![e.device.as_str()],
            ConfigEntry::Format(e) => e.device.as_deref().into_iter().collect(),
            ConfigEntry::Mount(e) => e.device.as_deref().into_iter().collect(),
            ConfigEntry::LvmVolgroup(e) => e.devices.iter().map(String::as_str).collect(),
            ConfigEntry::LvmPartition(e) => vec![e.volgroup.as_str()],
            ConfigEntry::DmCrypt(e) => vec![e.volume.as_str()],
            ConfigEntry::Raid(e) => e
                .devices
                .iter()
                .chain(e.spare_devices.iter())
                .map(String::as_str)
                .collect(),
            ConfigEntry::Bcache(e) => vec![e.backing_device.as_str(), e.cache_device.as_str()],
            ConfigEntry::Zpool(e) => e.vdevs.iter().map(String::as_str).collect(),
            ConfigEntry::Zfs(e) => vec![e.pool.as_str()],
            ConfigEntry::NvmeController(_) | ConfigEntry::Device(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_disk() {
        let yaml = "
id: disk0
type: disk
serial: QM00002
ptable: gpt
";
        let entry: ConfigEntry = serde_yaml::from_str(yaml).unwrap();
        match entry {
            ConfigEntry::Disk(d) => {
                assert_eq!(d.id, "disk0");
                assert_eq!(d.serial.as_deref(), Some("QM00002"));
                assert_eq!(d.ptable, Some(PartitionTableType::Gpt));
            }
            _ => panic!("expected disk"),
        }
    }

    #[test]
    fn test_references() {
        let raid = ConfigEntry::Raid(Raid {
            id: "raid0".into(),
            name: "md0".into(),
            raidlevel: Some(RaidLevel::Raid1),
            devices: vec!["p1".into(), "p2".into()],
            spare_devices: vec!["p3".into()],
            ..Default::default()
        });
        assert_eq!(raid.references(), vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "
id: disk0
type: disk
bogus: true
";
        assert!(serde_yaml::from_str::<ConfigEntry>(yaml).is_err());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let yaml = "
id: x
type: not_a_real_type
";
        assert!(serde_yaml::from_str::<ConfigEntry>(yaml).is_err());
    }
}
