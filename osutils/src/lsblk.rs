use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{bail, Context, Error};
use serde::{Deserialize, Serialize};

use curtin_api::primitives::ByteCount;

use crate::exe::RunAndCheck;

const LSBLK_BIN: &str = "lsblk";

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct LsBlkOutput {
    pub blockdevices: Vec<BlockDevice>,
}

/// Represents a block device as returned by `lsblk --json`. See `man lsblk` for
/// more information. Descriptions are copied from the output of `lsblk --help`
/// in AzL 2.0.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct BlockDevice {
    /// Device name
    pub name: String,

    /// Filesystem type
    pub fstype: Option<String>,

    /// Filesystem size
    pub fssize: Option<ByteCount>,

    /// Filesystem UUID
    #[serde(rename = "uuid")]
    pub fsuuid: Option<String>,

    /// Partition table UUID
    pub ptuuid: Option<String>,

    /// Partition UUID
    #[serde(rename = "partuuid")]
    pub part_uuid: Option<String>,

    /// Size of the device
    pub size: u64,

    /// Internal parent kernel device name
    #[serde(rename = "pkname")]
    pub parent_kernel_name: Option<PathBuf>,

    /// List of children devices
    ///
    /// Not a column, only displayed if --json is specified. Contains a list of
    /// all children devices. (e.g. partitions of a disk device)
    #[serde(default)]
    pub children: Vec<BlockDevice>,

    /// Where the device is mounted
    #[serde(default)]
    pub mountpoint: Option<PathBuf>,

    /// All locations where device is mounted
    #[serde(default, deserialize_with = "skip_nulls")]
    pub mountpoints: Vec<PathBuf>,

    /// Partition table type
    #[serde(rename = "pttype")]
    pub partition_table_type: Option<PartitionTableType>,

    // Read-only device
    #[serde(default, rename = "ro")]
    pub readonly: bool,

    // Device type
    #[serde(default, rename = "type")]
    pub blkdev_type: BlockDeviceType,

    /// Partition start offset in 512-byte sectors, when this device is a
    /// partition.
    #[serde(default)]
    pub start: Option<u64>,

    /// Partition number, when this device is a partition.
    #[serde(default, rename = "partn")]
    pub partition_number: Option<u32>,
}

impl BlockDevice {
    /// Partition start offset in bytes, computed from the 512-byte-sector
    /// `start` column (§4.2 "v2 partition identity").
    pub fn start_bytes(&self) -> Option<u64> {
        self.start.map(|sectors| sectors * 512)
    }

    /// Gets a list of all mountpoints for this device and its children.
    pub fn get_all_mountpoints_recursive(&self) -> Vec<&Path> {
        self.mountpoints
            .iter()
            .map(|p| p.as_path())
            .chain(
                self.children
                    .iter()
                    .flat_map(|ch| ch.get_all_mountpoints_recursive()),
            )
            .collect()
    }
}

/// All possible device types returned by lsblk
/// https://github.com/util-linux/util-linux/blob/master/misc-utils/lsblk.c#L402-L456
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BlockDeviceType {
    #[serde(alias = "part")]
    Partition,
    Lvm,
    Crypt,
    Dmraid,
    Mpath,
    Dm,
    Path,
    Md,
    Loop,
    Disk,
    Tape,
    Printer,
    Processor,
    Worm,
    Rom,
    Scanner,
    MoDisk,
    Charger,
    Comm,
    Raid,
    Enclosure,
    Rbc,
    Osd,
    NoLun,

    #[default]
    #[serde(other)]
    Unknown,
}

/// Partition table types recognized by `lsblk`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionTableType {
    /// GUID Partition Table
    #[serde(rename = "gpt")]
    Gpt,

    /// Master Boot Record
    #[serde(rename = "mbr", alias = "dos")]
    Mbr,
}

/// Returns a list of all block devices on the system.
///
/// This function executes the `lsblk` command to retrieve detailed
/// information about all available block devices in JSON format. It
/// parses the command's output and returns a `Vec` of `BlockDevice`
/// structs.
///
pub fn list() -> Result<Vec<BlockDevice>, Error> {
    let result = Command::new(LSBLK_BIN)
        .arg("--json")
        .arg("--output-all")
        .arg("--bytes")
        .output_and_check()
        .context("Failed to execute lsblk")?;

    let parsed: Vec<BlockDevice> = parse_lsblk_output(result.as_str())?;

    Ok(parsed)
}

/// Finds and returns all block devices (and their children) that match a
/// given predicate.
///
/// This function filters the list of block devices obtained from `list()`
/// based on a provided predicate function. It returns a `Vec` of
/// `BlockDevice` structs that satisfy the predicate, including their
/// child devices.
///
/// # Parameters
///
/// - `predicate`: A closure or function that takes a reference to a
///   `BlockDevice` and returns `true` if the device matches the desired
///   criteria, or `false` otherwise.
///
pub fn find(predicate: impl Fn(&BlockDevice) -> bool) -> Result<Vec<BlockDevice>, Error> {
    let block_devices = list().context("Failed to list block devices")?;
    let mut device_names_seen = HashSet::new();
    let mut matching_block_devices = Vec::new();

    find_recursive(
        &block_devices,
        &predicate,
        &mut device_names_seen,
        &mut matching_block_devices,
    );

    Ok(matching_block_devices)
}

/// Recursively searches for block devices that match the given predicate.
///
/// This helper function traverses a list of `BlockDevice` objects and
/// their children recursively, applying the provided predicate to each
/// device. Matching devices are added to the `matching_block_devices`
/// vector, ensuring that each device is only added once by using
/// `device_names_seen` to track already-seen device names.
///
/// # Parameters
///
/// - `block_devices`: A reference to the list of `BlockDevice` structs to
///   search through.
/// - `predicate`: A closure or function that takes a reference to a
///   `BlockDevice` and returns `true` if the device matches the desired
///   criteria, or `false` otherwise.
/// - `device_names_seen`: A mutable reference to a `HashSet` that keeps
///   track of device names that have already been processed.
/// - `matching_block_devices`: A mutable reference to a `Vec` that stores
///   the devices that match the predicate.
fn find_recursive(
    block_devices: &Vec<BlockDevice>,
    predicate: &impl Fn(&BlockDevice) -> bool,
    device_names_seen: &mut HashSet<String>,
    matching_block_devices: &mut Vec<BlockDevice>,
) {
    for block_device in block_devices {
        if predicate(block_device) && device_names_seen.insert(block_device.name.clone()) {
            matching_block_devices.push(block_device.clone());
        }

        find_recursive(
            &block_device.children,
            predicate,
            device_names_seen,
            matching_block_devices,
        );
    }
}

/// Retrieves detailed information for a specific block device at a the
/// specified path, if it exists.
pub fn try_get(device_path: impl AsRef<Path>) -> Result<Option<BlockDevice>, Error> {
    let result = Command::new(LSBLK_BIN)
        .arg("--json")
        .arg("--path")
        .arg(device_path.as_ref())
        .arg("--output-all")
        .arg("--bytes")
        .output_and_check()
        .context("Failed to execute lsblk")?;

    let parsed =
        parse_lsblk_output(result.as_str()).context("Failed to parse output from lsblk")?;

    if parsed.len() > 1 {
        bail!(
            "Unexpected number of block devices returned for device '{}': {}",
            device_path.as_ref().display(),
            parsed.len()
        );
    }

    Ok(parsed.into_iter().next())
}

/// Retrieves detailed information about a specific block device at a
/// given path. It is a wrapper around `get_opt` that returns an error if
/// no device is found.
pub fn get(device_path: impl AsRef<Path>) -> Result<BlockDevice, Error> {
    try_get(device_path.as_ref())
        .with_context(|| {
            format!(
                "Failed to get block device information for '{}'",
                device_path.as_ref().display()
            )
        })?
        .with_context(|| {
            format!(
                "No block device found at '{}'",
                device_path.as_ref().display()
            )
        })
}

fn parse_lsblk_output(output: &str) -> Result<Vec<BlockDevice>, Error> {
    let parsed: LsBlkOutput =
        serde_json::from_str(output).context("Failed to parse lsblk output")?;

    Ok(parsed.blockdevices)
}

fn skip_nulls<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    let v: Vec<Option<T>> = serde::Deserialize::deserialize(deserializer)?;
    Ok(v.into_iter().flatten().collect())
}
