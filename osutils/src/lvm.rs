use std::{
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Error};

use curtin_api::primitives::ByteCount;

use crate::exe::RunAndCheck;

/// Marks a device as an LVM physical volume (§4.5 `lvm_volgroup`).
pub fn pvcreate(device: &Path) -> Result<(), Error> {
    Command::new("pvcreate")
        .arg(device)
        .run_and_check()
        .with_context(|| format!("Failed to pvcreate '{}'", device.display()))
}

/// Strips LVM PV metadata from a device (§4.3 holder teardown).
pub fn pvremove(device: &Path) -> Result<(), Error> {
    Command::new("pvremove")
        .arg("--force")
        .arg("--yes")
        .arg(device)
        .run_and_check()
        .with_context(|| format!("Failed to pvremove '{}'", device.display()))
}

/// Creates a volume group from a set of already-`pvcreate`d devices.
pub fn vgcreate(name: &str, devices: &[PathBuf]) -> Result<(), Error> {
    Command::new("vgcreate")
        .arg(name)
        .args(devices)
        .run_and_check()
        .with_context(|| format!("Failed to create volume group '{name}'"))
}

/// Deactivates and removes a volume group (§4.3 holder teardown).
pub fn vgremove(name: &str) -> Result<(), Error> {
    Command::new("vgremove")
        .arg("--force")
        .arg(name)
        .run_and_check()
        .with_context(|| format!("Failed to remove volume group '{name}'"))
}

/// Creates a logical volume via `lvcreate -n <name> {-L <size>|-l 100%FREE} <vg>`
/// (§4.5 `lvm_partition`, §6 tool-protocol surface).
pub fn lvcreate(vg: &str, name: &str, size: Option<ByteCount>) -> Result<(), Error> {
    let mut command = Command::new("lvcreate");
    command.arg("-n").arg(name);
    match size {
        Some(bytes) => {
            command.arg("-L").arg(format!("{}B", bytes.bytes()));
        }
        None => {
            command.arg("-l").arg("100%FREE");
        }
    }
    command
        .arg(vg)
        .run_and_check()
        .with_context(|| format!("Failed to create logical volume '{vg}/{name}'"))
}

/// Removes a logical volume (§4.3 holder teardown).
pub fn lvremove(vg: &str, name: &str) -> Result<(), Error> {
    Command::new("lvremove")
        .arg("--force")
        .arg(format!("{vg}/{name}"))
        .run_and_check()
        .with_context(|| format!("Failed to remove logical volume '{vg}/{name}'"))
}

/// Resets the LVM device cache, used before re-probing devices that may have
/// gained or lost PV signatures.
pub fn pvscan_cache() -> Result<(), Error> {
    Command::new("pvscan")
        .arg("--cache")
        .run_and_check()
        .context("Failed to reset LVM device cache")
}
