use std::{path::Path, process::Command};

use anyhow::{bail, Context, Error};

use curtin_api::config::PartitionTableType;

use crate::exe::RunAndCheck;

/// Writes a new partition table via `parted --script <dev> mklabel <type>`
/// (§4.5 `disk`).
pub fn mklabel(device: &Path, table: PartitionTableType) -> Result<(), Error> {
    let label = match table {
        PartitionTableType::Msdos => "msdos",
        PartitionTableType::Gpt => "gpt",
        PartitionTableType::Vtoc => {
            bail!("vtoc partition tables are created by dasdfmt/fdasd, not parted")
        }
    };

    Command::new("parted")
        .arg("--script")
        .arg(device)
        .arg("mklabel")
        .arg(label)
        .run_and_check()
        .with_context(|| format!("Failed to write {label} label on '{}'", device.display()))
}

/// Creates a partition via `parted --script <dev> mkpart <fs_type_hint> <start> <end>`
/// (§4.5 `partition`). `start`/`end` are parted unit strings, e.g. `"1MiB"`.
pub fn mkpart(device: &Path, fs_type_hint: &str, start: &str, end: &str) -> Result<(), Error> {
    Command::new("parted")
        .arg("--script")
        .arg(device)
        .arg("mkpart")
        .arg(fs_type_hint)
        .arg(start)
        .arg(end)
        .run_and_check()
        .with_context(|| format!("Failed to create partition on '{}'", device.display()))
}

/// Sets or clears a partition flag via `parted --script <dev> set <number> <flag> on|off`.
pub fn set_flag(device: &Path, number: u32, flag: &str, enabled: bool) -> Result<(), Error> {
    Command::new("parted")
        .arg("--script")
        .arg(device)
        .arg("set")
        .arg(number.to_string())
        .arg(flag)
        .arg(if enabled { "on" } else { "off" })
        .run_and_check()
        .with_context(|| {
            format!(
                "Failed to set flag '{flag}' on partition {number} of '{}'",
                device.display()
            )
        })
}

/// Resizes a partition's end boundary via `parted --script <dev> resizepart
/// <number> <end>` (§4.5 `partition` `resize: true`). `end` is a parted unit
/// string, e.g. `"100%"` or `"4096MiB"`.
pub fn resizepart(device: &Path, number: u32, end: &str) -> Result<(), Error> {
    Command::new("parted")
        .arg("--script")
        .arg(device)
        .arg("resizepart")
        .arg(number.to_string())
        .arg(end)
        .run_and_check()
        .with_context(|| {
            format!(
                "Failed to resize partition {number} on '{}'",
                device.display()
            )
        })
}

/// Removes a partition via `parted --script <dev> rm <number>`.
pub fn rm(device: &Path, number: u32) -> Result<(), Error> {
    Command::new("parted")
        .arg("--script")
        .arg(device)
        .arg("rm")
        .arg(number.to_string())
        .run_and_check()
        .with_context(|| {
            format!(
                "Failed to remove partition {number} from '{}'",
                device.display()
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mklabel_rejects_vtoc() {
        let err = mklabel(Path::new("/dev/loop0"), PartitionTableType::Vtoc).unwrap_err();
        assert!(err.to_string().contains("dasdfmt"));
    }
}
