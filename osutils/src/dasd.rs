use std::{path::Path, process::Command};

use anyhow::{Context, Error};

use curtin_api::config::{DasdDiskLayout, DasdFormatMode};

use crate::exe::RunAndCheck;

/// Low-level formats an s390x ECKD DASD device via `dasdfmt` (§4.5 `dasd`).
pub fn format(
    device: &Path,
    disk_layout: Option<DasdDiskLayout>,
    blocksize: Option<u32>,
    mode: Option<DasdFormatMode>,
) -> Result<(), Error> {
    let mut command = Command::new("dasdfmt");
    command.arg("--yes").arg(device);

    if let Some(layout) = disk_layout {
        let value = match layout {
            DasdDiskLayout::Cdl => "cdl",
            DasdDiskLayout::Ldl => "ldl",
        };
        command.arg("--disk_layout").arg(value);
    }

    if let Some(blocksize) = blocksize {
        command.arg("--blocksize").arg(blocksize.to_string());
    }

    match mode {
        Some(DasdFormatMode::Quick) => {
            command.arg("--mode").arg("quick");
        }
        Some(DasdFormatMode::Full) => {
            command.arg("--mode").arg("full");
        }
        Some(DasdFormatMode::Expand) => {
            command.arg("--mode").arg("expand");
        }
        None => {}
    }

    command
        .run_and_check()
        .with_context(|| format!("Failed to format DASD device '{}'", device.display()))
}

/// Partitions a CDL-formatted DASD with a VTOC table via `fdasd -a` (the
/// single-full-disk-partition convention curtin uses for DASD root disks).
pub fn fdasd_auto(device: &Path) -> Result<(), Error> {
    Command::new("fdasd")
        .arg("-a")
        .arg(device)
        .run_and_check()
        .with_context(|| format!("Failed to partition DASD device '{}'", device.display()))
}
