use std::{path::Path, process::Command};

use anyhow::{Context, Error};

use crate::exe::RunAndCheck;

/// Destroys a GPT (and any protective MBR) via `sgdisk --zap-all <dev>`
/// (§4.5 `disk`, `wipe: superblock` on a GPT-labeled disk).
pub fn zap_all(device: &Path) -> Result<(), Error> {
    Command::new("sgdisk")
        .arg("--zap-all")
        .arg(device)
        .run_and_check()
        .with_context(|| format!("Failed to zap GPT headers on '{}'", device.display()))
}
