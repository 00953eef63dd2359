use anyhow::{Context, Error};
use std::{path::Path, process::Command};

use crate::exe::RunAndCheck;

/// Resizes an NTFS filesystem to fill its containing partition via
/// `ntfsresize --force` (§4.2 `partition` `resize: true`).
pub fn run(block_device_path: &Path) -> Result<(), Error> {
    Command::new("ntfsresize")
        .arg("--force")
        .arg(block_device_path)
        .run_and_check()
        .context("Failed to execute ntfsresize")
}
