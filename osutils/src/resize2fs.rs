use anyhow::{Context, Error};
use std::{path::Path, process::Command};

use crate::exe::RunAndCheck;

/// Resize ext* filesystem on the specified block devices to fill the entire device.
pub fn run(block_device_path: &Path) -> Result<(), Error> {
    // Perform resize
    Command::new("resize2fs")
        .arg(block_device_path)
        .run_and_check()
        .context("Failed to execute resize2fs")
}
