use std::process::Command;

use anyhow::{Context, Error};

use crate::exe::RunAndCheck;

/// Removes a device-mapper target by name (§4.3 `Discovered → Quiesced`
/// transition for `dev_type: dm`).
pub fn remove(name: &str) -> Result<(), Error> {
    Command::new("dmsetup")
        .arg("remove")
        .arg(name)
        .run_and_check()
        .with_context(|| format!("Failed to remove device-mapper target '{name}'"))
}

/// Lists device-mapper targets and their status, used by the probe to
/// discover dm holders.
pub fn ls() -> Result<String, Error> {
    Command::new("dmsetup")
        .arg("ls")
        .output_and_check()
        .context("Failed to list device-mapper targets")
}
