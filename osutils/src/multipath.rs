use std::process::Command;

use anyhow::{Context, Error};

use crate::exe::RunAndCheck;

/// Lists active multipath topology via `multipath -ll`, used by the probe to
/// resolve a disk's `multipath` alias to its member devices.
pub fn list() -> Result<String, Error> {
    Command::new("multipath")
        .arg("-ll")
        .output_and_check()
        .context("Failed to list multipath devices")
}

/// Flushes a multipath map so its members become free (§4.3 holder teardown).
pub fn flush(alias: &str) -> Result<(), Error> {
    Command::new("multipath")
        .arg("-f")
        .arg(alias)
        .run_and_check()
        .with_context(|| format!("Failed to flush multipath map '{alias}'"))
}
