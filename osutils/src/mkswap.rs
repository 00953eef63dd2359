use std::{path::Path, process::Command};

use anyhow::{Context, Error};

use crate::exe::RunAndCheck;

pub fn run(device_path: &Path) -> Result<(), Error> {
    Command::new("mkswap")
        .arg("--verbose")
        .arg(device_path)
        .run_and_check()
        .context("Failed to execute mkswap")
}
