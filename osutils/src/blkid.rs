use std::{path::Path, process::Command};

use anyhow::{Context, Error};
use uuid::Uuid;

use crate::exe::RunAndCheck;

fn run(device_path: impl AsRef<Path>, tag: &str) -> Result<String, Error> {
    let output = Command::new("blkid")
        .arg("-o") // output format
        .arg("value") // single value
        .arg("-s") // tag
        .arg(tag)
        .arg(device_path.as_ref())
        .output_and_check()
        .context("Failed to execute blkid")?;

    Ok(output.trim().to_owned())
}

fn get_filesystem_uuid_raw(device_path: impl AsRef<Path>) -> Result<String, Error> {
    run(device_path, "UUID")
}

pub fn get_filesystem_uuid(device_path: impl AsRef<Path>) -> Result<Uuid, Error> {
    let output = get_filesystem_uuid_raw(&device_path)?;
    Uuid::parse_str(output.as_str()).context(format!(
        "Failed to get UUID for path '{}', received '{}'",
        device_path.as_ref().display(),
        output
    ))
}

pub fn get_partition_label(device_path: impl AsRef<Path>) -> Result<String, Error> {
    run(device_path, "PARTLABEL")
}
