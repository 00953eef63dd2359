use std::{collections::BTreeMap, process::Command};

use anyhow::{Context, Error};

use crate::exe::RunAndCheck;

/// Creates a dataset via `zfs create -o k=v … <pool>/<dataset>` (§4.5 `zfs`).
pub fn create(pool: &str, dataset: &str, properties: &BTreeMap<String, String>) -> Result<(), Error> {
    let mut command = Command::new("zfs");
    command.arg("create");
    for (key, value) in properties {
        command.arg("-o").arg(format!("{key}={value}"));
    }
    command
        .arg(format!("{pool}/{dataset}"))
        .run_and_check()
        .with_context(|| format!("Failed to create zfs dataset '{pool}/{dataset}'"))
}
