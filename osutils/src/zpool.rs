use std::{path::PathBuf, process::Command};

use anyhow::{Context, Error};

use crate::exe::RunAndCheck;

/// Default dataset properties applied to every pool unless overridden (§6
/// tool-protocol surface).
const DEFAULT_PROPERTIES: &[(&str, &str)] = &[
    ("ashift", "12"),
    ("atime", "off"),
    ("canmount", "off"),
    ("normalization", "formD"),
];

/// Creates a zpool via `zpool create -o ashift=12 -O atime=off -O canmount=off
/// -O normalization=formD <pool> <vdevs>`, with `overrides` replacing any
/// default of the same key (§4.5 `zpool`).
pub fn create(
    pool: &str,
    vdevs: &[PathBuf],
    overrides: &std::collections::BTreeMap<String, String>,
) -> Result<(), Error> {
    let mut command = Command::new("zpool");
    command.arg("create");

    for (key, default_value) in DEFAULT_PROPERTIES {
        let value = overrides
            .get(*key)
            .map(String::as_str)
            .unwrap_or(default_value);
        command.arg("-o").arg(format!("{key}={value}"));
    }
    for (key, value) in overrides {
        if DEFAULT_PROPERTIES.iter().any(|(k, _)| k == key) {
            continue;
        }
        command.arg("-O").arg(format!("{key}={value}"));
    }

    command
        .arg(pool)
        .args(vdevs)
        .run_and_check()
        .with_context(|| format!("Failed to create zpool '{pool}'"))
}

/// Exports a pool so its devices become free (§4.3 holder teardown).
pub fn export(pool: &str) -> Result<(), Error> {
    Command::new("zpool")
        .arg("export")
        .arg(pool)
        .run_and_check()
        .with_context(|| format!("Failed to export zpool '{pool}'"))
}

/// Lists known pools, used by the probe.
pub fn list() -> Result<String, Error> {
    Command::new("zpool")
        .arg("list")
        .arg("-H")
        .output_and_check()
        .context("Failed to list zpools")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_properties_cover_ashift() {
        assert!(DEFAULT_PROPERTIES.iter().any(|(k, _)| *k == "ashift"));
    }
}
