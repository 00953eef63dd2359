use std::path::Path;
use std::process::Command;

use anyhow::{Context, Error};

use crate::{exe::RunAndCheck, filesystems::MkfsFileSystemType};

const MKFS_BIN: &str = "mkfs";

/// Formats `device_path` with `filesystem` via `mkfs --type <fstype> <device>`
/// (§4.5 `format`).
pub fn run(device_path: &Path, filesystem: MkfsFileSystemType) -> Result<(), Error> {
    Command::new(MKFS_BIN)
        .arg("--type")
        .arg(filesystem.name())
        .arg(device_path)
        .run_and_check()
        .context("Failed to execute mkfs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_passthrough() {
        assert_eq!(MkfsFileSystemType::Ext4.name(), "ext4");
        assert_eq!(MkfsFileSystemType::Other("f2fs".into()).name(), "f2fs");
    }
}
