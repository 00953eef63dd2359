use std::path::Path;
use std::process::Command;

use anyhow::{Context, Error};

use crate::exe::OutputChecker;

/// Returns whether `path` is currently a mount point, via `mountpoint <path>`.
/// A non-zero exit from `mountpoint` means "not a mount point", not a failure.
pub fn check_is_mountpoint(path: impl AsRef<Path>) -> Result<bool, Error> {
    let output = Command::new("mountpoint")
        .arg("--quiet")
        .arg(path.as_ref())
        .output()
        .with_context(|| {
            format!(
                "Failed to determine if '{}' is a mount point",
                path.as_ref().display()
            )
        })?;

    Ok(output.is_success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_a_mountpoint() {
        assert!(!check_is_mountpoint(Path::new("/does-not-exist")).unwrap());
    }

    #[test]
    fn test_root_is_a_mountpoint() {
        assert!(check_is_mountpoint(Path::new("/")).unwrap());
    }
}
