use std::collections::HashSet;
use std::fmt;
use std::io::{self, BufRead};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of filesystem types curtin has first-class knowledge of:
/// a `mkfs.<fstype>`-aware format executor, a matching fstab `fstype`
/// column, and (for ext/ntfs) a resize path. Anything else still passes
/// through as [`FileSystemType::Other`] as long as `mkfs.<fstype>` exists
/// on the host, per the format executor's contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSystemType {
    Ext2,
    Ext3,
    Ext4,
    Xfs,
    Btrfs,
    #[serde(alias = "fat32", alias = "fat")]
    Vfat,
    Ntfs,
    Swap,
    Iso9660,
    #[serde(untagged)]
    Other(String),
}

impl FileSystemType {
    pub fn name(&self) -> &str {
        match self {
            Self::Ext2 => "ext2",
            Self::Ext3 => "ext3",
            Self::Ext4 => "ext4",
            Self::Xfs => "xfs",
            Self::Btrfs => "btrfs",
            Self::Vfat => "vfat",
            Self::Ntfs => "ntfs",
            Self::Swap => "swap",
            Self::Iso9660 => "iso9660",
            Self::Other(name) => name,
        }
    }

    /// Filesystems whose `resize: true` support is in scope (§4.5); all
    /// others reject `resize`.
    pub fn supports_resize(&self) -> bool {
        matches!(self, Self::Ext2 | Self::Ext3 | Self::Ext4 | Self::Ntfs)
    }

    /// Filesystems curtin never hands a `label` to (e.g. because `mkfs`
    /// silently ignores it for unknown types).
    pub fn supports_label(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl FromStr for FileSystemType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "ext2" => Self::Ext2,
            "ext3" => Self::Ext3,
            "ext4" => Self::Ext4,
            "xfs" => Self::Xfs,
            "btrfs" => Self::Btrfs,
            "vfat" | "fat32" | "fat" => Self::Vfat,
            "ntfs" => Self::Ntfs,
            "swap" => Self::Swap,
            "iso9660" => Self::Iso9660,
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for FileSystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Path to the `/proc/filesystems` probe source (§9 open question: the set
/// of `nodev` filesystem types for fstab `passno` defaulting is read at
/// runtime, never hard-coded).
pub const PROC_FILESYSTEMS_PATH: &str = "/proc/filesystems";

/// Returns the set of filesystem type names the kernel currently reports as
/// `nodev` (no block device backing, e.g. `tmpfs`, `proc`, `sysfs`). A mount
/// action whose `fstype` is in this set defaults its fstab `passno` to 0
/// rather than 1 (§4.5 `mount`).
pub fn nodev_filesystems() -> io::Result<HashSet<String>> {
    let file = std::fs::File::open(PROC_FILESYSTEMS_PATH)?;
    parse_proc_filesystems(io::BufReader::new(file))
}

fn parse_proc_filesystems(reader: impl BufRead) -> io::Result<HashSet<String>> {
    let mut nodev = HashSet::new();
    for line in reader.lines() {
        let line = line?;
        let mut columns = line.split_whitespace();
        let first = match columns.next() {
            Some(c) => c,
            None => continue,
        };
        if first == "nodev" {
            if let Some(name) = columns.next() {
                nodev.insert(name.to_string());
            }
        }
    }
    Ok(nodev)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known() {
        assert_eq!("ext4".parse::<FileSystemType>().unwrap(), FileSystemType::Ext4);
        assert_eq!("fat32".parse::<FileSystemType>().unwrap(), FileSystemType::Vfat);
    }

    #[test]
    fn test_parse_unknown_passthrough() {
        assert_eq!(
            "reiserfs".parse::<FileSystemType>().unwrap(),
            FileSystemType::Other("reiserfs".to_string())
        );
        assert!(!FileSystemType::Other("reiserfs".to_string()).supports_label());
    }

    #[test]
    fn test_resize_support() {
        assert!(FileSystemType::Ext4.supports_resize());
        assert!(FileSystemType::Ntfs.supports_resize());
        assert!(!FileSystemType::Xfs.supports_resize());
        assert!(!FileSystemType::Swap.supports_resize());
    }

    #[test]
    fn test_parse_proc_filesystems() {
        let sample = "nodev\tsysfs\nnodev\ttmpfs\n\text4\nnodev\tproc\n\tvfat\n";
        let nodev = parse_proc_filesystems(sample.as_bytes()).unwrap();
        assert!(nodev.contains("sysfs"));
        assert!(nodev.contains("tmpfs"));
        assert!(nodev.contains("proc"));
        assert!(!nodev.contains("ext4"));
        assert!(!nodev.contains("vfat"));
    }
}
