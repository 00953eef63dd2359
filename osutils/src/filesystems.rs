use anyhow::bail;
use sysdefs::filesystems::FileSystemType;

/// File system types for `mount`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountFileSystemType {
    Ext2,
    Ext3,
    Ext4,
    Xfs,
    Btrfs,
    Vfat,
    Ntfs,
    Iso9660,
    Tmpfs,
    Auto,
    Overlay,
    Other(String),
}

/// File system types for `mkfs`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MkfsFileSystemType {
    Ext2,
    Ext3,
    Ext4,
    Xfs,
    Btrfs,
    Vfat,
    Ntfs,
    Other(String),
}

/// File system types for fstab file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabFileSystemType {
    Auto,
    Ext2,
    Ext3,
    Ext4,
    Xfs,
    Btrfs,
    Vfat,
    Ntfs,
    Iso9660,
    Tmpfs,
    Swap,
    Overlay,
    Other(String),
}

impl MountFileSystemType {
    pub fn name(&self) -> &str {
        match self {
            Self::Ext2 => "ext2",
            Self::Ext3 => "ext3",
            Self::Ext4 => "ext4",
            Self::Xfs => "xfs",
            Self::Btrfs => "btrfs",
            Self::Vfat => "vfat",
            Self::Ntfs => "ntfs",
            Self::Iso9660 => "iso9660",
            Self::Tmpfs => "tmpfs",
            Self::Auto => "auto",
            Self::Overlay => "overlay",
            Self::Other(name) => name,
        }
    }

    /// Converts a `mount` action's `fstype` (§4.5) into the `mount -t` argument.
    /// `swap` entries never reach a `mount` executor (they go through
    /// `mkswap`/`swapon` instead), so it is rejected here.
    pub fn from_api_type(api_type: FileSystemType) -> Result<Self, anyhow::Error> {
        Ok(match api_type {
            FileSystemType::Ext2 => Self::Ext2,
            FileSystemType::Ext3 => Self::Ext3,
            FileSystemType::Ext4 => Self::Ext4,
            FileSystemType::Xfs => Self::Xfs,
            FileSystemType::Btrfs => Self::Btrfs,
            FileSystemType::Vfat => Self::Vfat,
            FileSystemType::Ntfs => Self::Ntfs,
            FileSystemType::Iso9660 => Self::Iso9660,
            FileSystemType::Swap => bail!("'swap' filesystem type cannot be used for mounting"),
            FileSystemType::Other(name) => Self::Other(name),
        })
    }
}

impl std::fmt::Display for MountFileSystemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Provides a conversion from `MountFileSystemType` to `sys_mount::FilesystemType`
impl From<MountFileSystemType> for sys_mount::FilesystemType<'static> {
    fn from(s: MountFileSystemType) -> Self {
        sys_mount::FilesystemType::Manual(Box::leak(s.name().to_string().into_boxed_str()))
    }
}

impl MkfsFileSystemType {
    pub fn name(&self) -> &str {
        match self {
            Self::Ext2 => "ext2",
            Self::Ext3 => "ext3",
            Self::Ext4 => "ext4",
            Self::Xfs => "xfs",
            Self::Btrfs => "btrfs",
            Self::Vfat => "vfat",
            Self::Ntfs => "ntfs",
            Self::Other(name) => name,
        }
    }

    /// Converts a `format` action's `fstype` (§4.5) into the `mkfs.<fstype>` tool
    /// name. Any type not in curtin's closed resize/label-aware set still routes
    /// through here as long as a `mkfs.<fstype>` binary exists on the host.
    pub fn from_api_type(api_type: FileSystemType) -> Result<Self, anyhow::Error> {
        Ok(match api_type {
            FileSystemType::Ext2 => Self::Ext2,
            FileSystemType::Ext3 => Self::Ext3,
            FileSystemType::Ext4 => Self::Ext4,
            FileSystemType::Xfs => Self::Xfs,
            FileSystemType::Btrfs => Self::Btrfs,
            FileSystemType::Vfat => Self::Vfat,
            FileSystemType::Ntfs => Self::Ntfs,
            FileSystemType::Iso9660 | FileSystemType::Swap => {
                bail!(
                    "'{}' filesystem type cannot be used for creating new filesystems",
                    api_type
                )
            }
            FileSystemType::Other(name) => Self::Other(name),
        })
    }
}

impl std::fmt::Display for MkfsFileSystemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl TabFileSystemType {
    pub fn name(&self) -> &str {
        match self {
            Self::Auto => "auto",
            Self::Ext2 => "ext2",
            Self::Ext3 => "ext3",
            Self::Ext4 => "ext4",
            Self::Xfs => "xfs",
            Self::Btrfs => "btrfs",
            Self::Vfat => "vfat",
            Self::Ntfs => "ntfs",
            Self::Iso9660 => "iso9660",
            Self::Tmpfs => "tmpfs",
            Self::Overlay => "overlay",
            Self::Swap => "swap",
            Self::Other(name) => name,
        }
    }

    pub fn from_api_type(api_type: FileSystemType) -> Self {
        match api_type {
            FileSystemType::Ext2 => Self::Ext2,
            FileSystemType::Ext3 => Self::Ext3,
            FileSystemType::Ext4 => Self::Ext4,
            FileSystemType::Xfs => Self::Xfs,
            FileSystemType::Btrfs => Self::Btrfs,
            FileSystemType::Vfat => Self::Vfat,
            FileSystemType::Ntfs => Self::Ntfs,
            FileSystemType::Iso9660 => Self::Iso9660,
            FileSystemType::Swap => Self::Swap,
            FileSystemType::Other(name) => Self::Other(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_from_api_type() {
        assert_eq!(
            MountFileSystemType::from_api_type(FileSystemType::Ext4).unwrap(),
            MountFileSystemType::Ext4
        );
        assert!(MountFileSystemType::from_api_type(FileSystemType::Swap).is_err());
    }

    #[test]
    fn test_mkfs_from_api_type() {
        assert_eq!(
            MkfsFileSystemType::from_api_type(FileSystemType::Xfs).unwrap(),
            MkfsFileSystemType::Xfs
        );
        assert!(MkfsFileSystemType::from_api_type(FileSystemType::Iso9660).is_err());
    }

    #[test]
    fn test_tab_from_api_type() {
        assert_eq!(
            TabFileSystemType::from_api_type(FileSystemType::Swap),
            TabFileSystemType::Swap
        );
    }
}
