pub mod bcache;
pub mod blkid;
pub mod block_devices;
pub mod dasd;
pub mod dmsetup;
pub mod encryption;
pub mod exe;
pub mod files;
pub mod filesystems;
pub mod iscsi;
pub mod lsblk;
pub mod lvm;
pub mod mdadm;
pub mod mkfs;
pub mod mkswap;
pub mod mount;
pub mod mountpoint;
pub mod multipath;
pub mod ntfsresize;
pub mod parted;
pub mod resize2fs;
pub mod sgdisk;
pub mod tabfile;
pub mod udevadm;
pub mod wipefs;
pub mod zfs;
pub mod zpool;

pub(crate) mod crate_private {
    pub trait Sealed {}
}
