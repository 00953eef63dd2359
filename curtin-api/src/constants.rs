/// Root mount point, used to pick fstab `passno: 1` and to recognize the
/// root mount when computing the fstab/crypttab accumulator ordering.
pub const ROOT_MOUNT_POINT_PATH: &str = "/";

/// Literal `size: grow` value for `partition`/`lvm_partition` entries (§4.2).
pub const PARTITION_SIZE_GROW: &str = "grow";

/// Default path for the best-effort host-wide lock (§5) preventing two
/// engine instances from mutating block devices concurrently.
pub const DEFAULT_LOCK_PATH: &str = "/run/curtin-storage.lock";

/// `bios_grub` partitions are always this size (§3 invariant 5).
pub const BIOS_GRUB_PARTITION_SIZE_MIB: u64 = 1;

/// Bytes wiped at the start of a partition before it is created, and at
/// each end of a disk during a `superblock` wipe.
pub const WIPE_WINDOW_MIB: u64 = 1;

/// Default retry budget for the holder quiesce inner loop (§4.3).
pub const HOLDER_QUIESCE_RETRIES: u32 = 3;

/// Backoff between holder quiesce retries.
pub const HOLDER_QUIESCE_BACKOFF_SECS: u64 = 1;

/// Default per-tool timeouts (§5).
pub const MKFS_TIMEOUT_SECS: u64 = 5 * 60;
pub const WIPE_ZERO_TIMEOUT_SECS: u64 = 10 * 60;
pub const SETTLE_TIMEOUT_SECS: u64 = 60;

/// How long [`StorageLock::acquire`](crate) blocks waiting for a contended
/// host lock before giving up (§5 "the configured image-lock timeout").
pub const STORAGE_LOCK_TIMEOUT_SECS: u64 = 120;

/// Poll interval while waiting for the host lock.
pub const STORAGE_LOCK_POLL_INTERVAL_MILLIS: u64 = 250;
