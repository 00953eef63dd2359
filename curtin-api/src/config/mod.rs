mod entries;
mod partition_type;
mod raid_level;
mod size_spec;
mod storage;

pub use entries::{
    Bcache, CacheMode, ConfigEntry, Dasd, DasdDiskLayout, DasdFormatMode, Device, Disk, DmCrypt,
    EncryptionStyle, Format, LvmPartition, LvmVolgroup, Mount, NvmeController, NvmeTransport,
    Partition, PartitionTableType, Raid, WipeMode, Zfs, Zpool,
};
pub use partition_type::{PartitionFlag, PartitionType, BOOT_FLAG_GPT_GUID, BOOT_FLAG_MBR_TYPE};
pub use raid_level::RaidLevel;
pub use size_spec::SizeSpec;
pub use storage::{StorageConfig, StorageDocument};
