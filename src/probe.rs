use anyhow::Error;
use log::debug;

use osutils::lsblk::BlockDevice;
use osutils::{dmsetup, lsblk, mdadm, multipath, zpool};

/// A point-in-time snapshot of host block-device topology (§4.1). Tools
/// that are not installed or find nothing are treated as "no devices of
/// that kind", not a probe failure.
#[derive(Debug, Default)]
pub struct HostTopology {
    pub block_devices: Vec<BlockDevice>,
    pub raid_arrays: Vec<mdadm::MdadmDetail>,
    pub multipath_maps: String,
    pub zpools: String,
    pub dm_targets: String,
}

impl HostTopology {
    pub fn probe() -> Result<Self, Error> {
        debug!("Probing host block device topology");
        Ok(HostTopology {
            block_devices: lsblk::list()?,
            raid_arrays: mdadm::details().unwrap_or_default(),
            multipath_maps: multipath::list().unwrap_or_default(),
            zpools: zpool::list().unwrap_or_default(),
            dm_targets: dmsetup::ls().unwrap_or_default(),
        })
    }

    /// Finds a block device by kernel name anywhere in the topology tree.
    pub fn find(&self, kname: &std::path::Path) -> Option<&BlockDevice> {
        fn search<'a>(
            devices: &'a [BlockDevice],
            kname: &std::path::Path,
        ) -> Option<&'a BlockDevice> {
            for device in devices {
                if std::path::Path::new(&device.name) == kname {
                    return Some(device);
                }
                if let Some(found) = search(&device.children, kname) {
                    return Some(found);
                }
            }
            None
        }
        search(&self.block_devices, kname)
    }
}
