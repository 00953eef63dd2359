use std::collections::BTreeMap;
use std::path::Path;

use curtin_api::config::{ConfigEntry, StorageConfig};
use curtin_api::error::{CurtinError, ExecutionError, ReportError};
use osutils::filesystems::TabFileSystemType;
use osutils::tabfile::{TabFile, TabFileEntry};

use crate::executors::DeviceMap;

/// Writes `/etc/fstab` under the target mount point from every `mount`
/// entry in the config, ordered shallowest mount-path first so that a
/// parent is always mounted before anything nested under it (§4.7).
pub fn write_fstab(
    config: &StorageConfig,
    devices: &DeviceMap,
    output_fstab: &Path,
) -> Result<(), CurtinError> {
    let mut rows: Vec<(usize, TabFileEntry)> = Vec::new();

    for entry in &config.config {
        let ConfigEntry::Mount(mount_entry) = entry else {
            continue;
        };
        let Some(device_id) = &mount_entry.device else {
            continue;
        };
        let Ok(device_path) = devices.resolve(device_id).map(Path::to_path_buf) else {
            continue;
        };

        let fstype = fstab_fs_type(config, device_id);
        let path = mount_entry.path.clone().unwrap_or_default();
        let depth = mount_path_depth(&path);

        let tab_entry = if fstype == TabFileSystemType::Swap {
            TabFileEntry::new_swap(device_path)
        } else {
            TabFileEntry::new_path(device_path, path, fstype)
        }
        .with_options(mount_entry.options.clone());

        rows.push((depth, tab_entry));
    }

    rows.sort_by_key(|(depth, _)| *depth);

    let mut tab_file = TabFile::default();
    tab_file.entries.extend(rows.into_iter().map(|(_, entry)| entry));

    tab_file.write(output_fstab).structured(ExecutionError::ActionFailed {
        id: "fstab".into(),
        kind: "persist",
    })
}

/// Number of path components in a mount point, used to order `/etc/fstab`
/// so that `/` sorts before `/boot` which sorts before `/boot/efi`. A swap
/// entry carries no mount path and sorts first.
fn mount_path_depth(path: &str) -> usize {
    path.trim_matches('/').split('/').filter(|s| !s.is_empty()).count()
}

fn fstab_fs_type(config: &StorageConfig, device_id: &str) -> TabFileSystemType {
    config
        .config
        .iter()
        .find(|entry| entry.id() == device_id)
        .and_then(|entry| match entry {
            ConfigEntry::Format(f) => f.fstype.clone(),
            _ => None,
        })
        .map(TabFileSystemType::from_api_type)
        .unwrap_or(TabFileSystemType::Auto)
}

/// Writes the device map named by `device_map_path`: a JSON object mapping
/// each config entry id to the real device node it resolved to (§4.7, §6).
pub fn write_device_map(config: &StorageConfig, devices: &DeviceMap) -> Result<(), CurtinError> {
    let Some(path) = &config.device_map_path else {
        return Ok(());
    };

    let map: BTreeMap<String, String> = config
        .config
        .iter()
        .filter_map(|entry| {
            devices
                .resolve(entry.id())
                .ok()
                .map(|p| (entry.id().to_string(), p.display().to_string()))
        })
        .collect();

    let json = serde_json::to_string_pretty(&map).structured(ExecutionError::ActionFailed {
        id: "device-map".into(),
        kind: "persist",
    })?;

    std::fs::write(path, json).structured(ExecutionError::ActionFailed {
        id: "device-map".into(),
        kind: "persist",
    })
}

/// Writes `/etc/crypttab`: one line per `dm_crypt` entry whose underlying
/// volume resolved (§4.7).
pub fn write_crypttab(
    config: &StorageConfig,
    devices: &DeviceMap,
    output_crypttab: &Path,
) -> Result<(), CurtinError> {
    let mut lines = String::new();

    for entry in &config.config {
        let ConfigEntry::DmCrypt(crypt) = entry else {
            continue;
        };
        let Ok(volume_path) = devices.resolve(&crypt.volume) else {
            continue;
        };

        let key_field = crypt
            .keyfile
            .clone()
            .unwrap_or_else(|| "none".to_string());
        let options = if crypt.options.is_empty() {
            "luks".to_string()
        } else {
            crypt.options.join(",")
        };

        lines.push_str(&format!(
            "{} {} {} {}\n",
            crypt.dm_name,
            volume_path.display(),
            key_field,
            options
        ));
    }

    std::fs::write(output_crypttab, lines).structured(ExecutionError::ActionFailed {
        id: "crypttab".into(),
        kind: "persist",
    })
}

/// The `by-dname` label a config entry is stably reachable under (§4.5,
/// `GLOSSARY`), or `None` if the entry carries no such name.
fn dname_for(entry: &ConfigEntry) -> Option<String> {
    match entry {
        ConfigEntry::Disk(d) => d.name.clone(),
        ConfigEntry::Partition(p) => p.partition_name.clone(),
        ConfigEntry::LvmPartition(lv) => Some(format!("{}-{}", lv.volgroup, lv.name)),
        ConfigEntry::Raid(r) => Some(r.name.clone()),
        ConfigEntry::Bcache(b) => b.name.clone(),
        _ => None,
    }
}

/// Writes the `*-curtin-by-dname.rules` udev rules file under the target,
/// one `SYMLINK+=` rule per resolved entry that carries a `by-dname` name
/// (§4.5, §4.7).
pub fn write_by_dname_rules(
    config: &StorageConfig,
    devices: &DeviceMap,
    output_path: &Path,
) -> Result<(), CurtinError> {
    let mut lines = String::new();

    for entry in &config.config {
        let Some(name) = dname_for(entry) else {
            continue;
        };
        let Ok(path) = devices.resolve(entry.id()) else {
            continue;
        };

        lines.push_str(&format!(
            "SUBSYSTEM==\"block\", ENV{{DEVNAME}}==\"{}\", SYMLINK+=\"disk/by-dname/{}\"\n",
            path.display(),
            name
        ));
    }

    std::fs::write(output_path, lines).structured(ExecutionError::ActionFailed {
        id: "by-dname-rules".into(),
        kind: "persist",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use curtin_api::config::{Format, Mount};
    use std::path::PathBuf;

    fn config(entries: Vec<ConfigEntry>, device_map_path: Option<PathBuf>) -> StorageConfig {
        StorageConfig {
            version: 1,
            device_map_path,
            config: entries,
        }
    }

    #[test]
    fn fstab_fs_type_looks_up_the_referenced_format_entry() {
        let cfg = config(
            vec![ConfigEntry::Format(Format {
                id: "f1".into(),
                device: Some("p1".into()),
                fstype: Some(sysdefs::filesystems::FileSystemType::Ext4),
                ..Default::default()
            })],
            None,
        );
        assert_eq!(fstab_fs_type(&cfg, "f1"), TabFileSystemType::Ext4);
    }

    #[test]
    fn fstab_fs_type_defaults_to_auto_when_unresolved() {
        let cfg = config(vec![], None);
        assert_eq!(fstab_fs_type(&cfg, "missing"), TabFileSystemType::Auto);
    }

    #[test]
    fn write_fstab_skips_mounts_whose_device_never_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("fstab");

        let cfg = config(
            vec![ConfigEntry::Mount(Mount {
                id: "m1".into(),
                device: Some("f1".into()),
                path: Some("/".into()),
                ..Default::default()
            })],
            None,
        );
        let devices = DeviceMap::default();

        write_fstab(&cfg, &devices, &output).unwrap();
        let contents = std::fs::read_to_string(&output).unwrap();
        assert!(!contents.contains("f1"));
    }

    #[test]
    fn write_fstab_emits_a_swap_entry_for_swap_mounts() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("fstab");

        let cfg = config(
            vec![
                ConfigEntry::Format(Format {
                    id: "f1".into(),
                    device: Some("p1".into()),
                    fstype: Some(sysdefs::filesystems::FileSystemType::Swap),
                    ..Default::default()
                }),
                ConfigEntry::Mount(Mount {
                    id: "m1".into(),
                    device: Some("f1".into()),
                    ..Default::default()
                }),
            ],
            None,
        );
        let mut devices = DeviceMap::default();
        devices.insert("f1", PathBuf::from("/dev/sda1"));

        write_fstab(&cfg, &devices, &output).unwrap();
        let contents = std::fs::read_to_string(&output).unwrap();
        assert!(contents.contains("swap"));
        assert!(contents.contains("/dev/sda1"));
    }

    #[test]
    fn write_device_map_is_a_no_op_without_a_configured_path() {
        let cfg = config(vec![], None);
        write_device_map(&cfg, &DeviceMap::default()).unwrap();
    }

    #[test]
    fn write_device_map_serializes_resolved_entries_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device-map.json");

        let cfg = config(
            vec![ConfigEntry::Format(Format {
                id: "f1".into(),
                ..Default::default()
            })],
            Some(path.clone()),
        );
        let mut devices = DeviceMap::default();
        devices.insert("f1", PathBuf::from("/dev/sda1"));

        write_device_map(&cfg, &devices).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("f1"));
        assert!(contents.contains("/dev/sda1"));
    }

    #[test]
    fn write_crypttab_renders_keyfile_and_options() {
        use curtin_api::config::DmCrypt;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("crypttab");

        let cfg = config(
            vec![ConfigEntry::DmCrypt(DmCrypt {
                id: "c1".into(),
                volume: "p1".into(),
                dm_name: "root_crypt".into(),
                keyfile: Some("/etc/keys/root.key".into()),
                options: vec!["luks".into(), "discard".into()],
                ..Default::default()
            })],
            None,
        );
        let mut devices = DeviceMap::default();
        devices.insert("p1", PathBuf::from("/dev/sda2"));

        write_crypttab(&cfg, &devices, &output).unwrap();
        let contents = std::fs::read_to_string(&output).unwrap();
        assert_eq!(
            contents,
            "root_crypt /dev/sda2 /etc/keys/root.key luks,discard\n"
        );
    }

    #[test]
    fn dname_for_combines_volgroup_and_lv_name() {
        use curtin_api::config::LvmPartition;

        let entry = ConfigEntry::LvmPartition(LvmPartition {
            id: "lv1".into(),
            volgroup: "vg0".into(),
            name: "root".into(),
            ..Default::default()
        });
        assert_eq!(dname_for(&entry), Some("vg0-root".to_string()));
    }

    #[test]
    fn write_by_dname_rules_skips_entries_without_a_name() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("rules");

        let cfg = config(
            vec![ConfigEntry::Format(Format {
                id: "f1".into(),
                ..Default::default()
            })],
            None,
        );
        let mut devices = DeviceMap::default();
        devices.insert("f1", PathBuf::from("/dev/sda1"));

        write_by_dname_rules(&cfg, &devices, &output).unwrap();
        let contents = std::fs::read_to_string(&output).unwrap();
        assert!(contents.is_empty());
    }
}
