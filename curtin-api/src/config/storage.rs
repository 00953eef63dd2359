use std::path::PathBuf;

use serde::Deserialize;

use super::entries::ConfigEntry;
use crate::error::{CurtinError, ReportError, SchemaError};
use crate::graph::ActionGraph;

/// Top-level `storage:` document (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct StorageDocument {
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    pub version: u32,
    pub device_map_path: Option<PathBuf>,
    pub config: Vec<ConfigEntry>,
}

impl StorageConfig {
    /// Parses and fully validates a `storage:` YAML document (§4.2). All
    /// structural errors are reported before any device is touched.
    pub fn from_yaml(yaml: &str) -> Result<Self, CurtinError> {
        let doc: StorageDocument =
            serde_yaml::from_str(yaml).structured(SchemaError::Yaml)?;
        doc.storage.validate()?;
        Ok(doc.storage)
    }

    pub fn validate(&self) -> Result<(), CurtinError> {
        if self.version != 1 && self.version != 2 {
            return Err(CurtinError::new(SchemaError::UnsupportedVersion(
                self.version,
            )));
        }
        for entry in &self.config {
            validate_entry(entry)?;
        }
        Ok(())
    }

    /// Builds the action graph, checking acyclicity (§3 invariants 1-2).
    pub fn build_graph(self) -> Result<ActionGraph, CurtinError> {
        ActionGraph::build(self.config)
    }
}

fn validate_entry(entry: &ConfigEntry) -> Result<(), CurtinError> {
    let id = entry.id().to_string();
    match entry {
        ConfigEntry::Raid(r) => {
            if r.devices.is_empty() {
                return Err(CurtinError::new(SchemaError::MissingField {
                    id,
                    field: "devices",
                }));
            }
            if r.raidlevel.is_none() {
                return Err(CurtinError::new(SchemaError::MissingField {
                    id,
                    field: "raidlevel",
                }));
            }
        }
        ConfigEntry::DmCrypt(c) => match (&c.key, &c.keyfile) {
            (Some(_), Some(_)) => {
                return Err(CurtinError::new(SchemaError::ContradictoryFields {
                    id,
                    detail: "exactly one of key or keyfile must be set, both were given".into(),
                }))
            }
            (None, None) => {
                return Err(CurtinError::new(SchemaError::ContradictoryFields {
                    id,
                    detail: "exactly one of key or keyfile must be set, neither was given".into(),
                }))
            }
            _ => {}
        },
        ConfigEntry::Mount(m) => {
            if m.device.is_none() && m.spec.is_none() {
                return Err(CurtinError::new(SchemaError::MissingField {
                    id,
                    field: "device or spec",
                }));
            }
        }
        ConfigEntry::Format(f) => {
            if f.device.is_none() {
                return Err(CurtinError::new(SchemaError::MissingField {
                    id,
                    field: "device",
                }));
            }
            if f.fstype.is_none() {
                return Err(CurtinError::new(SchemaError::MissingField {
                    id,
                    field: "fstype",
                }));
            }
        }
        ConfigEntry::Partition(p) => {
            if p.resize && !p.preserve {
                return Err(CurtinError::new(SchemaError::ContradictoryFields {
                    id,
                    detail: "resize: true is only valid with preserve: true".into(),
                }));
            }
        }
        ConfigEntry::Dasd(d) => {
            if let Some(label) = &d.label {
                validate_dasd_label(&id, label)?;
            }
        }
        ConfigEntry::Disk(_)
        | ConfigEntry::LvmVolgroup(_)
        | ConfigEntry::LvmPartition(_)
        | ConfigEntry::Bcache(_)
        | ConfigEntry::Zpool(_)
        | ConfigEntry::Zfs(_)
        | ConfigEntry::NvmeController(_)
        | ConfigEntry::Device(_) => {}
    }
    Ok(())
}

/// DASD volume labels are 6 ASCII characters and must not collide with the
/// reserved labels `MIGRAT`, `SCRTCH`, `PRIVAT`, or the wildcard `L?????`
/// (§4.5 `dasd`).
fn validate_dasd_label(id: &str, label: &str) -> Result<(), CurtinError> {
    const RESERVED: &[&str] = &["MIGRAT", "SCRTCH", "PRIVAT"];
    if label.len() != 6 || !label.is_ascii() {
        return Err(CurtinError::new(SchemaError::ContradictoryFields {
            id: id.to_string(),
            detail: format!("dasd label '{label}' must be exactly 6 ASCII characters"),
        }));
    }
    if RESERVED.contains(&label) || (label.starts_with('L') && label.len() == 6) {
        return Err(CurtinError::new(SchemaError::ContradictoryFields {
            id: id.to_string(),
            detail: format!("dasd label '{label}' is reserved"),
        }));
    }
    Ok(())
}
