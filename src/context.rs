use std::env;
use std::path::PathBuf;

use curtin_api::error::{CurtinError, EnvironmentError};

/// Process environment threaded through the storage engine (§6 "External
/// interfaces"). Built once at startup; every env var is required except
/// `OUTPUT_NETWORK_CONFIG` and `CURTIN_REPORT_STACK_PREFIX`.
pub struct EngineContext {
    pub target_mount_point: PathBuf,
    pub working_dir: PathBuf,
    pub config_path: PathBuf,
    pub output_fstab: PathBuf,
    pub output_network_config: Option<PathBuf>,
    pub report_stack_prefix: Option<String>,
}

impl EngineContext {
    pub fn from_env() -> Result<Self, CurtinError> {
        let target_mount_point = PathBuf::from(required_var("TARGET_MOUNT_POINT")?);
        if !target_mount_point.is_dir() {
            return Err(CurtinError::new(EnvironmentError::InvalidTargetMountPoint(
                target_mount_point.display().to_string(),
            )));
        }

        Ok(EngineContext {
            target_mount_point,
            working_dir: PathBuf::from(required_var("WORKING_DIR")?),
            config_path: PathBuf::from(required_var("CONFIG")?),
            output_fstab: PathBuf::from(required_var("OUTPUT_FSTAB")?),
            output_network_config: env::var("OUTPUT_NETWORK_CONFIG").ok().map(PathBuf::from),
            report_stack_prefix: env::var("CURTIN_REPORT_STACK_PREFIX").ok(),
        })
    }
}

impl EngineContext {
    /// Writes `<prefix>/<stage>` to stderr when `CURTIN_REPORT_STACK_PREFIX`
    /// is set (§6, §10.3). A deliberately small analogue of full remote
    /// progress reporting, which is out of scope here.
    pub fn report_stage(&self, stage: &str) {
        if let Some(prefix) = &self.report_stack_prefix {
            eprintln!("{prefix}/{stage}");
        }
    }
}

fn required_var(name: &'static str) -> Result<String, CurtinError> {
    env::var(name).map_err(|_| CurtinError::new(EnvironmentError::MissingVariable(name)))
}
