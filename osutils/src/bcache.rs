use std::{path::Path, process::Command};

use anyhow::{Context, Error};

use curtin_api::config::CacheMode;

use crate::exe::RunAndCheck;

/// Registers a backing/cache device pair via `make-bcache -B <backing> -C <cache>`
/// (§4.5 `bcache`, §6 tool-protocol surface).
pub fn make_bcache(backing_device: &Path, cache_device: &Path) -> Result<(), Error> {
    Command::new("make-bcache")
        .arg("-B")
        .arg(backing_device)
        .arg("-C")
        .arg(cache_device)
        .run_and_check()
        .with_context(|| {
            format!(
                "Failed to create bcache device from backing '{}' and cache '{}'",
                backing_device.display(),
                cache_device.display()
            )
        })
}

/// Sets the cache mode of a running bcache device by writing to its sysfs
/// attribute, per §6: `echo <cache_mode> > /sys/block/bcacheN/bcache/cache_mode`.
pub fn set_cache_mode(bcache_kname: &str, mode: CacheMode) -> Result<(), Error> {
    let value = match mode {
        CacheMode::Writethrough => "writethrough",
        CacheMode::Writeback => "writeback",
        CacheMode::Writearound => "writearound",
        CacheMode::None => "none",
    };
    let attr = format!("/sys/block/{bcache_kname}/bcache/cache_mode");
    std::fs::write(&attr, value)
        .with_context(|| format!("Failed to set cache mode '{value}' via '{attr}'"))
}
