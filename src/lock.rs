use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

use curtin_api::constants::{
    DEFAULT_LOCK_PATH, STORAGE_LOCK_POLL_INTERVAL_MILLIS, STORAGE_LOCK_TIMEOUT_SECS,
};
use curtin_api::error::{CurtinError, EnvironmentError};

/// Best-effort host-wide lock at [`DEFAULT_LOCK_PATH`] preventing two engine
/// instances from mutating block devices concurrently (§5). The engine is
/// single-threaded; this only guards against a second process.
pub struct StorageLock {
    file: std::fs::File,
}

impl StorageLock {
    /// Blocks, polling every [`STORAGE_LOCK_POLL_INTERVAL_MILLIS`], until the
    /// lock is free or [`STORAGE_LOCK_TIMEOUT_SECS`] elapses (§5). A timeout
    /// is an environment failure, not an execution one: the host is busy,
    /// nothing about the plan itself is wrong.
    pub fn acquire() -> Result<Self, CurtinError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(DEFAULT_LOCK_PATH)
            .map_err(|_| CurtinError::new(EnvironmentError::LockContended(DEFAULT_LOCK_PATH)))?;

        let deadline = Instant::now() + Duration::from_secs(STORAGE_LOCK_TIMEOUT_SECS);
        let poll_interval = Duration::from_millis(STORAGE_LOCK_POLL_INTERVAL_MILLIS);

        loop {
            let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if result == 0 {
                return Ok(StorageLock { file });
            }

            if Instant::now() >= deadline {
                return Err(CurtinError::new(EnvironmentError::LockContended(
                    DEFAULT_LOCK_PATH,
                )));
            }

            std::thread::sleep(poll_interval);
        }
    }
}

impl Drop for StorageLock {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}
