//! Per-listener deploy lock.
//!
//! Listener rule priorities are assigned max+1 from a read of the current
//! rules, so two concurrent deploys against the same listener can pick the
//! same priority. An exclusive file lock keyed on the listener ARN
//! serializes the networking phase for deploys run from this host. Deploys
//! from other hosts are not covered.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::error::DeployError;

/// Exclusive lock on one listener, held for the lifetime of the value.
pub struct DeployLock {
    file: File,
    path: PathBuf,
}

impl DeployLock {
    /// Take the lock for `listener_arn`, blocking until it is free.
    pub fn acquire(locks_dir: &Path, listener_arn: &str) -> Result<Self, DeployError> {
        std::fs::create_dir_all(locks_dir).map_err(|source| DeployError::Lock {
            path: locks_dir.to_path_buf(),
            source,
        })?;

        let path = locks_dir.join(format!("{}.lock", lock_name(listener_arn)));
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(|source| DeployError::Lock {
                path: path.clone(),
                source,
            })?;

        file.lock_exclusive().map_err(|source| DeployError::Lock {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), "acquired deploy lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DeployLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// Lock file name for a listener (first 16 hex chars of SHA256).
///
/// ARNs contain `/` and `:` so they cannot be used as file names directly.
fn lock_name(listener_arn: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(listener_arn.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}
