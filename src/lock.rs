//! Advisory, per-bundle-id cross-process mutual exclusion.
//!
//! Backed by [`fs2::FileExt`] rather than hand-rolled `flock`/`LockFileEx`
//! FFI: one file per bundle id under the lock directory, non-blocking
//! try-lock only, released on `Drop` or process death.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use fs2::FileExt;

use crate::error::{BundleError, Result};

/// An acquired, exclusive, non-blocking advisory lock on one bundle id's
/// lock file. Dropping it (or calling [`BundleLock::release`] explicitly)
/// releases the lock.
pub struct BundleLock {
    file: Option<File>,
}

impl BundleLock {
    /// Attempts to acquire the lock keyed by `{lock_dir}/{bundle_id}`.
    /// Returns `Ok(None)` on contention (lock already held elsewhere) so the
    /// allocator can advance to the next candidate id without treating
    /// contention as an error.
    pub fn try_acquire(lock_dir: &Path, bundle_id: u32) -> Result<Option<BundleLock>> {
        let lock_path = lock_dir.join(bundle_id.to_string());
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| BundleError::io(e, lock_path.clone()))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!(bundle_id, path = %lock_path.display(), "acquired bundle lock");
                Ok(Some(BundleLock { file: Some(file) }))
            }
            Err(e) if is_contended(&e) => {
                tracing::debug!(bundle_id, "bundle lock contended, advancing candidate");
                Ok(None)
            }
            Err(e) => Err(BundleError::io(e, lock_path)),
        }
    }

    /// Releases the lock. Idempotent — calling it more than once, or
    /// letting `Drop` run afterward, is a no-op.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

/// `fs2` signals a contended non-blocking lock as an I/O error rather than a
/// boolean; on Unix that's `WouldBlock`, but some platforms report it as
/// `Other`, so contention is disambiguated by raw OS error code as well.
fn is_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    #[cfg(unix)]
    {
        matches!(err.raw_os_error(), Some(libc::EWOULDBLOCK) | Some(libc::EAGAIN))
    }
    #[cfg(not(unix))]
    {
        false
    }
}

impl Drop for BundleLock {
    fn drop(&mut self) {
        self.release();
    }
}
