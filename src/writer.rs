//! The allocator and the per-record writer it hands out.
//!
//! This is the hardest subsystem in the crate: picking a bundle id is a
//! polling loop that has to cope with size caps, cross-process lock
//! contention, and id-space rotation, all while never blocking on another
//! writer's lock.

use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use rand::Rng;

use crate::error::{BundleError, Result};
use crate::format::{self, RecordHeader, BUNDLE_HEADER_SIZE, FILE_HEADER_SIZE};
use crate::lock::BundleLock;
use crate::settings::{self, Settings};
use crate::url_codec::{DefaultCodec, UrlCodec};

fn last_id_cell() -> &'static Mutex<u32> {
    static LAST_ID: OnceLock<Mutex<u32>> = OnceLock::new();
    LAST_ID.get_or_init(|| Mutex::new(std::process::id() % 10))
}

/// Allocates a writer for a new record of `length` bytes addressed under
/// `(prefix, postfix)`, using the default URL codec and the live
/// process-wide settings. `lock_dir` defaults to `{storage_root}/.lock`.
pub fn allocate(prefix: &str, postfix: &str, length: u64, storage_root: &Path, lock_dir: Option<&Path>) -> Result<Writer<DefaultCodec>> {
    Allocator::new(DefaultCodec).allocate(prefix, postfix, length, storage_root, lock_dir)
}

/// Drives the `last_id` rotation and lock/size bookkeeping described in the
/// crate's design notes. Generic over the URL codec so the embedded URL in
/// each record matches whatever builder the caller configured.
pub struct Allocator<C: UrlCodec> {
    codec: C,
}

impl<C: UrlCodec + Clone> Allocator<C> {
    pub fn new(codec: C) -> Self {
        Allocator { codec }
    }

    pub fn allocate(&self, prefix: &str, postfix: &str, length: u64, storage_root: &Path, lock_dir: Option<&Path>) -> Result<Writer<C>> {
        let prefix = prefix.trim_start_matches('/');
        let settings = settings::current();
        let lock_dir: PathBuf = lock_dir.map(Path::to_path_buf).unwrap_or_else(|| storage_root.join(".lock"));

        let mut loop_count: u32 = 0;

        loop {
            loop_count += 1;
            let mut last_id = last_id_cell().lock().expect("last_id lock poisoned");

            if loop_count > settings.bundle_count_per_day {
                let reseed = settings.bundle_count_per_day + rand::thread_rng().gen_range(0..100);
                tracing::warn!(reseed, "bundle id overflow guard tripped, reseeding last_id");
                *last_id = reseed;
            }

            let candidate = *last_id;
            let bundle_path = storage_root.join(prefix).join(settings::bid_to_path(candidate, settings));

            let stat = fs::metadata(&bundle_path);
            let existing_size = match &stat {
                Ok(meta) => Some(meta.len()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(_) => {
                    *last_id = last_id.wrapping_add(1);
                    continue;
                }
            };

            if let Some(size) = existing_size {
                let grown = size + format::align_1k(FILE_HEADER_SIZE + length as usize) as u64;
                if grown > settings.max_bundle_size {
                    tracing::debug!(bundle_id = candidate, size, "bundle file would exceed max_bundle_size, advancing");
                    *last_id = last_id.wrapping_add(1);
                    continue;
                }
            }

            if let Err(e) = fs::create_dir_all(&lock_dir) {
                return Err(BundleError::resource(format!("creating lock directory {}: {e}", lock_dir.display())));
            }

            let owned_lock = match BundleLock::try_acquire(&lock_dir, candidate)? {
                Some(lock) => lock,
                None => {
                    *last_id = last_id.wrapping_add(1);
                    continue;
                }
            };

            let offset = match existing_size {
                Some(size) => size,
                None => {
                    if let Some(parent) = bundle_path.parent() {
                        if let Err(e) = fs::create_dir_all(parent) {
                            return Err(BundleError::resource(format!("creating bundle directory {}: {e}", parent.display())));
                        }
                    }
                    match create_bundle(&bundle_path) {
                        Ok(()) => BUNDLE_HEADER_SIZE as u64,
                        Err(_) => {
                            *last_id = last_id.wrapping_add(1);
                            continue;
                        }
                    }
                }
            };

            tracing::debug!(bundle_id = candidate, offset, path = %bundle_path.display(), "allocated writer");

            return Ok(Writer {
                codec: self.codec.clone(),
                bundle_path,
                bundle_id: candidate,
                offset,
                length,
                prefix: prefix.to_string(),
                postfix: postfix.to_string(),
                lock: Some(owned_lock),
            });
        }
    }
}

fn create_bundle(path: &Path) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create_new(true).write(true).open(path)?;
    file.write_all(&format::build_bundle_header(chrono::Local::now()))?;
    Ok(())
}

/// A one-shot handle returned by [`allocate`]: exactly one record should be
/// appended through it before it is released (via `release` or `Drop`).
pub struct Writer<C: UrlCodec> {
    codec: C,
    bundle_path: PathBuf,
    bundle_id: u32,
    offset: u64,
    length: u64,
    prefix: String,
    postfix: String,
    lock: Option<BundleLock>,
}

impl<C: UrlCodec> Writer<C> {
    /// The self-describing URL this writer's record will be addressed by,
    /// once written.
    pub fn url(&self) -> String {
        self.codec.build(self.bundle_id, self.offset, self.length, &self.prefix, &self.postfix)
    }

    pub fn bundle_id(&self) -> u32 {
        self.bundle_id
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Appends `payload` (padded to K-alignment) at this writer's reserved
    /// offset, with `user_data` copied (truncated) into the record's
    /// fixed-size metadata field. Returns the number of payload bytes
    /// written.
    pub fn write(&mut self, payload: &[u8], user_data: &[u8]) -> Result<usize> {
        if payload.len() as u64 != self.length {
            return Err(BundleError::InvalidArgument(format!(
                "writer reserved {} bytes but payload is {}",
                self.length,
                payload.len()
            )));
        }

        let url = self.url();
        let header = RecordHeader::new(self.length, &url, user_data);

        let total = format::align_1k(FILE_HEADER_SIZE + payload.len());
        let mut buf = vec![0u8; total];
        buf[..FILE_HEADER_SIZE].copy_from_slice(&header.to_bytes());
        buf[FILE_HEADER_SIZE..FILE_HEADER_SIZE + payload.len()].copy_from_slice(payload);

        let mut file = OpenOptions::new().write(true).open(&self.bundle_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BundleError::not_found(self.bundle_path.clone())
            } else {
                BundleError::io(e, self.bundle_path.clone())
            }
        })?;
        use std::io::{Seek, SeekFrom};
        file.seek(SeekFrom::Start(self.offset)).map_err(|e| BundleError::io(e, self.bundle_path.clone()))?;
        file.write_all(&buf).map_err(|e| BundleError::io(e, self.bundle_path.clone()))?;

        tracing::debug!(bundle_id = self.bundle_id, offset = self.offset, len = payload.len(), "wrote record");
        Ok(payload.len())
    }

    /// Releases this writer's file lock. Idempotent; also invoked by `Drop`.
    pub fn release(&mut self) {
        if let Some(mut lock) = self.lock.take() {
            lock.release();
        }
    }
}

impl<C: UrlCodec> Drop for Writer<C> {
    fn drop(&mut self) {
        self.release();
    }
}
