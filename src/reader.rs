//! URL-level reads.
//!
//! A `Reader` has no mutable state and takes no lock: records are immutable
//! once written, so reading one is just "parse the URL, open, seek, verify,
//! copy".

use std::fs::File;
use std::io::{Read as _, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{BundleError, Result};
use crate::format::{RecordHeader, FILE_HEADER_SIZE, USER_DATA_SIZE};
use crate::url_codec::{extract_with_settings, DefaultCodec, UrlCodec};

/// The payload and user-data metadata recovered from a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBlob {
    pub payload: Vec<u8>,
    pub user_data: [u8; USER_DATA_SIZE],
}

/// Reads a URL using the default codec and the live process-wide settings,
/// returning the full stored payload.
pub fn read(url: &str, storage_root: &Path) -> Result<ReadBlob> {
    Reader::new(DefaultCodec).read(url, storage_root)
}

/// Reads a URL into a caller-supplied buffer. Passing a buffer shorter than
/// the stored length truncates the payload; passing one longer than it is
/// fine, only `min(requested_length, buf.len())` bytes are filled and
/// returned.
pub fn read_into(url: &str, storage_root: &Path, buf: &mut [u8]) -> Result<(usize, [u8; USER_DATA_SIZE])> {
    Reader::new(DefaultCodec).read_into(url, storage_root, buf)
}

/// Reads records addressed by URLs built with codec `C`. `DefaultCodec` is
/// the only codec this crate ships; the type parameter exists so callers can
/// plug in an alternative build/extract pair without forking the reader.
pub struct Reader<C: UrlCodec> {
    codec: C,
}

impl<C: UrlCodec> Reader<C> {
    pub fn new(codec: C) -> Self {
        Reader { codec }
    }

    /// Reads the full stored payload addressed by `url`.
    pub fn read(&self, url: &str, storage_root: &Path) -> Result<ReadBlob> {
        reject_empty(url)?;
        let (bundle_name, offset, length) = self.codec.extract(url)?;
        let mut buf = vec![0u8; usize::try_from(length).unwrap_or(usize::MAX)];
        let (filled, user_data) = self.read_record_into(&bundle_name, offset, length, storage_root, &mut buf)?;
        buf.truncate(filled);
        Ok(ReadBlob { payload: buf, user_data })
    }

    /// Reads into `buf`, truncating the payload to `buf.len()` if shorter
    /// than the record's stored length. Returns the number of bytes copied
    /// into `buf` and the record's user-data field.
    pub fn read_into(&self, url: &str, storage_root: &Path, buf: &mut [u8]) -> Result<(usize, [u8; USER_DATA_SIZE])> {
        reject_empty(url)?;
        let (bundle_name, offset, length) = self.codec.extract(url)?;
        self.read_record_into(&bundle_name, offset, length, storage_root, buf)
    }

    fn read_record_into(
        &self,
        bundle_name: &str,
        offset: u64,
        length: u64,
        storage_root: &Path,
        buf: &mut [u8],
    ) -> Result<(usize, [u8; USER_DATA_SIZE])> {
        // `bundle_name` is `prefix + "/" + bid_to_path(bid)`, which carries a
        // leading '/' when `prefix` is empty; `Path::join` treats a leading
        // '/' as absolute on Unix and would otherwise discard `storage_root`.
        let bundle_path: PathBuf = storage_root.join(bundle_name.trim_start_matches('/'));

        let mut file = File::open(&bundle_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BundleError::not_found(bundle_path.clone())
            } else {
                BundleError::io(e, bundle_path.clone())
            }
        })?;

        file.seek(SeekFrom::Start(offset)).map_err(|e| BundleError::io(e, bundle_path.clone()))?;

        let mut header_buf = [0u8; FILE_HEADER_SIZE];
        file.read_exact(&mut header_buf).map_err(|e| BundleError::io(e, bundle_path.clone()))?;
        let header = RecordHeader::from_bytes(&header_buf).ok_or_else(|| {
            BundleError::io(
                std::io::Error::new(std::io::ErrorKind::InvalidData, "truncated record header"),
                bundle_path.clone(),
            )
        })?;

        if !header.is_valid_normal_record() {
            tracing::warn!(path = %bundle_path.display(), offset, "record header failed validation");
            return Err(BundleError::io(
                std::io::Error::new(std::io::ErrorKind::InvalidData, "bad magic, version, or flag"),
                bundle_path,
            ));
        }
        if header.length < length {
            return Err(BundleError::io(
                std::io::Error::new(std::io::ErrorKind::InvalidData, "stored length shorter than requested"),
                bundle_path,
            ));
        }

        let want = usize::try_from(length).unwrap_or(usize::MAX).min(buf.len());
        file.read_exact(&mut buf[..want]).map_err(|e| BundleError::io(e, bundle_path.clone()))?;

        tracing::debug!(path = %bundle_path.display(), offset, length, "read record");
        Ok((want, header.user_data))
    }
}

/// A null/empty URL is an invalid-argument error at the API boundary, kept
/// distinct from the decode failures the extractor itself reports — an empty
/// string never reaches the extractor's own (redundant) empty check.
fn reject_empty(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(BundleError::InvalidArgument("empty url".to_string()));
    }
    Ok(())
}

/// Like [`read`], but renders `bundle_name` using an explicit `Settings`
/// snapshot instead of the process-wide default — mirrors
/// [`crate::url_codec::extract_with_settings`].
pub fn read_with_settings(url: &str, storage_root: &Path, settings: crate::settings::Settings) -> Result<ReadBlob> {
    reject_empty(url)?;
    let (bundle_name, offset, length) = extract_with_settings(url, settings)?;
    let mut buf = vec![0u8; usize::try_from(length).unwrap_or(usize::MAX)];
    let (filled, user_data) =
        Reader::new(DefaultCodec).read_record_into(&bundle_name, offset, length, storage_root, &mut buf)?;
    buf.truncate(filled);
    Ok(ReadBlob { payload: buf, user_data })
}
