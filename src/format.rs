//! Bit-exact on-disk layout: bundle header, record header, and the
//! `Align1K` padding rule shared by the writer and the reader.
//!
//! Record headers are packed by hand into a flat byte buffer rather than
//! modeled as a `#[repr(C)]` struct, so that there is no compiler-inserted
//! alignment padding between fields — the layout below is the wire format,
//! not merely a suggestion to the compiler.

use std::convert::TryInto;

/// Size in bytes of the bundle file's leading text header.
pub const BUNDLE_HEADER_SIZE: usize = 512;

/// Fixed text that opens every bundle header, followed by a timestamp line
/// and NUL padding out to `BUNDLE_HEADER_SIZE`.
pub const BUNDLE_HEADER_PREFIX: &str = "bundle file store\n1.0\n";

/// Maximum length of the NUL-padded `url` field inside a record header.
pub const URL_SIZE: usize = 128;

/// Maximum length of the NUL-padded `user_data` field inside a record header.
pub const USER_DATA_SIZE: usize = 64;

/// `magic(4) + length(8) + version(4) + flag(4) + url(URL_SIZE) + user_data(USER_DATA_SIZE)`.
pub const FILE_HEADER_SIZE: usize = 4 + 8 + 4 + 4 + URL_SIZE + USER_DATA_SIZE;

/// Fixed magic number stamped into every record header.
pub const MAGIC: u32 = 0xB0D1_E995;

/// Record header format version. Independent of the bundle header's "1.0"
/// text version — the two are never meant to move in lockstep.
pub const VERSION: u32 = 1;

/// The only flag value a reader accepts as a live record.
pub const NORMAL: u32 = 0;

/// Rounds `x` up to the next multiple of 1024. Applied to the *total* record
/// size (header + payload), not the payload alone.
#[inline]
pub const fn align_1k(x: usize) -> usize {
    (x + 1023) / 1024 * 1024
}

/// A decoded record header, as read back from a bundle file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub magic: u32,
    pub length: u64,
    pub version: u32,
    pub flag: u32,
    pub url: [u8; URL_SIZE],
    pub user_data: [u8; USER_DATA_SIZE],
}

impl RecordHeader {
    /// Builds a live (`NORMAL`) record header for `url` and `user_data`.
    /// `user_data` is truncated to `USER_DATA_SIZE` bytes if longer.
    pub fn new(length: u64, url: &str, user_data: &[u8]) -> Self {
        let mut url_buf = [0u8; URL_SIZE];
        let url_bytes = url.as_bytes();
        let url_copy_len = url_bytes.len().min(URL_SIZE);
        url_buf[..url_copy_len].copy_from_slice(&url_bytes[..url_copy_len]);

        let mut user_data_buf = [0u8; USER_DATA_SIZE];
        let ud_copy_len = user_data.len().min(USER_DATA_SIZE);
        user_data_buf[..ud_copy_len].copy_from_slice(&user_data[..ud_copy_len]);

        RecordHeader {
            magic: MAGIC,
            length,
            version: VERSION,
            flag: NORMAL,
            url: url_buf,
            user_data: user_data_buf,
        }
    }

    /// Serializes this header into a `FILE_HEADER_SIZE`-byte array.
    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut out = [0u8; FILE_HEADER_SIZE];
        let mut pos = 0;

        out[pos..pos + 4].copy_from_slice(&self.magic.to_le_bytes());
        pos += 4;
        out[pos..pos + 8].copy_from_slice(&self.length.to_le_bytes());
        pos += 8;
        out[pos..pos + 4].copy_from_slice(&self.version.to_le_bytes());
        pos += 4;
        out[pos..pos + 4].copy_from_slice(&self.flag.to_le_bytes());
        pos += 4;
        out[pos..pos + URL_SIZE].copy_from_slice(&self.url);
        pos += URL_SIZE;
        out[pos..pos + USER_DATA_SIZE].copy_from_slice(&self.user_data);
        pos += USER_DATA_SIZE;

        debug_assert_eq!(pos, FILE_HEADER_SIZE);
        out
    }

    /// Parses a `FILE_HEADER_SIZE`-byte slice back into a `RecordHeader`.
    /// Does not itself validate magic/version/flag — callers decide what to
    /// do with a record that fails those checks.
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < FILE_HEADER_SIZE {
            return None;
        }
        let mut pos = 0;
        let magic = u32::from_le_bytes(buf[pos..pos + 4].try_into().ok()?);
        pos += 4;
        let length = u64::from_le_bytes(buf[pos..pos + 8].try_into().ok()?);
        pos += 8;
        let version = u32::from_le_bytes(buf[pos..pos + 4].try_into().ok()?);
        pos += 4;
        let flag = u32::from_le_bytes(buf[pos..pos + 4].try_into().ok()?);
        pos += 4;
        let mut url = [0u8; URL_SIZE];
        url.copy_from_slice(&buf[pos..pos + URL_SIZE]);
        pos += URL_SIZE;
        let mut user_data = [0u8; USER_DATA_SIZE];
        user_data.copy_from_slice(&buf[pos..pos + USER_DATA_SIZE]);
        pos += USER_DATA_SIZE;

        debug_assert_eq!(pos, FILE_HEADER_SIZE);
        Some(RecordHeader { magic, length, version, flag, url, user_data })
    }

    /// `true` iff this header passes the magic/version/flag checks a reader
    /// must apply before trusting `length`.
    pub fn is_valid_normal_record(&self) -> bool {
        self.magic == MAGIC && self.version == VERSION && self.flag == NORMAL
    }
}

/// Builds the NUL-padded bundle header text for a freshly created bundle
/// file: `"bundle file store\n1.0\n{yyyy-mm-dd HH:MM:SS}\n"`, padded with
/// zero bytes out to `BUNDLE_HEADER_SIZE`.
pub fn build_bundle_header(now: chrono::DateTime<chrono::Local>) -> [u8; BUNDLE_HEADER_SIZE] {
    let text = format!("{}{}\n", BUNDLE_HEADER_PREFIX, now.format("%Y-%m-%d %H:%M:%S"));
    let mut out = [0u8; BUNDLE_HEADER_SIZE];
    let bytes = text.as_bytes();
    let copy_len = bytes.len().min(BUNDLE_HEADER_SIZE);
    out[..copy_len].copy_from_slice(&bytes[..copy_len]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_1k_rounds_up_to_next_boundary() {
        assert_eq!(align_1k(0), 0);
        assert_eq!(align_1k(1), 1024);
        assert_eq!(align_1k(1024), 1024);
        assert_eq!(align_1k(1025), 2048);
    }

    #[test]
    fn record_header_round_trips() {
        let header = RecordHeader::new(9000, "fmn04/large/20110919/xyz.jpg", b"tag=foo");
        let bytes = header.to_bytes();
        let decoded = RecordHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header, decoded);
        assert!(decoded.is_valid_normal_record());
    }

    #[test]
    fn record_header_is_packed_without_gaps() {
        assert_eq!(FILE_HEADER_SIZE, 20 + URL_SIZE + USER_DATA_SIZE);
    }

    #[test]
    fn long_url_and_user_data_are_truncated_not_panicking() {
        let long_url = "a".repeat(URL_SIZE + 50);
        let long_user_data = vec![7u8; USER_DATA_SIZE + 10];
        let header = RecordHeader::new(10, &long_url, &long_user_data);
        assert_eq!(header.url.len(), URL_SIZE);
        assert_eq!(header.user_data.len(), USER_DATA_SIZE);
        assert!(header.user_data.iter().all(|&b| b == 7));
    }

    #[test]
    fn bundle_header_starts_with_fixed_text() {
        let now = chrono::Local::now();
        let header = build_bundle_header(now);
        let text = std::str::from_utf8(&header[..BUNDLE_HEADER_PREFIX.len()]).unwrap();
        assert_eq!(text, BUNDLE_HEADER_PREFIX);
    }
}
