//! Builds and parses self-verifying blob URLs.
//!
//! The build/extract pair is modeled as the [`UrlCodec`] trait so that
//! alternative encodings can be injected at the `Reader`/`Writer` boundary,
//! mirroring the distilled source's function-pointer polymorphism.
//! [`DefaultCodec`] is the base-62-with-hash codec this crate ships.

use crate::base62::{from_base62, from_base62_u64, to_base62, to_base62_u64};
use crate::error::UrlError;
use crate::murmur2::murmur2;
use crate::settings::{bid_to_path, Settings};

/// Builds and parses the URL format described in the crate's top-level docs.
pub trait UrlCodec {
    /// Builds the printable URL for `(bid, offset, length, prefix, postfix)`.
    fn build(&self, bid: u32, offset: u64, length: u64, prefix: &str, postfix: &str) -> String;

    /// Parses `url`, verifying its embedded hash, and returns
    /// `(bundle_name, offset, length)` on success. `bundle_name` is
    /// `prefix + "/" + bid_to_path(bid)`.
    fn extract(&self, url: &str) -> Result<(String, u64, u64), UrlError>;
}

/// The base-62-URL / hex-canonical-hash codec specified for this store.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCodec;

/// Builds the hex canonical string the hash is computed over. Note the
/// asymmetry with the base-62 URL: hex fields have no separator before
/// `postfix`, and there is no leading-zero padding.
fn canonical(prefix: &str, bid: u32, offset: u64, length: u64, postfix: &str) -> String {
    format!("{prefix}/{bid:x}/{offset:x}/{length:x}{postfix}")
}

impl UrlCodec for DefaultCodec {
    fn build(&self, bid: u32, offset: u64, length: u64, prefix: &str, postfix: &str) -> String {
        let canonical = canonical(prefix, bid, offset, length, postfix);
        let hash = murmur2(canonical.as_bytes(), 0);
        format!(
            "{prefix}/{}/{}/{}/{}{postfix}",
            to_base62(bid),
            to_base62_u64(offset),
            to_base62_u64(length),
            to_base62(hash),
        )
    }

    fn extract(&self, url: &str) -> Result<(String, u64, u64), UrlError> {
        extract_with_settings(url, crate::settings::current())
    }
}

/// Like [`DefaultCodec::extract`], but renders `bundle_name` using an
/// explicit `Settings` snapshot instead of the process-wide default. The
/// free function [`extract`] uses the live process-wide settings; this
/// exists so callers (and tests) can pin the divisor/modulus explicitly.
pub fn extract_with_settings(url: &str, settings: Settings) -> Result<(String, u64, u64), UrlError> {
    if url.is_empty() {
        return Err(UrlError::Malformed("empty url".to_string()));
    }

    let dot = url.rfind('.').ok_or_else(|| UrlError::Malformed("missing '.' separator".to_string()))?;
    let (left, postfix_body_with_dot) = url.split_at(dot);
    let postfix_body = &postfix_body_with_dot[1..]; // drop the '.'

    // Split `left` at its rightmost four '/' characters.
    let mut tokens: [&str; 4] = ["", "", "", ""];
    let mut rest = left;
    for slot in tokens.iter_mut().rev() {
        match rest.rfind('/') {
            Some(idx) => {
                *slot = &rest[idx + 1..];
                rest = &rest[..idx];
            }
            None => return Err(UrlError::Malformed("too few '/' fields".to_string())),
        }
    }
    let prefix = rest;
    let [bid_tok, offset_tok, length_tok, hash_tok] = tokens;

    let bid = from_base62(bid_tok).ok_or_else(|| UrlError::Base62(bid_tok.to_string()))?;
    let offset = from_base62_u64(offset_tok).ok_or_else(|| UrlError::Base62(offset_tok.to_string()))?;
    let length = from_base62_u64(length_tok).ok_or_else(|| UrlError::Base62(length_tok.to_string()))?;
    let hash = from_base62(hash_tok).ok_or_else(|| UrlError::Base62(hash_tok.to_string()))?;

    let postfix = format!(".{postfix_body}");
    let expected = canonical(prefix, bid, offset, length, &postfix);
    let computed_hash = murmur2(expected.as_bytes(), 0);
    if computed_hash != hash {
        return Err(UrlError::HashMismatch);
    }

    let bundle_name = format!("{prefix}/{}", bid_to_path(bid, settings));
    Ok((bundle_name, offset, length))
}

/// Builds a URL using the default codec and the live process-wide settings.
/// (`bid_to_path` only affects `extract`'s return value, so `build` needs no
/// settings snapshot.)
pub fn build(bid: u32, offset: u64, length: u64, prefix: &str, postfix: &str) -> String {
    DefaultCodec.build(bid, offset, length, prefix, postfix)
}

/// Extracts a URL using the default codec and the live process-wide
/// settings.
pub fn extract(url: &str) -> Result<(String, u64, u64), UrlError> {
    extract_with_settings(url, crate::settings::current())
}
