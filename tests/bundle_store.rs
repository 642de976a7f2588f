//! End-to-end scenarios exercising the public `bundlestore` API together:
//! build/extract, allocate/write/read, size-cap rotation, and concurrent
//! allocation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread;

use bundlestore::{settings::Settings, BundleError};
use tempfile::tempdir;

// `allocate`'s `last_id` counter and `Settings` are process-wide, and the
// default test harness runs these functions in parallel threads of one
// process. Every test that calls `allocate` holds this guard so one test's
// id rotation can't shift the candidate id another test is mid-sequence on.
fn serialize() -> MutexGuard<'static, ()> {
    static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
    GUARD.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|e| e.into_inner())
}

#[test]
fn s1_build_shape_and_hash() {
    let url = bundlestore::build(42, 1024, 9000, "fmn04/large/20110919", ".jpg");
    assert!(url.starts_with("fmn04/large/20110919/"));
    assert!(url.ends_with(".jpg"));

    let body = url.strip_prefix("fmn04/large/20110919/").unwrap().strip_suffix(".jpg").unwrap();
    let parts: Vec<&str> = body.split('/').collect();
    assert_eq!(parts.len(), 4);
    assert_eq!(bundlestore::base62::from_base62(parts[0]), Some(42));
    assert_eq!(bundlestore::base62::from_base62_u64(parts[1]), Some(1024));
    assert_eq!(bundlestore::base62::from_base62_u64(parts[2]), Some(9000));

    let expected_hash = bundlestore::murmur2::murmur2(b"fmn04/large/20110919/2a/400/2328.jpg", 0);
    assert_eq!(bundlestore::base62::from_base62(parts[3]), Some(expected_hash));
}

#[test]
fn s2_extract_matches_reference_under_default_settings() {
    bundlestore::configure(Settings::default());
    let url = bundlestore::build(42, 1024, 9000, "fmn04/large/20110919", ".jpg");
    let (bundle_name, offset, length) = bundlestore::extract(&url).unwrap();
    assert_eq!(bundle_name, "fmn04/large/20110919/00000000/0000002a");
    assert_eq!(offset, 1024);
    assert_eq!(length, 9000);
}

#[test]
fn s3_first_allocation_creates_bundle_with_header_then_grows() {
    let _serial = serialize();
    let dir = tempdir().unwrap();
    let payload = vec![1u8; 1000];

    let mut writer = bundlestore::allocate("p", ".bin", 1000, dir.path(), None).unwrap();
    let bundle_path = writer_bundle_path(dir.path(), &writer);
    assert_eq!(std::fs::metadata(&bundle_path).unwrap().len(), bundlestore::format::BUNDLE_HEADER_SIZE as u64);

    writer.write(&payload, b"").unwrap();
    let expected = bundlestore::format::BUNDLE_HEADER_SIZE as u64
        + bundlestore::format::align_1k(bundlestore::format::FILE_HEADER_SIZE + payload.len()) as u64;
    assert_eq!(std::fs::metadata(&bundle_path).unwrap().len(), expected);
}

#[test]
fn s4_second_allocation_continues_from_the_first() {
    let _serial = serialize();
    let dir = tempdir().unwrap();
    let payload = vec![2u8; 1000];

    let mut first = bundlestore::allocate("p", ".bin", 1000, dir.path(), None).unwrap();
    first.write(&payload, b"").unwrap();
    let bundle_path = writer_bundle_path(dir.path(), &first);
    let size_after_first = std::fs::metadata(&bundle_path).unwrap().len();
    drop(first);

    let second = bundlestore::allocate("p", ".bin", 1000, dir.path(), None).unwrap();
    assert_eq!(second.offset(), size_after_first);
}

#[test]
fn s5_concurrent_allocation_from_two_threads_gets_distinct_ids() {
    let _serial = serialize();
    let dir = Arc::new(tempdir().unwrap());
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let dir = Arc::clone(&dir);
            thread::spawn(move || bundlestore::allocate("shared", ".d", 16, dir.path(), None).unwrap().bundle_id())
        })
        .collect();
    let ids: HashSet<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids.len(), 2, "two concurrent allocations should not collide on a bundle id");
}

#[test]
fn s6_tampered_hash_fails_without_touching_the_filesystem() {
    bundlestore::configure(Settings::default());
    let url = bundlestore::build(42, 1024, 9000, "fmn04/large/20110919", ".jpg");
    let dot = url.rfind('.').unwrap();
    let hash_start = url[..dot].rfind('/').unwrap() + 1;
    let hash_tok = &url[hash_start..dot];
    let decoded = bundlestore::base62::from_base62(hash_tok).unwrap();
    let tampered_hash = bundlestore::base62::to_base62(decoded.wrapping_add(1));
    let tampered_url = format!("{}{}{}", &url[..hash_start], tampered_hash, &url[dot..]);

    let nonexistent_root = std::path::Path::new("/nonexistent-root-for-s6-test");
    let err = bundlestore::read(&tampered_url, nonexistent_root).unwrap_err();
    assert!(matches!(err, BundleError::UrlDecode(_)));
}

#[test]
fn write_then_read_round_trip_preserves_payload_and_user_data() {
    let _serial = serialize();
    let dir = tempdir().unwrap();
    let payload = b"round trip payload";
    let user_data = b"meta=yes";

    let mut writer = bundlestore::allocate("media/thumbs", ".png", payload.len() as u64, dir.path(), None).unwrap();
    let url = writer.url();
    writer.write(payload, user_data).unwrap();
    writer.release();

    let blob = bundlestore::read(&url, dir.path()).unwrap();
    assert_eq!(blob.payload, payload);
    assert_eq!(&blob.user_data[..user_data.len()], user_data);
}

#[test]
fn read_into_shorter_buffer_truncates_the_payload() {
    let _serial = serialize();
    let dir = tempdir().unwrap();
    let payload = b"0123456789abcdef";

    let mut writer = bundlestore::allocate("trunc", ".bin", payload.len() as u64, dir.path(), None).unwrap();
    let url = writer.url();
    writer.write(payload, b"").unwrap();
    writer.release();

    let mut buf = [0u8; 5];
    let (filled, _) = bundlestore::read_into(&url, dir.path(), &mut buf).unwrap();
    assert_eq!(filled, 5);
    assert_eq!(&buf, b"01234");
}

/// Recovers the bundle file path a `Writer` targets, for assertions that
/// need to stat the file directly rather than go back through a URL.
fn writer_bundle_path(storage_root: &std::path::Path, writer: &bundlestore::Writer<bundlestore::url_codec::DefaultCodec>) -> std::path::PathBuf {
    let settings = Settings::default();
    storage_root.join("p").join(bundlestore::settings::bid_to_path(writer.bundle_id(), settings))
}

/// The library only emits `tracing` events; it never installs a subscriber.
/// This confirms a caller-installed subscriber observes a normal
/// allocate/write/read cycle without the library panicking or deadlocking
/// around the logging calls.
#[test]
fn allocate_write_read_succeeds_with_a_tracing_subscriber_installed() {
    let _serial = serialize();
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let dir = tempdir().unwrap();
    let payload = b"observed";
    let mut writer = bundlestore::allocate("observed", ".bin", payload.len() as u64, dir.path(), None).unwrap();
    let url = writer.url();
    writer.write(payload, b"").unwrap();
    writer.release();

    let blob = bundlestore::read(&url, dir.path()).unwrap();
    assert_eq!(blob.payload, payload);
}
