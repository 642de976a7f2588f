//! Process-wide configuration.
//!
//! `Settings` is meant to be configured once, at process start, via
//! [`configure`]. Reading it (via [`current`]) is cheap — each caller gets a
//! `Copy` snapshot rather than holding the lock across an allocation or URL
//! operation.

use std::sync::{OnceLock, RwLock};

/// Tunable knobs shared by the allocator and the bundle-id-to-path mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Ceiling, in bytes, a bundle file must never exceed after an append.
    pub max_bundle_size: u64,
    /// Soft rotation ceiling for the allocator's `last_id` counter.
    pub bundle_count_per_day: u32,
    /// Divisor used to compute the first hex path component from a bundle id.
    pub file_count_level_1: u32,
    /// Modulus used to compute the second hex path component from a bundle id.
    pub file_count_level_2: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_bundle_size: 2 * 1024 * 1024 * 1024, // 2 GiB
            bundle_count_per_day: 20_000,
            file_count_level_1: 50,
            file_count_level_2: 4000,
        }
    }
}

fn global() -> &'static RwLock<Settings> {
    static SETTINGS: OnceLock<RwLock<Settings>> = OnceLock::new();
    SETTINGS.get_or_init(|| RwLock::new(Settings::default()))
}

/// Replaces the process-wide settings. Not safe to call while allocations
/// are in flight on another thread — configure once, at process start.
pub fn configure(settings: Settings) {
    let mut guard = global().write().expect("settings lock poisoned");
    *guard = settings;
}

/// Returns a snapshot of the current process-wide settings.
pub fn current() -> Settings {
    *global().read().expect("settings lock poisoned")
}

/// Maps a bundle id to its two-level relative path, e.g. `bid = 42` under
/// default settings becomes `"00000000/0000002a"`.
pub fn bid_to_path(bid: u32, settings: Settings) -> String {
    format!(
        "{:08x}/{:08x}",
        bid / settings.file_count_level_1,
        bid % settings.file_count_level_2
    )
}
