//! Key namespace contract for cache entries, locks and existence filters.
//!
//! These prefixes are read by out-of-process monitoring; changing them is a
//! breaking change.

use crate::link::FullShortUrl;

/// Positive entry: full short URL -> origin URL.
pub const GOTO_KEY_PREFIX: &str = "short-link:goto:";

/// Negative entry: full short URL -> absence marker. Disjoint from [`GOTO_KEY_PREFIX`].
pub const GOTO_IS_NULL_KEY_PREFIX: &str = "short-link:is-null:goto_";

/// Per-URL load-through lock.
pub const LOCK_GOTO_KEY_PREFIX: &str = "short-link:lock:goto:";

/// Per-group creation lock.
pub const LOCK_GID_CREATE_KEY_PREFIX: &str = "short-link:lock:create-gid:";

/// Per-domain existence filter.
pub const FILTER_NAME_PREFIX: &str = "short-link:filter:";

/// Value stored under negative entries.
pub const NEGATIVE_MARKER: &str = "-";

pub fn goto_key(url: &FullShortUrl) -> String {
    format!("{GOTO_KEY_PREFIX}{url}")
}

pub fn goto_is_null_key(url: &FullShortUrl) -> String {
    format!("{GOTO_IS_NULL_KEY_PREFIX}{url}")
}

pub fn goto_lock_key(url: &FullShortUrl) -> String {
    format!("{LOCK_GOTO_KEY_PREFIX}{url}")
}

pub fn create_lock_key(gid: &str) -> String {
    format!("{LOCK_GID_CREATE_KEY_PREFIX}{gid}")
}

pub fn filter_name(domain: &str) -> String {
    format!("{FILTER_NAME_PREFIX}{domain}")
}
