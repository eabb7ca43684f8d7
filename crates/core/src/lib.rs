//! Core domain types and shared logic for the shortlink resolver.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Full short URLs, short identifiers and identifier generation
//! - Link validity, enable status and redirect eligibility
//! - The cache/lock/filter key namespace contract
//! - Configuration shared by the store, cache and server crates

pub mod config;
pub mod error;
pub mod keys;
pub mod link;
pub mod short_uri;

pub use error::{Error, Result};
pub use link::{EnableStatus, Eligibility, FullShortUrl, ShortLink, ValidityMode};
pub use short_uri::{MAX_GENERATE_ATTEMPTS, SHORT_URI_LEN};
