//! In-process backends.

pub mod bloom;
pub mod lease;
pub mod memory;
