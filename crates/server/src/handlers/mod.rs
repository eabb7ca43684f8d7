//! HTTP request handlers.

pub mod health;
pub mod redirect;

pub use health::*;
pub use redirect::*;
