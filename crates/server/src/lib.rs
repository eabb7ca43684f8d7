//! Short link resolution pipeline and redirect server.
//!
//! This crate provides:
//! - The cache-filter-lock-store resolution pipeline ([`Resolver`])
//! - Link creation and the recycle bin ([`LinkService`])
//! - Fire-and-forget access statistics
//! - Prometheus metrics and the HTTP redirect surface

pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod links;
pub mod metrics;
pub mod resolver;
pub mod routes;
pub mod state;
pub mod stats;

pub use error::{ApiError, ResolveError, ResolveResult};
pub use links::{CreateLink, LinkService};
pub use resolver::{Resolution, ResolutionSource, Resolver, ResolverSettings};
pub use routes::create_router;
pub use state::AppState;
