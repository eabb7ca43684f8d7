//! Repositories composing the query builder, shard router and store.

pub mod links;

pub use links::LinkRepository;
