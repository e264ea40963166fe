//! Data layer module.
//!
//! - `relstore`: durable relational store (SQLite via `sqlx`) of users,
//!   posts, and follow-edges — RelStore per spec.md §4.1.
//! - `timeline_cache`: in-memory timeline/post-object/celebrity cache
//!   (Redis) — TimelineCache per spec.md §4.2.
//! - `models`: shared entity types for both.

mod models;
mod relstore;
mod timeline_cache;

pub use models::*;
pub use relstore::RelStore;
pub use timeline_cache::{TimelineCache, CELEBRITY_INDEX_SIZE, DEFAULT_TIMELINE_CACHE_SIZE};
