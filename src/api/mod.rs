//! API layer
//!
//! HTTP handlers for:
//! - The engine's thin JSON surface (posts, timelines, live config, engine metrics)
//! - Prometheus metrics

pub mod engine;
pub mod metrics;

pub use engine::engine_router;
pub use metrics::metrics_router;
