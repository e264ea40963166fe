//! `TimelineStrategy`: the one interface the three fan-out strategies
//! implement (spec.md §9 "Strategy polymorphism"). No inheritance;
//! construction wires in RelStore + TimelineCache + MetricsSink (and, for
//! Hybrid, the live threshold accessor).

use async_trait::async_trait;

use crate::data::{OperationMetrics, Post};
use crate::error::Result;

#[async_trait]
pub trait TimelineStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the durable post plus the metrics describing this call,
    /// per spec.md §6's `PostPost -> (post, metrics)`. The same record is
    /// also appended to the engine's shared `MetricsSink`.
    async fn post_post(&self, uid: i64, content: &str) -> Result<(Post, OperationMetrics)>;

    /// Returns the assembled timeline plus this call's metrics, per
    /// spec.md §6's `GetTimeline -> ([]post, metrics)`.
    async fn get_timeline(
        &self,
        uid: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Post>, OperationMetrics)>;

    async fn delete_post(&self, pid: i64, uid: i64) -> Result<()>;

    /// Admin operation: repopulate the push-side cache for `uid` from
    /// durable storage. Hybrid's celebrity content remains merge-on-read
    /// and is not affected.
    async fn rebuild_timeline(&self, uid: i64, limit: i64) -> Result<()>;
}
