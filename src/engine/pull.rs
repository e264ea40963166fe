//! FanOutRead: pull strategy. Writes never touch follower caches; reads
//! assemble the timeline by querying followed authors' posts directly
//! (spec.md §4.4).

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::data::{Operation, OperationMetrics, Post, RelStore, Strategy, TimelineCache};
use crate::error::Result;

use super::metrics_sink::MetricsSink;
use super::strategy::TimelineStrategy;

const PER_USER_LIMIT: i64 = 10;

pub struct PullStrategy {
    store: Arc<RelStore>,
    cache: Arc<TimelineCache>,
    metrics: Arc<MetricsSink>,
}

impl PullStrategy {
    pub fn new(store: Arc<RelStore>, cache: Arc<TimelineCache>, metrics: Arc<MetricsSink>) -> Self {
        Self {
            store,
            cache,
            metrics,
        }
    }
}

#[async_trait]
impl TimelineStrategy for PullStrategy {
    fn name(&self) -> &'static str {
        "pull"
    }

    async fn post_post(&self, uid: i64, content: &str) -> Result<(Post, OperationMetrics)> {
        let started = Instant::now();

        let mut post = self.store.create_post(uid, content).await?;
        if let Ok(Some(author)) = self.store.get_user_by_id(uid).await {
            post.username = author.username;
        }
        if let Err(error) = self.cache.cache_post(&post).await {
            tracing::warn!(%error, pid = post.id, "best-effort post-object cache failed");
        }

        let metrics = OperationMetrics {
            strategy: Strategy::Pull,
            operation: Operation::PostPost,
            duration: started.elapsed(),
            fan_out_count: 0,
            fan_out_duration: None,
            cache_hit: false,
            error: None,
            recorded_at: chrono::Utc::now(),
        };
        self.metrics.append(metrics.clone());

        Ok((post, metrics))
    }

    async fn get_timeline(
        &self,
        uid: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Post>, OperationMetrics)> {
        let started = Instant::now();

        let mut followees = self.store.get_following(uid).await?;
        followees.push(uid);

        let total_limit = limit + offset;
        let mut posts = match self
            .store
            .get_recent_by_user_ids(&followees, PER_USER_LIMIT, total_limit)
            .await
        {
            Ok(posts) => posts,
            Err(error) => {
                tracing::warn!(%error, %uid, "recent-by-user-ids failed; falling back to plain by-user-ids query");
                self.store
                    .get_posts_by_user_ids(&followees, total_limit)
                    .await?
            }
        };

        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let paged: Vec<Post> = posts
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();

        for post in &paged {
            if let Err(error) = self.cache.cache_post(post).await {
                tracing::warn!(%error, pid = post.id, "opportunistic post cache-fill failed");
            }
        }

        let metrics = OperationMetrics {
            strategy: Strategy::Pull,
            operation: Operation::GetTimeline,
            duration: started.elapsed(),
            fan_out_count: followees.len(),
            fan_out_duration: None,
            cache_hit: false,
            error: None,
            recorded_at: chrono::Utc::now(),
        };
        self.metrics.append(metrics.clone());

        Ok((paged, metrics))
    }

    async fn delete_post(&self, pid: i64, _uid: i64) -> Result<()> {
        self.store.delete_post(pid).await?;
        Ok(())
    }

    async fn rebuild_timeline(&self, _uid: i64, _limit: i64) -> Result<()> {
        // Pull has no push-side cache to rebuild: every read re-assembles
        // the timeline from RelStore.
        Ok(())
    }
}

#[cfg(test)]
#[path = "pull_test.rs"]
mod pull_test;
