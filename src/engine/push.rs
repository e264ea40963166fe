//! FanOutWrite: push strategy. On post, enqueue the post into every
//! follower's cached timeline eagerly; reads are a pure cache lookup with
//! RelStore fallback for hydration only (spec.md §4.3).

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::data::{Operation, OperationMetrics, Post, RelStore, Strategy, TimelineCache};
use crate::error::Result;

use super::metrics_sink::MetricsSink;
use super::strategy::TimelineStrategy;

pub struct PushStrategy {
    store: Arc<RelStore>,
    cache: Arc<TimelineCache>,
    metrics: Arc<MetricsSink>,
}

impl PushStrategy {
    pub fn new(store: Arc<RelStore>, cache: Arc<TimelineCache>, metrics: Arc<MetricsSink>) -> Self {
        Self {
            store,
            cache,
            metrics,
        }
    }
}

#[async_trait]
impl TimelineStrategy for PushStrategy {
    fn name(&self) -> &'static str {
        "push"
    }

    async fn post_post(&self, uid: i64, content: &str) -> Result<(Post, OperationMetrics)> {
        let started = Instant::now();

        // Step 1: durable insert. A failure here is fatal; no cache
        // mutation is attempted.
        let mut post = self.store.create_post(uid, content).await?;

        // Step 2: best-effort author username resolution.
        if let Ok(Some(author)) = self.store.get_user_by_id(uid).await {
            post.username = author.username;
        }

        // Step 3: best-effort post-object cache.
        if let Err(error) = self.cache.cache_post(&post).await {
            tracing::warn!(%error, pid = post.id, "best-effort post-object cache failed");
        }

        // Step 4: resolve followers. A failure surfaces in metrics, not
        // as an operation failure — the post is already durable and
        // visible via pull.
        let (followers, follower_error) = match self.store.get_followers(uid).await {
            Ok(followers) => (followers, None),
            Err(error) => {
                tracing::warn!(%error, %uid, "follower resolution failed; post visible via pull only");
                (vec![], Some(error.to_string()))
            }
        };

        // Step 5: pipelined fan-out.
        let fan_out_started = Instant::now();
        if !followers.is_empty() {
            self.cache.add_to_timeline_batch(&followers, &post).await?;
        }
        let fan_out_duration = fan_out_started.elapsed();

        // Step 6: author's own timeline.
        if let Err(error) = self.cache.add_to_timeline(uid, &post).await {
            tracing::warn!(%error, %uid, pid = post.id, "author timeline insert failed");
        }

        let metrics = OperationMetrics {
            strategy: Strategy::Push,
            operation: Operation::PostPost,
            duration: started.elapsed(),
            fan_out_count: followers.len(),
            fan_out_duration: Some(fan_out_duration),
            cache_hit: false,
            error: follower_error,
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

        // Over-fetch from offset 0: the ZSET score is a lossy f64 cast of
        // a nanosecond-epoch timestamp (crate::data::models::Nanos::as_f64),
        // so posts within the same ~256ns bucket at this magnitude can tie
        // and get reordered by Redis on pid rather than true created_at.
        // Fetching only `limit` starting at `offset` risked silently
        // dropping the rightful pid past a tied boundary; over-fetching the
        // whole prefix and re-sorting/paginating in Rust (mirroring
        // hybrid.rs's merge step) restores the true order before truncating.
        let fetch_n = 2 * (limit + offset);
        let pids = self.cache.get_timeline(uid, fetch_n, 0).await?;
        let cache_hit = !pids.is_empty();

        let posts = if pids.is_empty() {
            vec![]
        } else {
            let (mut hits, missing) = self.cache.get_cached_posts(&pids).await?;
            if !missing.is_empty() {
                let fetched = self.store.get_posts_by_ids(&missing).await?;
                for post in &fetched {
                    if let Err(error) = self.cache.cache_post(post).await {
                        tracing::warn!(%error, pid = post.id, "opportunistic post cache-fill failed");
                    }
                }
                hits.extend(fetched);
            }
            hits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            hits.into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect()
        };

        let metrics = OperationMetrics {
            strategy: Strategy::Push,
            operation: Operation::GetTimeline,
            duration: started.elapsed(),
            fan_out_count: 0,
            fan_out_duration: None,
            cache_hit,
            error: None,
            recorded_at: chrono::Utc::now(),
        };
        self.metrics.append(metrics.clone());

        Ok((posts, metrics))
    }

    async fn delete_post(&self, pid: i64, uid: i64) -> Result<()> {
        let followers = match self.store.get_followers(uid).await {
            Ok(followers) => followers,
            Err(error) => {
                tracing::warn!(%error, %uid, pid, "follower lookup failed during delete; follower timelines may retain a stale entry until TTL");
                vec![]
            }
        };
        self.cache.remove_from_timeline_batch(&followers, pid).await?;
        if let Err(error) = self.cache.remove_from_timeline(uid, pid).await {
            tracing::warn!(%error, %uid, pid, "author timeline removal failed");
        }
        self.store.delete_post(pid).await?;
        Ok(())
    }

    async fn rebuild_timeline(&self, uid: i64, limit: i64) -> Result<()> {
        self.cache.clear_timeline(uid).await?;

        let mut followees = self.store.get_following(uid).await?;
        followees.push(uid);

        let posts = self
            .store
            .get_recent_by_user_ids(&followees, limit, limit)
            .await?;

        for post in &posts {
            self.cache.add_to_timeline(uid, post).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "push_test.rs"]
mod push_test;
