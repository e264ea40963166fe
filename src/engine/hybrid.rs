//! Hybrid: push for non-celebrity authors, pull/merge-on-read for
//! celebrities (spec.md §4.5). The celebrity threshold is a live-mutable
//! scalar shared with `EngineContext`; every call re-reads it, so a
//! threshold change takes effect on the next operation without a
//! restart and without retroactively rewriting already-cached entries.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::data::{Operation, OperationMetrics, Post, RelStore, Strategy, TimelineCache, User};
use crate::error::Result;

use super::metrics_sink::MetricsSink;
use super::strategy::TimelineStrategy;

const CELEBRITY_PER_USER_LIMIT: i64 = 20;
const AUGMENT_PER_USER_LIMIT: i64 = 10;

pub struct HybridStrategy {
    store: Arc<RelStore>,
    cache: Arc<TimelineCache>,
    metrics: Arc<MetricsSink>,
    celebrity_threshold: Arc<AtomicI64>,
}

impl HybridStrategy {
    pub fn new(
        store: Arc<RelStore>,
        cache: Arc<TimelineCache>,
        metrics: Arc<MetricsSink>,
        celebrity_threshold: Arc<AtomicI64>,
    ) -> Self {
        Self {
            store,
            cache,
            metrics,
            celebrity_threshold,
        }
    }

    fn is_celebrity(&self, user: &User) -> bool {
        user.follower_count >= self.celebrity_threshold.load(Ordering::Relaxed)
    }

    fn threshold(&self) -> i64 {
        self.celebrity_threshold.load(Ordering::Relaxed)
    }
}

fn dedup_sorted(mut posts: Vec<Post>) -> Vec<Post> {
    let mut seen = HashSet::with_capacity(posts.len());
    posts.retain(|post| seen.insert(post.id));
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    posts
}

#[async_trait]
impl TimelineStrategy for HybridStrategy {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    async fn post_post(&self, uid: i64, content: &str) -> Result<(Post, OperationMetrics)> {
        let started = Instant::now();

        // Step 1: durable insert.
        let mut post = self.store.create_post(uid, content).await?;

        // Step 2: resolve author; fatal for this op if it fails, since
        // the celebrity/non-celebrity branch depends on it.
        let author = self
            .store
            .get_user_by_id(uid)
            .await?
            .ok_or(crate::error::AppError::NotFound)?;
        post.username = author.username.clone();

        // Step 3: best-effort post-object cache.
        if let Err(error) = self.cache.cache_post(&post).await {
            tracing::warn!(%error, pid = post.id, "best-effort post-object cache failed");
        }

        // Step 4: branch on classification at the moment of the call.
        let (fan_out_count, fan_out_duration) = if self.is_celebrity(&author) {
            self.cache.cache_celebrity_post(uid, &post).await?;
            (0, None)
        } else {
            let followers = self.store.get_followers(uid).await.unwrap_or_default();
            let fan_out_started = Instant::now();
            if !followers.is_empty() {
                self.cache.add_to_timeline_batch(&followers, &post).await?;
            }
            (followers.len(), Some(fan_out_started.elapsed()))
        };

        // Step 5: author's own view always receives the post.
        if let Err(error) = self.cache.add_to_timeline(uid, &post).await {
            tracing::warn!(%error, %uid, pid = post.id, "author timeline insert failed");
        }

        let metrics = OperationMetrics {
            strategy: Strategy::Hybrid,
            operation: Operation::PostPost,
            duration: started.elapsed(),
            fan_out_count,
            fan_out_duration,
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

        // Step 1: over-fetch the push-side cache to survive merge
        // truncation below.
        let cached_pids = self.cache.get_timeline(uid, 2 * limit, 0).await?;
        let cache_hit = !cached_pids.is_empty();

        // Step 2: hydrate, filling misses from RelStore.
        let mut push_side = if cached_pids.is_empty() {
            vec![]
        } else {
            let (mut hits, missing) = self.cache.get_cached_posts(&cached_pids).await?;
            if !missing.is_empty() {
                hits.extend(self.store.get_posts_by_ids(&missing).await?);
            }
            hits
        };

        // Step 3/4: followed celebrities, their recent pids, hydrated.
        let threshold = self.threshold();
        let celebs = self.store.get_following_celebrities(uid, threshold).await?;
        let celeb_ids: Vec<i64> = celebs.iter().map(|u| u.id).collect();

        let celeb_pids = self
            .cache
            .get_celebrity_posts_batch(&celeb_ids, CELEBRITY_PER_USER_LIMIT)
            .await?;
        let (mut celeb_posts, missing) = if celeb_pids.is_empty() {
            (vec![], vec![])
        } else {
            self.cache.get_cached_posts(&celeb_pids).await?
        };
        if !missing.is_empty() {
            celeb_posts.extend(self.store.get_posts_by_ids(&missing).await?);
        }

        // Step 5: augment if the celebrity cache under-delivered.
        if !celeb_ids.is_empty() && celeb_posts.len() < 5 * celeb_ids.len() {
            let augmented = self
                .store
                .get_recent_by_user_ids(&celeb_ids, AUGMENT_PER_USER_LIMIT, limit)
                .await?;
            celeb_posts.extend(augmented);
        }

        // Step 6: merge, dedup, sort.
        push_side.append(&mut celeb_posts);
        let merged = dedup_sorted(push_side);

        // Step 7: paginate, cache the hydrated page.
        let paged: Vec<Post> = merged
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
            strategy: Strategy::Hybrid,
            operation: Operation::GetTimeline,
            duration: started.elapsed(),
            fan_out_count: celeb_ids.len(),
            fan_out_duration: None,
            cache_hit,
            error: None,
            recorded_at: chrono::Utc::now(),
        };
        self.metrics.append(metrics.clone());

        Ok((paged, metrics))
    }

    async fn delete_post(&self, pid: i64, uid: i64) -> Result<()> {
        let author = self.store.get_user_by_id(uid).await?;
        let is_celebrity = author
            .as_ref()
            .map(|u| self.is_celebrity(u))
            .unwrap_or(false);

        if is_celebrity {
            self.store.delete_post(pid).await?;
            // Documented lossy behavior: the pid can linger in the
            // celebrity index briefly past this point, until the next
            // trim or the 7-day TTL. Hydration at read time drops it
            // once RelStore no longer has the row.
            if let Err(error) = self.cache.remove_from_celebrity_index(uid, pid).await {
                tracing::warn!(%error, %uid, pid, "celebrity index removal failed");
            }
        } else {
            let followers = match self.store.get_followers(uid).await {
                Ok(followers) => followers,
                Err(error) => {
                    tracing::warn!(%error, %uid, pid, "follower lookup failed during delete; follower timelines may retain a stale entry until TTL");
                    vec![]
                }
            };
            self.cache.remove_from_timeline_batch(&followers, pid).await?;
            self.store.delete_post(pid).await?;
        }

        if let Err(error) = self.cache.remove_from_timeline(uid, pid).await {
            tracing::warn!(%error, %uid, pid, "author timeline removal failed");
        }
        Ok(())
    }

    async fn rebuild_timeline(&self, uid: i64, limit: i64) -> Result<()> {
        self.cache.clear_timeline(uid).await?;

        let threshold = self.threshold();
        let mut followees = self.store.get_following_non_celebrities(uid, threshold).await?;
        if let Some(user) = self.store.get_user_by_id(uid).await? {
            if !self.is_celebrity(&user) {
                followees.push(uid);
            }
        }

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
#[path = "hybrid_test.rs"]
mod hybrid_test;
