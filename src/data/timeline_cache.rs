//! TimelineCache: in-memory per-user timeline, per-post object cache, and
//! per-celebrity recent-post index (spec.md §4.2).
//!
//! Keys are namespaced strings (`timeline:{uid}`, `post:{pid}`,
//! `celebrity:posts:{uid}`). The two ordered namespaces are Redis sorted
//! sets scored by `created_at` nanoseconds; the object cache is plain
//! `SET`/`MGET` of a JSON blob. Every mutating sequence (insert, trim,
//! TTL refresh) is issued as a single pipelined round-trip, mirroring the
//! `redis::pipe()` batching in this codebase's reference cache modules —
//! per-follower round trips are forbidden in the hot fan-out path.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::models::Post;
use crate::error::Result;

/// Default retention for a per-user cached timeline (spec.md §3 invariant 2).
pub const DEFAULT_TIMELINE_CACHE_SIZE: i64 = 800;
/// Bound on the per-celebrity recent-post index (spec.md §3).
pub const CELEBRITY_INDEX_SIZE: i64 = 100;

const TIMELINE_TTL_SECS: i64 = 7 * 24 * 60 * 60;
const POST_TTL_SECS: i64 = 24 * 60 * 60;
const CELEBRITY_TTL_SECS: i64 = 7 * 24 * 60 * 60;

fn timeline_key(uid: i64) -> String {
    format!("timeline:{uid}")
}

fn post_key(pid: i64) -> String {
    format!("post:{pid}")
}

fn celebrity_key(uid: i64) -> String {
    format!("celebrity:posts:{uid}")
}

/// In-memory timeline cache, reached through a single process-wide,
/// auto-reconnecting, cheaply cloneable `ConnectionManager`.
#[derive(Clone)]
pub struct TimelineCache {
    conn: ConnectionManager,
    /// Shared with `EngineContext` so `SetConfig(cache_size)` takes effect
    /// on the next trim without reconnecting or restarting.
    cache_size: Arc<AtomicI64>,
}

impl TimelineCache {
    pub async fn connect(redis_url: &str, cache_size: Arc<AtomicI64>) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn, cache_size })
    }

    #[cfg(test)]
    pub fn with_connection(conn: ConnectionManager, cache_size: i64) -> Self {
        Self {
            conn,
            cache_size: Arc::new(AtomicI64::new(cache_size)),
        }
    }

    // ---- Timeline (per-user, bounded, ordered) -------------------------

    /// Insert `post` into `uid`'s cached timeline, trim to `cache_size`
    /// newest entries, refresh TTL — one pipelined round trip.
    pub async fn add_to_timeline(&self, uid: i64, post: &Post) -> Result<()> {
        let key = timeline_key(uid);
        let cache_size = self.cache_size.load(Ordering::Relaxed);
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .zadd(&key, post.id, post.created_at.as_f64())
            .zremrangebyrank(&key, 0, -(cache_size + 1))
            .expire(&key, TIMELINE_TTL_SECS)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    /// The same sequence for each target `uid`, batched into one pipeline.
    /// Ordering across `uids` is irrelevant; the whole batch either
    /// succeeds or is logged and dropped — durability already lives in
    /// RelStore, so a partial cache failure here is never fatal.
    pub async fn add_to_timeline_batch(&self, uids: &[i64], post: &Post) -> Result<()> {
        if uids.is_empty() {
            return Ok(());
        }

        let cache_size = self.cache_size.load(Ordering::Relaxed);
        let mut pipe = redis::pipe();
        pipe.atomic();
        for &uid in uids {
            let key = timeline_key(uid);
            pipe.zadd(&key, post.id, post.created_at.as_f64())
                .ignore()
                .zremrangebyrank(&key, 0, -(cache_size + 1))
                .ignore()
                .expire(&key, TIMELINE_TTL_SECS)
                .ignore();
        }

        let mut conn = self.conn.clone();
        if let Err(error) = pipe.query_async::<_, ()>(&mut conn).await {
            tracing::warn!(%error, followers = uids.len(), "timeline fan-out batch failed; post remains durable and visible via pull");
        }
        Ok(())
    }

    /// At most `limit` pids in descending score order, starting at `offset`.
    /// Returns an empty vector (not an error) when the key is absent.
    pub async fn get_timeline(&self, uid: i64, limit: i64, offset: i64) -> Result<Vec<i64>> {
        if limit <= 0 {
            return Ok(vec![]);
        }
        let mut conn = self.conn.clone();
        let stop = offset + limit - 1;
        let pids: Vec<i64> = conn
            .zrevrange(timeline_key(uid), offset as isize, stop as isize)
            .await?;
        Ok(pids)
    }

    pub async fn get_timeline_size(&self, uid: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        Ok(conn.zcard(timeline_key(uid)).await?)
    }

    pub async fn remove_from_timeline(&self, uid: i64, pid: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.zrem(timeline_key(uid), pid).await?;
        Ok(())
    }

    pub async fn remove_from_timeline_batch(&self, uids: &[i64], pid: i64) -> Result<()> {
        if uids.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for &uid in uids {
            pipe.zrem(timeline_key(uid), pid).ignore();
        }
        let mut conn = self.conn.clone();
        if let Err(error) = pipe.query_async::<_, ()>(&mut conn).await {
            tracing::warn!(%error, followers = uids.len(), "timeline removal batch failed");
        }
        Ok(())
    }

    pub async fn clear_timeline(&self, uid: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del(timeline_key(uid)).await?;
        Ok(())
    }

    pub async fn timeline_exists(&self, uid: i64) -> Result<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(timeline_key(uid)).await?)
    }

    // ---- Post object cache ---------------------------------------------

    pub async fn cache_post(&self, post: &Post) -> Result<()> {
        let body = serde_json::to_vec(post)
            .map_err(|e| crate::error::AppError::Internal(anyhow::anyhow!(e)))?;
        let mut conn = self.conn.clone();
        conn.set_ex(post_key(post.id), body, POST_TTL_SECS as u64)
            .await?;
        Ok(())
    }

    pub async fn get_cached_post(&self, pid: i64) -> Result<Option<Post>> {
        let mut conn = self.conn.clone();
        let raw: Option<Vec<u8>> = conn.get(post_key(pid)).await?;
        Ok(raw.and_then(|bytes| serde_json::from_slice(&bytes).ok()))
    }

    /// Single round-trip multi-get. Entries that fail to deserialize are
    /// treated as misses for that entry only, not a whole-call failure.
    pub async fn get_cached_posts(&self, pids: &[i64]) -> Result<(Vec<Post>, Vec<i64>)> {
        if pids.is_empty() {
            return Ok((vec![], vec![]));
        }

        let keys: Vec<String> = pids.iter().map(|&pid| post_key(pid)).collect();
        let mut conn = self.conn.clone();
        let raw: Vec<Option<Vec<u8>>> = conn.mget(&keys).await?;

        let mut hits = Vec::with_capacity(pids.len());
        let mut missing = Vec::new();
        for (&pid, entry) in pids.iter().zip(raw.into_iter()) {
            match entry.and_then(|bytes| serde_json::from_slice::<Post>(&bytes).ok()) {
                Some(post) => hits.push(post),
                None => missing.push(pid),
            }
        }
        Ok((hits, missing))
    }

    // ---- Celebrity recent-post index ------------------------------------

    pub async fn cache_celebrity_post(&self, uid: i64, post: &Post) -> Result<()> {
        let key = celebrity_key(uid);
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .zadd(&key, post.id, post.created_at.as_f64())
            .zremrangebyrank(&key, 0, -(CELEBRITY_INDEX_SIZE + 1))
            .expire(&key, CELEBRITY_TTL_SECS)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Removing a single post from the celebrity index. A lingering
    /// duplicate past this call (if the underlying RelStore row is
    /// already gone) is documented lossy behavior — it drops out on its
    /// own once it falls out of the 100-entry trim window or the TTL
    /// expires.
    pub async fn remove_from_celebrity_index(&self, uid: i64, pid: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.zrem(celebrity_key(uid), pid).await?;
        Ok(())
    }

    pub async fn get_celebrity_posts(&self, uid: i64, limit: i64) -> Result<Vec<i64>> {
        if limit <= 0 {
            return Ok(vec![]);
        }
        let mut conn = self.conn.clone();
        let pids: Vec<i64> = conn
            .zrevrange(celebrity_key(uid), 0, (limit - 1) as isize)
            .await?;
        Ok(pids)
    }

    /// Pipelined multi-range across every queried celebrity; returns the
    /// unordered union of pids. Callers must re-merge/dedup/sort.
    pub async fn get_celebrity_posts_batch(
        &self,
        uids: &[i64],
        per_user_limit: i64,
    ) -> Result<Vec<i64>> {
        if uids.is_empty() || per_user_limit <= 0 {
            return Ok(vec![]);
        }

        let mut pipe = redis::pipe();
        for &uid in uids {
            pipe.zrevrange(celebrity_key(uid), 0, (per_user_limit - 1) as isize);
        }

        let mut conn = self.conn.clone();
        let results: Vec<Vec<i64>> = pipe.query_async(&mut conn).await?;
        Ok(results.into_iter().flatten().collect())
    }
}

#[cfg(test)]
#[path = "timeline_cache_test.rs"]
mod timeline_cache_test;
