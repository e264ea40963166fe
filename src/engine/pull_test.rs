use std::sync::atomic::AtomicI64;
use std::sync::Arc;

use super::*;
use crate::data::RelStore;

async fn harness() -> Option<(Arc<RelStore>, Arc<TimelineCache>, PullStrategy)> {
    let url = std::env::var("TIMELINE_TEST_REDIS_URL").ok()?;
    let store = Arc::new(RelStore::connect_in_memory().await.unwrap());
    let cache_size = Arc::new(AtomicI64::new(800));
    let cache = Arc::new(TimelineCache::connect(&url, cache_size).await.unwrap());
    let metrics = Arc::new(MetricsSink::new());
    let strategy = PullStrategy::new(store.clone(), cache.clone(), metrics);
    Some((store, cache, strategy))
}

/// S4: pull correctness scenario from spec.md §8.
#[tokio::test]
async fn s4_pull_correctness() {
    let Some((store, _cache, strategy)) = harness().await else {
        return;
    };

    let u1 = store.create_user("u1").await.unwrap();
    let u2 = store.create_user("u2").await.unwrap();
    let u3 = store.create_user("u3").await.unwrap();
    store.create_follow(u1.id, u2.id).await.unwrap();
    store.create_follow(u1.id, u3.id).await.unwrap();

    strategy.post_post(u2.id, "a").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    strategy.post_post(u3.id, "b").await.unwrap();

    let (posts, metrics) = strategy.get_timeline(u1.id, 50, 0).await.unwrap();
    let contents: Vec<&str> = posts.iter().map(|p| p.content.as_str()).collect();
    assert_eq!(contents, vec!["b", "a"]);
    assert!(!metrics.cache_hit);
    assert_eq!(metrics.fan_out_count, 3);
}

#[tokio::test]
async fn post_post_never_touches_follower_caches() {
    let Some((store, _cache, strategy)) = harness().await else {
        return;
    };
    let u1 = store.create_user("u1").await.unwrap();
    let (_post, metrics) = strategy.post_post(u1.id, "x").await.unwrap();
    assert_eq!(metrics.fan_out_count, 0);
}

/// Testable property #1's second clause: a failed durable insert leaves
/// no trace in the post-object cache. A uid with no matching `users` row
/// violates `posts.user_id`'s foreign key, so `create_post` fails before
/// the best-effort post-object cache write is attempted. This harness's
/// store is fresh, so the post that would have been created is
/// deterministically the first row (`pid=1`).
#[tokio::test]
async fn failed_create_post_leaves_no_cache_trace() {
    let Some((_store, cache, strategy)) = harness().await else {
        return;
    };
    let bogus_author = 999_999_999_i64;

    let result = strategy.post_post(bogus_author, "never durable").await;
    assert!(result.is_err());
    assert!(cache.get_cached_post(1).await.unwrap().is_none());
}

#[tokio::test]
async fn dedup_across_pagination_boundaries() {
    let Some((store, _cache, strategy)) = harness().await else {
        return;
    };
    let u1 = store.create_user("u1").await.unwrap();
    for i in 0..3 {
        strategy.post_post(u1.id, &format!("p{i}")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let (page1, _) = strategy.get_timeline(u1.id, 2, 0).await.unwrap();
    let (page2, _) = strategy.get_timeline(u1.id, 2, 2).await.unwrap();
    let mut ids: Vec<i64> = page1.iter().chain(page2.iter()).map(|p| p.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}
