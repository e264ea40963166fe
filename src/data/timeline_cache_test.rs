use super::*;
use super::super::models::Nanos;

/// Tests that talk to Redis skip (not fail) when no test instance is
/// configured, matching this codebase's skip-if-unconfigured idiom for
/// integration suites that depend on an external service.
async fn test_cache(cache_size: i64) -> Option<TimelineCache> {
    let url = std::env::var("TIMELINE_TEST_REDIS_URL").ok()?;
    let cache_size = std::sync::Arc::new(std::sync::atomic::AtomicI64::new(cache_size));
    TimelineCache::connect(&url, cache_size).await.ok()
}

fn post(id: i64, uid: i64, nanos: i64) -> Post {
    Post {
        id,
        user_id: uid,
        content: format!("post {id}"),
        created_at: Nanos(nanos),
        username: String::new(),
    }
}

#[tokio::test]
async fn add_and_read_timeline_in_descending_order() {
    let Some(cache) = test_cache(800).await else {
        return;
    };
    let uid = 900_001;
    cache.clear_timeline(uid).await.unwrap();

    cache.add_to_timeline(uid, &post(1, 5, 100)).await.unwrap();
    cache.add_to_timeline(uid, &post(2, 5, 200)).await.unwrap();
    cache.add_to_timeline(uid, &post(3, 5, 300)).await.unwrap();

    let pids = cache.get_timeline(uid, 10, 0).await.unwrap();
    assert_eq!(pids, vec![3, 2, 1]);
}

#[tokio::test]
async fn timeline_trims_to_cache_size() {
    let Some(cache) = test_cache(3).await else {
        return;
    };
    let uid = 900_002;
    cache.clear_timeline(uid).await.unwrap();

    for i in 1..=5 {
        cache
            .add_to_timeline(uid, &post(i, 5, i * 100))
            .await
            .unwrap();
    }

    let size = cache.get_timeline_size(uid).await.unwrap();
    assert_eq!(size, 3);

    let pids = cache.get_timeline(uid, 10, 0).await.unwrap();
    assert_eq!(pids, vec![5, 4, 3]);
}

#[tokio::test]
async fn missing_timeline_returns_empty_not_error() {
    let Some(cache) = test_cache(800).await else {
        return;
    };
    let pids = cache.get_timeline(123_456_789, 10, 0).await.unwrap();
    assert!(pids.is_empty());
}

#[tokio::test]
async fn cached_posts_multi_get_treats_misses_as_absent() {
    let Some(cache) = test_cache(800).await else {
        return;
    };
    let p = post(900_100, 5, 1000);
    cache.cache_post(&p).await.unwrap();

    let (hits, missing) = cache
        .get_cached_posts(&[p.id, 999_999_999])
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, p.id);
    assert_eq!(missing, vec![999_999_999]);
}

#[tokio::test]
async fn celebrity_index_batch_returns_union() {
    let Some(cache) = test_cache(800).await else {
        return;
    };
    cache
        .cache_celebrity_post(700_001, &post(1, 700_001, 100))
        .await
        .unwrap();
    cache
        .cache_celebrity_post(700_002, &post(2, 700_002, 200))
        .await
        .unwrap();

    let mut pids = cache
        .get_celebrity_posts_batch(&[700_001, 700_002], 10)
        .await
        .unwrap();
    pids.sort();
    assert_eq!(pids, vec![1, 2]);
}
