use super::*;

async fn store() -> RelStore {
    RelStore::connect_in_memory().await.unwrap()
}

#[tokio::test]
async fn create_user_rejects_duplicate_username() {
    let store = store().await;
    store.create_user("alice").await.unwrap();
    let err = store.create_user("alice").await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn bulk_create_users_is_idempotent_on_username_conflict() {
    let store = store().await;
    store.create_user("alice").await.unwrap();

    let created = store
        .bulk_create_users(&["alice".into(), "bob".into()])
        .await
        .unwrap();

    assert_eq!(created.len(), 1);
    assert_eq!(created[0].username, "bob");
    assert_eq!(store.count_users().await.unwrap(), 2);
}

#[tokio::test]
async fn follow_create_is_idempotent_and_moves_counters_atomically() {
    let store = store().await;
    let a = store.create_user("a").await.unwrap();
    let b = store.create_user("b").await.unwrap();

    store.create_follow(a.id, b.id).await.unwrap();
    store.create_follow(a.id, b.id).await.unwrap();

    assert_eq!(store.count_follows().await.unwrap(), 1);

    let a = store.get_user_by_id(a.id).await.unwrap().unwrap();
    let b = store.get_user_by_id(b.id).await.unwrap().unwrap();
    assert_eq!(a.following_count, 1);
    assert_eq!(b.follower_count, 1);
}

#[tokio::test]
async fn follow_delete_moves_counters_back() {
    let store = store().await;
    let a = store.create_user("a").await.unwrap();
    let b = store.create_user("b").await.unwrap();
    store.create_follow(a.id, b.id).await.unwrap();

    store.delete_follow(a.id, b.id).await.unwrap();

    assert_eq!(store.count_follows().await.unwrap(), 0);
    let a = store.get_user_by_id(a.id).await.unwrap().unwrap();
    let b = store.get_user_by_id(b.id).await.unwrap().unwrap();
    assert_eq!(a.following_count, 0);
    assert_eq!(b.follower_count, 0);
}

#[tokio::test]
async fn get_celebrities_orders_by_follower_count_descending() {
    let store = store().await;
    let celeb = store.create_user("celeb").await.unwrap();
    let minor = store.create_user("minor").await.unwrap();
    for i in 0..10 {
        let follower = store.create_user(&format!("f{i}")).await.unwrap();
        store.create_follow(follower.id, celeb.id).await.unwrap();
    }
    let follower = store.create_user("f_minor").await.unwrap();
    store.create_follow(follower.id, minor.id).await.unwrap();

    let celebrities = store.get_celebrities(5).await.unwrap();
    assert_eq!(celebrities.len(), 1);
    assert_eq!(celebrities[0].id, celeb.id);
}

#[tokio::test]
async fn get_recent_by_user_ids_caps_per_author_then_globally() {
    let store = store().await;
    let a = store.create_user("a").await.unwrap();
    let b = store.create_user("b").await.unwrap();

    for i in 0..5 {
        store
            .create_post(a.id, &format!("a{i}"))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    }
    for i in 0..5 {
        store
            .create_post(b.id, &format!("b{i}"))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    }

    let posts = store
        .get_recent_by_user_ids(&[a.id, b.id], 2, 100)
        .await
        .unwrap();

    assert_eq!(posts.len(), 4);
    let from_a = posts.iter().filter(|p| p.user_id == a.id).count();
    let from_b = posts.iter().filter(|p| p.user_id == b.id).count();
    assert_eq!(from_a, 2);
    assert_eq!(from_b, 2);

    for pair in posts.windows(2) {
        assert!(pair[0].created_at >= pair[1].created_at);
    }
}

#[tokio::test]
async fn get_posts_by_ids_orders_descending_and_ignores_missing() {
    let store = store().await;
    let a = store.create_user("a").await.unwrap();
    let p1 = store.create_post(a.id, "first").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    let p2 = store.create_post(a.id, "second").await.unwrap();

    let posts = store
        .get_posts_by_ids(&[p1.id, p2.id, 999_999])
        .await
        .unwrap();

    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].id, p2.id);
    assert_eq!(posts[1].id, p1.id);
}

#[tokio::test]
async fn rebuild_counters_restores_drifted_denormalization() {
    let store = store().await;
    let a = store.create_user("a").await.unwrap();
    let b = store.create_user("b").await.unwrap();
    store.create_follow(a.id, b.id).await.unwrap();

    sqlx::query("UPDATE users SET follower_count = 999, following_count = 999")
        .execute(&store.pool)
        .await
        .unwrap();

    store.rebuild_counters().await.unwrap();

    let a = store.get_user_by_id(a.id).await.unwrap().unwrap();
    let b = store.get_user_by_id(b.id).await.unwrap().unwrap();
    assert_eq!(a.following_count, 1);
    assert_eq!(a.follower_count, 0);
    assert_eq!(b.follower_count, 1);
    assert_eq!(b.following_count, 0);
}

#[tokio::test]
async fn delete_user_cascades_posts_and_follows() {
    let store = store().await;
    let a = store.create_user("a").await.unwrap();
    let b = store.create_user("b").await.unwrap();
    store.create_post(a.id, "hi").await.unwrap();
    store.create_follow(a.id, b.id).await.unwrap();

    store.delete_user(a.id).await.unwrap();

    assert!(store.get_user_by_id(a.id).await.unwrap().is_none());
    assert_eq!(store.get_posts_by_user_id(a.id, 10).await.unwrap().len(), 0);
    assert_eq!(store.get_following(a.id).await.unwrap().len(), 0);
}
