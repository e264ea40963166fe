mod common;

use common::TestServer;
use serde_json::json;

#[tokio::test]
async fn post_then_read_push_timeline_over_http() {
    let Some(server) = TestServer::new().await else {
        return;
    };

    let author = server.ctx.store.create_user("author").await.unwrap();
    let follower = server.ctx.store.create_user("follower").await.unwrap();
    server
        .ctx
        .store
        .create_follow(follower.id, author.id)
        .await
        .unwrap();

    let response = server
        .client
        .post(server.url("/posts"))
        .json(&json!({ "uid": author.id, "content": "hello", "strategy": "push" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = server
        .client
        .get(server.url(&format!("/timeline/{}?strategy=push", follower.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    let posts = body["posts"].as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["content"], "hello");
}

#[tokio::test]
async fn get_timeline_rejects_unknown_strategy() {
    let Some(server) = TestServer::new().await else {
        return;
    };
    let user = server.ctx.store.create_user("u").await.unwrap();

    let response = server
        .client
        .get(server.url(&format!("/timeline/{}?strategy=bogus", user.id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn config_round_trips_through_http() {
    let Some(server) = TestServer::new().await else {
        return;
    };

    let response = server.client.get(server.url("/config")).send().await.unwrap();
    let before: serde_json::Value = response.json().await.unwrap();
    assert_eq!(before["celebrity_threshold"], 10_000);

    let response = server
        .client
        .put(server.url("/config"))
        .json(&json!({ "key": "celebrity_threshold", "value": 42 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let after: serde_json::Value = response.json().await.unwrap();
    assert_eq!(after["celebrity_threshold"], 42);
}

#[tokio::test]
async fn engine_metrics_reflect_http_driven_operations() {
    let Some(server) = TestServer::new().await else {
        return;
    };
    let user = server.ctx.store.create_user("u").await.unwrap();

    server
        .client
        .post(server.url("/posts"))
        .json(&json!({ "uid": user.id, "content": "m", "strategy": "pull" }))
        .send()
        .await
        .unwrap();

    let response = server
        .client
        .get(server.url("/metrics/engine"))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body.as_array().unwrap().iter().any(|entry| entry["strategy"] == "pull"));

    let response = server
        .client
        .delete(server.url("/metrics/engine"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
}
