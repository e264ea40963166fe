mod common;

use common::TestServer;

#[tokio::test]
async fn health_check_returns_ok() {
    let Some(server) = TestServer::new().await else {
        return;
    };

    let response = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn prometheus_metrics_endpoint_is_served() {
    let Some(server) = TestServer::new().await else {
        return;
    };

    let response = server
        .client
        .get(server.url("/metrics"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}
