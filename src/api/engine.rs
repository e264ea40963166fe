//! Thin HTTP surface over `EngineContext`. Handlers parse/validate input,
//! delegate to the engine, and serialize the result — no business logic
//! of their own, per spec.md §1 ("the core exposes `PostPost`/
//! `GetTimeline`; this is a thin layer").

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::data::{OperationMetrics, Post, Strategy};
use crate::engine::{ConfigKey, EngineContext};
use crate::error::{AppError, Result};

pub fn engine_router(ctx: EngineContext) -> Router {
    Router::new()
        .route("/posts", post(create_post))
        .route("/timeline/:uid", get(get_timeline))
        .route("/config", get(get_config).put(set_config))
        .route("/metrics/engine", get(get_engine_metrics).delete(clear_engine_metrics))
        .route("/metrics/engine/recent", get(get_recent_engine_metrics))
        .with_state(ctx)
}

#[derive(Debug, Deserialize)]
struct CreatePostRequest {
    uid: i64,
    content: String,
    strategy: Strategy,
}

#[derive(Debug, Serialize)]
struct PostResponse {
    post: Post,
    metrics: OperationMetrics,
}

async fn create_post(
    State(ctx): State<EngineContext>,
    Json(req): Json<CreatePostRequest>,
) -> Result<Json<PostResponse>> {
    let (post, metrics) = ctx.post_post(req.uid, &req.content, req.strategy).await?;
    Ok(Json(PostResponse { post, metrics }))
}

#[derive(Debug, Deserialize)]
struct TimelineQuery {
    strategy: Strategy,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
struct TimelineResponse {
    posts: Vec<Post>,
    metrics: OperationMetrics,
}

async fn get_timeline(
    State(ctx): State<EngineContext>,
    Path(uid): Path<i64>,
    Query(query): Query<TimelineQuery>,
) -> Result<Json<TimelineResponse>> {
    let limit = query.limit.unwrap_or_else(|| ctx.get_config(ConfigKey::PageSize));
    let offset = query.offset.unwrap_or(0);
    let (posts, metrics) = ctx.get_timeline(uid, query.strategy, limit, offset).await?;
    Ok(Json(TimelineResponse { posts, metrics }))
}

#[derive(Debug, Serialize)]
struct ConfigResponse {
    celebrity_threshold: i64,
    cache_size: i64,
    page_size: i64,
}

async fn get_config(State(ctx): State<EngineContext>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        celebrity_threshold: ctx.get_config(ConfigKey::CelebrityThreshold),
        cache_size: ctx.get_config(ConfigKey::CacheSize),
        page_size: ctx.get_config(ConfigKey::PageSize),
    })
}

#[derive(Debug, Deserialize)]
struct SetConfigRequest {
    key: String,
    value: i64,
}

async fn set_config(
    State(ctx): State<EngineContext>,
    Json(req): Json<SetConfigRequest>,
) -> Result<Json<ConfigResponse>> {
    let key: ConfigKey = req.key.parse().map_err(|_| {
        AppError::InvalidInput(format!("unknown config key: {}", req.key))
    })?;
    ctx.set_config(key, req.value)?;
    Ok(get_config(State(ctx)).await)
}

#[derive(Debug, Serialize)]
struct EngineMetricsSummaryEntry {
    strategy: &'static str,
    operation: &'static str,
    count: usize,
    p50_millis: f64,
    p95_millis: f64,
    p99_millis: f64,
    mean_millis: f64,
    mean_fan_out: f64,
    cache_hit_rate: f64,
}

async fn get_engine_metrics(State(ctx): State<EngineContext>) -> Json<Vec<EngineMetricsSummaryEntry>> {
    let entries = ctx
        .get_metrics()
        .into_iter()
        .map(|(strategy, operation, summary)| EngineMetricsSummaryEntry {
            strategy: strategy.name(),
            operation: match operation {
                crate::data::Operation::PostPost => "post_post",
                crate::data::Operation::GetTimeline => "get_timeline",
            },
            count: summary.count,
            p50_millis: summary.p50_millis,
            p95_millis: summary.p95_millis,
            p99_millis: summary.p99_millis,
            mean_millis: summary.mean_millis,
            mean_fan_out: summary.mean_fan_out,
            cache_hit_rate: summary.cache_hit_rate,
        })
        .collect();
    Json(entries)
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    #[serde(default = "default_recent_n")]
    n: usize,
}

fn default_recent_n() -> usize {
    100
}

async fn get_recent_engine_metrics(
    State(ctx): State<EngineContext>,
    Query(query): Query<RecentQuery>,
) -> Json<Vec<OperationMetrics>> {
    Json(ctx.get_recent_metrics(query.n))
}

async fn clear_engine_metrics(State(ctx): State<EngineContext>) -> impl IntoResponse {
    ctx.clear_metrics();
    axum::http::StatusCode::NO_CONTENT
}
