//! Core data types shared by RelStore, TimelineCache, and the strategies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user. Identity is a monotonic 64-bit id assigned by RelStore.
///
/// `follower_count`/`following_count` are denormalized counters maintained
/// atomically alongside follow-edge writes; they are a cache of the
/// `follows` table and must be restorable by `RelStore::rebuild_counters`
/// if they ever drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub follower_count: i64,
    pub following_count: i64,
    pub created_at: Nanos,
}

/// An immutable authored text item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub created_at: Nanos,
    /// Best-effort denormalized author username, populated when the post
    /// is hydrated through a strategy; absent (empty) when only a bare
    /// RelStore row was read.
    #[sqlx(default)]
    #[serde(default)]
    pub username: String,
}

/// A directed follow relationship, created/destroyed by explicit operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FollowEdge {
    pub follower_id: i64,
    pub followee_id: i64,
    pub created_at: Nanos,
}

/// Nanoseconds since the Unix epoch: RelStore's `created_at` column and the
/// TimelineCache's ordered-collection score are the same number, so posts
/// never need a conversion step crossing the durable/cache boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct Nanos(pub i64);

impl Nanos {
    pub fn now() -> Self {
        let now = Utc::now();
        Nanos(now.timestamp_nanos_opt().unwrap_or(0))
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0 / 1_000_000_000, (self.0 % 1_000_000_000) as u32)
            .unwrap_or_else(Utc::now)
    }
}

impl From<Nanos> for i64 {
    fn from(value: Nanos) -> Self {
        value.0
    }
}

/// Which timeline materialization strategy a request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Push,
    Pull,
    Hybrid,
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Push => "push",
            Strategy::Pull => "pull",
            Strategy::Hybrid => "hybrid",
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = crate::error::AppError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(Strategy::Push),
            "pull" => Ok(Strategy::Pull),
            "hybrid" => Ok(Strategy::Hybrid),
            other => Err(crate::error::AppError::InvalidInput(format!(
                "unknown strategy: {other}"
            ))),
        }
    }
}

/// Per-operation metrics record appended to MetricsSink on every
/// PostPost/GetTimeline call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMetrics {
    pub strategy: Strategy,
    pub operation: Operation,
    pub duration: std::time::Duration,
    pub fan_out_count: usize,
    pub fan_out_duration: Option<std::time::Duration>,
    pub cache_hit: bool,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    PostPost,
    GetTimeline,
}
