//! `EngineContext`: the explicit engine struct spec.md §9 calls for in
//! place of the original's process-singleton config and process-wide
//! store handles. Owns config, both repositories, the metrics sink, the
//! live-mutable runtime knobs, and the three constructed strategies.
//! Cloned cheaply (every field is `Arc`-wrapped), mirroring this
//! codebase's `AppState` shape.

mod hybrid;
mod metrics_sink;
mod pull;
mod push;
mod strategy;

pub use hybrid::HybridStrategy;
pub use metrics_sink::{MetricsSink, MetricsSummary};
pub use pull::PullStrategy;
pub use push::PushStrategy;
pub use strategy::TimelineStrategy;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::data::{OperationMetrics, Post, RelStore, Strategy, TimelineCache};
use crate::error::{AppError, Result};

/// The three config keys spec.md §6 exposes as runtime-mutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKey {
    CelebrityThreshold,
    CacheSize,
    PageSize,
}

impl std::str::FromStr for ConfigKey {
    type Err = AppError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "celebrity_threshold" => Ok(ConfigKey::CelebrityThreshold),
            "cache_size" => Ok(ConfigKey::CacheSize),
            "page_size" => Ok(ConfigKey::PageSize),
            other => Err(AppError::InvalidInput(format!("unknown config key: {other}"))),
        }
    }
}

#[derive(Clone)]
pub struct EngineContext {
    pub config: Arc<EngineConfig>,
    pub store: Arc<RelStore>,
    pub cache: Arc<TimelineCache>,
    pub metrics: Arc<MetricsSink>,

    celebrity_threshold: Arc<AtomicI64>,
    timeline_cache_size: Arc<AtomicI64>,
    timeline_page_size: Arc<AtomicI64>,

    push: Arc<PushStrategy>,
    pull: Arc<PullStrategy>,
    hybrid: Arc<HybridStrategy>,
}

impl EngineContext {
    pub async fn new(config: EngineConfig) -> Result<Self> {
        tracing::info!("Initializing engine context...");

        let store = RelStore::connect(&config.database.path, config.database.max_connections).await?;
        tracing::info!("RelStore connected");

        let celebrity_threshold = Arc::new(AtomicI64::new(config.engine.celebrity_threshold));
        let timeline_cache_size = Arc::new(AtomicI64::new(config.engine.timeline_cache_size));
        let timeline_page_size = Arc::new(AtomicI64::new(config.engine.timeline_page_size));

        let cache = TimelineCache::connect(&config.cache.redis_url, timeline_cache_size.clone())
            .await?;
        tracing::info!("TimelineCache connected");

        let store = Arc::new(store);
        let cache = Arc::new(cache);
        let metrics = Arc::new(MetricsSink::new());

        let push = Arc::new(PushStrategy::new(store.clone(), cache.clone(), metrics.clone()));
        let pull = Arc::new(PullStrategy::new(store.clone(), cache.clone(), metrics.clone()));
        let hybrid = Arc::new(HybridStrategy::new(
            store.clone(),
            cache.clone(),
            metrics.clone(),
            celebrity_threshold.clone(),
        ));

        tracing::info!("Engine context initialized");

        Ok(Self {
            config: Arc::new(config),
            store,
            cache,
            metrics,
            celebrity_threshold,
            timeline_cache_size,
            timeline_page_size,
            push,
            pull,
            hybrid,
        })
    }

    pub fn strategy(&self, strategy: Strategy) -> Arc<dyn TimelineStrategy> {
        match strategy {
            Strategy::Push => self.push.clone(),
            Strategy::Pull => self.pull.clone(),
            Strategy::Hybrid => self.hybrid.clone(),
        }
    }

    pub async fn post_post(
        &self,
        uid: i64,
        content: &str,
        strategy: Strategy,
    ) -> Result<(Post, OperationMetrics)> {
        if content.trim().is_empty() {
            return Err(AppError::InvalidInput("content cannot be empty".into()));
        }
        self.strategy(strategy).post_post(uid, content).await
    }

    pub async fn get_timeline(
        &self,
        uid: i64,
        strategy: Strategy,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Post>, OperationMetrics)> {
        let limit = if limit <= 0 {
            self.timeline_page_size.load(Ordering::Relaxed)
        } else {
            limit
        };
        self.strategy(strategy).get_timeline(uid, limit, offset).await
    }

    pub fn get_config(&self, key: ConfigKey) -> i64 {
        match key {
            ConfigKey::CelebrityThreshold => self.celebrity_threshold.load(Ordering::Relaxed),
            ConfigKey::CacheSize => self.timeline_cache_size.load(Ordering::Relaxed),
            ConfigKey::PageSize => self.timeline_page_size.load(Ordering::Relaxed),
        }
    }

    pub fn set_config(&self, key: ConfigKey, value: i64) -> Result<()> {
        if value <= 0 {
            return Err(AppError::InvalidInput(
                "config value must be positive".into(),
            ));
        }
        match key {
            ConfigKey::CelebrityThreshold => {
                self.celebrity_threshold.store(value, Ordering::Relaxed)
            }
            ConfigKey::CacheSize => self.timeline_cache_size.store(value, Ordering::Relaxed),
            ConfigKey::PageSize => self.timeline_page_size.store(value, Ordering::Relaxed),
        }
        Ok(())
    }

    pub fn get_metrics(&self) -> Vec<(Strategy, crate::data::Operation, MetricsSummary)> {
        self.metrics.summarize()
    }

    pub fn get_recent_metrics(&self, n: usize) -> Vec<OperationMetrics> {
        self.metrics.recent(n)
    }

    pub fn clear_metrics(&self) {
        self.metrics.clear()
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
