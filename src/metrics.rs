//! Prometheus metrics registry and instruments — the ambient
//! observability layer (SPEC_FULL.md §5), distinct from but fed by the
//! engine's own `MetricsSink`. Framework-agnostic; usable from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};

use crate::data::OperationMetrics;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("timeline_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");
    pub static ref HTTP_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "timeline_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["method", "endpoint"]
    ).expect("metric can be created");

    // Engine operation metrics, mirroring OperationMetrics appended to MetricsSink.
    pub static ref ENGINE_OPERATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("timeline_engine_operations_total", "Total engine operations by strategy and kind"),
        &["strategy", "operation"]
    ).expect("metric can be created");
    pub static ref ENGINE_OPERATION_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "timeline_engine_operation_duration_seconds",
            "Engine operation duration in seconds"
        ).buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["strategy", "operation"]
    ).expect("metric can be created");
    pub static ref ENGINE_FAN_OUT_SIZE: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "timeline_engine_fan_out_size",
            "Fan-out width (followers fanned out to, or read-time merge width)"
        ).buckets(vec![0.0, 1.0, 10.0, 100.0, 1_000.0, 10_000.0, 100_000.0, 1_000_000.0]),
        &["strategy", "operation"]
    ).expect("metric can be created");

    // RelStore metrics
    pub static ref DB_QUERIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("timeline_db_queries_total", "Total number of RelStore queries"),
        &["operation", "table"]
    ).expect("metric can be created");
    pub static ref DB_CONNECTIONS_ACTIVE: IntGauge = IntGauge::new(
        "timeline_db_connections_active",
        "Current number of active RelStore connections"
    ).expect("metric can be created");

    // TimelineCache metrics
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("timeline_cache_hits_total", "Total number of cache hits"),
        &["cache_name"]
    ).expect("metric can be created");
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("timeline_cache_misses_total", "Total number of cache misses"),
        &["cache_name"]
    ).expect("metric can be created");

    // Application-level gauges
    pub static ref USERS_TOTAL: IntGauge = IntGauge::new(
        "timeline_users_total",
        "Total number of registered users"
    ).expect("metric can be created");
    pub static ref POSTS_TOTAL: IntGauge = IntGauge::new(
        "timeline_posts_total",
        "Total number of posts"
    ).expect("metric can be created");
    pub static ref CELEBRITIES_TOTAL: IntGauge = IntGauge::new(
        "timeline_celebrities_total",
        "Total number of users classified as celebrities at the live threshold"
    ).expect("metric can be created");

    // Error metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("timeline_errors_total", "Total number of errors by kind"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Register every instrument with the global registry. Call once at startup.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("HTTP_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))
        .expect("HTTP_REQUEST_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(ENGINE_OPERATIONS_TOTAL.clone()))
        .expect("ENGINE_OPERATIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ENGINE_OPERATION_DURATION_SECONDS.clone()))
        .expect("ENGINE_OPERATION_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(ENGINE_FAN_OUT_SIZE.clone()))
        .expect("ENGINE_FAN_OUT_SIZE can be registered");
    REGISTRY
        .register(Box::new(DB_QUERIES_TOTAL.clone()))
        .expect("DB_QUERIES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(DB_CONNECTIONS_ACTIVE.clone()))
        .expect("DB_CONNECTIONS_ACTIVE can be registered");
    REGISTRY
        .register(Box::new(CACHE_HITS_TOTAL.clone()))
        .expect("CACHE_HITS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CACHE_MISSES_TOTAL.clone()))
        .expect("CACHE_MISSES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(USERS_TOTAL.clone()))
        .expect("USERS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(POSTS_TOTAL.clone()))
        .expect("POSTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(CELEBRITIES_TOTAL.clone()))
        .expect("CELEBRITIES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}

/// Feeds the ambient registry from every record appended to a `MetricsSink`,
/// so the queryable engine-level view and the dashboards/alerting view
/// never drift apart.
pub fn record_operation(record: &OperationMetrics) {
    let strategy = record.strategy.name();
    let operation = match record.operation {
        crate::data::Operation::PostPost => "post_post",
        crate::data::Operation::GetTimeline => "get_timeline",
    };

    ENGINE_OPERATIONS_TOTAL
        .with_label_values(&[strategy, operation])
        .inc();
    ENGINE_OPERATION_DURATION_SECONDS
        .with_label_values(&[strategy, operation])
        .observe(record.duration.as_secs_f64());
    ENGINE_FAN_OUT_SIZE
        .with_label_values(&[strategy, operation])
        .observe(record.fan_out_count as f64);

    let cache_label = if operation == "get_timeline" { "timeline" } else { "post" };
    if record.cache_hit {
        CACHE_HITS_TOTAL.with_label_values(&[cache_label]).inc();
    } else {
        CACHE_MISSES_TOTAL.with_label_values(&[cache_label]).inc();
    }
}
