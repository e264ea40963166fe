//! MetricsSink: a bounded in-memory ring of `OperationMetrics`, separate
//! per write/read per spec.md §4.6. Guarded by a single mutex; writers
//! hold it briefly to append, summary builders copy then release —
//! mirroring this codebase's `metrics.rs` single-mutex-guarded-state
//! pattern, generalized from global Prometheus statics to instance state.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::data::{Operation, OperationMetrics, Strategy};

const DEFAULT_RING_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub count: usize,
    pub p50_millis: f64,
    pub p95_millis: f64,
    pub p99_millis: f64,
    pub mean_millis: f64,
    pub mean_fan_out: f64,
    pub cache_hit_rate: f64,
}

fn percentile(sorted_millis: &[f64], pct: f64) -> f64 {
    if sorted_millis.is_empty() {
        return 0.0;
    }
    let rank = ((pct / 100.0) * (sorted_millis.len() - 1) as f64).round() as usize;
    sorted_millis[rank.min(sorted_millis.len() - 1)]
}

fn summarize(records: &[OperationMetrics]) -> MetricsSummary {
    if records.is_empty() {
        return MetricsSummary {
            count: 0,
            p50_millis: 0.0,
            p95_millis: 0.0,
            p99_millis: 0.0,
            mean_millis: 0.0,
            mean_fan_out: 0.0,
            cache_hit_rate: 0.0,
        };
    }

    let mut millis: Vec<f64> = records.iter().map(|r| r.duration.as_secs_f64() * 1000.0).collect();
    millis.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let mean_millis = millis.iter().sum::<f64>() / millis.len() as f64;
    let mean_fan_out =
        records.iter().map(|r| r.fan_out_count as f64).sum::<f64>() / records.len() as f64;
    let hits = records.iter().filter(|r| r.cache_hit).count();

    MetricsSummary {
        count: records.len(),
        p50_millis: percentile(&millis, 50.0),
        p95_millis: percentile(&millis, 95.0),
        p99_millis: percentile(&millis, 99.0),
        mean_millis,
        mean_fan_out,
        cache_hit_rate: hits as f64 / records.len() as f64,
    }
}

struct Buffers {
    writes: VecDeque<OperationMetrics>,
    reads: VecDeque<OperationMetrics>,
}

pub struct MetricsSink {
    capacity: usize,
    buffers: Mutex<Buffers>,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RING_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            buffers: Mutex::new(Buffers {
                writes: VecDeque::with_capacity(capacity),
                reads: VecDeque::with_capacity(capacity),
            }),
        }
    }

    /// Append one record, evicting the oldest entry in its buffer if full.
    /// Also nudges the ambient Prometheus registry so the two views of
    /// the system (queryable MetricsSink, dashboards) stay consistent.
    pub fn append(&self, record: OperationMetrics) {
        crate::metrics::record_operation(&record);

        let mut buffers = self.buffers.lock().expect("metrics sink mutex poisoned");
        let buffer = match record.operation {
            Operation::PostPost => &mut buffers.writes,
            Operation::GetTimeline => &mut buffers.reads,
        };
        if buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(record);
    }

    /// Combined stream of the most recent `n` records across both
    /// buffers, newest first. Never mutates the underlying buffers.
    pub fn recent(&self, n: usize) -> Vec<OperationMetrics> {
        let buffers = self.buffers.lock().expect("metrics sink mutex poisoned");
        let mut combined: Vec<OperationMetrics> = buffers
            .writes
            .iter()
            .chain(buffers.reads.iter())
            .cloned()
            .collect();
        combined.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        combined.truncate(n);
        combined
    }

    /// Per-strategy summary (counts, duration percentiles/mean, mean
    /// fan-out, cache-hit rate) over the current snapshot of both
    /// buffers. Built from a copy; the mutex is released before the
    /// percentile math runs.
    pub fn summarize(&self) -> Vec<(Strategy, Operation, MetricsSummary)> {
        let snapshot: Vec<OperationMetrics> = {
            let buffers = self.buffers.lock().expect("metrics sink mutex poisoned");
            buffers
                .writes
                .iter()
                .chain(buffers.reads.iter())
                .cloned()
                .collect()
        };

        let mut out = Vec::new();
        for strategy in [Strategy::Push, Strategy::Pull, Strategy::Hybrid] {
            for operation in [Operation::PostPost, Operation::GetTimeline] {
                let matching: Vec<OperationMetrics> = snapshot
                    .iter()
                    .filter(|r| r.strategy == strategy && r.operation == operation)
                    .cloned()
                    .collect();
                if !matching.is_empty() {
                    out.push((strategy, operation, summarize(&matching)));
                }
            }
        }
        out
    }

    pub fn clear(&self) {
        let mut buffers = self.buffers.lock().expect("metrics sink mutex poisoned");
        buffers.writes.clear();
        buffers.reads.clear();
    }
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}
