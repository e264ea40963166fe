//! A small load generator over the library's public `post_post`/
//! `get_timeline` entry points. Reports `count / wallclock_elapsed`
//! throughput (the corrected formula — never
//! `concurrency * count / sum_of_latencies`, which double-counts
//! concurrent overlap) using per-worker latency buffers merged after
//! `tokio::task::JoinSet` completion, never a single mutex-guarded
//! buffer in the hot path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinSet;

use timeline_engine::config::EngineConfig;
use timeline_engine::data::Strategy;
use timeline_engine::engine::EngineContext;

#[derive(Parser)]
#[command(about = "Benchmark PostPost/GetTimeline throughput and latency")]
struct Args {
    /// Strategy under test.
    #[arg(long, default_value = "push")]
    strategy: String,

    /// Number of concurrent workers.
    #[arg(long, default_value_t = 16)]
    concurrency: usize,

    /// Benchmark duration in seconds.
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,

    /// Fraction of operations that are GetTimeline reads, in [0.0, 1.0].
    #[arg(long, default_value_t = 0.8)]
    read_ratio: f64,
}

fn percentile(sorted_millis: &[f64], pct: f64) -> f64 {
    if sorted_millis.is_empty() {
        return 0.0;
    }
    let rank = ((pct / 100.0) * (sorted_millis.len() - 1) as f64).round() as usize;
    sorted_millis[rank.min(sorted_millis.len() - 1)]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let args = Args::parse();
    let strategy: Strategy = args.strategy.parse().map_err(|e| format!("{e:?}"))?;

    let config = EngineConfig::load()?;
    let ctx = EngineContext::new(config).await?;

    let users = ctx.store.get_random_users(10_000).await?;
    if users.is_empty() {
        return Err("no users found; run `seed` first".into());
    }
    let user_ids: Arc<Vec<i64>> = Arc::new(users.into_iter().map(|u| u.id).collect());

    let deadline = Instant::now() + Duration::from_secs(args.duration_secs);
    let total_ops = Arc::new(AtomicUsize::new(0));
    let total_errors = Arc::new(AtomicUsize::new(0));

    let mut workers = JoinSet::new();
    for worker_id in 0..args.concurrency {
        let ctx = ctx.clone();
        let user_ids = user_ids.clone();
        let total_ops = total_ops.clone();
        let total_errors = total_errors.clone();
        let read_ratio = args.read_ratio;

        workers.spawn(async move {
            let mut rng = StdRng::seed_from_u64(worker_id as u64 + 1);
            let mut latencies_millis: Vec<f64> = Vec::new();

            while Instant::now() < deadline {
                let uid = user_ids[rng.gen_range(0..user_ids.len())];
                let started = Instant::now();

                let result = if rng.gen::<f64>() < read_ratio {
                    ctx.get_timeline(uid, strategy, 50, 0).await.map(|_| ())
                } else {
                    let content = format!("bench post from worker {worker_id}");
                    ctx.post_post(uid, &content, strategy).await.map(|_| ())
                };

                latencies_millis.push(started.elapsed().as_secs_f64() * 1000.0);
                total_ops.fetch_add(1, Ordering::Relaxed);
                if result.is_err() {
                    total_errors.fetch_add(1, Ordering::Relaxed);
                }
            }

            latencies_millis
        });
    }

    let bench_started = Instant::now();
    let mut all_latencies: Vec<f64> = Vec::new();
    while let Some(result) = workers.join_next().await {
        all_latencies.extend(result?);
    }
    let wallclock_elapsed = bench_started.elapsed();

    all_latencies.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let count = total_ops.load(Ordering::Relaxed);
    let errors = total_errors.load(Ordering::Relaxed);
    let throughput = count as f64 / wallclock_elapsed.as_secs_f64();

    tracing::info!(
        strategy = %strategy.name(),
        concurrency = args.concurrency,
        count,
        errors,
        throughput_ops_per_sec = throughput,
        p50_millis = percentile(&all_latencies, 50.0),
        p95_millis = percentile(&all_latencies, 95.0),
        p99_millis = percentile(&all_latencies, 99.0),
        "Benchmark complete"
    );

    Ok(())
}
