//! Populates RelStore with synthetic users and follow-edges for local
//! testing and benchmarking. Calls `RelStore::bulk_create_users` and
//! `RelStore::bulk_create_follows` directly; no engine logic.

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use timeline_engine::config::EngineConfig;
use timeline_engine::data::RelStore;

#[derive(Parser)]
#[command(about = "Seed the RelStore with synthetic users and follow-edges")]
struct Args {
    /// Number of users to create.
    #[arg(long, default_value_t = 1_000)]
    users: usize,

    /// Average number of followees per user.
    #[arg(long, default_value_t = 50)]
    avg_follows: usize,

    /// Number of users to promote into a celebrity-sized follower count.
    #[arg(long, default_value_t = 5)]
    celebrities: usize,

    /// Follower count given to each celebrity.
    #[arg(long, default_value_t = 50_000)]
    celebrity_followers: usize,

    /// RNG seed, for reproducible graphs.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let args = Args::parse();
    let config = EngineConfig::load()?;
    let store = RelStore::connect(&config.database.path, config.database.max_connections).await?;
    let mut rng = StdRng::seed_from_u64(args.seed);

    tracing::info!(users = args.users, "Creating users");
    let usernames: Vec<String> = (0..args.users).map(|i| format!("user{i}")).collect();
    let users = store.bulk_create_users(&usernames).await?;

    tracing::info!(
        celebrities = args.celebrities,
        followers = args.celebrity_followers,
        "Assigning celebrity follow-edges"
    );
    let mut edges: Vec<(i64, i64)> = Vec::new();
    for celeb_idx in 0..args.celebrities.min(users.len()) {
        let celeb = &users[celeb_idx];
        let follower_count = args.celebrity_followers.min(users.len() - 1);
        for _ in 0..follower_count {
            let follower_idx = rng.gen_range(0..users.len());
            if follower_idx != celeb_idx {
                edges.push((users[follower_idx].id, celeb.id));
            }
        }
    }

    tracing::info!(avg_follows = args.avg_follows, "Assigning ordinary follow-edges");
    for (idx, user) in users.iter().enumerate() {
        for _ in 0..args.avg_follows {
            let followee_idx = rng.gen_range(0..users.len());
            if followee_idx != idx {
                edges.push((user.id, users[followee_idx].id));
            }
        }
    }

    edges.sort();
    edges.dedup();
    tracing::info!(edges = edges.len(), "Writing follow-edges");
    store.bulk_create_follows(&edges).await?;

    tracing::info!(
        users = users.len(),
        edges = edges.len(),
        "Seeding complete"
    );

    Ok(())
}
