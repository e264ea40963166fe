//! Runs pending migrations against the configured database and exits.
//! No engine logic; a thin external collaborator per spec.md §1.

use clap::Parser;
use timeline_engine::config::EngineConfig;
use timeline_engine::data::RelStore;

#[derive(Parser)]
#[command(about = "Apply pending RelStore migrations")]
struct Args {
    /// Override the database path from config/env.
    #[arg(long)]
    database_path: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let args = Args::parse();
    let config = EngineConfig::load()?;
    let path = args.database_path.unwrap_or(config.database.path);

    tracing::info!(path = %path.display(), "Applying migrations");
    RelStore::connect(&path, config.database.max_connections).await?;
    tracing::info!("Migrations applied");

    Ok(())
}
