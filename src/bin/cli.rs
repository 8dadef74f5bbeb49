use anyhow::Result;
use clap::{Parser, Subcommand};
use shoprec::config::StorageBackend;
use shoprec::services::store::PgStore;
use shoprec::{init_tracing, AppState, Config};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, global = true, default_value = "config/default.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate recommendations for one user
    Recommend {
        #[arg(short, long)]
        user: i64,

        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,

        /// Store the result as the user's active recommendations
        #[arg(long)]
        persist: bool,
    },
    /// Print the most popular products
    Popular {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Create the schema and load the sample catalog into Postgres
    Seed,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = Config::load(&args.config)?;

    match args.command {
        Command::Recommend { user, count, persist } => {
            let state = AppState::new(config).await?;
            if persist {
                let views = state.serving.generate_and_persist(user, count).await?;
                for view in &views {
                    let rec = &view.recommendation;
                    let name = view.product.as_ref().map(|p| p.name.as_str()).unwrap_or("?");
                    println!("{:>4}  {:<32} {:.3}  {:<13} {}", rec.product_id, name, rec.score, rec.algorithm.as_str(), rec.explanation);
                }
                info!(user_id = user, stored = views.len(), "Persisted recommendations");
            } else {
                let candidates = state.engine.try_generate(user, count).await?;
                for candidate in &candidates {
                    println!(
                        "{:>4}  {:.3}  {:<13} {}",
                        candidate.product_id, candidate.score, candidate.algorithm.as_str(), candidate.explanation
                    );
                }
            }
        }
        Command::Popular { limit } => {
            let state = AppState::new(config).await?;
            for item in state.serving.popular(Some(limit)).await? {
                let name = item.product.as_ref().map(|p| p.name.as_str()).unwrap_or("?");
                println!("{:>4}  {:<32} {:.3}", item.candidate.product_id, name, item.candidate.score);
            }
        }
        Command::Seed => match config.storage.backend {
            StorageBackend::Postgres => {
                let store = PgStore::connect(&config.postgres).await?;
                store.migrate().await?;
                if store.seed_sample_data().await? {
                    info!("Sample catalog loaded");
                } else {
                    info!("Products table already populated, nothing to seed");
                }
            }
            StorageBackend::Memory => {
                info!("Memory backend is seeded on startup, nothing to do");
            }
        },
    }

    Ok(())
}
