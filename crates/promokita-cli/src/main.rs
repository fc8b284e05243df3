use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod coupons;
mod scrape;

#[derive(Debug, Parser)]
#[command(name = "promokita-cli")]
#[command(about = "PromoKita coupon pipeline command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a scrape cycle (or a single platform) and print the outcome.
    Run {
        /// Scrape only this platform slug.
        #[arg(long)]
        platform: Option<String>,
        /// Keep running, repeating on the configured interval.
        #[arg(long)]
        schedule: bool,
    },
    /// Coupon counts and the latest scrape session per platform.
    Status,
    /// List coupons, newest first.
    List {
        /// Filter by platform slug.
        #[arg(long)]
        platform: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show a single coupon in full.
    Show {
        #[arg(long)]
        id: i64,
    },
    /// Active coupons that carry a code, grouped by platform.
    All {
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Print usage instructions for a coupon code.
    Use {
        #[arg(long)]
        code: String,
    },
    /// Aggregate counts by status, platform, and discount type.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = promokita_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = promokita_db::PoolConfig::from_app_config(&config);
    let pool = promokita_db::connect_pool(&config.database_url, pool_config).await?;
    promokita_db::run_migrations(&pool).await?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { platform, schedule } => {
            scrape::run(&pool, &config, platform.as_deref(), schedule).await
        }
        Commands::Status => scrape::status(&pool).await,
        Commands::List { platform, limit } => {
            coupons::list(&pool, platform.as_deref(), limit).await
        }
        Commands::Show { id } => coupons::show(&pool, id).await,
        Commands::All { limit } => coupons::all(&pool, limit).await,
        Commands::Use { code } => coupons::use_code(&pool, &code).await,
        Commands::Stats => coupons::stats(&pool).await,
    }
}
