use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use esg_resource_runtime::config::load_catalog;
use esg_resource_runtime::interface;
use esg_resource_runtime::seed::SeederKind;
use esg_resource_runtime::{Runtime, DEFAULT_MAX_RETRIES};
use tracing::info;

/// Re:source campaign runtime
#[derive(Parser, Debug)]
#[command(name = "esg-resource-runtime", version, about, long_about = None)]
struct Cli {
    /// Campaign table in JSON, defaults to the built-in table
    #[clap(long, env = "RESOURCE_CAMPAIGNS")]
    campaigns: Option<PathBuf>,
    /// Address to listen on
    #[clap(long, env = "RESOURCE_LISTEN", default_value = "127.0.0.1:4680")]
    listen: SocketAddr,
    /// Retries after a concurrent update before giving up
    #[clap(long, env = "RESOURCE_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,
    /// How counters are seeded
    #[clap(long, env = "RESOURCE_SEEDER", value_enum, default_value_t = SeederKind::Random)]
    seeder: SeederKind,
    /// Seed of the random seeder, for reproducible sample data
    #[clap(long, env = "RESOURCE_RNG_SEED")]
    rng_seed: Option<u64>,
    /// Start without seeding, leaving keys to be seeded on first access
    #[clap(long)]
    no_seed: bool,
}

pub async fn start() -> Result<()> {
    let cli = Cli::parse();

    let catalog = load_catalog(cli.campaigns.as_deref()).await?;
    info!(campaigns = catalog.len(), "loaded campaign table");

    let seeder = cli.seeder.build(cli.rng_seed);
    let runtime = Runtime::with_max_retries(catalog, seeder, cli.max_retries);
    if !cli.no_seed {
        runtime.seed_all()?;
    }

    interface::tcp::run(cli.listen, runtime).await
}
