mod engine;
mod extract;
mod worker;

use clap::Parser;
use resynth_core::config::{BusConfig, LedgerConfig, SearchConfig};
use resynth_core::{run_pending_migrations, Ledger, LedgerPool};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use engine::DuckDuckGoSearchEngine;
use extract::ReqwestExtractor;
use worker::SearchWorker;

#[derive(Parser, Debug)]
#[command(author, version, about = "Search Stage Worker")]
struct Cli {
    /// Run pending ledger migrations before starting the consume loop.
    #[arg(long, env = "RUN_MIGRATIONS", default_value_t = true)]
    run_migrations: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resynth_search=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let ledger_config = LedgerConfig::from_env();
    let bus_config = BusConfig::from_env("search-workers");
    let search_config = SearchConfig::from_env();

    if cli.run_migrations {
        run_pending_migrations(&ledger_config.database_url).await?;
    }

    let pool = LedgerPool::new(&ledger_config.database_url, ledger_config.max_pool_size)?;
    let ledger = Ledger::new(pool);

    let worker = SearchWorker::new(
        ledger,
        Box::new(DuckDuckGoSearchEngine::new()),
        Box::new(ReqwestExtractor::new(search_config.fetch_timeout_secs)),
        search_config,
        bus_config.analyze_topic.clone(),
    );

    worker.run(&bus_config).await
}
