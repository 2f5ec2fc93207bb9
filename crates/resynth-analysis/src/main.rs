mod summarizer;
mod worker;

use clap::Parser;
use resynth_core::config::{AnalysisConfig, BusConfig, LedgerConfig};
use resynth_core::{run_pending_migrations, Ledger, LedgerPool};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use summarizer::OllamaSummarizer;
use worker::AnalysisWorker;

#[derive(Parser, Debug)]
#[command(author, version, about = "Analysis Stage Worker")]
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
                .unwrap_or_else(|_| "resynth_analysis=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let ledger_config = LedgerConfig::from_env();
    let bus_config = BusConfig::from_env("analysis-workers");
    let analysis_config = AnalysisConfig::from_env();

    if cli.run_migrations {
        run_pending_migrations(&ledger_config.database_url).await?;
    }

    let pool = LedgerPool::new(&ledger_config.database_url, ledger_config.max_pool_size)?;
    let ledger = Ledger::new(pool);

    let summarizer = OllamaSummarizer::new(
        analysis_config.endpoint.clone(),
        analysis_config.model.clone(),
        analysis_config.temperature,
        analysis_config.map_output_token_cap,
    );

    let worker = AnalysisWorker::new(ledger, Box::new(summarizer), analysis_config);

    worker.run(&bus_config).await
}
