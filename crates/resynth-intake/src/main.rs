mod handlers;
mod routes;
mod state;

use std::sync::Arc;

use clap::Parser;
use resynth_core::config::{BusConfig, LedgerConfig};
use resynth_core::{run_pending_migrations, BusProducer, Ledger, LedgerPool};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use state::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about = "Intake: submission and read API")]
struct Cli {
    #[arg(long, env = "INTAKE_BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind_addr: String,

    /// Comma-separated browser origins permitted by CORS.
    #[arg(long, env = "CORS_ALLOWED_ORIGINS", default_value = "http://localhost:3000,http://localhost:5173")]
    cors_allowed_origins: String,

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
                .unwrap_or_else(|_| "resynth_intake=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let ledger_config = LedgerConfig::from_env();
    let bus_config = BusConfig::from_env("intake");

    if cli.run_migrations {
        run_pending_migrations(&ledger_config.database_url).await?;
    }

    let pool = LedgerPool::new(&ledger_config.database_url, ledger_config.max_pool_size)?;
    let ledger = Ledger::new(pool);
    let producer = Arc::new(BusProducer::connect(&bus_config).await?);

    let state = AppState { ledger, producer, search_topic: bus_config.search_topic.clone() };

    let allowed_origins: Vec<String> =
        cli.cors_allowed_origins.split(',').map(|s| s.trim().to_string()).collect();

    let router = routes::create_router(state, &allowed_origins);

    tracing::info!(addr = %cli.bind_addr, "intake listening");
    let listener = tokio::net::TcpListener::bind(&cli.bind_addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
