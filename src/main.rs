//! Points ledger
//!
//! Reads one JSON request per line from stdin and writes one JSON response per line to stdout.
//! Logs go to stderr.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use points_ledger::{
    adapters::{
        database::{file::FileDatabase, memory::MemoryDatabase},
        request,
    },
    commands::DomainLogic,
    config::{AppConfig, StoreBackend},
    ports::database::DatabasePort,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log.filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match config.store.backend {
        StoreBackend::Memory => {
            info!("using in-memory store");
            serve(MemoryDatabase::default()).await
        }
        StoreBackend::File => {
            info!(path = %config.store.path.display(), "using file store");
            serve(FileDatabase::new(&config.store.path)).await
        }
    }
}

async fn serve<D>(database: D) -> anyhow::Result<()>
where
    D: DatabasePort + Send + Sync + 'static,
{
    let domain = DomainLogic::new(Arc::new(database));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = request::handle(&domain, &line).await;
        let mut output = serde_json::to_vec(&response)?;
        output.push(b'\n');
        stdout.write_all(&output).await?;
        stdout.flush().await?;
    }

    info!("input closed, shutting down");
    Ok(())
}
