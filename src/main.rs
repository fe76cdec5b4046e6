use anyhow::Result;
use clap::Parser;
use durentity::persist::{FileStore, MemoryStore, Store};
use durentity::Coordinator;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Durable entity coordination engine with the item-tracking sample domain.
#[derive(Parser)]
#[command(name = "durentity", version, about)]
struct Cli {
    /// Address for the HTTP ingress.
    #[arg(long, default_value = "127.0.0.1:7071", env = "DURENTITY_ADDR")]
    addr: String,

    /// Directory for entity snapshots and workflow histories. In-memory
    /// storage when omitted.
    #[arg(long, env = "DURENTITY_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let store: Arc<dyn Store> = match &cli.data_dir {
        Some(dir) => Arc::new(FileStore::open(dir)?),
        None => Arc::new(MemoryStore::new()),
    };

    let coord = Arc::new(Coordinator::new(store));
    durentity::tracking::register(&coord);

    durentity::server::serve(coord, &cli.addr).await
}
