use anyhow::Result;
use axum::Router;
use clap::Parser;
use scour_core::{DocumentStore, IndexHandle, IndexStorage, QueryEngine, RebuildCoordinator, SledStore};
use scour_server::{build_app, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Document store directory
    #[arg(long, default_value = "./store")]
    store: String,
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let store: Arc<dyn DocumentStore> = Arc::new(SledStore::open(&args.store)?);
    let handle = Arc::new(IndexHandle::new());
    let coordinator = Arc::new(RebuildCoordinator::new(
        Arc::clone(&store),
        IndexStorage::new(&args.index),
        Arc::clone(&handle),
    ));
    match coordinator.load_persisted() {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(index = %args.index, "no persisted index; search answers 503 until a rebuild")
        }
        Err(e) => {
            tracing::warn!(index = %args.index, error = %e, "could not load persisted index; search answers 503 until a rebuild")
        }
    }
    let engine = Arc::new(QueryEngine::new(handle, Arc::clone(&store)));

    let state = AppState {
        store,
        engine,
        coordinator,
        admin_token: std::env::var("ADMIN_TOKEN").ok(),
    };
    let app: Router = build_app(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
