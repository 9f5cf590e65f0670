use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::http::Method;
use axum::routing::get;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use papergraph_core::config_file::load_config;
use papergraph_core::{Config, GraphStore};

mod handlers;
mod state;

use state::AppState;

/// Read-only JSON API over the paper graph database
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database (overrides PAPERGRAPH_DB and config files)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Address to listen on (default from config, else 127.0.0.1:5555)
    #[arg(long)]
    bind: Option<String>,
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/api/papers", get(handlers::nodes::papers))
        .route("/api/nodes", get(handlers::nodes::nodes))
        .route("/api/edges", get(handlers::edges::edges))
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = Config::from_file(&load_config()).with_env();
    if let Some(db) = args.db {
        config.db_path = db;
    }
    if let Some(bind) = args.bind {
        config.web_bind = bind;
    }

    let store = GraphStore::open_existing(&config.db_path)
        .with_context(|| format!("cannot open database {}", config.db_path.display()))?;
    let app = router(Arc::new(AppState::new(store)));

    let listener = tokio::net::TcpListener::bind(&config.web_bind)
        .await
        .with_context(|| format!("cannot bind {}", config.web_bind))?;
    println!("Listening on http://{}", listener.local_addr()?);
    tracing::info!(db = %config.db_path.display(), "serving paper graph");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
