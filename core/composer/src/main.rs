use anyhow::{Context, Result};
use clap::Parser;
use heritage_library_composer::{library_router, AppState};
use heritage_library_store::{BlobStore, DiskBlobStore, LibraryConfig, LibraryStore};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "heritage-library")]
#[command(about = "Heritage Resource Library HTTP service")]
struct Args {
    /// Root of stored media and the knowledge directory
    #[arg(long, env = "RESOURCES_DIR")]
    resources_dir: Option<PathBuf>,

    /// Public origin for media URLs
    #[arg(long, env = "BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:3001")]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    info!("Heritage Resource Library v0.1.0");

    let mut config = LibraryConfig::from_env().context("Invalid library configuration")?;
    if let Some(dir) = args.resources_dir {
        let knowledge_dir = std::env::var_os("KNOWLEDGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| dir.join("knowledge"));
        config.resources_dir = dir;
        config.knowledge_dir = knowledge_dir;
    }
    if let Some(base_url) = args.base_url {
        config = config.with_base_url(base_url);
    }

    info!("Resources: {}", config.resources_dir.display());
    info!("Knowledge: {}", config.knowledge_dir.display());

    let store = LibraryStore::load(&config.knowledge_dir).with_context(|| {
        format!(
            "Failed to load knowledge base from {}",
            config.knowledge_dir.display()
        )
    })?;
    info!(
        "Loaded {} resources across {} categories",
        store.total_resources(),
        store.category_names().len()
    );

    let blobs: Arc<dyn BlobStore> = Arc::new(DiskBlobStore::from_config(&config));
    let state = AppState::new(store, blobs, &config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = library_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    info!("Starting HTTP server on http://{}", args.addr);
    let listener = tokio::net::TcpListener::bind(&args.addr)
        .await
        .with_context(|| format!("Failed to bind {}", args.addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
