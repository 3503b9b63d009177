use anyhow::Result;
use axum::Router;
use clap::Parser;
use pubscout_core::cache::{load_index, CacheStore, MemoryCache};
use pubscout_core::search::rebuild_index;
use pubscout_core::store::SledStore;
use pubscout_server::jobs::JobRegistry;
use pubscout_server::{build_app, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Sled database directory
    #[arg(long, default_value = "./data/pubscout.sled")]
    db: String,
    /// Listing endpoint crawled by submitted jobs
    #[arg(long, default_value = pubscout_crawler::DEFAULT_BASE_URL)]
    base_url: String,
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

    let store = SledStore::open(&args.db)?;
    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());

    // Rebuild on every publication write/delete; the post-write trigger runs
    // on the writing thread with no mutual exclusion against the lazy
    // query-miss rebuild.
    let listener_store = store.clone();
    let listener_cache = cache.clone();
    store.subscribe(Box::new(move |event| {
        tracing::debug!(?event, "publication changed; rebuilding index");
        if let Err(err) = rebuild_index(&listener_store, listener_cache.as_ref()) {
            tracing::error!(%err, "change-triggered index rebuild failed");
        }
    }));

    // Bootstrap check-and-build: populate the cache up front when the store
    // already holds data, so the first query does not pay for the rebuild.
    match load_index(cache.as_ref()) {
        Ok(Some(_)) => {}
        _ => {
            if store.publication_count() > 0 {
                tracing::info!("initializing index cache at startup");
                if let Err(err) = rebuild_index(&store, cache.as_ref()) {
                    tracing::error!(%err, "startup index build failed");
                }
            }
        }
    }

    let state = AppState {
        store,
        cache,
        jobs: JobRegistry::new(),
        base_url: args.base_url,
        admin_token: std::env::var("ADMIN_TOKEN").ok(),
    };
    let app: Router = build_app(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
