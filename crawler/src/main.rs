use anyhow::Result;
use clap::Parser;
use pubscout_core::cache::MemoryCache;
use pubscout_core::store::SledStore;
use pubscout_crawler::{run_full_scrape, CrawlConfig, DEFAULT_BASE_URL};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "pubscout-crawler")]
#[command(about = "Crawl the publication portal into the local store and rebuild the search index")]
struct Cli {
    /// Sled database directory
    #[arg(long, default_value = "./data/pubscout.sled")]
    db: String,
    /// Listing endpoint to crawl
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,
    /// Maximum listing pages to walk (stops earlier at the first empty page)
    #[arg(long, default_value_t = 50)]
    max_pages: usize,
    /// Detail workers, one exclusive session each
    #[arg(long, default_value_t = 8)]
    workers: usize,
    /// Politeness delay between detail fetches, in seconds
    #[arg(long, default_value_t = 0.35)]
    delay: f64,
    /// Run the listing session headless
    #[arg(long, default_value_t = false)]
    headless_listing: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();

    let store = SledStore::open(&args.db)?;
    let cache = MemoryCache::new();
    let cfg = CrawlConfig {
        base_url: args.base_url,
        max_pages: args.max_pages,
        workers: args.workers,
        delay_secs: args.delay,
        headless_listing: args.headless_listing,
    };

    let outcome = run_full_scrape(&store, &cache, &cfg).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
