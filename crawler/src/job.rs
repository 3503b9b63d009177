use crate::detail::extract_details;
use crate::listing::crawl_listings;
use crate::merge::persist_records;
use crate::session::Session;
use crate::CrawlConfig;
use anyhow::Result;
use pubscout_core::cache::CacheStore;
use pubscout_core::search::rebuild_index;
use pubscout_core::store::SledStore;
use serde::Serialize;
use std::time::Instant;

/// Stages of one crawl run. A run only moves forward; `Failed` is terminal
/// and reachable from `Listing` (nothing found) or a persistence error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlStage {
    Pending,
    Listing,
    Extracting,
    Persisting,
    Reindexing,
    Done,
    Failed,
}

impl CrawlStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlStage::Pending => "pending",
            CrawlStage::Listing => "listing",
            CrawlStage::Extracting => "extracting",
            CrawlStage::Persisting => "persisting",
            CrawlStage::Reindexing => "reindexing",
            CrawlStage::Done => "done",
            CrawlStage::Failed => "failed",
        }
    }
}

fn advance(from: CrawlStage, to: CrawlStage) -> CrawlStage {
    tracing::info!(from = from.as_str(), to = to.as_str(), "crawl stage transition");
    to
}

/// Terminal payload of a crawl run. `count` is the number of records the
/// extractors produced; links that then failed to save are listed separately
/// as the surface for external retry logic.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status")]
pub enum ScrapeOutcome {
    #[serde(rename = "Completed")]
    Completed {
        count: usize,
        failed_links: Vec<String>,
        elapsed_seconds: f64,
    },
    #[serde(rename = "No publications found")]
    NoPublications { elapsed_seconds: f64 },
}

/// Run a full crawl: enumerate listings, extract details in parallel,
/// persist, then rebuild the search index. An empty listing terminates early
/// with `NoPublications`; a failed post-crawl rebuild is logged but does not
/// fail the run (the cached snapshot just stays stale until the next
/// trigger).
pub async fn run_full_scrape(
    store: &SledStore,
    cache: &dyn CacheStore,
    cfg: &CrawlConfig,
) -> Result<ScrapeOutcome> {
    tracing::info!(
        max_pages = cfg.max_pages,
        workers = cfg.workers,
        delay = cfg.delay_secs,
        "starting scrape run"
    );
    let started = Instant::now();
    let mut stage = advance(CrawlStage::Pending, CrawlStage::Listing);

    let listing_session = Session::open(cfg.headless_listing)?;
    let items = crawl_listings(&listing_session, cfg).await;
    drop(listing_session);
    if items.is_empty() {
        advance(stage, CrawlStage::Failed);
        tracing::warn!("no publications found during listing phase");
        return Ok(ScrapeOutcome::NoPublications {
            elapsed_seconds: started.elapsed().as_secs_f64(),
        });
    }

    stage = advance(stage, CrawlStage::Extracting);
    let records = extract_details(items, cfg).await;

    stage = advance(stage, CrawlStage::Persisting);
    let (saved, failed_links) = persist_records(store, &records)?;

    stage = advance(stage, CrawlStage::Reindexing);
    if let Err(err) = rebuild_index(store, cache) {
        tracing::error!(%err, "index rebuild after crawl failed; cached snapshot left stale");
    }

    advance(stage, CrawlStage::Done);
    let elapsed_seconds = started.elapsed().as_secs_f64();
    tracing::info!(
        count = records.len(),
        saved,
        failed = failed_links.len(),
        elapsed_seconds,
        "scrape run complete"
    );
    Ok(ScrapeOutcome::Completed {
        count: records.len(),
        failed_links,
        elapsed_seconds,
    })
}
