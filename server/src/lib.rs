pub mod jobs;

use crate::jobs::{JobRegistry, JobState};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use pubscout_core::cache::CacheStore;
use pubscout_core::search::{rebuild_index, search};
use pubscout_core::store::SledStore;
use pubscout_crawler::{run_full_scrape, CrawlConfig};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub store: SledStore,
    pub cache: Arc<dyn CacheStore>,
    pub jobs: JobRegistry,
    /// Listing endpoint crawled by submitted jobs.
    pub base_url: String,
    pub admin_token: Option<String>,
}

pub fn build_app(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods(Any)
                    .allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/scrape", post(start_scrape))
        .route("/scrape/status/:job_id", get(scrape_status))
        .route("/index/rebuild", post(index_rebuild))
        .with_state(state)
        .layer(cors)
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScrapeParams {
    pub max_pages: usize,
    pub workers: usize,
    pub delay: f64,
    pub headless_listing: bool,
}

impl Default for ScrapeParams {
    fn default() -> Self {
        Self {
            max_pages: 50,
            workers: 8,
            delay: 0.35,
            headless_listing: false,
        }
    }
}

/// Submit a crawl job. Returns 202 with the job id immediately; the crawl
/// runs as a background task and reports through the job registry.
async fn start_scrape(
    State(state): State<AppState>,
    params: Option<Json<ScrapeParams>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let params = params.map(|Json(p)| p).unwrap_or_default();
    let cfg = CrawlConfig {
        base_url: state.base_url.clone(),
        max_pages: params.max_pages,
        workers: params.workers,
        delay_secs: params.delay,
        headless_listing: params.headless_listing,
    };

    let job_id = state.jobs.submit();
    tracing::info!(job_id = %job_id, max_pages = cfg.max_pages, workers = cfg.workers, "scrape job submitted");

    let jobs = state.jobs.clone();
    let store = state.store.clone();
    let cache = state.cache.clone();
    let id = job_id.clone();
    tokio::spawn(async move {
        jobs.mark_started(&id);
        match run_full_scrape(&store, cache.as_ref(), &cfg).await {
            Ok(outcome) => match serde_json::to_value(&outcome) {
                Ok(payload) => jobs.mark_success(&id, payload),
                Err(err) => jobs.mark_failure(&id, err.to_string()),
            },
            Err(err) => {
                tracing::error!(job_id = %id, %err, "scrape job failed");
                jobs.mark_failure(&id, err.to_string());
            }
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "job_id": job_id })),
    )
}

async fn scrape_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let Some(entry) = state.jobs.get(&job_id) else {
        return Err(StatusCode::NOT_FOUND);
    };
    let mut body = serde_json::json!({
        "job_id": job_id,
        "status": entry.state,
        "submitted_at": entry.submitted_at,
    });
    if entry.state == JobState::Success {
        body["result"] = entry.result.unwrap_or(serde_json::Value::Null);
    }
    if let Some(error) = entry.error {
        body["error"] = serde_json::Value::String(error);
    }
    Ok(Json(body))
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
}

/// Rank the corpus against the query. Degrades to empty results when no
/// snapshot exists yet; a cache miss rebuilds inline.
async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let results = search(&state.store, state.cache.as_ref(), &params.query).map_err(|err| {
        tracing::error!(%err, "search failed");
        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    })?;
    Ok(Json(serde_json::json!({ "results": results })))
}

/// Admin-guarded forced rebuild, the operator entry point for cache
/// invalidation.
async fn index_rebuild(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let (documents, snapshot) = rebuild_index(&state.store, state.cache.as_ref())
        .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;
    Ok(Json(serde_json::json!({
        "num_docs": documents.len(),
        "indexed": snapshot.is_some(),
    })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(token) => token,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers
        .get("X-ADMIN-TOKEN")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
