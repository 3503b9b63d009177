use crate::session::Session;
use crate::CrawlConfig;
use lazy_static::lazy_static;
use pubscout_core::model::ListingItem;
use scraper::{Html, Selector};
use std::collections::HashSet;

lazy_static! {
    static ref SEL_ROW: Selector = Selector::parse(".result-container").expect("valid selector");
    static ref SEL_TITLE_LINK: Selector = Selector::parse("h3.title a").expect("valid selector");
}

const NO_RESULTS_MARKER: &str = "No results";

/// Parse one listing page into `{title, link}` rows. Rows missing either
/// field are skipped.
pub fn parse_listing_page(html: &str) -> Vec<ListingItem> {
    let doc = Html::parse_document(html);
    let mut rows = Vec::new();
    for card in doc.select(&SEL_ROW) {
        let Some(anchor) = card.select(&SEL_TITLE_LINK).next() else {
            continue;
        };
        let title = anchor.text().collect::<String>().trim().to_string();
        let link = anchor
            .value()
            .attr("href")
            .unwrap_or_default()
            .trim()
            .to_string();
        if !title.is_empty() && !link.is_empty() {
            rows.push(ListingItem { title, link });
        }
    }
    rows
}

/// Drop repeated links, keeping the first occurrence and its order.
pub fn dedupe_by_link(rows: Vec<ListingItem>) -> Vec<ListingItem> {
    let mut seen: HashSet<String> = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.link.clone()))
        .collect()
}

/// Walk listing pages `0..max_pages` sequentially, stopping at the first page
/// that yields no rows. A fetch timeout counts as an empty page. The result
/// never contains two items with the same link.
pub async fn crawl_listings(session: &Session, cfg: &CrawlConfig) -> Vec<ListingItem> {
    session.dismiss_cookie_banner(&cfg.base_url).await;

    let mut all_rows: Vec<ListingItem> = Vec::new();
    for page in 0..cfg.max_pages {
        let url = format!("{}?page={}", cfg.base_url, page);
        tracing::info!(page = page + 1, max_pages = cfg.max_pages, %url, "fetching listing page");
        let rows = match session.fetch_page(&url).await {
            Some(html) => {
                let rows = parse_listing_page(&html);
                if rows.is_empty() && html.contains(NO_RESULTS_MARKER) {
                    tracing::info!(page = page + 1, "explicit no-results marker");
                }
                rows
            }
            None => Vec::new(),
        };
        if rows.is_empty() {
            tracing::info!(page = page + 1, "empty listing page; stopping early");
            break;
        }
        tracing::info!(page = page + 1, found = rows.len(), "listing rows parsed");
        all_rows.extend(rows);
    }

    let unique = dedupe_by_link(all_rows);
    tracing::info!(unique = unique.len(), "collected unique publication links");
    unique
}
