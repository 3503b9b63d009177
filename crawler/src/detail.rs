use crate::session::Session;
use crate::CrawlConfig;
use lazy_static::lazy_static;
use pubscout_core::model::{AuthorRef, DetailRecord, ListingItem};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// Abstract blocks at or below this length are placeholder/boilerplate.
const MIN_ABSTRACT_CHARS: usize = 15;

lazy_static! {
    static ref SEL_HEADING: Selector = Selector::parse("h1").expect("valid selector");
    static ref SEL_AUTHOR_PROFILES: Selector =
        Selector::parse(".relations.persons a[href*='/en/persons/']").expect("valid selector");
    static ref SEL_AUTHOR_ANCHORS: Selector =
        Selector::parse(".relations.persons a").expect("valid selector");
    static ref SEL_PERSONS_BLOCK: Selector =
        Selector::parse(".relations.persons").expect("valid selector");
    static ref SEL_DATE_SPAN: Selector = Selector::parse("span.date").expect("valid selector");
    static ref SEL_DATE_TIME_ATTR: Selector =
        Selector::parse("time[datetime]").expect("valid selector");
    static ref SEL_DATE_TIME: Selector = Selector::parse("time").expect("valid selector");
    static ref SEL_ABSTRACTS: Vec<Selector> = [
        "section#abstract .textblock",
        "section.abstract .textblock",
        "div.abstract .textblock",
    ]
    .iter()
    .map(|s| Selector::parse(s).expect("valid selector"))
    .collect();
    /// "Surname, I." pairs, the last-resort author extraction when the
    /// persons block carries no anchors.
    static ref NAME_PAIR: Regex =
        Regex::new(r"[A-Z][A-Za-z'’\-]+,\s*(?:[A-Z]\.?)(?:\s*[A-Z]\.?)*").expect("valid regex");
}

/// Parse one detail page. Every field goes through an ordered list of
/// selector strategies; a strategy that finds nothing falls through to the
/// next, and exhausting the list leaves the field empty rather than failing.
pub fn parse_detail_page(html: &str, link: &str, title_hint: &str) -> DetailRecord {
    let doc = Html::parse_document(html);
    DetailRecord {
        title: extract_title(&doc, title_hint),
        link: link.to_string(),
        authors: extract_authors(&doc, link),
        published_date: extract_published_date(&doc),
        abstract_text: extract_abstract(&doc),
    }
}

fn extract_title(doc: &Html, hint: &str) -> String {
    doc.select(&SEL_HEADING)
        .next()
        .map(|h| h.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| hint.to_string())
}

fn extract_authors(doc: &Html, page_url: &str) -> Vec<AuthorRef> {
    let mut authors = authors_from_anchors(doc, &SEL_AUTHOR_PROFILES, page_url);
    if authors.is_empty() {
        authors = authors_from_anchors(doc, &SEL_AUTHOR_ANCHORS, page_url);
    }
    if authors.is_empty() {
        if let Some(block) = doc.select(&SEL_PERSONS_BLOCK).next() {
            let text = block.text().collect::<String>();
            authors = NAME_PAIR
                .find_iter(&text)
                .map(|m| AuthorRef {
                    name: m.as_str().trim().to_string(),
                    profile_url: None,
                })
                .collect();
        }
    }
    dedup_authors(authors)
}

fn authors_from_anchors(doc: &Html, selector: &Selector, page_url: &str) -> Vec<AuthorRef> {
    let base = Url::parse(page_url).ok();
    let mut out = Vec::new();
    for anchor in doc.select(selector) {
        let name = anchor.text().collect::<String>().trim().to_string();
        if name.is_empty() {
            continue;
        }
        let profile_url = anchor
            .value()
            .attr("href")
            .and_then(|href| resolve_href(base.as_ref(), href));
        out.push(AuthorRef { name, profile_url });
    }
    out
}

fn resolve_href(base: Option<&Url>, href: &str) -> Option<String> {
    if let Ok(absolute) = Url::parse(href) {
        return Some(absolute.to_string());
    }
    base.and_then(|b| b.join(href).ok()).map(|u| u.to_string())
}

/// Collapse duplicate `(name, profile_url)` pairs, first occurrence wins.
pub fn dedup_authors(authors: Vec<AuthorRef>) -> Vec<AuthorRef> {
    let mut seen = HashSet::new();
    authors
        .into_iter()
        .filter(|a| {
            seen.insert((
                a.name.trim().to_string(),
                a.profile_url.clone().unwrap_or_default(),
            ))
        })
        .collect()
}

fn extract_published_date(doc: &Html) -> Option<String> {
    for selector in [&*SEL_DATE_SPAN, &*SEL_DATE_TIME_ATTR, &*SEL_DATE_TIME] {
        if let Some(el) = doc.select(selector).next() {
            let value = el
                .value()
                .attr("datetime")
                .map(str::to_string)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| el.text().collect::<String>());
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn extract_abstract(doc: &Html) -> String {
    for selector in SEL_ABSTRACTS.iter() {
        if let Some(el) = doc.select(selector).next() {
            let text = el.text().collect::<String>().trim().to_string();
            if text.chars().count() > MIN_ABSTRACT_CHARS {
                return text;
            }
        }
    }
    String::new()
}

/// Partition items into at most `workers` contiguous batches of ceiling size;
/// `workers <= 1` keeps everything in one batch. Total count and relative
/// order are preserved.
pub fn chunk(items: Vec<ListingItem>, workers: usize) -> Vec<Vec<ListingItem>> {
    if workers <= 1 || items.is_empty() {
        return vec![items];
    }
    let size = items.len().div_ceil(workers);
    items.chunks(size).map(|c| c.to_vec()).collect()
}

async fn worker_detail_batch(
    worker_id: usize,
    batch: Vec<ListingItem>,
    delay: Duration,
) -> Vec<DetailRecord> {
    let session = match Session::open(true) {
        Ok(session) => session,
        Err(err) => {
            tracing::error!(worker_id, %err, "failed to open worker session; abandoning batch");
            return Vec::new();
        }
    };

    let total = batch.len();
    let mut results = Vec::with_capacity(total);
    for (i, item) in batch.into_iter().enumerate() {
        match session.fetch_page(&item.link).await {
            Some(html) => {
                let record = parse_detail_page(&html, &item.link, &item.title);
                tracing::info!(worker_id, item = i + 1, total, title = %record.title, "extracted detail");
                results.push(record);
            }
            None => {
                tracing::warn!(worker_id, link = %item.link, "detail page failed; skipping item");
            }
        }
        tokio::time::sleep(delay).await;
    }
    results
}

/// Run the detail extraction pool: ceiling-partition the items, give each
/// batch its own worker and exclusive session, and join every worker before
/// returning. A worker that dies forfeits only its own remaining items.
pub async fn extract_details(items: Vec<ListingItem>, cfg: &CrawlConfig) -> Vec<DetailRecord> {
    let delay = Duration::from_secs_f64(cfg.delay_secs.max(0.0));
    let batches = chunk(items, cfg.workers);
    tracing::info!(batches = batches.len(), workers = cfg.workers, "starting detail extraction pool");

    let mut handles = Vec::with_capacity(batches.len());
    for (worker_id, batch) in batches.into_iter().enumerate() {
        handles.push(tokio::spawn(worker_detail_batch(worker_id, batch, delay)));
    }

    let mut all_records = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(mut records) => {
                all_records.append(&mut records);
                tracing::info!(total_so_far = all_records.len(), "worker batch complete");
            }
            Err(err) => {
                tracing::error!(%err, "detail worker crashed; its remaining items are lost");
            }
        }
    }
    all_records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<ListingItem> {
        (0..n)
            .map(|i| ListingItem {
                title: format!("Paper {i}"),
                link: format!("https://example.org/p/{i}"),
            })
            .collect()
    }

    #[test]
    fn chunk_preserves_count_and_order() {
        let batches = chunk(items(10), 3);
        assert!(batches.len() <= 3);
        let flat: Vec<_> = batches.into_iter().flatten().collect();
        assert_eq!(flat, items(10));
    }

    #[test]
    fn chunk_uses_ceiling_sizes() {
        let batches = chunk(items(10), 3);
        assert_eq!(batches[0].len(), 4);
        assert!(batches.iter().all(|b| b.len() <= 4));
    }

    #[test]
    fn single_worker_gets_one_batch() {
        let batches = chunk(items(5), 1);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 5);
    }

    const DETAIL: &str = r#"
        <html><body>
          <h1>Growth and Finance</h1>
          <p class="relations persons">
            <a href="/en/persons/jane-smith">Smith, J.</a>,
            <a href="/en/persons/jane-smith">Smith, J.</a>,
            <a href="/en/persons/ken-jones">Jones, K.</a>
          </p>
          <span class="date">12 Mar 2021</span>
          <section id="abstract"><div class="textblock">
            This abstract is comfortably longer than fifteen characters.
          </div></section>
        </body></html>"#;

    #[test]
    fn parses_detail_fields_with_author_dedup() {
        let record =
            parse_detail_page(DETAIL, "https://example.org/publications/growth", "hint");
        assert_eq!(record.title, "Growth and Finance");
        assert_eq!(record.authors.len(), 2);
        assert_eq!(record.authors[0].name, "Smith, J.");
        assert_eq!(
            record.authors[0].profile_url.as_deref(),
            Some("https://example.org/en/persons/jane-smith")
        );
        assert_eq!(record.published_date.as_deref(), Some("12 Mar 2021"));
        assert!(record.abstract_text.contains("comfortably longer"));
    }

    #[test]
    fn missing_heading_falls_back_to_listing_title() {
        let record = parse_detail_page(
            "<html><body></body></html>",
            "https://example.org/p/1",
            "Listing title",
        );
        assert_eq!(record.title, "Listing title");
        assert!(record.authors.is_empty());
        assert_eq!(record.published_date, None);
    }

    #[test]
    fn short_abstract_is_rejected() {
        let html = r#"<section id="abstract"><div class="textblock">Too short.</div></section>"#;
        let record = parse_detail_page(html, "https://example.org/p/1", "hint");
        assert_eq!(record.abstract_text, "");
    }

    #[test]
    fn time_element_is_a_date_fallback() {
        let html = r#"<html><body><time datetime="2020-01-31">31 January 2020</time></body></html>"#;
        let record = parse_detail_page(html, "https://example.org/p/1", "hint");
        assert_eq!(record.published_date.as_deref(), Some("2020-01-31"));
    }

    #[test]
    fn anchorless_persons_block_uses_name_pairs() {
        let html = r#"
            <html><body>
              <p class="relations persons">Smith, J. A., Jones, K. and others</p>
            </body></html>"#;
        let record = parse_detail_page(html, "https://example.org/p/1", "hint");
        assert_eq!(record.authors.len(), 2);
        assert_eq!(record.authors[0].name, "Smith, J. A.");
        assert_eq!(record.authors[0].profile_url, None);
        assert_eq!(record.authors[1].name, "Jones, K.");
    }
}
