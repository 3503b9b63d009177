use crate::cache::{load_index, store_index, CacheStore};
use crate::index::{build_snapshot, vectorize_query, IndexSnapshot};
use crate::model::{AuthorRef, DocId, DocumentMap, RankedResult};
use crate::store::SledStore;
use crate::tokenizer::tokenize;
use anyhow::Result;
use std::cmp::Ordering;

pub const MAX_RESULTS: usize = 50;

/// Rebuild the full vector space from the store and cache the snapshot and
/// document map together. An empty corpus writes nothing and returns no
/// snapshot; callers treat that as "no results", not an error.
///
/// Triggered by publication change events, by crawl completion, and lazily by
/// a query-time cache miss. The triggers are not mutually exclusive: two
/// rebuilds may run concurrently and the cache is last-write-wins, so a
/// slower rebuild can overwrite a newer one. Known race, inherited behavior.
pub fn rebuild_index(
    store: &SledStore,
    cache: &dyn CacheStore,
) -> Result<(DocumentMap, Option<IndexSnapshot>)> {
    let corpus = store.list_documents()?;
    let documents: DocumentMap = corpus
        .iter()
        .map(|d| (d.doc_id, d.text.clone()))
        .collect();

    let Some(snapshot) = build_snapshot(&corpus) else {
        tracing::info!("corpus is empty; index cache left untouched");
        return Ok((documents, None));
    };

    store_index(cache, &snapshot, &documents)?;
    tracing::info!(
        num_docs = snapshot.doc_ids.len(),
        num_terms = snapshot.vocabulary.len(),
        "index rebuilt"
    );
    Ok((documents, Some(snapshot)))
}

/// Rank the corpus against a free-text query: cosine similarity in the cached
/// tf-idf space, descending score, ties broken by ascending doc id, top 50,
/// score-positive hits only, each enriched from the store.
///
/// A blank query returns empty without touching the cache; a cache miss
/// rebuilds synchronously.
pub fn search(store: &SledStore, cache: &dyn CacheStore, query: &str) -> Result<Vec<RankedResult>> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Vec::new());
    }

    let (snapshot, documents) = match load_index(cache)? {
        Some(pair) => pair,
        None => {
            tracing::info!("index cache miss; rebuilding");
            let (documents, snapshot) = rebuild_index(store, cache)?;
            match snapshot {
                Some(snapshot) => (snapshot, documents),
                None => return Ok(Vec::new()),
            }
        }
    };
    if documents.is_empty() {
        return Ok(Vec::new());
    }

    let query_vector = vectorize_query(&snapshot, &tokenize(query));
    let mut scored: Vec<(DocId, f32)> = snapshot
        .doc_ids
        .iter()
        .zip(&snapshot.doc_vectors)
        .map(|(doc_id, row)| (*doc_id, query_vector.dot(row)))
        .filter(|(_, score)| *score > 0.0)
        .collect();
    // Equal scores fall back to ascending doc id so ranking is stable across
    // rebuilds of unchanged data.
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(MAX_RESULTS);

    let mut results = Vec::with_capacity(scored.len());
    for (doc_id, score) in scored {
        match store.get_publication_with_authors(doc_id)? {
            Some((publication, authors)) => results.push(RankedResult {
                doc_id,
                score,
                title: publication.title,
                link: publication.link,
                published_date: publication.published_date,
                abstract_text: publication.abstract_text,
                authors: authors
                    .into_iter()
                    .map(|a| AuthorRef {
                        name: a.name,
                        profile_url: a.profile_url,
                    })
                    .collect(),
            }),
            None => tracing::warn!(doc_id, "ranked document missing from store; skipping"),
        }
    }
    Ok(results)
}
