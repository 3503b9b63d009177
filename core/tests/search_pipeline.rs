use anyhow::Result;
use pubscout_core::cache::{CacheStore, MemoryCache};
use pubscout_core::search::{rebuild_index, search};
use pubscout_core::store::SledStore;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

fn open_temp() -> (tempfile::TempDir, SledStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SledStore::open(dir.path()).unwrap();
    (dir, store)
}

fn seed_growth_corpus(store: &SledStore) {
    let rows = [
        ("https://example.org/p/1", "Paper one", "economic growth models"),
        ("https://example.org/p/2", "Paper two", "growth in gdp"),
        ("https://example.org/p/3", "Paper three", "unrelated topic"),
    ];
    for (link, title, abstract_text) in rows {
        let (publication, _) = store
            .upsert_publication(link, title, Some("2021"), Some(abstract_text))
            .unwrap();
        let author = store
            .upsert_author("Smith, J.", Some("https://example.org/persons/js"))
            .unwrap();
        store
            .replace_author_links(publication.id, &[author.id])
            .unwrap();
    }
}

/// Counts every cache access; used to prove the blank-query short-circuit.
#[derive(Default)]
struct CountingCache {
    inner: MemoryCache,
    gets: AtomicUsize,
    sets: AtomicUsize,
}

impl CacheStore for CountingCache {
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, ttl)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }
}

/// Delegates to a real cache until told to fail writes.
#[derive(Default)]
struct FlakyCache {
    inner: MemoryCache,
    fail_writes: AtomicBool,
}

impl CacheStore for FlakyCache {
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("cache backend unavailable");
        }
        self.inner.set(key, value, ttl)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }
}

#[test]
fn growth_query_ranks_matches_and_excludes_nonmatches() {
    let (_dir, store) = open_temp();
    seed_growth_corpus(&store);
    let cache = MemoryCache::new();

    let results = search(&store, &cache, "growth").unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].score >= results[1].score);
    for hit in &results {
        assert!(hit.abstract_text.as_deref().unwrap().contains("growth"));
        assert_eq!(hit.authors.len(), 1);
        assert_eq!(hit.authors[0].name, "Smith, J.");
    }
}

#[test]
fn exact_document_text_ranks_first() {
    let (_dir, store) = open_temp();
    seed_growth_corpus(&store);
    let cache = MemoryCache::new();

    let results = search(&store, &cache, "economic growth models").unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].link, "https://example.org/p/1");
    assert!(results[0].score > 0.0);
}

#[test]
fn blank_query_never_touches_the_cache() {
    let (_dir, store) = open_temp();
    seed_growth_corpus(&store);
    let cache = CountingCache::default();

    let results = search(&store, &cache, "   ").unwrap();
    assert!(results.is_empty());
    assert_eq!(cache.gets.load(Ordering::SeqCst), 0);
    assert_eq!(cache.sets.load(Ordering::SeqCst), 0);
}

#[test]
fn empty_store_degrades_to_empty_results() {
    let (_dir, store) = open_temp();
    let cache = MemoryCache::new();

    let results = search(&store, &cache, "growth").unwrap();
    assert!(results.is_empty());
    // Nothing was cached for the empty corpus.
    assert!(pubscout_core::cache::load_index(&cache).unwrap().is_none());
}

#[test]
fn rebuilding_unchanged_data_keeps_ranked_order() {
    let (_dir, store) = open_temp();
    seed_growth_corpus(&store);
    let cache = MemoryCache::new();

    let first: Vec<_> = search(&store, &cache, "growth")
        .unwrap()
        .into_iter()
        .map(|r| (r.doc_id, r.score))
        .collect();

    rebuild_index(&store, &cache).unwrap();
    let second: Vec<_> = search(&store, &cache, "growth")
        .unwrap()
        .into_iter()
        .map(|r| (r.doc_id, r.score))
        .collect();

    assert_eq!(first, second);
}

#[test]
fn failed_cache_write_propagates_and_keeps_previous_snapshot() {
    let (_dir, store) = open_temp();
    seed_growth_corpus(&store);
    let cache = FlakyCache::default();

    rebuild_index(&store, &cache).unwrap();
    let (before, _) = pubscout_core::cache::load_index(&cache).unwrap().unwrap();

    store
        .upsert_publication(
            "https://example.org/p/4",
            "Paper four",
            None,
            Some("a fresh abstract on inflation"),
        )
        .unwrap();
    cache.fail_writes.store(true, Ordering::SeqCst);

    assert!(rebuild_index(&store, &cache).is_err());
    let (after, _) = pubscout_core::cache::load_index(&cache).unwrap().unwrap();
    assert_eq!(after.doc_ids, before.doc_ids);
}

#[test]
fn updated_publication_replaces_fields_and_author_set() {
    let (_dir, store) = open_temp();
    let (publication, created) = store
        .upsert_publication(
            "https://example.org/p/1",
            "Original title",
            Some("2020"),
            Some("original abstract text"),
        )
        .unwrap();
    assert!(created);
    let dropped = store.upsert_author("Dropped, A.", None).unwrap();
    store
        .replace_author_links(publication.id, &[dropped.id])
        .unwrap();

    let (updated, created) = store
        .upsert_publication(
            "https://example.org/p/1",
            "Replacement title",
            Some("2022"),
            None,
        )
        .unwrap();
    assert!(!created);
    assert_eq!(updated.id, publication.id);
    let kept = store.upsert_author("Kept, B.", None).unwrap();
    store.replace_author_links(updated.id, &[kept.id]).unwrap();

    let (stored, authors) = store
        .get_publication_with_authors(publication.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.title, "Replacement title");
    assert_eq!(stored.published_date.as_deref(), Some("2022"));
    assert_eq!(stored.abstract_text, None);
    assert_eq!(authors.len(), 1);
    assert_eq!(authors[0].name, "Kept, B.");
}
