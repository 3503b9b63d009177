use crate::index::{IndexSnapshot, SNAPSHOT_VERSION};
use crate::model::DocumentMap;
use anyhow::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const INDEX_CACHE_KEY: &str = "tfidf_data";
pub const DOCUMENTS_CACHE_KEY: &str = "documents_data";
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// TTL key-value store holding the index snapshot and the document map.
/// Injected rather than ambient so its lifecycle (bootstrap check-and-build,
/// explicit rebuild) is visible at the call sites. Writes are fallible: the
/// backing store may be external.
pub trait CacheStore: Send + Sync {
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-process TTL cache. Expired entries read as absent and are overwritten
/// by the next rebuild.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCache {
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone()))
    }
}

/// Write the snapshot and document map under their two keys with one TTL.
/// Callers only reach this after the full corpus vectorized, so a failure
/// here leaves whatever was cached before untouched.
pub fn store_index(
    cache: &dyn CacheStore,
    snapshot: &IndexSnapshot,
    documents: &DocumentMap,
) -> Result<()> {
    let snapshot_bytes = bincode::serialize(snapshot)?;
    let document_bytes = bincode::serialize(documents)?;
    cache.set(INDEX_CACHE_KEY, snapshot_bytes, CACHE_TTL)?;
    cache.set(DOCUMENTS_CACHE_KEY, document_bytes, CACHE_TTL)?;
    Ok(())
}

/// Load the snapshot/document pair. Anything short of a matching, decodable,
/// current-version pair is a miss: a query must never see one half without
/// the other.
pub fn load_index(cache: &dyn CacheStore) -> Result<Option<(IndexSnapshot, DocumentMap)>> {
    let Some(snapshot_bytes) = cache.get(INDEX_CACHE_KEY)? else {
        return Ok(None);
    };
    let Some(document_bytes) = cache.get(DOCUMENTS_CACHE_KEY)? else {
        return Ok(None);
    };
    let Ok(snapshot) = bincode::deserialize::<IndexSnapshot>(&snapshot_bytes) else {
        tracing::warn!("cached index snapshot failed to decode; treating as miss");
        return Ok(None);
    };
    if snapshot.version != SNAPSHOT_VERSION {
        tracing::warn!(
            cached = snapshot.version,
            expected = SNAPSHOT_VERSION,
            "cached index snapshot has stale version; treating as miss"
        );
        return Ok(None);
    }
    let Ok(documents) = bincode::deserialize::<DocumentMap>(&document_bytes) else {
        tracing::warn!("cached document map failed to decode; treating as miss");
        return Ok(None);
    };
    Ok(Some((snapshot, documents)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build_snapshot;
    use crate::model::CorpusDocument;

    #[test]
    fn expired_entries_read_as_absent() {
        let cache = MemoryCache::new();
        cache.set("k", b"v".to_vec(), Duration::ZERO).unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn live_entries_round_trip() {
        let cache = MemoryCache::new();
        cache.set("k", b"v".to_vec(), Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn pair_load_misses_when_half_is_gone() {
        let cache = MemoryCache::new();
        let corpus = [CorpusDocument {
            doc_id: 1,
            text: "economic growth".into(),
        }];
        let snapshot = build_snapshot(&corpus).unwrap();
        let documents: DocumentMap = [(1, "economic growth".to_string())].into_iter().collect();
        store_index(&cache, &snapshot, &documents).unwrap();
        assert!(load_index(&cache).unwrap().is_some());

        let half = MemoryCache::new();
        half.set(
            INDEX_CACHE_KEY,
            bincode::serialize(&snapshot).unwrap(),
            CACHE_TTL,
        )
        .unwrap();
        assert!(load_index(&half).unwrap().is_none());
    }

    #[test]
    fn stale_snapshot_version_is_a_miss() {
        let cache = MemoryCache::new();
        let corpus = [CorpusDocument {
            doc_id: 1,
            text: "economic growth".into(),
        }];
        let mut snapshot = build_snapshot(&corpus).unwrap();
        snapshot.version = SNAPSHOT_VERSION + 1;
        let documents: DocumentMap = [(1, "economic growth".to_string())].into_iter().collect();
        store_index(&cache, &snapshot, &documents).unwrap();
        assert!(load_index(&cache).unwrap().is_none());
    }
}
