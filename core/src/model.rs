use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type DocId = u64;
pub type AuthorId = u64;

/// A stored publication. `link` is the natural key: upserting the same link
/// updates the existing row instead of creating a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publication {
    pub id: DocId,
    pub title: String,
    pub link: String,
    pub published_date: Option<String>,
    pub abstract_text: Option<String>,
}

/// A stored author, shared across publications. `name` (trimmed) is the
/// natural key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub name: String,
    pub profile_url: Option<String>,
}

/// An author as extracted from a detail page, before it is resolved against
/// the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRef {
    pub name: String,
    pub profile_url: Option<String>,
}

/// One listing row; only `link` matters for dedup, `title` is carried as a
/// fallback for detail pages whose heading fails to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    pub title: String,
    pub link: String,
}

/// A fully extracted detail page, ready for the merger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailRecord {
    pub title: String,
    pub link: String,
    pub authors: Vec<AuthorRef>,
    pub published_date: Option<String>,
    pub abstract_text: String,
}

/// The unit the index is built from: abstract when present, title otherwise.
#[derive(Debug, Clone)]
pub struct CorpusDocument {
    pub doc_id: DocId,
    pub text: String,
}

/// Raw indexed text keyed by document id, cached beside the index snapshot.
pub type DocumentMap = BTreeMap<DocId, String>;

/// One search hit, enriched with the stored record and its authors.
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub doc_id: DocId,
    pub score: f32,
    pub title: String,
    pub link: String,
    pub published_date: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub authors: Vec<AuthorRef>,
}
