use crate::model::{CorpusDocument, DocId};
use crate::tokenizer::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Bump when the snapshot layout changes; a cached snapshot with a different
/// version is treated as a miss and rebuilt.
pub const SNAPSHOT_VERSION: u32 = 1;

/// One tf-idf row, L2-normalized, entries sorted by vocabulary column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub entries: Vec<(u32, f32)>,
}

impl SparseVector {
    /// Dot product over two column-sorted sparse vectors. Rows are normalized
    /// at build time, so this is cosine similarity.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let mut sum = 0.0;
        let (mut i, mut j) = (0, 0);
        while i < self.entries.len() && j < other.entries.len() {
            let (ca, wa) = self.entries[i];
            let (cb, wb) = other.entries[j];
            match ca.cmp(&cb) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += wa * wb;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// The full vector space over one corpus generation. Row `i` of `doc_vectors`
/// belongs to `doc_ids[i]`; the snapshot is immutable once built and is
/// replaced wholesale on every rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub version: u32,
    pub vocabulary: HashMap<String, u32>,
    pub idf: Vec<f32>,
    pub doc_vectors: Vec<SparseVector>,
    pub doc_ids: Vec<DocId>,
}

/// Build the tf-idf space over the whole corpus. Returns `None` for an empty
/// corpus; callers must treat that as "no index", not an error.
///
/// Weighting: raw term count times smoothed idf `ln((1+N)/(1+df)) + 1`, rows
/// L2-normalized. Vocabulary columns are assigned in sorted-term order so
/// rebuilding unchanged data yields an identical space.
pub fn build_snapshot(corpus: &[CorpusDocument]) -> Option<IndexSnapshot> {
    if corpus.is_empty() {
        return None;
    }
    let tokenized: Vec<Vec<String>> = corpus.iter().map(|d| tokenize(&d.text)).collect();

    let terms: BTreeSet<&str> = tokenized
        .iter()
        .flatten()
        .map(|s| s.as_str())
        .collect();
    let vocabulary: HashMap<String, u32> = terms
        .iter()
        .enumerate()
        .map(|(col, term)| (term.to_string(), col as u32))
        .collect();

    let mut df = vec![0u32; vocabulary.len()];
    for tokens in &tokenized {
        let mut seen: HashSet<u32> = HashSet::new();
        for term in tokens {
            if let Some(&col) = vocabulary.get(term.as_str()) {
                if seen.insert(col) {
                    df[col as usize] += 1;
                }
            }
        }
    }

    let n = corpus.len() as f32;
    let idf: Vec<f32> = df
        .iter()
        .map(|&d| ((1.0 + n) / (1.0 + d as f32)).ln() + 1.0)
        .collect();

    let mut doc_vectors = Vec::with_capacity(corpus.len());
    for tokens in &tokenized {
        doc_vectors.push(weigh(tokens, &vocabulary, &idf));
    }

    Some(IndexSnapshot {
        version: SNAPSHOT_VERSION,
        vocabulary,
        idf,
        doc_vectors,
        doc_ids: corpus.iter().map(|d| d.doc_id).collect(),
    })
}

/// Project already-tokenized query terms into the snapshot's space. Terms
/// outside the vocabulary contribute nothing.
pub fn vectorize_query(snapshot: &IndexSnapshot, terms: &[String]) -> SparseVector {
    weigh(terms, &snapshot.vocabulary, &snapshot.idf)
}

fn weigh(terms: &[String], vocabulary: &HashMap<String, u32>, idf: &[f32]) -> SparseVector {
    let mut counts: BTreeMap<u32, u32> = BTreeMap::new();
    for term in terms {
        if let Some(&col) = vocabulary.get(term.as_str()) {
            *counts.entry(col).or_insert(0) += 1;
        }
    }
    let mut entries: Vec<(u32, f32)> = counts
        .into_iter()
        .map(|(col, count)| (col, count as f32 * idf[col as usize]))
        .collect();
    let norm = entries.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
    if norm > 0.0 {
        for entry in entries.iter_mut() {
            entry.1 /= norm;
        }
    }
    SparseVector { entries }
}
