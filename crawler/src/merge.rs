use anyhow::Result;
use pubscout_core::model::DetailRecord;
use pubscout_core::store::SledStore;

/// Persist extracted records: upsert each publication by link, replace its
/// author set wholesale, and collect the links that failed to save. A bad
/// record never stops its siblings; the store is flushed once at the end of
/// the loop.
pub fn persist_records(store: &SledStore, records: &[DetailRecord]) -> Result<(usize, Vec<String>)> {
    let mut saved = 0usize;
    let mut failed_links = Vec::new();
    for record in records {
        match persist_one(store, record) {
            Ok(()) => saved += 1,
            Err(err) => {
                tracing::error!(link = %record.link, %err, "failed to save publication");
                failed_links.push(record.link.clone());
            }
        }
    }
    store.flush()?;
    tracing::info!(saved, failed = failed_links.len(), "records persisted");
    Ok((saved, failed_links))
}

fn persist_one(store: &SledStore, record: &DetailRecord) -> Result<()> {
    let abstract_text = Some(record.abstract_text.as_str()).filter(|a| !a.is_empty());
    let (publication, _created) = store.upsert_publication(
        &record.link,
        &record.title,
        record.published_date.as_deref(),
        abstract_text,
    )?;

    let mut author_ids = Vec::with_capacity(record.authors.len());
    for author in &record.authors {
        let saved = store.upsert_author(&author.name, author.profile_url.as_deref())?;
        author_ids.push(saved.id);
    }
    store.replace_author_links(publication.id, &author_ids)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubscout_core::model::AuthorRef;

    fn record(link: &str, title: &str, authors: &[&str]) -> DetailRecord {
        DetailRecord {
            title: title.to_string(),
            link: link.to_string(),
            authors: authors
                .iter()
                .map(|name| AuthorRef {
                    name: name.to_string(),
                    profile_url: None,
                })
                .collect(),
            published_date: Some("2021".to_string()),
            abstract_text: "An abstract about economic growth.".to_string(),
        }
    }

    #[test]
    fn saves_records_and_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();

        let records = vec![
            record("https://example.org/p/1", "One", &["Smith, J."]),
            record("", "Broken link", &[]),
            record("https://example.org/p/2", "Two", &["Jones, K."]),
        ];
        let (saved, failed) = persist_records(&store, &records).unwrap();
        assert_eq!(saved, 2);
        assert_eq!(failed, vec!["".to_string()]);
        assert_eq!(store.publication_count(), 2);
    }

    #[test]
    fn resaving_a_link_replaces_the_author_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();

        let first = vec![record(
            "https://example.org/p/1",
            "One",
            &["Smith, J.", "Jones, K."],
        )];
        persist_records(&store, &first).unwrap();

        let second = vec![record("https://example.org/p/1", "One revised", &["Jones, K."])];
        persist_records(&store, &second).unwrap();

        let doc_id = store.list_documents().unwrap()[0].doc_id;
        let (publication, authors) = store.get_publication_with_authors(doc_id).unwrap().unwrap();
        assert_eq!(publication.title, "One revised");
        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0].name, "Jones, K.");
    }
}
