use crate::model::{Author, AuthorId, CorpusDocument, DocId, Publication};
use anyhow::{anyhow, bail, Context, Result};
use parking_lot::RwLock;
use sha1::{Digest, Sha1};
use std::path::Path;
use std::sync::Arc;

/// Emitted synchronously on every publication write or delete; the index
/// rebuild subscription hangs off these.
#[derive(Debug, Clone, Copy)]
pub enum ChangeEvent {
    PublicationSaved(DocId),
    PublicationDeleted(DocId),
}

pub type ChangeListener = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Transactional-upsert gateway for publications and authors, backed by sled.
///
/// Trees:
/// - `publications`: big-endian id -> `Publication`
/// - `pub_links`: sha1(link) -> big-endian id (natural-key lookup)
/// - `authors`: big-endian id -> `Author`
/// - `author_names`: trimmed name -> big-endian id (natural-key lookup)
/// - `pub_authors`: big-endian publication id -> `Vec<AuthorId>`
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
    publications: sled::Tree,
    pub_links: sled::Tree,
    authors: sled::Tree,
    author_names: sled::Tree,
    pub_authors: sled::Tree,
    listeners: Arc<RwLock<Vec<ChangeListener>>>,
}

fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn id_from_bytes(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| anyhow!("malformed id key in store"))?;
    Ok(u64::from_be_bytes(arr))
}

fn link_key(link: &str) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(link.as_bytes());
    hasher.finalize().into()
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref())
            .with_context(|| format!("opening store at {}", path.as_ref().display()))?;
        Ok(Self {
            publications: db.open_tree("publications")?,
            pub_links: db.open_tree("pub_links")?,
            authors: db.open_tree("authors")?,
            author_names: db.open_tree("author_names")?,
            pub_authors: db.open_tree("pub_authors")?,
            listeners: Arc::new(RwLock::new(Vec::new())),
            db,
        })
    }

    /// Register a change listener. Listeners run synchronously on the writing
    /// thread, in subscription order.
    pub fn subscribe(&self, listener: ChangeListener) {
        self.listeners.write().push(listener);
    }

    fn emit(&self, event: ChangeEvent) {
        for listener in self.listeners.read().iter() {
            listener(&event);
        }
    }

    /// Upsert a publication by link. A new link creates a record; an existing
    /// link has its title, date, and abstract replaced in place. Returns the
    /// saved record and whether it was created.
    pub fn upsert_publication(
        &self,
        link: &str,
        title: &str,
        published_date: Option<&str>,
        abstract_text: Option<&str>,
    ) -> Result<(Publication, bool)> {
        let link = link.trim();
        if link.is_empty() {
            bail!("publication link must not be empty");
        }
        let title = title.trim();
        if title.is_empty() {
            bail!("publication title must not be empty for {link}");
        }

        let key = link_key(link);
        let published_date = published_date.map(str::to_string);
        let abstract_text = abstract_text.map(str::to_string);

        let (publication, created) = match self.pub_links.get(key)? {
            Some(id_bytes) => {
                let id = id_from_bytes(&id_bytes)?;
                let mut publication = self
                    .get_publication(id)?
                    .ok_or_else(|| anyhow!("dangling link entry for publication {id}"))?;
                publication.title = title.to_string();
                publication.published_date = published_date;
                publication.abstract_text = abstract_text;
                (publication, false)
            }
            None => {
                let id = self.db.generate_id()?;
                let publication = Publication {
                    id,
                    title: title.to_string(),
                    link: link.to_string(),
                    published_date,
                    abstract_text,
                };
                self.pub_links.insert(key, id_key(id).to_vec())?;
                (publication, true)
            }
        };

        self.publications
            .insert(id_key(publication.id), bincode::serialize(&publication)?)?;
        self.emit(ChangeEvent::PublicationSaved(publication.id));
        Ok((publication, created))
    }

    /// Upsert an author by trimmed name. An existing author's profile URL is
    /// backfilled when the new value is non-empty and differs; a present URL
    /// is never overwritten by an empty one.
    pub fn upsert_author(&self, name: &str, profile_url: Option<&str>) -> Result<Author> {
        let name = name.trim();
        if name.is_empty() {
            bail!("author name must not be empty");
        }
        let profile_url = profile_url.map(str::trim).filter(|u| !u.is_empty());

        if let Some(id_bytes) = self.author_names.get(name.as_bytes())? {
            let id = id_from_bytes(&id_bytes)?;
            let mut author = self
                .get_author(id)?
                .ok_or_else(|| anyhow!("dangling name entry for author {id}"))?;
            if let Some(url) = profile_url {
                if author.profile_url.as_deref() != Some(url) {
                    author.profile_url = Some(url.to_string());
                    self.authors
                        .insert(id_key(id), bincode::serialize(&author)?)?;
                }
            }
            return Ok(author);
        }

        let id = self.db.generate_id()?;
        let author = Author {
            id,
            name: name.to_string(),
            profile_url: profile_url.map(str::to_string),
        };
        self.authors
            .insert(id_key(id), bincode::serialize(&author)?)?;
        self.author_names.insert(name.as_bytes(), id_key(id).to_vec())?;
        Ok(author)
    }

    /// Replace a publication's author set wholesale. Authors dropped from the
    /// new set stay in the store as entities; only the links go.
    pub fn replace_author_links(&self, publication_id: DocId, author_ids: &[AuthorId]) -> Result<()> {
        self.pub_authors
            .insert(id_key(publication_id), bincode::serialize(author_ids)?)?;
        Ok(())
    }

    pub fn get_publication(&self, doc_id: DocId) -> Result<Option<Publication>> {
        match self.publications.get(id_key(doc_id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_author(&self, author_id: AuthorId) -> Result<Option<Author>> {
        match self.authors.get(id_key(author_id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_publication_with_authors(
        &self,
        doc_id: DocId,
    ) -> Result<Option<(Publication, Vec<Author>)>> {
        let Some(publication) = self.get_publication(doc_id)? else {
            return Ok(None);
        };
        let author_ids: Vec<AuthorId> = match self.pub_authors.get(id_key(doc_id))? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => Vec::new(),
        };
        let mut authors = Vec::with_capacity(author_ids.len());
        for id in author_ids {
            if let Some(author) = self.get_author(id)? {
                authors.push(author);
            }
        }
        Ok(Some((publication, authors)))
    }

    /// Every indexable document, ascending id: abstract when non-empty, title
    /// otherwise.
    pub fn list_documents(&self) -> Result<Vec<CorpusDocument>> {
        let mut documents = Vec::new();
        for entry in self.publications.iter() {
            let (_, bytes) = entry?;
            let publication: Publication = bincode::deserialize(&bytes)?;
            let text = publication
                .abstract_text
                .as_deref()
                .filter(|a| !a.trim().is_empty())
                .unwrap_or(&publication.title)
                .to_string();
            documents.push(CorpusDocument {
                doc_id: publication.id,
                text,
            });
        }
        Ok(documents)
    }

    /// Remove a publication, its link entry, and its author links. Returns
    /// whether anything was deleted.
    pub fn delete_publication(&self, doc_id: DocId) -> Result<bool> {
        let Some(bytes) = self.publications.remove(id_key(doc_id))? else {
            return Ok(false);
        };
        let publication: Publication = bincode::deserialize(&bytes)?;
        self.pub_links.remove(link_key(&publication.link))?;
        self.pub_authors.remove(id_key(doc_id))?;
        self.emit(ChangeEvent::PublicationDeleted(doc_id));
        Ok(true)
    }

    pub fn publication_count(&self) -> usize {
        self.publications.len()
    }

    /// Flush all trees to disk; the run-level commit point for a crawl.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
