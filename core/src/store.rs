//! Loading the corpus and the finished index into the document store.
//!
//! The store is a key-value collection with a hard per-document size ceiling that can look up
//! songs by id and index records by term.

use std::path::Path;

use crate::artifact::{load, ArtifactKind, ShardReader};
use crate::document::Document;
use crate::index::IndexRecord;
use crate::{DocId, Error, Result};

/// Largest document the store accepts.
pub const STORAGE_CEILING_BYTES: usize = 16 * 1024 * 1024;

pub trait DocumentStore {
    fn insert_document(&self, doc: &Document) -> Result<()>;

    /// Appends `record` to the records of its term.
    fn insert_record(&self, record: &IndexRecord) -> Result<()>;

    fn document(&self, id: DocId) -> Result<Option<Document>>;

    /// Every record stored for `term`, in insertion order.
    fn records(&self, term: &str) -> Result<Vec<IndexRecord>>;

    /// Drops every index record, keeping the songs.
    fn clear_records(&self) -> Result<()>;
}

/// [`DocumentStore`] on an embedded `sled` database.
///
/// Songs live in the `songs` tree keyed by big-endian id. Index records live in the `index`
/// tree keyed by `term 0x00 seq`, so the records of a term are one prefix scan away.
pub struct SledStore {
    db: sled::Db,
    songs: sled::Tree,
    index: sled::Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let songs = db.open_tree("songs")?;
        let index = db.open_tree("index")?;
        Ok(Self { db, songs, index })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn term_prefix(term: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(term.len() + 1);
        key.extend_from_slice(term.as_bytes());
        key.push(0);
        key
    }

    fn check_size(key: impl FnOnce() -> String, bytes: &[u8]) -> Result<()> {
        if bytes.len() > STORAGE_CEILING_BYTES {
            return Err(Error::RecordTooLarge { key: key(), size: bytes.len(), limit: STORAGE_CEILING_BYTES });
        }
        Ok(())
    }
}

impl DocumentStore for SledStore {
    fn insert_document(&self, doc: &Document) -> Result<()> {
        let bytes = serde_json::to_vec(doc)?;
        Self::check_size(|| format!("song {}", doc.id), &bytes)?;
        self.songs.insert(doc.id.to_be_bytes(), bytes)?;
        Ok(())
    }

    fn insert_record(&self, record: &IndexRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        Self::check_size(|| format!("term {}", record.t), &bytes)?;
        let prefix = Self::term_prefix(&record.t);
        let seq = match self.index.scan_prefix(&prefix).keys().next_back() {
            Some(last) => {
                let last = last?;
                let mut n = [0u8; 4];
                n.copy_from_slice(&last[prefix.len()..]);
                u32::from_be_bytes(n) + 1
            }
            None => 0,
        };
        let mut key = prefix;
        key.extend_from_slice(&seq.to_be_bytes());
        self.index.insert(key, bytes)?;
        Ok(())
    }

    fn document(&self, id: DocId) -> Result<Option<Document>> {
        match self.songs.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn records(&self, term: &str) -> Result<Vec<IndexRecord>> {
        let mut out = Vec::new();
        for item in self.index.scan_prefix(Self::term_prefix(term)) {
            let (_, bytes) = item?;
            out.push(serde_json::from_slice(&bytes)?);
        }
        Ok(out)
    }

    fn clear_records(&self) -> Result<()> {
        self.index.clear()?;
        Ok(())
    }
}

/// Inserts every song of the `Raw` shards. Returns the number of songs stored.
pub fn load_documents<R, S>(reader: &R, store: &S) -> Result<u64>
where
    R: ShardReader + ?Sized,
    S: DocumentStore + ?Sized,
{
    let mut n = 0;
    for shard in reader.list(ArtifactKind::Raw)? {
        let docs: Vec<Document> = load(reader, &shard)?;
        for doc in &docs {
            store.insert_document(doc)?;
        }
        n += docs.len() as u64;
        tracing::debug!(shard = %shard, songs = docs.len(), "loaded songs");
    }
    Ok(n)
}

/// Replaces the stored index with the records of the final `Index` shards. Returns the number
/// of records stored.
pub fn load_index<R, S>(reader: &R, store: &S) -> Result<u64>
where
    R: ShardReader + ?Sized,
    S: DocumentStore + ?Sized,
{
    store.clear_records()?;
    let mut n = 0;
    for shard in reader.list(ArtifactKind::Index)? {
        let records: Vec<IndexRecord> = load(reader, &shard)?;
        for record in &records {
            store.insert_record(record)?;
        }
        n += records.len() as u64;
        tracing::debug!(shard = %shard, records = records.len(), "loaded index records");
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{save, Artifact, MemoryArtifacts};
    use crate::document::Link;
    use crate::index::Posting;
    use std::collections::BTreeMap;

    fn song(id: DocId) -> Document {
        Document {
            id,
            language: "en".into(),
            title: "t".into(),
            lyrics: "l".into(),
            album: "a".into(),
            author: Link::new("x", None),
            tags: vec![],
            credits: BTreeMap::new(),
            url: None,
            image_url: None,
            video_url: None,
        }
    }

    #[test]
    fn records_of_a_term_come_back_in_order() {
        let store = SledStore::temporary().unwrap();
        let a1 = IndexRecord { t: "love".into(), p: vec![Posting::new(1, 2.0)] };
        let a2 = IndexRecord { t: "love".into(), p: vec![Posting::new(2, 1.0)] };
        let b = IndexRecord { t: "lover".into(), p: vec![Posting::new(3, 1.0)] };
        store.insert_record(&a1).unwrap();
        store.insert_record(&b).unwrap();
        store.insert_record(&a2).unwrap();

        assert_eq!(store.records("love").unwrap(), vec![a1, a2]);
        assert_eq!(store.records("lover").unwrap(), vec![b]);
        assert!(store.records("lov").unwrap().is_empty());
    }

    #[test]
    fn oversized_documents_are_rejected() {
        let store = SledStore::temporary().unwrap();
        let mut doc = song(1);
        doc.lyrics = "x".repeat(STORAGE_CEILING_BYTES);
        assert!(matches!(store.insert_document(&doc), Err(Error::RecordTooLarge { .. })));
        assert!(store.document(1).unwrap().is_none());
    }

    #[test]
    fn loads_artifacts_into_store() {
        let artifacts = MemoryArtifacts::new();
        save(&artifacts, &Artifact::Raw(0), &vec![song(5), song(6)]).unwrap();
        save(&artifacts, &Artifact::Index(0), &vec![IndexRecord { t: "a".into(), p: vec![Posting::new(5, 0.3)] }]).unwrap();

        let store = SledStore::temporary().unwrap();
        assert_eq!(load_documents(&artifacts, &store).unwrap(), 2);
        assert_eq!(load_index(&artifacts, &store).unwrap(), 1);
        assert_eq!(store.document(6).unwrap(), Some(song(6)));
        assert_eq!(store.records("a").unwrap()[0].p, vec![Posting::new(5, 0.3)]);
    }

    #[test]
    fn reloading_replaces_index_records() {
        let artifacts = MemoryArtifacts::new();
        save(&artifacts, &Artifact::Raw(0), &vec![song(5)]).unwrap();
        save(&artifacts, &Artifact::Index(0), &vec![IndexRecord { t: "a".into(), p: vec![Posting::new(5, 0.3)] }]).unwrap();

        let store = SledStore::temporary().unwrap();
        for _ in 0..2 {
            load_documents(&artifacts, &store).unwrap();
            assert_eq!(load_index(&artifacts, &store).unwrap(), 1);
        }
        assert_eq!(store.records("a").unwrap().len(), 1);
        assert_eq!(store.document(5).unwrap(), Some(song(5)));
    }
}
