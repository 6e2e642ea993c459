//! Named intermediate artifacts passed between pipeline stages.
//!
//! Stages talk to storage through [`ShardReader`] and [`ShardWriter`] only, so the same
//! pipeline runs against a directory ([`FsArtifacts`]) or memory ([`MemoryArtifacts`]).

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, create_dir_all, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    Raw,
    Normalized,
    Weighted,
    Manifest,
    Lexicon,
    Partition,
    Postings,
    Index,
}

impl ArtifactKind {
    /// Directory, file stem and extension of the artifacts of this kind.
    fn layout(self) -> (Option<&'static str>, &'static str, &'static str) {
        match self {
            ArtifactKind::Raw => (Some("inputs"), "raw", "json"),
            ArtifactKind::Normalized => (Some("preprocessed"), "ready", "bin"),
            ArtifactKind::Weighted => (Some("weighted"), "ready", "bin"),
            ArtifactKind::Manifest => (None, "manifest", "json"),
            ArtifactKind::Lexicon => (None, "lexicon", "json"),
            ArtifactKind::Partition => (Some("lexicon_splits"), "split", "json"),
            ArtifactKind::Postings => (Some("postings"), "index", "bin"),
            ArtifactKind::Index => (Some("indexes"), "index", "json"),
        }
    }

    fn is_json(self) -> bool {
        self.layout().2 == "json"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Artifact {
    /// Standardized corpus chunk.
    Raw(usize),
    /// NormalizedDocuments with raw term counts.
    Normalized(usize),
    /// NormalizedDocuments with TF scores.
    Weighted(usize),
    Manifest,
    Lexicon,
    Partition(usize),
    /// Index shard before the IDF pass.
    Postings(usize),
    /// Final index shard.
    Index(usize),
}

impl Artifact {
    pub fn numbered(kind: ArtifactKind, n: usize) -> Self {
        match kind {
            ArtifactKind::Raw => Artifact::Raw(n),
            ArtifactKind::Normalized => Artifact::Normalized(n),
            ArtifactKind::Weighted => Artifact::Weighted(n),
            ArtifactKind::Manifest => Artifact::Manifest,
            ArtifactKind::Lexicon => Artifact::Lexicon,
            ArtifactKind::Partition => Artifact::Partition(n),
            ArtifactKind::Postings => Artifact::Postings(n),
            ArtifactKind::Index => Artifact::Index(n),
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::Raw(_) => ArtifactKind::Raw,
            Artifact::Normalized(_) => ArtifactKind::Normalized,
            Artifact::Weighted(_) => ArtifactKind::Weighted,
            Artifact::Manifest => ArtifactKind::Manifest,
            Artifact::Lexicon => ArtifactKind::Lexicon,
            Artifact::Partition(_) => ArtifactKind::Partition,
            Artifact::Postings(_) => ArtifactKind::Postings,
            Artifact::Index(_) => ArtifactKind::Index,
        }
    }

    /// Shard or partition number; zero for singletons.
    pub fn number(&self) -> usize {
        match *self {
            Artifact::Raw(n)
            | Artifact::Normalized(n)
            | Artifact::Weighted(n)
            | Artifact::Partition(n)
            | Artifact::Postings(n)
            | Artifact::Index(n) => n,
            Artifact::Manifest | Artifact::Lexicon => 0,
        }
    }

    fn is_singleton(&self) -> bool {
        matches!(self, Artifact::Manifest | Artifact::Lexicon)
    }

    /// Path relative to an artifact root, e.g. `indexes/index_3.json`.
    pub fn relative_path(&self) -> PathBuf {
        let (dir, stem, ext) = self.kind().layout();
        let file = if self.is_singleton() {
            format!("{stem}.{ext}")
        } else {
            format!("{stem}_{}.{ext}", self.number())
        };
        match dir {
            Some(d) => Path::new(d).join(file),
            None => PathBuf::from(file),
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative_path().display())
    }
}

/// Write side of the artifact boundary. Every artifact has a single writer.
pub trait ShardWriter {
    fn put(&self, artifact: &Artifact, bytes: Vec<u8>) -> Result<()>;

    /// Removes every artifact of `kind`, so a rerun never sees shards of an earlier run.
    fn clear(&self, kind: ArtifactKind) -> Result<()>;
}

/// Read side of the artifact boundary.
pub trait ShardReader {
    fn get(&self, artifact: &Artifact) -> Result<Vec<u8>>;

    /// All artifacts of `kind`, in ascending number order.
    fn list(&self, kind: ArtifactKind) -> Result<Vec<Artifact>>;
}

/// Encodes `value` with the codec of the artifact's kind (JSON or bincode) and stores it.
pub fn save<W, T>(writer: &W, artifact: &Artifact, value: &T) -> Result<()>
where
    W: ShardWriter + ?Sized,
    T: Serialize + ?Sized,
{
    let bytes = if artifact.kind().is_json() {
        serde_json::to_vec(value)?
    } else {
        bincode::serialize(value)?
    };
    writer.put(artifact, bytes)
}

pub fn load<R, T>(reader: &R, artifact: &Artifact) -> Result<T>
where
    R: ShardReader + ?Sized,
    T: DeserializeOwned,
{
    let bytes = reader.get(artifact)?;
    if artifact.kind().is_json() {
        Ok(serde_json::from_slice(&bytes)?)
    } else {
        Ok(bincode::deserialize(&bytes)?)
    }
}

/// Run-level facts later stages and consumers need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Documents in the corpus.
    pub num_docs: u64,
    /// Documents in a supported language; `N` of the IDF.
    pub indexed_docs: u64,
    pub avg_doc_len: f64,
    pub num_shards: usize,
    pub num_partitions: usize,
    pub created_at: String,
    pub version: u32,
}

impl Manifest {
    pub fn new(num_docs: u64, indexed_docs: u64, avg_doc_len: f64, num_shards: usize) -> Self {
        Self {
            num_docs,
            indexed_docs,
            avg_doc_len,
            num_shards,
            num_partitions: 0,
            created_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "".into()),
            version: MANIFEST_VERSION,
        }
    }
}

/// Artifacts stored as files under a root directory.
pub struct FsArtifacts {
    pub root: PathBuf,
}

impl FsArtifacts {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn path(&self, artifact: &Artifact) -> PathBuf {
        self.root.join(artifact.relative_path())
    }

    fn kind_dir(&self, kind: ArtifactKind) -> PathBuf {
        match kind.layout().0 {
            Some(d) => self.root.join(d),
            None => self.root.clone(),
        }
    }
}

impl ShardWriter for FsArtifacts {
    fn put(&self, artifact: &Artifact, bytes: Vec<u8>) -> Result<()> {
        let path = self.path(artifact);
        if let Some(dir) = path.parent() {
            create_dir_all(dir)?;
        }
        // Write then rename, so readers never observe a partial artifact.
        let tmp = path.with_extension("tmp");
        let mut f = File::create(&tmp)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn clear(&self, kind: ArtifactKind) -> Result<()> {
        for artifact in self.list(kind)? {
            fs::remove_file(self.path(&artifact))?;
        }
        Ok(())
    }
}

impl ShardReader for FsArtifacts {
    fn get(&self, artifact: &Artifact) -> Result<Vec<u8>> {
        match fs::read(self.path(artifact)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::MissingArtifact(artifact.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, kind: ArtifactKind) -> Result<Vec<Artifact>> {
        let (_, stem, ext) = kind.layout();
        if matches!(kind, ArtifactKind::Manifest | ArtifactKind::Lexicon) {
            let artifact = Artifact::numbered(kind, 0);
            return Ok(if self.path(&artifact).is_file() { vec![artifact] } else { Vec::new() });
        }

        let entries = match fs::read_dir(self.kind_dir(kind)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let prefix = format!("{stem}_");
        let suffix = format!(".{ext}");
        let mut found = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let number = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(&suffix))
                .and_then(|n| n.parse::<usize>().ok());
            if let Some(n) = number {
                found.push(Artifact::numbered(kind, n));
            }
        }
        found.sort();
        Ok(found)
    }
}

/// Artifacts kept in memory; used by tests and small runs.
#[derive(Default)]
pub struct MemoryArtifacts {
    blobs: RwLock<BTreeMap<Artifact, Vec<u8>>>,
}

impl MemoryArtifacts {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ShardWriter for MemoryArtifacts {
    fn put(&self, artifact: &Artifact, bytes: Vec<u8>) -> Result<()> {
        self.blobs.write().insert(*artifact, bytes);
        Ok(())
    }

    fn clear(&self, kind: ArtifactKind) -> Result<()> {
        self.blobs.write().retain(|a, _| a.kind() != kind);
        Ok(())
    }
}

impl ShardReader for MemoryArtifacts {
    fn get(&self, artifact: &Artifact) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .get(artifact)
            .cloned()
            .ok_or_else(|| Error::MissingArtifact(artifact.to_string()))
    }

    fn list(&self, kind: ArtifactKind) -> Result<Vec<Artifact>> {
        Ok(self.blobs.read().keys().filter(|a| a.kind() == kind).copied().collect())
    }
}
