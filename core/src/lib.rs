//! Offline construction of a multilingual inverted index over song lyrics.
//!
//! The corpus is split into raw shards, each document is normalized and stemmed in its own
//! language, term frequencies are turned into BM25 weights in two passes, and the postings are
//! written as size-bounded index records grouped into lexicographic shards.

pub mod artifact;
pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod lexicon;
pub mod normalizer;
pub mod pipeline;
pub mod scoring;
pub mod splitter;
pub mod store;
pub mod workers;

pub use artifact::{Artifact, ArtifactKind, FsArtifacts, Manifest, MemoryArtifacts, ShardReader, ShardWriter};
pub use config::PipelineConfig;
pub use document::{DocId, Document, Link};
pub use error::{Error, Result};
pub use index::{IndexRecord, NormalizedDocument, Posting};
pub use lexicon::{Lexicon, LexiconPartition};
pub use normalizer::{Mode, Normalizer};
pub use pipeline::{Pipeline, RunSummary};
pub use store::{DocumentStore, SledStore};
