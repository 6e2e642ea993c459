//! End-to-end offline indexing: split, preprocess, weight, partition, build, score.
//!
//! Every stage reads the artifacts of the previous one and writes its own, so a failed stage
//! can be rerun on its own.

use indicatif::{ProgressBar, ProgressStyle};

use crate::artifact::{load, save, Artifact, ArtifactKind, Manifest, ShardReader, ShardWriter};
use crate::config::PipelineConfig;
use crate::document::Document;
use crate::index::build_indexes;
use crate::lexicon::{Lexicon, LexiconPartition};
use crate::normalizer::Normalizer;
use crate::scoring::{length_stats, score_shards, weight_shards};
use crate::splitter::split;
use crate::workers::WorkerPool;
use crate::{Error, Result};

/// What a full run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub manifest: Manifest,
    pub num_terms: usize,
    pub index_shards: Vec<Artifact>,
}

pub struct Pipeline<'n> {
    normalizer: &'n Normalizer,
    config: PipelineConfig,
}

impl<'n> Pipeline<'n> {
    pub fn new(normalizer: &'n Normalizer, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { normalizer, config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage in order.
    pub fn run<S, I>(&self, store: &S, corpus: I) -> Result<RunSummary>
    where
        S: ShardReader + ShardWriter + ?Sized,
        I: IntoIterator<Item = Document>,
    {
        let num_docs = self.split(store, corpus)?;
        self.preprocess(store)?;
        let mut manifest = self.weight(store, num_docs)?;
        let lexicon = self.build_lexicon(store)?;
        let partitions = self.partition(store, &lexicon)?;
        manifest.num_partitions = partitions.len();
        save(store, &Artifact::Manifest, &manifest)?;
        self.build_index(store, &partitions)?;
        let index_shards = self.score(store, &manifest)?;
        tracing::info!(
            num_docs = manifest.num_docs,
            indexed_docs = manifest.indexed_docs,
            num_terms = lexicon.len(),
            index_shards = index_shards.len(),
            "index build complete"
        );
        Ok(RunSummary { manifest, num_terms: lexicon.len(), index_shards })
    }

    /// Writes the corpus as raw shards. Fails on an empty corpus.
    pub fn split<S, I>(&self, store: &S, corpus: I) -> Result<u64>
    where
        S: ShardWriter + ?Sized,
        I: IntoIterator<Item = Document>,
    {
        let (_, num_docs) = split(store, corpus, self.config.split_size)?;
        if num_docs == 0 {
            return Err(Error::Config("the corpus holds no documents".into()));
        }
        Ok(num_docs)
    }

    /// Turns every raw shard into a shard of NormalizedDocuments with raw term counts.
    pub fn preprocess<S: ShardReader + ShardWriter + ?Sized>(&self, store: &S) -> Result<Vec<Artifact>> {
        let raw = store.list(ArtifactKind::Raw)?;
        store.clear(ArtifactKind::Normalized)?;
        let mut written = Vec::with_capacity(raw.len());
        for shard in &raw {
            let docs: Vec<Document> = load(store, shard)?;
            let pool = WorkerPool::new(self.normalizer, self.config.num_workers)?
                .with_progress(self.progress(docs.len() as u64, format!("preprocessing {shard}")));
            let normalized = pool.run(&docs)?;
            tracing::info!(shard = %shard, songs = docs.len(), indexed = normalized.len(), "preprocessed shard");

            let out = Artifact::Normalized(shard.number());
            save(store, &out, &normalized)?;
            written.push(out);
        }
        Ok(written)
    }

    /// Computes document length statistics, applies the TF component and records the manifest.
    pub fn weight<S: ShardReader + ShardWriter + ?Sized>(&self, store: &S, num_docs: u64) -> Result<Manifest> {
        let shards = store.list(ArtifactKind::Normalized)?;
        let (stats, indexed_docs) = length_stats(store, &shards)?;
        let avg_len = stats.average();
        tracing::info!(indexed_docs, avg_len, "document length statistics");

        store.clear(ArtifactKind::Weighted)?;
        weight_shards(store, &shards, avg_len)?;
        let manifest = Manifest::new(num_docs, indexed_docs, avg_len, shards.len());
        save(store, &Artifact::Manifest, &manifest)?;
        Ok(manifest)
    }

    pub fn build_lexicon<S: ShardReader + ShardWriter + ?Sized>(&self, store: &S) -> Result<Lexicon> {
        let shards = store.list(ArtifactKind::Weighted)?;
        let lexicon = Lexicon::build(store, &shards)?;
        tracing::info!(num_terms = lexicon.len(), total_df = lexicon.total_doc_freq(), "computed lexicon");
        save(store, &Artifact::Lexicon, &lexicon)?;
        Ok(lexicon)
    }

    pub fn partition<S: ShardWriter + ?Sized>(&self, store: &S, lexicon: &Lexicon) -> Result<Vec<LexiconPartition>> {
        let partitions = lexicon.partition(self.config.num_partitions)?;
        store.clear(ArtifactKind::Partition)?;
        for p in &partitions {
            save(store, &Artifact::Partition(p.id), &p.terms)?;
        }
        Ok(partitions)
    }

    /// Reads the saved lexicon partitions back, e.g. when resuming at the index build.
    pub fn load_partitions<S: ShardReader + ?Sized>(&self, store: &S) -> Result<Vec<LexiconPartition>> {
        store
            .list(ArtifactKind::Partition)?
            .into_iter()
            .map(|a| Ok::<_, Error>(LexiconPartition { id: a.number(), terms: load(store, &a)? }))
            .collect()
    }

    pub fn build_index<S: ShardReader + ShardWriter + ?Sized>(
        &self,
        store: &S,
        partitions: &[LexiconPartition],
    ) -> Result<Vec<Artifact>> {
        store.clear(ArtifactKind::Postings)?;
        build_indexes(store, partitions, self.config.max_record_bytes)
    }

    /// Applies the IDF component to every built index shard. Must run after the whole index
    /// build, since document frequencies span all records of a term.
    pub fn score<S: ShardReader + ShardWriter + ?Sized>(&self, store: &S, manifest: &Manifest) -> Result<Vec<Artifact>> {
        let shards = store.list(ArtifactKind::Postings)?;
        store.clear(ArtifactKind::Index)?;
        score_shards(store, &shards, manifest.indexed_docs, self.config.max_record_bytes)
    }

    fn progress(&self, len: u64, msg: String) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta} left) {msg}",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(msg);
        pb
    }
}
