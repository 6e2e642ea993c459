//! Corpus lexicon (term -> document frequency) and its load-balanced partitioning.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::artifact::{load, Artifact, ShardReader};
use crate::index::NormalizedDocument;
use crate::{Error, Result};

/// Every distinct term of the corpus with its document frequency, sorted by term.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lexicon {
    pub terms: Vec<(String, u64)>,
}

impl Lexicon {
    /// Counts, for each term, the number of documents containing it.
    pub fn from_documents<'a, I>(docs: I) -> Self
    where
        I: IntoIterator<Item = &'a NormalizedDocument>,
    {
        let mut counts = LexiconCounter::default();
        for doc in docs {
            counts.add(doc);
        }
        counts.finish()
    }

    /// Scans every shard once.
    pub fn build<R: ShardReader + ?Sized>(reader: &R, shards: &[Artifact]) -> Result<Self> {
        let mut counts = LexiconCounter::default();
        for shard in shards {
            let docs: Vec<NormalizedDocument> = load(reader, shard)?;
            for doc in &docs {
                counts.add(doc);
            }
        }
        Ok(counts.finish())
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn doc_freq(&self, term: &str) -> Option<u64> {
        self.terms
            .binary_search_by(|(t, _)| t.as_str().cmp(term))
            .ok()
            .map(|i| self.terms[i].1)
    }

    pub fn total_doc_freq(&self) -> u64 {
        self.terms.iter().map(|(_, df)| df).sum()
    }

    /// Splits the lexicon into `num_partitions` contiguous ranges of roughly equal total
    /// document frequency.
    ///
    /// Terms are walked in order and added to the current partition; once its document
    /// frequency reaches `total / num_partitions` the next term opens a new partition. The last
    /// partition takes whatever remains, and trailing partitions may be empty when a few terms
    /// dominate the total.
    pub fn partition(&self, num_partitions: usize) -> Result<Vec<LexiconPartition>> {
        if num_partitions == 0 {
            return Err(Error::Config("number of partitions must be at least 1".into()));
        }
        if num_partitions > self.len() {
            return Err(Error::Config(format!(
                "{num_partitions} partitions requested but the lexicon has only {} terms",
                self.len()
            )));
        }

        let total = self.total_doc_freq() as u128;
        let k = num_partitions as u128;
        let mut partitions: Vec<LexiconPartition> =
            (0..num_partitions).map(|id| LexiconPartition { id, terms: Vec::new() }).collect();
        let mut current = 0;
        let mut acc: u128 = 0;
        for (term, df) in &self.terms {
            // acc >= total / k, kept in integers
            if acc * k >= total && current + 1 < num_partitions && !partitions[current].terms.is_empty() {
                current += 1;
                acc = 0;
            }
            partitions[current].terms.push(term.clone());
            acc += *df as u128;
        }
        Ok(partitions)
    }
}

#[derive(Default)]
struct LexiconCounter {
    counts: BTreeMap<String, u64>,
}

impl LexiconCounter {
    fn add(&mut self, doc: &NormalizedDocument) {
        for term in doc.terms.keys() {
            match self.counts.get_mut(term.as_str()) {
                Some(df) => *df += 1,
                None => {
                    self.counts.insert(term.clone(), 1);
                }
            }
        }
    }

    fn finish(self) -> Lexicon {
        Lexicon { terms: self.counts.into_iter().collect() }
    }
}

/// A contiguous, alphabetically ordered slice of the lexicon's terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexiconPartition {
    pub id: usize,
    pub terms: Vec<String>,
}

impl LexiconPartition {
    /// The smallest and largest term, `None` for an empty partition.
    pub fn bounds(&self) -> Option<(&str, &str)> {
        Some((self.terms.first()?.as_str(), self.terms.last()?.as_str()))
    }

    /// Range membership; only meaningful because partitions are contiguous.
    pub fn contains(&self, term: &str) -> bool {
        self.bounds().is_some_and(|(min, max)| min <= term && term <= max)
    }
}
