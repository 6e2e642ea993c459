use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;

use crate::artifact::{load, save, Artifact, ArtifactKind, ShardReader, ShardWriter};
use crate::lexicon::LexiconPartition;
use crate::{DocId, Result};

/// A `(document, score)` pair, encoded as `[doc_id, score]`.
///
/// The score is a raw term count after preprocessing, a saturated term frequency after the TF
/// pass and a full BM25 weight after the IDF pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Posting {
    pub doc_id: DocId,
    pub score: f64,
}

impl Posting {
    pub fn new(doc_id: DocId, score: f64) -> Self {
        Self { doc_id, score }
    }

    /// Descending score, ties broken by ascending document id.
    pub fn by_rank(a: &Posting, b: &Posting) -> Ordering {
        b.score.total_cmp(&a.score).then(a.doc_id.cmp(&b.doc_id))
    }
}

impl Serialize for Posting {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        (self.doc_id, self.score).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Posting {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (doc_id, score) = <(DocId, f64)>::deserialize(deserializer)?;
        Ok(Posting { doc_id, score })
    }
}

/// The inverted representation of one document: term -> score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDocument {
    pub doc_id: DocId,
    pub terms: BTreeMap<String, f64>,
}

impl NormalizedDocument {
    /// Bag of words over already normalized tokens.
    pub fn from_tokens<I, S>(doc_id: DocId, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut terms = BTreeMap::new();
        for token in tokens {
            *terms.entry(token.into()).or_insert(0.0) += 1.0;
        }
        Self { doc_id, terms }
    }

    pub fn postings(&self) -> impl Iterator<Item = (&str, Posting)> + '_ {
        self.terms.iter().map(move |(t, s)| (t.as_str(), Posting::new(self.doc_id, *s)))
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Postings of the terms in `[min, max]`.
    fn range<'a>(&'a self, min: &'a str, max: &'a str) -> impl Iterator<Item = (&'a str, Posting)> + 'a {
        self.terms
            .range::<str, _>((Bound::Included(min), Bound::Included(max)))
            .map(move |(t, s)| (t.as_str(), Posting::new(self.doc_id, *s)))
    }
}

/// One storage document of the index: a term and a slice of its posting list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub t: String,
    pub p: Vec<Posting>,
}

impl IndexRecord {
    pub fn encoded_len(&self) -> Result<usize> {
        Ok(serde_json::to_vec(self)?.len())
    }
}

/// The assembled postings of one lexicon partition, sorted by term. A term whose posting list
/// does not fit in one record spans several consecutive records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexShard {
    pub partition: usize,
    pub records: Vec<IndexRecord>,
}

impl IndexShard {
    /// Splits every posting list above `max_record_bytes` and sorts the records by term.
    pub fn from_postings(partition: usize, postings: BTreeMap<String, Vec<Posting>>, max_record_bytes: usize) -> Result<Self> {
        let mut records = Vec::with_capacity(postings.len());
        for (term, list) in postings {
            records.extend(split_record(term, list, max_record_bytes)?);
        }
        // Stable, so chunks of one term keep their order.
        records.sort_by(|a, b| a.t.cmp(&b.t));
        Ok(Self { partition, records })
    }

    /// Groups consecutive records by term.
    pub fn terms(&self) -> impl Iterator<Item = (&str, &[IndexRecord])> + '_ {
        let mut rest = self.records.as_slice();
        std::iter::from_fn(move || {
            let first = rest.first()?;
            let n = rest.iter().take_while(|r| r.t == first.t).count();
            let (group, tail) = rest.split_at(n);
            rest = tail;
            Some((first.t.as_str(), group))
        })
    }

    pub fn num_postings(&self) -> usize {
        self.records.iter().map(|r| r.p.len()).sum()
    }
}

/// Splits `postings` into contiguous records that each encode to at most `max_bytes`.
///
/// A record always holds at least one posting, so a single posting larger than the limit ends
/// up alone in its record.
pub fn split_record(term: String, postings: Vec<Posting>, max_bytes: usize) -> Result<Vec<IndexRecord>> {
    let overhead = IndexRecord { t: term.clone(), p: Vec::new() }.encoded_len()?;
    let mut sizes = Vec::with_capacity(postings.len());
    for p in &postings {
        sizes.push(serde_json::to_vec(p)?.len());
    }
    let total = overhead + sizes.iter().sum::<usize>() + postings.len().saturating_sub(1);
    if total <= max_bytes {
        return Ok(vec![IndexRecord { t: term, p: postings }]);
    }

    let mut records = Vec::new();
    let mut chunk = Vec::new();
    let mut size = overhead;
    for (posting, len) in postings.into_iter().zip(sizes) {
        let added = if chunk.is_empty() { len } else { len + 1 };
        if !chunk.is_empty() && size + added > max_bytes {
            records.push(IndexRecord { t: term.clone(), p: std::mem::take(&mut chunk) });
            size = overhead;
            chunk.push(posting);
            size += len;
            continue;
        }
        chunk.push(posting);
        size += added;
    }
    if !chunk.is_empty() {
        records.push(IndexRecord { t: term, p: chunk });
    }
    Ok(records)
}

/// Collects the postings of every term of `partition` from the given weighted shards.
///
/// Membership is decided by the partition's bounds alone, which holds because partitions are
/// contiguous ranges of the sorted lexicon.
pub fn collect_partition<R: ShardReader + ?Sized>(
    reader: &R,
    partition: &LexiconPartition,
    shards: &[Artifact],
) -> Result<BTreeMap<String, Vec<Posting>>> {
    let mut index: BTreeMap<String, Vec<Posting>> =
        partition.terms.iter().map(|t| (t.clone(), Vec::new())).collect();
    let Some((min, max)) = partition.bounds() else {
        return Ok(index);
    };

    for shard in shards {
        let docs: Vec<NormalizedDocument> = load(reader, shard)?;
        for doc in &docs {
            for (term, posting) in doc.range(min, max) {
                if let Some(list) = index.get_mut(term) {
                    list.push(posting);
                }
            }
        }
        tracing::debug!(partition = partition.id, shard = %shard, "scanned shard");
    }
    Ok(index)
}

/// Builds the unscored index shard of every partition: one full scan of the weighted shards per
/// partition, so only one partition's postings are resident at a time.
pub fn build_indexes<S: ShardReader + ShardWriter + ?Sized>(
    store: &S,
    partitions: &[LexiconPartition],
    max_record_bytes: usize,
) -> Result<Vec<Artifact>> {
    let shards = store.list(ArtifactKind::Weighted)?;
    let mut written = Vec::with_capacity(partitions.len());
    for partition in partitions {
        let postings = collect_partition(store, partition, &shards)?;
        let shard = IndexShard::from_postings(partition.id, postings, max_record_bytes)?;
        tracing::info!(
            partition = partition.id,
            terms = partition.terms.len(),
            records = shard.records.len(),
            postings = shard.num_postings(),
            "built index shard"
        );
        let artifact = Artifact::Postings(partition.id);
        save(store, &artifact, &shard.records)?;
        written.push(artifact);
    }
    Ok(written)
}
