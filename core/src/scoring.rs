//! Two-phase BM25 weighting.
//!
//! The length-normalized term-frequency part is applied to every normalized document before the
//! index is built; the inverse document frequency is applied to the assembled index shards once
//! every posting of a term is known.

use crate::artifact::{load, save, Artifact, ShardReader, ShardWriter};
use crate::index::{split_record, IndexRecord, IndexShard, NormalizedDocument, Posting};
use crate::Result;

/// Constant part of the document length normalization.
pub const LENGTH_NORM_BASE: f64 = 0.5;

/// Weight of the relative document length in the normalization.
pub const LENGTH_NORM_SLOPE: f64 = 1.5;

/// Smoothing added to both sides of the IDF ratio.
pub const IDF_SMOOTHING: f64 = 0.5;

/// Number of terms in a document, counting repetitions.
pub fn document_length(doc: &NormalizedDocument) -> f64 {
    doc.terms.values().sum()
}

/// Running document length statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LengthStats {
    /// Documents that produced at least one posting.
    pub docs: u64,
    pub total_length: f64,
}

impl LengthStats {
    pub fn add(&mut self, doc: &NormalizedDocument) {
        if !doc.is_empty() {
            self.docs += 1;
            self.total_length += document_length(doc);
        }
    }

    pub fn average(&self) -> f64 {
        if self.docs == 0 {
            0.0
        } else {
            self.total_length / self.docs as f64
        }
    }
}

/// `0.5 + 1.5 * (len / avg_len)`
pub fn length_norm(len: f64, avg_len: f64) -> f64 {
    LENGTH_NORM_BASE + LENGTH_NORM_SLOPE * (len / avg_len)
}

/// Saturating term frequency `f / (f + norm)`.
pub fn saturate(freq: f64, norm: f64) -> f64 {
    freq / (freq + norm)
}

/// `log10((n - df + 0.5) / (df + 0.5))`
pub fn idf(num_docs: u64, doc_freq: u64) -> f64 {
    let n = num_docs as f64;
    let df = doc_freq as f64;
    ((n - df + IDF_SMOOTHING) / (df + IDF_SMOOTHING)).log10()
}

/// Replaces every raw count of `doc` with its saturated, length-normalized term frequency.
pub fn apply_tf(doc: &mut NormalizedDocument, avg_len: f64) {
    if doc.is_empty() {
        return;
    }
    let norm = length_norm(document_length(doc), avg_len);
    for score in doc.terms.values_mut() {
        *score = saturate(*score, norm);
    }
}

/// Scans the normalized shards and returns their combined length statistics and document count.
pub fn length_stats<R: ShardReader + ?Sized>(reader: &R, shards: &[Artifact]) -> Result<(LengthStats, u64)> {
    let mut stats = LengthStats::default();
    let mut num_docs = 0;
    for shard in shards {
        let docs: Vec<NormalizedDocument> = load(reader, shard)?;
        num_docs += docs.len() as u64;
        for doc in &docs {
            stats.add(doc);
        }
    }
    Ok((stats, num_docs))
}

/// Rewrites every `Normalized(i)` shard as `Weighted(i)` with TF scores.
pub fn weight_shards<S: ShardReader + ShardWriter + ?Sized>(
    store: &S,
    shards: &[Artifact],
    avg_len: f64,
) -> Result<Vec<Artifact>> {
    let mut written = Vec::with_capacity(shards.len());
    for shard in shards {
        let mut docs: Vec<NormalizedDocument> = load(store, shard)?;
        for doc in docs.iter_mut() {
            apply_tf(doc, avg_len);
        }
        let out = Artifact::Weighted(shard.number());
        save(store, &out, &docs)?;
        written.push(out);
    }
    Ok(written)
}

/// Turns the TF scores of `shard` into BM25 weights and sorts every posting list by descending
/// weight, ties by ascending document id.
///
/// The document frequency of a term is the length of its whole posting list, so records split
/// across several storage documents are reassembled first and split again afterwards.
pub fn apply_idf(shard: IndexShard, num_docs: u64, max_record_bytes: usize) -> Result<IndexShard> {
    let mut records = Vec::with_capacity(shard.records.len());
    for (term, group) in shard.terms() {
        let mut postings: Vec<Posting> = group.iter().flat_map(|r| r.p.iter().copied()).collect();
        let weight = idf(num_docs, postings.len() as u64);
        for p in postings.iter_mut() {
            p.score *= weight;
        }
        postings.sort_by(Posting::by_rank);
        records.extend(split_record(term.to_string(), postings, max_record_bytes)?);
    }
    Ok(IndexShard { partition: shard.partition, records })
}

/// Rewrites every `Postings(i)` shard as the final `Index(i)`.
pub fn score_shards<S: ShardReader + ShardWriter + ?Sized>(
    store: &S,
    shards: &[Artifact],
    num_docs: u64,
    max_record_bytes: usize,
) -> Result<Vec<Artifact>> {
    let mut written = Vec::with_capacity(shards.len());
    for artifact in shards {
        let records: Vec<IndexRecord> = load(store, artifact)?;
        let shard = IndexShard { partition: artifact.number(), records };
        let scored = apply_idf(shard, num_docs, max_record_bytes)?;
        let out = Artifact::Index(scored.partition);
        save(store, &out, &scored.records)?;
        tracing::debug!(shard = %out, records = scored.records.len(), "applied idf");
        written.push(out);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::MemoryArtifacts;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn bm25_reference_values() {
        let norm = length_norm(100.0, 50.0);
        assert!(close(norm, 3.5));
        // 3 / (3 + 3.5), not the 0.42857 sometimes quoted for this example; the weight follows.
        let tf = saturate(3.0, norm);
        assert!(close(tf, 3.0 / 6.5));
        let w = idf(1000, 10);
        assert!(close(w, 1.974665), "idf {w}");
        assert!(close(tf * w, 0.911384), "weight {}", tf * w);
    }

    #[test]
    fn average_skips_empty_documents() {
        let mut stats = LengthStats::default();
        stats.add(&NormalizedDocument::from_tokens(1, ["a", "a", "b"]));
        stats.add(&NormalizedDocument::from_tokens(2, ["c"]));
        stats.add(&NormalizedDocument::from_tokens(3, Vec::<String>::new()));
        assert_eq!(stats.docs, 2);
        assert!(close(stats.average(), 2.0));
    }

    #[test]
    fn tf_pass_uses_document_length() {
        let mut doc = NormalizedDocument::from_tokens(1, ["x", "x", "x", "y"]);
        apply_tf(&mut doc, 2.0);
        // len 4, avg 2 => norm 3.5
        assert!(close(doc.terms["x"], 3.0 / 6.5));
        assert!(close(doc.terms["y"], 1.0 / 4.5));
    }

    #[test]
    fn idf_counts_postings_across_split_records() {
        let records = vec![
            IndexRecord { t: "a".into(), p: vec![Posting::new(1, 0.5), Posting::new(2, 0.25)] },
            IndexRecord { t: "a".into(), p: vec![Posting::new(3, 0.75)] },
            IndexRecord { t: "b".into(), p: vec![Posting::new(1, 0.5)] },
        ];
        let shard = IndexShard { partition: 0, records };
        let scored = apply_idf(shard, 10, 1 << 20).unwrap();

        let a = &scored.records[0];
        assert_eq!(a.t, "a");
        assert_eq!(a.p.iter().map(|p| p.doc_id).collect::<Vec<_>>(), vec![3, 1, 2]);
        assert!(close(a.p[0].score, 0.75 * idf(10, 3)));
        let b = &scored.records[1];
        assert!(close(b.p[0].score, 0.5 * idf(10, 1)));
    }

    #[test]
    fn weight_shards_writes_next_artifact() {
        let store = MemoryArtifacts::new();
        let docs = vec![NormalizedDocument::from_tokens(1, ["a", "b"])];
        save(&store, &Artifact::Normalized(4), &docs).unwrap();

        let written = weight_shards(&store, &[Artifact::Normalized(4)], 2.0).unwrap();
        assert_eq!(written, vec![Artifact::Weighted(4)]);
        let weighted: Vec<NormalizedDocument> = load(&store, &Artifact::Weighted(4)).unwrap();
        assert!(close(weighted[0].terms["a"], 1.0 / 3.0));
        let raw: Vec<NormalizedDocument> = load(&store, &Artifact::Normalized(4)).unwrap();
        assert_eq!(raw[0].terms["a"], 1.0);
    }
}
