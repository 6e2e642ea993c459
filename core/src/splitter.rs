//! Chunks the corpus into bounded raw shards so later stages hold one shard at a time.

use crate::artifact::{save, Artifact, ArtifactKind, ShardWriter};
use crate::document::Document;
use crate::{Error, Result};

/// Writes `corpus` as `Raw(0)`, `Raw(1)`, ... shards of at most `max_docs` documents each,
/// preserving input order. Credit labels are standardized on the way.
///
/// Returns the number of documents written alongside the shard names.
pub fn split<W, I>(writer: &W, corpus: I, max_docs: usize) -> Result<(Vec<Artifact>, u64)>
where
    W: ShardWriter + ?Sized,
    I: IntoIterator<Item = Document>,
{
    if max_docs == 0 {
        return Err(Error::Config("split size must be at least 1".into()));
    }
    writer.clear(ArtifactKind::Raw)?;

    let mut shards = Vec::new();
    let mut chunk: Vec<Document> = Vec::with_capacity(max_docs.min(4096));
    let mut total = 0u64;
    for mut doc in corpus {
        doc.standardize();
        chunk.push(doc);
        total += 1;
        if chunk.len() == max_docs {
            shards.push(flush(writer, shards.len(), &mut chunk)?);
        }
    }
    if !chunk.is_empty() {
        shards.push(flush(writer, shards.len(), &mut chunk)?);
    }
    tracing::info!(num_docs = total, num_shards = shards.len(), "split dataset");
    Ok((shards, total))
}

fn flush<W: ShardWriter + ?Sized>(writer: &W, n: usize, chunk: &mut Vec<Document>) -> Result<Artifact> {
    let artifact = Artifact::Raw(n);
    save(writer, &artifact, &*chunk)?;
    chunk.clear();
    Ok(artifact)
}
