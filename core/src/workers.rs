//! Parallel conversion of documents into their inverted representation.

use crossbeam_channel::bounded;
use indicatif::ProgressBar;
use std::any::Any;
use std::thread;

use crate::document::Document;
use crate::index::NormalizedDocument;
use crate::normalizer::{Mode, Normalizer};
use crate::{Error, Result};

/// Normalizes one document in its own language and counts its terms.
///
/// Returns `None` for documents in a language without a stemmer; they are not indexed.
pub fn normalize_document(normalizer: &Normalizer, doc: &Document) -> Result<Option<NormalizedDocument>> {
    if !normalizer.supports(&doc.language) {
        return Ok(None);
    }
    let tokens = normalizer.tokens(&doc.searchable_text(), Mode::Document(&doc.language))?;
    Ok(Some(NormalizedDocument::from_tokens(doc.id, tokens)))
}

/// Splits `items` into `parts` contiguous slices of `ceil(len / parts)` items; trailing slices
/// may be shorter or empty.
pub fn divide_work<T>(items: &[T], parts: usize) -> Vec<&[T]> {
    let interval = items.len().div_ceil(parts.max(1)).max(1);
    (0..parts)
        .map(|i| {
            let start = (i * interval).min(items.len());
            let end = ((i + 1) * interval).min(items.len());
            &items[start..end]
        })
        .collect()
}

/// A fixed number of worker threads pulling document slices from a bounded task queue and
/// pushing their results to an aggregation channel.
///
/// Workers share nothing mutable; each borrows the same immutable [`Normalizer`].
pub struct WorkerPool<'n> {
    normalizer: &'n Normalizer,
    num_workers: usize,
    progress: ProgressBar,
}

impl<'n> WorkerPool<'n> {
    pub fn new(normalizer: &'n Normalizer, num_workers: usize) -> Result<Self> {
        if num_workers == 0 {
            return Err(Error::Config("number of workers must be at least 1".into()));
        }
        Ok(Self { normalizer, num_workers, progress: ProgressBar::hidden() })
    }

    /// Reports one tick per processed document to `progress`.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Normalizes every document and blocks until all workers are done.
    ///
    /// Any worker error or panic fails the whole run; the input is left untouched so the run
    /// can simply be repeated.
    pub fn run(&self, documents: &[Document]) -> Result<Vec<NormalizedDocument>> {
        let slices = divide_work(documents, self.num_workers);
        let num_tasks = slices.len();

        let (tasks_tx, tasks_rx) = bounded::<(usize, &[Document])>(num_tasks);
        for task in slices.into_iter().enumerate() {
            tasks_tx.send(task).ok();
        }
        drop(tasks_tx); // Workers exit once the queue drains.

        let (results_tx, results_rx) = bounded::<(usize, Result<Vec<NormalizedDocument>>)>(num_tasks);
        let panicked = thread::scope(|s| {
            let handles: Vec<_> = (0..self.num_workers)
                .map(|_| {
                    let tasks_rx = tasks_rx.clone();
                    let results_tx = results_tx.clone();
                    s.spawn(move || {
                        while let Ok((idx, slice)) = tasks_rx.recv() {
                            if results_tx.send((idx, self.normalize_slice(slice))).is_err() {
                                break;
                            }
                        }
                    })
                })
                .collect();
            drop(results_tx);

            let mut panicked = None;
            for handle in handles {
                if let Err(payload) = handle.join() {
                    panicked = Some(panic_message(payload));
                }
            }
            panicked
        });
        if let Some(msg) = panicked {
            return Err(Error::WorkerFailed(msg));
        }

        let mut results: Vec<(usize, Result<Vec<NormalizedDocument>>)> = results_rx.iter().collect();
        if results.len() != num_tasks {
            return Err(Error::WorkerFailed(format!("{} of {num_tasks} slices finished", results.len())));
        }
        results.sort_by_key(|(idx, _)| *idx);

        let mut out = Vec::with_capacity(documents.len());
        for (_, result) in results {
            out.extend(result?);
        }
        Ok(out)
    }

    fn normalize_slice(&self, slice: &[Document]) -> Result<Vec<NormalizedDocument>> {
        let mut out = Vec::with_capacity(slice.len());
        let mut skipped = 0usize;
        for doc in slice {
            match normalize_document(self.normalizer, doc)? {
                Some(normalized) => out.push(normalized),
                None => skipped += 1,
            }
            self.progress.inc(1);
        }
        if skipped > 0 {
            tracing::debug!(skipped, "documents in unsupported languages");
        }
        Ok(out)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
