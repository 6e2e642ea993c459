use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lyrix_core::config::DEFAULT_MAX_RECORD_BYTES;
use lyrix_core::document::read_corpus;
use lyrix_core::store::{load_documents, load_index};
use lyrix_core::{FsArtifacts, Mode, Normalizer, Pipeline, PipelineConfig, SledStore};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and load the multilingual lyrics inverted index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from JSON/JSONL corpus files or a directory of them
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
        /// Output artifact directory
        #[arg(long)]
        output: PathBuf,
        /// Documents per raw shard
        #[arg(long, default_value_t = 200_000)]
        split: usize,
        /// Preprocessing worker threads
        #[arg(long, default_value_t = 1)]
        workers: usize,
        /// Lexicon partitions (index shards)
        #[arg(long, default_value_t = 1)]
        partitions: usize,
        /// Largest encoded index record in bytes
        #[arg(long, default_value_t = DEFAULT_MAX_RECORD_BYTES)]
        max_record_bytes: usize,
        /// Show progress bars while preprocessing
        #[arg(long, default_value_t = false)]
        progress: bool,
    },
    /// Load the songs and the built index into the document store
    Load {
        /// Artifact directory written by `build`
        #[arg(long)]
        index: PathBuf,
        /// Database directory
        #[arg(long)]
        db: PathBuf,
    },
    /// Print the normalized form of a text
    Normalize {
        #[arg(long, value_enum, default_value_t = ModeArg::Plain)]
        mode: ModeArg,
        /// Language code, required in document mode
        #[arg(long)]
        language: Option<String>,
        text: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Document,
    Query,
    Plain,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, split, workers, partitions, max_record_bytes, progress } => {
            let config = PipelineConfig {
                split_size: split,
                num_workers: workers,
                num_partitions: partitions,
                max_record_bytes,
                show_progress: progress,
            };
            build(&input, &output, config)
        }
        Commands::Load { index, db } => load(&index, &db),
        Commands::Normalize { mode, language, text } => normalize(mode, language.as_deref(), &text),
    }
}

fn build(input: &Path, output: &Path, config: PipelineConfig) -> Result<()> {
    let normalizer = Normalizer::default();
    let pipeline = Pipeline::new(&normalizer, config)?;

    // Files are read one at a time as the splitter pulls documents.
    let files = corpus_files(input)?;
    let mut failure = None;
    let corpus = files
        .iter()
        .map_while(|file| match read_corpus(file) {
            Ok(docs) => {
                tracing::info!(file = %file.display(), songs = docs.len(), "read corpus file");
                Some(docs)
            }
            Err(e) => {
                failure = Some(anyhow::Error::new(e).context(format!("reading {}", file.display())));
                None
            }
        })
        .flatten();

    let artifacts = FsArtifacts::new(output);
    let summary = pipeline.run(&artifacts, corpus);
    if let Some(e) = failure {
        return Err(e);
    }
    let summary = summary?;
    println!("{}", serde_json::to_string_pretty(&summary.manifest)?);
    tracing::info!(output = %output.display(), shards = summary.index_shards.len(), "index written");
    Ok(())
}

fn corpus_files(input: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("input {} does not exist", input.display());
    }
    Ok(files)
}

fn load(index: &Path, db: &Path) -> Result<()> {
    let artifacts = FsArtifacts::new(index);
    let store = SledStore::open(db).with_context(|| format!("opening database {}", db.display()))?;
    let songs = load_documents(&artifacts, &store)?;
    let records = load_index(&artifacts, &store)?;
    store.flush()?;
    tracing::info!(songs, records, db = %db.display(), "loaded store");
    Ok(())
}

fn normalize(mode: ModeArg, language: Option<&str>, text: &str) -> Result<()> {
    let normalizer = Normalizer::default();
    let mode = match (mode, language) {
        (ModeArg::Document, Some(language)) => Mode::Document(language),
        (ModeArg::Document, None) => bail!("document mode needs --language"),
        (ModeArg::Query, _) => Mode::Query,
        (ModeArg::Plain, _) => Mode::Plain,
    };
    println!("{}", normalizer.normalize(text, mode)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn song(id: u64, lyrics: &str) -> serde_json::Value {
        json!({
            "id": id,
            "title": "Song",
            "lyrics": lyrics,
            "author": ["Somebody", null],
            "credits": {},
            "language": "en",
            "album": "Album",
            "tags": []
        })
    }

    #[test]
    fn build_reads_every_corpus_file() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(input.path().join("a.json"), json!([song(1, "hey jude"), song(2, "let it be")]).to_string()).unwrap();
        fs::write(input.path().join("b.jsonl"), format!("{}\n", song(3, "yesterday"))).unwrap();
        fs::write(input.path().join("notes.txt"), "not a corpus").unwrap();

        let config = PipelineConfig { split_size: 2, ..Default::default() };
        build(input.path(), output.path(), config).unwrap();

        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(output.path().join("manifest.json")).unwrap()).unwrap();
        assert_eq!(manifest["num_docs"], 3);
        assert_eq!(manifest["num_shards"], 2);
    }

    #[test]
    fn unreadable_corpus_file_fails_the_build() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(input.path().join("a.json"), json!([song(1, "hey jude")]).to_string()).unwrap();
        fs::write(input.path().join("b.json"), "{ not json").unwrap();

        let err = build(input.path(), output.path(), PipelineConfig::default()).unwrap_err();
        assert!(err.to_string().contains("b.json"), "{err:#}");
    }
}
