use lyrix_core::artifact::load;
use lyrix_core::document::parse_document;
use lyrix_core::store::load_index;
use lyrix_core::{
    Artifact, ArtifactKind, Document, DocumentStore, Error, FsArtifacts, IndexRecord, Lexicon, MemoryArtifacts,
    Normalizer, Pipeline, PipelineConfig, ShardReader, SledStore,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use tempfile::tempdir;

fn song(id: u64, language: &str, title: &str, lyrics: &str) -> Document {
    parse_document(json!({
        "id": id,
        "title": title,
        "lyrics": lyrics,
        "author": ["Somebody", null],
        "credits": {"Written By": [["Somebody", null]]},
        "language": language,
        "album": "Greatest Hits",
        "tags": ["Pop"]
    }))
    .unwrap()
}

fn corpus() -> Vec<Document> {
    vec![
        song(1, "en", "Hey Jude", "Hey Jude, don't make it bad. Take a sad song and make it better"),
        song(2, "en", "Yesterday", "Yesterday, all my troubles seemed so far away"),
        song(3, "es", "Bésame mucho", "Bésame, bésame mucho, como si fuera esta noche la última vez"),
        song(4, "xx", "Unknown", "this song should never be indexed"),
        song(5, "de", "Neunundneunzig Luftballons", "Hast du etwas Zeit für mich, dann singe ich ein Lied für dich"),
        song(6, "en", "Let It Be", "When I find myself in times of trouble, let it be, let it be"),
        song(7, "fr", "La Vie en rose", "Quand il me prend dans ses bras, je vois la vie en rose"),
    ]
}

fn config(partitions: usize) -> PipelineConfig {
    PipelineConfig { split_size: 3, num_partitions: partitions, ..Default::default() }
}

fn index_records<R: ShardReader>(store: &R) -> Vec<Vec<IndexRecord>> {
    store
        .list(ArtifactKind::Index)
        .unwrap()
        .iter()
        .map(|a| load(store, a).unwrap())
        .collect()
}

#[test]
fn builds_sorted_partitioned_index() {
    let normalizer = Normalizer::default();
    let pipeline = Pipeline::new(&normalizer, config(3)).unwrap();
    let store = MemoryArtifacts::new();
    let summary = pipeline.run(&store, corpus()).unwrap();

    assert_eq!(summary.manifest.num_docs, 7);
    assert_eq!(summary.manifest.indexed_docs, 6);
    assert_eq!(summary.manifest.num_shards, 3);
    assert_eq!(summary.manifest.num_partitions, 3);
    assert_eq!(summary.index_shards, vec![Artifact::Index(0), Artifact::Index(1), Artifact::Index(2)]);

    let shards = index_records(&store);
    let all: Vec<&IndexRecord> = shards.iter().flatten().collect();
    assert!(all.windows(2).all(|w| w[0].t <= w[1].t), "terms must ascend across shards");

    for record in &all {
        assert!(record.p.windows(2).all(|w| {
            w[0].score > w[1].score || (w[0].score == w[1].score && w[0].doc_id < w[1].doc_id)
        }));
        assert!(record.p.iter().all(|p| p.doc_id != 4), "song in unknown language was indexed");
    }

    let lexicon: Lexicon = load(&store, &Artifact::Lexicon).unwrap();
    assert_eq!(lexicon.len(), summary.num_terms);
    let mut postings_per_term: BTreeMap<&str, u64> = BTreeMap::new();
    for record in &all {
        *postings_per_term.entry(record.t.as_str()).or_default() += record.p.len() as u64;
    }
    for (term, df) in &lexicon.terms {
        assert_eq!(postings_per_term.get(term.as_str()), Some(df), "term {term}");
    }
}

#[test]
fn rare_terms_outrank_common_ones() {
    let normalizer = Normalizer::default();
    let pipeline = Pipeline::new(&normalizer, config(1)).unwrap();
    let store = MemoryArtifacts::new();
    pipeline.run(&store, corpus()).unwrap();

    let records = index_records(&store).remove(0);
    let score_of = |term: &str, doc: u64| {
        records
            .iter()
            .filter(|r| r.t == term)
            .flat_map(|r| r.p.iter())
            .find(|p| p.doc_id == doc)
            .map(|p| p.score)
            .unwrap()
    };
    // "jude" appears in one song, "somebodi" (the stemmed author) in half of them.
    assert!(score_of("jude", 1) > 0.0);
    assert!(score_of("jude", 1) > score_of("somebodi", 1));
}

#[test]
fn long_posting_lists_are_split() {
    let normalizer = Normalizer::default();
    let config = PipelineConfig { split_size: 40, max_record_bytes: 1024, ..Default::default() };
    let pipeline = Pipeline::new(&normalizer, config).unwrap();
    let docs: Vec<Document> = (0..300).map(|i| song(i, "en", "Love", &format!("love song number {i}"))).collect();
    let store = MemoryArtifacts::new();
    pipeline.run(&store, docs).unwrap();

    let records = index_records(&store).remove(0);
    let love: Vec<&IndexRecord> = records.iter().filter(|r| r.t == "love").collect();
    assert!(love.len() > 1);
    assert_eq!(love.iter().map(|r| r.p.len()).sum::<usize>(), 300);
    assert!(records.iter().all(|r| serde_json::to_vec(r).unwrap().len() <= 1024));

    // Ranking holds across the records of one term.
    let joined: Vec<_> = love.iter().flat_map(|r| r.p.iter()).collect();
    assert!(joined.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn writes_artifacts_to_disk_and_loads_store() {
    let dir = tempdir().unwrap();
    let artifacts = FsArtifacts::new(dir.path());
    let normalizer = Normalizer::default();
    let pipeline = Pipeline::new(&normalizer, config(2)).unwrap();
    pipeline.run(&artifacts, corpus()).unwrap();

    for rel in ["manifest.json", "lexicon.json", "inputs/raw_0.json", "indexes/index_0.json", "indexes/index_1.json"] {
        assert!(dir.path().join(rel).is_file(), "{rel} missing");
    }
    let text = fs::read_to_string(dir.path().join("indexes/index_0.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    let first = &json.as_array().unwrap()[0];
    assert!(first["t"].is_string());
    assert!(first["p"][0][0].is_u64());
    assert!(first["p"][0][1].is_f64());

    let store = SledStore::temporary().unwrap();
    let loaded = load_index(&artifacts, &store).unwrap();
    assert!(loaded > 0);
    let jude = store.records("jude").unwrap();
    assert_eq!(jude.len(), 1);
    assert_eq!(jude[0].p[0].doc_id, 1);
}

#[test]
fn rerun_replaces_previous_output() {
    let normalizer = Normalizer::default();
    let store = MemoryArtifacts::new();
    Pipeline::new(&normalizer, config(3)).unwrap().run(&store, corpus()).unwrap();
    Pipeline::new(&normalizer, config(1)).unwrap().run(&store, corpus()).unwrap();
    assert_eq!(store.list(ArtifactKind::Index).unwrap(), vec![Artifact::Index(0)]);
    assert_eq!(store.list(ArtifactKind::Partition).unwrap().len(), 1);
}

#[test]
fn stages_can_resume_from_saved_partitions() {
    let normalizer = Normalizer::default();
    let pipeline = Pipeline::new(&normalizer, config(2)).unwrap();
    let store = MemoryArtifacts::new();
    let summary = pipeline.run(&store, corpus()).unwrap();
    let before = index_records(&store);

    let partitions = pipeline.load_partitions(&store).unwrap();
    assert_eq!(partitions.len(), 2);
    pipeline.build_index(&store, &partitions).unwrap();
    pipeline.score(&store, &summary.manifest).unwrap();
    assert_eq!(index_records(&store), before);
}

#[test]
fn too_many_partitions_is_config_error() {
    let normalizer = Normalizer::default();
    let pipeline = Pipeline::new(&normalizer, config(10_000)).unwrap();
    let store = MemoryArtifacts::new();
    assert!(matches!(pipeline.run(&store, corpus()), Err(Error::Config(_))));
}
