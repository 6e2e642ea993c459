//! Corpus records: songs with lyrics and metadata, as produced by the crawler.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::{Error, Result};

pub type DocId = u64;

/// A `[text, link]` pair as scraped from the song page. The link is often null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Option<String>>", into = "Vec<Option<String>>")]
pub struct Link {
    pub text: String,
    pub href: Option<String>,
}

impl Link {
    pub fn new(text: impl Into<String>, href: Option<String>) -> Self {
        Self { text: text.into(), href }
    }
}

impl TryFrom<Vec<Option<String>>> for Link {
    type Error = String;

    fn try_from(pair: Vec<Option<String>>) -> std::result::Result<Self, Self::Error> {
        let mut it = pair.into_iter();
        match it.next() {
            Some(Some(text)) => Ok(Link { text, href: it.next().flatten() }),
            _ => Err("expected a [text, link] pair with non-null text".to_string()),
        }
    }
}

impl From<Link> for Vec<Option<String>> {
    fn from(link: Link) -> Self {
        vec![Some(link.text), link.href]
    }
}

/// One song of the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(alias = "_id")]
    pub id: DocId,
    pub language: String,
    pub title: String,
    pub lyrics: String,
    pub album: String,
    pub author: Link,
    pub tags: Vec<String>,
    pub credits: BTreeMap<String, Vec<Link>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

impl Document {
    /// All indexed text of the song joined by single spaces: title, lyrics, album, primary
    /// author name, tags and every credit value.
    pub fn searchable_text(&self) -> String {
        let mut parts = vec![self.title.as_str(), self.lyrics.as_str(), self.album.as_str(), self.author.text.as_str()];
        parts.extend(self.tags.iter().map(String::as_str));
        for values in self.credits.values() {
            parts.extend(values.iter().map(|v| v.text.as_str()));
        }
        parts.join(" ")
    }

    /// Removes `.` from credit labels; the document store rejects dotted field names.
    /// Labels that collide after stripping have their values merged.
    pub fn standardize(&mut self) {
        if !self.credits.keys().any(|label| label.contains('.')) {
            return;
        }
        let credits = std::mem::take(&mut self.credits);
        for (label, values) in credits {
            let clean = label.replace('.', "");
            if self.credits.contains_key(&clean) {
                tracing::warn!(id = self.id, label = %label, "credit label collides after stripping dots");
            }
            self.credits.entry(clean).or_default().extend(values);
        }
    }
}

/// Parses a single JSON value into a [`Document`], reporting the id when it can be recovered.
pub fn parse_document(value: serde_json::Value) -> Result<Document> {
    let id = value.get("id").or_else(|| value.get("_id")).and_then(|v| v.as_u64());
    serde_json::from_value(value).map_err(|e| Error::invalid(id, e.to_string()))
}

/// Parses a song stored under `key` in an id-keyed corpus; the key is the id unless the song
/// carries its own.
fn parse_keyed(key: &str, mut value: serde_json::Value) -> Result<Document> {
    if let Some(song) = value.as_object_mut() {
        if !song.contains_key("id") && !song.contains_key("_id") {
            let id: DocId = key
                .parse()
                .map_err(|_| Error::invalid(None, format!("corpus key {key:?} is not a document id")))?;
            song.insert("id".into(), id.into());
        }
    }
    parse_document(value)
}

/// Reads a corpus file. Accepts a JSON array of songs, a JSON object mapping ids to songs, or
/// JSON lines (`.jsonl`).
pub fn read_corpus(path: &Path) -> Result<Vec<Document>> {
    let reader = BufReader::new(File::open(path)?);
    if path.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let mut docs = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            docs.push(parse_document(serde_json::from_str(&line)?)?);
        }
        return Ok(docs);
    }

    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(arr) => arr.into_iter().map(parse_document).collect(),
        serde_json::Value::Object(map) if map.contains_key("lyrics") => Ok(vec![parse_document(serde_json::Value::Object(map))?]),
        serde_json::Value::Object(map) => map.into_iter().map(|(key, v)| parse_keyed(&key, v)).collect(),
        _ => Err(Error::invalid(None, format!("{} does not hold songs", path.display()))),
    }
}
