use lyrix_core::normalizer::tokenize;
use lyrix_core::{Mode, Normalizer};

#[test]
fn it_expands_glued_tokens() {
    let n = Normalizer::default();
    let out = n.normalize("I'm 34+45 ph.d.", Mode::Plain).unwrap();
    assert_eq!(out, "i m 34 45 ph d im 3445 phd");
}

#[test]
fn it_stems_in_the_document_language() {
    let n = Normalizer::default();
    let words = n.tokens("Running Runners RUN!", Mode::Document("en")).unwrap();
    assert!(words.contains(&"run".to_string()));
    assert!(!words.iter().any(|w| w.chars().any(char::is_uppercase)));

    let german = n.tokens("Häuser", Mode::Document("de")).unwrap();
    assert_eq!(german.len(), 1);
    assert_ne!(german[0], "häuser");
}

#[test]
fn it_keeps_stopwords() {
    let words = tokenize("The quick brown fox and the lazy dog");
    assert!(words.contains(&"the".to_string()));
    assert!(words.contains(&"and".to_string()));
}

#[test]
fn query_mode_is_sorted_and_unique() {
    let n = Normalizer::default();
    let forms = n.tokens("running running", Mode::Query).unwrap();
    assert!(forms.contains(&"running".to_string()));
    assert!(forms.contains(&"run".to_string()));
    assert!(forms.windows(2).all(|w| w[0] < w[1]), "{forms:?}");
}

#[test]
fn document_mode_keeps_token_count() {
    let n = Normalizer::default();
    let text = "Yesterday, all my troubles seemed so far away";
    let plain = n.tokens(text, Mode::Plain).unwrap();
    let stemmed = n.tokens(text, Mode::Document("en")).unwrap();
    assert_eq!(plain.len(), stemmed.len());
}

#[test]
fn empty_and_punctuation_only_text() {
    let n = Normalizer::default();
    assert!(n.tokens("", Mode::Document("en")).unwrap().is_empty());
    assert_eq!(n.normalize("?!... --", Mode::Plain).unwrap(), "");
}

#[test]
fn glued_tokens_are_stemmed_in_document_mode() {
    let n = Normalizer::default();
    let tokens = n.tokens("I'm 34+45 ph.d.", Mode::Document("en")).unwrap();
    assert_eq!(tokens, vec!["i", "m", "34", "45", "ph", "d", "im", "3445", "phd"]);
}

#[test]
fn term_counts_sum_to_token_count() {
    use lyrix_core::document::parse_document;
    use lyrix_core::workers::normalize_document;

    let doc = parse_document(serde_json::json!({
        "id": 1,
        "title": "Let It Be",
        "lyrics": "Let it be, let it be, let it be, let it be\nWhisper words of wisdom, let it be",
        "author": ["The Beatles", null],
        "credits": {"Written By": [["John Lennon", null], ["Paul McCartney", null]]},
        "language": "en",
        "album": "Let It Be",
        "tags": ["Rock", "Pop"]
    }))
    .unwrap();
    let n = Normalizer::default();
    let normalized = normalize_document(&n, &doc).unwrap().unwrap();
    let tokens = n.tokens(&doc.searchable_text(), Mode::Document("en")).unwrap();
    assert_eq!(normalized.terms.values().sum::<f64>() as usize, tokens.len());
    assert_eq!(normalized.terms["let"], 7.0);
}
