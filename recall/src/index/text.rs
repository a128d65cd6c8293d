//! Tokenisation and lexical ranking shared by the lexical index and its queries.
//!
//! Queries are parsed into free terms and quoted phrases. A document matches
//! when every phrase occurs contiguously and at least one term occurs; its
//! score is BM25 over the matched terms scaled by term coverage, so documents
//! matching more of the query rank above documents repeating one term.

use std::collections::{HashMap, HashSet};

use unicode_segmentation::UnicodeSegmentation;

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "but", "by", "can", "do", "does", "for",
    "from", "has", "have", "how", "i", "if", "in", "into", "is", "it", "its", "me", "my", "no",
    "not", "of", "on", "or", "our", "so", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "to", "was", "we", "were", "what", "when", "where", "which", "who",
    "why", "will", "with", "you", "your",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.binary_search(&word).is_ok()
}

/// Lowercased words in document order, stop words included so phrase
/// positions stay intact.
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalQuery {
    /// Distinct content terms, in first-seen order.
    pub terms: Vec<String>,
    /// Quoted multi-word sequences that must occur verbatim.
    pub phrases: Vec<Vec<String>>,
}

impl LexicalQuery {
    /// Returns `None` when nothing searchable remains (empty or all stop words).
    pub fn parse(text: &str) -> Option<Self> {
        let mut terms: Vec<String> = Vec::new();
        let mut phrases: Vec<Vec<String>> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        let mut push_term = |term: String, terms: &mut Vec<String>| {
            if !is_stop_word(&term) && seen.insert(term.clone()) {
                terms.push(term);
            }
        };

        // Odd segments sit between a pair of double quotes. An unbalanced
        // trailing quote leaves its segment as plain text.
        let segments: Vec<&str> = text.split('"').collect();
        let balanced = segments.len() % 2 == 1;
        for (idx, segment) in segments.iter().enumerate() {
            let quoted = idx % 2 == 1 && (balanced || idx + 1 < segments.len());
            let words = tokenize(segment);

            if quoted && words.len() > 1 {
                for word in &words {
                    push_term(word.clone(), &mut terms);
                }
                if !phrases.contains(&words) {
                    phrases.push(words);
                }
            } else {
                for word in words {
                    push_term(word, &mut terms);
                }
            }
        }

        if terms.is_empty() && phrases.is_empty() {
            None
        } else {
            Some(Self { terms, phrases })
        }
    }
}

/// Corpus-wide statistics for BM25.
#[derive(Debug, Clone, Default)]
pub struct CorpusStats {
    pub documents: usize,
    pub avg_len: f32,
    pub doc_freq: HashMap<String, usize>,
}

impl CorpusStats {
    pub fn from_documents<'a>(docs: impl IntoIterator<Item = &'a [String]>) -> Self {
        let mut documents = 0usize;
        let mut total_len = 0usize;
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for doc in docs {
            documents += 1;
            total_len += doc.len();
            let unique: HashSet<&String> = doc.iter().collect();
            for token in unique {
                *doc_freq.entry(token.clone()).or_default() += 1;
            }
        }

        let avg_len = if documents == 0 {
            0.0
        } else {
            total_len as f32 / documents as f32
        };

        Self {
            documents,
            avg_len,
            doc_freq,
        }
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.documents as f32;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }
}

fn contains_phrase(doc: &[String], phrase: &[String]) -> bool {
    !phrase.is_empty() && doc.windows(phrase.len()).any(|window| window == phrase)
}

/// Relevance of `doc` for `query`, or `None` if it does not match.
pub fn rank(query: &LexicalQuery, doc: &[String], stats: &CorpusStats) -> Option<f32> {
    if doc.is_empty() {
        return None;
    }
    if !query.phrases.iter().all(|p| contains_phrase(doc, p)) {
        return None;
    }

    let mut tf: HashMap<&str, usize> = HashMap::new();
    for token in doc {
        *tf.entry(token.as_str()).or_default() += 1;
    }

    let doc_len = doc.len() as f32;
    let avg_len = if stats.avg_len > 0.0 {
        stats.avg_len
    } else {
        doc_len
    };

    let mut matched = 0usize;
    let mut score = 0.0f32;
    for term in &query.terms {
        let Some(&freq) = tf.get(term.as_str()) else {
            continue;
        };
        matched += 1;
        let freq = freq as f32;
        let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * doc_len / avg_len);
        score += stats.idf(term) * freq * (BM25_K1 + 1.0) / (freq + norm);
    }

    if matched == 0 {
        return None;
    }

    let coverage = matched as f32 / query.terms.len() as f32;
    Some(score * coverage)
}
