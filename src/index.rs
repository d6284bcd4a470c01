//! TF-IDF vector-space model.
//!
//! Chunks and queries are represented as L2-normalized sparse vectors of
//! term weights: raw term frequency scaled by smoothed inverse document
//! frequency, `idf = ln((1 + N) / (1 + df)) + 1`. Cosine similarity
//! between normalized vectors reduces to a sparse dot product.
//!
//! The model is fitted once per build over the whole corpus. Queries are
//! vectorized against the fitted vocabulary and never retrain it, so the
//! same query against the same index always scores identically.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Corpus-wide document-frequency pruning only makes sense once the
/// corpus is large enough for the ratio to mean anything.
const MIN_DOCS_FOR_DF_PRUNE: usize = 10;

/// Common English words carrying no retrieval signal.
const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "he",
    "her", "his", "how", "i", "if", "in", "into", "is", "it", "its", "just", "me", "more", "my",
    "no", "not", "of", "on", "one", "or", "our", "out", "she", "so", "some", "than", "that",
    "the", "their", "them", "then", "there", "these", "they", "this", "to", "up", "was", "we",
    "were", "what", "when", "which", "who", "will", "with", "would", "you", "your",
];

/// Fitted vocabulary and per-term weights.
///
/// `vocab` maps terms (unigrams, and bigrams joined with a space when
/// enabled) to column indices; `idf` is indexed by column. Both use
/// deterministic ordering so serializing the model is reproducible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfModel {
    pub vocab: BTreeMap<String, usize>,
    pub idf: Vec<f64>,
    pub bigrams: bool,
}

/// Sparse term-weight vector, L2-normalized at construction. Indices are
/// sorted ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub weights: Vec<f32>,
}

impl SparseVector {
    pub fn is_zero(&self) -> bool {
        self.indices.is_empty()
    }
}

impl TfidfModel {
    /// Fit the model over a corpus of chunk texts.
    ///
    /// Terms present in more than `max_df` of all documents are pruned
    /// (once the corpus clears [`MIN_DOCS_FOR_DF_PRUNE`]); the vocabulary
    /// is then capped at `max_vocab` terms by total corpus weight mass,
    /// ties broken lexicographically.
    pub fn fit(documents: &[&str], max_vocab: usize, max_df: f64, bigrams: bool) -> TfidfModel {
        let n_docs = documents.len();
        let mut df: BTreeMap<String, usize> = BTreeMap::new();
        let mut cf: BTreeMap<String, u64> = BTreeMap::new();

        for doc in documents {
            let counts = term_counts(doc, bigrams);
            for (term, count) in counts {
                *df.entry(term.clone()).or_insert(0) += 1;
                *cf.entry(term).or_insert(0) += count as u64;
            }
        }

        if n_docs >= MIN_DOCS_FOR_DF_PRUNE {
            let cutoff = (n_docs as f64 * max_df).ceil() as usize;
            df.retain(|_, count| *count <= cutoff);
        }

        // Weight-based vocabulary cap: keep terms by total corpus mass
        // (collection frequency × idf), not by insertion order.
        let mut ranked: Vec<(&String, f64)> = df
            .iter()
            .map(|(term, term_df)| {
                let idf = smooth_idf(n_docs, *term_df);
                let mass = cf[term] as f64 * idf;
                (term, mass)
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        ranked.truncate(max_vocab);

        let mut kept: Vec<&String> = ranked.into_iter().map(|(term, _)| term).collect();
        kept.sort_unstable();

        let mut vocab = BTreeMap::new();
        let mut idf = Vec::with_capacity(kept.len());
        for (column, term) in kept.into_iter().enumerate() {
            idf.push(smooth_idf(n_docs, df[term]));
            vocab.insert(term.clone(), column);
        }

        TfidfModel { vocab, idf, bigrams }
    }

    /// Vectorize a text against the fitted vocabulary. Out-of-vocabulary
    /// terms are ignored; a text with no known terms yields a zero vector.
    pub fn vectorize(&self, text: &str) -> SparseVector {
        let counts = term_counts(text, self.bigrams);
        let mut weighted: Vec<(u32, f64)> = counts
            .into_iter()
            .filter_map(|(term, count)| {
                self.vocab
                    .get(&term)
                    .map(|column| (*column as u32, count as f64 * self.idf[*column]))
            })
            .collect();
        weighted.sort_unstable_by_key(|(column, _)| *column);

        let norm = weighted
            .iter()
            .map(|(_, w)| w * w)
            .sum::<f64>()
            .sqrt();
        if norm == 0.0 {
            return SparseVector {
                indices: Vec::new(),
                weights: Vec::new(),
            };
        }

        SparseVector {
            indices: weighted.iter().map(|(column, _)| *column).collect(),
            weights: weighted.iter().map(|(_, w)| (w / norm) as f32).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vocab.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vocab.len()
    }
}

fn smooth_idf(n_docs: usize, df: usize) -> f64 {
    ((1.0 + n_docs as f64) / (1.0 + df as f64)).ln() + 1.0
}

/// Lowercase alphanumeric tokens, stopwords removed, single chars dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn term_counts(text: &str, bigrams: bool) -> HashMap<String, u32> {
    let tokens = tokenize(text);
    let mut counts: HashMap<String, u32> = HashMap::new();
    for token in &tokens {
        *counts.entry(token.clone()).or_insert(0) += 1;
    }
    if bigrams {
        for pair in tokens.windows(2) {
            *counts.entry(format!("{} {}", pair[0], pair[1])).or_insert(0) += 1;
        }
    }
    counts
}

/// Cosine similarity of two L2-normalized sparse vectors: a merge-style
/// dot product over the sorted index lists.
pub fn cosine(a: &SparseVector, b: &SparseVector) -> f64 {
    let mut dot = 0.0f64;
    let (mut i, mut j) = (0usize, 0usize);
    while i < a.indices.len() && j < b.indices.len() {
        match a.indices[i].cmp(&b.indices[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a.weights[i] as f64 * b.weights[j] as f64;
                i += 1;
                j += 1;
            }
        }
    }
    dot.clamp(0.0, 1.0)
}
