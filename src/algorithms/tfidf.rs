//! Bounded TF-IDF feature space over short product texts.

use crate::utils::{normalize_sparse, SparseVector};
use std::collections::{HashMap, HashSet};

/// Common English words that carry no product signal.
const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been",
    "but", "by", "can", "could", "do", "does", "each", "for", "from", "had", "has", "have",
    "he", "her", "his", "how", "if", "in", "into", "is", "it", "its", "just", "may", "more",
    "most", "my", "no", "not", "of", "on", "one", "or", "other", "our", "out", "over", "own",
    "she", "so", "some", "such", "than", "that", "the", "their", "them", "then", "there",
    "these", "they", "this", "those", "through", "to", "too", "up", "very", "was", "we",
    "were", "what", "when", "which", "while", "who", "will", "with", "would", "you", "your",
];

/// Lowercases `text` and splits it into alphanumeric tokens of two or more
/// characters, dropping stop words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct TfIdfVectorizer {
    max_features: usize,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
}

impl TfIdfVectorizer {
    pub fn new(max_features: usize) -> Self {
        Self {
            max_features,
            vocabulary: HashMap::new(),
            idf: Vec::new(),
        }
    }

    #[cfg(test)]
    fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    #[cfg(test)]
    fn contains_term(&self, term: &str) -> bool {
        self.vocabulary.contains_key(term)
    }

    /// Learns the vocabulary and IDF weights from `documents`, then returns one
    /// unit-length vector per document.
    ///
    /// The vocabulary keeps the `max_features` terms with the highest corpus
    /// frequency (ties resolved alphabetically). IDF is smoothed:
    /// `ln((1 + n) / (1 + df)) + 1`.
    pub fn fit_transform(&mut self, documents: &[String]) -> Vec<SparseVector> {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();

        let mut term_counts: HashMap<&str, usize> = HashMap::new();
        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for tokens in &tokenized {
            let mut seen = HashSet::new();
            for token in tokens {
                *term_counts.entry(token.as_str()).or_insert(0) += 1;
                if seen.insert(token.as_str()) {
                    *doc_freq.entry(token.as_str()).or_insert(0) += 1;
                }
            }
        }

        let mut ranked: Vec<(&str, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(self.max_features);

        let mut terms: Vec<&str> = ranked.into_iter().map(|(term, _)| term).collect();
        terms.sort_unstable();

        let n = documents.len() as f64;
        self.idf = terms
            .iter()
            .map(|term| {
                let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
                ((1.0 + n) / (1.0 + df)).ln() + 1.0
            })
            .collect();
        self.vocabulary = terms
            .into_iter()
            .enumerate()
            .map(|(idx, term)| (term.to_string(), idx))
            .collect();

        tokenized.iter().map(|tokens| self.vectorize(tokens)).collect()
    }

    #[cfg(test)]
    fn transform(&self, document: &str) -> SparseVector {
        self.vectorize(&tokenize(document))
    }

    fn vectorize(&self, tokens: &[String]) -> SparseVector {
        let mut vector = SparseVector::new();
        for token in tokens {
            if let Some(&idx) = self.vocabulary.get(token) {
                *vector.entry(idx).or_insert(0.0) += self.idf[idx];
            }
        }
        normalize_sparse(&mut vector);
        vector
    }
}
