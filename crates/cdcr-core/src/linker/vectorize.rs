//! TF-IDF vectorisation where every mention is its own document.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::LinkError;

/// Tokens are runs of two or more word characters, lowercased.
static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\w+\b").unwrap());

/// A sparse, L2-normalised row: `(term index, weight)` sorted by index.
pub type SparseVector = Vec<(usize, f64)>;

/// Term-frequency × smoothed inverse-document-frequency weighting.
///
/// The vocabulary and document frequencies come only from the documents
/// passed to [`fit_transform`](TfidfVectorizer::fit_transform), so weights
/// are relative to the current batch.
#[derive(Debug, Default)]
pub struct TfidfVectorizer {
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct terms learned by the last fit.
    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// Learn the vocabulary of `docs` and return one weighted row per doc.
    pub fn fit_transform<S: AsRef<str>>(
        &mut self,
        docs: &[S],
    ) -> Result<Vec<SparseVector>, LinkError> {
        let tokenized: Vec<Vec<String>> = docs.iter().map(|d| tokenize(d.as_ref())).collect();

        let mut terms: Vec<&str> = tokenized.iter().flatten().map(String::as_str).collect();
        terms.sort_unstable();
        terms.dedup();
        if terms.is_empty() {
            return Err(LinkError::EmptyVocabulary);
        }
        self.vocabulary = terms
            .iter()
            .enumerate()
            .map(|(idx, term)| (term.to_string(), idx))
            .collect();

        let mut df = vec![0usize; self.vocabulary.len()];
        let counts: Vec<BTreeMap<usize, usize>> = tokenized
            .iter()
            .map(|tokens| {
                let mut tf = BTreeMap::new();
                for token in tokens {
                    *tf.entry(self.vocabulary[token]).or_insert(0) += 1;
                }
                for idx in tf.keys() {
                    df[*idx] += 1;
                }
                tf
            })
            .collect();

        let n = docs.len() as f64;
        self.idf = df
            .iter()
            .map(|&d| ((1.0 + n) / (1.0 + d as f64)).ln() + 1.0)
            .collect();

        Ok(counts
            .into_iter()
            .map(|tf| {
                let row: SparseVector = tf
                    .into_iter()
                    .map(|(idx, count)| (idx, count as f64 * self.idf[idx]))
                    .collect();
                l2_normalize(row)
            })
            .collect())
    }
}

fn tokenize(doc: &str) -> Vec<String> {
    let lower = doc.to_lowercase();
    TOKEN
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn l2_normalize(mut row: SparseVector) -> SparseVector {
    let norm = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for (_, w) in row.iter_mut() {
            *w /= norm;
        }
    }
    row
}

/// Squared Euclidean distance between two sparse rows.
pub fn squared_distance(a: &SparseVector, b: &SparseVector) -> f64 {
    let (mut i, mut j) = (0, 0);
    let mut sum = 0.0;
    while i < a.len() && j < b.len() {
        let (ia, wa) = a[i];
        let (ib, wb) = b[j];
        if ia == ib {
            sum += (wa - wb) * (wa - wb);
            i += 1;
            j += 1;
        } else if ia < ib {
            sum += wa * wa;
            i += 1;
        } else {
            sum += wb * wb;
            j += 1;
        }
    }
    sum += a[i..].iter().map(|(_, w)| w * w).sum::<f64>();
    sum += b[j..].iter().map(|(_, w)| w * w).sum::<f64>();
    sum
}
