//! Word-embedding vocabulary
//!
//! Stores per-word counts and embedding vectors, and serves the
//! negative-sampling draws used while training concept context vectors.
//! The unigram table follows the word2vec convention of sampling words
//! proportionally to `count^0.75`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use rand::Rng;

use crate::core::{MedLinkError, Result};

/// Per-word attributes
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WordInfo {
    /// Corpus frequency of the word
    pub count: u64,
    /// Embedding vector, if one was provided
    pub vector: Option<Vec<f32>>,
    /// Stable index used by the unigram table
    pub index: usize,
}

/// Vocabulary of words, counts, and embedding vectors
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Vocab {
    words: IndexMap<String, WordInfo>,
    index2word: Vec<String>,
    #[serde(default)]
    unigram_table: Vec<usize>,
}

impl Vocab {
    /// Create an empty vocabulary
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the word is present
    pub fn contains(&self, word: &str) -> bool {
        self.words.contains_key(word)
    }

    /// Embedding vector for a word, if any
    pub fn vec(&self, word: &str) -> Option<&Vec<f32>> {
        self.words.get(word).and_then(|info| info.vector.as_ref())
    }

    /// Corpus frequency of a word (0 when absent)
    pub fn count(&self, word: &str) -> u64 {
        self.words.get(word).map_or(0, |info| info.count)
    }

    /// Number of words in the vocabulary
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the vocabulary is empty
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Add a word, or replace its vector and count if already present
    pub fn add_word(&mut self, word: &str, count: u64, vector: Option<Vec<f32>>, replace: bool) {
        match self.words.get_mut(word) {
            None => {
                let index = self.index2word.len();
                self.index2word.push(word.to_string());
                self.words.insert(
                    word.to_string(),
                    WordInfo {
                        count,
                        vector,
                        index,
                    },
                );
            },
            Some(info) => {
                if replace && vector.is_some() {
                    info.vector = vector;
                    info.count = count;
                }
            },
        }
        // Any mutation invalidates the sampling table
        self.unigram_table.clear();
    }

    /// Add a word or increase its count when already present
    pub fn inc_or_add(&mut self, word: &str, count: u64, vector: Option<Vec<f32>>) {
        if self.contains(word) {
            self.inc_count(word, count);
        } else {
            self.add_word(word, count, vector, true);
        }
    }

    /// Increase a word's count
    pub fn inc_count(&mut self, word: &str, count: u64) {
        if let Some(info) = self.words.get_mut(word) {
            info.count += count;
        }
    }

    /// Update counts for every token found in the vocabulary
    pub fn update_counts<'a, I>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for token in tokens {
            self.inc_count(token, 1);
        }
    }

    /// Load words from a TSV file: `<word>\t<count>[\t<space separated vector>]`
    pub fn add_words_from_file<P: AsRef<Path>>(&mut self, path: P, replace: bool) -> Result<()> {
        let raw = fs::read_to_string(path)?;
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut parts = line.split('\t');
            let word = parts.next().unwrap_or_default();
            let count: u64 = parts
                .next()
                .and_then(|c| c.trim().parse().ok())
                .ok_or_else(|| MedLinkError::Vocab {
                    message: format!("malformed vocab line {}", line_no + 1),
                })?;
            let vector = match parts.next() {
                None => None,
                Some(raw_vec) => {
                    let values: std::result::Result<Vec<f32>, _> = raw_vec
                        .trim()
                        .split(' ')
                        .map(|v| v.parse::<f32>())
                        .collect();
                    Some(values.map_err(|err| MedLinkError::Vocab {
                        message: format!("malformed vector on line {}: {err}", line_no + 1),
                    })?)
                },
            };
            self.add_word(word, count, vector, replace);
        }
        Ok(())
    }

    /// Build the unigram table for negative sampling
    ///
    /// Only words carrying vectors participate. Table entries are word
    /// indices repeated proportionally to `count^0.75`.
    pub fn make_unigram_table(&mut self, table_size: usize) {
        let with_vectors: Vec<&WordInfo> = self
            .words
            .values()
            .filter(|info| info.vector.is_some())
            .collect();
        let freqs: Vec<f64> = with_vectors
            .iter()
            .map(|info| (info.count as f64).powf(0.75))
            .collect();
        let total: f64 = freqs.iter().sum();

        let mut table = Vec::new();
        if total > 0.0 {
            for (info, freq) in with_vectors.iter().zip(&freqs) {
                let slots = (freq / total * table_size as f64) as usize;
                table.extend(std::iter::repeat(info.index).take(slots));
            }
        }
        tracing::debug!(entries = table.len(), "built unigram table");
        self.unigram_table = table;
    }

    /// Draw `n` negative-sample word indices
    ///
    /// The unigram table is built lazily on first use. With
    /// `ignore_punct_and_num`, indices of words without any letters are
    /// dropped (so fewer than `n` indices may be returned).
    pub fn negative_samples(&mut self, n: usize, ignore_punct_and_num: bool) -> Vec<usize> {
        if self.unigram_table.is_empty() {
            self.make_unigram_table(10_000_000);
        }
        if self.unigram_table.is_empty() {
            return Vec::new();
        }
        let mut rng = rand::thread_rng();
        let mut indices = Vec::with_capacity(n);
        for _ in 0..n {
            let slot = rng.gen_range(0..self.unigram_table.len());
            indices.push(self.unigram_table[slot]);
        }
        if ignore_punct_and_num {
            indices.retain(|&index| {
                self.index2word
                    .get(index)
                    .is_some_and(|word| word.chars().any(|c| c.is_alphabetic()))
            });
        }
        indices
    }

    /// Vectors for the given word indices, skipping words without vectors
    pub fn vectors_for(&self, indices: &[usize]) -> Vec<Vec<f32>> {
        indices
            .iter()
            .filter_map(|&index| self.index2word.get(index))
            .filter_map(|word| self.vec(word).cloned())
            .collect()
    }

    /// Per-word counts, for spell-check style consumers
    pub fn counts(&self) -> HashMap<String, u64> {
        self.words
            .iter()
            .map(|(word, info)| (word.clone(), info.count))
            .collect()
    }
}
