//! Core data structures and abstractions for medlink
//!
//! This module contains the fundamental types and error handling that
//! power concept recognition: identifiers, the token/document model, and
//! detected mentions.

pub mod error;

pub use error::{MedLinkError, Result};

use std::collections::HashMap;

/// Concept Unique Identifier - the key for a single ontological concept
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Cui(pub String);

impl Cui {
    /// Creates a new Cui from a string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cui {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Cui {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Cui {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Semantic-category identifier (TUI in UMLS terms)
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SemanticTypeId(pub String);

impl SemanticTypeId {
    /// Creates a new SemanticTypeId from a string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for SemanticTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SemanticTypeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A single token produced by a tokenizer
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Token {
    /// Position of the token in the document
    pub index: usize,
    /// The token text as it appears in the document
    pub text: String,
    /// Lower-cased token text, used for vocabulary lookups
    pub lower: String,
    /// Starting byte offset in the document text
    pub start: usize,
    /// Ending byte offset (exclusive) in the document text
    pub end: usize,
    /// Whether this token carries content (false for whitespace/punctuation)
    pub include_in_context: bool,
}

impl Token {
    /// Whether the token should contribute to context windows
    pub fn should_include(&self) -> bool {
        self.include_in_context
    }
}

/// A detected mention of a concept in a document
///
/// Produced by the name matcher with `link_candidates` attached; the
/// linker resolves it to a final `cui` with a `context_similarity`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Mention {
    /// Index of the first token of the mention
    pub start_token: usize,
    /// Index of the last token of the mention (inclusive)
    pub end_token: usize,
    /// Starting byte offset in the document text
    pub start: usize,
    /// Ending byte offset (exclusive) in the document text
    pub end: usize,
    /// The source text covered by the mention
    pub text: String,
    /// The normalized name that matched, if any
    pub detected_name: Option<String>,
    /// Concepts this mention could plausibly refer to, prior to disambiguation
    pub link_candidates: Vec<Cui>,
    /// The linked concept, once resolved
    pub cui: Option<Cui>,
    /// Similarity between the mention context and the linked concept
    pub context_similarity: f32,
}

impl Mention {
    /// Number of tokens covered by the mention (0 for a degenerate span)
    pub fn token_len(&self) -> usize {
        (self.end_token + 1).saturating_sub(self.start_token)
    }

    /// Iterator over the token indices covered by the mention
    pub fn token_indices(&self) -> impl Iterator<Item = usize> {
        self.start_token..=self.end_token
    }
}

/// A tokenized document moving through the pipeline
///
/// `mentions` is the working set produced by the name matcher and mutated
/// by the linker; `final_mentions` is the overlap-resolved output.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Document {
    /// Full source text
    pub text: String,
    /// Ordered tokens with byte offsets
    pub tokens: Vec<Token>,
    /// All detected mentions (pre overlap-resolution)
    pub mentions: Vec<Mention>,
    /// Accepted mentions after overlap resolution
    pub final_mentions: Vec<Mention>,
    start_index: HashMap<usize, usize>,
    end_index: HashMap<usize, usize>,
}

impl Document {
    /// Create a document from its text and tokens
    pub fn new(text: String, tokens: Vec<Token>) -> Self {
        let start_index = tokens.iter().map(|t| (t.start, t.index)).collect();
        let end_index = tokens.iter().map(|t| (t.end, t.index)).collect();
        Self {
            text,
            tokens,
            mentions: Vec::new(),
            final_mentions: Vec::new(),
            start_index,
            end_index,
        }
    }

    /// Map a byte range onto a token span
    ///
    /// Returns the (start, end) token indices only when the range aligns
    /// exactly with token boundaries; misaligned matches produce no span.
    pub fn token_span(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        let first = *self.start_index.get(&start)?;
        let last = *self.end_index.get(&end)?;
        (first <= last).then_some((first, last))
    }

    /// Tokens covered by a mention
    pub fn mention_tokens(&self, mention: &Mention) -> &[Token] {
        &self.tokens[mention.start_token..=mention.end_token]
    }

    /// Context-includable tokens left of a token index, nearest first
    pub fn left_context(&self, start_token: usize, size: usize) -> Vec<&Token> {
        let from = start_token.saturating_sub(size);
        let mut tokens: Vec<&Token> = self.tokens[from..start_token]
            .iter()
            .filter(|t| t.should_include())
            .collect();
        // The first token should be the one closest to the center
        tokens.reverse();
        tokens
    }

    /// Context-includable tokens right of a token index, in natural order
    pub fn right_context(&self, end_token: usize, size: usize) -> Vec<&Token> {
        let from = (end_token + 1).min(self.tokens.len());
        let to = (end_token + 1 + size).min(self.tokens.len());
        self.tokens[from..to]
            .iter()
            .filter(|t| t.should_include())
            .collect()
    }
}
