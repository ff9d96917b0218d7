//! Regex-based default tokenizer
//!
//! Splits text into alphanumeric runs and single punctuation characters,
//! keeping byte offsets. Alphanumeric tokens are marked as includable for
//! context windows; punctuation is kept (the name matcher needs exact
//! offsets) but excluded from context.

use regex::Regex;

use crate::core::{Document, MedLinkError, Result, Token};
use crate::tokenizing::Tokenizer;

/// Default tokenizer built on a word/punctuation regex
#[derive(Debug)]
pub struct RegexTokenizer {
    pattern: Regex,
}

impl RegexTokenizer {
    /// Create the tokenizer
    pub fn new() -> Result<Self> {
        let pattern =
            Regex::new(r"[A-Za-z0-9]+(?:['\-][A-Za-z0-9]+)*|[^\sA-Za-z0-9]").map_err(|err| {
                MedLinkError::Tokenization {
                    message: format!("invalid token pattern: {err}"),
                }
            })?;
        Ok(Self { pattern })
    }
}

impl Tokenizer for RegexTokenizer {
    fn tokenize(&self, text: &str) -> Document {
        let mut tokens = Vec::new();
        for mat in self.pattern.find_iter(text) {
            let token_text = mat.as_str();
            let include = token_text.chars().any(|c| c.is_alphanumeric());
            tokens.push(Token {
                index: tokens.len(),
                text: token_text.to_string(),
                lower: token_text.to_lowercase(),
                start: mat.start(),
                end: mat.end(),
                include_in_context: include,
            });
        }
        Document::new(text.to_string(), tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_words_and_punct() {
        let tokenizer = RegexTokenizer::new().unwrap();
        let doc = tokenizer.tokenize("Patient has kidney failure, stage 3.");
        let texts: Vec<&str> = doc.tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["Patient", "has", "kidney", "failure", ",", "stage", "3", "."]
        );
        assert!(doc.tokens[0].should_include());
        assert!(!doc.tokens[4].should_include());
        assert_eq!(doc.tokens[2].lower, "kidney");
    }

    #[test]
    fn test_offsets_are_exact() {
        let tokenizer = RegexTokenizer::new().unwrap();
        let text = "acute renal failure";
        let doc = tokenizer.tokenize(text);
        for token in &doc.tokens {
            assert_eq!(&text[token.start..token.end], token.text);
        }
    }

    #[test]
    fn test_hyphenated_and_apostrophe_words_stay_together() {
        let tokenizer = RegexTokenizer::new().unwrap();
        let doc = tokenizer.tokenize("non-insulin dependent, Crohn's");
        let texts: Vec<&str> = doc.tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["non-insulin", "dependent", ",", "Crohn's"]);
    }

    #[test]
    fn test_empty_text() {
        let tokenizer = RegexTokenizer::new().unwrap();
        let doc = tokenizer.tokenize("");
        assert!(doc.tokens.is_empty());
    }
}
