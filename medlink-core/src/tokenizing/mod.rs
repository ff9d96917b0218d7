//! Tokenization seam for the pipeline
//!
//! Tokenizers are pluggable: implementations are registered by name in a
//! [`TokenizerRegistry`] and resolved at configuration time. The crate
//! ships a regex-based default; anything producing a [`Document`] with
//! offset-carrying tokens can be plugged in.

pub mod regex_impl;

pub use regex_impl::RegexTokenizer;

use std::collections::HashMap;

use crate::core::{Document, MedLinkError, Result};

/// A tokenizer turning raw text into a [`Document`]
pub trait Tokenizer: std::fmt::Debug {
    /// Tokenize the given text
    fn tokenize(&self, text: &str) -> Document;
}

/// Factory producing a boxed tokenizer
pub type TokenizerFactory = fn() -> Result<Box<dyn Tokenizer>>;

/// Registry of tokenizer backends, resolved by name
pub struct TokenizerRegistry {
    factories: HashMap<String, TokenizerFactory>,
}

impl TokenizerRegistry {
    /// Create a registry with the default backends registered
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("regex", || Ok(Box::new(RegexTokenizer::new()?)));
        registry
    }

    /// Register a tokenizer backend under a name
    pub fn register(&mut self, name: impl Into<String>, factory: TokenizerFactory) {
        let name = name.into();
        tracing::debug!(tokenizer = %name, "registered tokenizer");
        self.factories.insert(name, factory);
    }

    /// Create the tokenizer registered under the given name
    pub fn create(&self, name: &str) -> Result<Box<dyn Tokenizer>> {
        match self.factories.get(name) {
            Some(factory) => factory(),
            None => Err(MedLinkError::Config {
                message: format!("tokenizer not registered: {name}"),
            }),
        }
    }

    /// Names of all registered backends
    pub fn list(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl Default for TokenizerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
