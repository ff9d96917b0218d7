//! # MedLink Core
//!
//! Core library for biomedical concept recognition: given free text it
//! detects mentions of clinical concepts from an ontology-derived
//! dictionary (SNOMED-CT, UMLS, ...), links each mention to a concept
//! identifier, and tracks confidence information.
//!
//! The pipeline has three stages:
//! - **Tokenization**: pluggable tokenizers produce offset-carrying tokens
//! - **Name matching**: an Aho-Corasick automaton over every registered
//!   name yields candidate mentions
//! - **Linking**: an online-trainable context model disambiguates
//!   ambiguous mentions by cosine similarity against learnt per-concept
//!   context embeddings
//!
//! ## Quick Start
//!
//! ```rust
//! use medlink_core::{Config, ConceptStore, Pipeline, Vocab};
//! use medlink_core::cdb::{prepare_names, ConceptEntry, NameStatus};
//! use medlink_core::core::Cui;
//!
//! # fn example() -> medlink_core::Result<()> {
//! let mut store = ConceptStore::default();
//! let names = prepare_names(["Kidney Failure"], &store.separator.clone());
//! store.add_concept(
//!     ConceptEntry::new(Cui::from("C001"), names).with_status(NameStatus::Primary),
//!     false,
//! );
//!
//! let mut config = Config::default();
//! config.linking.train = false;
//!
//! let mut pipeline = Pipeline::new(config, store, Vocab::new())?;
//! let doc = pipeline.annotate("patient has kidney failure")?;
//! assert_eq!(doc.final_mentions.len(), 1);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// ================================
// MODULE DECLARATIONS
// ================================

/// The concept store (CDB) and its records
pub mod cdb;
/// Configuration management
pub mod config;
/// Core types and error handling
pub mod core;
/// Context-based linking and the vector context model
pub mod linking;
/// Dictionary-based named-entity detection
pub mod ner;
/// Tokenization seam and default tokenizer
pub mod tokenizing;
/// Word-embedding vocabulary and negative sampling
pub mod vocab;

// ================================
// PUBLIC API EXPORTS
// ================================

pub use crate::cdb::ConceptStore;
pub use crate::config::Config;
pub use crate::core::{Cui, Document, MedLinkError, Mention, Result, SemanticTypeId, Token};
pub use crate::linking::{ContextModel, Linker};
pub use crate::ner::DictNer;
pub use crate::tokenizing::{Tokenizer, TokenizerRegistry};
pub use crate::vocab::Vocab;

use crate::tokenizing::RegexTokenizer;

/// The full concept-recognition pipeline
///
/// Owns the concept store, vocabulary, tokenizer, name matcher, and
/// linker, and runs them in order over documents. The store is mutated in
/// place during training; inference leaves the trained fields untouched.
pub struct Pipeline {
    config: Config,
    store: ConceptStore,
    vocab: Vocab,
    tokenizer: Box<dyn Tokenizer>,
    ner: DictNer,
    linker: Linker,
}

impl Pipeline {
    /// Create a pipeline from a config, a populated store, and a vocabulary
    pub fn new(config: Config, store: ConceptStore, vocab: Vocab) -> Result<Self> {
        let registry = TokenizerRegistry::new();
        let tokenizer = registry.create(&config.general.tokenizer)?;
        let ner = DictNer::from_store(&store, &config)?;
        let linker = Linker::new();
        Ok(Self {
            config,
            store,
            vocab,
            tokenizer,
            ner,
            linker,
        })
    }

    /// Create a pipeline with an explicit tokenizer instance
    pub fn with_tokenizer(
        config: Config,
        store: ConceptStore,
        vocab: Vocab,
        tokenizer: Box<dyn Tokenizer>,
    ) -> Result<Self> {
        let ner = DictNer::from_store(&store, &config)?;
        let linker = Linker::new();
        Ok(Self {
            config,
            store,
            vocab,
            tokenizer,
            ner,
            linker,
        })
    }

    /// Tokenize a text without running detection or linking
    pub fn tokenize(&self, text: &str) -> Document {
        self.tokenizer.tokenize(text)
    }

    /// Detect and link concepts in an already-tokenized document
    ///
    /// Mutates the document's mention lists in place. Re-running on a
    /// document whose prior mentions were not cleared duplicates work.
    pub fn find_and_link(&mut self, doc: &mut Document) -> Result<()> {
        self.ner.process(doc, &mut self.store, &self.config)?;
        self.linker
            .process(doc, &mut self.store, &mut self.vocab, &self.config)
    }

    /// Tokenize, detect, and link concepts in a text
    pub fn annotate(&mut self, text: &str) -> Result<Document> {
        let mut doc = self.tokenizer.tokenize(text);
        self.find_and_link(&mut doc)?;
        Ok(doc)
    }

    /// Force a concept-mention association, for supervised training loops
    ///
    /// Bypasses the matcher's candidates entirely: the given concept is
    /// trained (positively or negatively) on the mention's context.
    pub fn train_on(
        &mut self,
        cui: &Cui,
        mention: &Mention,
        doc: &Document,
        negative: bool,
        names: &[String],
    ) -> Result<()> {
        self.linker.train_on(
            cui,
            mention,
            doc,
            &mut self.store,
            &self.vocab,
            &self.config,
            negative,
            names,
        )
    }

    /// The pipeline config
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mutable access to the pipeline config
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// The concept store
    pub fn store(&self) -> &ConceptStore {
        &self.store
    }

    /// Mutable access to the concept store
    pub fn store_mut(&mut self) -> &mut ConceptStore {
        &mut self.store
    }

    /// The vocabulary
    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    /// Mutable access to the vocabulary
    pub fn vocab_mut(&mut self) -> &mut Vocab {
        &mut self.vocab
    }

    /// The linker
    pub fn linker(&self) -> &Linker {
        &self.linker
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("concepts", &self.store.concept_count())
            .field("names", &self.store.name_count())
            .field("vocab", &self.vocab.len())
            .field("train", &self.config.linking.train)
            .finish()
    }
}

/// Convenience constructor used by tests and small tools
impl Pipeline {
    /// Create a pipeline with the default regex tokenizer regardless of
    /// the configured tokenizer name
    pub fn with_default_tokenizer(
        config: Config,
        store: ConceptStore,
        vocab: Vocab,
    ) -> Result<Self> {
        let tokenizer: Box<dyn Tokenizer> = Box::new(RegexTokenizer::new()?);
        Self::with_tokenizer(config, store, vocab, tokenizer)
    }
}
