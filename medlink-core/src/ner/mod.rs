//! Dictionary-based named-entity detection
//!
//! Builds an Aho-Corasick automaton over every name registered in the
//! concept store and reports every (overlapping) occurrence in a
//! document. Overlap resolution is deferred to the linker; validation of
//! each raw match lives in [`annotator`].

pub mod annotator;

use std::collections::HashSet;

use aho_corasick::AhoCorasick;

use crate::cdb::ConceptStore;
use crate::config::Config;
use crate::core::{Document, MedLinkError, Result};

/// Dictionary NER over the concept store's full name set
pub struct DictNer {
    automaton: AhoCorasick,
    patterns: Vec<String>,
}

impl DictNer {
    /// Build the matcher from the store's current names
    pub fn from_store(store: &ConceptStore, config: &Config) -> Result<Self> {
        let (automaton, patterns) = Self::build(store, config)?;
        Ok(Self {
            automaton,
            patterns,
        })
    }

    fn build(store: &ConceptStore, config: &Config) -> Result<(AhoCorasick, Vec<String>)> {
        tracing::info!(names = store.name_count(), "rebuilding NER automaton");
        let separator = &config.general.separator;
        let mut seen = HashSet::new();
        let mut patterns = Vec::new();
        for name_info in store.names() {
            let clean = name_info.name.replace(separator, " ");
            if seen.insert(clean.clone()) {
                patterns.push(clean);
            }
        }
        let automaton = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&patterns)
            .map_err(|err| MedLinkError::NameMatcher {
                message: format!("failed to build automaton: {err}"),
            })?;
        Ok((automaton, patterns))
    }

    /// Rebuild the automaton after the store's names changed
    pub fn rebuild(&mut self, store: &mut ConceptStore, config: &Config) -> Result<()> {
        let (automaton, patterns) = Self::build(store, config)?;
        self.automaton = automaton;
        self.patterns = patterns;
        store.acknowledge_names_changed();
        Ok(())
    }

    /// Detect candidate mentions in a document
    ///
    /// Every validated match is appended to `doc.mentions` with its
    /// matched name and link candidates; the linker resolves them later.
    pub fn process(
        &mut self,
        doc: &mut Document,
        store: &mut ConceptStore,
        config: &Config,
    ) -> Result<()> {
        if store.names_changed() {
            self.rebuild(store, config)?;
        }
        let separator = &config.general.separator;
        let matches: Vec<(usize, usize, usize)> = self
            .automaton
            .find_overlapping_iter(doc.text.as_str())
            .map(|mat| (mat.start(), mat.end(), mat.pattern().as_usize()))
            .collect();
        for (start, end, pattern_index) in matches {
            let name = self.patterns[pattern_index].replace(' ', separator);
            let Some((start_token, end_token)) = doc.token_span(start, end) else {
                // Matched mid-token (e.g. inside a longer word)
                continue;
            };
            annotator::maybe_annotate(doc, start_token, end_token, &name, store, config);
        }
        Ok(())
    }
}
