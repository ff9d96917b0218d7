//! Validation and registration of raw name matches
//!
//! A raw automaton match only becomes a candidate mention after passing
//! the length floor, the uppercase constraints, and the skip-token
//! tolerance. A match that fails validation contributes nothing.

use crate::cdb::ConceptStore;
use crate::config::Config;
use crate::core::{Document, Mention};

/// Validate a matched token span and register a mention when it passes
///
/// Returns true when a mention was added.
pub fn maybe_annotate(
    doc: &mut Document,
    start_token: usize,
    end_token: usize,
    name: &str,
    store: &ConceptStore,
    config: &Config,
) -> bool {
    let Some(name_info) = store.name_info(name) else {
        tracing::debug!(name, "matched name missing from the store, skipping");
        return false;
    };

    let name_len = name.chars().count();
    if name_len < config.ner.min_name_len {
        return false;
    }

    let start = doc.tokens[start_token].start;
    let end = doc.tokens[end_token].end;
    let matched_text = &doc.text[start..end];

    // Short names are only trusted when the text itself is uppercase
    if name_len < config.ner.upper_case_limit_len && !is_all_upper(matched_text) {
        return false;
    }
    if config.ner.check_upper_case_names && name_info.is_upper && !is_all_upper(matched_text) {
        return false;
    }

    let skipped = doc.tokens[start_token..=end_token]
        .iter()
        .filter(|token| !token.should_include())
        .count();
    if skipped > config.ner.max_skip_tokens {
        return false;
    }

    let mention = Mention {
        start_token,
        end_token,
        start,
        end,
        text: matched_text.to_string(),
        detected_name: Some(name.to_string()),
        link_candidates: name_info.cuis().cloned().collect(),
        cui: None,
        context_similarity: 0.0,
    };
    tracing::debug!(
        name,
        text = %mention.text,
        candidates = mention.link_candidates.len(),
        "registered candidate mention"
    );
    doc.mentions.push(mention);
    true
}

fn is_all_upper(text: &str) -> bool {
    text.chars().any(|c| c.is_alphabetic()) && !text.chars().any(|c| c.is_lowercase())
}
