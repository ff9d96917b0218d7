//! Context-based linking
//!
//! The linker walks every candidate mention of a document and either
//! trains the context model on it (training mode) or resolves it to a
//! concept and accepts/rejects it by similarity threshold (inference
//! mode). Overlapping accepted mentions are then resolved in favor of the
//! longest span.

pub mod context_model;

pub use context_model::ContextModel;

use std::collections::{HashMap, HashSet};

use rand::Rng;

use crate::cdb::{ConceptStore, NameStatus};
use crate::config::Config;
use crate::core::{Cui, Document, Mention, Result};
use crate::vocab::Vocab;

/// Sentinel name used to disambiguate mentions with no detected name
const UNKNOWN_NAME: &str = "unk-unk";

/// Links candidate mentions to concepts, training or inferring per document
#[derive(Default)]
pub struct Linker {
    /// How often a (name, cui) pair was used during training
    train_counter: HashMap<String, u64>,
}

impl Linker {
    /// Create a linker
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-pair training counts accumulated so far
    pub fn train_counter(&self) -> &HashMap<String, u64> {
        &self.train_counter
    }

    /// Process a document: link every candidate mention, then resolve overlaps
    ///
    /// The document's final-mention list is replaced wholesale. Re-running
    /// on a document without clearing its mentions first duplicates work.
    pub fn process(
        &mut self,
        doc: &mut Document,
        store: &mut ConceptStore,
        vocab: &mut Vocab,
        config: &Config,
    ) -> Result<()> {
        doc.final_mentions.clear();
        // The model is rebuilt from the live config on every document
        let model = ContextModel::new(config);
        let mentions = std::mem::take(&mut doc.mentions);
        let mut linked = Vec::new();

        for mention in &mentions {
            let outcome = if config.linking.train {
                self.process_mention_train(&model, doc, mention, store, vocab, config, &mut linked)
            } else {
                self.process_mention_inference(
                    &model, doc, mention, store, vocab, config, &mut linked,
                )
            };
            if let Err(err) = outcome {
                // One malformed mention must not abort the document
                tracing::warn!(text = %mention.text, %err, "failed to process mention, skipping");
            }
        }

        doc.mentions = linked;
        resolve_overlaps(doc);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn train_pair(
        &mut self,
        model: &ContextModel,
        cui: &Cui,
        name: &str,
        mention: &Mention,
        doc: &Document,
        store: &mut ConceptStore,
        vocab: &mut Vocab,
        config: &Config,
    ) -> Result<()> {
        model.train(cui, mention, doc, store, vocab, false, &[])?;
        if config.linking.negative_probability >= rand::thread_rng().gen::<f64>() {
            model.train_using_negative_sampling(cui, store, vocab)?;
        }
        *self
            .train_counter
            .entry(format!("{name} - {cui}"))
            .or_insert(0) += 1;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn process_mention_train(
        &mut self,
        model: &ContextModel,
        doc: &Document,
        mention: &Mention,
        store: &mut ConceptStore,
        vocab: &mut Vocab,
        config: &Config,
        linked: &mut Vec<Mention>,
    ) -> Result<()> {
        let Some(name) = mention.detected_name.clone() else {
            return Ok(());
        };
        if name.chars().count() < config.linking.disamb_length_limit {
            return Ok(());
        }
        let cuis = mention.link_candidates.clone();

        if cuis.len() == 1 {
            let cui = &cuis[0];
            let Some(name_info) = store.name_info(&name) else {
                return Ok(());
            };
            // Ambiguous names are deliberately excluded from naive training
            if name_info.status_for(cui) == NameStatus::MustDisambiguate {
                return Ok(());
            }
            self.train_pair(model, cui, &name, mention, doc, store, vocab, config)?;
            let mut accepted = mention.clone();
            accepted.cui = Some(cui.clone());
            accepted.context_similarity = 1.0;
            linked.push(accepted);
        } else {
            for cui in &cuis {
                let Some(name_info) = store.name_info(&name) else {
                    continue;
                };
                // Only primary names are confidently true positives here
                if !name_info.status_for(cui).is_primary() {
                    continue;
                }
                self.train_pair(model, cui, &name, mention, doc, store, vocab, config)?;
                // One name being primary for two CUIs should not happen,
                // but it can - and we do not care
                let mut accepted = mention.clone();
                accepted.cui = Some(cui.clone());
                accepted.context_similarity = 1.0;
                linked.push(accepted);
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn link_with_name(
        &self,
        model: &ContextModel,
        doc: &Document,
        mention: &Mention,
        cuis: &[Cui],
        name: &str,
        store: &ConceptStore,
        vocab: &Vocab,
        config: &Config,
    ) -> (Option<Cui>, f32) {
        let status_for = |cui: &Cui| {
            store
                .name_info(name)
                .map(|info| info.status_for(cui))
                .unwrap_or(NameStatus::Automatic)
        };
        let do_disambiguate = name.chars().count() < config.linking.disamb_length_limit
            || (cuis.len() == 1 && status_for(&cuis[0]).requires_disambiguation())
            || cuis.len() > 1;

        if do_disambiguate {
            model.disambiguate(cuis, mention, name, doc, store, vocab)
        } else {
            let cui = cuis[0].clone();
            let similarity = if config.linking.always_calculate_similarity {
                model.similarity(&cui, mention, doc, store, vocab)
            } else {
                // Direct link, no care for similarity
                1.0
            };
            (Some(cui), similarity)
        }
    }

    fn check_similarity(
        &self,
        cui: &Cui,
        similarity: f32,
        store: &ConceptStore,
        config: &Config,
    ) -> bool {
        let threshold = config.linking.similarity_threshold;
        match config.linking.similarity_threshold_type.as_str() {
            "static" => similarity >= threshold,
            "dynamic" => {
                let confidence = store
                    .cui_info(cui)
                    .map_or(0.0, |info| info.average_confidence);
                similarity >= confidence * threshold
            },
            other => {
                tracing::warn!(
                    threshold_type = other,
                    "unknown similarity threshold type, rejecting"
                );
                false
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn process_mention_inference(
        &mut self,
        model: &ContextModel,
        doc: &Document,
        mention: &Mention,
        store: &mut ConceptStore,
        vocab: &mut Vocab,
        config: &Config,
        linked: &mut Vec<Mention>,
    ) -> Result<()> {
        let cuis = &mention.link_candidates;
        if cuis.is_empty() {
            return Ok(());
        }
        tracing::debug!(text = %mention.text, candidates = cuis.len(), "linker at mention");

        let (cui, similarity) = match &mention.detected_name {
            Some(name) => {
                self.link_with_name(model, doc, mention, cuis, name, store, vocab, config)
            },
            // No name detected: resolve by pure similarity ranking
            None => model.disambiguate(cuis, mention, UNKNOWN_NAME, doc, store, vocab),
        };

        let Some(cui) = cui else {
            return Ok(());
        };
        if !config.linking.filters.check(&cui) {
            return Ok(());
        }
        if self.check_similarity(&cui, similarity, store, config) {
            let mut accepted = mention.clone();
            accepted.cui = Some(cui);
            accepted.context_similarity = similarity;
            linked.push(accepted);
        }
        Ok(())
    }

    /// Force a concept-mention association, for external supervised training
    #[allow(clippy::too_many_arguments)]
    pub fn train_on(
        &mut self,
        cui: &Cui,
        mention: &Mention,
        doc: &Document,
        store: &mut ConceptStore,
        vocab: &Vocab,
        config: &Config,
        negative: bool,
        names: &[String],
    ) -> Result<()> {
        ContextModel::new(config).train(cui, mention, doc, store, vocab, negative, names)
    }
}

/// Resolve overlapping mentions in favor of the longest span
///
/// Accepted mentions are sorted descending by matched-text length and
/// kept greedily: a mention survives only when none of its tokens were
/// claimed by a longer, previously kept one.
pub fn resolve_overlaps(doc: &mut Document) {
    doc.mentions
        .sort_by(|a, b| b.text.chars().count().cmp(&a.text.chars().count()));
    let mut claimed: HashSet<usize> = HashSet::new();
    let mut kept: Vec<Mention> = Vec::new();
    for mention in &doc.mentions {
        if mention.token_indices().any(|token| claimed.contains(&token)) {
            continue;
        }
        claimed.extend(mention.token_indices());
        kept.push(mention.clone());
    }
    doc.final_mentions.extend(kept);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdb::{prepare_names, ConceptEntry};
    use crate::ner::DictNer;
    use crate::tokenizing::{RegexTokenizer, Tokenizer};

    fn store_with(concepts: &[(&str, &str, NameStatus)]) -> ConceptStore {
        let mut store = ConceptStore::default();
        for (cui, raw, status) in concepts {
            let names = prepare_names([*raw], "~");
            store.add_concept(
                ConceptEntry::new(Cui::from(*cui), names).with_status(*status),
                false,
            );
        }
        store
    }

    fn vocab() -> Vocab {
        let mut vocab = Vocab::new();
        for (word, vector) in [
            ("patient", vec![0.2, 0.1, 0.0]),
            ("has", vec![0.0, 0.1, 0.2]),
            ("kidney", vec![1.0, 0.0, 0.0]),
            ("failure", vec![0.0, 1.0, 0.0]),
            ("diabetes", vec![0.0, 0.0, 1.0]),
            ("and", vec![0.1, 0.1, 0.1]),
        ] {
            vocab.add_word(word, 100, Some(vector), true);
        }
        vocab
    }

    fn annotated_doc(text: &str, store: &mut ConceptStore, config: &Config) -> Document {
        let mut ner = DictNer::from_store(store, config).unwrap();
        let mut doc = RegexTokenizer::new().unwrap().tokenize(text);
        ner.process(&mut doc, store, config).unwrap();
        doc
    }

    #[test]
    fn test_inference_direct_link() {
        let mut config = Config::default();
        config.linking.train = false;
        let mut store = store_with(&[
            ("C01", "kidney failure", NameStatus::Primary),
            ("C02", "diabetes", NameStatus::Primary),
        ]);
        let mut voc = vocab();
        let mut doc = annotated_doc("patient has kidney failure and diabetes", &mut store, &config);

        let mut linker = Linker::new();
        linker
            .process(&mut doc, &mut store, &mut voc, &config)
            .unwrap();

        // Single non-ambiguous candidates above the length floor link
        // directly with similarity 1
        assert_eq!(doc.final_mentions.len(), 2);
        for mention in &doc.final_mentions {
            assert_eq!(mention.context_similarity, 1.0);
        }
        let cuis: Vec<&str> = doc
            .final_mentions
            .iter()
            .map(|m| m.cui.as_ref().unwrap().as_str())
            .collect();
        assert!(cuis.contains(&"C01"));
        assert!(cuis.contains(&"C02"));
    }

    #[test]
    fn test_inference_always_calculate_similarity_rejects_untrained() {
        let mut config = Config::default();
        config.linking.train = false;
        config.linking.always_calculate_similarity = true;
        let mut store = store_with(&[
            ("C01", "kidney failure", NameStatus::Primary),
            ("C02", "diabetes", NameStatus::Primary),
        ]);
        let mut voc = vocab();
        let mut doc = annotated_doc("patient has kidney failure and diabetes", &mut store, &config);

        let mut linker = Linker::new();
        linker
            .process(&mut doc, &mut store, &mut voc, &config)
            .unwrap();

        // Untrained concepts report -1, which the static threshold rejects
        assert!(doc.final_mentions.is_empty());
    }

    #[test]
    fn test_threshold_fail_closed() {
        let mut config = Config::default();
        config.linking.train = false;
        config.linking.similarity_threshold_type = "adaptive".to_string();
        let mut store = store_with(&[("C01", "kidney failure", NameStatus::Primary)]);
        let mut voc = vocab();
        let mut doc = annotated_doc("patient has kidney failure", &mut store, &config);

        let mut linker = Linker::new();
        linker
            .process(&mut doc, &mut store, &mut voc, &config)
            .unwrap();
        // Direct link would have similarity 1, but the unknown threshold
        // type rejects unconditionally
        assert!(doc.final_mentions.is_empty());
    }

    #[test]
    fn test_inference_rejects_filtered_concept() {
        let mut config = Config::default();
        config.linking.train = false;
        config.linking.filters.cuis_exclude.insert(Cui::from("C01"));
        let mut store = store_with(&[("C01", "kidney failure", NameStatus::Primary)]);
        let mut voc = vocab();
        let mut doc = annotated_doc("patient has kidney failure", &mut store, &config);

        let mut linker = Linker::new();
        linker
            .process(&mut doc, &mut store, &mut voc, &config)
            .unwrap();
        assert!(doc.final_mentions.is_empty());
    }

    #[test]
    fn test_training_single_candidate() {
        let mut config = Config::default();
        config.linking.train = true;
        config.linking.random_replacement_unsupervised = 1.0;
        config.linking.negative_probability = 0.0;
        let mut store = store_with(&[("C01", "kidney failure", NameStatus::Primary)]);
        let mut voc = vocab();
        let mut doc = annotated_doc("patient has kidney failure", &mut store, &config);

        let mut linker = Linker::new();
        linker
            .process(&mut doc, &mut store, &mut voc, &config)
            .unwrap();

        assert_eq!(store.cui_info(&Cui::from("C01")).unwrap().count_train, 1);
        assert_eq!(doc.final_mentions.len(), 1);
        assert_eq!(doc.final_mentions[0].context_similarity, 1.0);
        assert_eq!(linker.train_counter()["kidney~failure - C01"], 1);
    }

    #[test]
    fn test_training_skips_must_disambiguate() {
        let mut config = Config::default();
        config.linking.train = true;
        let mut store = store_with(&[("C01", "kidney failure", NameStatus::MustDisambiguate)]);
        let mut voc = vocab();
        let mut doc = annotated_doc("patient has kidney failure", &mut store, &config);

        let mut linker = Linker::new();
        linker
            .process(&mut doc, &mut store, &mut voc, &config)
            .unwrap();

        assert_eq!(store.cui_info(&Cui::from("C01")).unwrap().count_train, 0);
        assert!(doc.final_mentions.is_empty());
    }

    #[test]
    fn test_training_multi_candidate_trains_primary_only() {
        let mut config = Config::default();
        config.linking.train = true;
        config.linking.random_replacement_unsupervised = 1.0;
        config.linking.negative_probability = 0.0;
        let mut store = store_with(&[
            ("C01", "kidney failure", NameStatus::Primary),
            ("C02", "kidney failure", NameStatus::Automatic),
        ]);
        let mut voc = vocab();
        let mut doc = annotated_doc("patient has kidney failure", &mut store, &config);

        let mut linker = Linker::new();
        linker
            .process(&mut doc, &mut store, &mut voc, &config)
            .unwrap();

        assert_eq!(store.cui_info(&Cui::from("C01")).unwrap().count_train, 1);
        assert_eq!(store.cui_info(&Cui::from("C02")).unwrap().count_train, 0);
        assert_eq!(doc.final_mentions.len(), 1);
        assert_eq!(doc.final_mentions[0].cui, Some(Cui::from("C01")));
    }

    #[test]
    fn test_training_skips_short_names() {
        let mut config = Config::default();
        config.linking.train = true;
        config.linking.disamb_length_limit = 10;
        let mut store = store_with(&[("C01", "diabetes", NameStatus::Primary)]);
        let mut voc = vocab();
        let mut doc = annotated_doc("patient has diabetes", &mut store, &config);

        let mut linker = Linker::new();
        linker
            .process(&mut doc, &mut store, &mut voc, &config)
            .unwrap();
        assert_eq!(store.cui_info(&Cui::from("C01")).unwrap().count_train, 0);
    }

    #[test]
    fn test_longest_match_wins() {
        let mut config = Config::default();
        config.linking.train = false;
        let mut store = store_with(&[
            ("C01", "kidney failure", NameStatus::Primary),
            ("C02", "kidney", NameStatus::Primary),
        ]);
        let mut voc = vocab();
        let mut doc = annotated_doc("patient has kidney failure", &mut store, &config);

        let mut linker = Linker::new();
        linker
            .process(&mut doc, &mut store, &mut voc, &config)
            .unwrap();

        // Both mentions link, but only the longest span is kept
        assert_eq!(doc.final_mentions.len(), 1);
        assert_eq!(doc.final_mentions[0].text, "kidney failure");
        assert_eq!(doc.final_mentions[0].cui, Some(Cui::from("C01")));
    }

    #[test]
    fn test_resolve_overlaps_claims_tokens() {
        let tokenizer = RegexTokenizer::new().unwrap();
        let mut doc = tokenizer.tokenize("kidney failure and diabetes");
        let long = Mention {
            start_token: 0,
            end_token: 1,
            start: 0,
            end: 14,
            text: "kidney failure".to_string(),
            detected_name: None,
            link_candidates: Vec::new(),
            cui: Some(Cui::from("C01")),
            context_similarity: 1.0,
        };
        let short = Mention {
            start_token: 1,
            end_token: 1,
            start: 7,
            end: 14,
            text: "failure".to_string(),
            detected_name: None,
            link_candidates: Vec::new(),
            cui: Some(Cui::from("C03")),
            context_similarity: 1.0,
        };
        let separate = Mention {
            start_token: 3,
            end_token: 3,
            start: 19,
            end: 27,
            text: "diabetes".to_string(),
            detected_name: None,
            link_candidates: Vec::new(),
            cui: Some(Cui::from("C02")),
            context_similarity: 1.0,
        };
        doc.mentions = vec![short.clone(), long.clone(), separate.clone()];

        resolve_overlaps(&mut doc);
        let texts: Vec<&str> = doc
            .final_mentions
            .iter()
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(texts, vec!["kidney failure", "diabetes"]);
    }

    #[test]
    fn test_dynamic_threshold_uses_average_confidence() {
        let mut config = Config::default();
        config.linking.train = false;
        config.linking.similarity_threshold_type = "dynamic".to_string();
        config.linking.similarity_threshold = 0.9;
        config.linking.always_calculate_similarity = true;
        config.linking.random_replacement_unsupervised = 1.0;

        let mut store = store_with(&[("C01", "kidney failure", NameStatus::Primary)]);
        let mut voc = vocab();

        // Train once so similarity is real, and set a low recorded confidence
        let train_config = {
            let mut c = config.clone();
            c.linking.train = true;
            c.linking.negative_probability = 0.0;
            c
        };
        let mut train_doc =
            annotated_doc("patient has kidney failure", &mut store, &train_config);
        let mut linker = Linker::new();
        linker
            .process(&mut train_doc, &mut store, &mut voc, &train_config)
            .unwrap();
        store
            .cui_info_mut(&Cui::from("C01"))
            .unwrap()
            .average_confidence = 0.5;

        let mut doc = annotated_doc("patient has kidney failure", &mut store, &config);
        let mut linker = Linker::new();
        linker
            .process(&mut doc, &mut store, &mut voc, &config)
            .unwrap();
        // similarity ~1.0 >= 0.5 * 0.9
        assert_eq!(doc.final_mentions.len(), 1);
    }
}
