//! Vector context model
//!
//! Learns embeddings for concepts from the token windows around their
//! mentions and scores candidate concepts against new contexts. Updates
//! are online and gradient-free: stored vectors are blended toward (or
//! away from) freshly observed context vectors, with a blend factor
//! derived from their cosine similarity and the learning rate.

use indexmap::IndexMap;
use rand::seq::IteratorRandom;
use rand::Rng;

use crate::cdb::{ConceptStore, NameStatus};
use crate::config::{Config, LinkingConfig, OptimizerConfig};
use crate::core::{Cui, Document, MedLinkError, Mention, Result};
use crate::vocab::Vocab;

/// Context vectors keyed by window label
pub type ContextVectors = IndexMap<String, Vec<f32>>;

/// Learns and compares per-concept context embeddings
pub struct ContextModel {
    config: LinkingConfig,
    separator: String,
}

impl ContextModel {
    /// Create a context model from the pipeline config
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.linking.clone(),
            separator: config.general.separator.clone(),
        }
    }

    fn tokens_to_vectors<'a, I>(&self, words: I, store: &ConceptStore, vocab: &Vocab) -> Vec<Vec<f32>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut vectors = Vec::new();
        for (step, word) in words.into_iter().enumerate() {
            if let Some(vector) = vocab.vec(word) {
                let weight = store.weighted_average(step);
                vectors.push(vector.iter().map(|v| v * weight).collect());
            }
        }
        vectors
    }

    fn should_change_name(&self, cui: &Cui, store: &ConceptStore) -> bool {
        if rand::thread_rng().gen::<f64>() <= self.config.random_replacement_unsupervised {
            return false;
        }
        store.cui_info(cui).is_some()
    }

    fn center_vectors(
        &self,
        cui: Option<&Cui>,
        mention: &Mention,
        doc: &Document,
        store: &ConceptStore,
        vocab: &Vocab,
    ) -> Vec<Vec<f32>> {
        if let Some(cui) = cui {
            if self.should_change_name(cui, store) {
                let replacement = store
                    .cui_info(cui)
                    .and_then(|info| info.names.iter().choose(&mut rand::thread_rng()));
                if let Some(name) = replacement {
                    let words = name.split(self.separator.as_str());
                    return self.tokens_to_vectors(words, store, vocab);
                }
            }
        }
        let words = doc
            .mention_tokens(mention)
            .iter()
            .map(|token| token.lower.as_str());
        self.tokens_to_vectors(words, store, vocab)
    }

    /// Context representation of a mention, one vector per window label
    ///
    /// Window labels with no contributing tokens are omitted. Passing the
    /// concept enables training-time center-token replacement with a
    /// random synonym.
    pub fn get_context_vectors(
        &self,
        mention: &Mention,
        doc: &Document,
        store: &ConceptStore,
        vocab: &Vocab,
        cui: Option<&Cui>,
    ) -> ContextVectors {
        let mut vectors = ContextVectors::new();
        for (label, &size) in &self.config.context_vector_sizes {
            let left = doc.left_context(mention.start_token, size);
            let right = doc.right_context(mention.end_token, size);

            let mut values =
                self.tokens_to_vectors(left.iter().map(|t| t.lower.as_str()), store, vocab);
            if !self.config.context_ignore_center_tokens {
                values.extend(self.center_vectors(cui, mention, doc, store, vocab));
            }
            values.extend(self.tokens_to_vectors(
                right.iter().map(|t| t.lower.as_str()),
                store,
                vocab,
            ));

            if !values.is_empty() {
                vectors.insert(label.clone(), mean_vectors(&values));
            }
        }
        vectors
    }

    /// Similarity between a concept's learnt context and a mention's context
    pub fn similarity(
        &self,
        cui: &Cui,
        mention: &Mention,
        doc: &Document,
        store: &ConceptStore,
        vocab: &Vocab,
    ) -> f32 {
        let vectors = self.get_context_vectors(mention, doc, store, vocab, None);
        self.similarity_from_vectors(cui, &vectors, store)
    }

    /// Similarity against already-computed context vectors
    ///
    /// Returns -1 when the concept is unknown, untrained, or below the
    /// training-count threshold.
    pub fn similarity_from_vectors(
        &self,
        cui: &Cui,
        vectors: &ContextVectors,
        store: &ConceptStore,
    ) -> f32 {
        let Some(cui_info) = store.cui_info(cui) else {
            tracing::warn!(%cui, "similarity requested for a concept missing from the store");
            return -1.0;
        };
        match &cui_info.context_vectors {
            Some(cui_vectors)
                if !cui_vectors.is_empty()
                    && cui_info.count_train >= self.config.train_count_threshold =>
            {
                weighted_similarity(cui_vectors, vectors, &self.config.context_vector_weights)
            },
            _ => -1.0,
        }
    }

    fn boost_similarities(
        &self,
        name: &str,
        cuis: &[Cui],
        similarities: &mut [f32],
        store: &ConceptStore,
    ) {
        if self.config.prefer_primary_name > 0.0 {
            tracing::debug!("preferring primary names");
            for (i, cui) in cuis.iter().enumerate() {
                if similarities[i] <= 0.0 {
                    continue;
                }
                let status = store
                    .name_info(name)
                    .map(|info| info.status_for(cui))
                    .unwrap_or(NameStatus::Automatic);
                if status.is_primary() {
                    let boosted = similarities[i] * (1.0 + self.config.prefer_primary_name);
                    similarities[i] = boosted.min(0.99);
                }
            }
        }

        if self.config.prefer_frequent_concepts > 0.0 {
            tracing::debug!("preferring frequent concepts");
            let counts: Vec<u64> = cuis
                .iter()
                .map(|cui| store.cui_info(cui).map_or(0, |info| info.count_train))
                .collect();
            let min_count = counts.iter().copied().min().unwrap_or(0).max(1);
            for (sim, &count) in similarities.iter_mut().zip(&counts) {
                let scale = if count > 10 {
                    (count as f32 / min_count as f32).log10() * self.config.prefer_frequent_concepts
                } else {
                    0.0
                };
                *sim = (*sim + *sim * scale).min(0.99);
            }
        }
    }

    /// Pick the best concept for an ambiguous mention
    ///
    /// Order matters: optional candidate filtering, raw similarities,
    /// primary-name boost, then frequency boost, then argmax.
    pub fn disambiguate(
        &self,
        cuis: &[Cui],
        mention: &Mention,
        name: &str,
        doc: &Document,
        store: &ConceptStore,
        vocab: &Vocab,
    ) -> (Option<Cui>, f32) {
        let vectors = self.get_context_vectors(mention, doc, store, vocab, None);

        let cuis: Vec<Cui> = if self.config.filter_before_disamb {
            cuis.iter()
                .filter(|cui| self.config.filters.check(cui))
                .cloned()
                .collect()
        } else {
            cuis.to_vec()
        };
        if cuis.is_empty() {
            return (None, 0.0);
        }

        let mut similarities: Vec<f32> = cuis
            .iter()
            .map(|cui| self.similarity_from_vectors(cui, &vectors, store))
            .collect();
        tracing::debug!(?similarities, candidates = cuis.len(), "raw similarities");

        self.boost_similarities(name, &cuis, &mut similarities, store);

        let mut best = 0;
        for i in 1..similarities.len() {
            if similarities[i] > similarities[best] {
                best = i;
            }
        }
        (Some(cuis[best].clone()), similarities[best])
    }

    /// Update the context representation of a concept from a mention
    ///
    /// A positive update pulls the stored vectors toward the observed
    /// context; a negative one pushes them away. `names` optionally
    /// tightens the status of (name, concept) pairs on negative updates.
    #[allow(clippy::too_many_arguments)]
    pub fn train(
        &self,
        cui: &Cui,
        mention: &Mention,
        doc: &Document,
        store: &mut ConceptStore,
        vocab: &Vocab,
        negative: bool,
        names: &[String],
    ) -> Result<()> {
        if mention.token_len() == 0 {
            tracing::warn!(%cui, "the provided mention was empty, nothing to train");
            return Ok(());
        }
        let vectors = self.get_context_vectors(mention, doc, store, vocab, Some(cui));

        let Some(count_train) = store.cui_info(cui).map(|info| info.count_train) else {
            tracing::warn!(%cui, "training requested for a concept missing from the store");
            return Ok(());
        };
        let lr = learning_rate(&self.config.optimizer, count_train)?;

        if let Some(cui_info) = store.cui_info_mut(cui) {
            match &mut cui_info.context_vectors {
                Some(stored) if !stored.is_empty() => {
                    update_context_vectors(stored, &vectors, lr, negative);
                },
                _ => {
                    cui_info.context_vectors = Some(vectors.clone());
                },
            }
            if !negative {
                cui_info.count_train += 1;
            }
        }
        tracing::debug!(%cui, negative, "updated concept context");

        if !negative {
            if let Some(name) = &mention.detected_name {
                if let Some(name_info) = store.name_info_mut(name) {
                    name_info.count_train += 1;
                }
            }

            if self.config.calculate_dynamic_threshold {
                let similarity = self.similarity(cui, mention, doc, store, vocab);
                if let Some(cui_info) = store.cui_info_mut(cui) {
                    cui_info.average_confidence = updated_average_confidence(
                        cui_info.average_confidence,
                        cui_info.count_train,
                        similarity,
                    );
                }
            }
        }

        if negative {
            // A false positive on this name: force disambiguation from now on
            for name in names {
                let Some(name_info) = store.name_info_mut(name) else {
                    continue;
                };
                match name_info.status_for(cui) {
                    NameStatus::Primary => {
                        name_info
                            .per_cui_status
                            .insert(cui.clone(), NameStatus::PrimaryWithDisambiguation);
                        tracing::debug!(%cui, name, "tightened primary name to disambiguated");
                    },
                    NameStatus::Automatic => {
                        name_info
                            .per_cui_status
                            .insert(cui.clone(), NameStatus::MustDisambiguate);
                        tracing::debug!(%cui, name, "tightened automatic name to disambiguated");
                    },
                    _ => {},
                }
            }
        }

        if !negative && self.config.devalue_linked_concepts {
            self.devalue_siblings(cui, &vectors, lr, store);
        }
        Ok(())
    }

    /// Push the embeddings of name-sharing sibling concepts away
    fn devalue_siblings(
        &self,
        cui: &Cui,
        vectors: &ContextVectors,
        lr: f32,
        store: &mut ConceptStore,
    ) {
        let mut other_cuis: Vec<Cui> = Vec::new();
        if let Some(cui_info) = store.cui_info(cui) {
            for name in &cui_info.names {
                if let Some(name_info) = store.name_info(name) {
                    for other in name_info.cuis() {
                        if other != cui && !other_cuis.contains(other) {
                            other_cuis.push(other.clone());
                        }
                    }
                }
            }
        }

        for other in &other_cuis {
            if let Some(info) = store.cui_info_mut(other) {
                match &mut info.context_vectors {
                    Some(stored) if !stored.is_empty() => {
                        update_context_vectors(stored, vectors, lr, true);
                    },
                    _ => {
                        info.context_vectors = Some(vectors.clone());
                    },
                }
            }
        }
        tracing::debug!(%cui, devalued = other_cuis.len(), "devalued sibling concepts");
    }

    /// Treat random unrelated context as a negative example for a concept
    pub fn train_using_negative_sampling(
        &self,
        cui: &Cui,
        store: &mut ConceptStore,
        vocab: &mut Vocab,
    ) -> Result<()> {
        let mut vectors = ContextVectors::new();
        for (label, &size) in &self.config.context_vector_sizes {
            // size * 2 would match the window width, but that is already
            // too many negative examples
            let indices =
                vocab.negative_samples(size, self.config.negative_ignore_punct_and_num);
            let values = vocab.vectors_for(&indices);
            if !values.is_empty() {
                vectors.insert(label.clone(), mean_vectors(&values));
            }
            tracing::debug!(%cui, words = indices.len(), "drew negative words");
        }

        let Some(count_train) = store.cui_info(cui).map(|info| info.count_train) else {
            tracing::warn!(%cui, "negative sampling for a concept missing from the store");
            return Ok(());
        };
        let lr = learning_rate(&self.config.optimizer, count_train)?;
        if let Some(cui_info) = store.cui_info_mut(cui) {
            match &mut cui_info.context_vectors {
                Some(stored) if !stored.is_empty() => {
                    update_context_vectors(stored, &vectors, lr, true);
                },
                _ => {
                    cui_info.context_vectors = Some(vectors);
                },
            }
        }
        Ok(())
    }
}

/// Learning rate for a concept given its training count
pub fn learning_rate(optimizer: &OptimizerConfig, count_train: u64) -> Result<f32> {
    match optimizer.kind.as_str() {
        "standard" => Ok(optimizer.lr),
        "linear" => Ok((optimizer.base_lr / (count_train + 1) as f32).max(optimizer.min_lr)),
        other => Err(MedLinkError::Config {
            message: format!("optimizer not implemented: {other}"),
        }),
    }
}

/// Weighted per-window cosine similarity between two vector sets
///
/// Window labels present in only one of the sets are skipped, not
/// treated as zero.
pub fn weighted_similarity(
    stored: &ContextVectors,
    other: &ContextVectors,
    weights: &IndexMap<String, f32>,
) -> f32 {
    let mut similarity = 0.0;
    for (label, &weight) in weights {
        let (Some(v1), Some(v2)) = (stored.get(label), other.get(label)) else {
            continue;
        };
        similarity += weight * cosine(v1, v2);
    }
    similarity
}

/// Blend stored context vectors toward (positive) or away from (negative)
/// freshly observed ones
pub fn update_context_vectors(
    to_update: &mut ContextVectors,
    new_vectors: &ContextVectors,
    lr: f32,
    negative: bool,
) {
    for (label, vector) in new_vectors {
        match to_update.get_mut(label) {
            Some(current) => {
                let similarity = cosine(current, vector);
                let b = if negative {
                    similarity.max(0.0) * lr
                } else {
                    (1.0 - similarity.max(0.0)) * lr
                };
                for (c, v) in current.iter_mut().zip(vector) {
                    *c = if negative {
                        *c * (1.0 - b) - v * b
                    } else {
                        *c * (1.0 - b) + v * b
                    };
                }
                tracing::debug!(%label, similarity, negative, lr, b, "updated context vector");
            },
            None => {
                let seeded = if negative {
                    vector.iter().map(|v| -v).collect()
                } else {
                    vector.clone()
                };
                to_update.insert(label.clone(), seeded);
                tracing::debug!(%label, negative, "added new context vector");
            },
        }
    }
}

/// Running mean of training-time similarities
pub fn updated_average_confidence(current: f32, count_train: u64, new_similarity: f32) -> f32 {
    (current * count_train as f32 + new_similarity) / (count_train + 1) as f32
}

/// Cosine similarity; zero-magnitude vectors compare as 0
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn mean_vectors(values: &[Vec<f32>]) -> Vec<f32> {
    let mut mean = vec![0.0; values[0].len()];
    for value in values {
        for (m, v) in mean.iter_mut().zip(value) {
            *m += v;
        }
    }
    let n = values.len() as f32;
    for m in &mut mean {
        *m /= n;
    }
    mean
}
