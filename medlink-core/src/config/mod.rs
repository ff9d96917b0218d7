//! Configuration for the medlink pipeline
//!
//! Mirrors the pipeline's component split: general settings, the name
//! matcher (NER), and the context-based linker. All types round-trip
//! through serde so configs can be stored alongside a model.

use std::collections::HashSet;
use std::fs;

use indexmap::IndexMap;

use crate::core::{Cui, Result};

/// Configuration for the medlink pipeline
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Config {
    /// General settings shared by all components
    #[serde(default)]
    pub general: GeneralConfig,

    /// Name matcher (dictionary NER) settings
    #[serde(default)]
    pub ner: NerConfig,

    /// Context-based linking settings
    #[serde(default)]
    pub linking: LinkingConfig,
}

impl Config {
    /// Load a config from a JSON file
    pub fn from_json_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Serialize the config to a JSON string
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// General settings shared by all components
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GeneralConfig {
    /// Separator used to join the tokens of a multi-token name.
    /// Once a concept store is built this should never change.
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Name of the registered tokenizer used to produce documents
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            tokenizer: default_tokenizer(),
        }
    }
}

fn default_separator() -> String {
    "~".to_string()
}

fn default_tokenizer() -> String {
    "regex".to_string()
}

/// Name matcher (dictionary NER) settings
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NerConfig {
    /// Do not detect names shorter than this (in characters)
    #[serde(default = "default_min_name_len")]
    pub min_name_len: usize,

    /// How many skippable tokens (whitespace, punctuation) are tolerated
    /// inside a matched multi-token name
    #[serde(default = "default_max_skip_tokens")]
    pub max_skip_tokens: usize,

    /// Check uppercase to distinguish uppercase and lowercase names that
    /// have a different meaning (e.g. "WHO" vs "who")
    #[serde(default)]
    pub check_upper_case_names: bool,

    /// Any matched name shorter than this must appear uppercase in the
    /// text to be considered
    #[serde(default = "default_upper_case_limit_len")]
    pub upper_case_limit_len: usize,
}

impl Default for NerConfig {
    fn default() -> Self {
        Self {
            min_name_len: default_min_name_len(),
            max_skip_tokens: default_max_skip_tokens(),
            check_upper_case_names: false,
            upper_case_limit_len: default_upper_case_limit_len(),
        }
    }
}

fn default_min_name_len() -> usize {
    3
}

fn default_max_skip_tokens() -> usize {
    2
}

fn default_upper_case_limit_len() -> usize {
    4
}

/// Learning-rate policy for context-vector updates
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OptimizerConfig {
    /// Policy kind: "standard" (constant) or "linear" (annealed).
    /// Any other value is a configuration error at the point of use.
    #[serde(default = "default_optimizer_kind")]
    pub kind: String,

    /// Constant learning rate for the "standard" policy
    #[serde(default = "default_lr")]
    pub lr: f32,

    /// Base learning rate for the "linear" policy
    #[serde(default = "default_lr")]
    pub base_lr: f32,

    /// Learning-rate floor for the "linear" policy
    #[serde(default = "default_min_lr")]
    pub min_lr: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            kind: default_optimizer_kind(),
            lr: default_lr(),
            base_lr: default_lr(),
            min_lr: default_min_lr(),
        }
    }
}

fn default_optimizer_kind() -> String {
    "linear".to_string()
}

fn default_lr() -> f32 {
    1.0
}

fn default_min_lr() -> f32 {
    0.000_05
}

/// Concept allow/deny filters applied during linking
///
/// When neither set holds anything, all CUIs are accepted. A non-empty
/// inclusion set accepts only its members; the exclusion set always
/// rejects its members.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct LinkingFilters {
    /// Inclusion set; empty means allow-all
    #[serde(default)]
    pub cuis: HashSet<Cui>,

    /// Exclusion set
    #[serde(default)]
    pub cuis_exclude: HashSet<Cui>,
}

impl LinkingFilters {
    /// Whether a CUI passes the filters
    pub fn check(&self, cui: &Cui) -> bool {
        if self.cuis.contains(cui) || self.cuis.is_empty() {
            !self.cuis_exclude.contains(cui)
        } else {
            false
        }
    }
}

/// Context-based linking settings
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LinkingConfig {
    /// Learning-rate policy
    #[serde(default)]
    pub optimizer: OptimizerConfig,

    /// Context window sizes (token radius) per window label
    #[serde(default = "default_context_vector_sizes")]
    pub context_vector_sizes: IndexMap<String, usize>,

    /// Weight of each window label in the similarity score.
    /// Should add up to 1.
    #[serde(default = "default_context_vector_weights")]
    pub context_vector_weights: IndexMap<String, f32>,

    /// Concept filters
    #[serde(default)]
    pub filters: LinkingFilters,

    /// Whether the linker trains or infers on each document
    #[serde(default = "default_true")]
    pub train: bool,

    /// If below 1, during training the detected term is replaced with a
    /// random synonym of the concept with probability
    /// `1 - random_replacement_unsupervised`
    #[serde(default = "default_random_replacement")]
    pub random_replacement_unsupervised: f64,

    /// Names shorter than this are always disambiguated
    #[serde(default = "default_disamb_length_limit")]
    pub disamb_length_limit: usize,

    /// Apply the concept filters before disambiguation rather than after
    #[serde(default)]
    pub filter_before_disamb: bool,

    /// Concepts with fewer training examples than this are not used for
    /// similarity calculation and report a similarity of -1
    #[serde(default = "default_train_count_threshold")]
    pub train_count_threshold: u64,

    /// Calculate context similarity even for unambiguous direct links
    #[serde(default)]
    pub always_calculate_similarity: bool,

    /// Track a per-concept average confidence during training, enabling
    /// the "dynamic" threshold type
    #[serde(default)]
    pub calculate_dynamic_threshold: bool,

    /// Threshold type: "static" compares against `similarity_threshold`,
    /// "dynamic" against `average_confidence * similarity_threshold`.
    /// Any other value rejects every candidate.
    #[serde(default = "default_similarity_threshold_type")]
    pub similarity_threshold_type: String,

    /// Minimum similarity for a link to be accepted
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Probability of adding a negative-sampling update for each
    /// positive training example
    #[serde(default = "default_negative_probability")]
    pub negative_probability: f64,

    /// Skip punctuation and numbers when drawing negative samples
    #[serde(default = "default_true")]
    pub negative_ignore_punct_and_num: bool,

    /// If above 0, candidates whose detected name is their primary name
    /// get their similarity boosted by this factor
    #[serde(default = "default_prefer_primary_name")]
    pub prefer_primary_name: f32,

    /// If above 0, more frequently trained candidates get their
    /// similarity boosted by a multiple of this factor
    #[serde(default = "default_prefer_frequent_concepts")]
    pub prefer_frequent_concepts: f32,

    /// Treat each positive example as a negative one for the sibling
    /// concepts sharing a name with the linked concept
    #[serde(default)]
    pub devalue_linked_concepts: bool,

    /// Exclude the mention's own tokens when building context vectors
    #[serde(default)]
    pub context_ignore_center_tokens: bool,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            optimizer: OptimizerConfig::default(),
            context_vector_sizes: default_context_vector_sizes(),
            context_vector_weights: default_context_vector_weights(),
            filters: LinkingFilters::default(),
            train: true,
            random_replacement_unsupervised: default_random_replacement(),
            disamb_length_limit: default_disamb_length_limit(),
            filter_before_disamb: false,
            train_count_threshold: default_train_count_threshold(),
            always_calculate_similarity: false,
            calculate_dynamic_threshold: false,
            similarity_threshold_type: default_similarity_threshold_type(),
            similarity_threshold: default_similarity_threshold(),
            negative_probability: default_negative_probability(),
            negative_ignore_punct_and_num: true,
            prefer_primary_name: default_prefer_primary_name(),
            prefer_frequent_concepts: default_prefer_frequent_concepts(),
            devalue_linked_concepts: false,
            context_ignore_center_tokens: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_context_vector_sizes() -> IndexMap<String, usize> {
    IndexMap::from([
        ("xlong".to_string(), 27),
        ("long".to_string(), 18),
        ("medium".to_string(), 9),
        ("short".to_string(), 3),
    ])
}

fn default_context_vector_weights() -> IndexMap<String, f32> {
    IndexMap::from([
        ("xlong".to_string(), 0.1),
        ("long".to_string(), 0.4),
        ("medium".to_string(), 0.4),
        ("short".to_string(), 0.1),
    ])
}

fn default_random_replacement() -> f64 {
    0.80
}

fn default_disamb_length_limit() -> usize {
    3
}

fn default_train_count_threshold() -> u64 {
    1
}

fn default_similarity_threshold_type() -> String {
    "static".to_string()
}

fn default_similarity_threshold() -> f32 {
    0.25
}

fn default_negative_probability() -> f64 {
    0.5
}

fn default_prefer_primary_name() -> f32 {
    0.35
}

fn default_prefer_frequent_concepts() -> f32 {
    0.35
}
