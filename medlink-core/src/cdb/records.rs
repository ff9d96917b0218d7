//! Per-concept, per-name, and per-type records stored in the concept store

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::core::{Cui, SemanticTypeId};

/// Status of a (name, concept) pair, controlling disambiguation
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NameStatus {
    /// Automatically added association ("A")
    Automatic,
    /// Primary name of the concept, linked directly ("P")
    Primary,
    /// Primary name that must still be disambiguated ("PD")
    PrimaryWithDisambiguation,
    /// Ambiguous association that must always be disambiguated ("N")
    MustDisambiguate,
}

impl NameStatus {
    /// Whether this is one of the primary tags
    pub fn is_primary(&self) -> bool {
        matches!(
            self,
            NameStatus::Primary | NameStatus::PrimaryWithDisambiguation
        )
    }

    /// Whether this tag forces disambiguation even for a lone candidate
    pub fn requires_disambiguation(&self) -> bool {
        matches!(
            self,
            NameStatus::MustDisambiguate | NameStatus::PrimaryWithDisambiguation
        )
    }
}

/// A normalized name prepared for ingestion into the concept store
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PreparedName {
    /// Lower-cased tokens making up the name
    pub tokens: Vec<String>,
    /// Cumulative sub-token strings ("kidney", "kidney~failure", ...)
    pub snames: HashSet<String>,
    /// The name as it appeared in the source ontology
    pub raw_name: String,
    /// Whether the name was registered as uppercase-only
    pub is_upper: bool,
}

/// Record kept per concept identifier
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CuiInfo {
    /// The concept identifier
    pub cui: Cui,
    /// Canonical display name; empty until a primary name is registered
    pub preferred_name: String,
    /// Normalized names that can refer to this concept
    pub names: HashSet<String>,
    /// Sub-token strings derived from the names
    pub subnames: HashSet<String>,
    /// Semantic-category identifiers
    pub type_ids: HashSet<SemanticTypeId>,
    /// Long-form description; populated only on full builds
    pub description: Option<String>,
    /// Raw source names; populated only on full builds
    pub original_names: Option<HashSet<String>>,
    /// Other ontologies the concept appears in; populated only on full builds
    pub in_other_ontology: Option<HashSet<String>>,
    /// Number of positive training updates applied
    pub count_train: u64,
    /// Learnt context embedding per window label; None until first trained
    pub context_vectors: Option<IndexMap<String, Vec<f32>>>,
    /// Running average of training-time similarities, for dynamic thresholding
    pub average_confidence: f32,
}

impl CuiInfo {
    /// Create an empty record for a concept
    pub fn new(cui: Cui, type_ids: HashSet<SemanticTypeId>) -> Self {
        Self {
            cui,
            preferred_name: String::new(),
            names: HashSet::new(),
            subnames: HashSet::new(),
            type_ids,
            description: None,
            original_names: None,
            in_other_ontology: None,
            count_train: 0,
            context_vectors: None,
            average_confidence: 0.0,
        }
    }

    /// Drop everything learnt during training
    pub fn reset_training(&mut self) {
        self.context_vectors = None;
        self.count_train = 0;
        self.average_confidence = 0.0;
    }

    /// Whether the concept holds any trained context vectors
    pub fn has_context_vectors(&self) -> bool {
        self.context_vectors
            .as_ref()
            .is_some_and(|vectors| !vectors.is_empty())
    }
}

/// Record kept per distinct normalized name
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NameInfo {
    /// The normalized name
    pub name: String,
    /// Status tag per concept this name can link to
    pub per_cui_status: IndexMap<Cui, NameStatus>,
    /// Whether the name was registered as uppercase-only
    pub is_upper: bool,
    /// Number of times the name participated in a positive training update
    pub count_train: u64,
}

impl NameInfo {
    /// Create an empty record for a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            per_cui_status: IndexMap::new(),
            is_upper: false,
            count_train: 0,
        }
    }

    /// Status of the pair (name, cui); unseen pairs default to Automatic
    /// without inserting anything
    pub fn status_for(&self, cui: &Cui) -> NameStatus {
        self.per_cui_status
            .get(cui)
            .copied()
            .unwrap_or(NameStatus::Automatic)
    }

    /// The concepts this name can link to
    pub fn cuis(&self) -> impl Iterator<Item = &Cui> {
        self.per_cui_status.keys()
    }
}

/// Record kept per semantic category
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TypeInfo {
    /// The semantic-category identifier
    pub type_id: SemanticTypeId,
    /// Display name of the category
    pub name: String,
    /// Member concepts
    pub cuis: HashSet<Cui>,
}

impl TypeInfo {
    /// Create a record for a semantic category
    pub fn new(type_id: SemanticTypeId, name: impl Into<String>) -> Self {
        Self {
            type_id,
            name: name.into(),
            cuis: HashSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_sets() {
        assert!(NameStatus::Primary.is_primary());
        assert!(NameStatus::PrimaryWithDisambiguation.is_primary());
        assert!(!NameStatus::Automatic.is_primary());
        assert!(!NameStatus::MustDisambiguate.is_primary());

        assert!(NameStatus::MustDisambiguate.requires_disambiguation());
        assert!(NameStatus::PrimaryWithDisambiguation.requires_disambiguation());
        assert!(!NameStatus::Primary.requires_disambiguation());
        assert!(!NameStatus::Automatic.requires_disambiguation());
    }

    #[test]
    fn test_status_for_defaults_to_automatic() {
        let info = NameInfo::new("kidney~failure");
        assert_eq!(info.status_for(&Cui::from("C001")), NameStatus::Automatic);
        // The default lookup must not insert
        assert!(info.per_cui_status.is_empty());
    }

    #[test]
    fn test_reset_training() {
        let mut info = CuiInfo::new(Cui::from("C001"), HashSet::new());
        info.count_train = 7;
        info.average_confidence = 0.4;
        info.context_vectors = Some(IndexMap::from([(
            "short".to_string(),
            vec![1.0, 0.0],
        )]));

        info.reset_training();
        assert_eq!(info.count_train, 0);
        assert_eq!(info.average_confidence, 0.0);
        assert!(info.context_vectors.is_none());
        assert!(!info.has_context_vectors());
    }
}
