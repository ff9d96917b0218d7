//! The concept store (CDB)
//!
//! Owns every per-concept, per-name, and per-type record together with the
//! statistics the context model trains in place. All mutation operations
//! are best-effort: missing cross-references are logged and skipped so the
//! store stays usable after partial or lossy filtering.

pub mod records;

pub use records::{CuiInfo, NameInfo, NameStatus, PreparedName, TypeInfo};

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::core::{Cui, Result, SemanticTypeId};

/// Token-position weighting policy used when averaging context vectors
pub type WeightedAverage = fn(usize) -> f32;

/// Default weighting: quadratic decay with distance, floored at 0.1
pub fn default_weighted_average(step: usize) -> f32 {
    (1.0 - (step * step) as f32 * 0.0004).max(0.1)
}

fn default_weight_fn() -> WeightedAverage {
    default_weighted_average
}

/// A concept being ingested into the store
#[derive(Debug, Clone)]
pub struct ConceptEntry {
    /// The concept identifier
    pub cui: Cui,
    /// Prepared names keyed by their normalized form
    pub names: IndexMap<String, PreparedName>,
    /// Status to register for every (name, cui) pair
    pub name_status: NameStatus,
    /// Semantic-category identifiers
    pub type_ids: HashSet<SemanticTypeId>,
    /// Ontologies the concept appears in (kept only on full builds)
    pub ontologies: HashSet<String>,
    /// Concept description (kept only on full builds)
    pub description: String,
}

impl ConceptEntry {
    /// Create an entry with automatic status and no extras
    pub fn new(cui: Cui, names: IndexMap<String, PreparedName>) -> Self {
        Self {
            cui,
            names,
            name_status: NameStatus::Automatic,
            type_ids: HashSet::new(),
            ontologies: HashSet::new(),
            description: String::new(),
        }
    }

    /// Set the status registered for every name of this entry
    pub fn with_status(mut self, status: NameStatus) -> Self {
        self.name_status = status;
        self
    }

    /// Set the semantic-category identifiers
    pub fn with_type_ids(mut self, type_ids: HashSet<SemanticTypeId>) -> Self {
        self.type_ids = type_ids;
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// The concept database: concepts, names, types, and trained statistics
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ConceptStore {
    /// Separator joining the tokens of a normalized name
    pub separator: String,
    cui2info: IndexMap<Cui, CuiInfo>,
    name2info: IndexMap<String, NameInfo>,
    type_id2info: IndexMap<SemanticTypeId, TypeInfo>,
    token_counts: HashMap<String, u64>,
    subnames: HashSet<String>,
    /// Set by any mutation; cleared by callers that persist the store
    pub is_dirty: bool,
    has_changed_names: bool,
    #[serde(skip, default = "default_weight_fn")]
    weight_fn: WeightedAverage,
}

impl Default for ConceptStore {
    fn default() -> Self {
        Self::new("~")
    }
}

impl ConceptStore {
    /// Create an empty store using the given name separator
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
            cui2info: IndexMap::new(),
            name2info: IndexMap::new(),
            type_id2info: IndexMap::new(),
            token_counts: HashMap::new(),
            subnames: HashSet::new(),
            is_dirty: false,
            has_changed_names: false,
            weight_fn: default_weighted_average,
        }
    }

    /// Install a different token-position weighting policy
    pub fn set_weighted_average(&mut self, weight_fn: WeightedAverage) {
        self.weight_fn = weight_fn;
    }

    /// Weight for a token at the given distance from the mention
    pub fn weighted_average(&self, step: usize) -> f32 {
        (self.weight_fn)(step)
    }

    /// Record for a concept, if present
    pub fn cui_info(&self, cui: &Cui) -> Option<&CuiInfo> {
        self.cui2info.get(cui)
    }

    /// Mutable record for a concept, if present
    pub fn cui_info_mut(&mut self, cui: &Cui) -> Option<&mut CuiInfo> {
        self.cui2info.get_mut(cui)
    }

    /// Record for a name, if present
    pub fn name_info(&self, name: &str) -> Option<&NameInfo> {
        self.name2info.get(name)
    }

    /// Mutable record for a name, if present
    pub fn name_info_mut(&mut self, name: &str) -> Option<&mut NameInfo> {
        self.name2info.get_mut(name)
    }

    /// Record for a semantic category, if present
    pub fn type_info(&self, type_id: &SemanticTypeId) -> Option<&TypeInfo> {
        self.type_id2info.get(type_id)
    }

    /// All concepts in the store
    pub fn concepts(&self) -> impl Iterator<Item = &CuiInfo> {
        self.cui2info.values()
    }

    /// All names in the store
    pub fn names(&self) -> impl Iterator<Item = &NameInfo> {
        self.name2info.values()
    }

    /// Number of concepts
    pub fn concept_count(&self) -> usize {
        self.cui2info.len()
    }

    /// Number of distinct names
    pub fn name_count(&self) -> usize {
        self.name2info.len()
    }

    /// Whether a name is registered
    pub fn has_name(&self, name: &str) -> bool {
        self.name2info.contains_key(name)
    }

    /// Whether the registered names changed since the last matcher rebuild
    pub fn names_changed(&self) -> bool {
        self.has_changed_names
    }

    /// Clear the names-changed flag after a matcher rebuild
    pub fn acknowledge_names_changed(&mut self) {
        self.has_changed_names = false;
    }

    /// Global per-token frequency counts collected during ingestion
    pub fn token_counts(&self) -> &HashMap<String, u64> {
        &self.token_counts
    }

    /// Register semantic categories with their display names
    pub fn add_types<I>(&mut self, types: I)
    where
        I: IntoIterator<Item = (SemanticTypeId, String)>,
    {
        for (type_id, name) in types {
            self.type_id2info
                .insert(type_id.clone(), TypeInfo::new(type_id, name));
        }
    }

    /// Add names to a concept, creating the concept if needed
    ///
    /// Thin wrapper over [`ConceptStore::add_concept`] for callers that
    /// only carry names and a status.
    pub fn add_names(
        &mut self,
        cui: Cui,
        names: IndexMap<String, PreparedName>,
        name_status: NameStatus,
        full_build: bool,
    ) {
        self.add_concept(
            ConceptEntry::new(cui, names).with_status(name_status),
            full_build,
        );
    }

    /// Idempotent upsert of a concept and its names
    ///
    /// Repeat calls union `type_ids`, may set the preferred name (only if
    /// previously empty and the status is primary), and only overwrite an
    /// existing pair status when the new status is `Primary`.
    pub fn add_concept(&mut self, entry: ConceptEntry, full_build: bool) {
        if entry.names.is_empty() {
            tracing::warn!(
                cui = %entry.cui,
                "passed an empty names map, concept not added"
            );
            return;
        }

        let cui = entry.cui.clone();
        let cui_info = self
            .cui2info
            .entry(cui.clone())
            .and_modify(|info| info.type_ids.extend(entry.type_ids.iter().cloned()))
            .or_insert_with(|| CuiInfo::new(cui.clone(), entry.type_ids.clone()));

        // Add names and synonyms
        for (name, prepared) in &entry.names {
            cui_info.names.insert(name.clone());
            cui_info.subnames.extend(prepared.snames.iter().cloned());
        }
        let subnames = cui_info.subnames.clone();

        for (name, prepared) in &entry.names {
            let name_info = self
                .name2info
                .entry(name.clone())
                .or_insert_with(|| NameInfo::new(name.clone()));
            name_info.is_upper = prepared.is_upper;
            match name_info.per_cui_status.get(&cui).copied() {
                None => {
                    name_info.per_cui_status.insert(cui.clone(), entry.name_status);
                },
                // A primary registration overwrites whatever was there
                Some(_) if entry.name_status == NameStatus::Primary => {
                    name_info.per_cui_status.insert(cui.clone(), entry.name_status);
                },
                Some(_) => {},
            }

            for token in &prepared.tokens {
                *self.token_counts.entry(token.clone()).or_insert(0) += 1;
            }
        }
        self.subnames.extend(subnames);

        if entry.name_status == NameStatus::Primary {
            if let Some(cui_info) = self.cui2info.get_mut(&cui) {
                if cui_info.preferred_name.is_empty() {
                    if let Some(prepared) = entry.names.values().last() {
                        cui_info.preferred_name = prepared.raw_name.clone();
                    }
                }
            }
        }

        if full_build {
            self.add_full_build(&cui, &entry);
        }
        self.is_dirty = true;
    }

    fn add_full_build(&mut self, cui: &Cui, entry: &ConceptEntry) {
        let cui_info = match self.cui2info.get_mut(cui) {
            Some(info) => info,
            None => return,
        };
        let raw_names: HashSet<String> = entry
            .names
            .values()
            .map(|prepared| prepared.raw_name.clone())
            .collect();
        match &mut cui_info.original_names {
            None => {
                if !entry.ontologies.is_empty() {
                    cui_info.in_other_ontology = Some(entry.ontologies.clone());
                }
                cui_info.original_names = Some(raw_names);
            },
            Some(existing) => {
                if !entry.ontologies.is_empty() {
                    cui_info
                        .in_other_ontology
                        .get_or_insert_with(HashSet::new)
                        .extend(entry.ontologies.iter().cloned());
                }
                existing.extend(raw_names);
            },
        }
        if !entry.description.is_empty() {
            cui_info.description = Some(entry.description.clone());
        }

        for type_id in &entry.type_ids {
            let type_info = self
                .type_id2info
                .entry(type_id.clone())
                .or_insert_with(|| TypeInfo::new(type_id.clone(), "N/A"));
            type_info.cuis.insert(cui.clone());
        }
    }

    /// Remove name-to-concept associations
    ///
    /// The name will never again link to this concept. A name left with no
    /// concepts is dropped entirely; a name left with exactly one concept
    /// has that concept's status tightened (Automatic becomes
    /// MustDisambiguate, Primary becomes PrimaryWithDisambiguation).
    pub fn remove_names<'a, I>(&mut self, cui: &Cui, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for name in names {
            let remaining = match self.name2info.get_mut(name) {
                None => {
                    tracing::warn!(name, %cui, "asked to remove a name that is not registered");
                    continue;
                },
                Some(info) => {
                    info.per_cui_status.shift_remove(cui);
                    info.per_cui_status.len()
                },
            };
            if remaining == 0 {
                self.name2info.shift_remove(name);
            } else if remaining == 1 {
                if let Some(info) = self.name2info.get_mut(name) {
                    // A lone remaining concept always gets disambiguated
                    for status in info.per_cui_status.values_mut() {
                        *status = match *status {
                            NameStatus::Automatic => NameStatus::MustDisambiguate,
                            NameStatus::Primary => NameStatus::PrimaryWithDisambiguation,
                            other => other,
                        };
                    }
                }
            }
        }
        self.is_dirty = true;
        self.has_changed_names = true;
    }

    /// Keep only the concepts reachable from `cuis_to_keep` via shared names
    ///
    /// Two-hop closure: collect the names of the kept concepts, then keep
    /// every concept any of those names links to. CUIs absent from the
    /// store are logged and skipped, never fatal.
    pub fn filter_by_cui(&mut self, cuis_to_keep: &HashSet<Cui>) {
        let mut names_to_keep: HashSet<String> = HashSet::new();
        for cui in cuis_to_keep {
            match self.cui2info.get(cui) {
                None => {
                    tracing::warn!(
                        %cui,
                        "asked to keep a CUI that is not part of the existing store"
                    );
                },
                Some(info) => {
                    names_to_keep.extend(info.names.iter().cloned());
                },
            }
        }

        let mut all_cuis_to_keep: HashSet<Cui> = HashSet::new();
        for name in &names_to_keep {
            if let Some(info) = self.name2info.get(name) {
                all_cuis_to_keep.extend(info.cuis().cloned());
            }
        }

        self.cui2info.retain(|cui, _| all_cuis_to_keep.contains(cui));
        self.name2info.retain(|name, _| names_to_keep.contains(name));
        self.reset_subnames();
        self.is_dirty = true;
        self.has_changed_names = true;
    }

    /// Remove all training effort: context vectors, counts, confidences
    ///
    /// Names added during online learning are kept.
    pub fn reset_training(&mut self) {
        for cui_info in self.cui2info.values_mut() {
            cui_info.reset_training();
        }
        for name_info in self.name2info.values_mut() {
            name_info.count_train = 0;
        }
        self.subnames.clear();
        self.is_dirty = true;
    }

    fn reset_subnames(&mut self) {
        tracing::info!("resetting subname cache");
        self.subnames.clear();
        for info in self.cui2info.values() {
            self.subnames.extend(info.subnames.iter().cloned());
        }
        self.has_changed_names = false;
    }

    /// Whether any concept carries the given subname
    ///
    /// The cache is rebuilt lazily whenever the store has grown or names
    /// changed since the last rebuild.
    pub fn has_subname(&mut self, name: &str) -> bool {
        if self.has_changed_names || self.subnames.len() < self.name2info.len() {
            self.reset_subnames();
        }
        self.subnames.contains(name)
    }

    /// Display name for a concept
    ///
    /// The preferred name if set, otherwise the longest registered name
    /// (separators replaced with spaces, title-cased), otherwise the CUI
    /// itself.
    pub fn get_name(&self, cui: &Cui) -> String {
        let cui_info = match self.cui2info.get(cui) {
            Some(info) => info,
            None => return cui.to_string(),
        };
        if !cui_info.preferred_name.is_empty() {
            return cui_info.preferred_name.clone();
        }
        match cui_info.names.iter().max_by_key(|name| name.chars().count()) {
            Some(longest) => {
                let spaced = longest.replace(&self.separator, " ");
                title_case(&spaced)
            },
            None => cui.to_string(),
        }
    }

    /// Training counts per concept, omitting untrained ones
    pub fn cui_count_train(&self) -> IndexMap<Cui, u64> {
        self.cui2info
            .iter()
            .filter(|(_, info)| info.count_train > 0)
            .map(|(cui, info)| (cui.clone(), info.count_train))
            .collect()
    }

    /// Training counts per name, omitting untrained ones
    pub fn name_count_train(&self) -> IndexMap<String, u64> {
        self.name2info
            .iter()
            .filter(|(_, info)| info.count_train > 0)
            .map(|(name, info)| (name.clone(), info.count_train))
            .collect()
    }

    /// Serialize the store to a JSON string
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Load a store from a JSON string
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Normalize a raw name for ingestion
///
/// Splits the raw name into lower-cased alphanumeric tokens joined by the
/// separator, and derives the cumulative sub-token strings. Returns None
/// when no tokens survive normalization.
pub fn prepare_name(raw_name: &str, separator: &str) -> Option<(String, PreparedName)> {
    let tokens: Vec<String> = raw_name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_lowercase())
        .collect();
    if tokens.is_empty() {
        return None;
    }
    let name = tokens.join(separator);
    let mut snames = HashSet::new();
    let mut sname = String::new();
    for token in &tokens {
        if !sname.is_empty() {
            sname.push_str(separator);
        }
        sname.push_str(token);
        snames.insert(sname.clone());
    }
    let has_alpha = raw_name.chars().any(|c| c.is_alphabetic());
    let is_upper = has_alpha && raw_name == raw_name.to_uppercase();
    Some((
        name,
        PreparedName {
            tokens,
            snames,
            raw_name: raw_name.to_string(),
            is_upper,
        },
    ))
}

/// Normalize several raw names into an ingestion map
pub fn prepare_names<'a, I>(raw_names: I, separator: &str) -> IndexMap<String, PreparedName>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut names = IndexMap::new();
    for raw in raw_names {
        if let Some((name, prepared)) = prepare_name(raw, separator) {
            names.insert(name, prepared);
        }
    }
    names
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
