//! Category registry: the fixed list of categories a bundle must cover.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::types::{PredictionType, PredictionValue, UNKNOWN_CHOICE};

/// Error types for registry construction.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Registry has no categories
    #[error("Registry must contain at least one category")]
    Empty,

    /// Category id is blank
    #[error("Category at position {0} has a blank id")]
    BlankId(usize),

    /// Two descriptors share an id
    #[error("Duplicate category id: {0}")]
    DuplicateCategory(String),

    /// Enumerated category without options
    #[error("Enumerated category {0} has no allowed values")]
    MissingAllowedValues(String),
}

/// Describes one prediction category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDescriptor {
    /// Stable category id (e.g. `game.winner`)
    pub id: String,
    /// Human-readable subject
    pub subject: String,
    /// Required type tag
    pub pred_type: PredictionType,
    /// Allowed options for enumerated categories, first is the default
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
    /// Plausible placeholder for numeric categories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<f64>,
    /// Specialization tags used for source matching
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CategoryDescriptor {
    /// Binary (yes/no) category.
    pub fn binary(id: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            pred_type: PredictionType::Binary,
            allowed_values: vec![],
            placeholder: None,
            tags: vec![],
        }
    }

    /// Numeric category with a placeholder value.
    pub fn numeric(id: impl Into<String>, subject: impl Into<String>, placeholder: f64) -> Self {
        Self {
            pred_type: PredictionType::Numeric,
            placeholder: Some(placeholder),
            ..Self::binary(id, subject)
        }
    }

    /// Enumerated category.
    pub fn enumerated(id: impl Into<String>, subject: impl Into<String>, allowed: &[&str]) -> Self {
        Self {
            pred_type: PredictionType::Enumerated,
            allowed_values: allowed.iter().map(|v| v.to_string()).collect(),
            ..Self::binary(id, subject)
        }
    }

    /// Attach specialization tags.
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Neutral value for this category.
    pub fn default_value(&self) -> PredictionValue {
        default_value_for(self.pred_type, Some(self))
    }

    /// Whether `value` is acceptable for this category when tagged `pred_type`.
    ///
    /// The allowed set is only enforced when `pred_type` agrees with the
    /// registry's tag. Validation rejects disagreeing tags before asking.
    pub fn accepts(&self, pred_type: PredictionType, value: &PredictionValue) -> bool {
        if !value.matches(pred_type) {
            return false;
        }
        match value {
            PredictionValue::Choice(choice) if self.pred_type == PredictionType::Enumerated => {
                self.allowed_values.iter().any(|v| v == choice)
            }
            PredictionValue::Choice(choice) => !choice.is_empty(),
            PredictionValue::Numeric(n) => n.is_finite(),
            PredictionValue::Binary(_) => true,
        }
    }
}

/// Neutral value for a type tag, using the descriptor's defaults when it agrees
/// with the tag.
pub fn default_value_for(pred_type: PredictionType, descriptor: Option<&CategoryDescriptor>) -> PredictionValue {
    let descriptor = descriptor.filter(|d| d.pred_type == pred_type);
    match pred_type {
        PredictionType::Binary => PredictionValue::Binary(false),
        PredictionType::Numeric => {
            PredictionValue::Numeric(descriptor.and_then(|d| d.placeholder).unwrap_or(0.0))
        }
        PredictionType::Enumerated => PredictionValue::Choice(
            descriptor
                .and_then(|d| d.allowed_values.first().cloned())
                .unwrap_or_else(|| UNKNOWN_CHOICE.to_string()),
        ),
    }
}

/// Fixed, ordered list of category descriptors.
///
/// Defines what a complete bundle is: exactly one item per category, so the
/// required bundle size `K` is [`CategoryRegistry::expected_count`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<CategoryDescriptor>", into = "Vec<CategoryDescriptor>")]
pub struct CategoryRegistry {
    categories: Vec<CategoryDescriptor>,
    index: HashMap<String, usize>,
}

impl CategoryRegistry {
    /// Build a registry, rejecting blank, duplicate and option-less entries.
    pub fn new(categories: Vec<CategoryDescriptor>) -> Result<Self, RegistryError> {
        if categories.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut index = HashMap::with_capacity(categories.len());
        for (position, descriptor) in categories.iter().enumerate() {
            if descriptor.id.trim().is_empty() {
                return Err(RegistryError::BlankId(position));
            }
            if descriptor.pred_type == PredictionType::Enumerated
                && descriptor.allowed_values.is_empty()
            {
                return Err(RegistryError::MissingAllowedValues(descriptor.id.clone()));
            }
            if index.insert(descriptor.id.clone(), position).is_some() {
                return Err(RegistryError::DuplicateCategory(descriptor.id.clone()));
            }
        }

        Ok(Self { categories, index })
    }

    /// The standard 83-category game registry.
    pub fn standard() -> Self {
        let categories = crate::standard::categories();
        let index = categories
            .iter()
            .enumerate()
            .map(|(position, d)| (d.id.clone(), position))
            .collect();
        Self { categories, index }
    }

    /// Required bundle size.
    pub fn expected_count(&self) -> usize {
        self.categories.len()
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Always false for a constructed registry.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Look up a category.
    pub fn get(&self, id: &str) -> Option<&CategoryDescriptor> {
        self.index.get(id).map(|&position| &self.categories[position])
    }

    /// Registry position of a category.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Whether a category is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Categories in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &CategoryDescriptor> {
        self.categories.iter()
    }

    /// Category ids in registry order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|d| d.id.as_str())
    }

    /// Categories not covered by `present`, in registry order.
    pub fn missing<'a, I>(&self, present: I) -> Vec<&CategoryDescriptor>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let present: std::collections::HashSet<&str> = present.into_iter().collect();
        self.categories
            .iter()
            .filter(|d| !present.contains(d.id.as_str()))
            .collect()
    }

    /// Every specialization tag used by any category.
    pub fn tag_universe(&self) -> BTreeSet<String> {
        self.categories
            .iter()
            .flat_map(|d| d.tags.iter().cloned())
            .collect()
    }
}

impl TryFrom<Vec<CategoryDescriptor>> for CategoryRegistry {
    type Error = RegistryError;

    fn try_from(categories: Vec<CategoryDescriptor>) -> Result<Self, Self::Error> {
        Self::new(categories)
    }
}

impl From<CategoryRegistry> for Vec<CategoryDescriptor> {
    fn from(registry: CategoryRegistry) -> Self {
        registry.categories
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
