//! Bundle repair.
//!
//! Turns any candidate into a bundle that passes validation, in three steps:
//!
//! 1. **Count correction**: append stubs for missing registry categories, or
//!    handle overflow per [`OverflowPolicy`]
//! 2. **Field coercion**: fill absent or invalid fields with neutral defaults
//! 3. **Summary correction**: synthesize or complete the summary
//!
//! Valid items are kept as they are, so repairing a valid bundle is a no-op.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::{BundleConfig, OverflowPolicy};
use crate::fields;
use crate::registry::{default_value_for, CategoryDescriptor, CategoryRegistry};
use crate::types::*;
use crate::validator::ValidationReport;

const ITEM_FIELDS: [&str; 8] = [
    "category",
    "subject",
    "pred_type",
    "value",
    "confidence",
    "stake",
    "odds",
    "rationale",
];

const BUNDLE_FIELDS: [&str; 4] = ["source_id", "question_id", "summary", "predictions"];

/// Error types for repair.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    /// Oversized bundle under the reject policy
    #[error("Bundle has {found} predictions, registry allows {expected}")]
    Overflow { found: usize, expected: usize },
}

/// What repair changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepairReport {
    /// Categories of appended stub items, in order
    pub appended: Vec<String>,
    /// Items dropped by truncation
    pub truncated: usize,
    /// Individual fields replaced with defaults
    pub coerced_fields: usize,
    /// Whether the summary was synthesized from scratch
    pub summary_synthesized: bool,
}

impl RepairReport {
    /// Whether repair changed nothing.
    pub fn is_noop(&self) -> bool {
        self.appended.is_empty()
            && self.truncated == 0
            && self.coerced_fields == 0
            && !self.summary_synthesized
    }
}

/// Output of a successful repair.
#[derive(Debug, Clone, PartialEq)]
pub struct Repaired {
    /// Conforming bundle
    pub bundle: PredictionBundle,
    /// Changes made
    pub report: RepairReport,
}

/// Completes or truncates bundles against a registry.
pub struct BundleRepairer<'a> {
    registry: &'a CategoryRegistry,
    config: BundleConfig,
}

impl<'a> BundleRepairer<'a> {
    /// Create a repairer with default configuration.
    pub fn new(registry: &'a CategoryRegistry) -> Self {
        Self::with_config(registry, BundleConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(registry: &'a CategoryRegistry, config: BundleConfig) -> Self {
        Self { registry, config }
    }

    /// Repair a candidate given its validation report.
    pub fn repair(&self, candidate: &Value, report: &ValidationReport) -> Result<Repaired, RepairError> {
        debug!(
            violations = report.violations.len(),
            "Repairing bundle"
        );

        let empty = Map::new();
        let root = candidate.as_object().unwrap_or(&empty);
        let mut changes = RepairReport::default();

        let mut raw_items: Vec<Value> = root
            .get("predictions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        // Count correction
        let expected = self.registry.expected_count();
        let mut stubs: Vec<&CategoryDescriptor> = Vec::new();

        if raw_items.len() > expected {
            match self.config.overflow {
                OverflowPolicy::Truncate => {
                    changes.truncated = raw_items.len() - expected;
                    warn!(
                        found = raw_items.len(),
                        expected = expected,
                        dropped = changes.truncated,
                        "Truncating oversized bundle"
                    );
                    raw_items.truncate(expected);
                }
                OverflowPolicy::Reject => {
                    return Err(RepairError::Overflow {
                        found: raw_items.len(),
                        expected,
                    });
                }
            }
        } else if raw_items.len() < expected {
            let needed = expected - raw_items.len();
            let present: HashSet<&str> = raw_items
                .iter()
                .filter_map(|item| fields::text(item.get("category")))
                .collect();

            // At least `needed` categories are always missing: `present` covers
            // at most as many registry ids as there are items.
            stubs.extend(self.registry.missing(present).into_iter().take(needed));
        }

        // Field coercion
        let mut predictions: Vec<PredictionItem> = raw_items
            .iter()
            .map(|item| self.coerce_item(item, &mut changes.coerced_fields))
            .collect();

        for descriptor in stubs {
            changes.appended.push(descriptor.id.clone());
            predictions.push(stub_item(descriptor));
        }

        // Summary correction
        let summary = match root.get("summary").and_then(Value::as_object) {
            Some(summary) => coerce_summary(summary, &mut changes.coerced_fields),
            None => {
                changes.summary_synthesized = true;
                Summary::neutral()
            }
        };

        let extra: Map<String, Value> = root
            .iter()
            .filter(|(key, _)| !BUNDLE_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let bundle = PredictionBundle {
            source_id: root
                .get("source_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            question_id: root
                .get("question_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            summary,
            predictions,
            extra,
        };

        if !changes.is_noop() {
            info!(
                source_id = %bundle.source_id,
                appended = changes.appended.len(),
                truncated = changes.truncated,
                coerced_fields = changes.coerced_fields,
                summary_synthesized = changes.summary_synthesized,
                "Bundle repaired"
            );
        }

        Ok(Repaired {
            bundle,
            report: changes,
        })
    }

    /// Rebuild one item, keeping every field that is already acceptable.
    fn coerce_item(&self, raw: &Value, coerced: &mut usize) -> PredictionItem {
        let empty = Map::new();
        let object = raw.as_object().unwrap_or(&empty);

        let mut fill = |present: bool| {
            if !present {
                *coerced += 1;
            }
        };

        let category = fields::text(object.get("category"));
        fill(category.is_some());
        let category = category.unwrap_or(UNCATEGORIZED).to_string();
        let descriptor = self.registry.get(&category);

        let subject = fields::text(object.get("subject"));
        fill(subject.is_some());
        let subject = subject
            .map(str::to_string)
            .or_else(|| descriptor.map(|d| d.subject.clone()))
            .unwrap_or_else(|| UNSPECIFIED_SUBJECT.to_string());

        let pred_type = fields::registered_pred_type(object.get("pred_type"), descriptor);
        fill(pred_type.is_some());
        let pred_type = pred_type
            .or_else(|| descriptor.map(|d| d.pred_type))
            .unwrap_or_default();

        let value = fields::prediction_value(object.get("value"), pred_type, descriptor);
        fill(value.is_some());
        let value = value.unwrap_or_else(|| default_value_for(pred_type, descriptor));

        let confidence = fields::unit(object.get("confidence"));
        fill(confidence.is_some());
        let confidence = confidence.unwrap_or(DEFAULT_CONFIDENCE);

        let stake = fields::stake(object.get("stake"), self.config.max_stake);
        fill(stake.is_some());
        let stake = stake.unwrap_or_else(|| {
            // Over-cap stakes are clamped rather than zeroed
            match object.get("stake").and_then(Value::as_f64) {
                Some(s) if s.is_finite() && s > self.config.max_stake => self.config.max_stake,
                _ => 0.0,
            }
        });

        let odds = fields::odds(object.get("odds")).cloned();
        fill(odds.is_some());
        let odds = odds.unwrap_or_else(neutral_odds);

        let rationale = fields::rationale(object.get("rationale"));
        fill(rationale.is_some());
        let rationale = rationale.unwrap_or_default();

        let extra = object
            .iter()
            .filter(|(key, _)| !ITEM_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        PredictionItem {
            category,
            subject,
            pred_type,
            value,
            confidence,
            stake,
            odds,
            rationale,
            extra,
        }
    }
}

/// Neutral item for a registry category.
pub fn stub_item(descriptor: &CategoryDescriptor) -> PredictionItem {
    PredictionItem {
        category: descriptor.id.clone(),
        subject: descriptor.subject.clone(),
        pred_type: descriptor.pred_type,
        value: descriptor.default_value(),
        confidence: DEFAULT_CONFIDENCE,
        stake: 0.0,
        odds: neutral_odds(),
        rationale: vec![],
        extra: Map::new(),
    }
}

fn coerce_summary(raw: &Map<String, Value>, coerced: &mut usize) -> Summary {
    let neutral = Summary::neutral();

    let winner = fields::text(raw.get("winner")).map(str::to_string);
    let home_win_prob = fields::unit(raw.get("home_win_prob"));
    let confidence = fields::unit(raw.get("confidence"));

    *coerced += [winner.is_none(), home_win_prob.is_none(), confidence.is_none()]
        .iter()
        .filter(|missing| **missing)
        .count();

    Summary {
        winner: winner.unwrap_or(neutral.winner),
        home_win_prob: home_win_prob.unwrap_or(neutral.home_win_prob),
        confidence: confidence.unwrap_or(neutral.confidence),
    }
}
