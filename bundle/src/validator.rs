//! Bundle validation.
//!
//! Validation never fails and never stops at the first defect: every
//! independent problem is reported so repair can fix them in one pass.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::debug;

use crate::config::BundleConfig;
use crate::fields;
use crate::registry::CategoryRegistry;
use crate::types::PredictionBundle;

/// Verdict for one candidate bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Whether the bundle conforms
    pub valid: bool,
    /// Ordered, distinct violations (empty when valid)
    pub violations: Vec<String>,
    /// Irregularities that do not fail validation
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn violation(&mut self, message: String) {
        if !self.violations.contains(&message) {
            self.violations.push(message);
        }
    }

    fn warning(&mut self, message: String) {
        if !self.warnings.contains(&message) {
            self.warnings.push(message);
        }
    }

    fn finish(mut self) -> Self {
        self.valid = self.violations.is_empty();
        self
    }
}

/// Checks candidate bundles against a registry.
pub struct BundleValidator<'a> {
    registry: &'a CategoryRegistry,
    config: BundleConfig,
}

impl<'a> BundleValidator<'a> {
    /// Create a validator with default configuration.
    pub fn new(registry: &'a CategoryRegistry) -> Self {
        Self::with_config(registry, BundleConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(registry: &'a CategoryRegistry, config: BundleConfig) -> Self {
        Self { registry, config }
    }

    /// Validate arbitrary JSON as a bundle.
    pub fn validate(&self, candidate: &Value) -> ValidationReport {
        let mut report = ValidationReport::default();

        let Some(root) = candidate.as_object() else {
            report.violation("bundle must be a JSON object".to_string());
            report.violation("missing summary object".to_string());
            report.violation("missing predictions array".to_string());
            return report.finish();
        };

        self.check_summary(root.get("summary"), &mut report);

        match root.get("predictions").and_then(Value::as_array) {
            Some(items) => {
                let expected = self.registry.expected_count();
                if items.len() != expected {
                    report.violation(format!(
                        "expected {} predictions, found {}",
                        expected,
                        items.len()
                    ));
                }

                let mut seen = HashSet::new();
                for (index, item) in items.iter().enumerate() {
                    self.check_item(index, item, &mut report);

                    if let Some(category) = fields::text(item.get("category")) {
                        if !seen.insert(category) {
                            report.warning(format!("duplicate category {}", category));
                        } else if !self.registry.contains(category) {
                            report.warning(format!("unknown category {}", category));
                        }
                    }
                }
            }
            None => report.violation("missing predictions array".to_string()),
        }

        let report = report.finish();
        debug!(
            valid = report.valid,
            violations = report.violations.len(),
            warnings = report.warnings.len(),
            "Bundle validated"
        );
        report
    }

    /// Validate an already-typed bundle.
    pub fn validate_bundle(&self, bundle: &PredictionBundle) -> ValidationReport {
        self.validate(&bundle.to_value())
    }

    fn check_summary(&self, summary: Option<&Value>, report: &mut ValidationReport) {
        let Some(summary) = summary.and_then(Value::as_object) else {
            report.violation("missing summary object".to_string());
            return;
        };

        if fields::text(summary.get("winner")).is_none() {
            report.violation("summary.winner must be a non-empty string".to_string());
        }
        if fields::unit(summary.get("home_win_prob")).is_none() {
            report.violation("summary.home_win_prob must be a number in [0, 1]".to_string());
        }
        if fields::unit(summary.get("confidence")).is_none() {
            report.violation("summary.confidence must be a number in [0, 1]".to_string());
        }
    }

    fn check_item(&self, index: usize, item: &Value, report: &mut ValidationReport) {
        let empty = Map::new();
        let fields_of = match item.as_object() {
            Some(object) => object,
            None => {
                report.violation(format!("predictions[{}] must be an object", index));
                &empty
            }
        };

        let category = fields::text(fields_of.get("category"));
        if category.is_none() {
            report.violation(format!("predictions[{}].category must be a non-empty string", index));
        }
        if fields::text(fields_of.get("subject")).is_none() {
            report.violation(format!("predictions[{}].subject must be a non-empty string", index));
        }

        let descriptor = category.and_then(|c| self.registry.get(c));
        let pred_type = fields::pred_type(fields_of.get("pred_type"));
        match pred_type {
            Some(tagged) => {
                // A registered category fixes the tag; the value is judged against it
                let pred_type = match descriptor {
                    Some(d) if d.pred_type != tagged => {
                        report.violation(format!(
                            "predictions[{}].pred_type must be {} for category {}",
                            index,
                            d.pred_type.as_str(),
                            d.id
                        ));
                        d.pred_type
                    }
                    _ => tagged,
                };
                if fields::prediction_value(fields_of.get("value"), pred_type, descriptor).is_none() {
                    report.violation(format!(
                        "predictions[{}].value must be a valid {} value",
                        index,
                        pred_type.as_str()
                    ));
                }
            }
            None => {
                report.violation(format!(
                    "predictions[{}].pred_type must be one of binary, numeric, enumerated",
                    index
                ));
                if fields_of.get("value").map_or(true, Value::is_null) {
                    report.violation(format!("predictions[{}].value must be defined", index));
                }
            }
        }

        if fields::unit(fields_of.get("confidence")).is_none() {
            report.violation(format!("predictions[{}].confidence must be a number in [0, 1]", index));
        }
        if fields::stake(fields_of.get("stake"), self.config.max_stake).is_none() {
            report.violation(format!(
                "predictions[{}].stake must be a number in [0, {}]",
                index, self.config.max_stake
            ));
        }
        if fields::odds(fields_of.get("odds")).is_none() {
            report.violation(format!("predictions[{}].odds must be defined", index));
        }
        if fields::rationale(fields_of.get("rationale")).is_none() {
            report.violation(format!("predictions[{}].rationale must be an array of strings", index));
        }
    }
}
