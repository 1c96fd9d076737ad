//! Credibility weights.
//!
//! A source's weight on a category blends its accuracy, recent trend, stated
//! confidence and how well its specializations match the category. Sources
//! with no track record get the neutral weight.

use std::collections::BTreeSet;
use tracing::trace;

use crate::config::WeightConfig;
use crate::types::{CouncilError, Result, SourceHistory};

/// Inputs to the weight blend, each expected in its natural range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightInputs {
    /// Accuracy (0.0 - 1.0)
    pub accuracy: f64,
    /// Trend (-1.0 - 1.0)
    pub trend: f64,
    /// Stated confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Specialization match (0.0 - 1.0)
    pub specialization: f64,
}

/// Computes credibility weights.
#[derive(Debug, Clone)]
pub struct WeightCalculator {
    config: WeightConfig,
    total: f64,
}

impl WeightCalculator {
    /// Create with default coefficients.
    pub fn new() -> Self {
        let config = WeightConfig::default();
        let total = config.accuracy + config.trend + config.confidence + config.specialization;
        Self { config, total }
    }

    /// Create with custom coefficients.
    pub fn with_config(config: WeightConfig) -> Result<Self> {
        let coefficients = [
            ("accuracy", config.accuracy),
            ("trend", config.trend),
            ("confidence", config.confidence),
            ("specialization", config.specialization),
        ];
        for (name, value) in coefficients {
            if !value.is_finite() || value < 0.0 {
                return Err(CouncilError::ConfigError(format!(
                    "weight coefficient {} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        let total: f64 = coefficients.iter().map(|(_, v)| v).sum();
        if total <= 0.0 {
            return Err(CouncilError::ConfigError(
                "weight coefficients must not all be zero".to_string(),
            ));
        }
        if !(config.min_weight > 0.0 && config.min_weight <= 1.0) {
            return Err(CouncilError::ConfigError(format!(
                "min_weight must be in (0, 1], got {}",
                config.min_weight
            )));
        }
        if !(config.neutral_weight >= config.min_weight && config.neutral_weight <= 1.0) {
            return Err(CouncilError::ConfigError(format!(
                "neutral_weight must be in [min_weight, 1], got {}",
                config.neutral_weight
            )));
        }

        Ok(Self { config, total })
    }

    /// Weight for a source voting on a category.
    ///
    /// `history` of `None` (or with no samples) yields the neutral weight.
    pub fn weight(&self, history: Option<&SourceHistory>, confidence: f64, specialization: f64) -> f64 {
        match history.filter(|h| h.samples > 0) {
            Some(h) => self.blend(WeightInputs {
                accuracy: h.accuracy,
                trend: h.trend,
                confidence,
                specialization,
            }),
            None => self.config.neutral_weight,
        }
    }

    /// Blend inputs into a weight in `[min_weight, 1]`.
    ///
    /// Out-of-range inputs are clamped, non-finite ones count as neutral.
    pub fn blend(&self, inputs: WeightInputs) -> f64 {
        let accuracy = unit(inputs.accuracy);
        let trend = unit((inputs.trend + 1.0) / 2.0);
        let confidence = unit(inputs.confidence);
        let specialization = unit(inputs.specialization);

        let raw = (self.config.accuracy * accuracy
            + self.config.trend * trend
            + self.config.confidence * confidence
            + self.config.specialization * specialization)
            / self.total;

        let weight = raw.clamp(self.config.min_weight, 1.0);
        trace!(accuracy, trend, confidence, specialization, weight, "Weight computed");
        weight
    }

    /// Neutral weight for sources with no track record.
    pub fn neutral(&self) -> f64 {
        self.config.neutral_weight
    }
}

impl Default for WeightCalculator {
    fn default() -> Self {
        Self::new()
    }
}

/// Share of a category's tags the source specializes in.
///
/// Untagged categories match nobody.
pub fn specialization_match(specializations: &BTreeSet<String>, category_tags: &[String]) -> f64 {
    if category_tags.is_empty() {
        return 0.0;
    }
    let matched = category_tags
        .iter()
        .filter(|tag| specializations.contains(tag.as_str()))
        .count();
    matched as f64 / category_tags.len() as f64
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn history(accuracy: f64, trend: f64) -> SourceHistory {
        SourceHistory::new(accuracy, trend, 0.1, 50)
    }

    #[test]
    fn test_no_history_is_neutral() {
        let calc = WeightCalculator::new();
        assert_eq!(calc.weight(None, 0.9, 1.0), 0.5);

        let unproven = SourceHistory::new(1.0, 1.0, 0.0, 0);
        assert_eq!(calc.weight(Some(&unproven), 0.9, 1.0), 0.5);
    }

    #[test]
    fn test_default_blend() {
        let calc = WeightCalculator::new();
        // 0.4*0.8 + 0.3*0.75 + 0.2*0.6 + 0.1*0.5
        let w = calc.weight(Some(&history(0.8, 0.5)), 0.6, 0.5);
        assert_relative_eq!(w, 0.715, epsilon = 1e-12);
    }

    #[test]
    fn test_perfect_and_worst() {
        let calc = WeightCalculator::new();
        assert_relative_eq!(calc.weight(Some(&history(1.0, 1.0)), 1.0, 1.0), 1.0);
        assert_relative_eq!(calc.weight(Some(&history(0.0, -1.0)), 0.0, 0.0), 0.01);
    }

    #[test]
    fn test_garbage_inputs_are_bounded() {
        let calc = WeightCalculator::new();
        let w = calc.weight(Some(&history(f64::NAN, 7.0)), -3.0, f64::INFINITY);
        assert!((0.01..=1.0).contains(&w));
    }

    #[test]
    fn test_accuracy_is_monotonic() {
        let calc = WeightCalculator::new();
        let mut last = 0.0;
        for step in 0..=10 {
            let w = calc.weight(Some(&history(step as f64 / 10.0, 0.0)), 0.7, 0.5);
            assert!(w >= last);
            last = w;
        }
    }

    #[test]
    fn test_coefficients_are_renormalized() {
        let config = WeightConfig {
            accuracy: 4.0,
            trend: 3.0,
            confidence: 2.0,
            specialization: 1.0,
            ..Default::default()
        };
        let scaled = WeightCalculator::with_config(config).unwrap();
        let default = WeightCalculator::new();
        let h = history(0.7, 0.2);
        assert_relative_eq!(scaled.weight(Some(&h), 0.6, 0.3), default.weight(Some(&h), 0.6, 0.3));
    }

    #[test]
    fn test_rejects_bad_config() {
        let negative = WeightConfig {
            trend: -0.1,
            ..Default::default()
        };
        assert!(WeightCalculator::with_config(negative).is_err());

        let zero = WeightConfig {
            accuracy: 0.0,
            trend: 0.0,
            confidence: 0.0,
            specialization: 0.0,
            ..Default::default()
        };
        assert!(WeightCalculator::with_config(zero).is_err());
    }

    #[test]
    fn test_specialization_match() {
        let tags: BTreeSet<String> = ["passing", "totals"].iter().map(|t| t.to_string()).collect();
        let category = vec!["passing".to_string(), "player_props".to_string()];
        assert_relative_eq!(specialization_match(&tags, &category), 0.5);
        assert_eq!(specialization_match(&tags, &[]), 0.0);
    }
}
