//! Configuration for the consensus council.

use serde::{Deserialize, Serialize};

pub use bundle::{BundleConfig, OverflowPolicy};

/// Configuration for every council component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouncilConfig {
    /// Bundle validation and repair
    pub bundle: BundleConfig,
    /// Credibility weights
    pub weight: WeightConfig,
    /// Consensus aggregation
    pub aggregator: AggregatorConfig,
    /// Council selection
    pub selection: SelectionConfig,
    /// Submission rounds
    pub round: RoundConfig,
    /// Performance tracking
    pub performance: PerformanceConfig,
}

impl CouncilConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Weight calculator configuration.
///
/// Coefficients need not sum to 1; they are renormalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    /// Coefficient for overall accuracy
    pub accuracy: f64,
    /// Coefficient for recent-performance trend
    pub trend: f64,
    /// Coefficient for stated confidence
    pub confidence: f64,
    /// Coefficient for specialization match
    pub specialization: f64,
    /// Weight given to sources with no history
    pub neutral_weight: f64,
    /// Lower bound on any computed weight
    pub min_weight: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            accuracy: 0.4,
            trend: 0.3,
            confidence: 0.2,
            specialization: 0.1,
            neutral_weight: 0.5,
            min_weight: 0.01,
        }
    }
}

/// How a vote's contribution to its option is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteWeighting {
    /// weight × confidence
    #[default]
    WeightTimesConfidence,
    /// weight alone
    WeightOnly,
}

/// Consensus aggregator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Vote contribution rule
    pub weighting: VoteWeighting,
    /// Minimum winning share for "strong"
    pub strong_threshold: f64,
    /// Minimum winning share for "moderate"
    pub moderate_threshold: f64,
    /// Minimum winning share for "weak"; below is "divided"
    pub weak_threshold: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            weighting: VoteWeighting::WeightTimesConfidence,
            strong_threshold: 0.75,
            moderate_threshold: 0.55,
            weak_threshold: 0.40,
        }
    }
}

/// How council voting weights are assigned by rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightScheme {
    /// weight ∝ (n - rank + 1)
    #[default]
    RankLinear,
    /// weight ∝ composite score
    ScoreProportional,
}

/// Council selection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Council size N
    pub council_size: usize,
    /// Composite coefficient for accuracy
    pub accuracy: f64,
    /// Composite coefficient for calibration (1 - calibration error)
    pub calibration: f64,
    /// Composite coefficient for specialization coverage
    pub coverage: f64,
    /// Voting weight assignment
    pub weight_scheme: WeightScheme,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            council_size: 5,
            accuracy: 0.5,
            calibration: 0.3,
            coverage: 0.2,
            weight_scheme: WeightScheme::RankLinear,
        }
    }
}

/// Submission round configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundConfig {
    /// Repair malformed bundles instead of rejecting them
    pub auto_repair: bool,
    /// With a council set, accept votes from council members only
    pub members_only: bool,
    /// Submission window (seconds)
    pub deadline_secs: u64,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            auto_repair: true,
            members_only: true,
            deadline_secs: 3600, // 1 hour
        }
    }
}

/// Performance tracker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Resolved outcomes kept per source (oldest evicted first)
    pub window: usize,
    /// Per-step recency decay for the trend (0.0 - 1.0)
    pub decay: f64,
    /// Confidence bins for calibration error
    pub calibration_bins: usize,
    /// Outcomes needed before calibration error is measured
    pub min_calibration_samples: usize,
    /// Calibration error assumed below that threshold
    pub default_calibration_error: f64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            window: 500,
            decay: 0.9,
            calibration_bins: 10,
            min_calibration_samples: 10,
            default_calibration_error: 0.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CouncilConfig::default();
        assert_eq!(config.selection.council_size, 5);
        assert_eq!(config.weight.accuracy, 0.4);
        assert_eq!(config.aggregator.strong_threshold, 0.75);
        assert!(config.round.auto_repair);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = CouncilConfig::default();
        config.bundle.overflow = OverflowPolicy::Reject;
        config.selection.weight_scheme = WeightScheme::ScoreProportional;

        let yaml = config.to_yaml().unwrap();
        let parsed = CouncilConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let parsed = CouncilConfig::from_yaml("selection:\n  council_size: 9\n").unwrap();
        assert_eq!(parsed.selection.council_size, 9);
        assert_eq!(parsed.selection.accuracy, 0.5);
        assert_eq!(parsed.weight, WeightConfig::default());
    }
}
