//! Council selection.
//!
//! Ranks the active source pool by a composite of accuracy, calibration and
//! specialization coverage, seats the top N and assigns voting weights that
//! sum to 1 and never increase with rank.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use tracing::{info, warn};

use crate::config::{SelectionConfig, WeightScheme};
use crate::types::{CouncilError, CouncilMember, CouncilSelection, Result, Source};

/// Accuracy and calibration error assumed for sources with no history.
const UNPROVEN: f64 = 0.5;

/// A source's standing in the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStanding {
    /// Source ID
    pub source_id: String,
    /// Accuracy used for ranking
    pub accuracy: f64,
    /// Calibration error used for ranking
    pub calibration_error: f64,
    /// Share of the tag universe the source covers
    pub coverage: f64,
    /// Composite score (0.0 - 1.0)
    pub score: f64,
}

/// Selects councils from a source pool.
#[derive(Debug, Clone)]
pub struct CouncilSelector {
    config: SelectionConfig,
}

impl CouncilSelector {
    /// Create with default configuration.
    pub fn new() -> Self {
        Self {
            config: SelectionConfig::default(),
        }
    }

    /// Create with custom configuration.
    pub fn with_config(config: SelectionConfig) -> Result<Self> {
        if config.council_size == 0 {
            return Err(CouncilError::ConfigError(
                "council_size must be at least 1".to_string(),
            ));
        }
        let coefficients = [config.accuracy, config.calibration, config.coverage];
        if coefficients.iter().any(|c| !c.is_finite() || *c < 0.0) || coefficients.iter().sum::<f64>() <= 0.0 {
            return Err(CouncilError::ConfigError(
                "selection coefficients must be non-negative and not all zero".to_string(),
            ));
        }
        Ok(Self { config })
    }

    /// Council size N.
    pub fn council_size(&self) -> usize {
        self.config.council_size
    }

    /// Score one source against a tag universe.
    pub fn standing(&self, source: &Source, universe: &BTreeSet<String>) -> SourceStanding {
        let (accuracy, calibration_error) = match source.history.filter(|h| h.samples > 0) {
            Some(h) => (unit(h.accuracy), unit(h.calibration_error)),
            None => (UNPROVEN, UNPROVEN),
        };
        let coverage = if universe.is_empty() {
            0.0
        } else {
            source.specializations.intersection(universe).count() as f64 / universe.len() as f64
        };

        let total = self.config.accuracy + self.config.calibration + self.config.coverage;
        let score = (self.config.accuracy * accuracy
            + self.config.calibration * (1.0 - calibration_error)
            + self.config.coverage * coverage)
            / total;

        SourceStanding {
            source_id: source.id.clone(),
            accuracy,
            calibration_error,
            coverage,
            score,
        }
    }

    /// Rank every active source, best first.
    ///
    /// Ties break on accuracy, then source id.
    pub fn rank(&self, pool: &[Source], universe: &BTreeSet<String>) -> Vec<SourceStanding> {
        let mut standings: Vec<SourceStanding> = pool
            .iter()
            .filter(|s| s.active)
            .map(|s| self.standing(s, universe))
            .collect();

        standings.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.accuracy.partial_cmp(&a.accuracy).unwrap_or(Ordering::Equal))
                .then_with(|| a.source_id.cmp(&b.source_id))
        });
        let mut seen = HashSet::new();
        standings.retain(|s| seen.insert(s.source_id.clone()));
        standings
    }

    /// Seat the top N active sources.
    pub fn select(&self, pool: &[Source], universe: &BTreeSet<String>) -> CouncilSelection {
        let requested = self.config.council_size;
        let mut standings = self.rank(pool, universe);
        standings.truncate(requested);

        let weights = self.voting_weights(&standings);
        let members: Vec<CouncilMember> = standings
            .into_iter()
            .zip(weights)
            .enumerate()
            .map(|(index, (standing, weight))| CouncilMember {
                source_id: standing.source_id,
                rank: index + 1,
                score: standing.score,
                weight,
            })
            .collect();

        let under_filled = members.len() < requested;
        if under_filled {
            warn!(seated = members.len(), requested, "Council under-filled");
        }
        info!(
            members = ?members.iter().map(|m| m.source_id.as_str()).collect::<Vec<_>>(),
            "Council selected"
        );

        CouncilSelection {
            members,
            requested,
            under_filled,
        }
    }

    fn voting_weights(&self, standings: &[SourceStanding]) -> Vec<f64> {
        if let WeightScheme::ScoreProportional = self.config.weight_scheme {
            let total: f64 = standings.iter().map(|s| s.score.max(0.0)).sum();
            if total > 0.0 {
                return standings.iter().map(|s| s.score.max(0.0) / total).collect();
            }
        }

        let n = standings.len();
        let total = (n * (n + 1) / 2) as f64;
        (0..n).map(|index| (n - index) as f64 / total).collect()
    }
}

impl Default for CouncilSelector {
    fn default() -> Self {
        Self::new()
    }
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        UNPROVEN
    }
}
