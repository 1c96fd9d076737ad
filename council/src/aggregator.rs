//! Consensus aggregation.
//!
//! Groups weighted votes by option and decides the winner, its share of the
//! weighted total, and how strong the agreement is. The result depends only
//! on the set of votes: input order is normalized before any arithmetic so
//! identical vote sets produce byte-identical records.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use bundle::CategoryRegistry;

use crate::config::{AggregatorConfig, VoteWeighting};
use crate::types::{
    ConsensusRecord, ConsensusStrength, CouncilError, NumericSummary, OptionTally, Result, Vote,
};

#[derive(Default)]
struct Tally {
    votes: usize,
    weighted: f64,
    weight_sum: f64,
    weighted_confidence: f64,
    confidence_sum: f64,
}

impl Tally {
    fn confidence(&self) -> f64 {
        if self.weight_sum > 0.0 {
            self.weighted_confidence / self.weight_sum
        } else if self.votes > 0 {
            self.confidence_sum / self.votes as f64
        } else {
            0.0
        }
    }
}

/// Aggregates votes into consensus records.
#[derive(Debug, Clone)]
pub struct ConsensusAggregator {
    config: AggregatorConfig,
}

impl ConsensusAggregator {
    /// Create with default thresholds.
    pub fn new() -> Self {
        Self {
            config: AggregatorConfig::default(),
        }
    }

    /// Create with custom thresholds.
    pub fn with_config(config: AggregatorConfig) -> Result<Self> {
        let ordered = 0.0 <= config.weak_threshold
            && config.weak_threshold <= config.moderate_threshold
            && config.moderate_threshold <= config.strong_threshold
            && config.strong_threshold <= 1.0;
        if !ordered {
            return Err(CouncilError::ConfigError(format!(
                "strength thresholds must satisfy 0 <= weak ({}) <= moderate ({}) <= strong ({}) <= 1",
                config.weak_threshold, config.moderate_threshold, config.strong_threshold
            )));
        }
        Ok(Self { config })
    }

    /// Aggregate one category's votes.
    ///
    /// A source voting more than once counts once, with its first vote.
    pub fn aggregate(&self, question_id: &str, category: &str, votes: &[Vote]) -> ConsensusRecord {
        let votes = normalize(votes);
        if votes.is_empty() {
            return ConsensusRecord::empty(question_id, category);
        }

        let mut tallies: BTreeMap<String, Tally> = BTreeMap::new();
        for vote in &votes {
            let weight = sanitize_weight(vote.weight);
            let confidence = sanitize_confidence(vote.confidence);
            let contribution = match self.config.weighting {
                VoteWeighting::WeightTimesConfidence => weight * confidence,
                VoteWeighting::WeightOnly => weight,
            };

            let tally = tallies.entry(vote.option()).or_default();
            tally.votes += 1;
            tally.weighted += contribution;
            tally.weight_sum += weight;
            tally.weighted_confidence += weight * confidence;
            tally.confidence_sum += confidence;
        }

        let mut ranked: Vec<(String, Tally)> = tallies.into_iter().collect();
        ranked.sort_by(|(a_id, a), (b_id, b)| {
            b.weighted
                .partial_cmp(&a.weighted)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.votes.cmp(&a.votes))
                .then_with(|| a_id.cmp(b_id))
        });

        let total: f64 = ranked.iter().map(|(_, t)| t.weighted).sum();
        let (winner, top) = &ranked[0];
        let consensus_pct = if total > 0.0 {
            (top.weighted / total).clamp(0.0, 1.0)
        } else {
            top.votes as f64 / votes.len() as f64
        };
        let unanimous = ranked.len() == 1;
        let strength = self.classify(consensus_pct, unanimous);
        let confidence = top.confidence();
        let winner = winner.clone();

        let numeric = numeric_summary(&votes);
        let options = ranked
            .iter()
            .map(|(option, tally)| OptionTally {
                option: option.clone(),
                votes: tally.votes,
                weighted_total: tally.weighted,
                confidence: tally.confidence(),
            })
            .collect();

        debug!(
            question_id = %question_id,
            category = %category,
            winner = %winner,
            consensus_pct,
            strength = ?strength,
            votes = votes.len(),
            "Consensus aggregated"
        );

        ConsensusRecord {
            question_id: question_id.to_string(),
            category: category.to_string(),
            winner: Some(winner),
            consensus_pct,
            strength: Some(strength),
            confidence,
            vote_count: votes.len(),
            options,
            numeric,
        }
    }

    /// Aggregate every registry category, in registry order.
    ///
    /// Categories with no votes get an empty record.
    pub fn aggregate_question(
        &self,
        question_id: &str,
        registry: &CategoryRegistry,
        votes: &BTreeMap<String, Vec<Vote>>,
    ) -> Vec<ConsensusRecord> {
        registry
            .ids()
            .map(|category| match votes.get(category) {
                Some(category_votes) => self.aggregate(question_id, category, category_votes),
                None => ConsensusRecord::empty(question_id, category),
            })
            .collect()
    }

    /// Strength for a winning share.
    pub fn classify(&self, consensus_pct: f64, unanimous: bool) -> ConsensusStrength {
        if unanimous {
            ConsensusStrength::Unanimous
        } else if consensus_pct >= self.config.strong_threshold {
            ConsensusStrength::Strong
        } else if consensus_pct >= self.config.moderate_threshold {
            ConsensusStrength::Moderate
        } else if consensus_pct >= self.config.weak_threshold {
            ConsensusStrength::Weak
        } else {
            ConsensusStrength::Divided
        }
    }
}

impl Default for ConsensusAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Sort by source, keep each source's first vote.
fn normalize(votes: &[Vote]) -> Vec<&Vote> {
    let mut ordered: Vec<&Vote> = votes.iter().collect();
    ordered.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    let mut seen = HashSet::new();
    ordered.retain(|vote| seen.insert(vote.source_id.as_str()));
    ordered
}

fn sanitize_weight(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}

fn sanitize_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn numeric_summary(votes: &[&Vote]) -> Option<NumericSummary> {
    let values: Vec<(f64, f64)> = votes
        .iter()
        .map(|v| v.value.as_f64().filter(|n| n.is_finite()).map(|n| (n, sanitize_weight(v.weight))))
        .collect::<Option<_>>()?;
    if values.is_empty() {
        return None;
    }

    let weight_sum: f64 = values.iter().map(|(_, w)| w).sum();
    let mean = if weight_sum > 0.0 {
        values.iter().map(|(n, w)| n * w).sum::<f64>() / weight_sum
    } else {
        values.iter().map(|(n, _)| n).sum::<f64>() / values.len() as f64
    };
    let min = values.iter().map(|(n, _)| *n).fold(f64::INFINITY, f64::min);
    let max = values.iter().map(|(n, _)| *n).fold(f64::NEG_INFINITY, f64::max);

    Some(NumericSummary { mean, min, max })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bundle::PredictionValue;

    fn choice(source: &str, option: &str, confidence: f64, weight: f64) -> Vote {
        Vote::new(source, PredictionValue::Choice(option.into()), confidence, weight)
    }

    #[test]
    fn test_home_away_split() {
        // home: 0.8*0.8 + 0.6*0.7 = 1.06, away: 0.5*0.66 = 0.33
        let votes = vec![
            choice("s1", "home", 0.8, 0.8),
            choice("s2", "home", 0.7, 0.6),
            choice("s3", "away", 0.66, 0.5),
        ];

        let record = ConsensusAggregator::new().aggregate("game-1", "game.winner", &votes);
        assert_eq!(record.winner.as_deref(), Some("home"));
        assert_relative_eq!(record.consensus_pct, 1.06 / 1.39, epsilon = 1e-12);
        assert_eq!(record.strength, Some(ConsensusStrength::Strong));
        assert_eq!(record.vote_count, 3);
        assert_eq!(record.options[0].option, "home");
        assert_eq!(record.options[1].option, "away");
    }

    #[test]
    fn test_share_from_totals() {
        // home: 0.5*0.8 + 0.2*0.9 = 0.58, away: 0.3*0.6 = 0.18
        let votes = vec![
            choice("A", "home", 0.8, 0.5),
            choice("B", "away", 0.6, 0.3),
            choice("C", "home", 0.9, 0.2),
        ];
        let record = ConsensusAggregator::new().aggregate("game-1", "game.winner", &votes);
        assert_eq!(record.winner.as_deref(), Some("home"));
        assert_relative_eq!(record.options[0].weighted_total, 0.58, epsilon = 1e-12);
        assert_relative_eq!(record.options[1].weighted_total, 0.18, epsilon = 1e-12);
        assert_relative_eq!(record.consensus_pct, 0.58 / 0.76, epsilon = 1e-12);
        assert_relative_eq!(record.consensus_pct, 0.763, epsilon = 1e-3);
        assert_eq!(record.strength, Some(ConsensusStrength::Strong));
    }

    #[test]
    fn test_unanimous() {
        let votes = vec![choice("a", "away", 0.2, 0.1), choice("b", "away", 0.9, 0.9)];
        let record = ConsensusAggregator::new().aggregate("game-1", "game.winner", &votes);
        assert_eq!(record.strength, Some(ConsensusStrength::Unanimous));
        assert_relative_eq!(record.consensus_pct, 1.0);
        // (0.1*0.2 + 0.9*0.9) / 1.0
        assert_relative_eq!(record.confidence, 0.83, epsilon = 1e-12);
    }

    #[test]
    fn test_no_votes() {
        let record = ConsensusAggregator::new().aggregate("game-1", "game.winner", &[]);
        assert_eq!(record, ConsensusRecord::empty("game-1", "game.winner"));
        assert!(!record.has_votes());
    }

    #[test]
    fn test_tie_breaks_on_count_then_id() {
        let votes = vec![
            choice("a", "tie", 1.0, 0.5),
            choice("b", "away", 1.0, 0.25),
            choice("c", "away", 1.0, 0.25),
        ];
        let record = ConsensusAggregator::new().aggregate("game-1", "q1.winner", &votes);
        assert_eq!(record.winner.as_deref(), Some("away"));

        let votes = vec![choice("a", "home", 1.0, 0.5), choice("b", "away", 1.0, 0.5)];
        let record = ConsensusAggregator::new().aggregate("game-1", "q1.winner", &votes);
        assert_eq!(record.winner.as_deref(), Some("away"));
        assert_eq!(record.strength, Some(ConsensusStrength::Weak));
    }

    #[test]
    fn test_zero_weights_fall_back_to_vote_share() {
        let votes = vec![
            choice("a", "home", 0.5, 0.0),
            choice("b", "home", 0.5, 0.0),
            choice("c", "away", 0.5, 0.0),
        ];
        let record = ConsensusAggregator::new().aggregate("game-1", "game.winner", &votes);
        assert_eq!(record.winner.as_deref(), Some("home"));
        assert_relative_eq!(record.consensus_pct, 2.0 / 3.0);
        assert_relative_eq!(record.confidence, 0.5);
    }

    #[test]
    fn test_duplicate_source_counts_once() {
        let votes = vec![
            choice("a", "home", 0.9, 0.9),
            choice("a", "away", 0.9, 0.9),
            choice("b", "away", 0.5, 0.2),
        ];
        let record = ConsensusAggregator::new().aggregate("game-1", "game.winner", &votes);
        assert_eq!(record.vote_count, 2);
        assert_eq!(record.winner.as_deref(), Some("home"));
    }

    #[test]
    fn test_order_independent() {
        let votes = vec![
            choice("s1", "home", 0.71, 0.33),
            choice("s2", "away", 0.64, 0.47),
            choice("s3", "home", 0.58, 0.91),
            choice("s4", "tie", 0.12, 0.27),
        ];
        let mut reversed = votes.clone();
        reversed.reverse();

        let aggregator = ConsensusAggregator::new();
        let forward = aggregator.aggregate("game-1", "game.winner", &votes);
        let backward = aggregator.aggregate("game-1", "game.winner", &reversed);
        assert_eq!(forward.fingerprint(), backward.fingerprint());
    }

    #[test]
    fn test_numeric_summary() {
        let votes = vec![
            Vote::new("a", PredictionValue::Numeric(44.0), 0.5, 0.25),
            Vote::new("b", PredictionValue::Numeric(48.0), 0.5, 0.75),
        ];
        let record = ConsensusAggregator::new().aggregate("game-1", "game.total_points", &votes);
        let numeric = record.numeric.unwrap();
        assert_relative_eq!(numeric.mean, 47.0);
        assert_eq!(numeric.min, 44.0);
        assert_eq!(numeric.max, 48.0);
        assert_eq!(record.winner.as_deref(), Some("48.0"));
    }

    #[test]
    fn test_near_zero_numbers_share_an_option() {
        let votes = vec![
            Vote::new("a", PredictionValue::Numeric(-0.02), 0.5, 0.5),
            Vote::new("b", PredictionValue::Numeric(0.03), 0.5, 0.5),
        ];
        let record = ConsensusAggregator::new().aggregate("game-1", "game.safeties", &votes);
        assert_eq!(record.options.len(), 1);
        assert_eq!(record.winner.as_deref(), Some("0.0"));
        assert_eq!(record.strength, Some(ConsensusStrength::Unanimous));
    }

    #[test]
    fn test_weight_only() {
        let config = AggregatorConfig {
            weighting: VoteWeighting::WeightOnly,
            ..Default::default()
        };
        let votes = vec![choice("a", "home", 0.1, 0.6), choice("b", "away", 1.0, 0.4)];
        let record = ConsensusAggregator::with_config(config)
            .unwrap()
            .aggregate("game-1", "game.winner", &votes);
        assert_eq!(record.winner.as_deref(), Some("home"));
        assert_relative_eq!(record.consensus_pct, 0.6);
        assert_eq!(record.strength, Some(ConsensusStrength::Moderate));
    }

    #[test]
    fn test_classify_thresholds() {
        let aggregator = ConsensusAggregator::new();
        assert_eq!(aggregator.classify(0.75, false), ConsensusStrength::Strong);
        assert_eq!(aggregator.classify(0.55, false), ConsensusStrength::Moderate);
        assert_eq!(aggregator.classify(0.40, false), ConsensusStrength::Weak);
        assert_eq!(aggregator.classify(0.39, false), ConsensusStrength::Divided);
        assert_eq!(aggregator.classify(0.2, true), ConsensusStrength::Unanimous);
    }

    #[test]
    fn test_rejects_unordered_thresholds() {
        let config = AggregatorConfig {
            weak_threshold: 0.8,
            ..Default::default()
        };
        assert!(ConsensusAggregator::with_config(config).is_err());
    }

    #[test]
    fn test_aggregate_question_covers_registry() {
        let registry = CategoryRegistry::standard();
        let mut votes = BTreeMap::new();
        votes.insert("game.winner".to_string(), vec![choice("a", "home", 0.7, 0.6)]);

        let records = ConsensusAggregator::new().aggregate_question("game-1", &registry, &votes);
        assert_eq!(records.len(), registry.expected_count());
        assert_eq!(records[0].winner.as_deref(), Some("home"));
        assert!(records[1..].iter().all(|r| !r.has_votes()));
    }
}
