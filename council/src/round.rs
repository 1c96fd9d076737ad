//! Consensus rounds.
//!
//! A round collects one bundle per source for a single question, repairing
//! malformed submissions on the way in, and aggregates every registry
//! category when finalized.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use bundle::{BundleRepairer, BundleValidator, CategoryRegistry, PredictionBundle, RepairReport, ValidationReport};

use crate::aggregator::ConsensusAggregator;
use crate::config::CouncilConfig;
use crate::performance::HistoryProvider;
use crate::types::{ConsensusRecord, CouncilError, CouncilSelection, Result, Source, Vote};
use crate::weight::{specialization_match, WeightCalculator};

/// Acknowledgement for an accepted submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    /// Round the bundle was accepted into
    pub round_id: String,
    /// Submitting source
    pub source_id: String,
    /// Validation verdict on the bundle as received
    pub report: ValidationReport,
    /// Changes made to the bundle, if any
    pub repair: Option<RepairReport>,
    /// When the bundle was accepted
    pub received_at: chrono::DateTime<chrono::Utc>,
}

/// Aggregated result of a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    /// Round ID
    pub round_id: String,
    /// Question the round answered
    pub question_id: String,
    /// One record per registry category, in registry order
    pub records: Vec<ConsensusRecord>,
    /// Accepted submissions
    pub submissions: usize,
    /// Accepted submissions that needed repair
    pub repaired: usize,
    /// When the outcome was computed
    pub computed_at: chrono::DateTime<chrono::Utc>,
}

impl RoundOutcome {
    /// Record for a category.
    pub fn record(&self, category: &str) -> Option<&ConsensusRecord> {
        self.records.iter().find(|r| r.category == category)
    }
}

#[derive(Debug, Default)]
struct RoundState {
    /// Accepted bundles, in arrival order
    submissions: Vec<PredictionBundle>,
    /// Sources that have submitted
    submitted: HashSet<String>,
    /// Submissions that needed repair
    repaired: usize,
    /// No further submissions accepted
    closed: bool,
}

/// Collects bundles for one question and aggregates them.
pub struct ConsensusRound {
    /// Round ID
    id: String,
    /// Question being predicted
    question_id: String,
    /// Categories to aggregate
    registry: Arc<CategoryRegistry>,
    /// Registered sources by id
    sources: HashMap<String, Source>,
    /// Seated council, if the round is council-weighted
    council: Option<CouncilSelection>,
    /// Configuration
    config: CouncilConfig,
    weights: WeightCalculator,
    aggregator: ConsensusAggregator,
    /// When the round opened
    opened_at: chrono::DateTime<chrono::Utc>,
    /// Submission deadline
    deadline: chrono::DateTime<chrono::Utc>,
    /// Mutable round state
    state: Arc<RwLock<RoundState>>,
}

impl ConsensusRound {
    /// Open a round with default configuration.
    pub fn new(
        question_id: impl Into<String>,
        registry: Arc<CategoryRegistry>,
        sources: Vec<Source>,
    ) -> Result<Self> {
        Self::with_config(question_id, registry, sources, CouncilConfig::default())
    }

    /// Open a round with custom configuration.
    pub fn with_config(
        question_id: impl Into<String>,
        registry: Arc<CategoryRegistry>,
        sources: Vec<Source>,
        config: CouncilConfig,
    ) -> Result<Self> {
        config.bundle.validate().map_err(CouncilError::ConfigError)?;
        let weights = WeightCalculator::with_config(config.weight.clone())?;
        let aggregator = ConsensusAggregator::with_config(config.aggregator.clone())?;
        let opened_at = chrono::Utc::now();
        let deadline = i64::try_from(config.round.deadline_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|window| opened_at.checked_add_signed(window))
            .ok_or_else(|| {
                CouncilError::ConfigError(format!(
                    "deadline_secs {} is beyond the representable time range",
                    config.round.deadline_secs
                ))
            })?;
        let id = uuid::Uuid::new_v4().to_string();
        let question_id = question_id.into();

        info!(
            round_id = %id,
            question_id = %question_id,
            sources = sources.len(),
            deadline = %deadline,
            "Consensus round opened"
        );

        Ok(Self {
            id,
            question_id,
            registry,
            sources: sources.into_iter().map(|s| (s.id.clone(), s)).collect(),
            council: None,
            config,
            weights,
            aggregator,
            opened_at,
            deadline,
            state: Arc::new(RwLock::new(RoundState::default())),
        })
    }

    /// Weight votes by a seated council.
    pub fn with_council(mut self, council: CouncilSelection) -> Self {
        self.council = Some(council);
        self
    }

    /// Round ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Question being predicted.
    pub fn question_id(&self) -> &str {
        &self.question_id
    }

    /// When the round opened.
    pub fn opened_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.opened_at
    }

    /// Submission deadline.
    pub fn deadline(&self) -> chrono::DateTime<chrono::Utc> {
        self.deadline
    }

    /// Submit a bundle as received over the wire.
    pub async fn submit(&self, candidate: &Value) -> Result<SubmissionReceipt> {
        if self.state.read().await.closed {
            return Err(CouncilError::RoundClosed(self.id.clone()));
        }
        if chrono::Utc::now() >= self.deadline {
            return Err(CouncilError::DeadlinePassed(self.id.clone()));
        }

        let source_id = candidate
            .get("source_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(CouncilError::MissingSourceId)?
            .to_string();
        self.check_eligible(&source_id)?;

        if let Some(found) = candidate.get("question_id").and_then(Value::as_str) {
            if !found.is_empty() && found != self.question_id {
                return Err(CouncilError::QuestionMismatch {
                    expected: self.question_id.clone(),
                    found: found.to_string(),
                });
            }
        }

        let report = BundleValidator::with_config(&self.registry, self.config.bundle.clone()).validate(candidate);
        if !report.valid && !self.config.round.auto_repair {
            warn!(
                round_id = %self.id,
                source_id = %source_id,
                violations = report.violations.len(),
                "Submission rejected"
            );
            return Err(CouncilError::Rejected {
                source_id,
                violations: report.violations,
            });
        }

        let repaired = BundleRepairer::with_config(&self.registry, self.config.bundle.clone())
            .repair(candidate, &report)?;
        let mut bundle = repaired.bundle;
        bundle.source_id = source_id.clone();
        bundle.question_id = self.question_id.clone();
        let repair = (!repaired.report.is_noop()).then_some(repaired.report);

        {
            let mut state = self.state.write().await;
            if state.closed {
                return Err(CouncilError::RoundClosed(self.id.clone()));
            }
            if !state.submitted.insert(source_id.clone()) {
                return Err(CouncilError::DuplicateSubmission(source_id));
            }
            if repair.is_some() {
                state.repaired += 1;
            }
            state.submissions.push(bundle);
        }

        info!(
            round_id = %self.id,
            source_id = %source_id,
            repaired = repair.is_some(),
            "Submission accepted"
        );

        Ok(SubmissionReceipt {
            round_id: self.id.clone(),
            source_id,
            report,
            repair,
            received_at: chrono::Utc::now(),
        })
    }

    /// Submit an already-typed bundle.
    pub async fn submit_bundle(&self, bundle: &PredictionBundle) -> Result<SubmissionReceipt> {
        self.submit(&bundle.to_value()).await
    }

    /// Accepted bundles, in arrival order.
    pub async fn submissions(&self) -> Vec<PredictionBundle> {
        self.state.read().await.submissions.clone()
    }

    /// Whether the round has stopped accepting submissions.
    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    /// Stop accepting submissions.
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        if !state.closed {
            state.closed = true;
            info!(round_id = %self.id, submissions = state.submissions.len(), "Consensus round closed");
        }
    }

    /// Aggregate the submissions accepted so far without closing the round.
    pub async fn tally(&self, history: &dyn HistoryProvider) -> RoundOutcome {
        let state = self.state.read().await;

        let mut votes: BTreeMap<String, Vec<Vote>> = BTreeMap::new();
        for bundle in &state.submissions {
            let Some(source) = self.sources.get(&bundle.source_id) else {
                continue;
            };
            let Some(factor) = self.council_factor(&source.id) else {
                continue;
            };
            let track_record = history.history(&source.id).or(source.history);

            let mut seen = HashSet::new();
            for item in &bundle.predictions {
                let Some(descriptor) = self.registry.get(&item.category) else {
                    continue;
                };
                if !seen.insert(item.category.as_str()) {
                    continue;
                }
                let specialization = specialization_match(&source.specializations, &descriptor.tags);
                let weight = self.weights.weight(track_record.as_ref(), item.confidence, specialization) * factor;
                votes.entry(item.category.clone()).or_default().push(Vote::new(
                    source.id.clone(),
                    item.value.clone(),
                    item.confidence,
                    weight,
                ));
            }
        }

        let records = self.aggregator.aggregate_question(&self.question_id, &self.registry, &votes);
        RoundOutcome {
            round_id: self.id.clone(),
            question_id: self.question_id.clone(),
            records,
            submissions: state.submissions.len(),
            repaired: state.repaired,
            computed_at: chrono::Utc::now(),
        }
    }

    /// Close the round and aggregate every category.
    pub async fn finalize(&self, history: &dyn HistoryProvider) -> RoundOutcome {
        self.close().await;
        let outcome = self.tally(history).await;
        info!(
            round_id = %self.id,
            question_id = %self.question_id,
            submissions = outcome.submissions,
            repaired = outcome.repaired,
            decided = outcome.records.iter().filter(|r| r.has_votes()).count(),
            "Consensus round finalized"
        );
        outcome
    }

    fn check_eligible(&self, source_id: &str) -> Result<()> {
        let source = self
            .sources
            .get(source_id)
            .ok_or_else(|| CouncilError::UnknownSource(source_id.to_string()))?;
        if !source.active {
            return Err(CouncilError::InactiveSource(source_id.to_string()));
        }
        if self.council_factor(source_id).is_none() {
            return Err(CouncilError::NotCouncilMember(source_id.to_string()));
        }
        Ok(())
    }

    /// Multiplier on a source's credibility weight, `None` if it may not vote.
    ///
    /// Members-only rounds scale by council weight; open rounds boost members
    /// by their council weight and leave everyone else at 1.
    fn council_factor(&self, source_id: &str) -> Option<f64> {
        let Some(council) = &self.council else {
            return Some(1.0);
        };
        match (council.member(source_id), self.config.round.members_only) {
            (Some(member), true) => Some(member.weight),
            (Some(member), false) => Some(1.0 + member.weight),
            (None, true) => None,
            (None, false) => Some(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::NoHistory;
    use crate::strategy::{ParametricStrategy, ProductionContext, Question, RiskProfile, SourceStrategy};
    use crate::types::{ConsensusStrength, CouncilMember};
    use bundle::{BundleConfig, PredictionValue};
    use serde_json::json;

    fn registry() -> Arc<CategoryRegistry> {
        Arc::new(CategoryRegistry::standard())
    }

    fn pool() -> Vec<Source> {
        vec![
            Source::new("a"),
            Source::new("b"),
            Source::new("c"),
            Source::new("retired").deactivated(),
        ]
    }

    /// Complete bundle picking home when `home_win_prob` is above 0.5.
    fn bundle(registry: &CategoryRegistry, source: &str, home_win_prob: f64) -> PredictionBundle {
        let question = Question::new("game-1", "KC", "BUF").with_home_win_prob(home_win_prob);
        let source = Source::new(source);
        let limits = BundleConfig::default();
        let context = ProductionContext {
            registry,
            source: &source,
            limits: &limits,
        };
        ParametricStrategy::preset(RiskProfile::Balanced).produce(&question, &context)
    }

    fn council(weights: &[(&str, f64)]) -> CouncilSelection {
        CouncilSelection {
            members: weights
                .iter()
                .enumerate()
                .map(|(i, (id, weight))| CouncilMember {
                    source_id: id.to_string(),
                    rank: i + 1,
                    score: 0.5,
                    weight: *weight,
                })
                .collect(),
            requested: weights.len(),
            under_filled: false,
        }
    }

    #[tokio::test]
    async fn test_accepts_valid_and_rejects_duplicate() {
        let registry = registry();
        let round = ConsensusRound::new("game-1", registry.clone(), pool()).unwrap();

        let receipt = round.submit_bundle(&bundle(&registry, "a", 0.7)).await.unwrap();
        assert!(receipt.report.valid);
        assert!(receipt.repair.is_none());

        let again = round.submit_bundle(&bundle(&registry, "a", 0.3)).await;
        assert!(matches!(again, Err(CouncilError::DuplicateSubmission(id)) if id == "a"));
        assert_eq!(round.submissions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_repairs_short_bundle() {
        let registry = registry();
        let round = ConsensusRound::new("game-1", registry.clone(), pool()).unwrap();

        let mut short = bundle(&registry, "a", 0.7);
        short.predictions.truncate(80);
        let receipt = round.submit_bundle(&short).await.unwrap();

        assert!(!receipt.report.valid);
        let repair = receipt.repair.unwrap();
        assert_eq!(repair.appended.len(), 3);
        assert_eq!(round.submissions().await[0].len(), registry.expected_count());
    }

    #[tokio::test]
    async fn test_rejects_invalid_without_auto_repair() {
        let mut config = CouncilConfig::default();
        config.round.auto_repair = false;
        let round = ConsensusRound::with_config("game-1", registry(), pool(), config).unwrap();

        let result = round
            .submit(&json!({ "source_id": "a", "summary": {}, "predictions": [] }))
            .await;
        match result {
            Err(CouncilError::Rejected { source_id, violations }) => {
                assert_eq!(source_id, "a");
                assert!(violations.contains(&"expected 83 predictions, found 0".to_string()));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_source_eligibility() {
        let registry = registry();
        let round = ConsensusRound::new("game-1", registry.clone(), pool()).unwrap();

        let stranger = round.submit_bundle(&bundle(&registry, "zed", 0.7)).await;
        assert!(matches!(stranger, Err(CouncilError::UnknownSource(_))));

        let retired = round.submit_bundle(&bundle(&registry, "retired", 0.7)).await;
        assert!(matches!(retired, Err(CouncilError::InactiveSource(_))));

        let anonymous = round.submit(&json!({ "predictions": [] })).await;
        assert!(matches!(anonymous, Err(CouncilError::MissingSourceId)));
    }

    #[tokio::test]
    async fn test_question_mismatch() {
        let registry = registry();
        let round = ConsensusRound::new("game-2", registry.clone(), pool()).unwrap();
        let result = round.submit_bundle(&bundle(&registry, "a", 0.7)).await;
        assert!(matches!(result, Err(CouncilError::QuestionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_closed_and_expired_rounds() {
        let registry = registry();
        let round = ConsensusRound::new("game-1", registry.clone(), pool()).unwrap();
        round.close().await;
        assert!(round.is_closed().await);
        let late = round.submit_bundle(&bundle(&registry, "a", 0.7)).await;
        assert!(matches!(late, Err(CouncilError::RoundClosed(_))));

        let mut config = CouncilConfig::default();
        config.round.deadline_secs = 0;
        let expired = ConsensusRound::with_config("game-1", registry.clone(), pool(), config).unwrap();
        let late = expired.submit_bundle(&bundle(&registry, "a", 0.7)).await;
        assert!(matches!(late, Err(CouncilError::DeadlinePassed(_))));
    }

    #[test]
    fn test_rejects_unrepresentable_deadline() {
        for deadline_secs in [10_000_000_000_000, u64::MAX] {
            let mut config = CouncilConfig::default();
            config.round.deadline_secs = deadline_secs;
            let result = ConsensusRound::with_config("game-1", registry(), pool(), config);
            assert!(
                matches!(result, Err(CouncilError::ConfigError(_))),
                "deadline_secs {} accepted",
                deadline_secs
            );
        }

        let mut config = CouncilConfig::default();
        config.round.deadline_secs = 86_400 * 365;
        let round = ConsensusRound::with_config("game-1", registry(), pool(), config).unwrap();
        assert!(round.deadline() > round.opened_at());
    }

    #[tokio::test]
    async fn test_rejects_unusable_stake_cap() {
        for max_stake in [-1.0, f64::NAN] {
            let mut config = CouncilConfig::default();
            config.bundle.max_stake = max_stake;
            let result = ConsensusRound::with_config("game-1", registry(), pool(), config);
            assert!(matches!(result, Err(CouncilError::ConfigError(_))));
        }

        // A zero cap still lets repaired bundles through
        let registry = registry();
        let mut config = CouncilConfig::default();
        config.bundle.max_stake = 0.0;
        let round = ConsensusRound::with_config("game-1", registry.clone(), pool(), config).unwrap();
        let receipt = round.submit_bundle(&bundle(&registry, "a", 0.7)).await.unwrap();
        assert!(receipt.repair.is_some());
        let stored = round.submissions().await;
        assert!(stored[0].predictions.iter().all(|p| p.stake == 0.0));
    }

    #[tokio::test]
    async fn test_finalize_aggregates_every_category() {
        let registry = registry();
        let round = ConsensusRound::new("game-1", registry.clone(), pool()).unwrap();
        round.submit_bundle(&bundle(&registry, "a", 0.7)).await.unwrap();
        round.submit_bundle(&bundle(&registry, "b", 0.65)).await.unwrap();
        round.submit_bundle(&bundle(&registry, "c", 0.3)).await.unwrap();

        let outcome = round.finalize(&NoHistory).await;
        assert!(round.is_closed().await);
        assert_eq!(outcome.records.len(), registry.expected_count());
        assert_eq!(outcome.submissions, 3);
        assert_eq!(outcome.repaired, 0);

        let winner = outcome.record("game.winner").unwrap();
        assert_eq!(winner.winner.as_deref(), Some("home"));
        assert_eq!(winner.vote_count, 3);
        assert_ne!(winner.strength, Some(ConsensusStrength::Unanimous));

        // Identical inputs, identical records
        let again = round.tally(&NoHistory).await;
        assert_eq!(again.records, outcome.records);
    }

    #[tokio::test]
    async fn test_council_weights_votes() {
        let registry = registry();
        let round = ConsensusRound::new("game-1", registry.clone(), pool())
            .unwrap()
            .with_council(council(&[("a", 0.9), ("b", 0.1)]));

        round.submit_bundle(&bundle(&registry, "a", 0.3)).await.unwrap();
        round.submit_bundle(&bundle(&registry, "b", 0.7)).await.unwrap();
        let outsider = round.submit_bundle(&bundle(&registry, "c", 0.7)).await;
        assert!(matches!(outsider, Err(CouncilError::NotCouncilMember(_))));

        let outcome = round.finalize(&NoHistory).await;
        let winner = outcome.record("game.winner").unwrap();
        assert_eq!(winner.winner.as_deref(), Some("away"));
        assert!((winner.consensus_pct - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_history_provider_shapes_weights() {
        let registry = registry();
        let round = ConsensusRound::new("game-1", registry.clone(), pool()).unwrap();
        round.submit_bundle(&bundle(&registry, "a", 0.3)).await.unwrap();
        round.submit_bundle(&bundle(&registry, "b", 0.7)).await.unwrap();

        let mut history = HashMap::new();
        history.insert("a".to_string(), crate::types::SourceHistory::new(0.95, 0.5, 0.05, 200));
        history.insert("b".to_string(), crate::types::SourceHistory::new(0.20, -0.5, 0.40, 200));

        let outcome = round.finalize(&history).await;
        let winner = outcome.record("game.winner").unwrap();
        assert_eq!(winner.winner.as_deref(), Some("away"));
        assert_eq!(
            round.submissions().await[0].item("game.winner").unwrap().value,
            PredictionValue::Choice("away".into())
        );
    }
}
