//! Property tests for weighting, aggregation and selection.

use bundle::{CategoryRegistry, PredictionValue};
use council::*;
use proptest::prelude::*;
use std::collections::BTreeSet;

// ============================================================================
// Strategies
// ============================================================================

fn any_f64() -> impl Strategy<Value = f64> {
    prop_oneof![
        8 => -2.0f64..2.0,
        1 => Just(f64::NAN),
        1 => Just(f64::INFINITY),
    ]
}

fn history() -> impl Strategy<Value = SourceHistory> {
    (0.0f64..=1.0, -1.0f64..=1.0, 0.0f64..=1.0, 1u64..500)
        .prop_map(|(accuracy, trend, calibration_error, samples)| {
            SourceHistory::new(accuracy, trend, calibration_error, samples)
        })
}

fn vote() -> impl Strategy<Value = Vote> {
    (
        prop::sample::select(vec!["s1", "s2", "s3", "s4", "s5", "s6"]),
        prop::sample::select(vec!["home", "away", "tie"]),
        0.0f64..=1.0,
        0.0f64..=1.0,
    )
        .prop_map(|(source, option, confidence, weight)| {
            Vote::new(source, PredictionValue::Choice(option.into()), confidence, weight)
        })
}

fn source_pool() -> impl Strategy<Value = Vec<Source>> {
    let tags = vec!["game", "totals", "passing", "rushing", "defense"];
    prop::collection::vec(
        (
            prop::option::of(history()),
            prop::sample::subsequence(tags, 0..=3),
            prop::bool::weighted(0.85),
        ),
        0..12,
    )
    .prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (history, tags, active))| {
                let mut source = Source::new(format!("source-{:02}", i)).with_specializations(&tags);
                source.history = history;
                source.active = active;
                source
            })
            .collect()
    })
}

// ============================================================================
// Weight Properties
// ============================================================================

proptest! {
    #[test]
    fn weight_always_in_bounds(
        accuracy in any_f64(),
        trend in any_f64(),
        confidence in any_f64(),
        specialization in any_f64(),
    ) {
        let calc = WeightCalculator::new();
        let w = calc.blend(WeightInputs { accuracy, trend, confidence, specialization });
        prop_assert!(w.is_finite());
        prop_assert!((0.01..=1.0).contains(&w));
    }

    #[test]
    fn weight_monotonic_in_accuracy(
        base in history(),
        bump in 0.0f64..0.5,
        confidence in 0.0f64..=1.0,
        specialization in 0.0f64..=1.0,
    ) {
        let calc = WeightCalculator::new();
        let better = SourceHistory { accuracy: (base.accuracy + bump).min(1.0), ..base };
        prop_assert!(
            calc.weight(Some(&better), confidence, specialization)
                >= calc.weight(Some(&base), confidence, specialization)
        );
    }

    #[test]
    fn weight_monotonic_in_trend(
        base in history(),
        bump in 0.0f64..1.0,
        confidence in 0.0f64..=1.0,
    ) {
        let calc = WeightCalculator::new();
        let better = SourceHistory { trend: (base.trend + bump).min(1.0), ..base };
        prop_assert!(calc.weight(Some(&better), confidence, 0.5) >= calc.weight(Some(&base), confidence, 0.5));
    }

    #[test]
    fn weight_monotonic_in_confidence(
        base in history(),
        confidence in 0.0f64..=1.0,
        bump in 0.0f64..0.5,
        specialization in 0.0f64..=1.0,
    ) {
        let calc = WeightCalculator::new();
        prop_assert!(
            calc.weight(Some(&base), confidence + bump, specialization)
                >= calc.weight(Some(&base), confidence, specialization)
        );
    }

    #[test]
    fn weight_monotonic_in_specialization(
        base in history(),
        specialization in 0.0f64..=1.0,
        bump in 0.0f64..0.5,
        confidence in 0.0f64..=1.0,
    ) {
        let calc = WeightCalculator::new();
        prop_assert!(
            calc.weight(Some(&base), confidence, specialization + bump)
                >= calc.weight(Some(&base), confidence, specialization)
        );
    }

    #[test]
    fn weight_saturates_past_one(
        base in history(),
        near_one in 0.9f64..=1.0,
        overshoot in 0.0f64..3.0,
        other in 0.0f64..=1.0,
    ) {
        let calc = WeightCalculator::new();
        let high = near_one + overshoot;

        let by_confidence = calc.weight(Some(&base), high, other);
        prop_assert!(by_confidence >= calc.weight(Some(&base), near_one, other));
        if high >= 1.0 {
            prop_assert_eq!(by_confidence, calc.weight(Some(&base), 1.0, other));
        }

        let by_specialization = calc.weight(Some(&base), other, high);
        prop_assert!(by_specialization >= calc.weight(Some(&base), other, near_one));
        if high >= 1.0 {
            prop_assert_eq!(by_specialization, calc.weight(Some(&base), other, 1.0));
        }
    }
}

// ============================================================================
// Aggregation Properties
// ============================================================================

proptest! {
    #[test]
    fn consensus_share_is_a_fraction(votes in prop::collection::vec(vote(), 0..20)) {
        let record = ConsensusAggregator::new().aggregate("game-1", "game.winner", &votes);
        prop_assert!((0.0..=1.0).contains(&record.consensus_pct));
        prop_assert!((0.0..=1.0).contains(&record.confidence));
        prop_assert_eq!(record.winner.is_some(), !votes.is_empty());
        prop_assert!(record.vote_count <= 6);
    }

    #[test]
    fn aggregation_ignores_vote_order(
        votes in prop::collection::vec(vote(), 1..20),
    ) {
        // Keep one vote per source so permutations cannot change which vote counts
        let mut seen = BTreeSet::new();
        let votes: Vec<Vote> = votes.into_iter().filter(|v| seen.insert(v.source_id.clone())).collect();
        let mut reversed = votes.clone();
        reversed.reverse();

        let aggregator = ConsensusAggregator::new();
        let forward = aggregator.aggregate("game-1", "game.winner", &votes);
        let backward = aggregator.aggregate("game-1", "game.winner", &reversed);
        prop_assert_eq!(forward.fingerprint(), backward.fingerprint());
    }

    #[test]
    fn winner_has_largest_weighted_total(votes in prop::collection::vec(vote(), 1..20)) {
        let record = ConsensusAggregator::new().aggregate("game-1", "game.winner", &votes);
        let top = &record.options[0];
        prop_assert_eq!(record.winner.as_deref(), Some(top.option.as_str()));
        for option in &record.options {
            prop_assert!(top.weighted_total >= option.weighted_total);
        }
    }
}

// ============================================================================
// Selection Properties
// ============================================================================

proptest! {
    #[test]
    fn council_weights_sum_to_one_and_never_increase(
        pool in source_pool(),
        size in 1usize..8,
        proportional in any::<bool>(),
    ) {
        let selector = CouncilSelector::with_config(SelectionConfig {
            council_size: size,
            weight_scheme: if proportional { WeightScheme::ScoreProportional } else { WeightScheme::RankLinear },
            ..Default::default()
        }).unwrap();
        let universe = CategoryRegistry::standard().tag_universe();
        let selection = selector.select(&pool, &universe);

        let active = pool.iter().filter(|s| s.active).count();
        prop_assert_eq!(selection.members.len(), active.min(size));
        prop_assert_eq!(selection.under_filled, active < size);

        if !selection.members.is_empty() {
            let total: f64 = selection.members.iter().map(|m| m.weight).sum();
            prop_assert!((total - 1.0).abs() < 1e-9);
        }
        for pair in selection.members.windows(2) {
            prop_assert!(pair[0].weight >= pair[1].weight - 1e-12);
            prop_assert!(pair[0].score >= pair[1].score);
            prop_assert_eq!(pair[0].rank + 1, pair[1].rank);
        }
        prop_assert!(selection.members.iter().all(|m| pool.iter().any(|s| s.id == m.source_id && s.active)));
    }

    #[test]
    fn selection_is_deterministic(pool in source_pool()) {
        let universe = CategoryRegistry::standard().tag_universe();
        let selector = CouncilSelector::new();
        prop_assert_eq!(selector.select(&pool, &universe), selector.select(&pool, &universe));
    }
}
