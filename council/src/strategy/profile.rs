//! Parametric strategies driven by a risk profile.
//!
//! Unseeded profiles are fully deterministic: every draw takes the midpoint
//! of its range. Seeded profiles draw from an RNG keyed on the seed, the
//! source and the question, so reruns reproduce the same bundle.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use bundle::{
    CategoryDescriptor, PredictionBundle, PredictionItem, PredictionType, PredictionValue, Summary,
    UNSPECIFIED_SUBJECT,
};

use super::{ProductionContext, Question, SourceStrategy};

/// How far a strategy strays from the market and how much it stakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    Conservative,
    Balanced,
    Aggressive,
    /// Ignores the market entirely
    Chaos,
}

impl RiskProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Balanced => "balanced",
            Self::Aggressive => "aggressive",
            Self::Chaos => "chaos",
        }
    }

    /// All profiles, in increasing appetite for risk.
    pub fn all() -> [RiskProfile; 4] {
        [Self::Conservative, Self::Balanced, Self::Aggressive, Self::Chaos]
    }
}

/// Closed numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    /// Range between two bounds, in either order.
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    /// Intersect with `[lo, hi]`.
    pub fn within(&self, lo: f64, hi: f64) -> Self {
        let min = if self.min.is_finite() { self.min.clamp(lo, hi) } else { lo };
        let max = if self.max.is_finite() { self.max.clamp(lo, hi) } else { hi };
        Self::new(min, max)
    }

    fn draw(&self, rng: &mut Option<StdRng>) -> f64 {
        match rng {
            Some(rng) if self.max > self.min => rng.gen_range(self.min..=self.max),
            _ => self.midpoint(),
        }
    }
}

/// Parameters of a [`ParametricStrategy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyProfile {
    /// Risk profile
    pub risk: RiskProfile,
    /// Per-item confidence range
    pub confidence: ValueRange,
    /// Per-item stake range
    pub stake: ValueRange,
    /// Scales the market's edge: below 1 hedges toward 50/50, above 1 leans in
    pub conviction: f64,
    /// Added to the home win probability
    #[serde(default)]
    pub home_bias: f64,
    /// Jitter applied to probabilities and numeric values when seeded
    pub spread: f64,
    /// RNG seed; unseeded profiles are deterministic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl StrategyProfile {
    /// Preset for a risk profile.
    pub fn preset(risk: RiskProfile) -> Self {
        let (confidence, stake, conviction, spread) = match risk {
            RiskProfile::Conservative => (ValueRange::new(0.55, 0.70), ValueRange::new(0.5, 2.0), 0.6, 0.05),
            RiskProfile::Balanced => (ValueRange::new(0.50, 0.80), ValueRange::new(1.0, 4.0), 1.0, 0.10),
            RiskProfile::Aggressive => (ValueRange::new(0.70, 0.95), ValueRange::new(4.0, 8.0), 1.5, 0.15),
            RiskProfile::Chaos => (ValueRange::new(0.05, 1.0), ValueRange::new(0.0, 10.0), 1.0, 0.50),
        };
        Self {
            risk,
            confidence,
            stake,
            conviction,
            home_bias: 0.0,
            spread,
            seed: None,
        }
    }

    /// Set RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set home bias.
    pub fn with_home_bias(mut self, bias: f64) -> Self {
        self.home_bias = bias;
        self
    }
}

/// Strategy whose predictions follow a [`StrategyProfile`].
#[derive(Debug, Clone)]
pub struct ParametricStrategy {
    name: String,
    profile: StrategyProfile,
}

impl ParametricStrategy {
    /// Strategy for `profile`, with its spread bounded to [0, 1].
    pub fn new(mut profile: StrategyProfile) -> Self {
        profile.spread = finite_or_zero(profile.spread).abs().min(1.0);
        Self {
            name: profile.risk.as_str().to_string(),
            profile,
        }
    }

    /// Preset strategy.
    pub fn preset(risk: RiskProfile) -> Self {
        Self::new(StrategyProfile::preset(risk))
    }

    pub fn profile(&self) -> &StrategyProfile {
        &self.profile
    }

    fn rng(&self, source_id: &str, question_id: &str) -> Option<StdRng> {
        let seed = self.profile.seed?;
        let mut hasher = Sha256::new();
        hasher.update(seed.to_le_bytes());
        hasher.update(source_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(question_id.as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Some(StdRng::seed_from_u64(u64::from_le_bytes(bytes)))
    }

    fn home_probability(&self, question: &Question, rng: &mut Option<StdRng>) -> f64 {
        let market = if question.home_win_prob.is_finite() {
            question.home_win_prob.clamp(0.0, 1.0)
        } else {
            0.5
        };
        let mut p = match self.profile.risk {
            RiskProfile::Chaos => 0.5,
            _ => 0.5 + (market - 0.5) * self.profile.conviction,
        };
        p += finite_or_zero(self.profile.home_bias);
        if !p.is_finite() {
            p = 0.5;
        }
        if let Some(rng) = rng {
            let spread = self.profile.spread;
            if spread > 0.0 {
                p += rng.gen_range(-spread..=spread);
            }
        }
        p.clamp(0.02, 0.98)
    }

    fn value_for(&self, descriptor: &CategoryDescriptor, p_home: f64, rng: &mut Option<StdRng>) -> PredictionValue {
        match descriptor.pred_type {
            PredictionType::Binary => {
                let p = side_probability(&descriptor.id, p_home);
                PredictionValue::Binary(match rng {
                    Some(rng) => rng.gen_bool(p),
                    None => p > 0.5,
                })
            }
            PredictionType::Numeric => {
                let base = descriptor.placeholder.filter(|n| n.is_finite()).unwrap_or(0.0);
                let spread = self.profile.spread;
                let scaled = match rng {
                    Some(rng) if spread > 0.0 => base * (1.0 + rng.gen_range(-spread..=spread)),
                    _ => base,
                };
                PredictionValue::Numeric((scaled.max(0.0) * 10.0).round() / 10.0)
            }
            PredictionType::Enumerated => {
                let allowed = &descriptor.allowed_values;
                let has_sides = allowed.iter().any(|v| v == "home") && allowed.iter().any(|v| v == "away");
                let choice = match (rng, has_sides) {
                    (Some(rng), _) if self.profile.risk == RiskProfile::Chaos => allowed.choose(rng).cloned(),
                    (Some(rng), true) => Some(if rng.gen_bool(p_home) { "home" } else { "away" }.to_string()),
                    (None, true) => Some(if p_home >= 0.5 { "home" } else { "away" }.to_string()),
                    (Some(rng), false) => allowed.choose(rng).cloned(),
                    (None, false) => allowed.first().cloned(),
                };
                choice.map_or_else(|| descriptor.default_value(), PredictionValue::Choice)
            }
        }
    }
}

impl SourceStrategy for ParametricStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn produce(&self, question: &Question, context: &ProductionContext<'_>) -> PredictionBundle {
        let mut rng = self.rng(&context.source.id, &question.id);
        let confidence_range = self.profile.confidence.within(0.0, 1.0);
        let stake_range = self.profile.stake.within(0.0, context.limits.max_stake.max(0.0));

        let p_home = self.home_probability(question, &mut rng);
        let winner = if p_home >= 0.5 {
            side_name(&question.home, "home")
        } else {
            side_name(&question.away, "away")
        };
        let summary = Summary {
            winner,
            home_win_prob: p_home,
            confidence: confidence_range.draw(&mut rng),
        };

        let mut bundle = PredictionBundle::new(context.source.id.clone(), question.id.clone(), summary);
        for descriptor in context.registry.iter() {
            let value = self.value_for(descriptor, p_home, &mut rng);
            let confidence = confidence_range.draw(&mut rng);
            let stake = stake_range.draw(&mut rng);

            let subject = if descriptor.subject.trim().is_empty() {
                UNSPECIFIED_SUBJECT.to_string()
            } else {
                descriptor.subject.clone()
            };
            let price = ((1.0 / confidence.max(0.01)) * 100.0).round() / 100.0;

            let item = PredictionItem {
                category: descriptor.id.clone(),
                subject,
                pred_type: descriptor.pred_type,
                value,
                confidence,
                stake,
                odds: serde_json::json!({ "format": "decimal", "price": price.max(1.01) }),
                rationale: vec![],
                extra: Default::default(),
            }
            .with_reason(format!("{} profile", self.profile.risk.as_str()))
            .with_reason(format!("home win probability {:.2}", p_home));
            bundle.predictions.push(item);
        }

        debug!(
            source_id = %context.source.id,
            question_id = %question.id,
            strategy = %self.name,
            seeded = self.profile.seed.is_some(),
            items = bundle.len(),
            "Bundle produced"
        );
        bundle
    }
}

/// Probability a binary category resolves true, given the home win probability.
fn side_probability(category: &str, p_home: f64) -> f64 {
    if category.starts_with("home.") {
        p_home
    } else if category.starts_with("away.") {
        1.0 - p_home
    } else {
        0.5
    }
}

fn side_name(name: &str, fallback: &str) -> String {
    if name.trim().is_empty() {
        fallback.to_string()
    } else {
        name.to_string()
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
