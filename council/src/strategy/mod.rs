//! Prediction strategies.
//!
//! A strategy turns a question into a complete bundle for one source. Every
//! bundle a strategy produces must pass validation against the registry it
//! was given.

pub mod profile;

pub use profile::{ParametricStrategy, RiskProfile, StrategyProfile, ValueRange};

use serde::{Deserialize, Serialize};

use bundle::{BundleConfig, CategoryRegistry, PredictionBundle};

use crate::types::Source;

/// A question-set to predict: one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Question id
    pub id: String,
    /// Home side identifier
    pub home: String,
    /// Away side identifier
    pub away: String,
    /// Market-implied home win probability
    #[serde(default = "even")]
    pub home_win_prob: f64,
}

fn even() -> f64 {
    0.5
}

impl Question {
    /// Create an even-money question.
    pub fn new(id: impl Into<String>, home: impl Into<String>, away: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            home: home.into(),
            away: away.into(),
            home_win_prob: even(),
        }
    }

    /// Set the market-implied home win probability.
    pub fn with_home_win_prob(mut self, probability: f64) -> Self {
        self.home_win_prob = probability;
        self
    }
}

/// What a strategy needs besides the question.
#[derive(Debug, Clone, Copy)]
pub struct ProductionContext<'a> {
    /// Categories to cover
    pub registry: &'a CategoryRegistry,
    /// Producing source
    pub source: &'a Source,
    /// Bundle limits (stake cap)
    pub limits: &'a BundleConfig,
}

/// Produces bundles for a source.
pub trait SourceStrategy: Send + Sync {
    /// Strategy name, for logs.
    fn name(&self) -> &str;

    /// Produce a complete bundle.
    fn produce(&self, question: &Question, context: &ProductionContext<'_>) -> PredictionBundle;
}
