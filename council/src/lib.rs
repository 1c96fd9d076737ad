//! Weighted multi-source consensus.
//!
//! Many sources each submit a complete prediction bundle for a game. The
//! council crate decides how much each voice counts and what the group
//! believes:
//!
//! - [`WeightCalculator`]: per-source, per-category credibility weights
//! - [`ConsensusAggregator`]: weighted votes into per-category consensus
//! - [`CouncilSelector`]: ranks the pool and seats a top-N council
//! - [`PerformanceTracker`]: track records from resolved predictions
//! - [`ConsensusRound`]: collects, repairs and aggregates submissions
//!
//! Bundle shape, validation and repair live in the `bundle` crate.

pub mod aggregator;
pub mod config;
pub mod performance;
pub mod round;
pub mod selection;
pub mod strategy;
pub mod types;
pub mod weight;

// Re-export main types
pub use aggregator::ConsensusAggregator;
pub use config::{
    AggregatorConfig, CouncilConfig, PerformanceConfig, RoundConfig, SelectionConfig, VoteWeighting,
    WeightConfig, WeightScheme,
};
pub use performance::{HistoryProvider, NoHistory, Outcome, PerformanceTracker};
pub use round::{ConsensusRound, RoundOutcome, SubmissionReceipt};
pub use selection::{CouncilSelector, SourceStanding};
pub use strategy::{
    ParametricStrategy, ProductionContext, Question, RiskProfile, SourceStrategy, StrategyProfile,
};
pub use types::*;
pub use weight::{specialization_match, WeightCalculator, WeightInputs};
