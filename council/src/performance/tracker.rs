//! Tracks resolved predictions and derives track records from them.

use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

use bundle::{PredictionBundle, PredictionValue};

use super::{HistoryProvider, Outcome};
use crate::config::PerformanceConfig;
use crate::types::{CouncilError, Result, Source, SourceHistory};

/// Rolling per-source outcome log.
pub struct PerformanceTracker {
    /// Configuration
    config: PerformanceConfig,
    /// Outcomes by source, oldest first
    outcomes: DashMap<String, VecDeque<Outcome>>,
}

impl PerformanceTracker {
    /// Create a new tracker.
    pub fn new() -> Self {
        Self {
            config: PerformanceConfig::default(),
            outcomes: DashMap::new(),
        }
    }

    /// Create with custom config.
    pub fn with_config(config: PerformanceConfig) -> Result<Self> {
        if config.window == 0 {
            return Err(CouncilError::ConfigError("window must be at least 1".to_string()));
        }
        if !(config.decay > 0.0 && config.decay <= 1.0) {
            return Err(CouncilError::ConfigError(format!(
                "decay must be in (0, 1], got {}",
                config.decay
            )));
        }
        if config.calibration_bins == 0 {
            return Err(CouncilError::ConfigError(
                "calibration_bins must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&config.default_calibration_error) {
            return Err(CouncilError::ConfigError(format!(
                "default_calibration_error must be in [0, 1], got {}",
                config.default_calibration_error
            )));
        }

        Ok(Self {
            config,
            outcomes: DashMap::new(),
        })
    }

    /// Record one resolved prediction.
    pub fn record(&self, source_id: &str, outcome: Outcome) {
        let window = self.config.window;
        let mut log = self.outcomes.entry(source_id.to_string()).or_default();
        log.push_back(outcome);
        while log.len() > window {
            log.pop_front();
        }
    }

    /// Score a bundle against actual results.
    ///
    /// Only categories present in `results` are scored; returns the number
    /// of outcomes recorded.
    pub fn record_bundle(&self, bundle: &PredictionBundle, results: &HashMap<String, PredictionValue>) -> usize {
        let mut recorded = 0;
        let mut scored = std::collections::HashSet::new();
        for item in &bundle.predictions {
            let Some(actual) = results.get(&item.category) else {
                continue;
            };
            if !scored.insert(item.category.as_str()) {
                continue;
            }
            let correct = item.value.option_key() == actual.option_key();
            self.record(&bundle.source_id, Outcome::new(item.category.clone(), item.confidence, correct));
            recorded += 1;
        }

        debug!(
            source_id = %bundle.source_id,
            question_id = %bundle.question_id,
            recorded,
            "Bundle scored"
        );
        recorded
    }

    /// Track record derived from the outcome window.
    pub fn snapshot(&self, source_id: &str) -> Option<SourceHistory> {
        let log = self.outcomes.get(source_id)?;
        if log.is_empty() {
            return None;
        }

        let n = log.len() as f64;
        let accuracy = log.iter().filter(|o| o.correct).count() as f64 / n;

        // Newest outcome weighs 1, the one before it `decay`, and so on
        let mut weight = 1.0;
        let mut weighted_correct = 0.0;
        let mut weight_sum = 0.0;
        for outcome in log.iter().rev() {
            if outcome.correct {
                weighted_correct += weight;
            }
            weight_sum += weight;
            weight *= self.config.decay;
        }
        let recent = weighted_correct / weight_sum;
        let trend = ((recent - accuracy) * 2.0).clamp(-1.0, 1.0);

        Some(SourceHistory {
            accuracy,
            trend,
            calibration_error: self.calibration_error(log.iter()),
            samples: log.len() as u64,
        })
    }

    /// Attach current track records to a pool of sources.
    pub fn annotate(&self, sources: &mut [Source]) {
        for source in sources.iter_mut() {
            if let Some(history) = self.snapshot(&source.id) {
                source.history = Some(history);
            }
        }
        info!(sources = sources.len(), tracked = self.outcomes.len(), "Track records refreshed");
    }

    /// Number of outcomes held for a source.
    pub fn outcome_count(&self, source_id: &str) -> usize {
        self.outcomes.get(source_id).map_or(0, |log| log.len())
    }

    /// Tracked source ids, sorted.
    pub fn sources(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.outcomes.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Forget a source.
    pub fn reset(&self, source_id: &str) {
        self.outcomes.remove(source_id);
    }

    /// Expected calibration error over confidence bins.
    fn calibration_error<'a>(&self, outcomes: impl Iterator<Item = &'a Outcome>) -> f64 {
        let outcomes: Vec<&Outcome> = outcomes.collect();
        if outcomes.len() < self.config.min_calibration_samples {
            return self.config.default_calibration_error;
        }

        let bins = self.config.calibration_bins;
        // (count, confidence sum, correct count)
        let mut buckets = vec![(0usize, 0.0f64, 0usize); bins];
        for outcome in &outcomes {
            let confidence = if outcome.confidence.is_finite() {
                outcome.confidence.clamp(0.0, 1.0)
            } else {
                0.5
            };
            let index = ((confidence * bins as f64) as usize).min(bins - 1);
            let bucket = &mut buckets[index];
            bucket.0 += 1;
            bucket.1 += confidence;
            if outcome.correct {
                bucket.2 += 1;
            }
        }

        let n = outcomes.len() as f64;
        buckets
            .iter()
            .filter(|(count, _, _)| *count > 0)
            .map(|(count, confidence_sum, correct)| {
                let count = *count as f64;
                let gap = (confidence_sum / count - *correct as f64 / count).abs();
                (count / n) * gap
            })
            .sum()
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryProvider for PerformanceTracker {
    fn history(&self, source_id: &str) -> Option<SourceHistory> {
        self.snapshot(source_id)
    }
}
