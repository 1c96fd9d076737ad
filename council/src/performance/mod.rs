//! Source performance history.
//!
//! Weighting and selection read track records through [`HistoryProvider`],
//! so a round can run against live tracking, a stored snapshot, or nothing.

pub mod tracker;

pub use tracker::PerformanceTracker;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{Source, SourceHistory};

/// Supplies track records by source id.
pub trait HistoryProvider: Send + Sync {
    /// Track record for a source, if any.
    fn history(&self, source_id: &str) -> Option<SourceHistory>;
}

/// One resolved prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Category the prediction was for
    pub category: String,
    /// Confidence the source stated
    pub confidence: f64,
    /// Whether the prediction matched the result
    pub correct: bool,
    /// When the prediction was resolved
    pub resolved_at: chrono::DateTime<chrono::Utc>,
}

impl Outcome {
    /// Outcome resolved now.
    pub fn new(category: impl Into<String>, confidence: f64, correct: bool) -> Self {
        Self {
            category: category.into(),
            confidence,
            correct,
            resolved_at: chrono::Utc::now(),
        }
    }
}

/// Provider with no records: every source is unproven.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl HistoryProvider for NoHistory {
    fn history(&self, _source_id: &str) -> Option<SourceHistory> {
        None
    }
}

impl HistoryProvider for HashMap<String, SourceHistory> {
    fn history(&self, source_id: &str) -> Option<SourceHistory> {
        self.get(source_id).copied()
    }
}

impl HistoryProvider for [Source] {
    fn history(&self, source_id: &str) -> Option<SourceHistory> {
        self.iter().find(|s| s.id == source_id).and_then(|s| s.history)
    }
}

impl HistoryProvider for Vec<Source> {
    fn history(&self, source_id: &str) -> Option<SourceHistory> {
        self.as_slice().history(source_id)
    }
}
