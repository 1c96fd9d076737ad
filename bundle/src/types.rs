//! Core types for prediction bundles.
//!
//! Field names match the JSON submissions sources send, so a bundle can be
//! read straight from a submission with `serde_json`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Confidence assigned when a submission omits or garbles it.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Category placeholder for items that arrive without one.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Subject placeholder when neither the item nor the registry names one.
pub const UNSPECIFIED_SUBJECT: &str = "unspecified";

/// Winner placeholder for synthesized summaries.
pub const UNDECIDED_WINNER: &str = "undecided";

/// Choice placeholder for enumerated items with no known allowed set.
pub const UNKNOWN_CHOICE: &str = "unknown";

/// Type tag of a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PredictionType {
    /// Yes/no outcome, value is a boolean
    Binary,
    /// Quantity, value is a number
    Numeric,
    /// One of a fixed set of options, value is a string
    Enumerated,
}

impl PredictionType {
    /// Wire tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Numeric => "numeric",
            Self::Enumerated => "enumerated",
        }
    }

    /// Parse a wire tag.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "binary" => Some(Self::Binary),
            "numeric" => Some(Self::Numeric),
            "enumerated" => Some(Self::Enumerated),
            _ => None,
        }
    }
}

impl Default for PredictionType {
    fn default() -> Self {
        Self::Binary
    }
}

/// The predicted value. Its shape must match the item's [`PredictionType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionValue {
    Binary(bool),
    Numeric(f64),
    Choice(String),
}

impl PredictionValue {
    /// Whether this value has the shape `pred_type` requires.
    pub fn matches(&self, pred_type: PredictionType) -> bool {
        matches!(
            (self, pred_type),
            (Self::Binary(_), PredictionType::Binary)
                | (Self::Numeric(_), PredictionType::Numeric)
                | (Self::Choice(_), PredictionType::Enumerated)
        )
    }

    /// Option id used when votes on this value are grouped.
    ///
    /// Numbers are keyed at one decimal place so near-identical numeric
    /// predictions land in the same option.
    pub fn option_key(&self) -> String {
        match self {
            Self::Binary(b) => b.to_string(),
            Self::Numeric(n) => {
                let key = format!("{:.1}", n);
                // Values rounding to zero from below share the "0.0" option
                if key == "-0.0" {
                    "0.0".to_string()
                } else {
                    key
                }
            }
            Self::Choice(c) => c.clone(),
        }
    }

    /// Numeric view, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Numeric(n) => Some(*n),
            _ => None,
        }
    }
}

/// Game-level summary every bundle carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Predicted winner identifier
    pub winner: String,
    /// Probability the home side wins (0.0 - 1.0)
    pub home_win_prob: f64,
    /// Overall confidence (0.0 - 1.0)
    pub confidence: f64,
}

impl Summary {
    /// Neutral 50/50 summary used when a submission has none.
    pub fn neutral() -> Self {
        Self {
            winner: UNDECIDED_WINNER.to_string(),
            home_win_prob: 0.5,
            confidence: DEFAULT_CONFIDENCE,
        }
    }
}

impl Default for Summary {
    fn default() -> Self {
        Self::neutral()
    }
}

/// A single prediction for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionItem {
    /// Category id from the registry
    pub category: String,
    /// What the prediction is about (team, player, period)
    pub subject: String,
    /// Type tag
    pub pred_type: PredictionType,
    /// Predicted value
    pub value: PredictionValue,
    /// Stated confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Weight of conviction, capped per source
    pub stake: f64,
    /// Pricing/odds descriptor, kept as submitted
    pub odds: Value,
    /// Supporting rationale, in order
    pub rationale: Vec<String>,
    /// Fields this crate does not interpret, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PredictionItem {
    /// Set confidence.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Set stake.
    pub fn with_stake(mut self, stake: f64) -> Self {
        self.stake = stake;
        self
    }

    /// Append a rationale line.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.rationale.push(reason.into());
        self
    }
}

/// Neutral fixed-odds descriptor: even money in decimal format.
pub fn neutral_odds() -> Value {
    serde_json::json!({ "format": "decimal", "price": 2.0 })
}

/// One source's predictions for one question-set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionBundle {
    /// Submitting source
    #[serde(default)]
    pub source_id: String,
    /// Question-set (game) the bundle answers
    #[serde(default)]
    pub question_id: String,
    /// Game-level summary
    pub summary: Summary,
    /// One item per registry category
    pub predictions: Vec<PredictionItem>,
    /// Submission fields this crate does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PredictionBundle {
    /// Create an empty bundle.
    pub fn new(source_id: impl Into<String>, question_id: impl Into<String>, summary: Summary) -> Self {
        Self {
            source_id: source_id.into(),
            question_id: question_id.into(),
            summary,
            predictions: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    /// Whether the bundle has no items.
    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    /// First item for a category.
    pub fn item(&self, category: &str) -> Option<&PredictionItem> {
        self.predictions.iter().find(|p| p.category == category)
    }

    /// JSON form, as submitted over the wire.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
