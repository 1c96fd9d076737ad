//! Core types for the consensus council.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use bundle::{PredictionValue, RegistryError, RepairError};

// ============================================================================
// Sources
// ============================================================================

/// Track record of a source, as reported by a history provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceHistory {
    /// Fraction of resolved predictions that were correct (0.0 - 1.0)
    pub accuracy: f64,
    /// Recent performance relative to overall (-1.0 - 1.0)
    pub trend: f64,
    /// Expected calibration error (0.0 - 1.0, lower is better)
    pub calibration_error: f64,
    /// Number of resolved predictions behind these figures
    pub samples: u64,
}

impl SourceHistory {
    /// Create a history record.
    pub fn new(accuracy: f64, trend: f64, calibration_error: f64, samples: u64) -> Self {
        Self {
            accuracy,
            trend,
            calibration_error,
            samples,
        }
    }
}

/// A prediction source (an expert, model or agent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Unique source ID
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Specialization tags (matched against category tags)
    #[serde(default)]
    pub specializations: BTreeSet<String>,
    /// Inactive sources are never selected and cannot submit
    #[serde(default = "default_active")]
    pub active: bool,
    /// Known track record, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<SourceHistory>,
}

fn default_active() -> bool {
    true
}

impl Source {
    /// Create an active source with no history.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            specializations: BTreeSet::new(),
            active: true,
            history: None,
        }
    }

    /// Set display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add specialization tags.
    pub fn with_specializations(mut self, tags: &[&str]) -> Self {
        self.specializations.extend(tags.iter().map(|t| t.to_string()));
        self
    }

    /// Set track record.
    pub fn with_history(mut self, history: SourceHistory) -> Self {
        self.history = Some(history);
        self
    }

    /// Mark inactive.
    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }
}

// ============================================================================
// Votes and consensus
// ============================================================================

/// One source's vote on one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    /// Voting source
    pub source_id: String,
    /// Predicted value
    pub value: PredictionValue,
    /// Stated confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Credibility weight (0.0 - 1.0)
    pub weight: f64,
}

impl Vote {
    /// Create a vote.
    pub fn new(source_id: impl Into<String>, value: PredictionValue, confidence: f64, weight: f64) -> Self {
        Self {
            source_id: source_id.into(),
            value,
            confidence,
            weight,
        }
    }

    /// Option this vote counts toward.
    pub fn option(&self) -> String {
        self.value.option_key()
    }
}

/// Strength of a consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusStrength {
    /// Every vote chose the same option
    Unanimous,
    /// Winning share at or above the strong threshold
    Strong,
    /// Winning share at or above the moderate threshold
    Moderate,
    /// Winning share at or above the weak threshold
    Weak,
    /// No option has meaningful support
    Divided,
}

/// Per-option vote totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionTally {
    /// Option id
    pub option: String,
    /// Number of votes
    pub votes: usize,
    /// Sum of vote contributions
    pub weighted_total: f64,
    /// Weight-averaged confidence of the option's voters
    pub confidence: f64,
}

/// Spread of numeric votes for a category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    /// Weight-averaged value
    pub mean: f64,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
}

/// Consensus for one category of one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusRecord {
    /// Question the record belongs to
    pub question_id: String,
    /// Category id
    pub category: String,
    /// Winning option, absent with no votes
    pub winner: Option<String>,
    /// Winner's share of the weighted total (0.0 - 1.0)
    pub consensus_pct: f64,
    /// Strength classification, absent with no votes
    pub strength: Option<ConsensusStrength>,
    /// Weight-averaged confidence of the winner's voters
    pub confidence: f64,
    /// Number of distinct voting sources
    pub vote_count: usize,
    /// All options, winner first
    pub options: Vec<OptionTally>,
    /// Spread of numeric votes, when every vote is numeric
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric: Option<NumericSummary>,
}

impl ConsensusRecord {
    /// Record for a category nobody voted on.
    pub fn empty(question_id: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            category: category.into(),
            winner: None,
            consensus_pct: 0.0,
            strength: None,
            confidence: 0.0,
            vote_count: 0,
            options: Vec::new(),
            numeric: None,
        }
    }

    /// Whether anyone voted.
    pub fn has_votes(&self) -> bool {
        self.vote_count > 0
    }

    /// Content fingerprint (hex SHA-256 of the JSON form).
    pub fn fingerprint(&self) -> String {
        fingerprint(self)
    }
}

// ============================================================================
// Council
// ============================================================================

/// One seat on the council.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouncilMember {
    /// Member source
    pub source_id: String,
    /// 1-based rank
    pub rank: usize,
    /// Composite selection score
    pub score: f64,
    /// Voting weight (members' weights sum to 1)
    pub weight: f64,
}

/// Result of a council selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CouncilSelection {
    /// Members in rank order
    pub members: Vec<CouncilMember>,
    /// Council size asked for
    pub requested: usize,
    /// Fewer eligible sources than seats
    pub under_filled: bool,
}

impl CouncilSelection {
    /// Look up a member.
    pub fn member(&self, source_id: &str) -> Option<&CouncilMember> {
        self.members.iter().find(|m| m.source_id == source_id)
    }

    /// Whether a source holds a seat.
    pub fn contains(&self, source_id: &str) -> bool {
        self.member(source_id).is_some()
    }

    /// Member ids in rank order.
    pub fn member_ids(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.source_id.as_str()).collect()
    }

    /// Changes from `previous` to this selection.
    ///
    /// Current members come first in rank order, then departed members in
    /// their previous rank order.
    pub fn diff(&self, previous: &CouncilSelection) -> Vec<MembershipChange> {
        let mut changes: Vec<MembershipChange> = self
            .members
            .iter()
            .map(|member| {
                let kind = match previous.member(&member.source_id) {
                    None => ChangeKind::Added { rank: member.rank },
                    Some(before) if before.rank == member.rank => ChangeKind::Unchanged { rank: member.rank },
                    Some(before) => ChangeKind::Reranked {
                        from: before.rank,
                        to: member.rank,
                    },
                };
                MembershipChange {
                    source_id: member.source_id.clone(),
                    kind,
                }
            })
            .collect();

        changes.extend(
            previous
                .members
                .iter()
                .filter(|m| !self.contains(&m.source_id))
                .map(|m| MembershipChange {
                    source_id: m.source_id.clone(),
                    kind: ChangeKind::Removed { rank: m.rank },
                }),
        );

        changes
    }

    /// Content fingerprint (hex SHA-256 of the JSON form).
    pub fn fingerprint(&self) -> String {
        fingerprint(self)
    }
}

/// How one source's seat changed between selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ChangeKind {
    /// Newly seated
    Added { rank: usize },
    /// Lost its seat
    Removed { rank: usize },
    /// Kept its seat at a different rank
    Reranked { from: usize, to: usize },
    /// Kept its seat and rank
    Unchanged { rank: usize },
}

/// A membership change for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipChange {
    /// Affected source
    pub source_id: String,
    /// What changed
    #[serde(flatten)]
    pub kind: ChangeKind,
}

/// Hex SHA-256 of a value's JSON form.
pub fn fingerprint<T: Serialize>(value: &T) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

// ============================================================================
// Errors
// ============================================================================

/// Error types for the council.
#[derive(Debug, thiserror::Error)]
pub enum CouncilError {
    /// Invalid configuration
    #[error("Config error: {0}")]
    ConfigError(String),

    /// Invalid category registry
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Bundle could not be repaired
    #[error("Repair error: {0}")]
    Repair(#[from] RepairError),

    /// Round no longer accepts submissions
    #[error("Round {0} is closed")]
    RoundClosed(String),

    /// Submission arrived after the deadline
    #[error("Round {0} deadline has passed")]
    DeadlinePassed(String),

    /// Submission carries no source id
    #[error("Submission has no source_id")]
    MissingSourceId,

    /// Source is not registered
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// Source is registered but inactive
    #[error("Source {0} is inactive")]
    InactiveSource(String),

    /// Round accepts council members only
    #[error("Source {0} is not a council member")]
    NotCouncilMember(String),

    /// Source already submitted to this round
    #[error("Source {0} has already submitted")]
    DuplicateSubmission(String),

    /// Submission answers a different question
    #[error("Submission for question {found}, expected {expected}")]
    QuestionMismatch { expected: String, found: String },

    /// Invalid bundle and repair is disabled
    #[error("Bundle from {source_id} rejected with {} violation(s)", .violations.len())]
    Rejected {
        source_id: String,
        violations: Vec<String>,
    },
}

/// Result type for council operations.
pub type Result<T> = std::result::Result<T, CouncilError>;
