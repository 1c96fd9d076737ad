//! Configuration shared by validation and repair.

use serde::{Deserialize, Serialize};

/// What repair does with bundles holding more than `K` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Keep the first `K` items in submission order, drop the rest
    #[default]
    Truncate,
    /// Refuse to repair; the caller must ask for a resubmission
    Reject,
}

/// Bundle validation and repair settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Per-item stake cap
    pub max_stake: f64,
    /// Handling of oversized bundles
    pub overflow: OverflowPolicy,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            max_stake: 10.0,
            overflow: OverflowPolicy::Truncate,
        }
    }
}

impl BundleConfig {
    /// Check that the stake cap admits at least a zero stake.
    ///
    /// Repair clamps stakes into `[0, max_stake]`, so a negative or non-finite
    /// cap would leave no stake that validates.
    pub fn validate(&self) -> Result<(), String> {
        if !self.max_stake.is_finite() || self.max_stake < 0.0 {
            return Err(format!(
                "max_stake must be a finite number >= 0, got {}",
                self.max_stake
            ));
        }
        Ok(())
    }
}
