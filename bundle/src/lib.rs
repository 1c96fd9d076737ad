//! Prediction bundles for the consensus council.
//!
//! A bundle is one source's complete set of predictions for one question-set
//! (a game). This crate owns the shape of a bundle and what "complete" means:
//!
//! - [`CategoryRegistry`]: the fixed, ordered category list a bundle must cover
//! - [`BundleValidator`]: reports every defect in a candidate bundle
//! - [`BundleRepairer`]: deterministically completes or truncates a bundle
//!   until it passes validation
//!
//! # Example
//!
//! ```ignore
//! use bundle::{BundleRepairer, BundleValidator, CategoryRegistry};
//!
//! let registry = CategoryRegistry::standard();
//! let report = BundleValidator::new(&registry).validate(&candidate);
//! if !report.valid {
//!     let repaired = BundleRepairer::new(&registry).repair(&candidate, &report)?;
//! }
//! ```

pub mod config;
mod fields;
pub mod registry;
pub mod repair;
pub mod standard;
pub mod types;
pub mod validator;

// Re-export main types
pub use config::{BundleConfig, OverflowPolicy};
pub use registry::{CategoryDescriptor, CategoryRegistry, RegistryError};
pub use repair::{BundleRepairer, RepairError, RepairReport, Repaired};
pub use types::*;
pub use validator::{BundleValidator, ValidationReport};
