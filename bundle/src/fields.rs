//! Field-level checks shared by the validator and the repairer.
//!
//! Each check returns the field's typed value when it is acceptable and
//! `None` otherwise. The repairer keeps exactly what these accept, which is
//! what makes repaired bundles pass validation.

use serde_json::Value;

use crate::registry::CategoryDescriptor;
use crate::types::{PredictionType, PredictionValue};

/// Non-empty string.
pub(crate) fn text(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Finite number in [0, 1].
pub(crate) fn unit(value: Option<&Value>) -> Option<f64> {
    value
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite() && (0.0..=1.0).contains(n))
}

/// Finite number in [0, max].
pub(crate) fn stake(value: Option<&Value>, max: f64) -> Option<f64> {
    value
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite() && *n >= 0.0 && *n <= max)
}

/// Known type tag.
pub(crate) fn pred_type(value: Option<&Value>) -> Option<PredictionType> {
    value.and_then(Value::as_str).and_then(PredictionType::parse)
}

/// Known type tag that agrees with the registry when the category is registered.
pub(crate) fn registered_pred_type(
    value: Option<&Value>,
    descriptor: Option<&CategoryDescriptor>,
) -> Option<PredictionType> {
    pred_type(value).filter(|tag| descriptor.map_or(true, |d| d.pred_type == *tag))
}

/// Value whose shape matches `pred_type`, within the category's allowed set
/// when the registry knows the category.
pub(crate) fn prediction_value(
    value: Option<&Value>,
    pred_type: PredictionType,
    descriptor: Option<&CategoryDescriptor>,
) -> Option<PredictionValue> {
    let parsed = match (pred_type, value?) {
        (PredictionType::Binary, Value::Bool(b)) => PredictionValue::Binary(*b),
        (PredictionType::Numeric, Value::Number(n)) => PredictionValue::Numeric(n.as_f64()?),
        (PredictionType::Enumerated, Value::String(s)) => PredictionValue::Choice(s.clone()),
        _ => return None,
    };

    let acceptable = match descriptor {
        Some(d) => d.accepts(pred_type, &parsed),
        None => match &parsed {
            PredictionValue::Choice(s) => !s.is_empty(),
            PredictionValue::Numeric(n) => n.is_finite(),
            PredictionValue::Binary(_) => true,
        },
    };
    acceptable.then_some(parsed)
}

/// Any defined, non-null odds descriptor.
pub(crate) fn odds(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// Array of strings (possibly empty).
pub(crate) fn rationale(value: Option<&Value>) -> Option<Vec<String>> {
    value?
        .as_array()?
        .iter()
        .map(|line| line.as_str().map(str::to_string))
        .collect()
}
