//! Insulin dose calculation.
//!
//! Everything here is pure: no I/O, no session state. The suggested carb ratio
//! is derived from a single post-meal reading and should be treated as a hint
//! for review with a clinician, not as a setting to adopt automatically.

use serde::Serialize;
use tracing::warn;

use crate::error::BolusError;
use crate::models::round_to;

/// Inputs for one meal's dose.
///
/// `actual_glucose` is the post-meal reading; `None` or `0` means it was not taken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DoseInputs {
    pub total_carb: f64,
    pub current_glucose: f64,
    pub target_glucose: f64,
    pub carb_ratio: f64,
    pub sensitivity_factor: f64,
    pub actual_glucose: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RatioSuggestion {
    Suggested { carb_ratio: f64 },
    /// The post-meal reading implies zero or negative insulin was needed for
    /// the carbs, so no ratio can be derived.
    Anomalous { implied_carb_insulin: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DoseResult {
    pub carb_dose: f64,
    pub correction_dose: f64,
    pub total_dose: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<RatioSuggestion>,
}

impl DoseResult {
    #[must_use]
    pub fn suggested_carb_ratio(&self) -> Option<f64> {
        match self.suggestion {
            Some(RatioSuggestion::Suggested { carb_ratio }) => Some(carb_ratio),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_anomalous(&self) -> bool {
        matches!(self.suggestion, Some(RatioSuggestion::Anomalous { .. }))
    }
}

fn check_non_negative(name: &str, value: f64) -> Result<(), BolusError> {
    if !value.is_finite() || value < 0.0 {
        return Err(BolusError::InvalidInput(format!(
            "{name} must be a non-negative number (got {value})"
        )));
    }
    Ok(())
}

fn check_divisor(field: &'static str, value: f64) -> Result<(), BolusError> {
    check_non_negative(field, value)?;
    if value == 0.0 {
        return Err(BolusError::DivisionByZero { field });
    }
    Ok(())
}

/// Compute carb, correction and total dose, plus a ratio suggestion when a
/// post-meal reading is supplied.
pub fn calculate_dose(inputs: &DoseInputs) -> Result<DoseResult, BolusError> {
    check_non_negative("total carbs", inputs.total_carb)?;
    check_non_negative("current glucose", inputs.current_glucose)?;
    check_non_negative("target glucose", inputs.target_glucose)?;
    check_divisor("C/I", inputs.carb_ratio)?;
    check_divisor("ISF", inputs.sensitivity_factor)?;

    let carb_dose = round_to(inputs.total_carb / inputs.carb_ratio, 1);
    let correction_dose = round_to(
        (inputs.current_glucose - inputs.target_glucose) / inputs.sensitivity_factor,
        1,
    );
    let total_dose = round_to(carb_dose + correction_dose, 1);

    let suggestion = match inputs.actual_glucose {
        Some(actual) if actual > 0.0 => Some(suggest_carb_ratio(
            inputs.total_carb,
            total_dose,
            inputs.target_glucose,
            inputs.sensitivity_factor,
            actual,
        )?),
        Some(actual) => {
            check_non_negative("actual glucose", actual)?;
            None
        }
        None => None,
    };

    Ok(DoseResult {
        carb_dose,
        correction_dose,
        total_dose,
        suggestion,
    })
}

/// Back out the carb ratio that would have landed on target.
///
/// The insulin that actually went to the carbs is the total dose minus the
/// correction still needed after the meal.
pub fn suggest_carb_ratio(
    total_carb: f64,
    total_dose: f64,
    target_glucose: f64,
    sensitivity_factor: f64,
    actual_glucose: f64,
) -> Result<RatioSuggestion, BolusError> {
    check_non_negative("actual glucose", actual_glucose)?;
    check_divisor("ISF", sensitivity_factor)?;

    let implied_carb_insulin =
        total_dose - (actual_glucose - target_glucose) / sensitivity_factor;
    if implied_carb_insulin > 0.0 {
        Ok(RatioSuggestion::Suggested {
            carb_ratio: round_to(total_carb / implied_carb_insulin, 2),
        })
    } else {
        warn!(
            total_dose,
            actual_glucose, implied_carb_insulin, "anomalous post-meal result, no ratio suggested"
        );
        Ok(RatioSuggestion::Anomalous {
            implied_carb_insulin,
        })
    }
}
