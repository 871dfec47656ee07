use serde::Serialize;

use crate::error::BolusError;
use crate::models::{CalcEntry, FoodItem, round_to};

/// The portions picked for one meal.
///
/// Owned by whoever drives the interaction and passed into the service
/// explicitly; it is cleared once the meal is saved.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CarbSession {
    entries: Vec<CalcEntry>,
}

impl CarbSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` (grams or millilitres, per the food's unit) of `food`.
    pub fn add(&mut self, food: &FoodItem, amount: f64) -> Result<&CalcEntry, BolusError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(BolusError::InvalidInput(format!(
                "Amount must be a non-negative number (got {amount})"
            )));
        }
        self.entries.push(CalcEntry {
            name: food.name.clone(),
            amount,
            unit: food.unit,
            carb: round_to(food.carb_per_unit * amount, 2),
        });
        Ok(&self.entries[self.entries.len() - 1])
    }

    pub fn remove(&mut self, index: usize) -> Result<CalcEntry, BolusError> {
        if index >= self.entries.len() {
            return Err(BolusError::InvalidInput(format!(
                "No item at position {} (session has {})",
                index + 1,
                self.entries.len()
            )));
        }
        Ok(self.entries.remove(index))
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        round_to(self.entries.iter().map(|e| e.carb).sum(), 2)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn entries(&self) -> &[CalcEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
