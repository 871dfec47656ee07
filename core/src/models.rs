use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::BolusError;

pub const CATALOG_HEADER: [&str; 4] = ["name", "unit", "carb_per_unit", "note"];

pub const FOOD_RECORD_HEADER: [&str; 6] = ["date", "meal", "food", "amount", "unit", "carb"];

/// Column layout of the insulin log. Rows are keyed by `(date, meal)`.
pub const INSULIN_HEADER: [&str; 12] = [
    "date",
    "meal",
    "total_carb",
    "current_glucose",
    "target_glucose",
    "actual_glucose",
    "carb_ratio",
    "sensitivity_factor",
    "carb_dose",
    "correction_dose",
    "total_dose",
    "suggested_carb_ratio",
];

/// 0-based columns of each sheet that hold numbers. Every other column is text.
pub const CATALOG_NUMERIC_COLUMNS: &[usize] = &[2];
pub const FOOD_RECORD_NUMERIC_COLUMNS: &[usize] = &[3, 5];
pub const INSULIN_NUMERIC_COLUMNS: &[usize] = &[2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

pub const SUMMARY_UNIT: &str = "total";

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Grams,
    Milliliters,
}

impl Unit {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Grams => "g",
            Unit::Milliliters => "ml",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = BolusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "g" | "gram" | "grams" | "克(g)" | "克" => Ok(Unit::Grams),
            "ml" | "milliliter" | "milliliters" | "毫升(ml)" | "毫升" => Ok(Unit::Milliliters),
            other => Err(BolusError::InvalidInput(format!(
                "Unknown unit '{other}'. Must be one of: g, ml"
            ))),
        }
    }
}

pub const MEAL_TYPES: &[&str] = &["breakfast", "lunch", "dinner", "late-night"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Meal {
    Breakfast,
    Lunch,
    Dinner,
    LateNight,
}

impl Meal {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Meal::Breakfast => "breakfast",
            Meal::Lunch => "lunch",
            Meal::Dinner => "dinner",
            Meal::LateNight => "late-night",
        }
    }
}

impl fmt::Display for Meal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Meal {
    type Err = BolusError;

    /// Accepts the canonical names plus the labels older sheets were written with.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "breakfast" | "早餐" => Ok(Meal::Breakfast),
            "lunch" | "午餐" => Ok(Meal::Lunch),
            "dinner" | "晚餐" => Ok(Meal::Dinner),
            "late-night" | "late_night" | "latenight" | "snack" | "宵夜" => Ok(Meal::LateNight),
            _ => Err(BolusError::InvalidInput(format!(
                "Invalid meal type '{s}'. Must be one of: {}",
                MEAL_TYPES.join(", ")
            ))),
        }
    }
}

// --- Catalog ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub name: String,
    pub unit: Unit,
    pub carb_per_unit: f64,
    pub note: String,
}

impl FoodItem {
    #[must_use]
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.unit.as_str().to_string(),
            format_number(self.carb_per_unit),
            self.note.clone(),
        ]
    }

    pub fn from_row(row: &[String]) -> Result<Self, BolusError> {
        let cell = |i: usize| row.get(i).map_or("", |s| s.trim());
        let name = cell(0);
        if name.is_empty() {
            return Err(BolusError::InvalidInput("catalog row has no name".into()));
        }
        Ok(Self {
            name: name.to_string(),
            unit: cell(1).parse()?,
            carb_per_unit: parse_decimal(cell(2))?,
            note: cell(3).to_string(),
        })
    }
}

/// A user-entered catalog row before validation.
#[derive(Debug, Clone)]
pub struct NewFoodItem {
    pub name: String,
    pub unit: String,
    pub carb_per_unit: String,
    pub note: String,
}

impl NewFoodItem {
    /// Validate into a `FoodItem`. The carb value may use a comma as decimal point.
    pub fn validate(&self) -> Result<FoodItem, BolusError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(BolusError::InvalidInput("Food name must not be empty".into()));
        }
        let unit: Unit = self.unit.parse()?;
        let carb_per_unit = parse_decimal(&self.carb_per_unit)?;
        if carb_per_unit <= 0.0 {
            return Err(BolusError::InvalidInput(format!(
                "Carbs per unit must be greater than 0 (got {carb_per_unit})"
            )));
        }
        Ok(FoodItem {
            name: name.to_string(),
            unit,
            carb_per_unit,
            note: self.note.trim().to_string(),
        })
    }
}

// --- Session ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalcEntry {
    pub name: String,
    pub amount: f64,
    pub unit: Unit,
    pub carb: f64,
}

// --- Food record log ---

/// One appended line of the food record log. The per-session summary line
/// leaves date, meal, food and amount blank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodRecordLine {
    pub date: Option<NaiveDate>,
    pub meal: Option<Meal>,
    pub food: String,
    pub amount: Option<f64>,
    pub unit: String,
    pub carb: f64,
}

impl FoodRecordLine {
    #[must_use]
    pub fn from_entry(date: NaiveDate, meal: Meal, entry: &CalcEntry) -> Self {
        Self {
            date: Some(date),
            meal: Some(meal),
            food: entry.name.clone(),
            amount: Some(entry.amount),
            unit: entry.unit.as_str().to_string(),
            carb: entry.carb,
        }
    }

    #[must_use]
    pub fn summary(total_carb: f64) -> Self {
        Self {
            date: None,
            meal: None,
            food: String::new(),
            amount: None,
            unit: SUMMARY_UNIT.to_string(),
            carb: total_carb,
        }
    }

    #[must_use]
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.date.map(format_date).unwrap_or_default(),
            self.meal.map(|m| m.as_str().to_string()).unwrap_or_default(),
            self.food.clone(),
            self.amount.map(format_number).unwrap_or_default(),
            self.unit.clone(),
            format_number(self.carb),
        ]
    }
}

// --- Insulin log ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsulinRecord {
    pub date: NaiveDate,
    pub meal: Meal,
    pub total_carb: f64,
    pub current_glucose: f64,
    pub target_glucose: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_glucose: Option<f64>,
    pub carb_ratio: f64,
    pub sensitivity_factor: f64,
    pub carb_dose: f64,
    pub correction_dose: f64,
    pub total_dose: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_carb_ratio: Option<f64>,
}

impl InsulinRecord {
    /// Parse a stored row. Blank required cells read as 0; blank-equivalent
    /// optional cells (`""`, `"0"`, `"0.0"`) read as absent.
    pub fn from_row(row: &[String]) -> Result<Self, BolusError> {
        let cell = |i: usize| row.get(i).map_or("", |s| s.trim());
        let required = |i: usize| -> Result<f64, BolusError> {
            Ok(parse_cell(cell(i))?.unwrap_or(0.0))
        };
        let optional = |i: usize| -> Result<Option<f64>, BolusError> {
            Ok(parse_cell(cell(i))?.filter(|v| *v != 0.0))
        };

        Ok(Self {
            date: parse_date_cell(cell(0))?,
            meal: cell(1).parse()?,
            total_carb: required(2)?,
            current_glucose: required(3)?,
            target_glucose: required(4)?,
            actual_glucose: optional(5)?,
            carb_ratio: required(6)?,
            sensitivity_factor: required(7)?,
            carb_dose: required(8)?,
            correction_dose: required(9)?,
            total_dose: required(10)?,
            suggested_carb_ratio: optional(11)?,
        })
    }
}

/// Candidate for the insulin log. `None` leaves the stored cell untouched
/// when merged into an existing `(date, meal)` row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InsulinPatch {
    pub date: Option<NaiveDate>,
    pub meal: Option<Meal>,
    pub total_carb: Option<f64>,
    pub current_glucose: Option<f64>,
    pub target_glucose: Option<f64>,
    pub actual_glucose: Option<f64>,
    pub carb_ratio: Option<f64>,
    pub sensitivity_factor: Option<f64>,
    pub carb_dose: Option<f64>,
    pub correction_dose: Option<f64>,
    pub total_dose: Option<f64>,
    pub suggested_carb_ratio: Option<f64>,
}

impl InsulinPatch {
    #[must_use]
    pub fn keyed(date: NaiveDate, meal: Meal) -> Self {
        Self {
            date: Some(date),
            meal: Some(meal),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn to_cells(&self) -> Vec<Option<String>> {
        let num = |v: Option<f64>| v.map(format_number);
        vec![
            self.date.map(format_date),
            self.meal.map(|m| m.as_str().to_string()),
            num(self.total_carb),
            num(self.current_glucose),
            num(self.target_glucose),
            num(self.actual_glucose),
            num(self.carb_ratio),
            num(self.sensitivity_factor),
            num(self.carb_dose),
            num(self.correction_dose),
            num(self.total_dose),
            num(self.suggested_carb_ratio),
        ]
    }
}

// --- Parsing / formatting helpers ---

/// Parse a user-entered decimal. Commas are accepted as decimal points.
pub fn parse_decimal(s: &str) -> Result<f64, BolusError> {
    let normalized = s.trim().replace(',', ".");
    match normalized.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(BolusError::InvalidInput(format!(
            "'{}' is not a number",
            s.trim()
        ))),
    }
}

/// Parse a stored numeric cell; an empty cell is `None`.
pub fn parse_cell(s: &str) -> Result<Option<f64>, BolusError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    parse_decimal(s).map(Some)
}

/// Parse a stored date cell. Sheets may hand back `2024/06/15` or `6/15/2024`
/// depending on locale.
pub fn parse_date_cell(s: &str) -> Result<NaiveDate, BolusError> {
    let s = s.trim();
    ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .ok_or_else(|| BolusError::InvalidInput(format!("Cannot parse date: '{s}'")))
}

#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[must_use]
pub fn format_number(v: f64) -> String {
    if v == 0.0 { "0".to_string() } else { v.to_string() }
}

/// Round to `places` decimals on the exact binary value, ties to even.
///
/// Float formatting is correctly rounded, so `0.35` (stored just below) goes
/// down and an exact tie such as `1.25` goes to the even digit.
#[must_use]
pub fn round_to(value: f64, places: usize) -> f64 {
    let rounded = format!("{value:.places$}").parse::<f64>().unwrap_or(value);
    if rounded == 0.0 { 0.0 } else { rounded }
}
