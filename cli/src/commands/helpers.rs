use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use bolus_core::models::{CalcEntry, FoodItem, InsulinRecord, parse_decimal};

/// Split `NAME=AMOUNT` on the last `=`. The amount may carry a `g` or `ml`
/// suffix and use a comma as decimal point.
pub(crate) fn parse_item(s: &str) -> Result<(String, f64)> {
    let (name, amount) = s
        .rsplit_once('=')
        .with_context(|| format!("Invalid item '{s}'. Use NAME=AMOUNT, e.g. 'rice=150'"))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("Invalid item '{s}': missing food name");
    }
    Ok((name.to_string(), parse_amount(amount)?))
}

pub(crate) fn parse_amount(s: &str) -> Result<f64> {
    let trimmed = s.trim();
    let number = trimmed
        .strip_suffix("ml")
        .or_else(|| trimmed.strip_suffix('g'))
        .unwrap_or(trimmed);
    let value = parse_decimal(number)
        .with_context(|| format!("Invalid amount: '{trimmed}'. Use a number like '150' or '150g'"))?;
    if value < 0.0 {
        bail!("Amount must not be negative");
    }
    Ok(value)
}

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

pub(crate) fn print_food_table(foods: &[FoodItem]) {
    #[derive(Tabled)]
    struct FoodRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Carb/unit (g)")]
        carb: String,
        #[tabled(rename = "Note")]
        note: String,
    }

    let rows: Vec<FoodRow> = foods
        .iter()
        .map(|f| FoodRow {
            name: truncate(&f.name, 35),
            unit: f.unit.to_string(),
            carb: format!("{}", f.carb_per_unit),
            note: truncate(&f.note, 30),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_session_table(entries: &[CalcEntry], total: f64) {
    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Food")]
        name: String,
        #[tabled(rename = "Amount")]
        amount: String,
        #[tabled(rename = "Carb (g)")]
        carb: String,
    }

    let rows: Vec<EntryRow> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| EntryRow {
            idx: i + 1,
            name: truncate(&e.name, 35),
            amount: format!("{}{}", e.amount, e.unit),
            carb: format!("{:.2}", e.carb),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    println!("Total carbs: {total:.2} g");
}

pub(crate) fn print_records_table(records: &[InsulinRecord]) {
    #[derive(Tabled)]
    struct RecordRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "BG")]
        current: String,
        #[tabled(rename = "Target")]
        target: String,
        #[tabled(rename = "After")]
        actual: String,
        #[tabled(rename = "C/I")]
        ci: String,
        #[tabled(rename = "ISF")]
        isf: String,
        #[tabled(rename = "Dose (U)")]
        dose: String,
        #[tabled(rename = "Suggested C/I")]
        suggested: String,
    }

    let rows: Vec<RecordRow> = records
        .iter()
        .map(|r| RecordRow {
            date: r.date.format("%Y-%m-%d").to_string(),
            meal: r.meal.to_string(),
            carbs: format!("{}", r.total_carb),
            current: format!("{}", r.current_glucose),
            target: format!("{}", r.target_glucose),
            actual: r.actual_glucose.map_or("-".into(), |v| format!("{v}")),
            ci: format!("{}", r.carb_ratio),
            isf: format!("{}", r.sensitivity_factor),
            dose: format!(
                "{:.1} = {:.1} + {:.1}",
                r.total_dose, r.carb_dose, r.correction_dose
            ),
            suggested: r.suggested_carb_ratio.map_or("-".into(), |v| format!("{v:.2}")),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..10)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
