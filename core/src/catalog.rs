use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::BolusError;
use crate::models::{CATALOG_HEADER, FoodItem, NewFoodItem};
use crate::sheet::{Sheet, read_with_header};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated { row: usize },
}

/// All parseable catalog rows, in sheet order.
pub fn list_foods(sheet: &dyn Sheet) -> Result<Vec<FoodItem>> {
    let rows = read_with_header(sheet, &CATALOG_HEADER)?;
    Ok(rows
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(i, row)| match FoodItem::from_row(row) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(sheet = sheet.name(), row = i + 1, error = %e, "skipping catalog row");
                None
            }
        })
        .collect())
}

/// Foods whose name contains `keyword`. An empty keyword matches everything.
pub fn search_foods(sheet: &dyn Sheet, keyword: &str) -> Result<Vec<FoodItem>> {
    let keyword = keyword.trim();
    Ok(list_foods(sheet)?
        .into_iter()
        .filter(|f| f.name.contains(keyword))
        .collect())
}

pub fn get_food(sheet: &dyn Sheet, name: &str) -> Result<Option<FoodItem>> {
    let name = name.trim();
    Ok(list_foods(sheet)?.into_iter().find(|f| f.name == name))
}

/// Insert a food, or overwrite the row with the same name in place.
///
/// Validation happens before the sheet is read, so invalid input never
/// touches the catalog.
pub fn upsert_food(sheet: &dyn Sheet, food: &NewFoodItem) -> Result<(FoodItem, UpsertOutcome)> {
    let item = food.validate()?;
    let outcome = write_food(sheet, &item)?;
    Ok((item, outcome))
}

pub(crate) fn write_food(sheet: &dyn Sheet, item: &FoodItem) -> Result<UpsertOutcome> {
    let rows = read_with_header(sheet, &CATALOG_HEADER)?;
    let existing = rows
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, row)| row.first().is_some_and(|n| n.trim() == item.name));

    if let Some((idx, _)) = existing {
        let row = idx + 1;
        debug!(sheet = sheet.name(), name = %item.name, row, "overwriting catalog row");
        sheet
            .update_row(row, &item.to_row())
            .with_context(|| format!("Failed to update '{}' in the catalog", item.name))?;
        Ok(UpsertOutcome::Updated { row })
    } else {
        debug!(sheet = sheet.name(), name = %item.name, "appending catalog row");
        sheet
            .append_row(&item.to_row())
            .with_context(|| format!("Failed to add '{}' to the catalog", item.name))?;
        Ok(UpsertOutcome::Inserted)
    }
}

/// Resolve a food query: exact name first, then a unique substring match.
pub fn resolve_food(sheet: &dyn Sheet, query: &str) -> Result<FoodItem> {
    let query = query.trim();
    let foods = list_foods(sheet)?;
    if let Some(exact) = foods.iter().find(|f| f.name == query) {
        return Ok(exact.clone());
    }
    let mut matches: Vec<FoodItem> = foods
        .into_iter()
        .filter(|f| f.name.contains(query))
        .collect();
    match matches.len() {
        0 => Err(BolusError::NotFound(format!("No food in the catalog matches '{query}'")).into()),
        1 => Ok(matches.remove(0)),
        _ => {
            let names: Vec<&str> = matches.iter().map(|f| f.name.as_str()).collect();
            Err(BolusError::InvalidInput(format!(
                "'{query}' matches several foods: {}",
                names.join(", ")
            ))
            .into())
        }
    }
}
