use anyhow::{Context, Result};
use std::path::Path;
use std::process;

use bolus_core::BolusService;
use bolus_core::catalog::UpsertOutcome;
use bolus_core::models::NewFoodItem;

use super::helpers::print_food_table;

pub(crate) fn cmd_food_add(
    svc: &BolusService,
    name: &str,
    unit: &str,
    carb: &str,
    note: Option<String>,
    json: bool,
) -> Result<()> {
    let (food, outcome) = svc.upsert_food(&NewFoodItem {
        name: name.to_string(),
        unit: unit.to_string(),
        carb_per_unit: carb.to_string(),
        note: note.unwrap_or_default(),
    })?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "food": food,
                "outcome": outcome,
            }))?
        );
    } else {
        let verb = match outcome {
            UpsertOutcome::Inserted => "Added",
            UpsertOutcome::Updated { .. } => "Updated",
        };
        let name = &food.name;
        let carb = food.carb_per_unit;
        let unit = food.unit;
        println!("{verb} food: {name} ({carb} g carbs per {unit})");
    }

    Ok(())
}

pub(crate) fn cmd_food_search(svc: &BolusService, keyword: Option<&str>, json: bool) -> Result<()> {
    let foods = match keyword {
        Some(k) => svc.search_foods(k)?,
        None => svc.list_foods()?,
    };

    if foods.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No foods found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&foods)?);
    } else {
        print_food_table(&foods);
    }

    Ok(())
}

pub(crate) fn cmd_food_import(
    svc: &BolusService,
    file: &Path,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let summary = svc.import_catalog_csv(&data, dry_run)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let prefix = if dry_run { "Would import" } else { "Imported" };
    println!(
        "{prefix} {} rows: {} added, {} updated, {} skipped",
        summary.rows_parsed,
        summary.inserted,
        summary.updated,
        summary.skipped.len()
    );
    for skipped in &summary.skipped {
        eprintln!("  line {}: {}", skipped.line, skipped.reason);
    }

    Ok(())
}
