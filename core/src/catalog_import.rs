use std::collections::HashSet;
use std::io::Read;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::warn;

use crate::catalog::{UpsertOutcome, list_foods, write_food};
use crate::models::NewFoodItem;
use crate::sheet::Sheet;

/// Summary of what a catalog import would do / did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogImportSummary {
    pub rows_parsed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: Vec<SkippedRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedRow {
    pub line: usize,
    pub reason: String,
}

/// Parse a catalog CSV from any reader.
///
/// Expected header: `name,unit,carb_per_unit,note`. `note` is optional and
/// column order does not matter.
pub fn parse_catalog_csv<R: Read>(reader: R) -> Result<Vec<(usize, NewFoodItem)>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();
    let col =
        |name: &str| -> Option<usize> { headers.iter().position(|h| h.eq_ignore_ascii_case(name)) };

    for name in ["name", "unit", "carb_per_unit"] {
        if col(name).is_none() {
            bail!("Missing required column: {name}");
        }
    }
    let idx_name = col("name").context("Missing 'name' column")?;
    let idx_unit = col("unit").context("Missing 'unit' column")?;
    let idx_carb = col("carb_per_unit").context("Missing 'carb_per_unit' column")?;
    let idx_note = col("note");

    let mut rows = Vec::new();
    for (n, result) in rdr.records().enumerate() {
        let line = n + 2;
        let record = result.with_context(|| format!("Failed to parse CSV row {line}"))?;
        let get = |i: usize| record.get(i).unwrap_or("").to_string();

        if get(idx_name).is_empty() && get(idx_carb).is_empty() {
            continue;
        }
        rows.push((
            line,
            NewFoodItem {
                name: get(idx_name),
                unit: get(idx_unit),
                carb_per_unit: get(idx_carb),
                note: idx_note.map(get).unwrap_or_default(),
            },
        ));
    }
    Ok(rows)
}

/// Upsert parsed rows into the catalog. Invalid rows are skipped and
/// reported; when `dry_run` is true nothing is written.
pub fn import_catalog(
    sheet: &dyn Sheet,
    rows: &[(usize, NewFoodItem)],
    dry_run: bool,
) -> Result<CatalogImportSummary> {
    let mut summary = CatalogImportSummary {
        rows_parsed: rows.len(),
        ..CatalogImportSummary::default()
    };
    let mut known: HashSet<String> = list_foods(sheet)?.into_iter().map(|f| f.name).collect();

    for (line, row) in rows {
        let item = match row.validate() {
            Ok(item) => item,
            Err(e) => {
                warn!(line, error = %e, "skipping catalog import row");
                summary.skipped.push(SkippedRow {
                    line: *line,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if dry_run {
            if known.insert(item.name.clone()) {
                summary.inserted += 1;
            } else {
                summary.updated += 1;
            }
            continue;
        }

        match write_food(sheet, &item)? {
            UpsertOutcome::Inserted => summary.inserted += 1,
            UpsertOutcome::Updated { .. } => summary.updated += 1,
        }
        known.insert(item.name);
    }

    Ok(summary)
}
