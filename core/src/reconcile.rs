//! Upsert of insulin log rows keyed by `(date, meal)`.
//!
//! A candidate row only overwrites the cells it actually provides, so a later
//! save (say, the post-meal reading) fills in that meal's row without
//! clobbering the dose that was logged earlier.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::error::BolusError;
use crate::models::{INSULIN_HEADER, InsulinPatch, Meal, parse_date_cell};
use crate::sheet::{Sheet, read_with_header};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Merged { row: usize },
    Appended,
}

/// Take each provided candidate cell, otherwise keep the stored one.
#[must_use]
pub fn merge_row(existing: &[String], candidate: &[Option<String>]) -> Vec<String> {
    let width = existing.len().max(candidate.len());
    (0..width)
        .map(|i| match candidate.get(i) {
            Some(Some(v)) => v.clone(),
            _ => existing.get(i).cloned().unwrap_or_default(),
        })
        .collect()
}

fn row_matches(row: &[String], date: NaiveDate, meal: Meal) -> bool {
    let date_ok = row
        .first()
        .is_some_and(|d| parse_date_cell(d).is_ok_and(|d| d == date));
    let meal_ok = row
        .get(1)
        .is_some_and(|m| m.parse::<Meal>().is_ok_and(|m| m == meal));
    date_ok && meal_ok
}

/// 0-based index into `rows` of the first data row keyed `(date, meal)`.
#[must_use]
pub fn find_record_index(rows: &[Vec<String>], date: NaiveDate, meal: Meal) -> Option<usize> {
    rows.iter()
        .enumerate()
        .skip(1)
        .find(|(_, row)| row_matches(row, date, meal))
        .map(|(i, _)| i)
}

/// The write a reconcile will make, worked out before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcilePlan {
    /// Overwrite 1-based `row` with `cells`.
    Merge { row: usize, cells: Vec<String> },
    Append { cells: Vec<String> },
}

fn schema_mismatch(table: &str, expected: usize, found: usize) -> anyhow::Error {
    BolusError::SchemaMismatch {
        table: table.to_string(),
        expected,
        found,
    }
    .into()
}

/// Decide how `patch` lands in `rows` (header first) without touching the
/// sheet. Every schema check happens here, so a caller holding a plan knows
/// the write that follows is well formed.
pub fn plan_reconcile(
    table: &str,
    rows: &[Vec<String>],
    patch: &InsulinPatch,
) -> Result<ReconcilePlan> {
    let (Some(date), Some(meal)) = (patch.date, patch.meal) else {
        return Err(
            BolusError::InvalidInput("insulin record needs both a date and a meal".into()).into(),
        );
    };
    let candidate = patch.to_cells();
    let expected = rows.first().map_or(0, Vec::len);
    if expected != candidate.len() {
        return Err(schema_mismatch(table, expected, candidate.len()));
    }

    match find_record_index(rows, date, meal) {
        Some(idx) => {
            let cells = merge_row(&rows[idx], &candidate);
            if cells.len() != expected {
                return Err(schema_mismatch(table, expected, cells.len()));
            }
            Ok(ReconcilePlan::Merge { row: idx + 1, cells })
        }
        None => Ok(ReconcilePlan::Append {
            cells: merge_row(&[], &candidate),
        }),
    }
}

/// Carry out a plan from [`plan_reconcile`].
pub fn apply_plan(sheet: &dyn Sheet, plan: &ReconcilePlan) -> Result<ReconcileOutcome> {
    match plan {
        ReconcilePlan::Merge { row, cells } => {
            debug!(sheet = sheet.name(), row, "merging insulin record");
            sheet
                .update_row(*row, cells)
                .with_context(|| format!("Failed to update row {row} of {}", sheet.name()))?;
            Ok(ReconcileOutcome::Merged { row: *row })
        }
        ReconcilePlan::Append { cells } => {
            debug!(sheet = sheet.name(), "appending insulin record");
            sheet
                .append_row(cells)
                .with_context(|| format!("Failed to append to {}", sheet.name()))?;
            Ok(ReconcileOutcome::Appended)
        }
    }
}

/// Merge `patch` into the row with the same `(date, meal)`, or append it.
pub fn reconcile(sheet: &dyn Sheet, patch: &InsulinPatch) -> Result<ReconcileOutcome> {
    let rows = read_with_header(sheet, &INSULIN_HEADER)?;
    let plan = plan_reconcile(sheet.name(), &rows, patch)?;
    apply_plan(sheet, &plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InsulinRecord;
    use crate::sheet::{MemorySheet, strings};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn full_patch(date: NaiveDate, meal: Meal) -> InsulinPatch {
        InsulinPatch {
            date: Some(date),
            meal: Some(meal),
            total_carb: Some(60.0),
            current_glucose: Some(180.0),
            target_glucose: Some(100.0),
            actual_glucose: None,
            carb_ratio: Some(10.0),
            sensitivity_factor: Some(50.0),
            carb_dose: Some(6.0),
            correction_dose: Some(1.6),
            total_dose: Some(7.6),
            suggested_carb_ratio: None,
        }
    }

    fn log() -> MemorySheet {
        MemorySheet::with_rows("insulin", vec![strings(&INSULIN_HEADER)])
    }

    #[test]
    fn test_merge_row_keeps_unprovided_cells() {
        let existing = strings(&["a", "b", "c"]);
        let merged = merge_row(&existing, &[None, Some("B".into()), None]);
        assert_eq!(merged, strings(&["a", "B", "c"]));
    }

    #[test]
    fn test_merge_row_pads_short_existing_row() {
        let merged = merge_row(&strings(&["a"]), &[None, None, Some("c".into())]);
        assert_eq!(merged, strings(&["a", "", "c"]));
    }

    #[test]
    fn test_first_save_appends() {
        let sheet = log();
        let outcome = reconcile(&sheet, &full_patch(day(15), Meal::Lunch)).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Appended);
        let rows = sheet.rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].len(), INSULIN_HEADER.len());
        assert_eq!(rows[1][5], "");
    }

    #[test]
    fn test_second_save_with_only_actual_glucose_merges() {
        let sheet = log();
        reconcile(&sheet, &full_patch(day(15), Meal::Lunch)).unwrap();

        let mut later = InsulinPatch::keyed(day(15), Meal::Lunch);
        later.actual_glucose = Some(150.0);
        let outcome = reconcile(&sheet, &later).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Merged { row: 2 });

        let rows = sheet.rows().unwrap();
        assert_eq!(rows.len(), 2);
        let rec = InsulinRecord::from_row(&rows[1]).unwrap();
        assert_eq!(rec.actual_glucose, Some(150.0));
        assert!((rec.total_carb - 60.0).abs() < f64::EPSILON);
        assert!((rec.carb_ratio - 10.0).abs() < f64::EPSILON);
        assert!((rec.total_dose - 7.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_different_meal_or_date_appends() {
        let sheet = log();
        reconcile(&sheet, &full_patch(day(15), Meal::Lunch)).unwrap();
        reconcile(&sheet, &full_patch(day(15), Meal::Dinner)).unwrap();
        reconcile(&sheet, &full_patch(day(16), Meal::Lunch)).unwrap();
        assert_eq!(sheet.rows().unwrap().len(), 4);
    }

    #[test]
    fn test_matches_legacy_meal_label() {
        let sheet = log();
        let mut legacy = strings(&["2024-06-15", "午餐", "60", "180", "100", "", "10", "50"]);
        legacy.extend(strings(&["6", "1.6", "7.6", ""]));
        sheet.append_row(&legacy).unwrap();

        let mut later = InsulinPatch::keyed(day(15), Meal::Lunch);
        later.actual_glucose = Some(140.0);
        assert_eq!(
            reconcile(&sheet, &later).unwrap(),
            ReconcileOutcome::Merged { row: 2 }
        );
        // Key cells are rewritten in canonical form
        assert_eq!(sheet.rows().unwrap()[1][1], "lunch");
    }

    #[test]
    fn test_only_first_match_is_updated() {
        let sheet = log();
        let row = merge_row(&[], &full_patch(day(15), Meal::Lunch).to_cells());
        sheet.append_row(&row).unwrap();
        sheet.append_row(&row).unwrap();

        let mut later = InsulinPatch::keyed(day(15), Meal::Lunch);
        later.actual_glucose = Some(120.0);
        reconcile(&sheet, &later).unwrap();
        let rows = sheet.rows().unwrap();
        assert_eq!(rows[1][5], "120");
        assert_eq!(rows[2][5], "");
    }

    #[test]
    fn test_schema_mismatch_aborts() {
        let sheet = MemorySheet::with_rows(
            "insulin",
            vec![strings(&INSULIN_HEADER[..10])],
        );
        let before = sheet.rows().unwrap();
        let err = reconcile(&sheet, &full_patch(day(15), Meal::Lunch)).unwrap_err();
        assert_eq!(
            BolusError::find(&err),
            Some(&BolusError::SchemaMismatch {
                table: "insulin".into(),
                expected: 10,
                found: 12,
            })
        );
        assert_eq!(sheet.rows().unwrap(), before);
    }

    #[test]
    fn test_overlong_stored_row_is_not_rewritten() {
        let sheet = log();
        let mut wide = merge_row(&[], &full_patch(day(15), Meal::Lunch).to_cells());
        wide.push("stray".into());
        sheet.append_row(&wide).unwrap();

        let mut later = InsulinPatch::keyed(day(15), Meal::Lunch);
        later.actual_glucose = Some(120.0);
        let err = reconcile(&sheet, &later).unwrap_err();
        assert!(BolusError::find(&err).is_some_and(BolusError::is_warning));
        assert_eq!(sheet.rows().unwrap()[1][5], "");
    }

    #[test]
    fn test_plan_merge_carries_full_row() {
        let mut rows = vec![strings(&INSULIN_HEADER)];
        rows.push(merge_row(&[], &full_patch(day(15), Meal::Lunch).to_cells()));

        let mut later = InsulinPatch::keyed(day(15), Meal::Lunch);
        later.actual_glucose = Some(130.0);
        match plan_reconcile("insulin", &rows, &later).unwrap() {
            ReconcilePlan::Merge { row, cells } => {
                assert_eq!(row, 2);
                assert_eq!(cells.len(), INSULIN_HEADER.len());
                assert_eq!(cells[5], "130");
                assert_eq!(cells[2], "60");
            }
            other => panic!("expected merge, got {other:?}"),
        }

        let other_day = plan_reconcile("insulin", &rows, &full_patch(day(16), Meal::Lunch));
        assert!(matches!(other_day.unwrap(), ReconcilePlan::Append { .. }));
    }

    #[test]
    fn test_plan_rejects_overlong_stored_row() {
        let mut wide = merge_row(&[], &full_patch(day(15), Meal::Lunch).to_cells());
        wide.push("stray".into());
        let rows = vec![strings(&INSULIN_HEADER), wide];

        let err = plan_reconcile("insulin", &rows, &full_patch(day(15), Meal::Lunch)).unwrap_err();
        assert_eq!(
            BolusError::find(&err),
            Some(&BolusError::SchemaMismatch {
                table: "insulin".into(),
                expected: 12,
                found: 13,
            })
        );
    }

    #[test]
    fn test_patch_without_key_rejected() {
        let sheet = log();
        assert!(reconcile(&sheet, &InsulinPatch::default()).is_err());
        assert_eq!(sheet.rows().unwrap().len(), 1);
    }
}
