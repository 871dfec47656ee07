use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::{self, UpsertOutcome};
use crate::catalog_import::{self, CatalogImportSummary};
use crate::dose::{self, DoseInputs, DoseResult, RatioSuggestion};
use crate::error::BolusError;
use crate::models::{
    CATALOG_HEADER, CalcEntry, FOOD_RECORD_HEADER, FoodItem, FoodRecordLine, INSULIN_HEADER,
    InsulinPatch, InsulinRecord, Meal, NewFoodItem,
};
use crate::reconcile::{self, ReconcileOutcome};
use crate::session::CarbSession;
use crate::sheet::{MemorySheet, Sheet, read_with_header};

/// Glucose readings and personal ratios entered alongside a meal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DoseForm {
    pub current_glucose: f64,
    pub target_glucose: f64,
    pub carb_ratio: f64,
    pub sensitivity_factor: f64,
    pub actual_glucose: Option<f64>,
}

impl DoseForm {
    #[must_use]
    pub fn inputs(&self, total_carb: f64) -> DoseInputs {
        DoseInputs {
            total_carb,
            current_glucose: self.current_glucose,
            target_glucose: self.target_glucose,
            carb_ratio: self.carb_ratio,
            sensitivity_factor: self.sensitivity_factor,
            actual_glucose: self.actual_glucose,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedMeal {
    pub date: NaiveDate,
    pub meal: Meal,
    pub total_carb: f64,
    pub dose: DoseResult,
    pub entries: Vec<CalcEntry>,
    pub food_lines_written: usize,
    pub record: ReconcileOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActualGlucoseUpdate {
    pub date: NaiveDate,
    pub meal: Meal,
    pub actual_glucose: f64,
    pub suggestion: RatioSuggestion,
    pub record: ReconcileOutcome,
}

/// The three tables a user works against: food catalog, food record log and
/// insulin log.
pub struct BolusService {
    catalog: Box<dyn Sheet>,
    food_log: Box<dyn Sheet>,
    insulin_log: Box<dyn Sheet>,
}

impl BolusService {
    pub fn new(
        catalog: Box<dyn Sheet>,
        food_log: Box<dyn Sheet>,
        insulin_log: Box<dyn Sheet>,
    ) -> Self {
        Self {
            catalog,
            food_log,
            insulin_log,
        }
    }

    #[must_use]
    pub fn new_in_memory() -> Self {
        Self::new(
            Box::new(MemorySheet::new("catalog")),
            Box::new(MemorySheet::new("food_records")),
            Box::new(MemorySheet::new("insulin_records")),
        )
    }

    /// Write headers into any table that is still empty.
    pub fn bootstrap(&self) -> Result<()> {
        read_with_header(self.catalog.as_ref(), &CATALOG_HEADER)?;
        read_with_header(self.food_log.as_ref(), &FOOD_RECORD_HEADER)?;
        read_with_header(self.insulin_log.as_ref(), &INSULIN_HEADER)?;
        Ok(())
    }

    // --- Catalog ---

    pub fn upsert_food(&self, food: &NewFoodItem) -> Result<(FoodItem, UpsertOutcome)> {
        catalog::upsert_food(self.catalog.as_ref(), food)
    }

    pub fn search_foods(&self, keyword: &str) -> Result<Vec<FoodItem>> {
        catalog::search_foods(self.catalog.as_ref(), keyword)
    }

    pub fn list_foods(&self) -> Result<Vec<FoodItem>> {
        catalog::list_foods(self.catalog.as_ref())
    }

    pub fn get_food(&self, name: &str) -> Result<Option<FoodItem>> {
        catalog::get_food(self.catalog.as_ref(), name)
    }

    pub fn resolve_food(&self, query: &str) -> Result<FoodItem> {
        catalog::resolve_food(self.catalog.as_ref(), query)
    }

    pub fn import_catalog_csv(&self, csv_data: &str, dry_run: bool) -> Result<CatalogImportSummary> {
        let rows = catalog_import::parse_catalog_csv(csv_data.as_bytes())?;
        catalog_import::import_catalog(self.catalog.as_ref(), &rows, dry_run)
    }

    // --- Session ---

    /// Look `query` up in the catalog and add `amount` of it to the session.
    pub fn add_to_session(
        &self,
        session: &mut CarbSession,
        query: &str,
        amount: f64,
    ) -> Result<CalcEntry> {
        let food = self.resolve_food(query)?;
        let entry = session.add(&food, amount)?;
        Ok(entry.clone())
    }

    // --- Dosing ---

    pub fn preview_dose(&self, session: &CarbSession, form: &DoseForm) -> Result<DoseResult> {
        Ok(dose::calculate_dose(&form.inputs(session.total()))?)
    }

    /// Compute the dose for the session, log its foods, upsert the insulin
    /// record for `(date, meal)` and clear the session.
    ///
    /// Nothing is written when the dose cannot be computed or the insulin log
    /// row cannot be merged: the insulin write is planned before any food line
    /// is appended.
    pub fn save_meal(
        &self,
        session: &mut CarbSession,
        date: NaiveDate,
        meal: Meal,
        form: &DoseForm,
    ) -> Result<SavedMeal> {
        let total_carb = session.total();
        let dose = dose::calculate_dose(&form.inputs(total_carb))?;
        let patch = InsulinPatch {
            total_carb: Some(total_carb),
            current_glucose: Some(form.current_glucose),
            target_glucose: Some(form.target_glucose),
            actual_glucose: form.actual_glucose.filter(|g| *g > 0.0),
            carb_ratio: Some(form.carb_ratio),
            sensitivity_factor: Some(form.sensitivity_factor),
            carb_dose: Some(dose.carb_dose),
            correction_dose: Some(dose.correction_dose),
            total_dose: Some(dose.total_dose),
            suggested_carb_ratio: dose.suggested_carb_ratio(),
            ..InsulinPatch::keyed(date, meal)
        };
        let insulin_rows = read_with_header(self.insulin_log.as_ref(), &INSULIN_HEADER)?;
        let plan = reconcile::plan_reconcile(self.insulin_log.name(), &insulin_rows, &patch)?;
        read_with_header(self.food_log.as_ref(), &FOOD_RECORD_HEADER)?;

        let mut food_lines_written = 0;
        if !session.is_empty() {
            let lines = session
                .entries()
                .iter()
                .map(|e| FoodRecordLine::from_entry(date, meal, e))
                .chain(std::iter::once(FoodRecordLine::summary(total_carb)));
            for line in lines {
                self.food_log
                    .append_row(&line.to_row())
                    .context("Failed to append to the food record log")?;
                food_lines_written += 1;
            }
        }

        let record = reconcile::apply_plan(self.insulin_log.as_ref(), &plan)?;

        info!(%date, %meal, total_carb, total_dose = dose.total_dose, "meal saved");
        let entries = session.entries().to_vec();
        session.clear();

        Ok(SavedMeal {
            date,
            meal,
            total_carb,
            dose,
            entries,
            food_lines_written,
            record,
        })
    }

    /// Fill in the post-meal reading for an already logged meal and derive a
    /// carb ratio suggestion from the stored dose.
    pub fn record_actual_glucose(
        &self,
        date: NaiveDate,
        meal: Meal,
        actual_glucose: f64,
    ) -> Result<ActualGlucoseUpdate> {
        if !actual_glucose.is_finite() || actual_glucose <= 0.0 {
            return Err(BolusError::InvalidInput(format!(
                "Post-meal glucose must be greater than 0 (got {actual_glucose})"
            ))
            .into());
        }
        let stored = self
            .get_record(date, meal)?
            .ok_or_else(|| BolusError::NotFound(format!("No {meal} record on {date}")))?;

        let suggestion = dose::suggest_carb_ratio(
            stored.total_carb,
            stored.total_dose,
            stored.target_glucose,
            stored.sensitivity_factor,
            actual_glucose,
        )?;

        let mut patch = InsulinPatch::keyed(date, meal);
        patch.actual_glucose = Some(actual_glucose);
        if let RatioSuggestion::Suggested { carb_ratio } = suggestion {
            patch.suggested_carb_ratio = Some(carb_ratio);
        }
        let record = reconcile::reconcile(self.insulin_log.as_ref(), &patch)?;

        Ok(ActualGlucoseUpdate {
            date,
            meal,
            actual_glucose,
            suggestion,
            record,
        })
    }

    // --- Insulin log queries ---

    pub fn list_records(&self, date: Option<NaiveDate>) -> Result<Vec<InsulinRecord>> {
        let rows = read_with_header(self.insulin_log.as_ref(), &INSULIN_HEADER)?;
        Ok(rows
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(i, row)| match InsulinRecord::from_row(row) {
                Ok(rec) => Some(rec),
                Err(e) => {
                    debug!(row = i + 1, error = %e, "skipping insulin log row");
                    None
                }
            })
            .filter(|rec| date.is_none_or(|d| rec.date == d))
            .collect())
    }

    pub fn get_record(&self, date: NaiveDate, meal: Meal) -> Result<Option<InsulinRecord>> {
        let rows = read_with_header(self.insulin_log.as_ref(), &INSULIN_HEADER)?;
        match reconcile::find_record_index(&rows, date, meal) {
            Some(idx) => Ok(Some(InsulinRecord::from_row(&rows[idx])?)),
            None => Ok(None),
        }
    }

    /// Most recent suggested carb ratio logged for `meal`, scanning newest first.
    pub fn last_suggested_ratio(&self, meal: Meal) -> Result<Option<f64>> {
        let rows = read_with_header(self.insulin_log.as_ref(), &INSULIN_HEADER)?;
        Ok(rows
            .iter()
            .skip(1)
            .rev()
            .filter_map(|row| InsulinRecord::from_row(row).ok())
            .filter(|rec| rec.meal == meal)
            .find_map(|rec| rec.suggested_carb_ratio))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::strings;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn form() -> DoseForm {
        DoseForm {
            current_glucose: 180.0,
            target_glucose: 100.0,
            carb_ratio: 10.0,
            sensitivity_factor: 50.0,
            actual_glucose: None,
        }
    }

    fn seeded_service() -> BolusService {
        let catalog = MemorySheet::with_rows(
            "catalog",
            vec![
                strings(&CATALOG_HEADER),
                strings(&["White rice", "g", "0.3", ""]),
                strings(&["Milk", "ml", "0.05", ""]),
            ],
        );
        BolusService::new(
            Box::new(catalog),
            Box::new(MemorySheet::new("food_records")),
            Box::new(MemorySheet::new("insulin_records")),
        )
    }

    fn sixty_gram_session(svc: &BolusService) -> CarbSession {
        let mut session = CarbSession::new();
        svc.add_to_session(&mut session, "rice", 150.0).unwrap();
        svc.add_to_session(&mut session, "Milk", 300.0).unwrap();
        session
    }

    #[test]
    fn test_save_meal_end_to_end() {
        let svc = seeded_service();
        let mut session = sixty_gram_session(&svc);
        assert!((session.total() - 60.0).abs() < 1e-9);

        let saved = svc
            .save_meal(&mut session, day(15), Meal::Lunch, &form())
            .unwrap();
        assert!((saved.dose.carb_dose - 6.0).abs() < 1e-9);
        assert!((saved.dose.correction_dose - 1.6).abs() < 1e-9);
        assert!((saved.dose.total_dose - 7.6).abs() < 1e-9);
        assert_eq!(saved.food_lines_written, 3);
        assert_eq!(saved.record, ReconcileOutcome::Appended);
        assert!(session.is_empty());

        let records = svc.list_records(None).unwrap();
        assert_eq!(records.len(), 1);
        assert!((records[0].total_carb - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_food_lines_always_append() {
        let svc = seeded_service();
        let mut session = sixty_gram_session(&svc);
        svc.save_meal(&mut session, day(15), Meal::Lunch, &form())
            .unwrap();
        let mut session = sixty_gram_session(&svc);
        let saved = svc
            .save_meal(&mut session, day(15), Meal::Lunch, &form())
            .unwrap();
        assert_eq!(saved.record, ReconcileOutcome::Merged { row: 2 });
        assert_eq!(svc.list_records(None).unwrap().len(), 1);
        // header + 2 x (2 foods + summary)
        assert_eq!(svc.food_log.read_all().unwrap().len(), 7);
    }

    #[test]
    fn test_division_by_zero_writes_nothing() {
        let svc = seeded_service();
        let mut session = sixty_gram_session(&svc);
        let mut bad = form();
        bad.sensitivity_factor = 0.0;

        let err = svc
            .save_meal(&mut session, day(15), Meal::Lunch, &bad)
            .unwrap_err();
        assert_eq!(
            BolusError::find(&err),
            Some(&BolusError::DivisionByZero { field: "ISF" })
        );
        assert_eq!(session.len(), 2);
        assert!(svc.list_records(None).unwrap().is_empty());
        assert!(svc.food_log.read_all().unwrap().len() <= 1);
    }

    #[test]
    fn test_schema_mismatch_writes_no_food_lines() {
        let svc = BolusService::new(
            Box::new(MemorySheet::with_rows(
                "catalog",
                vec![strings(&CATALOG_HEADER), strings(&["Rice", "g", "0.3", ""])],
            )),
            Box::new(MemorySheet::new("food_records")),
            Box::new(MemorySheet::with_rows(
                "insulin_records",
                vec![strings(&INSULIN_HEADER[..10])],
            )),
        );
        let mut session = CarbSession::new();
        svc.add_to_session(&mut session, "Rice", 100.0).unwrap();

        let err = svc
            .save_meal(&mut session, day(15), Meal::Dinner, &form())
            .unwrap_err();
        assert!(matches!(
            BolusError::find(&err),
            Some(BolusError::SchemaMismatch { .. })
        ));
        assert_eq!(session.len(), 1);
        assert!(svc.food_log.read_all().unwrap().len() <= 1);
    }

    #[test]
    fn test_overlong_stored_record_writes_no_food_lines() {
        let svc = seeded_service();
        let mut wide = strings(&["2024-06-15", "lunch", "60", "180", "100", "", "10", "50"]);
        wide.extend(strings(&["6", "1.6", "7.6", "", "stray"]));
        svc.insulin_log.append_row(&strings(&INSULIN_HEADER)).unwrap();
        svc.insulin_log.append_row(&wide).unwrap();
        let mut session = CarbSession::new();
        svc.add_to_session(&mut session, "rice", 100.0).unwrap();

        let err = svc
            .save_meal(&mut session, day(15), Meal::Lunch, &form())
            .unwrap_err();
        assert!(matches!(
            BolusError::find(&err),
            Some(BolusError::SchemaMismatch { expected: 12, found: 13, .. })
        ));
        assert_eq!(session.len(), 1);
        assert!(svc.food_log.read_all().unwrap().len() <= 1);
        assert_eq!(svc.insulin_log.read_all().unwrap()[1], wide);
    }

    #[test]
    fn test_empty_session_saves_correction_only() {
        let svc = seeded_service();
        let mut session = CarbSession::new();
        let saved = svc
            .save_meal(&mut session, day(15), Meal::LateNight, &form())
            .unwrap();
        assert_eq!(saved.food_lines_written, 0);
        assert!((saved.dose.total_dose - 1.6).abs() < 1e-9);
    }

    #[test]
    fn test_record_actual_glucose_merges() {
        let svc = seeded_service();
        let mut session = sixty_gram_session(&svc);
        svc.save_meal(&mut session, day(15), Meal::Lunch, &form())
            .unwrap();

        let update = svc
            .record_actual_glucose(day(15), Meal::Lunch, 150.0)
            .unwrap();
        assert_eq!(update.record, ReconcileOutcome::Merged { row: 2 });
        assert_eq!(
            update.suggestion,
            RatioSuggestion::Suggested { carb_ratio: 9.09 }
        );

        let rec = svc.get_record(day(15), Meal::Lunch).unwrap().unwrap();
        assert_eq!(rec.actual_glucose, Some(150.0));
        assert_eq!(rec.suggested_carb_ratio, Some(9.09));
        assert!((rec.total_dose - 7.6).abs() < 1e-9);
        assert!((rec.current_glucose - 180.0).abs() < 1e-9);
        assert_eq!(svc.list_records(None).unwrap().len(), 1);
    }

    #[test]
    fn test_record_actual_glucose_anomalous_keeps_ratio_blank() {
        let svc = seeded_service();
        let mut session = CarbSession::new();
        svc.add_to_session(&mut session, "Milk", 200.0).unwrap();
        let mut f = form();
        f.current_glucose = 100.0;
        svc.save_meal(&mut session, day(15), Meal::Breakfast, &f)
            .unwrap();

        let update = svc
            .record_actual_glucose(day(15), Meal::Breakfast, 300.0)
            .unwrap();
        assert!(matches!(
            update.suggestion,
            RatioSuggestion::Anomalous { .. }
        ));
        let rec = svc.get_record(day(15), Meal::Breakfast).unwrap().unwrap();
        assert_eq!(rec.actual_glucose, Some(300.0));
        assert!(rec.suggested_carb_ratio.is_none());
    }

    #[test]
    fn test_record_actual_glucose_missing_record() {
        let svc = seeded_service();
        let err = svc
            .record_actual_glucose(day(15), Meal::Dinner, 140.0)
            .unwrap_err();
        assert!(matches!(
            BolusError::find(&err),
            Some(BolusError::NotFound(_))
        ));
        assert!(svc.record_actual_glucose(day(15), Meal::Dinner, 0.0).is_err());
    }

    #[test]
    fn test_last_suggested_ratio_newest_first() {
        let svc = seeded_service();
        assert!(svc.last_suggested_ratio(Meal::Lunch).unwrap().is_none());

        for (d, actual) in [(14, 150.0), (15, 120.0)] {
            let mut session = sixty_gram_session(&svc);
            let mut f = form();
            f.actual_glucose = Some(actual);
            svc.save_meal(&mut session, day(d), Meal::Lunch, &f).unwrap();
        }
        let mut session = sixty_gram_session(&svc);
        svc.save_meal(&mut session, day(16), Meal::Lunch, &form())
            .unwrap();

        // 16th has no suggestion; 15th: implied = 7.6 - 20 / 50 = 7.2, 60 / 7.2 = 8.33
        assert_eq!(svc.last_suggested_ratio(Meal::Lunch).unwrap(), Some(8.33));
        assert!(svc.last_suggested_ratio(Meal::Dinner).unwrap().is_none());
    }

    #[test]
    fn test_list_records_by_date() {
        let svc = seeded_service();
        for (d, meal) in [(14, Meal::Lunch), (15, Meal::Lunch), (15, Meal::Dinner)] {
            let mut session = CarbSession::new();
            svc.save_meal(&mut session, day(d), meal, &form()).unwrap();
        }
        assert_eq!(svc.list_records(None).unwrap().len(), 3);
        assert_eq!(svc.list_records(Some(day(15))).unwrap().len(), 2);
        assert!(svc.list_records(Some(day(1))).unwrap().is_empty());
    }

    #[test]
    fn test_bootstrap_writes_headers() {
        let svc = BolusService::new_in_memory();
        svc.bootstrap().unwrap();
        assert_eq!(
            svc.insulin_log.read_all().unwrap()[0],
            strings(&INSULIN_HEADER)
        );
        assert_eq!(svc.catalog.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_then_search() {
        let svc = BolusService::new_in_memory();
        svc.upsert_food(&NewFoodItem {
            name: "Toast".into(),
            unit: "g".into(),
            carb_per_unit: "0.5".into(),
            note: String::new(),
        })
        .unwrap();
        assert_eq!(svc.search_foods("oas").unwrap().len(), 1);
        assert!(svc.get_food("Toast").unwrap().is_some());
    }
}
