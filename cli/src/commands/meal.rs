use anyhow::{Context, Result};
use std::process;

use bolus_core::dose::{DoseResult, RatioSuggestion};
use bolus_core::models::Meal;
use bolus_core::reconcile::ReconcileOutcome;
use bolus_core::service::DoseForm;
use bolus_core::{BolusService, CarbSession};

use crate::config::Defaults;

use super::helpers::{parse_date, parse_item, print_session_table};

/// Flags of the `dose` command, before config defaults are applied.
pub(crate) struct DoseArgs {
    pub items: Vec<String>,
    pub meal: String,
    pub date: Option<String>,
    pub current: f64,
    pub target: Option<f64>,
    pub ci: Option<f64>,
    pub isf: Option<f64>,
    pub actual: Option<f64>,
    pub use_suggested_ratio: bool,
    pub save: bool,
    pub json: bool,
}

fn build_session(svc: &BolusService, items: &[String]) -> Result<CarbSession> {
    let mut session = CarbSession::new();
    for item in items {
        let (name, amount) = parse_item(item)?;
        svc.add_to_session(&mut session, &name, amount)
            .with_context(|| format!("Could not add '{item}'"))?;
    }
    Ok(session)
}

pub(crate) fn cmd_calc(svc: &BolusService, items: &[String], json: bool) -> Result<()> {
    let session = build_session(svc, items)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "entries": session.entries(),
                "total_carb": session.total(),
            }))?
        );
    } else {
        print_session_table(session.entries(), session.total());
    }

    Ok(())
}

fn resolve_form(svc: &BolusService, args: &DoseArgs, meal: Meal, defaults: &Defaults) -> Result<DoseForm> {
    let suggested = if args.use_suggested_ratio && args.ci.is_none() {
        let last = svc.last_suggested_ratio(meal)?;
        if last.is_none() {
            eprintln!("Note: no suggested C/I logged for {meal} yet");
        }
        last
    } else {
        None
    };

    let carb_ratio = args
        .ci
        .or(suggested)
        .or(defaults.carb_ratio)
        .context("No C/I given. Pass --ci or set defaults.carb_ratio in the config file")?;
    let sensitivity_factor = args
        .isf
        .or(defaults.sensitivity_factor)
        .context("No ISF given. Pass --isf or set defaults.sensitivity_factor in the config file")?;

    Ok(DoseForm {
        current_glucose: args.current,
        target_glucose: args.target.unwrap_or(defaults.target_glucose),
        carb_ratio,
        sensitivity_factor,
        actual_glucose: args.actual,
    })
}

fn print_dose(dose: &DoseResult) {
    let carb = dose.carb_dose;
    let correction = dose.correction_dose;
    let total = dose.total_dose;
    println!("Carb dose: {carb:.1}U, correction: {correction:.1}U, total: {total:.1}U");
    print_suggestion(dose.suggestion.as_ref());
}

fn print_suggestion(suggestion: Option<&RatioSuggestion>) {
    match suggestion {
        Some(RatioSuggestion::Suggested { carb_ratio }) => {
            println!("Suggested C/I: {carb_ratio:.2} (review before adopting)");
        }
        Some(RatioSuggestion::Anomalous {
            implied_carb_insulin,
        }) => {
            eprintln!(
                "Warning: anomalous post-meal result (implied carb insulin {implied_carb_insulin:.2}U), no C/I suggested"
            );
        }
        None => {}
    }
}

pub(crate) fn cmd_dose(svc: &BolusService, args: &DoseArgs, defaults: &Defaults) -> Result<()> {
    let meal: Meal = args.meal.parse()?;
    let date = parse_date(args.date.clone())?;
    let mut session = build_session(svc, &args.items)?;
    let form = resolve_form(svc, args, meal, defaults)?;

    if !args.save {
        let dose = svc.preview_dose(&session, &form)?;
        if args.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "date": date,
                    "meal": meal,
                    "entries": session.entries(),
                    "total_carb": session.total(),
                    "form": form,
                    "dose": dose,
                }))?
            );
        } else {
            if !session.is_empty() {
                print_session_table(session.entries(), session.total());
            }
            print_dose(&dose);
            println!("(not saved; pass --save to log it)");
        }
        return Ok(());
    }

    let saved = svc.save_meal(&mut session, date, meal, &form)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else {
        if !saved.entries.is_empty() {
            print_session_table(&saved.entries, saved.total_carb);
        }
        print_dose(&saved.dose);
        let action = match saved.record {
            ReconcileOutcome::Appended => "Logged",
            ReconcileOutcome::Merged { .. } => "Updated",
        };
        println!("{action} {meal} on {date}");
    }

    Ok(())
}

pub(crate) fn cmd_actual(
    svc: &BolusService,
    meal: &str,
    date: Option<String>,
    glucose: f64,
    json: bool,
) -> Result<()> {
    let meal: Meal = meal.parse()?;
    let date = parse_date(date)?;
    let update = svc.record_actual_glucose(date, meal, glucose)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&update)?);
    } else {
        println!("Recorded post-meal glucose {glucose} for {meal} on {date}");
        print_suggestion(Some(&update.suggestion));
    }

    Ok(())
}

pub(crate) fn cmd_ratio(svc: &BolusService, meal: &str, json: bool) -> Result<()> {
    let meal: Meal = meal.parse()?;
    let ratio = svc.last_suggested_ratio(meal)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "meal": meal,
                "suggested_carb_ratio": ratio,
            }))?
        );
        return Ok(());
    }

    match ratio {
        Some(r) => println!("Last suggested C/I for {meal}: {r:.2}"),
        None => {
            eprintln!("No suggested C/I logged for {meal}");
            process::exit(2);
        }
    }

    Ok(())
}
