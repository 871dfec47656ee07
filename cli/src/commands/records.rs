use anyhow::Result;
use std::process;

use bolus_core::BolusService;

use super::helpers::{parse_date, print_records_table};

pub(crate) fn cmd_records(svc: &BolusService, date: Option<String>, json: bool) -> Result<()> {
    let date = date.map(|d| parse_date(Some(d))).transpose()?;
    let records = svc.list_records(date)?;

    if records.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No insulin records found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        print_records_table(&records);
    }

    Ok(())
}

pub(crate) fn cmd_init(svc: &BolusService, json: bool) -> Result<()> {
    svc.bootstrap()?;
    if json {
        println!("{{\"ok\":true}}");
    } else {
        println!("Sheets ready: headers written where missing");
    }
    Ok(())
}
