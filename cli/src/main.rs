mod commands;
mod config;
mod sheets;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    DoseArgs, cmd_actual, cmd_calc, cmd_dose, cmd_food_add, cmd_food_import, cmd_food_search,
    cmd_init, cmd_ratio, cmd_records,
};
use crate::config::Config;
use crate::sheets::{GoogleSheet, SheetsClient};
use bolus_core::models::{
    CATALOG_NUMERIC_COLUMNS, FOOD_RECORD_NUMERIC_COLUMNS, INSULIN_NUMERIC_COLUMNS,
};
use bolus_core::{BolusError, BolusService};

#[derive(Parser)]
#[command(
    name = "bolus",
    version,
    about = "Log foods, total carbs and work out insulin doses",
    long_about = "Log foods, total carbs and work out insulin doses.\n\n\
        Foods, eaten portions and dose records live in Google Sheets, \
        configured in config.toml."
)]
struct Cli {
    /// Path to the config file (default: platform config dir)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write header rows into any empty sheet
    Init {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the food catalog
    Food {
        #[command(subcommand)]
        command: FoodCommands,
    },
    /// Total the carbs for a list of portions
    Calc {
        /// Portion as NAME=AMOUNT (e.g. "rice=150"); repeatable
        #[arg(short, long = "item", required = true)]
        items: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Work out the insulin dose for a meal, optionally saving it
    Dose {
        /// Portion as NAME=AMOUNT (e.g. "rice=150"); repeatable
        #[arg(short, long = "item")]
        items: Vec<String>,
        /// Meal: breakfast, lunch, dinner, late-night
        #[arg(short, long)]
        meal: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Current glucose
        #[arg(long)]
        current: f64,
        /// Target glucose (default: from config)
        #[arg(long)]
        target: Option<f64>,
        /// Carb ratio: grams of carbs per unit (default: from config)
        #[arg(long)]
        ci: Option<f64>,
        /// Insulin sensitivity factor (default: from config)
        #[arg(long)]
        isf: Option<f64>,
        /// Post-meal glucose, if already measured
        #[arg(long)]
        actual: Option<f64>,
        /// Use the last suggested C/I for this meal when --ci is not given
        #[arg(long)]
        use_suggested_ratio: bool,
        /// Log the foods and the dose record
        #[arg(long)]
        save: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record the post-meal glucose for a logged meal
    Actual {
        /// Meal: breakfast, lunch, dinner, late-night
        #[arg(short, long)]
        meal: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Post-meal glucose
        #[arg(long)]
        glucose: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the last suggested carb ratio for a meal
    Ratio {
        /// Meal: breakfast, lunch, dinner, late-night
        #[arg(short, long)]
        meal: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List insulin records
    Records {
        /// Only this date (YYYY-MM-DD or today/yesterday/tomorrow)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum FoodCommands {
    /// Add a food, or overwrite the one with the same name
    Add {
        /// Food name
        name: String,
        /// Unit: g or ml
        #[arg(short, long, default_value = "g")]
        unit: String,
        /// Carbs (g) per unit; a comma works as decimal point
        #[arg(long)]
        carb: String,
        /// Free-form note
        #[arg(long)]
        note: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search foods whose name contains a keyword
    Search {
        /// Keyword
        keyword: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all foods
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import foods from a CSV file (name,unit,carb_per_unit,note)
    Import {
        /// Path to the CSV file
        file: PathBuf,
        /// Preview import without making changes
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("BOLUS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        if BolusError::find(&e).is_some_and(BolusError::is_warning) {
            eprintln!("Warning: {e:#}");
            eprintln!("Nothing was written.");
            process::exit(2);
        }
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn open_service(config: &Config) -> Result<BolusService> {
    let client = Arc::new(SheetsClient::new(config.access_token()?)?);
    let sheet = |id: &str, name: &str, numeric: &'static [usize]| {
        Box::new(GoogleSheet::new(Arc::clone(&client), id, name, numeric))
    };
    let records = &config.records;
    Ok(BolusService::new(
        sheet(
            &config.catalog.spreadsheet_id,
            &config.catalog.sheet,
            CATALOG_NUMERIC_COLUMNS,
        ),
        sheet(
            &records.spreadsheet_id,
            &records.food_sheet,
            FOOD_RECORD_NUMERIC_COLUMNS,
        ),
        sheet(
            &records.spreadsheet_id,
            &records.insulin_sheet,
            INSULIN_NUMERIC_COLUMNS,
        ),
    ))
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let svc = open_service(&config)?;

    match cli.command {
        Commands::Init { json } => cmd_init(&svc, json),
        Commands::Food { command } => match command {
            FoodCommands::Add {
                name,
                unit,
                carb,
                note,
                json,
            } => cmd_food_add(&svc, &name, &unit, &carb, note, json),
            FoodCommands::Search { keyword, json } => cmd_food_search(&svc, Some(&keyword), json),
            FoodCommands::List { json } => cmd_food_search(&svc, None, json),
            FoodCommands::Import {
                file,
                dry_run,
                json,
            } => cmd_food_import(&svc, &file, dry_run, json),
        },
        Commands::Calc { items, json } => cmd_calc(&svc, &items, json),
        Commands::Dose {
            items,
            meal,
            date,
            current,
            target,
            ci,
            isf,
            actual,
            use_suggested_ratio,
            save,
            json,
        } => {
            let args = DoseArgs {
                items,
                meal,
                date,
                current,
                target,
                ci,
                isf,
                actual,
                use_suggested_ratio,
                save,
                json,
            };
            cmd_dose(&svc, &args, &config.defaults)
        }
        Commands::Actual {
            meal,
            date,
            glucose,
            json,
        } => cmd_actual(&svc, &meal, date, glucose, json),
        Commands::Ratio { meal, json } => cmd_ratio(&svc, &meal, json),
        Commands::Records { date, json } => cmd_records(&svc, date, json),
    }
}
