use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const TOKEN_ENV: &str = "BOLUS_ACCESS_TOKEN";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub access_token: Option<String>,
    pub catalog: CatalogSheet,
    pub records: RecordSheets,
    #[serde(default)]
    pub defaults: Defaults,
}

#[derive(Debug, Deserialize)]
pub struct CatalogSheet {
    pub spreadsheet_id: String,
    #[serde(default = "default_catalog_sheet")]
    pub sheet: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordSheets {
    pub spreadsheet_id: String,
    #[serde(default = "default_food_sheet")]
    pub food_sheet: String,
    #[serde(default = "default_insulin_sheet")]
    pub insulin_sheet: String,
}

#[derive(Debug, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_target_glucose")]
    pub target_glucose: f64,
    pub carb_ratio: Option<f64>,
    pub sensitivity_factor: Option<f64>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            target_glucose: default_target_glucose(),
            carb_ratio: None,
            sensitivity_factor: None,
        }
    }
}

fn default_catalog_sheet() -> String {
    "catalog".to_string()
}
fn default_food_sheet() -> String {
    "food_records".to_string()
}
fn default_insulin_sheet() -> String {
    "insulin_records".to_string()
}
fn default_target_glucose() -> f64 {
    100.0
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs =
            ProjectDirs::from("", "", "bolus").context("Could not determine home directory")?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        if !path.exists() {
            bail!(
                "No config file at {}. Create it with [catalog] and [records] spreadsheet_id entries",
                path.display()
            );
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// The OAuth bearer token; the environment variable wins over the file.
    pub fn access_token(&self) -> Result<String> {
        let token = std::env::var(TOKEN_ENV)
            .ok()
            .or_else(|| self.access_token.clone())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        match token {
            Some(t) => Ok(t),
            None => bail!("No Google access token. Set {TOKEN_ENV} or access_token in the config file"),
        }
    }
}
