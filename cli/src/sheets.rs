use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use bolus_core::error::BolusError;
use bolus_core::sheet::Sheet;

const SHEETS_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Serialize)]
struct ValueBody {
    values: Vec<Vec<Value>>,
}

/// Shared HTTP client for the Sheets v4 values API.
///
/// The `Sheet` trait is synchronous, so the client owns a current-thread
/// runtime and blocks on each request.
pub struct SheetsClient {
    client: reqwest::Client,
    rt: tokio::runtime::Runtime,
    token: String,
}

impl SheetsClient {
    pub fn new(token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("bolus-cli/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;
        Ok(Self { client, rt, token })
    }

    fn values_url(spreadsheet_id: &str, range: &str) -> Result<Url> {
        let mut url = Url::parse(SHEETS_URL)?;
        url.path_segments_mut()
            .map_err(|()| anyhow!("Sheets URL cannot be a base"))?
            .push(spreadsheet_id)
            .push("values")
            .push(range);
        Ok(url)
    }

    fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        self.rt.block_on(async {
            let resp = request
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(|e| BolusError::ConnectionFailure(e.to_string()))
                .context("Failed to reach Google Sheets")?;
            check_status(resp).await
        })
    }

    fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>> {
        let url = Self::values_url(spreadsheet_id, range)?;
        let request = self
            .client
            .get(url)
            .query(&[("valueRenderOption", "UNFORMATTED_VALUE")]);
        let resp = self.send(request)?;
        let data: ValueRange = self
            .rt
            .block_on(resp.json())
            .context("Failed to parse Google Sheets values response")?;
        Ok(data
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    fn put_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[String],
        numeric_columns: &[usize],
    ) -> Result<()> {
        let url = Self::values_url(spreadsheet_id, range)?;
        let request = self
            .client
            .put(url)
            .query(&[("valueInputOption", "RAW")])
            .json(&ValueBody {
                values: vec![row_to_cells(values, numeric_columns)],
            });
        self.send(request)?;
        Ok(())
    }

    fn append_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        values: &[String],
        numeric_columns: &[usize],
    ) -> Result<()> {
        let url = Self::values_url(spreadsheet_id, &format!("{range}:append"))?;
        let request = self
            .client
            .post(url)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&ValueBody {
                values: vec![row_to_cells(values, numeric_columns)],
            });
        self.send(request)?;
        Ok(())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            bail!("Google Sheets rejected the access token ({status}): {body}")
        }
        _ => bail!("Google Sheets returned {status}: {body}"),
    }
}

/// One named sheet (tab) of a spreadsheet.
///
/// Only cells in `numeric_columns` (0-based) are written as numbers; every
/// other cell is sent as text, so a food named "0.10" stays a name.
pub struct GoogleSheet {
    client: Arc<SheetsClient>,
    spreadsheet_id: String,
    sheet_name: String,
    numeric_columns: &'static [usize],
}

impl GoogleSheet {
    pub fn new(
        client: Arc<SheetsClient>,
        spreadsheet_id: &str,
        sheet_name: &str,
        numeric_columns: &'static [usize],
    ) -> Self {
        Self {
            client,
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_name: sheet_name.to_string(),
            numeric_columns,
        }
    }

    fn quoted_name(&self) -> String {
        format!("'{}'", self.sheet_name.replace('\'', "''"))
    }
}

impl Sheet for GoogleSheet {
    fn name(&self) -> &str {
        &self.sheet_name
    }

    fn read_all(&self) -> Result<Vec<Vec<String>>> {
        debug!(sheet = %self.sheet_name, "reading sheet");
        self.client
            .get_values(&self.spreadsheet_id, &self.quoted_name())
            .with_context(|| format!("Failed to read sheet '{}'", self.sheet_name))
    }

    fn update_row(&self, row: usize, values: &[String]) -> Result<()> {
        let range = row_range(&self.quoted_name(), row, values.len());
        debug!(sheet = %self.sheet_name, %range, "updating row");
        self.client
            .put_values(&self.spreadsheet_id, &range, values, self.numeric_columns)
            .with_context(|| format!("Failed to update row {row} of '{}'", self.sheet_name))
    }

    fn append_row(&self, values: &[String]) -> Result<()> {
        debug!(sheet = %self.sheet_name, cells = values.len(), "appending row");
        self.client
            .append_values(
                &self.spreadsheet_id,
                &self.quoted_name(),
                values,
                self.numeric_columns,
            )
            .with_context(|| format!("Failed to append to '{}'", self.sheet_name))
    }
}

/// A1 column label for a 1-based column number (1 -> A, 27 -> AA).
fn column_letter(mut n: usize) -> String {
    let mut label = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        label.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    label.reverse();
    String::from_utf8(label).unwrap_or_default()
}

fn row_range(sheet: &str, row: usize, width: usize) -> String {
    format!("{sheet}!A{row}:{}{row}", column_letter(width.max(1)))
}

fn cell_to_string(v: Value) -> String {
    match v {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

/// A numeric cell goes out as a number so RAW input keeps it numeric; anything
/// else, or a numeric cell that does not parse, goes out as text.
fn string_to_cell(s: &str, numeric: bool) -> Value {
    if !numeric {
        return Value::String(s.to_string());
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(serde_json::Number::from_f64)
        .map_or_else(|| Value::String(s.to_string()), Value::Number)
}

fn row_to_cells(values: &[String], numeric_columns: &[usize]) -> Vec<Value> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| string_to_cell(v, numeric_columns.contains(&i)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolus_core::models::{
        CATALOG_NUMERIC_COLUMNS, FOOD_RECORD_NUMERIC_COLUMNS, INSULIN_HEADER,
        INSULIN_NUMERIC_COLUMNS,
    };

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| (*c).to_string()).collect()
    }

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(4), "D");
        assert_eq!(column_letter(12), "L");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(52), "AZ");
    }

    #[test]
    fn test_row_range() {
        assert_eq!(row_range("'insulin'", 7, 12), "'insulin'!A7:L7");
        assert_eq!(row_range("'catalog'", 2, 4), "'catalog'!A2:D2");
    }

    #[test]
    fn test_values_url_encodes_sheet_name() {
        let url = SheetsClient::values_url("abc", "'食物 資料'").unwrap();
        let s = url.as_str();
        assert!(s.starts_with("https://sheets.googleapis.com/v4/spreadsheets/abc/values/"));
        assert!(!s.contains(' '));
        assert!(!s.contains('食'));
    }

    #[test]
    fn test_cell_conversion() {
        assert_eq!(string_to_cell("7.6", true), serde_json::json!(7.6));
        assert_eq!(string_to_cell("7.6", false), serde_json::json!("7.6"));
        assert_eq!(string_to_cell("", true), serde_json::json!(""));
        assert_eq!(string_to_cell("NaN", true), serde_json::json!("NaN"));
        assert_eq!(cell_to_string(serde_json::json!(60)), "60");
        assert_eq!(cell_to_string(serde_json::json!("lunch")), "lunch");
        assert_eq!(cell_to_string(Value::Null), "");
    }

    #[test]
    fn test_text_columns_stay_text() {
        let food = strings(&["0.10", "g", "0.3", "1e3"]);
        let cells = row_to_cells(&food, CATALOG_NUMERIC_COLUMNS);
        assert_eq!(cells[0], serde_json::json!("0.10"));
        assert_eq!(cells[2], serde_json::json!(0.3));
        assert_eq!(cells[3], serde_json::json!("1e3"));

        let line = strings(&["2024-06-15", "lunch", "007", "150", "g", "45"]);
        let cells = row_to_cells(&line, FOOD_RECORD_NUMERIC_COLUMNS);
        assert_eq!(cells[0], serde_json::json!("2024-06-15"));
        assert_eq!(cells[2], serde_json::json!("007"));
        assert_eq!(cells[3], serde_json::json!(150.0));
        assert_eq!(cells[5], serde_json::json!(45.0));

        // Header rows carry no numbers even in numeric columns
        let header = strings(&INSULIN_HEADER);
        let cells = row_to_cells(&header, INSULIN_NUMERIC_COLUMNS);
        assert!(cells.iter().all(Value::is_string));
    }

    #[test]
    #[ignore = "hits the Google Sheets API; needs BOLUS_ACCESS_TOKEN and BOLUS_TEST_SHEET"]
    fn test_read_live_sheet() {
        let token = std::env::var("BOLUS_ACCESS_TOKEN").unwrap();
        let id = std::env::var("BOLUS_TEST_SHEET").unwrap();
        let client = Arc::new(SheetsClient::new(token).unwrap());
        let sheet = GoogleSheet::new(client, &id, "catalog", CATALOG_NUMERIC_COLUMNS);
        let rows = sheet.read_all().unwrap();
        assert!(!rows.is_empty());
    }
}
