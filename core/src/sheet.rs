use std::sync::Mutex;

use anyhow::{Result, anyhow, bail};
use tracing::debug;

/// A named sheet in a tabular store. Row 0 is the header.
///
/// Row numbers passed to `update_row` are 1-based, matching spreadsheet row
/// labels, so the header is row 1 and the first data row is row 2.
pub trait Sheet: Send + Sync {
    fn name(&self) -> &str;
    fn read_all(&self) -> Result<Vec<Vec<String>>>;
    fn update_row(&self, row: usize, values: &[String]) -> Result<()>;
    fn append_row(&self, values: &[String]) -> Result<()>;
}

/// Read the sheet, writing `header` first if the sheet is empty.
pub fn read_with_header(sheet: &dyn Sheet, header: &[&str]) -> Result<Vec<Vec<String>>> {
    let rows = sheet.read_all()?;
    if !rows.is_empty() {
        return Ok(rows);
    }
    debug!(sheet = sheet.name(), "empty sheet, writing header");
    let header: Vec<String> = header.iter().map(|h| (*h).to_string()).collect();
    sheet.append_row(&header)?;
    Ok(vec![header])
}

/// In-process sheet, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySheet {
    name: String,
    rows: Mutex<Vec<Vec<String>>>,
}

impl MemorySheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Mutex::new(Vec::new()),
        }
    }

    pub fn with_rows(name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            rows: Mutex::new(rows),
        }
    }

    /// Snapshot the rows of any sheet into memory.
    pub fn snapshot(sheet: &dyn Sheet) -> Result<Self> {
        Ok(Self::with_rows(sheet.name(), sheet.read_all()?))
    }

    pub fn rows(&self) -> Result<Vec<Vec<String>>> {
        self.read_all()
    }
}

impl Sheet for MemorySheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_all(&self) -> Result<Vec<Vec<String>>> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| anyhow!("sheet '{}' lock poisoned", self.name))?;
        Ok(rows.clone())
    }

    fn update_row(&self, row: usize, values: &[String]) -> Result<()> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| anyhow!("sheet '{}' lock poisoned", self.name))?;
        if row == 0 || row > rows.len() {
            bail!(
                "Row {row} is out of range for sheet '{}' ({} rows)",
                self.name,
                rows.len()
            );
        }
        rows[row - 1] = values.to_vec();
        Ok(())
    }

    fn append_row(&self, values: &[String]) -> Result<()> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| anyhow!("sheet '{}' lock poisoned", self.name))?;
        rows.push(values.to_vec());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn strings(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|s| (*s).to_string()).collect()
}
