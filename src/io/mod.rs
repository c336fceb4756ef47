mod csv_io;
mod excel_io;
mod json_io;

use std::path::Path;
use std::str::FromStr;

use crate::error::ForecastError;
use crate::models::ObservationSeries;

pub use csv_io::{
    read_csv, read_csv_from_reader, write_blended_csv, write_confidence_csv, write_cycle_csv,
    write_decomposition_csv, write_growth_rates_csv, write_periodic_csv, write_predictions_csv,
};
pub use excel_io::{read_excel, write_blended_excel};
pub use json_io::{read_report_json, write_report_json};
pub(crate) use json_io::{null_as_nan, null_rows_as_nan, nulls_as_nan};

/// Picks a column by zero-based index, header name, or spreadsheet letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelector {
    Index(usize),
    Name(String),
}

impl ColumnSelector {
    /// Resolve against a header row.
    ///
    /// Names match headers case-insensitively. A name that matches no header
    /// but consists of one to three letters is read as a spreadsheet column
    /// (`A` is 0, `E` is 4, `AA` is 26).
    pub fn resolve(&self, headers: &[String]) -> Result<usize, ForecastError> {
        let index = match self {
            ColumnSelector::Index(i) => Some(*i),
            ColumnSelector::Name(name) => headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
                .or_else(|| column_letter_index(name.trim())),
        };
        match index {
            Some(i) if i < headers.len() => Ok(i),
            _ => Err(ForecastError::ValidationError(format!(
                "Column {self} not found among {} columns",
                headers.len()
            ))),
        }
    }
}

fn column_letter_index(letters: &str) -> Option<usize> {
    if letters.is_empty() || letters.len() > 3 || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let number = letters
        .chars()
        .fold(0usize, |acc, c| acc * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1));
    Some(number - 1)
}

impl std::fmt::Display for ColumnSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnSelector::Index(i) => write!(f, "#{i}"),
            ColumnSelector::Name(name) => write!(f, "'{name}'"),
        }
    }
}

impl FromStr for ColumnSelector {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ForecastError::ParseError("Empty column selector".to_string()));
        }
        Ok(match s.parse::<usize>() {
            Ok(i) => ColumnSelector::Index(i),
            Err(_) => ColumnSelector::Name(s.to_string()),
        })
    }
}

/// Year and value columns of an input table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSelection {
    pub year: ColumnSelector,
    pub value: ColumnSelector,
}

impl Default for ColumnSelection {
    fn default() -> Self {
        Self {
            year: ColumnSelector::Index(0),
            value: ColumnSelector::Index(1),
        }
    }
}

/// Trait for reading a `(year, value)` series from a file.
pub trait ObservationReader {
    fn read(&self, path: &Path) -> Result<ObservationSeries, ForecastError>;
}

/// CSV input with a header row.
#[derive(Debug, Clone, Default)]
pub struct CsvSource {
    pub columns: ColumnSelection,
}

impl ObservationReader for CsvSource {
    fn read(&self, path: &Path) -> Result<ObservationSeries, ForecastError> {
        read_csv(path, &self.columns)
    }
}

/// Excel (.xlsx) input, first sheet unless one is named.
#[derive(Debug, Clone, Default)]
pub struct ExcelSource {
    pub sheet: Option<String>,
    pub columns: ColumnSelection,
}

impl ObservationReader for ExcelSource {
    fn read(&self, path: &Path) -> Result<ObservationSeries, ForecastError> {
        read_excel(path, self.sheet.as_deref(), &self.columns)
    }
}

/// Choose a reader from the file extension: `.csv`/`.txt` or `.xlsx`/`.xlsm`.
pub fn reader_for_path(
    path: &Path,
    sheet: Option<String>,
    columns: ColumnSelection,
) -> Result<Box<dyn ObservationReader>, ForecastError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "csv" | "txt" => Ok(Box::new(CsvSource { columns })),
        "xlsx" | "xlsm" => Ok(Box::new(ExcelSource { sheet, columns })),
        _ => Err(ForecastError::ValidationError(format!(
            "Unsupported file format: .{ext}. Use .csv or .xlsx"
        ))),
    }
}

/// Parse a year cell. Whole-number floats such as `2015.0` are accepted.
pub(crate) fn parse_year(raw: &str) -> Result<Option<i32>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(year) = raw.parse::<i32>() {
        return Ok(Some(year));
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 => Ok(Some(v as i32)),
        Ok(v) if v.is_nan() => Ok(None),
        _ => Err(format!("'{raw}' is not a year")),
    }
}

/// Parse a value cell. `NaN` and empty cells count as missing.
pub(crate) fn parse_value(raw: &str) -> Result<Option<f64>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_nan() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(_) => Err(format!("'{raw}' is not a number")),
    }
}
