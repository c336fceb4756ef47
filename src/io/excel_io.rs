use std::path::Path;

use calamine::{open_workbook, Data, Reader, Xlsx};
use rust_xlsxwriter::{Format, Workbook};

use crate::analysis::BlendedScenarios;
use crate::error::ForecastError;
use crate::models::ObservationSeries;

use super::{parse_value, parse_year, ColumnSelection};

fn cell_year(cell: &Data) -> Result<Option<i32>, String> {
    match cell {
        Data::Empty | Data::Error(_) => Ok(None),
        Data::Int(i) => i32::try_from(*i)
            .map(Some)
            .map_err(|_| format!("{i} is not a year")),
        Data::Float(f) => parse_year(&f.to_string()),
        Data::String(s) => parse_year(s),
        other => Err(format!("'{other}' is not a year")),
    }
}

fn cell_value(cell: &Data) -> Result<Option<f64>, String> {
    match cell {
        Data::Empty | Data::Error(_) => Ok(None),
        Data::Int(i) => Ok(Some(*i as f64)),
        Data::Float(f) if f.is_nan() => Ok(None),
        Data::Float(f) => Ok(Some(*f)),
        Data::String(s) => parse_value(s),
        other => Err(format!("'{other}' is not a number")),
    }
}

/// Read a `(year, value)` series from an Excel (.xlsx) workbook.
///
/// Uses the named sheet, or the first one. The first row is the header and
/// the series is named after the value column.
pub fn read_excel(
    path: impl AsRef<Path>,
    sheet: Option<&str>,
    columns: &ColumnSelection,
) -> Result<ObservationSeries, ForecastError> {
    let mut workbook: Xlsx<_> = open_workbook(path.as_ref())?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ForecastError::Excel("No sheets found in workbook".to_string()))?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| ForecastError::Excel(format!("Sheet '{sheet_name}': {e}")))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|row| row.iter().map(|c| c.to_string()).collect())
        .ok_or_else(|| ForecastError::Excel(format!("Sheet '{sheet_name}' is empty")))?;
    let year_idx = columns.year.resolve(&headers)?;
    let value_idx = columns.value.resolve(&headers)?;

    let mut raw = Vec::new();
    for (line, row) in rows.enumerate() {
        let at = |e: String| ForecastError::ParseError(format!("Sheet '{sheet_name}' row {}: {e}", line + 2));
        let year = row.get(year_idx).map(cell_year).transpose().map_err(at)?.flatten();
        let value = row.get(value_idx).map(cell_value).transpose().map_err(at)?.flatten();
        raw.push((year, value));
    }

    let series = ObservationSeries::from_raw_rows(headers[value_idx].clone(), raw)?;
    tracing::debug!(
        path = %path.as_ref().display(),
        sheet = %sheet_name,
        rows = series.len(),
        "Read Excel series"
    );
    Ok(series)
}

/// Write the blended scenarios to an Excel workbook.
///
/// Column A holds the years, followed by the automatic and (if present)
/// the manual scenario, then the band edges of each scenario with a band.
pub fn write_blended_excel(
    scenarios: &BlendedScenarios,
    year_header: &str,
    path: impl AsRef<Path>,
) -> Result<(), ForecastError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();
    let number = Format::new().set_num_format("0.00");

    worksheet.write_string_with_format(0, 0, year_header, &bold)?;
    for (i, year) in scenarios.years.iter().enumerate() {
        worksheet.write_number((i + 1) as u32, 0, *year as f64)?;
    }

    for (c, (name, values)) in scenarios.columns().iter().enumerate() {
        let col = (c + 1) as u16;
        worksheet.write_string_with_format(0, col, *name, &bold)?;
        for (i, value) in values.iter().enumerate() {
            if let Some(v) = value.filter(|v| v.is_finite()) {
                worksheet.write_number_with_format((i + 1) as u32, col, v, &number)?;
            }
        }
        worksheet.set_column_width(col, 24)?;
    }

    workbook.save(path.as_ref())?;
    Ok(())
}
