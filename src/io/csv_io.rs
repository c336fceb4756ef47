use std::io::Read;
use std::path::Path;

use crate::analysis::{BlendedScenarios, CycleReport, Decomposition, ForecastReport, PeriodicForecast};
use crate::error::ForecastError;
use crate::models::ObservationSeries;

use super::{parse_value, parse_year, ColumnSelection};

fn parse_csv_series<R: Read>(
    rdr: &mut csv::Reader<R>,
    columns: &ColumnSelection,
) -> Result<ObservationSeries, ForecastError> {
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    let year_idx = columns.year.resolve(&headers)?;
    let value_idx = columns.value.resolve(&headers)?;

    let mut rows = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result?;
        // Header is line 1
        let at = |e: String| ForecastError::ParseError(format!("Row {}: {e}", line + 2));
        let year = parse_year(record.get(year_idx).unwrap_or("")).map_err(at)?;
        let value = parse_value(record.get(value_idx).unwrap_or("")).map_err(at)?;
        rows.push((year, value));
    }

    ObservationSeries::from_raw_rows(headers[value_idx].clone(), rows)
}

/// Read a `(year, value)` series from a CSV file with a header row.
///
/// The series is named after the value column.
pub fn read_csv(
    path: impl AsRef<Path>,
    columns: &ColumnSelection,
) -> Result<ObservationSeries, ForecastError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path.as_ref())?;
    let series = parse_csv_series(&mut rdr, columns)?;
    tracing::debug!(path = %path.as_ref().display(), rows = series.len(), "Read CSV series");
    Ok(series)
}

/// Read a series from any CSV source, for example an in-memory buffer.
pub fn read_csv_from_reader<R: Read>(
    reader: R,
    columns: &ColumnSelection,
) -> Result<ObservationSeries, ForecastError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    parse_csv_series(&mut rdr, columns)
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write one row per forecast year with a column per configured model.
///
/// Models that failed to fit leave their column empty.
pub fn write_predictions_csv(
    report: &ForecastReport,
    path: impl AsRef<Path>,
) -> Result<(), ForecastError> {
    let mut wtr = csv::Writer::from_path(path.as_ref())?;

    let mut header = vec!["Year".to_string()];
    header.extend(report.models.iter().map(|m| m.kind.label().to_string()));
    wtr.write_record(&header)?;

    for (i, year) in report.future_years.iter().enumerate() {
        let mut record = vec![year.to_string()];
        record.extend(
            report
                .models
                .iter()
                .map(|m| cell(m.fitted().and_then(|f| f.predictions.get(i).copied()))),
        );
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write lower/exact/upper columns for every model carrying a confidence band.
pub fn write_confidence_csv(
    report: &ForecastReport,
    path: impl AsRef<Path>,
) -> Result<(), ForecastError> {
    let banded: Vec<_> = report
        .models
        .iter()
        .filter_map(|m| {
            m.fitted()
                .and_then(|f| f.band.as_ref())
                .map(|band| (m.kind.label(), band))
        })
        .collect();

    let mut wtr = csv::Writer::from_path(path.as_ref())?;
    let mut header = vec!["Year".to_string()];
    for (label, _) in &banded {
        header.push(format!("{label} Lower"));
        header.push(format!("{label} exact"));
        header.push(format!("{label} Upper"));
    }
    wtr.write_record(&header)?;

    if let Some((_, first)) = banded.first() {
        for (i, row) in first.rows.iter().enumerate() {
            let mut record = vec![row.year.to_string()];
            for (_, band) in &banded {
                let r = band.rows.get(i);
                record.push(cell(r.map(|r| r.lower)));
                record.push(cell(r.map(|r| r.exact)));
                record.push(cell(r.map(|r| r.upper)));
            }
            wtr.write_record(&record)?;
        }
    }

    wtr.flush()?;
    Ok(())
}

/// Write year-over-year growth of each fitted model.
pub fn write_growth_rates_csv(
    report: &ForecastReport,
    path: impl AsRef<Path>,
) -> Result<(), ForecastError> {
    let rates: Vec<_> = report
        .models
        .iter()
        .filter_map(|m| report.growth_rates(m.kind).map(|r| (m.kind.label(), r)))
        .collect();

    let mut wtr = csv::Writer::from_path(path.as_ref())?;
    let mut header = vec!["Year".to_string()];
    header.extend(rates.iter().map(|(label, _)| format!("{label} Growth Rate")));
    wtr.write_record(&header)?;

    for (i, year) in report.future_years.iter().skip(1).enumerate() {
        let mut record = vec![year.to_string()];
        record.extend(rates.iter().map(|(_, r)| cell(r.get(i).map(|g| g.rate))));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write the blended scenarios as `Year, Auto_Piecewise_Blended[, Manual_Piecewise_Blended]`
/// followed by `Auto_Lower, Auto_Upper` and `Manual_Lower, Manual_Upper` for
/// scenarios with a confidence band. Band cells before the last observed year are empty.
pub fn write_blended_csv(
    scenarios: &BlendedScenarios,
    path: impl AsRef<Path>,
) -> Result<(), ForecastError> {
    let columns = scenarios.columns();
    let mut wtr = csv::Writer::from_path(path.as_ref())?;
    let mut header = vec!["Year"];
    header.extend(columns.iter().map(|(name, _)| *name));
    wtr.write_record(&header)?;

    for (i, year) in scenarios.years.iter().enumerate() {
        let mut record = vec![year.to_string()];
        record.extend(columns.iter().map(|(_, values)| cell(values.get(i).copied().flatten())));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

fn finite_cell(value: f64) -> String {
    cell(Some(value).filter(|v| v.is_finite()))
}

/// Write `Year, Observed, Trend, Seasonal, Residual`. Years without a trend
/// leave the trend and residual cells empty.
pub fn write_decomposition_csv(
    decomposition: &Decomposition,
    path: impl AsRef<Path>,
) -> Result<(), ForecastError> {
    let mut wtr = csv::Writer::from_path(path.as_ref())?;
    wtr.write_record(["Year", "Observed", "Trend", "Seasonal", "Residual"])?;
    for (i, year) in decomposition.years.iter().enumerate() {
        wtr.write_record([
            year.to_string(),
            finite_cell(decomposition.observed[i]),
            finite_cell(decomposition.trend[i]),
            finite_cell(decomposition.seasonal[i]),
            finite_cell(decomposition.residual[i]),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write `Year, Trend, Seasonal, Forecast` for every forecast year.
pub fn write_periodic_csv(
    forecast: &PeriodicForecast,
    path: impl AsRef<Path>,
) -> Result<(), ForecastError> {
    let mut wtr = csv::Writer::from_path(path.as_ref())?;
    wtr.write_record(["Year", "Trend", "Seasonal", "Forecast"])?;
    for point in &forecast.points {
        wtr.write_record([
            point.year.to_string(),
            finite_cell(point.trend),
            finite_cell(point.seasonal),
            finite_cell(point.forecast),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the growth-cycle prediction grid.
pub fn write_cycle_csv(report: &CycleReport, path: impl AsRef<Path>) -> Result<(), ForecastError> {
    let mut wtr = csv::Writer::from_path(path.as_ref())?;
    for point in &report.points {
        wtr.serialize(point)?;
    }
    wtr.flush()?;
    Ok(())
}
