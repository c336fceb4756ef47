use std::path::Path;

use serde::{Deserialize, Deserializer};

use crate::analysis::ForecastReport;
use crate::error::ForecastError;

// serde_json writes NaN and infinities as null; these read null back as NaN.

pub(crate) fn null_as_nan<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

pub(crate) fn nulls_as_nan<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<Option<f64>>::deserialize(deserializer)?;
    Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

pub(crate) fn null_rows_as_nan<'de, D>(deserializer: D) -> Result<Vec<Vec<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let rows = Vec::<Vec<Option<f64>>>::deserialize(deserializer)?;
    Ok(rows
        .into_iter()
        .map(|row| row.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
        .collect())
}

/// Write a forecast report as JSON. Non-finite numbers become `null`.
pub fn write_report_json(
    report: &ForecastReport,
    path: impl AsRef<Path>,
    pretty: bool,
) -> Result<(), ForecastError> {
    let content = if pretty {
        serde_json::to_string_pretty(report)?
    } else {
        serde_json::to_string(report)?
    };
    std::fs::write(path.as_ref(), content)?;
    Ok(())
}

/// Read a report previously written by [`write_report_json`].
///
/// `null` numbers come back as NaN.
pub fn read_report_json(path: impl AsRef<Path>) -> Result<ForecastReport, ForecastError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&content)?)
}
