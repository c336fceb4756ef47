use serde::{Deserialize, Serialize};

use crate::error::ForecastError;

/// A single yearly measurement of the quantity being forecast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub year: i32,
    pub value: f64,
}

/// Basic statistics over a non-empty series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub count: usize,
    pub min_year: i32,
    pub max_year: i32,
    pub min_value: f64,
    pub max_value: f64,
    pub mean_value: f64,
}

/// Year-ordered observation history, immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationSeries {
    /// Label of the value column (e.g. "Installed capacity")
    pub name: String,
    observations: Vec<Observation>,
}

impl ObservationSeries {
    /// Build a series from complete observations.
    ///
    /// Observations are sorted by year. Non-finite values and duplicate years are rejected.
    pub fn from_observations(
        name: impl Into<String>,
        mut observations: Vec<Observation>,
    ) -> Result<Self, ForecastError> {
        if let Some(bad) = observations.iter().find(|o| !o.value.is_finite()) {
            return Err(ForecastError::ValidationError(format!(
                "Value for year {} is not finite",
                bad.year
            )));
        }

        observations.sort_by_key(|o| o.year);
        if let Some(pair) = observations.windows(2).find(|w| w[0].year == w[1].year) {
            return Err(ForecastError::ValidationError(format!(
                "Duplicate year {} in observations",
                pair[0].year
            )));
        }

        Ok(Self {
            name: name.into(),
            observations,
        })
    }

    /// Build a series from raw spreadsheet rows, dropping rows with a missing year or value.
    pub fn from_raw_rows<I>(name: impl Into<String>, rows: I) -> Result<Self, ForecastError>
    where
        I: IntoIterator<Item = (Option<i32>, Option<f64>)>,
    {
        let mut dropped = 0usize;
        let observations: Vec<Observation> = rows
            .into_iter()
            .filter_map(|row| match row {
                (Some(year), Some(value)) if value.is_finite() => Some(Observation { year, value }),
                _ => {
                    dropped += 1;
                    None
                }
            })
            .collect();

        let series = Self::from_observations(name, observations)?;
        if dropped > 0 {
            tracing::warn!(
                series = %series.name,
                dropped,
                "Dropped rows with a missing year or value"
            );
        }
        Ok(series)
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Years as floating point values, ready to feed a curve.
    pub fn years(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.year as f64).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.value).collect()
    }

    pub fn min_year(&self) -> Option<i32> {
        self.observations.first().map(|o| o.year)
    }

    pub fn max_year(&self) -> Option<i32> {
        self.observations.last().map(|o| o.year)
    }

    pub fn max_value(&self) -> Option<f64> {
        self.observations
            .iter()
            .map(|o| o.value)
            .reduce(f64::max)
    }

    /// Fail with `InsufficientData` unless the series has at least `count` observations.
    pub fn require_at_least(&self, count: usize) -> Result<(), ForecastError> {
        if self.len() < count {
            return Err(ForecastError::InsufficientData(format!(
                "Need at least {count} observations, got {}",
                self.len()
            )));
        }
        Ok(())
    }

    pub fn summary(&self) -> Result<SeriesSummary, ForecastError> {
        let (first, last) = match (self.observations.first(), self.observations.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(ForecastError::InsufficientData(
                    "Series contains no observations".to_string(),
                ))
            }
        };

        let values = self.values();
        let min_value = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max_value = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean_value = values.iter().sum::<f64>() / values.len() as f64;

        Ok(SeriesSummary {
            count: values.len(),
            min_year: first.year,
            max_year: last.year,
            min_value,
            max_value,
            mean_value,
        })
    }
}
