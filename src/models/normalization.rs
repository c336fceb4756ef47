use serde::{Deserialize, Serialize};

use crate::error::ForecastError;

/// Linear map of years onto `[0, 1]` using the historical min and max year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearNormalization {
    origin: f64,
    span: f64,
}

impl YearNormalization {
    pub fn from_years(years: &[f64]) -> Result<Self, ForecastError> {
        let min = years.iter().copied().fold(f64::INFINITY, f64::min);
        let max = years.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let span = max - min;
        if !span.is_finite() || span <= 0.0 {
            return Err(ForecastError::InsufficientData(
                "Normalizing years needs at least two distinct years".to_string(),
            ));
        }
        Ok(Self { origin: min, span })
    }

    pub fn normalize(&self, year: f64) -> f64 {
        (year - self.origin) / self.span
    }

    /// Inverse of [`normalize`](Self::normalize).
    pub fn denormalize(&self, x: f64) -> f64 {
        x * self.span + self.origin
    }
}

/// Years shifted so the first historical year becomes zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YearShift {
    origin: f64,
}

impl YearShift {
    pub fn from_years(years: &[f64]) -> Result<Self, ForecastError> {
        let origin = years.iter().copied().fold(f64::INFINITY, f64::min);
        if !origin.is_finite() {
            return Err(ForecastError::InsufficientData(
                "Shifting years needs at least one year".to_string(),
            ));
        }
        Ok(Self { origin })
    }

    pub fn shift(&self, year: f64) -> f64 {
        year - self.origin
    }
}
