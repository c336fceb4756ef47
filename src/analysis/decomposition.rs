//! Additive seasonal decomposition and a trend-plus-season forecast built on it.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::analysis::bounds::Bound;
use crate::analysis::fitter::{fit_curve, FitOptions};
use crate::analysis::growth::logistic;
use crate::analysis::statistics::r_squared;
use crate::config::DecompositionSettings;
use crate::error::ForecastError;
use crate::models::{ObservationSeries, YearShift};

/// `a0 · e^(k·t) · sin(2π·f·t + phase)`
pub fn scaled_sine(t: f64, a0: f64, k: f64, frequency: f64, phase: f64) -> f64 {
    a0 * (k * t).exp() * (2.0 * PI * frequency * t + phase).sin()
}

fn scaled_sine_model(t: f64, p: &[f64]) -> f64 {
    scaled_sine(t, p[0], p[1], p[2], p[3])
}

fn logistic_model(x: f64, p: &[f64]) -> f64 {
    logistic(x, p[0], p[1], p[2])
}

/// Centred moving average over `period` samples.
///
/// An even period uses `period + 1` weights with halved end weights. The
/// first and last `period / 2` entries have no full window and are NaN.
pub fn moving_average_trend(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let p = period as f64;
    let weights: Vec<f64> = if period % 2 == 0 {
        let mut w = vec![1.0 / p; period + 1];
        w[0] = 0.5 / p;
        w[period] = 0.5 / p;
        w
    } else {
        vec![1.0 / p; period]
    };
    let half = weights.len() / 2;

    (0..n)
        .map(|i| {
            if i < half || i + half >= n {
                return f64::NAN;
            }
            weights
                .iter()
                .zip(&values[i - half..=i + half])
                .map(|(w, v)| w * v)
                .sum()
        })
        .collect()
}

/// Observed series split into trend, seasonal and residual parts.
///
/// Observations are taken as consecutive samples; gaps in the years are not
/// filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    pub period: usize,
    pub years: Vec<i32>,
    pub observed: Vec<f64>,
    /// NaN where the moving-average window runs off the series
    pub trend: Vec<f64>,
    /// Zero-mean seasonal pattern repeated over the series
    pub seasonal: Vec<f64>,
    /// NaN wherever the trend is
    pub residual: Vec<f64>,
}

impl Decomposition {
    /// Decompose `observed = trend + seasonal + residual`.
    ///
    /// Needs `period >= 2` and at least two full periods of data.
    pub fn additive(series: &ObservationSeries, period: usize) -> Result<Self, ForecastError> {
        if period < 2 {
            return Err(ForecastError::ValidationError(format!(
                "Seasonal period must be at least 2, got {period}"
            )));
        }
        let n = series.len();
        if n < 2 * period {
            return Err(ForecastError::InsufficientData(format!(
                "Decomposition with period {period} needs {} observations, got {n}",
                2 * period
            )));
        }

        let observed = series.values();
        let trend = moving_average_trend(&observed, period);
        let detrended: Vec<f64> = observed.iter().zip(&trend).map(|(y, t)| y - t).collect();

        let mut pattern: Vec<f64> = (0..period)
            .map(|phase| {
                let finite: Vec<f64> = detrended
                    .iter()
                    .skip(phase)
                    .step_by(period)
                    .copied()
                    .filter(|v| v.is_finite())
                    .collect();
                finite.iter().sum::<f64>() / finite.len() as f64
            })
            .collect();
        let centre = pattern.iter().sum::<f64>() / period as f64;
        pattern.iter_mut().for_each(|v| *v -= centre);

        let seasonal: Vec<f64> = (0..n).map(|i| pattern[i % period]).collect();
        let residual = detrended.iter().zip(&seasonal).map(|(d, s)| d - s).collect();

        tracing::debug!(period, ?pattern, "Additive decomposition");
        Ok(Self {
            period,
            years: series.observations().iter().map(|o| o.year).collect(),
            observed,
            trend,
            seasonal,
            residual,
        })
    }

    /// Years and trend values where the trend is defined.
    pub fn defined_trend(&self) -> (Vec<f64>, Vec<f64>) {
        self.years
            .iter()
            .zip(&self.trend)
            .filter(|(_, t)| t.is_finite())
            .map(|(&year, &t)| (year as f64, t))
            .unzip()
    }
}

/// One forecast year of the trend-plus-season model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodicPoint {
    pub year: i32,
    pub trend: f64,
    pub seasonal: f64,
    pub forecast: f64,
}

/// Logistic fitted to the trend plus a scaled sine fitted to the season.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicForecast {
    pub decomposition: Decomposition,
    /// Logistic `[K, b, x0]`
    pub trend_params: Vec<f64>,
    /// `[A0, k, f, phi]` with `t` in years since the first observation
    pub seasonal_params: Vec<f64>,
    pub trend_r_squared: f64,
    pub seasonal_r_squared: f64,
    pub points: Vec<PeriodicPoint>,
}

fn positive_max(values: &[f64], what: &str) -> Result<f64, ForecastError> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max.is_finite() && max > 0.0 {
        Ok(max)
    } else {
        Err(ForecastError::AnalysisError(format!(
            "The {what} component has no positive values to scale bounds from"
        )))
    }
}

/// Decompose `series`, fit both components, and forecast their sum over `years`.
///
/// Either fit failing fails the forecast.
pub fn periodic_forecast(
    series: &ObservationSeries,
    settings: &DecompositionSettings,
    years: &[i32],
    options: &FitOptions,
) -> Result<PeriodicForecast, ForecastError> {
    let decomposition = Decomposition::additive(series, settings.period)?;
    let (trend_years, trend_values) = decomposition.defined_trend();
    let max_trend = positive_max(&trend_values, "trend")?;
    let max_seasonal = positive_max(&decomposition.seasonal, "seasonal")?;

    let trend_bounds = Bound::from_vectors(
        &[max_trend * 0.1, 0.0, 0.0],
        &[max_trend * 10.0, f64::INFINITY, settings.preset_year_max as f64],
    )?;
    let trend_fit = fit_curve(
        "Trend logistic",
        logistic_model,
        &trend_years,
        &trend_values,
        &[max_trend * 0.5, 0.01, settings.preset_year as f64],
        &trend_bounds,
        options,
    )?;
    let trend_fitted: Vec<f64> = trend_years
        .iter()
        .map(|&x| logistic_model(x, &trend_fit.params))
        .collect();
    let trend_r_squared = r_squared(&trend_values, &trend_fitted)?;

    let shift = YearShift::from_years(&series.years())?;
    let season_t: Vec<f64> = series.years().iter().map(|&y| shift.shift(y)).collect();
    let seasonal_bounds = Bound::from_vectors(
        &[max_seasonal * 0.1, 0.0, 0.0, -PI],
        &[max_seasonal * 10.0, f64::INFINITY, 20.0, PI],
    )?;
    let seasonal_fit = fit_curve(
        "Seasonal sine",
        scaled_sine_model,
        &season_t,
        &decomposition.seasonal,
        &[max_seasonal * 0.5, 0.01, 1.0 / 20.0, 0.0],
        &seasonal_bounds,
        options,
    )?;
    let seasonal_fitted: Vec<f64> = season_t
        .iter()
        .map(|&t| scaled_sine_model(t, &seasonal_fit.params))
        .collect();
    let seasonal_r_squared = r_squared(&decomposition.seasonal, &seasonal_fitted)?;

    tracing::info!(
        trend = ?trend_fit.params,
        seasonal = ?seasonal_fit.params,
        "Fitted trend and seasonal components"
    );

    let points = years
        .iter()
        .map(|&year| {
            let trend = logistic_model(year as f64, &trend_fit.params);
            let seasonal = scaled_sine_model(shift.shift(year as f64), &seasonal_fit.params);
            PeriodicPoint {
                year,
                trend,
                seasonal,
                forecast: trend + seasonal,
            }
        })
        .collect();

    Ok(PeriodicForecast {
        decomposition,
        trend_params: trend_fit.params,
        seasonal_params: seasonal_fit.params,
        trend_r_squared,
        seasonal_r_squared,
        points,
    })
}
