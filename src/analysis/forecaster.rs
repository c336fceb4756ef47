use serde::{Deserialize, Serialize};

use crate::analysis::blending::{blend_scenarios, BandRequest, BlendedScenarios};
use crate::analysis::cycle::{CycleReport, GrowthCycleModel};
use crate::analysis::decomposition::{periodic_forecast, Decomposition, PeriodicForecast};
use crate::analysis::fitter::{Covariance, FitOptions};
use crate::analysis::growth::CurveKind;
use crate::analysis::setup::{fit_model, FittedCurve};
use crate::analysis::statistics::{confidence_bounds, growth_rates, r_squared, ConfidenceOutcome, GrowthRate};
use crate::config::ForecastConfig;
use crate::error::ForecastError;
use crate::models::ObservationSeries;

/// Number of grid points in a growth-cycle report.
const CYCLE_REPORT_SAMPLES: usize = 1000;

/// One year of a confidence band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandRow {
    pub year: i32,
    #[serde(deserialize_with = "crate::io::null_as_nan")]
    pub lower: f64,
    #[serde(deserialize_with = "crate::io::null_as_nan")]
    pub exact: f64,
    #[serde(deserialize_with = "crate::io::null_as_nan")]
    pub upper: f64,
}

/// The curve evaluated at the lower and upper parameter bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBand {
    #[serde(deserialize_with = "crate::io::null_as_nan")]
    pub critical_value: f64,
    #[serde(deserialize_with = "crate::io::nulls_as_nan")]
    pub lower_params: Vec<f64>,
    #[serde(deserialize_with = "crate::io::nulls_as_nan")]
    pub upper_params: Vec<f64>,
    pub rows: Vec<BandRow>,
}

/// Evaluate `model` at the parameter confidence bounds for each of `years`.
///
/// Returns `None` for an unsupported distribution tag.
pub fn confidence_band<F>(
    model: F,
    params: &[f64],
    covariance: &Covariance,
    sample_count: usize,
    years: &[i32],
    level_percent: f64,
    distribution: &str,
) -> Result<Option<ConfidenceBand>, ForecastError>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let outcome = confidence_bounds(level_percent, sample_count, params, covariance, distribution)?;
    let ConfidenceOutcome::Bounds(bounds) = outcome else {
        tracing::warn!(distribution, "Unsupported distribution; no confidence band");
        return Ok(None);
    };

    let rows = years
        .iter()
        .map(|&year| {
            let x = year as f64;
            BandRow {
                year,
                lower: model(x, &bounds.lower),
                exact: model(x, params),
                upper: model(x, &bounds.upper),
            }
        })
        .collect();

    Ok(Some(ConfidenceBand {
        critical_value: bounds.critical_value,
        lower_params: bounds.lower,
        upper_params: bounds.upper,
        rows,
    }))
}

/// A successfully fitted model and everything derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    #[serde(deserialize_with = "crate::io::nulls_as_nan")]
    pub params: Vec<f64>,
    #[serde(deserialize_with = "crate::io::nulls_as_nan")]
    pub standard_errors: Vec<f64>,
    /// Covariance rows; undefined entries serialize as null
    #[serde(deserialize_with = "crate::io::null_rows_as_nan")]
    pub covariance: Vec<Vec<f64>>,
    pub covariance_defined: bool,
    /// One value per forecast year
    #[serde(deserialize_with = "crate::io::nulls_as_nan")]
    pub predictions: Vec<f64>,
    #[serde(deserialize_with = "crate::io::null_as_nan")]
    pub r_squared: f64,
    pub preset_year: Option<i32>,
    pub band: Option<ConfidenceBand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome {
    Fitted(FittedModel),
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelForecast {
    pub kind: CurveKind,
    pub outcome: ModelOutcome,
}

impl ModelForecast {
    pub fn fitted(&self) -> Option<&FittedModel> {
        match &self.outcome {
            ModelOutcome::Fitted(model) => Some(model),
            ModelOutcome::Failed { .. } => None,
        }
    }
}

/// Result of a forecasting run over every enabled model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastReport {
    pub series_name: String,
    pub observed_years: Vec<i32>,
    #[serde(deserialize_with = "crate::io::nulls_as_nan")]
    pub observed_values: Vec<f64>,
    /// `min(year) - 1 ..= end_year`
    pub future_years: Vec<i32>,
    pub confidence_level: f64,
    pub distribution: String,
    pub models: Vec<ModelForecast>,
}

impl ForecastReport {
    pub fn model(&self, kind: CurveKind) -> Option<&ModelForecast> {
        self.models.iter().find(|m| m.kind == kind)
    }

    pub fn fitted(&self, kind: CurveKind) -> Option<&FittedModel> {
        self.model(kind).and_then(ModelForecast::fitted)
    }

    /// Year-over-year growth of a fitted model's predictions.
    pub fn growth_rates(&self, kind: CurveKind) -> Option<Vec<GrowthRate>> {
        self.fitted(kind)
            .map(|m| growth_rates(&self.future_years, &m.predictions))
    }

    pub fn fitted_count(&self) -> usize {
        self.models.iter().filter(|m| m.fitted().is_some()).count()
    }
}

/// Runs the forecasting operations on one series with one configuration.
pub struct Forecaster<'a> {
    series: &'a ObservationSeries,
    config: &'a ForecastConfig,
}

impl<'a> Forecaster<'a> {
    pub fn new(series: &'a ObservationSeries, config: &'a ForecastConfig) -> Self {
        Self { series, config }
    }

    fn options(&self) -> FitOptions {
        FitOptions {
            max_evaluations: self.config.max_evaluations,
        }
    }

    /// Forecast axis from the year before the first observation to the end year.
    pub fn future_years(&self) -> Vec<i32> {
        match self.series.min_year() {
            Some(min) => (min - 1..=self.config.end_year).collect(),
            None => Vec::new(),
        }
    }

    /// Years covered by confidence bands.
    pub fn band_years(&self) -> Vec<i32> {
        match self.series.max_year() {
            Some(max) => (max..=self.config.end_year).collect(),
            None => Vec::new(),
        }
    }

    pub fn fit_model(&self, kind: CurveKind) -> Result<FittedCurve, ForecastError> {
        fit_model(kind, self.series, &self.config.sigmoid, &self.options())
    }

    fn describe(&self, curve: &FittedCurve) -> Result<FittedModel, ForecastError> {
        let predictions = self
            .future_years()
            .iter()
            .map(|&year| curve.predict(year as f64))
            .collect();
        let fitted_values: Vec<f64> = self
            .series
            .years()
            .iter()
            .map(|&year| curve.predict(year))
            .collect();
        let r_squared = r_squared(&self.series.values(), &fitted_values)?;

        let band = if curve.kind.has_confidence_band() {
            match confidence_band(
                |x, p| curve.predict_with(x, p),
                &curve.params,
                &curve.covariance,
                self.series.len(),
                &self.band_years(),
                self.config.confidence_level,
                &self.config.distribution,
            ) {
                Ok(band) => band,
                Err(e) => {
                    tracing::warn!(model = %curve.kind, error = %e, "Skipping confidence band");
                    None
                }
            }
        } else {
            None
        };

        Ok(FittedModel {
            params: curve.params.clone(),
            standard_errors: curve.covariance.standard_errors(),
            covariance: curve.covariance.to_rows(),
            covariance_defined: curve.covariance.is_defined(),
            predictions,
            r_squared,
            preset_year: curve.preset_year(),
            band,
        })
    }

    /// Fit every configured model. A failing model is recorded and the rest continue.
    pub fn run(&self) -> Result<ForecastReport, ForecastError> {
        if self.series.is_empty() {
            return Err(ForecastError::InsufficientData(format!(
                "Series '{}' has no observations",
                self.series.name
            )));
        }
        if let Some(max_year) = self.series.max_year() {
            if self.config.end_year < max_year {
                return Err(ForecastError::ValidationError(format!(
                    "End year {} precedes the last observation {max_year}",
                    self.config.end_year
                )));
            }
        }

        let models = self
            .config
            .models
            .iter()
            .map(|&kind| {
                let outcome = match self.fit_model(kind).and_then(|curve| self.describe(&curve)) {
                    Ok(fitted) => ModelOutcome::Fitted(fitted),
                    Err(e) => {
                        tracing::warn!(model = %kind, error = %e, "Model unavailable for this run");
                        ModelOutcome::Failed {
                            reason: e.to_string(),
                        }
                    }
                };
                ModelForecast { kind, outcome }
            })
            .collect();

        Ok(ForecastReport {
            series_name: self.series.name.clone(),
            observed_years: self.series.observations().iter().map(|o| o.year).collect(),
            observed_values: self.series.values(),
            future_years: self.future_years(),
            confidence_level: self.config.confidence_level,
            distribution: self.config.distribution.clone(),
            models,
        })
    }

    /// Automatic and manual blended scenarios up to the end year.
    pub fn blend(&self) -> Result<BlendedScenarios, ForecastError> {
        blend_scenarios(
            self.series,
            &self.config.blending,
            self.config.end_year,
            BandRequest {
                level_percent: self.config.confidence_level,
                distribution: &self.config.distribution,
            },
            &self.options(),
        )
    }

    /// Additive decomposition with the configured season length.
    pub fn decompose(&self) -> Result<Decomposition, ForecastError> {
        Decomposition::additive(self.series, self.config.decomposition.period)
    }

    /// Trend logistic plus seasonal sine over the forecast years.
    pub fn periodic(&self) -> Result<PeriodicForecast, ForecastError> {
        periodic_forecast(
            self.series,
            &self.config.decomposition,
            &self.future_years(),
            &self.options(),
        )
    }

    /// Fit the growth-cycle model, apply configured overrides, and report.
    pub fn growth_cycle(&self) -> Result<(GrowthCycleModel, CycleReport), ForecastError> {
        let t = self.series.years();
        let y = self.series.values();
        let overrides = self.config.cycle.typed_overrides()?;

        let mut model = GrowthCycleModel::new();
        model.fit(&t, &y, None, &self.options())?;
        if !overrides.is_empty() {
            model.adjust_parameters(&overrides)?;
            tracing::info!(count = overrides.len(), "Applied growth-cycle overrides");
        }

        let horizon = self.config.cycle.horizon.map(f64::from);
        let report = model.report(&t, &y, horizon, CYCLE_REPORT_SAMPLES)?;
        Ok((model, report))
    }
}
