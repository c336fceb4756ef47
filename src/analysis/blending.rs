//! Stitching historical data onto a model forecast.

use serde::{Deserialize, Serialize};

use crate::analysis::bounds::Bound;
use crate::analysis::fitter::{fit_curve, Covariance, FitOptions};
use crate::analysis::forecaster::{confidence_band, BandRow, ConfidenceBand};
use crate::analysis::growth::CurveKind;
use crate::analysis::statistics::{estimate_covariance, DEFAULT_JACOBIAN_STEP};
use crate::config::BlendSettings;
use crate::error::ForecastError;
use crate::models::ObservationSeries;

/// Piecewise-linear interpolation of `(xp, fp)` at `x`, clamped to the end
/// values outside `xp`. `xp` must be ascending.
pub fn interpolate(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return f64::NAN;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    // First knot strictly above x; guaranteed in 1..n by the checks above
    let i = xp[..n].partition_point(|&knot| knot <= x);
    let (x0, x1) = (xp[i - 1], xp[i]);
    let (y0, y1) = (fp[i - 1], fp[i]);
    if x == x0 {
        return y0;
    }
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

/// History up to `cutoff`, the model after `cutoff + width`, and a linear
/// hand-over in between.
#[derive(Debug, Clone, PartialEq)]
pub struct PiecewiseBlend {
    years: Vec<f64>,
    values: Vec<f64>,
    cutoff: f64,
    width: f64,
}

impl PiecewiseBlend {
    pub fn new(
        series: &ObservationSeries,
        cutoff: f64,
        transition_width: f64,
    ) -> Result<Self, ForecastError> {
        if !(transition_width.is_finite() && transition_width >= 0.0) {
            return Err(ForecastError::ValidationError(format!(
                "Transition width must be non-negative, got {transition_width}"
            )));
        }
        if series.is_empty() {
            return Err(ForecastError::InsufficientData(
                "Blending needs at least one observation".to_string(),
            ));
        }
        Ok(Self {
            years: series.years(),
            values: series.values(),
            cutoff,
            width: transition_width,
        })
    }

    pub fn historical(&self, x: f64) -> f64 {
        interpolate(x, &self.years, &self.values)
    }

    /// Blended value at `x`. With a zero width the middle branch is empty,
    /// giving a hard step at the cutoff.
    pub fn value_at<F>(&self, x: f64, model: F) -> f64
    where
        F: Fn(f64) -> f64,
    {
        if x <= self.cutoff {
            self.historical(x)
        } else if x > self.cutoff + self.width {
            model(x)
        } else {
            let weight = (x - self.cutoff) / self.width;
            (1.0 - weight) * self.historical(x) + weight * model(x)
        }
    }

    pub fn values_at<F>(&self, xs: &[f64], model: F) -> Vec<f64>
    where
        F: Fn(f64) -> f64,
    {
        xs.iter().map(|&x| self.value_at(x, &model)).collect()
    }
}

/// One blended forecast line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendScenario {
    /// Logistic `[K, b, x0]` behind the forecast part, `None` after a failed fit
    pub params: Option<Vec<f64>>,
    pub values: Vec<f64>,
    /// Logistic at the parameter confidence bounds over `max(year) ..= end_year`
    #[serde(default)]
    pub band: Option<ConfidenceBand>,
    /// Why the fit was unavailable, if it was
    pub failure: Option<String>,
}

impl BlendScenario {
    pub fn band_row(&self, year: i32) -> Option<&BandRow> {
        self.band.as_ref()?.rows.iter().find(|r| r.year == year)
    }
}

/// Automatic and manual scenarios over a shared year axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendedScenarios {
    pub years: Vec<i32>,
    pub cutoff_year: i32,
    pub auto: BlendScenario,
    pub manual: Option<BlendScenario>,
}

impl BlendedScenarios {
    /// Export columns after the year: the blended lines, then the band edges
    /// of every scenario that has a band. Years outside a band are `None`.
    pub fn columns(&self) -> Vec<(&'static str, Vec<Option<f64>>)> {
        let line = |s: &BlendScenario| -> Vec<Option<f64>> {
            (0..self.years.len()).map(|i| s.values.get(i).copied()).collect()
        };
        let edge = |s: &BlendScenario, upper: bool| -> Vec<Option<f64>> {
            self.years
                .iter()
                .map(|&year| s.band_row(year).map(|r| if upper { r.upper } else { r.lower }))
                .collect()
        };

        let mut columns = vec![("Auto_Piecewise_Blended", line(&self.auto))];
        if let Some(manual) = &self.manual {
            columns.push(("Manual_Piecewise_Blended", line(manual)));
        }
        if self.auto.band.is_some() {
            columns.push(("Auto_Lower", edge(&self.auto, false)));
            columns.push(("Auto_Upper", edge(&self.auto, true)));
        }
        if let Some(manual) = self.manual.as_ref().filter(|m| m.band.is_some()) {
            columns.push(("Manual_Lower", edge(manual, false)));
            columns.push(("Manual_Upper", edge(manual, true)));
        }
        columns
    }
}

fn logistic_model(x: f64, params: &[f64]) -> f64 {
    CurveKind::Logistic.evaluate(x, params)
}

fn fit_auto_logistic(
    series: &ObservationSeries,
    settings: &BlendSettings,
    options: &FitOptions,
) -> Result<(Vec<f64>, Covariance), ForecastError> {
    let max_value = series
        .max_value()
        .ok_or_else(|| ForecastError::InsufficientData("Series is empty".to_string()))?;
    let preset_year = settings.preset_year as f64;
    let initial = [max_value, settings.growth_rate_min, preset_year];
    let bounds = Bound::from_vectors(
        &[
            max_value * settings.capacity_lower_factor,
            settings.growth_rate_min,
            preset_year,
        ],
        &[
            max_value * settings.capacity_upper_factor,
            settings.growth_rate_max,
            settings.preset_year_max as f64,
        ],
    )?;
    let fit = fit_curve(
        "Logistic (auto)",
        logistic_model,
        &series.years(),
        &series.values(),
        &initial,
        &bounds,
        options,
    )?;
    Ok((fit.params, fit.covariance))
}

/// Confidence level and distribution tag for scenario bands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandRequest<'a> {
    pub level_percent: f64,
    pub distribution: &'a str,
}

fn scenario_band(
    params: &[f64],
    covariance: &Covariance,
    series: &ObservationSeries,
    years: &[i32],
    request: BandRequest<'_>,
) -> Option<ConfidenceBand> {
    match confidence_band(
        logistic_model,
        params,
        covariance,
        series.len(),
        years,
        request.level_percent,
        request.distribution,
    ) {
        Ok(band) => band,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping scenario confidence band");
            None
        }
    }
}

/// Build the automatic and, if configured, the manual scenario over
/// `min(year) ..= end_year`.
///
/// Each scenario with a covariance also gets a confidence band over
/// `max(year) ..= end_year`. A failed automatic fit falls back to
/// interpolating the history.
pub fn blend_scenarios(
    series: &ObservationSeries,
    settings: &BlendSettings,
    end_year: i32,
    request: BandRequest<'_>,
    options: &FitOptions,
) -> Result<BlendedScenarios, ForecastError> {
    let (min_year, max_year) = match (series.min_year(), series.max_year()) {
        (Some(min), Some(max)) => (min, max),
        _ => {
            return Err(ForecastError::InsufficientData(
                "Blending needs at least one observation".to_string(),
            ))
        }
    };
    if end_year < min_year {
        return Err(ForecastError::ValidationError(format!(
            "End year {end_year} precedes the first observation {min_year}"
        )));
    }
    let cutoff_year = settings.cutoff_year.unwrap_or(max_year);
    let blend = PiecewiseBlend::new(series, cutoff_year as f64, settings.transition_width)?;
    let years: Vec<i32> = (min_year..=end_year).collect();
    let axis: Vec<f64> = years.iter().map(|&y| y as f64).collect();
    let band_years: Vec<i32> = (max_year..=end_year).collect();

    let auto = match fit_auto_logistic(series, settings, options) {
        Ok((params, covariance)) => {
            tracing::info!(?params, "Automatic logistic fit for blending");
            let values = blend.values_at(&axis, |x| logistic_model(x, &params));
            let band = scenario_band(&params, &covariance, series, &band_years, request);
            BlendScenario {
                params: Some(params),
                values,
                band,
                failure: None,
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Automatic logistic fit failed; using history only");
            BlendScenario {
                params: None,
                values: axis.iter().map(|&x| blend.historical(x)).collect(),
                band: None,
                failure: Some(e.to_string()),
            }
        }
    };

    let manual = settings.manual.map(|m| {
        let params = vec![m.k, m.b, m.x0];
        let band = match estimate_covariance(
            logistic_model,
            &series.years(),
            &series.values(),
            &params,
            DEFAULT_JACOBIAN_STEP,
        ) {
            Ok(cov) => scenario_band(&params, &cov, series, &band_years, request),
            Err(e) => {
                tracing::warn!(error = %e, "No covariance for manual scenario");
                None
            }
        };
        let values = blend.values_at(&axis, |x| logistic_model(x, &params));
        BlendScenario {
            params: Some(params),
            values,
            band,
            failure: None,
        }
    });

    Ok(BlendedScenarios {
        years,
        cutoff_year,
        auto,
        manual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManualLogistic;
    use crate::models::Observation;
    use proptest::prelude::*;

    const BANDS: BandRequest<'static> = BandRequest {
        level_percent: 75.0,
        distribution: "t",
    };

    fn series() -> ObservationSeries {
        let obs = [(2015, 10.0), (2016, 14.0), (2017, 20.0), (2018, 28.0), (2019, 38.0), (2020, 50.0)]
            .into_iter()
            .map(|(year, value)| Observation { year, value })
            .collect();
        ObservationSeries::from_observations("installs", obs).unwrap()
    }

    // --- interpolation ---

    #[test]
    fn test_interpolate_knots_and_between() {
        let xp = [0.0, 1.0, 3.0];
        let fp = [0.0, 10.0, 30.0];
        assert_eq!(interpolate(1.0, &xp, &fp), 10.0);
        assert_eq!(interpolate(2.0, &xp, &fp), 20.0);
        assert_eq!(interpolate(0.5, &xp, &fp), 5.0);
    }

    #[test]
    fn test_interpolate_clamps_outside() {
        let xp = [0.0, 1.0];
        let fp = [3.0, 7.0];
        assert_eq!(interpolate(-5.0, &xp, &fp), 3.0);
        assert_eq!(interpolate(9.0, &xp, &fp), 7.0);
        assert!(interpolate(0.0, &[], &[]).is_nan());
    }

    // --- piecewise blend ---

    #[test]
    fn test_blend_endpoints() {
        let blend = PiecewiseBlend::new(&series(), 2018.0, 2.0).unwrap();
        let model = |x: f64| x * 0.1;
        assert_eq!(blend.value_at(2018.0, model), 28.0);
        assert!((blend.value_at(2020.0, model) - 202.0).abs() < 1e-9);
        // Halfway through the transition
        let mid = blend.value_at(2019.0, model);
        assert!((mid - (0.5 * 38.0 + 0.5 * 201.9)).abs() < 1e-9);
    }

    #[test]
    fn test_zero_width_is_hard_step() {
        let blend = PiecewiseBlend::new(&series(), 2018.0, 0.0).unwrap();
        let model = |_: f64| 1000.0;
        assert_eq!(blend.value_at(2018.0, model), 28.0);
        assert_eq!(blend.value_at(2018.000001, model), 1000.0);
        let all = blend.values_at(&[2017.0, 2018.0, 2019.0, 2030.0], model);
        assert!(all.iter().all(|v| v.is_finite()));
        assert_eq!(all, vec![20.0, 28.0, 1000.0, 1000.0]);
    }

    #[test]
    fn test_negative_width_rejected() {
        let result = PiecewiseBlend::new(&series(), 2018.0, -1.0);
        assert!(matches!(result, Err(ForecastError::ValidationError(_))));
    }

    proptest! {
        #[test]
        fn prop_blend_matches_history_and_model_at_edges(
            cutoff in 2015.0f64..2020.0,
            width in 0.1f64..10.0,
            slope in -5.0f64..5.0,
        ) {
            let blend = PiecewiseBlend::new(&series(), cutoff, width).unwrap();
            let model = |x: f64| slope * (x - 2000.0);
            prop_assert_eq!(blend.value_at(cutoff, model), blend.historical(cutoff));
            let end = cutoff + width;
            prop_assert!((blend.value_at(end, model) - model(end)).abs() < 1e-6);
        }
    }

    // --- scenarios ---

    #[test]
    fn test_scenarios_cover_full_axis() {
        let settings = BlendSettings {
            preset_year: 2018,
            preset_year_max: 2030,
            ..BlendSettings::default()
        };
        let result = blend_scenarios(&series(), &settings, 2040, BANDS, &FitOptions::default()).unwrap();
        assert_eq!(result.years.first(), Some(&2015));
        assert_eq!(result.years.last(), Some(&2040));
        assert_eq!(result.cutoff_year, 2020);
        assert_eq!(result.auto.values.len(), result.years.len());
        // History is reproduced up to the cutoff
        assert_eq!(&result.auto.values[..6], &[10.0, 14.0, 20.0, 28.0, 38.0, 50.0]);
        assert!(result.manual.is_none());
    }

    #[test]
    fn test_failed_auto_fit_falls_back_to_history() {
        let settings = BlendSettings {
            preset_year: 2030,
            preset_year_max: 2030,
            ..BlendSettings::default()
        };
        let result = blend_scenarios(&series(), &settings, 2025, BANDS, &FitOptions::default()).unwrap();
        assert!(result.auto.params.is_none());
        assert!(result.auto.failure.is_some());
        assert_eq!(*result.auto.values.last().unwrap(), 50.0);
    }

    #[test]
    fn test_manual_scenario_with_covariance() {
        let settings = BlendSettings {
            manual: Some(ManualLogistic {
                k: 315.0,
                b: 0.18,
                x0: 2033.0,
            }),
            ..BlendSettings::default()
        };
        let result = blend_scenarios(&series(), &settings, 2050, BANDS, &FitOptions::default()).unwrap();
        let manual = result.manual.unwrap();
        assert_eq!(manual.params, Some(vec![315.0, 0.18, 2033.0]));
        let last = *manual.values.last().unwrap();
        assert!((last - logistic_model(2050.0, &[315.0, 0.18, 2033.0])).abs() < 1e-9);
    }

    #[test]
    fn test_manual_band_symmetric_in_parameters() {
        let params = [60.0, 0.35, 2019.0];
        let settings = BlendSettings {
            manual: Some(ManualLogistic {
                k: params[0],
                b: params[1],
                x0: params[2],
            }),
            ..BlendSettings::default()
        };
        let result = blend_scenarios(&series(), &settings, 2030, BANDS, &FitOptions::default()).unwrap();
        let manual = result.manual.unwrap();
        let band = manual.band.as_ref().expect("manual band");
        assert_eq!(band.rows.first().map(|r| r.year), Some(2020));
        assert_eq!(band.rows.last().map(|r| r.year), Some(2030));
        for i in 0..3 {
            let up = band.upper_params[i] - params[i];
            let down = params[i] - band.lower_params[i];
            assert!(up.is_finite() && up > 0.0, "parameter {i}");
            assert!((up - down).abs() < 1e-9 * params[i].abs().max(1.0));
        }
        let row = manual.band_row(2025).unwrap();
        assert!((row.exact - logistic_model(2025.0, &params)).abs() < 1e-9);
    }

    #[test]
    fn test_band_columns_follow_band_years() {
        let settings = BlendSettings {
            manual: Some(ManualLogistic {
                k: 60.0,
                b: 0.35,
                x0: 2019.0,
            }),
            ..BlendSettings::default()
        };
        let result = blend_scenarios(&series(), &settings, 2030, BANDS, &FitOptions::default()).unwrap();
        let columns = result.columns();
        let (name, lower) = columns
            .iter()
            .find(|(name, _)| *name == "Manual_Lower")
            .expect("manual band column");
        assert_eq!(*name, "Manual_Lower");
        assert_eq!(lower.len(), result.years.len());
        // 2015..2019 precede the band, 2020 opens it
        assert!(lower[..5].iter().all(Option::is_none));
        assert!(lower[5].is_some());
    }

    #[test]
    fn test_unsupported_distribution_leaves_no_band() {
        let settings = BlendSettings {
            manual: Some(ManualLogistic {
                k: 60.0,
                b: 0.35,
                x0: 2019.0,
            }),
            ..BlendSettings::default()
        };
        let request = BandRequest {
            level_percent: 75.0,
            distribution: "chi",
        };
        let result = blend_scenarios(&series(), &settings, 2030, request, &FitOptions::default()).unwrap();
        assert!(result.manual.as_ref().unwrap().band.is_none());
        assert!(result.columns().iter().all(|(name, _)| !name.ends_with("Lower")));
    }

    #[test]
    fn test_end_year_before_history_rejected() {
        let result = blend_scenarios(&series(), &BlendSettings::default(), 2000, BANDS, &FitOptions::default());
        assert!(matches!(result, Err(ForecastError::ValidationError(_))));
    }
}
