//! Per-family starting points, box constraints and input domains.

use serde::{Deserialize, Serialize};

use crate::analysis::bounds::Bound;
use crate::analysis::fitter::{fit_curve, Covariance, FitOptions};
use crate::analysis::growth::CurveKind;
use crate::config::SigmoidSettings;
use crate::error::ForecastError;
use crate::models::{ObservationSeries, YearNormalization, YearShift};

/// Coordinate system a curve is fitted in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CurveDomain {
    /// Calendar years as they are
    Years,
    /// Years mapped onto `[0, 1]` over the history
    Normalized(YearNormalization),
    /// Years minus the first historical year
    Shifted(YearShift),
}

impl CurveDomain {
    pub fn to_domain(&self, year: f64) -> f64 {
        match self {
            CurveDomain::Years => year,
            CurveDomain::Normalized(n) => n.normalize(year),
            CurveDomain::Shifted(s) => s.shift(year),
        }
    }
}

/// Everything needed to start a fit of one curve family.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSetup {
    pub kind: CurveKind,
    pub domain: CurveDomain,
    pub initial: Vec<f64>,
    pub bounds: Vec<Bound>,
}

impl ModelSetup {
    /// Initial guess and bounds for `kind` derived from the series.
    pub fn for_kind(
        kind: CurveKind,
        series: &ObservationSeries,
        settings: &SigmoidSettings,
    ) -> Result<Self, ForecastError> {
        let (min_year, max_value) = match (series.min_year(), series.max_value()) {
            (Some(year), Some(value)) => (year as f64, value),
            _ => {
                return Err(ForecastError::InsufficientData(format!(
                    "{kind} fit needs observations"
                )))
            }
        };
        let preset_year = settings.preset_year as f64;
        let preset_year_max = settings.preset_year_max as f64;
        let capacity_max = max_value * settings.values_coeff_max;

        let setup = match kind {
            CurveKind::Logistic | CurveKind::Gompertz => Self {
                kind,
                domain: CurveDomain::Years,
                initial: vec![
                    max_value * settings.initial_capacity_factor,
                    settings.initial_rate,
                    preset_year,
                ],
                bounds: Bound::from_vectors(
                    &[max_value, 0.0, min_year],
                    &[capacity_max, 5.0, preset_year_max],
                )?,
            },
            CurveKind::Gaussian => Self {
                kind,
                domain: CurveDomain::Years,
                initial: vec![max_value * 0.5, 0.5, 1.0, preset_year],
                bounds: Bound::from_vectors(
                    &[max_value * 0.1, 0.0, 0.0, min_year],
                    &[max_value * 1.5, f64::INFINITY, 10.0, preset_year_max],
                )?,
            },
            CurveKind::Exponential => {
                let normalization = YearNormalization::from_years(&series.years())?;
                Self {
                    kind,
                    domain: CurveDomain::Normalized(normalization),
                    initial: vec![max_value * 1.5, 0.5, 1.0],
                    bounds: Bound::from_vectors(
                        &[max_value, 0.0, 0.0],
                        &[
                            capacity_max,
                            normalization.normalize(preset_year_max),
                            f64::INFINITY,
                        ],
                    )?,
                }
            }
            CurveKind::PowerLaw => Self {
                kind,
                domain: CurveDomain::Shifted(YearShift::from_years(&series.years())?),
                initial: vec![1.0, 0.01],
                bounds: vec![Bound::at_least(0.0), Bound::at_least(0.0)],
            },
        };
        Ok(setup)
    }
}

/// A curve family with fitted parameters and the domain they live in.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedCurve {
    pub kind: CurveKind,
    pub domain: CurveDomain,
    pub params: Vec<f64>,
    pub covariance: Covariance,
}

impl FittedCurve {
    /// Prediction for a calendar year.
    pub fn predict(&self, year: f64) -> f64 {
        self.predict_with(year, &self.params)
    }

    /// Prediction for a calendar year using substitute parameters, such as
    /// confidence bounds.
    pub fn predict_with(&self, year: f64, params: &[f64]) -> f64 {
        self.kind.evaluate(self.domain.to_domain(year), params)
    }

    /// Year of steepest growth, truncated to a whole year.
    ///
    /// Sigmoids report their midpoint; the exponential maps its scale back
    /// from the normalized axis. Other families have none.
    pub fn preset_year(&self) -> Option<i32> {
        match (self.kind, self.domain) {
            (CurveKind::Logistic | CurveKind::Gompertz, _) => self.params.get(2).map(|x0| x0.trunc() as i32),
            (CurveKind::Exponential, CurveDomain::Normalized(n)) => {
                self.params.get(1).map(|&l| n.denormalize(l).trunc() as i32)
            }
            _ => None,
        }
    }
}

/// Fit one curve family to a series with the family's own starting point and bounds.
pub fn fit_model(
    kind: CurveKind,
    series: &ObservationSeries,
    settings: &SigmoidSettings,
    options: &FitOptions,
) -> Result<FittedCurve, ForecastError> {
    series.require_at_least(kind.num_params())?;
    let setup = ModelSetup::for_kind(kind, series, settings)?;
    let x: Vec<f64> = series
        .years()
        .iter()
        .map(|&year| setup.domain.to_domain(year))
        .collect();

    let fit = fit_curve(
        kind.label(),
        |xi, params| kind.evaluate(xi, params),
        &x,
        &series.values(),
        &setup.initial,
        &setup.bounds,
        options,
    )?;
    tracing::info!(model = %kind, params = ?fit.params, evaluations = fit.evaluations, "Model fitted");

    Ok(FittedCurve {
        kind,
        domain: setup.domain,
        params: fit.params,
        covariance: fit.covariance,
    })
}
