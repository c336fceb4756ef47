use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use crate::analysis::fitter::{central_jacobian, Covariance, Step};
use crate::error::ForecastError;

/// Default finite-difference step of the covariance estimator.
pub const DEFAULT_JACOBIAN_STEP: f64 = 1e-9;

/// Distribution the critical value is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distribution {
    /// Standard normal ("z")
    #[serde(rename = "z")]
    Normal,
    /// Student-t with `n - 1` degrees of freedom ("t")
    #[serde(rename = "t")]
    StudentT,
}

impl Distribution {
    /// Parse a distribution tag. Unrecognized tags yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "z" | "Z" => Some(Distribution::Normal),
            "t" | "T" => Some(Distribution::StudentT),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Distribution::Normal => "z",
            Distribution::StudentT => "t",
        }
    }
}

/// Lower and upper parameter vectors around a fitted parameter vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub critical_value: f64,
    pub standard_errors: Vec<f64>,
}

/// Outcome of a confidence-bound request.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfidenceOutcome {
    Bounds(ParameterBounds),
    /// The distribution tag was not recognized.
    Unsupported,
}

impl ConfidenceOutcome {
    pub fn bounds(&self) -> Option<&ParameterBounds> {
        match self {
            ConfidenceOutcome::Bounds(b) => Some(b),
            ConfidenceOutcome::Unsupported => None,
        }
    }
}

/// Critical value at probability `0.5 + alpha / 2` with `alpha = 1 - level / 100`.
pub fn critical_value(
    level_percent: f64,
    sample_count: usize,
    distribution: Distribution,
) -> Result<f64, ForecastError> {
    if !(0.0..=100.0).contains(&level_percent) {
        return Err(ForecastError::ValidationError(format!(
            "Confidence level must be within 0-100, got {level_percent}"
        )));
    }
    let alpha = 1.0 - level_percent / 100.0;
    let probability = 0.5 + alpha / 2.0;

    match distribution {
        Distribution::Normal => {
            let normal =
                Normal::new(0.0, 1.0).map_err(|e| ForecastError::AnalysisError(e.to_string()))?;
            Ok(normal.inverse_cdf(probability))
        }
        Distribution::StudentT => {
            if sample_count < 2 {
                return Err(ForecastError::InsufficientData(
                    "Student-t bounds need at least 2 observations".to_string(),
                ));
            }
            let df = (sample_count - 1) as f64;
            let t_dist = StudentsT::new(0.0, 1.0, df)
                .map_err(|e| ForecastError::AnalysisError(e.to_string()))?;
            Ok(t_dist.inverse_cdf(probability))
        }
    }
}

/// Per-parameter confidence bounds `params -/+ critical_value * sqrt(diag(cov))`.
///
/// An unrecognized distribution tag returns [`ConfidenceOutcome::Unsupported`].
/// An undefined covariance yields NaN bounds.
pub fn confidence_bounds(
    level_percent: f64,
    sample_count: usize,
    params: &[f64],
    covariance: &Covariance,
    distribution: &str,
) -> Result<ConfidenceOutcome, ForecastError> {
    let Some(distribution) = Distribution::from_tag(distribution) else {
        return Ok(ConfidenceOutcome::Unsupported);
    };
    if covariance.dimension() != params.len() {
        return Err(ForecastError::ValidationError(format!(
            "Covariance is {0}x{0} but there are {1} parameters",
            covariance.dimension(),
            params.len()
        )));
    }

    let critical = critical_value(level_percent, sample_count, distribution)?;
    let standard_errors = covariance.standard_errors();
    let (lower, upper) = params
        .iter()
        .zip(&standard_errors)
        .map(|(&p, &se)| {
            let half_width = critical * se;
            (p - half_width, p + half_width)
        })
        .unzip();

    Ok(ConfidenceOutcome::Bounds(ParameterBounds {
        lower,
        upper,
        critical_value: critical,
        standard_errors,
    }))
}

/// Covariance of an arbitrary parameter set against data, for parameters that
/// did not come out of a fit.
///
/// Uses a central-difference Jacobian with step `eps` and
/// `MSE * inv(J^T J)` with `MSE = SSR / (n - p)`. A singular `J^T J` gives
/// [`Covariance::Undefined`].
pub fn estimate_covariance<F>(
    model: F,
    x: &[f64],
    y: &[f64],
    params: &[f64],
    eps: f64,
) -> Result<Covariance, ForecastError>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let n = x.len();
    let p = params.len();
    if n != y.len() {
        return Err(ForecastError::ValidationError(format!(
            "{n} x values but {} y values",
            y.len()
        )));
    }
    if n <= p {
        return Err(ForecastError::InsufficientData(format!(
            "Covariance of {p} parameters needs more than {p} observations, got {n}"
        )));
    }
    if !(eps.is_finite() && eps > 0.0) {
        return Err(ForecastError::ValidationError(format!(
            "Finite-difference step must be positive, got {eps}"
        )));
    }

    let jac = central_jacobian(&model, x, params, Step::Absolute(eps));
    let ssr: f64 = x
        .iter()
        .zip(y)
        .map(|(&xi, &yi)| (yi - model(xi, params)).powi(2))
        .sum();
    let mse = ssr / (n - p) as f64;

    let normal_matrix = jac.transpose() * &jac;
    match normal_matrix.try_inverse() {
        Some(inverse) if inverse.iter().all(|v| v.is_finite()) => {
            Ok(Covariance::Defined(inverse * mse))
        }
        _ => {
            tracing::warn!(parameters = p, "Normal equations are singular; covariance undefined");
            Ok(Covariance::Undefined { dimension: p })
        }
    }
}

/// Coefficient of determination of `fitted` against `observed`.
///
/// A constant series scores 1 when reproduced exactly and 0 otherwise.
pub fn r_squared(observed: &[f64], fitted: &[f64]) -> Result<f64, ForecastError> {
    if observed.len() != fitted.len() || observed.is_empty() {
        return Err(ForecastError::ValidationError(format!(
            "Cannot score {} fitted values against {} observations",
            fitted.len(),
            observed.len()
        )));
    }
    let mean = observed.iter().sum::<f64>() / observed.len() as f64;
    let ss_res: f64 = observed
        .iter()
        .zip(fitted)
        .map(|(o, f)| (o - f).powi(2))
        .sum();
    let ss_tot: f64 = observed.iter().map(|o| (o - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

/// A year-over-year relative change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthRate {
    pub year: i32,
    pub rate: f64,
}

/// Relative change `(v[i] - v[i-1]) / v[i-1]`, labelled with the later year.
pub fn growth_rates(years: &[i32], values: &[f64]) -> Vec<GrowthRate> {
    years
        .iter()
        .zip(values)
        .collect::<Vec<_>>()
        .windows(2)
        .map(|w| {
            let (_, &previous) = w[0];
            let (&year, &current) = w[1];
            GrowthRate {
                year,
                rate: (current - previous) / previous,
            }
        })
        .collect()
}
