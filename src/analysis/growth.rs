use serde::{Deserialize, Serialize};

use crate::error::ForecastError;

/// Logistic growth: `K / (1 + e^(-b(x - x0)))`.
pub fn logistic(x: f64, k: f64, b: f64, x0: f64) -> f64 {
    k / (1.0 + (-b * (x - x0)).exp())
}

/// Gompertz growth: `K * e^(-e^(-b(x - x0)))`.
pub fn gompertz(x: f64, k: f64, b: f64, x0: f64) -> f64 {
    k * (-(-b * (x - x0)).exp()).exp()
}

/// Two-sided Gaussian: spread `c1` left of the peak `u`, `c2` from `u` onwards.
pub fn gaussian(x: f64, a: f64, c1: f64, c2: f64, u: f64) -> f64 {
    let spread = if x < u { c1 } else { c2 };
    a * (-0.5 * ((x - u) / spread).powi(2)).exp()
}

/// Stretched exponential saturation `c * (1 - e^(-(x/l)^a))` on normalized years.
pub fn exponential(x: f64, c: f64, l: f64, a: f64) -> f64 {
    c * (1.0 - (-(x / l).powf(a)).exp())
}

/// Power law `a * x^b` on years shifted to start at zero.
pub fn power_law(x: f64, a: f64, b: f64) -> f64 {
    a * x.powf(b)
}

/// Parametric growth curve families that can be fitted to a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveKind {
    Logistic,
    Gompertz,
    Gaussian,
    Exponential,
    PowerLaw,
}

impl CurveKind {
    pub const ALL: [CurveKind; 5] = [
        CurveKind::Logistic,
        CurveKind::Gompertz,
        CurveKind::Gaussian,
        CurveKind::Exponential,
        CurveKind::PowerLaw,
    ];

    /// Human readable name used in tables and export headers.
    pub fn label(&self) -> &'static str {
        match self {
            CurveKind::Logistic => "Logistic",
            CurveKind::Gompertz => "Gompertz",
            CurveKind::Gaussian => "Gaussian",
            CurveKind::Exponential => "Exponential",
            CurveKind::PowerLaw => "Power Law",
        }
    }

    pub fn parameter_names(&self) -> &'static [&'static str] {
        match self {
            CurveKind::Logistic | CurveKind::Gompertz => &["K", "b", "x0"],
            CurveKind::Gaussian => &["A", "c1", "c2", "u"],
            CurveKind::Exponential => &["c", "l", "a"],
            CurveKind::PowerLaw => &["a", "b"],
        }
    }

    pub fn num_params(&self) -> usize {
        self.parameter_names().len()
    }

    /// Whether forecasts of this family carry a parameter confidence band.
    pub fn has_confidence_band(&self) -> bool {
        matches!(self, CurveKind::Logistic | CurveKind::Gompertz)
    }

    /// Evaluate the curve at `x`. A parameter slice of the wrong length yields NaN.
    pub fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
        match (self, params) {
            (CurveKind::Logistic, &[k, b, x0]) => logistic(x, k, b, x0),
            (CurveKind::Gompertz, &[k, b, x0]) => gompertz(x, k, b, x0),
            (CurveKind::Gaussian, &[a, c1, c2, u]) => gaussian(x, a, c1, c2, u),
            (CurveKind::Exponential, &[c, l, a]) => exponential(x, c, l, a),
            (CurveKind::PowerLaw, &[a, b]) => power_law(x, a, b),
            _ => f64::NAN,
        }
    }

    /// Elementwise evaluation over a batch of inputs.
    pub fn evaluate_all(&self, xs: &[f64], params: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.evaluate(x, params)).collect()
    }
}

impl std::fmt::Display for CurveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for CurveKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace([' ', '-'], "_").as_str() {
            "logistic" | "log" => Ok(CurveKind::Logistic),
            "gompertz" | "gomp" => Ok(CurveKind::Gompertz),
            "gaussian" | "gauss" => Ok(CurveKind::Gaussian),
            "exponential" | "exp" => Ok(CurveKind::Exponential),
            "power_law" | "power" => Ok(CurveKind::PowerLaw),
            _ => Err(ForecastError::ParseError(format!(
                "Unknown growth model: '{s}'"
            ))),
        }
    }
}
