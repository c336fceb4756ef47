//! Box constraints for the curve fitter.
//!
//! The Levenberg-Marquardt solver works on unconstrained internal
//! coordinates. Each bounded parameter is mapped into its box with the
//! MINUIT-style transforms:
//!
//! - both bounds finite: `x = lo + (hi - lo) * (sin(u) + 1) / 2`
//! - lower bound only: `x = lo - 1 + sqrt(u^2 + 1)`
//! - upper bound only: `x = hi + 1 - sqrt(u^2 + 1)`
//! - unbounded: identity
//!
//! so every point the solver visits is feasible.

use serde::{Deserialize, Serialize};

use crate::error::ForecastError;

/// Relative distance a starting value is moved away from an active bound.
///
/// At the bound itself the transforms have zero slope and the solver
/// could never leave it.
const FEASIBILITY_MARGIN: f64 = 1e-6;

/// Lower/upper constraint pair for a single parameter. Infinite ends are open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub lower: f64,
    pub upper: f64,
}

impl Bound {
    pub fn new(lower: f64, upper: f64) -> Result<Self, ForecastError> {
        if lower.is_nan() || upper.is_nan() || lower >= upper {
            return Err(ForecastError::ValidationError(format!(
                "Invalid bound [{lower}, {upper}]: lower must be below upper"
            )));
        }
        Ok(Self { lower, upper })
    }

    pub fn unbounded() -> Self {
        Self {
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    pub fn at_least(lower: f64) -> Self {
        Self {
            lower,
            upper: f64::INFINITY,
        }
    }

    /// Zip separate lower and upper vectors into bounds.
    pub fn from_vectors(lower: &[f64], upper: &[f64]) -> Result<Vec<Self>, ForecastError> {
        if lower.len() != upper.len() {
            return Err(ForecastError::ValidationError(format!(
                "{} lower bounds but {} upper bounds",
                lower.len(),
                upper.len()
            )));
        }
        lower
            .iter()
            .zip(upper)
            .map(|(&lo, &hi)| Self::new(lo, hi))
            .collect()
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.lower && x <= self.upper
    }

    pub fn clamp(&self, x: f64) -> f64 {
        x.max(self.lower).min(self.upper)
    }

    /// Map a starting value into the solver's unconstrained coordinate.
    pub(crate) fn to_internal(&self, x: f64) -> f64 {
        let x = self.clamp(x);
        match (self.lower.is_finite(), self.upper.is_finite()) {
            (true, true) => {
                let ratio = 2.0 * (x - self.lower) / (self.upper - self.lower) - 1.0;
                let limit = 1.0 - FEASIBILITY_MARGIN;
                ratio.clamp(-limit, limit).asin()
            }
            (true, false) => {
                let offset = (x - self.lower).max(FEASIBILITY_MARGIN * self.lower.abs().max(1.0));
                ((offset + 1.0).powi(2) - 1.0).sqrt()
            }
            (false, true) => {
                let offset = (self.upper - x).max(FEASIBILITY_MARGIN * self.upper.abs().max(1.0));
                ((offset + 1.0).powi(2) - 1.0).sqrt()
            }
            (false, false) => x,
        }
    }

    /// Map an unconstrained coordinate back into the box.
    pub(crate) fn to_external(&self, u: f64) -> f64 {
        match (self.lower.is_finite(), self.upper.is_finite()) {
            (true, true) => self.lower + (self.upper - self.lower) * (u.sin() + 1.0) / 2.0,
            (true, false) => self.lower - 1.0 + (u * u + 1.0).sqrt(),
            (false, true) => self.upper + 1.0 - (u * u + 1.0).sqrt(),
            (false, false) => u,
        }
    }
}
