//! Logistic trend with an amplitude-clamped periodic overlay.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::analysis::bounds::Bound;
use crate::analysis::fitter::{fit_curve, Covariance, FitOptions};
use crate::analysis::growth::logistic;
use crate::analysis::statistics::r_squared;
use crate::error::ForecastError;

/// Named entries of the growth-cycle parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CycleParameter {
    /// Saturation value `L`
    Saturation,
    /// Growth rate `k`
    GrowthRate,
    /// Midpoint of growth `t0`
    Midpoint,
    /// Cycle amplitude `A` as a fraction of `L`
    Amplitude,
    /// Cycle period `T`
    Period,
    /// Cycle phase `phi`
    Phase,
    /// Weight `w` of the growth ratio on the cycle amplitude
    Weight,
}

impl CycleParameter {
    pub const ALL: [CycleParameter; 7] = [
        CycleParameter::Saturation,
        CycleParameter::GrowthRate,
        CycleParameter::Midpoint,
        CycleParameter::Amplitude,
        CycleParameter::Period,
        CycleParameter::Phase,
        CycleParameter::Weight,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            CycleParameter::Saturation => "L",
            CycleParameter::GrowthRate => "k",
            CycleParameter::Midpoint => "t0",
            CycleParameter::Amplitude => "A",
            CycleParameter::Period => "T",
            CycleParameter::Phase => "phi",
            CycleParameter::Weight => "w",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CycleParameter::Saturation => "Saturation value",
            CycleParameter::GrowthRate => "Growth rate",
            CycleParameter::Midpoint => "Midpoint of growth",
            CycleParameter::Amplitude => "Amplitude of cycle",
            CycleParameter::Period => "Period of cycle",
            CycleParameter::Phase => "Phase of cycle",
            CycleParameter::Weight => "Weight parameter of cycle",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for CycleParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl std::str::FromStr for CycleParameter {
    type Err = ForecastError;

    /// Symbols are case-sensitive (`T` is the period, `t0` the midpoint).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CycleParameter::ALL
            .into_iter()
            .find(|p| p.symbol() == s.trim())
            .ok_or_else(|| ForecastError::InvalidParameterName(s.to_string()))
    }
}

/// Parameter vector of the growth-cycle model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleParams {
    values: [f64; 7],
}

impl CycleParams {
    pub fn new(
        saturation: f64,
        growth_rate: f64,
        midpoint: f64,
        amplitude: f64,
        period: f64,
        phase: f64,
        weight: f64,
    ) -> Self {
        Self {
            values: [saturation, growth_rate, midpoint, amplitude, period, phase, weight],
        }
    }

    pub fn from_slice(values: &[f64]) -> Option<Self> {
        let values: [f64; 7] = values.try_into().ok()?;
        Some(Self { values })
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, parameter: CycleParameter) -> f64 {
        self.values[parameter.index()]
    }

    pub fn set(&mut self, parameter: CycleParameter, value: f64) {
        self.values[parameter.index()] = value;
    }
}

/// Logistic trend component `L / (1 + e^(-k(t - t0)))`.
pub fn cycle_trend(t: f64, params: &CycleParams) -> f64 {
    logistic(
        t,
        params.get(CycleParameter::Saturation),
        params.get(CycleParameter::GrowthRate),
        params.get(CycleParameter::Midpoint),
    )
}

/// Amplitude of the cycle at trend level `growth`: `min(A * L, min(growth, L - growth))`.
pub fn clamped_amplitude(growth: f64, params: &CycleParams) -> f64 {
    let saturation = params.get(CycleParameter::Saturation);
    let headroom = growth.min(saturation - growth);
    (params.get(CycleParameter::Amplitude) * saturation).min(headroom)
}

/// Composite `growth(t) + cycle(t)`.
///
/// The cycle is `amplitude * (growth / L)^w * sin(2*pi*t / T + phi)` with the
/// amplitude clamped by [`clamped_amplitude`], so the composite never leaves `[0, L]`.
pub fn growth_cycle(t: f64, params: &CycleParams) -> f64 {
    let saturation = params.get(CycleParameter::Saturation);
    let growth = cycle_trend(t, params);
    let amplitude_factor = (growth / saturation).powf(params.get(CycleParameter::Weight));
    let phase = 2.0 * PI * t / params.get(CycleParameter::Period) + params.get(CycleParameter::Phase);
    growth + clamped_amplitude(growth, params) * amplitude_factor * phase.sin()
}

fn growth_cycle_slice(t: f64, params: &[f64]) -> f64 {
    match CycleParams::from_slice(params) {
        Some(p) => growth_cycle(t, &p),
        None => f64::NAN,
    }
}

/// One point of the dense prediction grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CyclePoint {
    pub t: f64,
    pub predicted: f64,
    pub trend: f64,
    pub envelope_lower: f64,
    pub envelope_upper: f64,
}

/// Fitted parameters, goodness of fit and a prediction grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub params: CycleParams,
    pub r_squared: f64,
    pub points: Vec<CyclePoint>,
}

impl CycleReport {
    /// `(symbol, description, value)` for every parameter.
    pub fn named_params(&self) -> Vec<(&'static str, &'static str, f64)> {
        CycleParameter::ALL
            .iter()
            .map(|p| (p.symbol(), p.description(), self.params.get(*p)))
            .collect()
    }
}

/// Stateful growth-cycle model: fit, override, predict.
#[derive(Debug, Clone, Default)]
pub struct GrowthCycleModel {
    params: Option<CycleParams>,
    covariance: Option<Covariance>,
}

impl GrowthCycleModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(&self) -> Option<&CycleParams> {
        self.params.as_ref()
    }

    pub fn covariance(&self) -> Option<&Covariance> {
        self.covariance.as_ref()
    }

    /// Starting point derived from simple data statistics.
    pub fn default_initial_guess(t_data: &[f64], y_data: &[f64]) -> CycleParams {
        let max_value = y_data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean_t = t_data.iter().sum::<f64>() / t_data.len().max(1) as f64;
        CycleParams::new(max_value * 0.5, 0.01, mean_t - 1.0, 0.01, 53.0, 0.0, 1.0)
    }

    /// Box constraints: non-negative parameters, `t0` in `[min t, max t + 15]`,
    /// `A <= 1` and `phi` in `[-pi, pi]`.
    pub fn bounds(t_data: &[f64]) -> Result<Vec<Bound>, ForecastError> {
        let t_min = t_data.iter().copied().fold(f64::INFINITY, f64::min);
        let t_max = t_data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Ok(vec![
            Bound::at_least(0.0),
            Bound::at_least(0.0),
            Bound::new(t_min, t_max + 15.0)?,
            Bound::new(0.0, 1.0)?,
            Bound::at_least(0.0),
            Bound::new(-PI, PI)?,
            Bound::at_least(0.0),
        ])
    }

    /// Fit the model, replacing any previous parameters.
    pub fn fit(
        &mut self,
        t_data: &[f64],
        y_data: &[f64],
        initial: Option<CycleParams>,
        options: &FitOptions,
    ) -> Result<&mut Self, ForecastError> {
        if t_data.is_empty() {
            return Err(ForecastError::InsufficientData(
                "Growth-cycle fit needs observations".to_string(),
            ));
        }
        let initial = initial.unwrap_or_else(|| Self::default_initial_guess(t_data, y_data));
        let bounds = Self::bounds(t_data)?;

        let fit = fit_curve(
            "Growth-cycle",
            growth_cycle_slice,
            t_data,
            y_data,
            initial.as_slice(),
            &bounds,
            options,
        )?;

        let params = CycleParams::from_slice(&fit.params).ok_or_else(|| {
            ForecastError::AnalysisError("Solver returned a malformed parameter vector".to_string())
        })?;
        tracing::info!(params = ?params.as_slice(), "Fitted growth-cycle model");
        self.params = Some(params);
        self.covariance = Some(fit.covariance);
        Ok(self)
    }

    /// Override fitted parameters in place.
    pub fn adjust_parameters(
        &mut self,
        updates: &[(CycleParameter, f64)],
    ) -> Result<(), ForecastError> {
        let params = self.params.as_mut().ok_or(ForecastError::ModelNotFitted)?;
        for &(parameter, value) in updates {
            params.set(parameter, value);
        }
        Ok(())
    }

    /// Override fitted parameters by symbol.
    ///
    /// Every name is resolved before anything is written, so an unknown
    /// name leaves the parameters untouched.
    pub fn adjust_named(&mut self, updates: &[(&str, f64)]) -> Result<(), ForecastError> {
        if self.params.is_none() {
            return Err(ForecastError::ModelNotFitted);
        }
        let typed = updates
            .iter()
            .map(|&(name, value)| Ok((name.parse::<CycleParameter>()?, value)))
            .collect::<Result<Vec<_>, ForecastError>>()?;
        self.adjust_parameters(&typed)
    }

    pub fn predict(&self, t: f64) -> Result<f64, ForecastError> {
        let params = self.params.as_ref().ok_or(ForecastError::ModelNotFitted)?;
        Ok(growth_cycle(t, params))
    }

    pub fn predict_all(&self, t: &[f64]) -> Result<Vec<f64>, ForecastError> {
        let params = self.params.as_ref().ok_or(ForecastError::ModelNotFitted)?;
        Ok(t.iter().map(|&ti| growth_cycle(ti, params)).collect())
    }

    /// R² of the current parameters against observed data.
    pub fn r_squared(&self, t_data: &[f64], y_data: &[f64]) -> Result<f64, ForecastError> {
        r_squared(y_data, &self.predict_all(t_data)?)
    }

    /// Build the report over `min(t) ..= horizon + 1` (or `max(t) + 10`) with `samples` points.
    pub fn report(
        &self,
        t_data: &[f64],
        y_data: &[f64],
        horizon: Option<f64>,
        samples: usize,
    ) -> Result<CycleReport, ForecastError> {
        let params = *self.params.as_ref().ok_or(ForecastError::ModelNotFitted)?;
        let t_min = t_data.iter().copied().fold(f64::INFINITY, f64::min);
        let t_max = t_data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let end = match horizon {
            Some(h) => h + 1.0,
            None => t_max + 10.0,
        };
        let samples = samples.max(2);
        let step = (end - t_min) / (samples - 1) as f64;

        let saturation = params.get(CycleParameter::Saturation);
        let amplitude = params.get(CycleParameter::Amplitude);
        let weight = params.get(CycleParameter::Weight);
        let points = (0..samples)
            .map(|i| {
                let t = t_min + step * i as f64;
                let trend = cycle_trend(t, &params);
                let spread = amplitude * (trend / saturation).powf(weight);
                CyclePoint {
                    t,
                    predicted: growth_cycle(t, &params),
                    trend,
                    envelope_lower: trend - spread,
                    envelope_upper: trend + spread,
                }
            })
            .collect();

        Ok(CycleReport {
            params,
            r_squared: self.r_squared(t_data, y_data)?,
            points,
        })
    }
}
