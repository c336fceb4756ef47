use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::{CurveKind, CycleParameter, DEFAULT_MAX_EVALUATIONS};
use crate::error::ForecastError;

/// Initial-guess and bound coefficients shared by the sigmoid-style models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmoidSettings {
    /// Expected year of the steepest growth, used as the starting midpoint
    pub preset_year: i32,
    /// Latest admissible midpoint year
    pub preset_year_max: i32,
    /// Saturation may reach at most `max(values) * values_coeff_max`
    pub values_coeff_max: f64,
    /// Starting saturation as a multiple of `max(values)`
    pub initial_capacity_factor: f64,
    /// Starting growth rate
    pub initial_rate: f64,
}

impl Default for SigmoidSettings {
    fn default() -> Self {
        Self {
            preset_year: 2026,
            preset_year_max: 2035,
            values_coeff_max: 10.0,
            initial_capacity_factor: 3.0,
            initial_rate: 0.1,
        }
    }
}

/// Fixed logistic parameters for the manual blending scenario.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManualLogistic {
    pub k: f64,
    pub b: f64,
    pub x0: f64,
}

/// History/forecast stitching and the bounds of its automatic logistic fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendSettings {
    /// Last year taken verbatim from the history; defaults to the last observed year
    pub cutoff_year: Option<i32>,
    /// Width in years of the linear hand-over from history to model
    pub transition_width: f64,
    pub growth_rate_min: f64,
    pub growth_rate_max: f64,
    pub capacity_lower_factor: f64,
    pub capacity_upper_factor: f64,
    pub preset_year: i32,
    pub preset_year_max: i32,
    pub manual: Option<ManualLogistic>,
}

impl Default for BlendSettings {
    fn default() -> Self {
        Self {
            cutoff_year: None,
            transition_width: 1.0,
            growth_rate_min: 0.01,
            growth_rate_max: 1.5,
            capacity_lower_factor: 0.6,
            capacity_upper_factor: 7.3,
            preset_year: 2035,
            preset_year_max: 2040,
            manual: None,
        }
    }
}

/// Growth-cycle model options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleSettings {
    /// Manual overrides applied after fitting, keyed by parameter symbol (L, k, t0, A, T, phi, w)
    pub overrides: BTreeMap<String, f64>,
    /// Last year of the prediction grid
    pub horizon: Option<i32>,
}

impl CycleSettings {
    /// Resolve override keys into typed parameters.
    pub fn typed_overrides(&self) -> Result<Vec<(CycleParameter, f64)>, ForecastError> {
        self.overrides
            .iter()
            .map(|(name, &value)| Ok((name.parse::<CycleParameter>()?, value)))
            .collect()
    }
}

/// Seasonal decomposition and the trend-plus-season forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionSettings {
    /// Season length in observations
    pub period: usize,
    /// Starting midpoint of the trend logistic
    pub preset_year: i32,
    /// Latest admissible midpoint of the trend logistic
    pub preset_year_max: i32,
}

impl Default for DecompositionSettings {
    fn default() -> Self {
        Self {
            period: 5,
            preset_year: 2020,
            preset_year_max: 2035,
        }
    }
}

/// Complete configuration of a forecasting run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Confidence level in percent
    pub confidence_level: f64,
    /// Critical-value distribution: "z" or "t"
    pub distribution: String,
    /// Last forecast year
    pub end_year: i32,
    pub models: Vec<CurveKind>,
    pub max_evaluations: usize,
    pub sigmoid: SigmoidSettings,
    pub blending: BlendSettings,
    pub cycle: CycleSettings,
    pub decomposition: DecompositionSettings,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            confidence_level: 75.0,
            distribution: "t".to_string(),
            end_year: 2050,
            models: vec![CurveKind::Logistic],
            max_evaluations: DEFAULT_MAX_EVALUATIONS,
            sigmoid: SigmoidSettings::default(),
            blending: BlendSettings::default(),
            cycle: CycleSettings::default(),
            decomposition: DecompositionSettings::default(),
        }
    }
}

impl ForecastConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ForecastError> {
        let config: ForecastConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ForecastError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.as_ref().display(), "Loaded configuration");
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ForecastError> {
        toml::to_string_pretty(self).map_err(|e| ForecastError::ParseError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ForecastError> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 100.0) {
            return Err(ForecastError::ValidationError(format!(
                "Confidence level must be between 0 and 100, got {}",
                self.confidence_level
            )));
        }
        if self.max_evaluations == 0 {
            return Err(ForecastError::ValidationError(
                "max_evaluations must be positive".to_string(),
            ));
        }
        if !(self.blending.transition_width.is_finite() && self.blending.transition_width >= 0.0) {
            return Err(ForecastError::ValidationError(format!(
                "Transition width must be non-negative, got {}",
                self.blending.transition_width
            )));
        }
        if self.sigmoid.values_coeff_max <= 1.0 {
            return Err(ForecastError::ValidationError(format!(
                "values_coeff_max must exceed 1, got {}",
                self.sigmoid.values_coeff_max
            )));
        }
        if self.decomposition.period < 2 {
            return Err(ForecastError::ValidationError(format!(
                "Seasonal period must be at least 2, got {}",
                self.decomposition.period
            )));
        }
        self.cycle.typed_overrides()?;
        Ok(())
    }
}
