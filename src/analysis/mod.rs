mod blending;
mod bounds;
mod cycle;
mod decomposition;
mod fitter;
mod forecaster;
mod growth;
mod setup;
mod statistics;

pub use blending::{
    blend_scenarios, interpolate, BandRequest, BlendScenario, BlendedScenarios, PiecewiseBlend,
};
pub use bounds::Bound;
pub use cycle::{
    clamped_amplitude, cycle_trend, growth_cycle, CycleParameter, CycleParams, CyclePoint,
    CycleReport, GrowthCycleModel,
};
pub use decomposition::{
    moving_average_trend, periodic_forecast, scaled_sine, Decomposition, PeriodicForecast,
    PeriodicPoint,
};
pub use fitter::{fit_curve, Covariance, CurveFit, FitOptions, DEFAULT_MAX_EVALUATIONS};
pub use forecaster::{
    confidence_band, BandRow, ConfidenceBand, FittedModel, ForecastReport, Forecaster,
    ModelForecast, ModelOutcome,
};
pub use growth::{exponential, gaussian, gompertz, logistic, power_law, CurveKind};
pub use setup::{fit_model, CurveDomain, FittedCurve, ModelSetup};
pub use statistics::{
    confidence_bounds, critical_value, estimate_covariance, growth_rates, r_squared,
    ConfidenceOutcome, Distribution, GrowthRate, ParameterBounds, DEFAULT_JACOBIAN_STEP,
};
