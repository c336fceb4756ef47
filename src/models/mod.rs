mod normalization;
mod observation;

pub use normalization::{YearNormalization, YearShift};
pub use observation::{Observation, ObservationSeries, SeriesSummary};
