pub mod analysis;
pub mod config;
pub mod error;
pub mod io;
pub mod models;
pub mod visualization;

pub use analysis::{CurveKind, CycleParameter, Forecaster, ForecastReport, GrowthCycleModel};
pub use config::ForecastConfig;
pub use error::ForecastError;
pub use io::{CsvSource, ExcelSource, ObservationReader};
pub use models::{Observation, ObservationSeries};
