use thiserror::Error;

/// Errors that can occur while loading observations, fitting curves or exporting forecasts.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Excel error: {0}")]
    Excel(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// The solver ran out of evaluations or hit a numerical dead end.
    #[error("{model} fit did not converge: {reason}")]
    FitNonConvergence { model: String, reason: String },

    #[error("Unknown parameter: {0}")]
    InvalidParameterName(String),

    #[error("The model has not been fitted yet")]
    ModelNotFitted,

    #[error("Analysis error: {0}")]
    AnalysisError(String),
}

impl From<calamine::Error> for ForecastError {
    fn from(e: calamine::Error) -> Self {
        ForecastError::Excel(e.to_string())
    }
}

impl From<calamine::XlsxError> for ForecastError {
    fn from(e: calamine::XlsxError) -> Self {
        ForecastError::Excel(e.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for ForecastError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        ForecastError::Excel(e.to_string())
    }
}
