use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScreenerError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScreenerError {
    /// Short machine-friendly tag, used to bucket failures in run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ScreenerError::InsufficientData(_) => "insufficient_data",
            ScreenerError::InvalidData(_) => "invalid_data",
            ScreenerError::MissingField(_) => "missing_field",
            ScreenerError::ApiError(_) => "api_error",
            ScreenerError::Timeout(_) => "timeout",
            ScreenerError::ParseError(_) => "parse_error",
            ScreenerError::ConfigError(_) => "config_error",
            ScreenerError::Io(_) => "io_error",
        }
    }
}
