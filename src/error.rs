use arrow_schema::ArrowError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parquet Error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("Arrow Error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("Data Format Error: {0}")]
    DataFormat(String),
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP Client Error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unknown season name: {0}")]
    UnknownSeason(String),
    #[error("No observations for city: {0}")]
    EmptySeries(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failure of a single current-temperature request.
///
/// Every variant is contained to the city it happened for; a batch fetch
/// turns it into a "no data" entry instead of propagating it.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchError {
    #[error("credential rejected: {message}")]
    CredentialRejected { message: String },
    #[error("network failure: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },
}

impl FetchError {
    pub fn is_credential_rejected(&self) -> bool {
        matches!(self, FetchError::CredentialRejected { .. })
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_decode() {
            FetchError::MalformedResponse(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}
