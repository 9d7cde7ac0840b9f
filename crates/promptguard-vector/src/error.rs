use thiserror::Error;

/// Failure of a single backend call.
///
/// `Configuration` excludes a backend from the registry; `Connection` and
/// `Query` degrade a search to an empty result.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() || e.is_body() {
            BackendError::Query(e.to_string())
        } else if e.is_builder() {
            BackendError::Configuration(e.to_string())
        } else {
            BackendError::Connection(e.to_string())
        }
    }
}

impl From<lancedb::Error> for BackendError {
    fn from(e: lancedb::Error) -> Self { BackendError::Storage(e.to_string()) }
}

impl From<arrow_schema::ArrowError> for BackendError {
    fn from(e: arrow_schema::ArrowError) -> Self { BackendError::Storage(e.to_string()) }
}

impl From<promptguard_core::error::Error> for BackendError {
    fn from(e: promptguard_core::error::Error) -> Self { BackendError::Configuration(e.to_string()) }
}
