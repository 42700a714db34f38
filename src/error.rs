// Chart engine error types
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChartError {
    /// An external data source rejected a fetch
    #[error("External data source '{source_name}' failed: {message}")]
    DataSource { source_name: String, message: String },

    /// Chart definition references a builder which is not registered
    #[error("Unknown builder type: {builder_type}")]
    UnknownBuilder { builder_type: String },

    /// Template references a function which is not registered
    #[error("Unknown function: {function_name}")]
    UnknownFunction { function_name: String },

    #[error("Invalid color palette: {0}")]
    InvalidColorPalette(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A newer recomputation was requested before this one finished
    #[error("Recomputation {generation} was superseded by a newer one")]
    Superseded { generation: u64 },

    #[error("Background task failed: {0}")]
    Task(String),
}

impl ChartError {
    pub fn data_source(source_name: &str, err: anyhow::Error) -> Self {
        ChartError::DataSource {
            source_name: source_name.to_string(),
            message: format!("{:#}", err),
        }
    }
}

impl From<tokio::task::JoinError> for ChartError {
    fn from(err: tokio::task::JoinError) -> Self {
        ChartError::Task(err.to_string())
    }
}

impl From<config::ConfigError> for ChartError {
    fn from(err: config::ConfigError) -> Self {
        ChartError::Config(err.to_string())
    }
}

pub type ChartResult<T> = Result<T, ChartError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChartError::UnknownBuilder {
            builder_type: "magic".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown builder type: magic");

        let err = ChartError::data_source("throughput", anyhow::anyhow!("timeout"));
        assert_eq!(err.to_string(), "External data source 'throughput' failed: timeout");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ChartError = json_err.into();
        assert!(matches!(err, ChartError::Json(_)));
    }
}
