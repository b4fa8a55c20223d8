use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FetchzipError>;

/// Setup and configuration failures. Run outcomes carry [`FetchError`] and
/// [`ExtractError`]; commands wrap them here when a run fails.
#[derive(Error, Debug)]
pub enum FetchzipError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing setting '{field}' (pass it as a flag or set it in the config file)")]
    MissingSetting { field: &'static str },

    #[error("Unsupported config file format: {path}")]
    UnsupportedConfigFormat { path: PathBuf },

    #[error("Config directory not found")]
    ConfigDirectoryNotFound,

    #[error("HTTP client error: {message}")]
    HttpClient { message: String },

    #[error("Logging setup error: {message}")]
    Logging { message: String },

    #[error("Failed to set signal handler: {message}")]
    SignalHandler { message: String },

    #[error("Config file already exists: {path} (use --force to overwrite)")]
    ConfigExists { path: PathBuf },

    #[error("Unknown run: {run}")]
    UnknownRun { run: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl FetchzipError {
    pub fn config_error<S: Into<String>>(message: S) -> Self {
        FetchzipError::ConfigError {
            message: message.into(),
        }
    }

    /// True when a download was stopped on request rather than failing.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchzipError::Fetch(FetchError::Cancelled))
    }
}

/// Terminal failure of a download run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Download failed: {0}")]
    IoFailure(String),

    #[error("Download cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn io<S: Into<String>>(message: S) -> Self {
        FetchError::IoFailure(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

/// Terminal failure of an extraction run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Cannot open archive {path}: {reason}")]
    OpenFailure { path: PathBuf, reason: String },

    #[error("Extraction of {path} failed: {reason}")]
    CorruptOrIoFailure { path: PathBuf, reason: String },
}

impl ExtractError {
    pub fn open_failure<S: Into<String>>(path: &std::path::Path, reason: S) -> Self {
        ExtractError::OpenFailure {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn corrupt<S: Into<String>>(path: &std::path::Path, reason: S) -> Self {
        ExtractError::CorruptOrIoFailure {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_distinct_from_failure() {
        assert!(FetchError::Cancelled.is_cancelled());
        assert!(!FetchError::io("connection reset").is_cancelled());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            FetchError::io("connection reset").to_string(),
            "Download failed: connection reset"
        );
        let err = ExtractError::open_failure(std::path::Path::new("a.zip"), "not found");
        assert_eq!(err.to_string(), "Cannot open archive a.zip: not found");
        let err = FetchzipError::MissingSetting {
            field: "source_address",
        };
        assert!(err.to_string().contains("source_address"));
    }

    #[test]
    fn test_wrapped_cancellation() {
        let err: FetchzipError = FetchError::Cancelled.into();
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "Download cancelled");

        let err: FetchzipError = FetchError::io("reset").into();
        assert!(!err.is_cancelled());
    }
}
