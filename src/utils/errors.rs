//! Error types used throughout the application

use crate::planning::allocator::AllocationError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Lectern application
#[derive(Error, Debug)]
pub enum LecternError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM provider error: {0}")]
    Llm(#[from] crate::llm::LlmError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("File system error: {path}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization/deserialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML serialization/deserialization error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing configuration key: {key}")]
    MissingKey { key: String },

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to read configuration: {source}")]
    ReadError {
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write configuration: {source}")]
    WriteError {
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {source}")]
    ParseError {
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {source}")]
    SerializeError {
        #[source]
        source: toml::ser::Error,
    },
}

/// Terminal failure of a lecture-plan generation run.
///
/// Every variant carries the `error_log` accumulated by the pipeline up to the
/// point of failure, so callers can report what went wrong without ever seeing
/// a partially-built plan.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Planning failed: {message}")]
    Planning {
        message: String,
        error_log: Vec<String>,
    },

    #[error("Time allocation failed: {source}")]
    Allocation {
        #[source]
        source: AllocationError,
        error_log: Vec<String>,
    },

    #[error("Language model unavailable: {source}")]
    Model {
        #[source]
        source: crate::llm::LlmError,
        error_log: Vec<String>,
    },

    #[error("Plan failed schema validation after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: usize,
        last_error: String,
        error_log: Vec<String>,
    },

    #[error("Generation cancelled")]
    Cancelled { error_log: Vec<String> },

    #[error("Generation timed out after {timeout_ms}ms")]
    Timeout {
        timeout_ms: u64,
        error_log: Vec<String>,
    },
}

impl GenerationError {
    /// Diagnostic trail accumulated before the failure
    pub fn error_log(&self) -> &[String] {
        match self {
            Self::Planning { error_log, .. }
            | Self::Allocation { error_log, .. }
            | Self::Model { error_log, .. }
            | Self::RetriesExhausted { error_log, .. }
            | Self::Cancelled { error_log }
            | Self::Timeout { error_log, .. } => error_log,
        }
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::Planning { .. } => "planning",
            Self::Allocation { .. } => "allocation",
            Self::Model { .. } => "model",
            Self::RetriesExhausted { .. } => "validation",
            Self::Cancelled { .. } => "cancelled",
            Self::Timeout { .. } => "timeout",
        }
    }
}

impl LecternError {
    /// Create a new validation error
    pub fn validation<S1: Into<String>, S2: Into<String>>(field: S1, message: S2) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new file system error
    pub fn file_system<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    /// Create a new not found error
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a new unknown error
    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Llm(_) => "llm",
            Self::Generation(e) => e.category(),
            Self::Validation { .. } => "validation",
            Self::FileSystem { .. } => "filesystem",
            Self::NotFound { .. } => "notfound",
            Self::Json(_) => "json",
            Self::Yaml(_) => "yaml",
            Self::Toml(_) => "toml",
            Self::Http(_) => "http",
            Self::Io(_) => "io",
            Self::Unknown { .. } => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_error_exposes_log() {
        let err = GenerationError::RetriesExhausted {
            attempts: 4,
            last_error: "agenda[0].details: invalid type".to_string(),
            error_log: vec!["first".to_string(), "second".to_string()],
        };
        assert_eq!(err.error_log(), ["first", "second"]);
        assert_eq!(err.category(), "validation");
        assert!(err.to_string().contains("after 4 attempts"));
    }

    #[test]
    fn test_generation_category_flows_through() {
        let err: LecternError = GenerationError::Cancelled { error_log: Vec::new() }.into();
        assert_eq!(err.category(), "cancelled");
    }
}
