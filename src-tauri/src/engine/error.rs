//! Error taxonomy for the job engine.

use std::fmt;
use thiserror::Error;

/// One problem found while validating a set of processing options
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field}: unknown {vocabulary} '{value}'")]
    UnknownValue {
        field: &'static str,
        vocabulary: &'static str,
        value: String,
    },

    #[error("{field} is enabled but {parameter} is not set")]
    MissingParameter {
        field: &'static str,
        parameter: &'static str,
    },

    #[error("{field}: '{value}' is not valid ({reason})")]
    InvalidParameter {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("{field}: {value} is out of range ({expected})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("output size {width}x{height} must have even dimensions unless upscaling is enabled")]
    DimensionParity { width: u32, height: u32 },
}

/// A list of validation errors rendered one per line
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid processing options: {0}")]
    Validation(ValidationErrors),

    #[error("A job is already running ({job_id})")]
    JobAlreadyRunning { job_id: String },

    #[error("Failed to launch worker '{program}': {source}")]
    WorkerLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker exited with {}", exit_label(.code))]
    WorkerRuntime { code: Option<i32>, tail: Vec<String> },

    #[error("Host call '{operation}' failed: {reason}")]
    HostUnavailable { operation: &'static str, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl EngineError {
    /// Suggested next step for the user, when there is one
    pub fn remedy(&self) -> Option<&'static str> {
        match self {
            EngineError::Validation(_) => Some("Adjust the highlighted options and try again."),
            EngineError::JobAlreadyRunning { .. } => {
                Some("Wait for the current job to finish or cancel it first.")
            }
            EngineError::WorkerLaunch { .. } => {
                Some("Download or reinstall the worker dependencies, then try again.")
            }
            EngineError::WorkerRuntime { .. } => {
                Some("Check the log for details; try another model or encoding method.")
            }
            EngineError::HostUnavailable { operation, .. } if *operation == "pre_render" => {
                Some("Check the encoding method and that the composition renders.")
            }
            EngineError::HostUnavailable { .. } => {
                Some("Select a composition in the editor and try again.")
            }
            EngineError::Io(_) | EngineError::Serialization(_) => None,
        }
    }

    /// Message plus remedy, as shown to the user
    pub fn user_message(&self) -> String {
        match self.remedy() {
            Some(remedy) => format!("{} {}", self, remedy),
            None => self.to_string(),
        }
    }
}

impl From<Vec<ValidationError>> for EngineError {
    fn from(errors: Vec<ValidationError>) -> Self {
        EngineError::Validation(ValidationErrors(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_join() {
        let err: EngineError = vec![
            ValidationError::MissingParameter {
                field: "outputScale",
                parameter: "outputResolution",
            },
            ValidationError::DimensionParity {
                width: 1921,
                height: 1080,
            },
        ]
        .into();
        let text = err.to_string();
        assert!(text.contains("outputScale is enabled but outputResolution is not set"));
        assert!(text.contains("; output size 1921x1080"));
    }

    #[test]
    fn test_runtime_error_label() {
        let err = EngineError::WorkerRuntime {
            code: Some(2),
            tail: vec![],
        };
        assert_eq!(err.to_string(), "Worker exited with code 2");
        let killed = EngineError::WorkerRuntime { code: None, tail: vec![] };
        assert!(killed.to_string().contains("signal"));
    }

    #[test]
    fn test_pre_render_remedy_mentions_encoding() {
        let err = EngineError::HostUnavailable {
            operation: "pre_render",
            reason: "no output path".into(),
        };
        assert!(err.user_message().contains("encoding method"));
    }
}
