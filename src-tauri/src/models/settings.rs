// Engine settings data models
use serde::{Deserialize, Serialize};

/// How a compiled job is handed to the worker
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobFormat {
    /// Flags on the command line
    #[default]
    Arguments,
    /// JSON document in a temp file, passed as `--json <path>`
    Document,
}

/// What to do when a job is requested while another one is active
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    #[default]
    Reject,
    CancelPrevious,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Interpreter or packaged worker binary; probed from PATH when unset
    pub worker_executable: Option<String>,
    /// Entry script passed as the first argument; `main.py` in the workers dir when unset
    pub worker_script: Option<String>,
    pub job_format: JobFormat,
    pub dispatch_policy: DispatchPolicy,
    pub log_capacity: usize,
    pub output_dir: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            worker_executable: None,
            worker_script: None,
            job_format: JobFormat::Arguments,
            dispatch_policy: DispatchPolicy::Reject,
            log_capacity: 1000,
            output_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"dispatch_policy": "cancel_previous"}"#).unwrap();
        assert_eq!(settings.dispatch_policy, DispatchPolicy::CancelPrevious);
        assert_eq!(settings.job_format, JobFormat::Arguments);
        assert_eq!(settings.log_capacity, 1000);
    }
}
