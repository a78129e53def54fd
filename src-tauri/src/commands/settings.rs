// Settings and option snapshot command handlers
use crate::engine::JobEngine;
use crate::file_manager::{read_json_file_or_default, write_json_file, DebouncedJsonWriter};
use crate::models::{DispatchPolicy, JobFormat, ProcessingOptions, Settings};
use crate::utils::{get_options_json_path, get_settings_json_path};
use log::debug;
use serde::Deserialize;
use std::sync::Arc;
use tauri::State;

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsParams {
    pub worker_executable: Option<String>,
    pub worker_script: Option<String>,
    pub job_format: Option<JobFormat>,
    pub dispatch_policy: Option<DispatchPolicy>,
    pub log_capacity: Option<usize>,
    pub output_dir: Option<String>,
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Get current settings from the JSON file
#[tauri::command]
pub fn get_settings() -> Result<Settings, String> {
    read_json_file_or_default(&get_settings_json_path()).map_err(|e| e.to_string())
}

/// Update settings with partial update support
#[tauri::command]
pub fn update_settings(
    engine: State<'_, Arc<JobEngine>>,
    settings: UpdateSettingsParams,
) -> Result<Settings, String> {
    let path = get_settings_json_path();
    let mut current: Settings = read_json_file_or_default(&path).map_err(|e| e.to_string())?;

    if let Some(worker_executable) = settings.worker_executable {
        current.worker_executable = non_empty(worker_executable);
    }
    // An empty script is meaningful (packaged worker binary), so keep it
    if let Some(worker_script) = settings.worker_script {
        current.worker_script = Some(worker_script);
    }
    if let Some(job_format) = settings.job_format {
        current.job_format = job_format;
    }
    if let Some(dispatch_policy) = settings.dispatch_policy {
        current.dispatch_policy = dispatch_policy;
    }
    if let Some(log_capacity) = settings.log_capacity {
        current.log_capacity = log_capacity.max(1);
    }
    if let Some(output_dir) = settings.output_dir {
        current.output_dir = non_empty(output_dir);
    }

    write_json_file(&path, &current).map_err(|e| e.to_string())?;
    engine.update_settings(current.clone());

    debug!("Updated settings: {:?}", current);
    Ok(current)
}

/// Last saved processing options; legacy snapshots fill in defaults
#[tauri::command]
pub fn get_options() -> Result<ProcessingOptions, String> {
    read_json_file_or_default(&get_options_json_path()).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn save_options(
    writer: State<'_, DebouncedJsonWriter>,
    options: ProcessingOptions,
) -> Result<(), String> {
    writer.schedule(&options).map_err(|e| e.to_string())
}
