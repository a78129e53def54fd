// Job command handlers: build, preview, dispatch and cancel worker jobs
use crate::engine::workflow::output_file_name;
use crate::engine::{prepare, validate_for_source, Compilation, JobEngine, JobInput, LogLine, ProgressSnapshot, Submission};
use crate::models::{
    CancelOutcome, EncodeMethod, EngineStatus, JobSummary, ProcessingOptions, SourceInfo,
};
use crate::utils::get_output_dir;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tauri::State;

const DEFAULT_LOG_LINES: usize = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub options: ProcessingOptions,
    pub input: String,
    /// Input was rendered for this job and may be deleted afterwards
    #[serde(default)]
    pub pre_rendered: bool,
    pub output: Option<String>,
    pub source: Option<SourceInfo>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmitResponse {
    Passthrough { path: String },
    Dispatched { job: JobSummary },
}

impl JobRequest {
    fn job_input(&self) -> JobInput {
        if self.pre_rendered {
            JobInput::pre_render(&self.input)
        } else {
            JobInput::file(&self.input)
        }
    }

    fn output_path(&self, output_dir: Option<&str>) -> PathBuf {
        if let Some(output) = &self.output {
            return PathBuf::from(output);
        }
        let method = self
            .options
            .encode_method
            .as_deref()
            .and_then(|m| m.parse::<EncodeMethod>().ok())
            .unwrap_or_default();
        let dir = output_dir.map(PathBuf::from).unwrap_or_else(get_output_dir);
        dir.join(output_file_name(method, chrono::Local::now()))
    }
}

/// All validation problems as display strings; empty when the options are valid
#[tauri::command]
pub fn validate_options(options: ProcessingOptions, source: Option<SourceInfo>) -> Vec<String> {
    match validate_for_source(&options, source.as_ref()) {
        Ok(_) => vec![],
        Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
    }
}

/// What would be sent to the worker, without starting it
#[tauri::command]
pub fn preview_job(engine: State<'_, Arc<JobEngine>>, request: JobRequest) -> Result<serde_json::Value, String> {
    let settings = engine.settings();
    let output = request.output_path(settings.output_dir.as_deref());
    let compilation = prepare(&request.options, request.source.as_ref(), request.job_input(), output)
        .map_err(|e| e.to_string())?;

    Ok(match compilation {
        Compilation::Passthrough { input } => serde_json::json!({
            "passthrough": path_string(&input.path),
        }),
        Compilation::Job(job) => serde_json::json!({
            "stages": job.stage_kinds(),
            "args": job.to_args(),
            "document": job.to_document(),
        }),
    })
}

#[tauri::command]
pub async fn submit_job(engine: State<'_, Arc<JobEngine>>, request: JobRequest) -> Result<SubmitResponse, String> {
    let settings = engine.settings();
    let output = request.output_path(settings.output_dir.as_deref());

    let submission = engine
        .submit(&request.options, request.source.as_ref(), request.job_input(), output)
        .await
        .map_err(|e| e.user_message())?;

    Ok(match submission {
        Submission::Passthrough(path) => {
            debug!("Passthrough for {:?}", path);
            SubmitResponse::Passthrough {
                path: path_string(&path),
            }
        }
        Submission::Dispatched(handle) => SubmitResponse::Dispatched {
            job: handle.summary(),
        },
    })
}

#[tauri::command]
pub fn cancel_job(engine: State<'_, Arc<JobEngine>>) -> CancelOutcome {
    engine.cancel_active()
}

#[tauri::command]
pub fn get_engine_status(engine: State<'_, Arc<JobEngine>>) -> EngineStatus {
    engine.status()
}

#[tauri::command]
pub fn get_active_job(engine: State<'_, Arc<JobEngine>>) -> Option<JobSummary> {
    engine.active_job().map(|handle| handle.summary())
}

#[tauri::command]
pub fn get_job_progress(engine: State<'_, Arc<JobEngine>>) -> Option<ProgressSnapshot> {
    engine.active_job().map(|handle| handle.progress())
}

#[tauri::command]
pub fn get_job_log(engine: State<'_, Arc<JobEngine>>, lines: Option<usize>) -> Vec<LogLine> {
    let Some(handle) = engine.active_job() else {
        return vec![];
    };
    let all = handle.log_lines();
    let keep = lines.unwrap_or(DEFAULT_LOG_LINES);
    all[all.len().saturating_sub(keep)..].to_vec()
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
