//! Editor-driven workflow: composition → pre-render → job → import.
//!
//! A host editor adapter implements [`HostBridge`] and drives a job through
//! [`run_workflow`].

use async_trait::async_trait;
use chrono::{DateTime, Local};
use log::{info, warn};
use std::path::{Path, PathBuf};

use super::compiler::{compile, Compilation, JobInput};
use super::error::EngineError;
use super::validate::validate_for_source;
use super::JobEngine;
use crate::models::{EncodeMethod, JobOutcome, ProcessingOptions, SourceInfo};

/// Active composition as reported by the host editor
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<f64>,
}

/// Calls into the host editor. Errors are plain strings from the host side.
#[async_trait]
pub trait HostBridge: Send + Sync {
    /// The active composition, if there is one
    async fn composition(&self) -> Result<Option<CompositionInfo>, String>;

    async fn frame_rate(&self) -> Result<Option<f64>, String>;

    /// Render the composition into `dir`; `None` when the render produced no file
    async fn pre_render(&self, dir: &Path) -> Result<Option<PathBuf>, String>;

    async fn import_file(&self, path: &Path) -> Result<(), String>;
}

#[derive(Debug, Clone)]
pub struct WorkflowRequest {
    /// Where processed output is written
    pub output_dir: PathBuf,
    /// Where the host renders the pre-render
    pub render_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowOutcome {
    /// `path` was imported into the project. `processed` is false when no
    /// stage was enabled and the pre-render itself was imported.
    Imported { path: PathBuf, processed: bool },
    /// The worker failed; the user was already notified
    Failed { message: String },
    Cancelled,
}

/// `TAS_<yyyyMMdd_HHmmss>.<ext>`
pub fn output_file_name(method: EncodeMethod, at: DateTime<Local>) -> String {
    format!(
        "TAS_{}.{}",
        at.format("%Y%m%d_%H%M%S"),
        method.container_extension()
    )
}

/// Run one job against the active composition. Every abort before the job
/// starts notifies the user once and leaves no worker behind.
pub async fn run_workflow(
    engine: &JobEngine,
    host: &dyn HostBridge,
    options: &ProcessingOptions,
    request: &WorkflowRequest,
) -> Result<WorkflowOutcome, EngineError> {
    let result = prepare_and_run(engine, host, options, request).await;
    if let Err(e) = &result {
        engine.notify_error(e);
    }
    result
}

async fn prepare_and_run(
    engine: &JobEngine,
    host: &dyn HostBridge,
    options: &ProcessingOptions,
    request: &WorkflowRequest,
) -> Result<WorkflowOutcome, EngineError> {
    let composition = host
        .composition()
        .await
        .map_err(|reason| host_error("composition", reason))?
        .ok_or_else(|| host_error("composition", "no active composition".into()))?;

    if composition.width == 0 || composition.height == 0 {
        return Err(host_error(
            "composition",
            format!("'{}' has zero size", composition.name),
        ));
    }

    let frame_rate = match composition.frame_rate {
        Some(rate) => Some(rate),
        None => host.frame_rate().await.unwrap_or_else(|reason| {
            warn!("Frame rate query failed: {}", reason);
            None
        }),
    };

    let source = SourceInfo {
        width: composition.width,
        height: composition.height,
        frame_rate,
    };
    let validated = validate_for_source(options, Some(&source))?;

    let pre_render = host
        .pre_render(&request.render_dir)
        .await
        .map_err(|reason| host_error("pre_render", reason))?
        .ok_or_else(|| host_error("pre_render", "no output path".into()))?;
    info!(
        "Pre-rendered '{}' ({}x{}) to {:?}",
        composition.name, source.width, source.height, pre_render
    );

    let output = request
        .output_dir
        .join(output_file_name(validated.encode.method, Local::now()));

    let job = match compile(&validated, JobInput::pre_render(pre_render), output) {
        Compilation::Passthrough { input } => {
            import(host, &input.path).await?;
            return Ok(WorkflowOutcome::Imported {
                path: input.path,
                processed: false,
            });
        }
        Compilation::Job(job) => job,
    };

    let handle = engine.dispatch_inner(job).await?;
    match handle.wait().await {
        JobOutcome::Completed { output } => {
            let path = PathBuf::from(output);
            import(host, &path).await?;
            Ok(WorkflowOutcome::Imported {
                path,
                processed: true,
            })
        }
        JobOutcome::Failed { message, .. } => Ok(WorkflowOutcome::Failed { message }),
        JobOutcome::Cancelled => Ok(WorkflowOutcome::Cancelled),
    }
}

async fn import(host: &dyn HostBridge, path: &Path) -> Result<(), EngineError> {
    host.import_file(path)
        .await
        .map_err(|reason| host_error("import_file", reason))
}

fn host_error(operation: &'static str, reason: String) -> EngineError {
    EngineError::HostUnavailable { operation, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::{JobEvent, NoticeLevel};
    use crate::models::{EngineStatus, Settings};
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use std::fs;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct FakeHost {
        composition: Option<CompositionInfo>,
        fail_pre_render: bool,
        imported: Mutex<Vec<PathBuf>>,
        rendered: Mutex<Option<PathBuf>>,
    }

    #[async_trait]
    impl HostBridge for FakeHost {
        async fn composition(&self) -> Result<Option<CompositionInfo>, String> {
            Ok(self.composition.clone())
        }

        async fn frame_rate(&self) -> Result<Option<f64>, String> {
            Err("not supported".into())
        }

        async fn pre_render(&self, dir: &Path) -> Result<Option<PathBuf>, String> {
            if self.fail_pre_render {
                return Ok(None);
            }
            let path = dir.join("pre.mov");
            fs::write(&path, b"frames").map_err(|e| e.to_string())?;
            *self.rendered.lock() = Some(path.clone());
            Ok(Some(path))
        }

        async fn import_file(&self, path: &Path) -> Result<(), String> {
            self.imported.lock().push(path.to_path_buf());
            Ok(())
        }
    }

    fn comp(width: u32, height: u32) -> Option<CompositionInfo> {
        Some(CompositionInfo {
            name: "Comp 1".into(),
            width,
            height,
            frame_rate: Some(23.976),
        })
    }

    fn engine_with(settings: Settings) -> (JobEngine, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (JobEngine::new(settings, tx), rx)
    }

    fn request(dir: &Path) -> WorkflowRequest {
        WorkflowRequest {
            output_dir: dir.to_path_buf(),
            render_dir: dir.to_path_buf(),
        }
    }

    fn error_notices(rx: &mut mpsc::UnboundedReceiver<JobEvent>) -> usize {
        let mut count = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, JobEvent::Notice { level: NoticeLevel::Error, .. }) {
                count += 1;
            }
        }
        count
    }

    #[test]
    fn test_output_file_name() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(output_file_name(EncodeMethod::Prores, at), "TAS_20240309_070501.mov");
        assert_eq!(output_file_name(EncodeMethod::X264, at), "TAS_20240309_070501.mp4");
    }

    #[tokio::test]
    async fn test_missing_composition_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, mut rx) = engine_with(Settings::default());
        let host = FakeHost::default();

        let err = run_workflow(&engine, &host, &ProcessingOptions::default(), &request(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::HostUnavailable { operation: "composition", .. }));
        assert_eq!(error_notices(&mut rx), 1);
        assert!(host.rendered.lock().is_none());
    }

    #[tokio::test]
    async fn test_zero_sized_composition_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _rx) = engine_with(Settings::default());
        let host = FakeHost {
            composition: comp(0, 1080),
            ..Default::default()
        };
        let result = run_workflow(&engine, &host, &ProcessingOptions::default(), &request(dir.path())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_pre_render_points_at_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _rx) = engine_with(Settings::default());
        let host = FakeHost {
            composition: comp(1920, 1080),
            fail_pre_render: true,
            ..Default::default()
        };
        let options = ProcessingOptions {
            upscale: true,
            ..Default::default()
        };

        let err = run_workflow(&engine, &host, &options, &request(dir.path()))
            .await
            .unwrap_err();
        assert!(err.user_message().contains("encoding method"));
        assert_eq!(engine.status(), EngineStatus::Idle);
    }

    #[tokio::test]
    async fn test_passthrough_imports_pre_render() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _rx) = engine_with(Settings::default());
        let host = FakeHost {
            composition: comp(1920, 1080),
            ..Default::default()
        };

        let outcome = run_workflow(&engine, &host, &ProcessingOptions::default(), &request(dir.path()))
            .await
            .unwrap();
        let pre_render = dir.path().join("pre.mov");
        assert_eq!(
            outcome,
            WorkflowOutcome::Imported {
                path: pre_render.clone(),
                processed: false
            }
        );
        assert_eq!(*host.imported.lock(), vec![pre_render]);
    }

    #[tokio::test]
    async fn test_invalid_options_skip_pre_render() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, mut rx) = engine_with(Settings::default());
        let host = FakeHost {
            composition: comp(1920, 1080),
            ..Default::default()
        };
        let options = ProcessingOptions {
            interpolate: true,
            interpolate_factor: Some("abc".into()),
            ..Default::default()
        };

        let err = run_workflow(&engine, &host, &options, &request(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(host.rendered.lock().is_none());
        assert_eq!(error_notices(&mut rx), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_completed_job_imports_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("worker.sh");
        fs::write(&script, "echo 'frame=1 total=1'\nexit 0\n").unwrap();
        let (engine, _rx) = engine_with(Settings {
            worker_executable: Some("sh".into()),
            worker_script: Some(script.to_string_lossy().to_string()),
            ..Default::default()
        });
        let host = FakeHost {
            composition: comp(1920, 1080),
            ..Default::default()
        };
        let options = ProcessingOptions {
            upscale: true,
            encode_method: Some("prores".into()),
            ..Default::default()
        };

        let outcome = run_workflow(&engine, &host, &options, &request(dir.path()))
            .await
            .unwrap();
        let WorkflowOutcome::Imported { path, processed } = outcome else {
            panic!("expected an import");
        };
        assert!(processed);
        assert!(path.to_string_lossy().ends_with(".mov"));
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("TAS_"));
        assert_eq!(*host.imported.lock(), vec![path]);
        // Pre-render is owned by the job and removed after it
        assert!(!dir.path().join("pre.mov").exists());
    }
}
