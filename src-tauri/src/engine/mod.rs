//! Job configuration and dispatch engine.
//!
//! [`JobEngine`] turns processing options into at most one running worker
//! process at a time. Each dispatched job gets a supervisor task that reads
//! the worker's output, applies progress, reacts to cancellation and runs
//! cleanup before releasing the engine slot.

pub mod compiler;
pub mod error;
pub mod events;
pub mod job;
pub mod log_buffer;
pub mod progress;
pub mod validate;
pub mod workflow;

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;

pub use compiler::{compile, prepare, Compilation, CompiledJob, InputOrigin, JobInput, Stage, StageKind};
pub use error::{EngineError, ValidationError, ValidationErrors};
pub use events::{JobEvent, JobEventSink, NoticeLevel};
pub use job::JobHandle;
pub use log_buffer::{LogBuffer, LogLine, LogStream};
pub use progress::{decode, ProgressSnapshot, ProgressUpdate};
pub use validate::{validate, validate_for_source, ValidatedOptions};

use crate::file_manager::write_json_file;
use crate::models::{
    CancelOutcome, DispatchPolicy, EngineStatus, JobFormat, JobOutcome, JobState, ProcessingOptions,
    Settings, SourceInfo,
};
use crate::process_manager::{kill_descendants, WorkerInvocation};
use crate::utils::get_temp_dir;

/// Lines of worker output attached to a runtime failure
const ERROR_TAIL_LINES: usize = 20;

/// How long to keep draining output after the worker exits
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of [`JobEngine::submit`]
#[derive(Debug, Clone)]
pub enum Submission {
    /// No stage enabled; the input is already the result
    Passthrough(PathBuf),
    Dispatched(JobHandle),
}

pub struct JobEngine {
    settings: Mutex<Settings>,
    sink: Arc<dyn JobEventSink>,
    active: Arc<Mutex<Option<JobHandle>>>,
    temp_dir: PathBuf,
}

impl JobEngine {
    pub fn new(settings: Settings, sink: impl JobEventSink) -> Self {
        Self {
            settings: Mutex::new(settings),
            sink: Arc::new(sink),
            active: Arc::new(Mutex::new(None)),
            temp_dir: get_temp_dir(),
        }
    }

    /// Directory for job documents
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn settings(&self) -> Settings {
        self.settings.lock().clone()
    }

    /// Applies to the next dispatch; a running job keeps what it started with
    pub fn update_settings(&self, settings: Settings) {
        *self.settings.lock() = settings;
    }

    pub fn active_job(&self) -> Option<JobHandle> {
        self.active.lock().clone()
    }

    pub fn status(&self) -> EngineStatus {
        match self.active.lock().as_ref() {
            Some(handle) => EngineStatus::Busy {
                job_id: handle.id().to_string(),
                job_state: handle.state(),
            },
            None => EngineStatus::Idle,
        }
    }

    pub fn cancel_active(&self) -> CancelOutcome {
        match self.active_job() {
            Some(handle) => handle.cancel(),
            None => CancelOutcome::NotActive,
        }
    }

    /// Emit the single user-facing notice for a fatal error
    pub fn notify_error(&self, err: &EngineError) {
        error!("{}", err);
        self.sink.emit(JobEvent::Notice {
            level: NoticeLevel::Error,
            message: err.user_message(),
        });
    }

    /// Validate, compile and dispatch. A passthrough never spawns a worker.
    pub async fn submit(
        &self,
        options: &ProcessingOptions,
        source: Option<&SourceInfo>,
        input: JobInput,
        output: impl Into<PathBuf>,
    ) -> Result<Submission, EngineError> {
        let compilation = prepare(options, source, input, output).map_err(|e| {
            self.notify_error(&e);
            e
        })?;

        match compilation {
            Compilation::Passthrough { input } => {
                info!("No processing stage enabled, passing {:?} through", input.path);
                Ok(Submission::Passthrough(input.path))
            }
            Compilation::Job(job) => self.dispatch(job).await.map(Submission::Dispatched),
        }
    }

    /// Launch the worker for a compiled job
    pub async fn dispatch(&self, job: CompiledJob) -> Result<JobHandle, EngineError> {
        self.dispatch_inner(job).await.map_err(|e| {
            self.notify_error(&e);
            e
        })
    }

    async fn dispatch_inner(&self, job: CompiledJob) -> Result<JobHandle, EngineError> {
        let settings = self.settings();
        let handle = JobHandle::new(
            job.input.clone(),
            job.output.clone(),
            job.retain_pre_render,
            settings.log_capacity,
        );

        self.reserve_slot(&handle, settings.dispatch_policy).await?;

        match self.launch(&handle, &job, &settings) {
            Ok((child, command)) => {
                let pid = child.id();
                handle.mark_running(pid);
                info!("Job {} started (pid {:?}): {}", handle.id(), pid, command);
                self.sink.emit(JobEvent::Started {
                    job_id: handle.id().to_string(),
                    pid,
                    command,
                });
                self.sink.emit(JobEvent::State {
                    job_id: handle.id().to_string(),
                    state: JobState::Running,
                });

                tokio::spawn(supervise(
                    handle.clone(),
                    child,
                    self.sink.clone(),
                    self.active.clone(),
                ));
                Ok(handle)
            }
            Err(e) => {
                // Nothing ran, so the pre-render is still the user's to reuse
                handle.cleanup(false);
                handle.record_outcome(JobOutcome::Failed {
                    code: None,
                    message: e.to_string(),
                });
                release_slot(&self.active, &handle);
                handle.publish_state(JobState::Failed);
                Err(e)
            }
        }
    }

    async fn reserve_slot(&self, handle: &JobHandle, policy: DispatchPolicy) -> Result<(), EngineError> {
        loop {
            let previous = {
                let mut slot = self.active.lock();
                match slot.as_ref() {
                    None => {
                        *slot = Some(handle.clone());
                        return Ok(());
                    }
                    Some(current) if policy == DispatchPolicy::Reject => {
                        return Err(EngineError::JobAlreadyRunning {
                            job_id: current.id().to_string(),
                        });
                    }
                    Some(current) => current.clone(),
                }
            };

            info!("Cancelling job {} before starting a new one", previous.id());
            previous.cancel();
            previous.wait().await;
        }
    }

    fn launch(
        &self,
        handle: &JobHandle,
        job: &CompiledJob,
        settings: &Settings,
    ) -> Result<(Child, String), EngineError> {
        let args = match settings.job_format {
            JobFormat::Arguments => job.to_args(),
            JobFormat::Document => {
                let path = self.temp_dir.join(format!("job_{}.json", handle.id()));
                handle.set_temp_document(path.clone());
                write_json_file(&path, &job.to_document())?;
                vec!["--json".to_string(), path.to_string_lossy().to_string()]
            }
        };

        let invocation = WorkerInvocation::resolve(settings);
        let command = invocation.describe(&args);
        debug!("Launching worker: {}", command);

        let child = invocation
            .command(&args)
            .spawn()
            .map_err(|source| EngineError::WorkerLaunch {
                program: invocation.program.clone(),
                source,
            })?;
        Ok((child, command))
    }
}

fn release_slot(active: &Mutex<Option<JobHandle>>, handle: &JobHandle) {
    let mut slot = active.lock();
    if slot.as_ref().map(|h| h.id()) == Some(handle.id()) {
        *slot = None;
    }
}

/// Owns the child process until it is gone, then settles the job
async fn supervise(
    handle: JobHandle,
    mut child: Child,
    sink: Arc<dyn JobEventSink>,
    active: Arc<Mutex<Option<JobHandle>>>,
) {
    let stdout_task = child.stdout.take().map(|out| {
        tokio::spawn(read_output(handle.clone(), out, LogStream::Stdout, sink.clone()))
    });
    let stderr_task = child.stderr.take().map(|err| {
        tokio::spawn(read_output(handle.clone(), err, LogStream::Stderr, sink.clone()))
    });

    let exit = tokio::select! {
        status = child.wait() => Some(status),
        _ = handle.cancelled() => None,
    };

    if exit.is_none() {
        terminate(&mut child).await;
    }

    for task in [stdout_task, stderr_task].into_iter().flatten() {
        let abort = task.abort_handle();
        if tokio::time::timeout(READER_DRAIN_TIMEOUT, task).await.is_err() {
            debug!("Worker output still open after exit, detaching reader");
            abort.abort();
        }
    }

    let outcome = if handle.is_cancel_requested() {
        JobOutcome::Cancelled
    } else {
        match exit {
            Some(Ok(status)) if status.success() => JobOutcome::Completed {
                output: handle.output().to_string_lossy().to_string(),
            },
            Some(Ok(status)) => {
                let err = EngineError::WorkerRuntime {
                    code: status.code(),
                    tail: handle.log_tail(ERROR_TAIL_LINES),
                };
                JobOutcome::Failed {
                    code: status.code(),
                    message: err.user_message(),
                }
            }
            Some(Err(e)) => JobOutcome::Failed {
                code: None,
                message: EngineError::Io(e).user_message(),
            },
            None => JobOutcome::Cancelled,
        }
    };

    handle.cleanup(true);
    let state = outcome.state();
    handle.record_outcome(outcome.clone());
    release_slot(&active, &handle);
    handle.publish_state(state);

    info!("Job {} finished: {:?}", handle.id(), state);
    sink.emit(JobEvent::State {
        job_id: handle.id().to_string(),
        state,
    });

    match outcome {
        JobOutcome::Cancelled => sink.emit(JobEvent::Notice {
            level: NoticeLevel::Info,
            message: "Processing cancelled".to_string(),
        }),
        JobOutcome::Failed { message, .. } => {
            error!("Job {} failed: {}", handle.id(), message);
            for line in handle.log_tail(ERROR_TAIL_LINES) {
                debug!("[worker] {}", line);
            }
            sink.emit(JobEvent::Notice {
                level: NoticeLevel::Error,
                message,
            });
        }
        JobOutcome::Completed { .. } => {}
    }
}

/// Kill the worker's process tree: descendants leaves-first, then the root
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        match tokio::task::spawn_blocking(move || kill_descendants(pid)).await {
            Ok(0) => {}
            Ok(n) => debug!("Killed {} worker child process(es)", n),
            Err(e) => warn!("Process tree walk failed: {}", e),
        }
    }
    if let Err(e) = child.kill().await {
        warn!("Failed to kill worker: {}", e);
    }
}

async fn read_output<R>(handle: JobHandle, pipe: R, stream: LogStream, sink: Arc<dyn JobEventSink>)
where
    R: AsyncRead + Unpin,
{
    let mut segments = BufReader::new(pipe).split(b'\n');
    loop {
        let bytes = match segments.next_segment().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => break,
            Err(e) => {
                debug!("Worker {:?} read error: {}", stream, e);
                break;
            }
        };
        let line = String::from_utf8_lossy(&bytes);
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        handle.push_log(stream, line);
        sink.emit(JobEvent::Log {
            job_id: handle.id().to_string(),
            stream,
            line: line.to_string(),
        });

        if stream == LogStream::Stdout {
            if let Some(update) = decode(line) {
                if let Some(snapshot) = handle.apply_progress(&update) {
                    sink.emit(JobEvent::Progress {
                        job_id: handle.id().to_string(),
                        snapshot,
                    });
                }
            }
        }
    }
}
