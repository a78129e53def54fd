//! Handle to one worker invocation.
//!
//! A [`JobHandle`] is cheap to clone; every clone sees the same state. The
//! supervisor task in [`super::JobEngine`] is the only writer of the job's
//! lifecycle state. Callers may request cancellation and read snapshots.

use chrono::{DateTime, Utc};
use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};

use super::compiler::{InputOrigin, JobInput};
use super::log_buffer::{LogBuffer, LogLine, LogStream};
use super::progress::{ProgressSnapshot, ProgressUpdate};
use crate::models::{CancelOutcome, JobOutcome, JobState, JobSummary};

#[derive(Clone)]
pub struct JobHandle {
    inner: Arc<JobInner>,
}

struct JobInner {
    id: String,
    started_at: DateTime<Utc>,
    input: JobInput,
    output: PathBuf,
    retain_pre_render: bool,
    pid: Mutex<Option<u32>>,
    temp_document: Mutex<Option<PathBuf>>,

    cancel_requested: AtomicBool,
    cancel_signal: Notify,
    cleaned_up: AtomicBool,

    state: watch::Sender<JobState>,
    progress: Mutex<ProgressSnapshot>,
    logs: Mutex<LogBuffer>,
    outcome: Mutex<Option<JobOutcome>>,
    finished_at: Mutex<Option<DateTime<Utc>>>,
}

impl JobHandle {
    pub(crate) fn new(input: JobInput, output: PathBuf, retain_pre_render: bool, log_capacity: usize) -> Self {
        let (state, _) = watch::channel(JobState::Dispatched);
        Self {
            inner: Arc::new(JobInner {
                id: uuid::Uuid::new_v4().to_string(),
                started_at: Utc::now(),
                input,
                output,
                retain_pre_render,
                pid: Mutex::new(None),
                temp_document: Mutex::new(None),
                cancel_requested: AtomicBool::new(false),
                cancel_signal: Notify::new(),
                cleaned_up: AtomicBool::new(false),
                state,
                progress: Mutex::new(ProgressSnapshot::default()),
                logs: Mutex::new(LogBuffer::new(log_capacity)),
                outcome: Mutex::new(None),
                finished_at: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn pid(&self) -> Option<u32> {
        *self.inner.pid.lock()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub fn input(&self) -> &JobInput {
        &self.inner.input
    }

    pub fn output(&self) -> &Path {
        &self.inner.output
    }

    pub fn state(&self) -> JobState {
        *self.inner.state.borrow()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.inner.progress.lock().clone()
    }

    pub fn log_lines(&self) -> Vec<LogLine> {
        self.inner.logs.lock().lines()
    }

    pub fn log_tail(&self, n: usize) -> Vec<String> {
        self.inner.logs.lock().tail(n)
    }

    pub fn outcome(&self) -> Option<JobOutcome> {
        self.inner.outcome.lock().clone()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.inner.cancel_requested.load(Ordering::SeqCst)
    }

    /// Request cancellation. Only sets the flag and wakes the supervisor;
    /// the state change happens once the worker tree is gone.
    pub fn cancel(&self) -> CancelOutcome {
        if self.state().is_terminal() {
            return CancelOutcome::NotActive;
        }

        // Hold the progress lock so no update lands after the flag is set
        let _progress = self.inner.progress.lock();
        if self.inner.cancel_requested.swap(true, Ordering::SeqCst) {
            return CancelOutcome::AlreadyRequested;
        }
        self.inner.cancel_signal.notify_one();
        debug!("Cancellation requested for job {}", self.inner.id);
        CancelOutcome::Requested
    }

    /// Wait for the job to reach a terminal state
    pub async fn wait(&self) -> JobOutcome {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| state.is_terminal()).await;
        self.outcome().unwrap_or(JobOutcome::Failed {
            code: None,
            message: "Job ended without an outcome".to_string(),
        })
    }

    pub fn summary(&self) -> JobSummary {
        let error = match self.outcome() {
            Some(JobOutcome::Failed { message, .. }) => Some(message),
            _ => None,
        };
        JobSummary {
            id: self.inner.id.clone(),
            pid: self.pid(),
            state: self.state(),
            input: self.inner.input.path.to_string_lossy().to_string(),
            output: self.inner.output.to_string_lossy().to_string(),
            started_at: self.inner.started_at.to_rfc3339(),
            finished_at: self.inner.finished_at.lock().map(|t| t.to_rfc3339()),
            error,
        }
    }

    // Supervisor side

    pub(crate) async fn cancelled(&self) {
        if self.is_cancel_requested() {
            return;
        }
        self.inner.cancel_signal.notified().await;
    }

    pub(crate) fn set_temp_document(&self, path: PathBuf) {
        *self.inner.temp_document.lock() = Some(path);
    }

    pub(crate) fn mark_running(&self, pid: Option<u32>) {
        *self.inner.pid.lock() = pid;
        self.inner.state.send_replace(JobState::Running);
    }

    /// Fold a decoded line into the snapshot. Returns the new snapshot, or
    /// `None` when a cancel request already froze it.
    pub(crate) fn apply_progress(&self, update: &ProgressUpdate) -> Option<ProgressSnapshot> {
        let mut progress = self.inner.progress.lock();
        if self.is_cancel_requested() {
            trace!("Dropping progress for cancelled job {}", self.inner.id);
            return None;
        }
        progress.apply(update);
        Some(progress.clone())
    }

    pub(crate) fn push_log(&self, stream: LogStream, line: &str) {
        self.inner.logs.lock().push(stream, line);
    }

    /// Remove job-owned artifacts. Runs at most once per job; later calls are
    /// no-ops. The pre-render is kept when `include_pre_render` is false or
    /// the user asked to retain it.
    pub(crate) fn cleanup(&self, include_pre_render: bool) {
        if self.inner.cleaned_up.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(doc) = self.inner.temp_document.lock().take() {
            remove_artifact(&doc);
        }

        if include_pre_render
            && self.inner.input.origin == InputOrigin::PreRender
            && !self.inner.retain_pre_render
        {
            remove_artifact(&self.inner.input.path);
        }
    }

    pub(crate) fn record_outcome(&self, outcome: JobOutcome) {
        *self.inner.finished_at.lock() = Some(Utc::now());
        *self.inner.outcome.lock() = Some(outcome);
    }

    pub(crate) fn publish_state(&self, state: JobState) {
        self.inner.state.send_replace(state);
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.inner.id)
            .field("pid", &self.pid())
            .field("state", &self.state())
            .finish()
    }
}

fn remove_artifact(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed job artifact {:?}", path),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove job artifact {:?}: {}", path, e),
    }
}
