// Events pushed to the front-end while a job runs
use serde::Serialize;
use tokio::sync::mpsc;

use super::log_buffer::LogStream;
use super::progress::ProgressSnapshot;
use crate::models::JobState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Started {
        job_id: String,
        pid: Option<u32>,
        command: String,
    },
    Progress {
        job_id: String,
        snapshot: ProgressSnapshot,
    },
    Log {
        job_id: String,
        stream: LogStream,
        line: String,
    },
    State {
        job_id: String,
        state: JobState,
    },
    /// User-facing toast
    Notice { level: NoticeLevel, message: String },
}

impl JobEvent {
    /// Event channel name on the front-end
    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::Started { .. } => "tas-job-started",
            JobEvent::Progress { .. } => "tas-job-progress",
            JobEvent::Log { .. } => "tas-job-log",
            JobEvent::State { .. } => "tas-job-state",
            JobEvent::Notice { .. } => "tas-notice",
        }
    }
}

/// Where the engine sends its events. Delivery is best effort.
pub trait JobEventSink: Send + Sync + 'static {
    fn emit(&self, event: JobEvent);
}

impl JobEventSink for mpsc::UnboundedSender<JobEvent> {
    fn emit(&self, event: JobEvent) {
        let _ = self.send(event);
    }
}

#[cfg(feature = "gui")]
impl JobEventSink for tauri::AppHandle {
    fn emit(&self, event: JobEvent) {
        use tauri::Emitter;

        if let Err(e) = Emitter::emit(self, event.name(), &event) {
            log::warn!("Failed to emit {}: {}", event.name(), e);
        }
    }
}
