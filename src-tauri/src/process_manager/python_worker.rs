// Worker process resolution and launch
// Finds the interpreter and entry script, then builds the tokio command

use crate::models::Settings;
use log::debug;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

const WORKERS_DIR_NAME: &str = "TheAnimeScripter";
const WORKER_ENTRY_SCRIPT: &str = "main.py";

/// Program plus optional entry script, resolved once per dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerInvocation {
    pub program: String,
    pub script: Option<PathBuf>,
}

impl WorkerInvocation {
    /// Resolve from settings, probing the environment for anything unset
    pub fn resolve(settings: &Settings) -> Self {
        let program = settings
            .worker_executable
            .clone()
            .unwrap_or_else(get_python_path);

        let script = match &settings.worker_script {
            Some(script) if script.is_empty() => None,
            Some(script) => Some(PathBuf::from(script)),
            None => Some(get_workers_dir().join(WORKER_ENTRY_SCRIPT)),
        };

        Self { program, script }
    }

    /// Build the command: `<program> [script] <args>`, stdout/stderr piped, no stdin
    pub fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(script) = &self.script {
            cmd.arg(script);
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = self.script.as_deref().and_then(Path::parent) {
            if dir.is_dir() {
                cmd.current_dir(dir);
            }
        }

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        cmd
    }

    /// Human-readable command line for logs
    pub fn describe(&self, args: &[String]) -> String {
        let mut parts = vec![self.program.clone()];
        if let Some(script) = &self.script {
            parts.push(script.to_string_lossy().to_string());
        }
        parts.extend(args.iter().cloned());
        parts.join(" ")
    }
}

pub fn get_python_path() -> String {
    #[cfg(target_os = "windows")]
    let paths = ["python", "python3", "py"];

    #[cfg(not(target_os = "windows"))]
    let paths = ["python3", "python"];

    for path in paths {
        let mut cmd = std::process::Command::new(path);
        cmd.arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        if matches!(cmd.status(), Ok(status) if status.success()) {
            return path.to_string();
        }
    }

    "python".to_string()
}

/// Get the path to the worker directory
pub fn get_workers_dir() -> PathBuf {
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            if let Some(found) = find_workers_dir(exe_dir) {
                return found;
            }
        }
    }

    let cwd_workers = std::env::current_dir()
        .unwrap_or_default()
        .join(WORKERS_DIR_NAME);

    debug!("Fallback to current dir worker directory: {:?}", cwd_workers);
    cwd_workers
}

/// Look next to `start` and up to three parents
fn find_workers_dir(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    for _ in 0..4 {
        let dir = current?;
        let candidate = dir.join(WORKERS_DIR_NAME);
        if candidate.is_dir() {
            debug!("Found worker directory at: {:?}", candidate);
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}
