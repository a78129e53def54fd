// Atomic JSON file operations

use log::{debug, warn};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const OPTIONS_WRITE_DEBOUNCE_MS: u64 = 500;

lazy_static::lazy_static! {
    static ref FILE_LOCK: Mutex<()> = Mutex::new(());
}

fn invalid_data(path: &Path, e: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("{:?}: {}", path, e))
}

pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> io::Result<T> {
    let _lock = FILE_LOCK.lock();
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| invalid_data(path, e))
}

/// Writes JSON atomically using write-to-temp-then-rename
pub fn write_json_file<T: Serialize + ?Sized>(path: &Path, data: &T) -> io::Result<()> {
    let _lock = FILE_LOCK.lock();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json_string = serde_json::to_string_pretty(data).map_err(|e| invalid_data(path, e))?;

    let temp_path = path.with_extension("tmp");
    let mut temp_file = File::create(&temp_path)?;
    temp_file.write_all(json_string.as_bytes())?;
    temp_file.sync_all()?;

    fs::rename(&temp_path, path)
}

pub fn initialize_json_file<T: Serialize>(path: &Path, default: &T) -> io::Result<()> {
    if !path.exists() {
        debug!("Initializing JSON file: {:?}", path);
        write_json_file(path, default)?;
    }
    Ok(())
}

/// Missing file means defaults; a present but unreadable file is still an error
pub fn read_json_file_or_default<T: DeserializeOwned + Default>(path: &Path) -> io::Result<T> {
    if path.exists() {
        read_json_file(path)
    } else {
        Ok(T::default())
    }
}

/// Coalesces bursts of writes to one file. Only the latest value scheduled
/// within the delay window reaches disk.
#[derive(Clone)]
pub struct DebouncedJsonWriter {
    path: PathBuf,
    delay: Duration,
    pending: Arc<Mutex<Option<Value>>>,
    generation: Arc<AtomicU64>,
}

impl DebouncedJsonWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_delay(path, Duration::from_millis(OPTIONS_WRITE_DEBOUNCE_MS))
    }

    pub fn with_delay(path: impl Into<PathBuf>, delay: Duration) -> Self {
        Self {
            path: path.into(),
            delay,
            pending: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue `data` for writing. Must be called from within a tokio runtime.
    pub fn schedule<T: Serialize>(&self, data: &T) -> io::Result<()> {
        let value = serde_json::to_value(data).map_err(|e| invalid_data(&self.path, e))?;
        *self.pending.lock() = Some(value);
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let writer = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(writer.delay).await;
            if writer.generation.load(Ordering::SeqCst) != ticket {
                return;
            }
            if let Err(e) = writer.flush() {
                warn!("Failed to write {:?}: {}", writer.path, e);
            }
        });
        Ok(())
    }

    /// Write any pending value now
    pub fn flush(&self) -> io::Result<()> {
        let pending = self.pending.lock().take();
        match pending {
            Some(value) => write_json_file(&self.path, &value),
            None => Ok(()),
        }
    }
}
