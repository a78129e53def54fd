//! Log file housekeeping
//! Handles log file cleanup for 7-day retention

use log::info;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

const LOG_RETENTION_DAYS: u64 = 7;

/// File name stem for the panel's own log files
pub const LOG_FILE_NAME: &str = "tas-panel";

/// Delete `.log` files in `logs_dir` older than the retention window.
/// Returns how many were removed.
pub fn cleanup_old_logs(logs_dir: &Path) -> usize {
    cleanup_logs_older_than(
        logs_dir,
        Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60),
    )
}

fn cleanup_logs_older_than(logs_dir: &Path, retention: Duration) -> usize {
    let Ok(entries) = fs::read_dir(logs_dir) else {
        return 0;
    };

    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != "log") {
            continue;
        }
        let expired = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .map_or(false, |age| age > retention);

        if expired && fs::remove_file(&path).is_ok() {
            info!("Cleaned up old log: {:?}", path.file_name());
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_expired_log_files_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.log"), "x").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let removed = cleanup_logs_older_than(dir.path(), Duration::from_millis(5));
        assert_eq!(removed, 1);
        assert!(!dir.path().join("old.log").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_fresh_logs_survive_and_missing_dir_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("today.log"), "x").unwrap();
        assert_eq!(cleanup_old_logs(dir.path()), 0);
        assert_eq!(cleanup_old_logs(&dir.path().join("missing")), 0);
    }
}
