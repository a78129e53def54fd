//! Worker progress decoding.
//!
//! The worker prints a mix of plain log text and progress lines. Progress
//! comes either as a JSON object per line or as `key=value` / `key: value`
//! pairs. Anything that does not decode is simply not progress; the caller
//! still logs it.

use log::debug;
use serde::Serialize;
use serde_json::Value;

/// One decoded progress line. Fields the line did not carry are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub current_frame: Option<u64>,
    pub total_frames: Option<u64>,
    pub fps: Option<f64>,
    /// Seconds remaining in the current stage
    pub eta: Option<f64>,
    /// Seconds remaining for the whole job
    pub tas_eta: Option<f64>,
    pub status: Option<String>,
    /// The worker signalled that processing finished
    pub complete: bool,
}

/// Progress state exposed to the frontend
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub current_frame: u64,
    pub total_frames: Option<u64>,
    pub fps: Option<f64>,
    pub eta: Option<f64>,
    #[serde(rename = "tasETA")]
    pub tas_eta: Option<f64>,
    pub percent: f64,
    pub status: Option<String>,
    pub complete: bool,
}

impl ProgressSnapshot {
    /// Fold one update into the snapshot.
    ///
    /// The frame counter never moves backwards while the status label and
    /// frame total stay the same; a new phase may restart it.
    pub fn apply(&mut self, update: &ProgressUpdate) {
        let new_phase = matches!(&update.status, Some(s) if self.status.as_ref() != Some(s))
            || matches!(update.total_frames, Some(t) if self.total_frames != Some(t));

        if let Some(status) = &update.status {
            self.status = Some(status.clone());
        }
        if let Some(total) = update.total_frames {
            self.total_frames = Some(total);
        }
        if let Some(frame) = update.current_frame {
            self.current_frame = if new_phase {
                frame
            } else {
                self.current_frame.max(frame)
            };
        }
        if let Some(fps) = update.fps {
            self.fps = Some(fps);
        }

        self.eta = match update.eta {
            Some(eta) => Some(eta),
            None => self.estimated_eta(),
        };
        if update.tas_eta.is_some() {
            self.tas_eta = update.tas_eta;
        }

        if update.complete {
            self.complete = true;
            self.percent = 100.0;
            self.eta = Some(0.0);
        } else if let Some(total) = self.total_frames.filter(|t| *t > 0) {
            self.percent = ((self.current_frame as f64 / total as f64) * 100.0).min(100.0);
        }
    }

    fn estimated_eta(&self) -> Option<f64> {
        let total = self.total_frames?;
        let fps = self.fps.filter(|f| *f > 0.0)?;
        Some(total.saturating_sub(self.current_frame) as f64 / fps)
    }
}

/// Decode one worker line. Returns `None` for log text and malformed input.
pub fn decode(line: &str) -> Option<ProgressUpdate> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if is_completion_text(trimmed) {
        return Some(ProgressUpdate {
            complete: true,
            ..Default::default()
        });
    }

    let update = if trimmed.starts_with('{') {
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(map)) => decode_pairs(map.iter().map(|(k, v)| (k.as_str(), json_text(v)))),
            Ok(_) => None,
            Err(e) => {
                debug!("Ignoring malformed progress line ({}): {}", e, trimmed);
                None
            }
        }
    } else {
        decode_pairs(split_pairs(trimmed).into_iter())
    }?;

    if update.current_frame.is_some() || update.complete {
        Some(update)
    } else {
        None
    }
}

fn is_completion_text(line: &str) -> bool {
    let lower = line.trim_end_matches(['.', '!']).to_ascii_lowercase();
    matches!(lower.as_str(), "process complete" | "processing complete" | "done")
}

fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn split_pairs(line: &str) -> Vec<(&str, Option<String>)> {
    let mut tokens = line
        .split(|c: char| c == '|' || c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .peekable();
    let mut pairs = Vec::new();

    while let Some(token) = tokens.next() {
        let Some((key, value)) = token.split_once('=').or_else(|| token.split_once(':')) else {
            continue;
        };
        // `key: value` leaves the value in the next token
        let value = if value.is_empty() {
            match tokens.next_if(|next| !next.ends_with(['=', ':'])) {
                Some(next) => next,
                None => continue,
            }
        } else {
            value
        };
        pairs.push((key.trim(), Some(value.trim().to_string())));
    }
    pairs
}

fn checked<T>(key: &str, value: &str, parsed: Option<T>) -> Option<T> {
    if parsed.is_none() {
        debug!("Ignoring unparseable progress value {}={:?}", key, value);
    }
    parsed
}

fn decode_pairs<'a, I>(pairs: I) -> Option<ProgressUpdate>
where
    I: Iterator<Item = (&'a str, Option<String>)>,
{
    let mut update = ProgressUpdate::default();
    let mut recognised = false;

    for (key, value) in pairs {
        let Some(value) = value else { continue };
        match key.to_ascii_lowercase().as_str() {
            "currentframe" | "current_frame" | "frame" => {
                if let Some((current, total)) = value.split_once('/') {
                    update.current_frame = checked(key, &value, parse_count(current));
                    update.total_frames = parse_count(total).or(update.total_frames);
                } else {
                    update.current_frame = checked(key, &value, parse_count(&value));
                }
                recognised |= update.current_frame.is_some();
            }
            "totalframes" | "total_frames" | "total" => {
                update.total_frames = checked(key, &value, parse_count(&value));
            }
            "fps" => {
                update.fps = checked(key, &value, value.parse::<f64>().ok().filter(|f| f.is_finite()));
            }
            "eta" => update.eta = checked(key, &value, parse_duration(&value)),
            "taseta" | "tas_eta" => update.tas_eta = checked(key, &value, parse_duration(&value)),
            "status" | "phase" => {
                if is_completion_status(&value) {
                    update.complete = true;
                    recognised = true;
                }
                update.status = Some(value);
            }
            _ => {}
        }
    }

    recognised.then_some(update)
}

fn is_completion_status(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "complete" | "completed" | "finished" | "done"
    )
}

fn parse_count(text: &str) -> Option<u64> {
    let text = text.trim();
    text.parse::<u64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64))
}

/// Seconds as a number, or `HH:MM:SS` / `MM:SS` with optional fractional seconds
pub fn parse_duration(text: &str) -> Option<f64> {
    let text = text.trim().trim_end_matches('s');
    if let Ok(seconds) = text.parse::<f64>() {
        return (seconds.is_finite() && seconds >= 0.0).then_some(seconds);
    }

    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }
    let mut total = 0.0;
    for part in &parts {
        let value = part.parse::<f64>().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        total = total * 60.0 + value;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_progress_line() {
        let update = decode(
            r#"{"currentFrame": 120, "totalFrames": 480, "fps": 24.5, "eta": "00:00:14", "tasETA": 95.5, "status": "Upscaling"}"#,
        )
        .unwrap();
        assert_eq!(update.current_frame, Some(120));
        assert_eq!(update.total_frames, Some(480));
        assert_eq!(update.fps, Some(24.5));
        assert_eq!(update.eta, Some(14.0));
        assert_eq!(update.tas_eta, Some(95.5));
        assert_eq!(update.status.as_deref(), Some("Upscaling"));
    }

    #[test]
    fn test_key_value_progress_line() {
        let update = decode("frame=12/240 fps=30.0 eta=7.6 tas_eta=01:02").unwrap();
        assert_eq!(update.current_frame, Some(12));
        assert_eq!(update.total_frames, Some(240));
        assert_eq!(update.eta, Some(7.6));
        assert_eq!(update.tas_eta, Some(62.0));
    }

    #[test]
    fn test_pipe_separated_colon_pairs() {
        let update = decode("frame: 5 | total: 10 | fps: 2").unwrap();
        assert_eq!(update.current_frame, Some(5));
        assert_eq!(update.total_frames, Some(10));
        assert_eq!(update.fps, Some(2.0));
    }

    #[test]
    fn test_mixed_equals_and_colon_pairs() {
        let update = decode("frame=5 eta: 00:01:02").unwrap();
        assert_eq!(update.current_frame, Some(5));
        assert_eq!(update.eta, Some(62.0));

        let update = decode("frame: 7/70, tasETA: 90").unwrap();
        assert_eq!(update.current_frame, Some(7));
        assert_eq!(update.total_frames, Some(70));
        assert_eq!(update.tas_eta, Some(90.0));
    }

    #[test]
    fn test_unparseable_values_are_dropped() {
        let update = decode("frame=5 fps=fast eta=soon").unwrap();
        assert_eq!(update.current_frame, Some(5));
        assert_eq!(update.fps, None);
        assert_eq!(update.eta, None);
        assert!(decode("frame: abc").is_none());
        assert!(decode("frame: eta: 4").is_none());
    }

    #[test]
    fn test_plain_log_lines_are_not_progress() {
        assert!(decode("Loading model shufflecugan...").is_none());
        assert!(decode("").is_none());
        assert!(decode("fps=24").is_none());
        assert!(decode("[1, 2, 3]").is_none());
    }

    #[test]
    fn test_malformed_lines_never_panic() {
        for line in [
            "{\"currentFrame\": ",
            "frame=",
            "frame=abc total=xyz",
            "eta=::",
            "{\"currentFrame\": -4}",
            "frame=12/",
            "\u{0}\u{1}garbage",
        ] {
            let _ = decode(line);
        }
        assert!(decode("frame=abc").is_none());
    }

    #[test]
    fn test_completion_signals() {
        assert!(decode("Process complete").unwrap().complete);
        assert!(decode("  DONE. ").unwrap().complete);
        assert!(decode(r#"{"status": "Finished"}"#).unwrap().complete);
    }

    #[test]
    fn test_snapshot_keeps_eta_variants_apart() {
        let mut snapshot = ProgressSnapshot::default();
        snapshot.apply(&decode(r#"{"frame": 10, "total": 100, "eta": 30, "tasETA": 300}"#).unwrap());
        assert_eq!(snapshot.eta, Some(30.0));
        assert_eq!(snapshot.tas_eta, Some(300.0));
        assert_eq!(snapshot.percent, 10.0);
    }

    #[test]
    fn test_snapshot_estimates_missing_eta() {
        let mut snapshot = ProgressSnapshot::default();
        snapshot.apply(&decode("frame=20 total=120 fps=10").unwrap());
        assert_eq!(snapshot.eta, Some(10.0));
        assert_eq!(snapshot.tas_eta, None);
    }

    #[test]
    fn test_frame_counter_is_monotonic_within_phase() {
        let mut snapshot = ProgressSnapshot::default();
        let mut last = 0;
        for frame in (0..200).step_by(7) {
            snapshot.apply(&decode(&format!("frame={} total=200", frame)).unwrap());
            assert!(snapshot.current_frame >= last);
            last = snapshot.current_frame;
        }
        // A late, out-of-order line does not move the counter back
        snapshot.apply(&decode("frame=3 total=200").unwrap());
        assert_eq!(snapshot.current_frame, last);
    }

    #[test]
    fn test_new_phase_restarts_counter() {
        let mut snapshot = ProgressSnapshot::default();
        snapshot.apply(&decode("frame=90 total=100 status=Deduplicating").unwrap());
        snapshot.apply(&decode("frame=4 total=100 status=Upscaling").unwrap());
        assert_eq!(snapshot.current_frame, 4);
        assert_eq!(snapshot.status.as_deref(), Some("Upscaling"));
    }

    #[test]
    fn test_completion_sets_full_percent() {
        let mut snapshot = ProgressSnapshot::default();
        snapshot.apply(&decode("frame=50 total=100").unwrap());
        snapshot.apply(&decode("Process complete").unwrap());
        assert!(snapshot.complete);
        assert_eq!(snapshot.percent, 100.0);
        assert_eq!(snapshot.current_frame, 50);
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("90"), Some(90.0));
        assert_eq!(parse_duration("12.5s"), Some(12.5));
        assert_eq!(parse_duration("01:00:05"), Some(3605.0));
        assert_eq!(parse_duration("-3"), None);
        assert_eq!(parse_duration("1:2:3:4"), None);
    }
}
