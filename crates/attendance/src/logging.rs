use crate::errors::RecorderError;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

pub const DEFAULT_DISK_BUDGET_BYTES: u64 = 20 * 1024 * 1024;
pub const DEFAULT_RUN_LOG_DIR: &str = ".cache/attendance/logs";

#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: 4096,
            budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
        }
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), RecorderError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| RecorderError::Io(e.to_string()))?;
        }
        let truncated = truncate_json(event.payload.clone(), self.max_payload_bytes);
        let line = serde_json::to_string(&LogEvent {
            level: event.level,
            event_type: event.event_type,
            payload: truncated,
        })
        .map_err(|e| RecorderError::Io(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| RecorderError::Io(e.to_string()))?;
        file.write_all(line.as_bytes())
            .map_err(|e| RecorderError::Io(e.to_string()))?;
        file.write_all(b"\n")
            .map_err(|e| RecorderError::Io(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            let _ = enforce_journal_budget(parent, self.budget_bytes)?;
        }

        Ok(())
    }
}

// Keeps the journal directory under a byte budget by deleting the
// oldest files first.
pub fn enforce_journal_budget(dir: &Path, budget_bytes: u64) -> Result<usize, RecorderError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| RecorderError::Io(e.to_string()))? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        let Ok(meta) = entry.metadata() else { continue };
        if meta.is_file() {
            files.push((meta.modified().ok(), meta.len(), path));
        }
    }
    files.sort();

    let mut total: u64 = files.iter().map(|(_, len, _)| len).sum();
    let mut removed = 0usize;
    for (_, len, path) in files {
        if total <= budget_bytes {
            break;
        }
        fs::remove_file(&path).map_err(|e| RecorderError::Io(e.to_string()))?;
        total = total.saturating_sub(len);
        removed += 1;
    }
    Ok(removed)
}

fn run_log_dir() -> &'static Mutex<PathBuf> {
    static DIR: OnceLock<Mutex<PathBuf>> = OnceLock::new();
    DIR.get_or_init(|| Mutex::new(PathBuf::from(DEFAULT_RUN_LOG_DIR)))
}

pub fn set_run_log_dir(dir: impl Into<PathBuf>) {
    if let Ok(mut guard) = run_log_dir().lock() {
        *guard = dir.into();
    }
}

// Best-effort: instrumentation must never take down the recording
// path, so failures here are swallowed.
pub fn append_run_log(level: &str, event_type: &str, payload: Value) {
    let path = match run_log_dir().lock() {
        Ok(guard) => guard.join("run.jsonl"),
        Err(_) => return,
    };
    let logger = JsonlLogger::new(path);
    let _ = logger.append(&LogEvent {
        level,
        event_type,
        payload,
    });
}

pub fn status_line(pending: usize, is_syncing: bool, error: Option<&str>) -> String {
    format!(
        "pending={pending} syncing={is_syncing} error={} ",
        error.unwrap_or("none").replace('\n', "\\n")
    )
}

fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    let mut truncated = rendered;
    truncated.truncate(max_bytes.saturating_sub(3));
    Value::String(format!("{truncated}..."))
}
