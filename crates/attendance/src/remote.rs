use crate::errors::RecorderError;
use crate::logging::append_run_log;
use crate::record_store::AttendanceRecord;
use crate::runtime::{ProcessRequest, ProcessRunner};
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

// Accepts an ordered batch and reports success or failure for the
// batch as a whole; there is no per-record acknowledgement.
pub trait RemoteEndpoint: Send + Sync {
    fn push_batch(&self, batch: &[AttendanceRecord]) -> Result<(), RecorderError>;
}

// Hands the batch to a caller-configured command run through `sh -lc`,
// with the batch JSON as `$1`. Exit code zero means accepted.
pub struct CommandEndpoint {
    runner: Arc<dyn ProcessRunner>,
    command: String,
    cwd: Option<PathBuf>,
}

impl CommandEndpoint {
    pub fn new(runner: Arc<dyn ProcessRunner>, command: impl Into<String>) -> Self {
        Self {
            runner,
            command: command.into(),
            cwd: None,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

impl RemoteEndpoint for CommandEndpoint {
    fn push_batch(&self, batch: &[AttendanceRecord]) -> Result<(), RecorderError> {
        let payload =
            serde_json::to_string(batch).map_err(|e| RecorderError::Remote(e.to_string()))?;
        append_run_log(
            "debug",
            "remote.push",
            json!({ "command": self.command, "batch": batch.len() }),
        );
        let out = self.runner.run(ProcessRequest {
            program: "sh".to_string(),
            args: vec![
                "-lc".to_string(),
                self.command.clone(),
                "attendance-sync".to_string(),
                payload,
            ],
            cwd: self.cwd.clone(),
        })?;
        if out.exit_code != 0 {
            let stderr = out.stderr.trim();
            let message = if stderr.is_empty() {
                format!("sync command exited with code {}", out.exit_code)
            } else {
                stderr.to_string()
            };
            return Err(RecorderError::Remote(message));
        }
        Ok(())
    }
}

// Queued outcomes are consumed in order and every submitted batch is
// recorded; with nothing queued it accepts.
#[derive(Default, Clone)]
pub struct FakeEndpoint {
    outcomes: Arc<Mutex<Vec<Result<(), String>>>>,
    batches: Arc<Mutex<Vec<Vec<AttendanceRecord>>>>,
}

impl FakeEndpoint {
    pub fn push_outcome(&self, outcome: Result<(), String>) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push(outcome);
        }
    }

    pub fn batches(&self) -> Vec<Vec<AttendanceRecord>> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.batches.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn clear_history(&self) {
        if let Ok(mut batches) = self.batches.lock() {
            batches.clear();
        }
    }
}

impl RemoteEndpoint for FakeEndpoint {
    fn push_batch(&self, batch: &[AttendanceRecord]) -> Result<(), RecorderError> {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(batch.to_vec());
        }
        let outcome = match self.outcomes.lock() {
            Ok(mut outcomes) if !outcomes.is_empty() => outcomes.remove(0),
            _ => Ok(()),
        };
        outcome.map_err(RecorderError::Remote)
    }
}

pub fn failure_message(error: &RecorderError) -> String {
    match error {
        RecorderError::Remote(message) => message.clone(),
        other => other.to_string(),
    }
}
