use crate::errors::RecorderError;
use crate::types::Notification;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
    fn sleep_until(&self, deadline: SystemTime) -> Result<(), RecorderError>;
}

pub trait ProcessRunner: Send + Sync {
    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, RecorderError>;
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, RecorderError>;
    fn write_string(&self, path: &Path, contents: &str) -> Result<(), RecorderError>;
    fn exists(&self, path: &Path) -> bool;
}

pub trait Terminal: Send + Sync {
    fn stdin_is_tty(&self) -> bool;
    fn write_line(&self, line: &str) -> Result<(), RecorderError>;
}

// Sink for transient add-time notifications; a presentation layer
// renders these however it likes.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

// Environment-reported reachability: seeds the engine's cached state
// once and delivers explicit online/offline transitions.
pub trait ConnectivityProvider: Send + Sync {
    fn online(&self) -> bool;
    fn subscribe(&self) -> watch::Receiver<bool>;
}

pub fn unix_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as i64,
        Err(behind) => -(behind.duration().as_millis() as i64),
    }
}

pub struct ProductionClock;

impl Clock for ProductionClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep_until(&self, deadline: SystemTime) -> Result<(), RecorderError> {
        let now = SystemTime::now();
        if let Ok(duration) = deadline.duration_since(now) {
            std::thread::sleep(duration);
        }
        Ok(())
    }
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, RecorderError> {
        std::fs::read_to_string(path).map_err(|e| RecorderError::Io(e.to_string()))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), RecorderError> {
        std::fs::write(path, contents).map_err(|e| RecorderError::Io(e.to_string()))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

pub struct ProductionProcessRunner;

impl ProcessRunner for ProductionProcessRunner {
    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, RecorderError> {
        let mut cmd = std::process::Command::new(&request.program);
        cmd.args(&request.args);
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        let output = cmd
            .output()
            .map_err(|e| RecorderError::Remote(e.to_string()))?;
        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn stdin_is_tty(&self) -> bool {
        std::io::IsTerminal::is_terminal(&std::io::stdin())
    }

    fn write_line(&self, line: &str) -> Result<(), RecorderError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| RecorderError::Io(e.to_string()))
    }
}

pub struct LineNotifier {
    terminal: Arc<dyn Terminal>,
}

impl LineNotifier {
    pub fn new(terminal: Arc<dyn Terminal>) -> Self {
        Self { terminal }
    }
}

impl Notifier for LineNotifier {
    fn notify(&self, notification: Notification) {
        let _ = self
            .terminal
            .write_line(&format!("checkin {}", notification.as_str()));
    }
}

// Watch-channel connectivity source. Production wiring seeds it from
// configuration; the embedding environment (or a test) flips it.
#[derive(Clone)]
pub struct ConnectivitySignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivitySignal {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx: Arc::new(tx) }
    }

    pub fn set_online(&self, online: bool) {
        // send_replace delivers even when no subscriber is registered.
        let _ = self.tx.send_replace(online);
    }
}

impl ConnectivityProvider for ConnectivitySignal {
    fn online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

pub struct RecorderRuntime {
    pub clock: Arc<dyn Clock>,
    pub file_system: Arc<dyn FileSystem>,
    pub process_runner: Arc<dyn ProcessRunner>,
    pub terminal: Arc<dyn Terminal>,
}

impl RecorderRuntime {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(ProductionClock),
            file_system: Arc::new(ProductionFileSystem),
            process_runner: Arc::new(ProductionProcessRunner),
            terminal: Arc::new(ProductionTerminal),
        }
    }
}

impl Default for RecorderRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct FakeClock {
    now: Arc<Mutex<SystemTime>>,
    sleeps: Arc<Mutex<Vec<SystemTime>>>,
}

impl FakeClock {
    pub fn new(now: SystemTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn advance(&self, delta: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += delta;
        }
    }

    pub fn sleeps(&self) -> Vec<SystemTime> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> SystemTime {
        self.now
            .lock()
            .map(|now| *now)
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }

    fn sleep_until(&self, deadline: SystemTime) -> Result<(), RecorderError> {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(deadline);
        }
        if let Ok(mut now) = self.now.lock() {
            *now = deadline;
        }
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        if let Ok(mut files) = fs.files.lock() {
            files.insert(path.into(), contents.into());
        }
        fs
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, RecorderError> {
        self.files
            .lock()
            .map_err(|_| RecorderError::Io("files lock poisoned".to_string()))?
            .get(path)
            .cloned()
            .ok_or_else(|| RecorderError::Io(format!("missing file {}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), RecorderError> {
        self.files
            .lock()
            .map_err(|_| RecorderError::Io("files lock poisoned".to_string()))?
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files
            .lock()
            .map(|files| files.contains_key(path))
            .unwrap_or(false)
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    pub is_tty: bool,
    writes: Arc<Mutex<Vec<String>>>,
}

impl FakeTerminal {
    pub fn new(is_tty: bool) -> Self {
        Self {
            is_tty,
            ..Self::default()
        }
    }

    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl Terminal for FakeTerminal {
    fn stdin_is_tty(&self) -> bool {
        self.is_tty
    }

    fn write_line(&self, line: &str) -> Result<(), RecorderError> {
        self.writes
            .lock()
            .map_err(|_| RecorderError::Io("writes lock poisoned".to_string()))?
            .push(line.to_string());
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct FakeProcessRunner {
    responses: Arc<Mutex<Vec<Result<ProcessOutput, RecorderError>>>>,
    requests: Arc<Mutex<Vec<ProcessRequest>>>,
}

impl FakeProcessRunner {
    pub fn push_response(&self, output: Result<ProcessOutput, RecorderError>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push(output);
        }
    }

    pub fn requests(&self) -> Vec<ProcessRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ProcessRunner for FakeProcessRunner {
    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, RecorderError> {
        self.requests
            .lock()
            .map_err(|_| RecorderError::Remote("requests lock poisoned".to_string()))?
            .push(request);
        let mut responses = self
            .responses
            .lock()
            .map_err(|_| RecorderError::Remote("responses lock poisoned".to_string()))?;
        if responses.is_empty() {
            return Err(RecorderError::Remote("no fake response queued".to_string()));
        }
        responses.remove(0)
    }
}

#[derive(Default, Clone)]
pub struct FakeNotifier {
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl FakeNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }
}

impl Notifier for FakeNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(mut notifications) = self.notifications.lock() {
            notifications.push(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{unix_millis, ConnectivityProvider, ConnectivitySignal, FakeClock};
    use std::time::{Duration, SystemTime};

    #[test]
    fn fake_clock_advances_and_records_sleeps() {
        let clock = FakeClock::default();
        clock.advance(Duration::from_millis(500));
        assert_eq!(unix_millis(super::Clock::now(&clock)), 500);

        let deadline = SystemTime::UNIX_EPOCH + Duration::from_millis(2_000);
        super::Clock::sleep_until(&clock, deadline).expect("sleep");
        assert_eq!(unix_millis(super::Clock::now(&clock)), 2_000);
        assert_eq!(clock.sleeps(), vec![deadline]);
    }

    #[test]
    fn connectivity_signal_delivers_transitions() {
        let signal = ConnectivitySignal::new(false);
        let mut rx = signal.subscribe();
        assert!(!signal.online());
        assert!(!rx.has_changed().expect("channel open"));

        signal.set_online(true);
        assert!(signal.online());
        assert!(rx.has_changed().expect("channel open"));
        assert!(*rx.borrow_and_update());
    }
}
