pub mod config;
pub mod errors;
pub mod logging;
pub mod record_id;
pub mod record_store;
pub mod recorder;
pub mod remote;
pub mod runtime;
pub mod storage;
pub mod sync_engine;
pub mod types;

use clap::{error::ErrorKind, Parser};
use config::{load_config, CliOverrides};
use errors::RecorderError;
use logging::{set_run_log_dir, status_line};
use record_store::{NewRecord, RecordStore};
use recorder::Recorder;
use remote::CommandEndpoint;
use runtime::{ConnectivityProvider, ConnectivitySignal, LineNotifier, RecorderRuntime};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use storage::SqliteStorage;
use sync_engine::SyncEngine;

#[derive(Debug, Clone, Parser)]
#[command(name = "attendance")]
#[command(about = "Offline-tolerant attendance recording with remote sync")]
pub struct Cli {
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub db: Option<PathBuf>,
    #[arg(long)]
    pub member: Option<String>,
    #[arg(long)]
    pub service: Option<String>,
    #[arg(long)]
    pub location: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
    #[arg(long, default_value_t = false)]
    pub retry: bool,
    #[arg(long = "clear-errors", default_value_t = false)]
    pub clear_errors: bool,
    #[arg(long, default_value_t = false)]
    pub offline: bool,
    #[arg(long)]
    pub interval: Option<u64>,
    #[arg(long = "max-retries")]
    pub max_retries: Option<u32>,
    #[arg(long = "remote-command")]
    pub remote_command: Option<String>,
    #[arg(long)]
    pub ticks: Option<u32>,
}

pub fn run() -> Result<i32, RecorderError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| RecorderError::Io(e.to_string()))?;
    let runtime = RecorderRuntime::new();
    run_with_runtime(&args, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &Path,
    runtime: &RecorderRuntime,
) -> Result<i32, RecorderError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(RecorderError::Cli(error.to_string())),
        },
    };

    let draft = parse_draft(&cli)?;

    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        db_path: cli.db.clone(),
        interval_seconds: cli.interval,
        max_retries: cli.max_retries,
        remote_command: cli.remote_command.clone(),
        offline: cli.offline,
    };
    let cfg = load_config(&overrides, runtime.file_system.as_ref())?;

    set_run_log_dir(absolutize_path(cwd, &cfg.storage.run_log_dir));

    let storage = SqliteStorage::open(absolutize_path(cwd, &cfg.storage.db_path))?;
    let store = RecordStore::load(Arc::new(storage));

    let connectivity = ConnectivitySignal::new(cfg.connectivity.assume_online);
    let mut transitions = connectivity.subscribe();
    let endpoint =
        CommandEndpoint::new(runtime.process_runner.clone(), cfg.remote.command.clone())
            .with_cwd(cwd);
    let engine = SyncEngine::new(
        Arc::new(endpoint),
        runtime.clock.clone(),
        Duration::from_secs(cfg.sync.interval_seconds),
        cfg.sync.max_retries,
        connectivity.online(),
    );
    let notifier = LineNotifier::new(runtime.terminal.clone());
    let mut recorder = Recorder::new(store, engine, runtime.clock.clone(), Arc::new(notifier));

    if let Some(draft) = draft {
        let record = recorder.add_record(draft);
        runtime
            .terminal
            .write_line(&format!("recorded {}", &record.id[..12]))?;
    }

    if cli.clear_errors {
        recorder.clear_sync_errors();
        runtime.terminal.write_line("sync errors cleared")?;
    }

    if cli.retry {
        recorder.retry_sync();
    }

    for _ in 0..cli.ticks.unwrap_or(0) {
        if let Some(deadline) = recorder.next_sync_at() {
            runtime.clock.sleep_until(deadline)?;
        }
        while transitions.has_changed().unwrap_or(false) {
            let online = *transitions.borrow_and_update();
            recorder.set_connectivity(online);
        }
        recorder.tick();
    }

    let status = recorder.sync_status();
    if runtime.terminal.stdin_is_tty() {
        runtime.terminal.write_line(&format!(
            "{} records, {} pending{}",
            recorder.records().len(),
            status.pending_records,
            status
                .error
                .as_deref()
                .map(|error| format!(", last error: {error}"))
                .unwrap_or_default()
        ))?;
    } else {
        runtime.terminal.write_line(&status_line(
            status.pending_records,
            status.is_syncing,
            status.error.as_deref(),
        ))?;
    }

    Ok(0)
}

fn parse_draft(cli: &Cli) -> Result<Option<NewRecord>, RecorderError> {
    match (&cli.member, &cli.service, &cli.location) {
        (None, None, None) => {
            if cli.notes.is_some() {
                return Err(RecorderError::Cli(
                    "--notes requires --member, --service and --location".to_string(),
                ));
            }
            Ok(None)
        }
        (Some(member), Some(service), Some(location)) => Ok(Some(NewRecord {
            member_id: member.clone(),
            service_id: service.clone(),
            location: location.clone(),
            notes: cli.notes.clone(),
        })),
        _ => Err(RecorderError::Cli(
            "recording a check-in requires --member, --service and --location".to_string(),
        )),
    }
}

fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}
