use crate::errors::RecorderError;
use crate::logging::append_run_log;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::{mpsc, oneshot};

type StoreResult<T> = Result<T, RecorderError>;

// One key maps to one serialized blob, read at startup and fully
// rewritten on every mutation.
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;
    fn put(&self, key: &str, value: &str) -> StoreResult<()>;
}

#[derive(Debug)]
enum KvCmd {
    Get {
        key: String,
        reply: oneshot::Sender<StoreResult<Option<String>>>,
    },
    Put {
        key: String,
        value: String,
        reply: oneshot::Sender<StoreResult<()>>,
    },
}

// A single connection is owned by a dedicated thread; callers block on
// a oneshot reply, so all access stays serialized.
#[derive(Debug)]
pub struct SqliteStorage {
    cmd_tx: Option<mpsc::Sender<KvCmd>>,
    writer_join: Option<thread::JoinHandle<()>>,
    db_path: PathBuf,
}

impl Drop for SqliteStorage {
    fn drop(&mut self) {
        // Close the sender so the writer loop exits, then join it to
        // flush in-flight writes.
        drop(self.cmd_tx.take());
        if let Some(handle) = self.writer_join.take() {
            let _ = handle.join();
        }
    }
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        append_run_log(
            "info",
            "storage.open",
            json!({ "path": path.display().to_string() }),
        );
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RecorderError::Storage(e.to_string()))?;
        }

        let existed_before_open = path.exists();

        // Zero-byte files indicate prior corruption.
        if existed_before_open {
            let meta =
                std::fs::metadata(&path).map_err(|e| RecorderError::Storage(e.to_string()))?;
            if meta.len() == 0 {
                return Err(RecorderError::Storage(format!(
                    "attendance database is 0 bytes (corrupt): {}",
                    path.display()
                )));
            }
        }

        let conn = Connection::open(&path).map_err(db_err)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(db_err)?;
        conn.pragma_update(None, "synchronous", "FULL").map_err(db_err)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(db_err)?;

        // Run quick_check on existing databases to catch corruption early.
        if existed_before_open {
            let integrity: String = conn
                .pragma_query_value(None, "quick_check", |row| row.get(0))
                .map_err(db_err)?;
            if integrity != "ok" {
                return Err(RecorderError::Storage(format!(
                    "attendance database failed integrity check: {integrity}"
                )));
            }
        }

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .map_err(db_err)?;

        let (cmd_tx, mut cmd_rx) = mpsc::channel(64);
        let writer_join = thread::spawn(move || {
            while let Some(cmd) = cmd_rx.blocking_recv() {
                match cmd {
                    KvCmd::Get { key, reply } => {
                        let _ = reply.send(fetch_value(&conn, &key));
                    }
                    KvCmd::Put { key, value, reply } => {
                        let _ = reply.send(store_value(&conn, &key, &value));
                    }
                }
            }
        });

        append_run_log(
            "info",
            "storage.opened",
            json!({ "path": path.display().to_string(), "existed": existed_before_open }),
        );

        Ok(Self {
            cmd_tx: Some(cmd_tx),
            writer_join: Some(writer_join),
            db_path: path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn sender(&self) -> StoreResult<&mpsc::Sender<KvCmd>> {
        self.cmd_tx
            .as_ref()
            .ok_or_else(|| RecorderError::Storage("storage is closed".to_string()))
    }
}

impl StorageBackend for SqliteStorage {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender()?
            .blocking_send(KvCmd::Get {
                key: key.to_string(),
                reply: reply_tx,
            })
            .map_err(|e| RecorderError::Storage(e.to_string()))?;
        reply_rx
            .blocking_recv()
            .map_err(|e| RecorderError::Storage(e.to_string()))?
    }

    fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender()?
            .blocking_send(KvCmd::Put {
                key: key.to_string(),
                value: value.to_string(),
                reply: reply_tx,
            })
            .map_err(|e| RecorderError::Storage(e.to_string()))?;
        reply_rx
            .blocking_recv()
            .map_err(|e| RecorderError::Storage(e.to_string()))?
    }
}

fn fetch_value(conn: &Connection, key: &str) -> StoreResult<Option<String>> {
    conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
        row.get(0)
    })
    .optional()
    .map_err(db_err)
}

fn store_value(conn: &Connection, key: &str, value: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO kv (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )
    .map_err(db_err)?;
    Ok(())
}

fn db_err(error: rusqlite::Error) -> RecorderError {
    RecorderError::Storage(error.to_string())
}

// In-memory double with a scriptable one-shot failure.
#[derive(Default, Clone)]
pub struct MemoryStorage {
    values: Arc<Mutex<HashMap<String, String>>>,
    fail_next: Arc<Mutex<Option<RecorderError>>>,
}

impl MemoryStorage {
    pub fn with_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        let storage = Self::default();
        if let Ok(mut values) = storage.values.lock() {
            values.insert(key.into(), value.into());
        }
        storage
    }

    pub fn set_fail_next(&self, error: RecorderError) {
        if let Ok(mut slot) = self.fail_next.lock() {
            *slot = Some(error);
        }
    }

    pub fn stored(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn maybe_fail(&self) -> StoreResult<()> {
        let Ok(mut slot) = self.fail_next.lock() else {
            return Ok(());
        };
        if let Some(err) = slot.take() {
            return Err(err);
        }
        Ok(())
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.maybe_fail()?;
        Ok(self
            .values
            .lock()
            .map_err(|_| RecorderError::Storage("storage lock poisoned".to_string()))?
            .get(key)
            .cloned())
    }

    fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        self.maybe_fail()?;
        self.values
            .lock()
            .map_err(|_| RecorderError::Storage("storage lock poisoned".to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
