use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::{Connection, ErrorCode};
use tokio::sync::oneshot;

pub mod helpers;
pub mod models;
pub mod postgres;
mod repositories;
pub mod schema;
pub mod store;

pub use models::{NewReading, SensorReading, WindowTable};
pub use postgres::PgStore;
pub use store::ReadingStore;

use crate::settings::{StoreBackend, StoreSettings};

/// Opens the configured backend. Neither backend connects until first use.
pub fn open_store(settings: &StoreSettings) -> Result<Arc<dyn ReadingStore>> {
    let store: Arc<dyn ReadingStore> = match settings.backend {
        StoreBackend::Sqlite => Arc::new(Database::new(
            settings.path.clone(),
            settings.busy_timeout(),
        )?),
        StoreBackend::Postgres => Arc::new(PgStore::new(
            settings.postgres_config()?,
            settings.operation_timeout(),
        )),
    };
    Ok(store)
}

type DbTask = Box<dyn FnOnce(&mut ConnectionSlot) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

/// The worker thread's connection. Opened lazily, dropped after a
/// connection-level fault so the next command reconnects.
struct ConnectionSlot {
    path: PathBuf,
    busy_timeout: Duration,
    conn: Option<Connection>,
}

impl ConnectionSlot {
    fn acquire(&mut self) -> Result<&mut Connection> {
        if self.conn.is_none() {
            let conn = open_connection(&self.path, self.busy_timeout)?;
            info!("Opened sensor database at {}", self.path.display());
            self.conn = Some(conn);
        }
        self.conn
            .as_mut()
            .ok_or_else(|| anyhow!("sensor database connection missing"))
    }

    fn reset(&mut self) {
        if self.conn.take().is_some() {
            warn!(
                "Dropping sensor database connection to {}; will reconnect on next use",
                self.path.display()
            );
        }
    }
}

fn open_connection(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open sensor database {}", path.display()))?;

    conn.busy_timeout(busy_timeout)
        .context("failed to set busy timeout")?;
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        error!("Failed to enable WAL mode: {err}");
    }

    Ok(conn)
}

/// True when the error chain holds a SQLite failure that points at the
/// connection or file rather than the statement.
pub(crate) fn is_connection_fault(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause
                .downcast_ref::<rusqlite::Error>()
                .and_then(|e| e.sqlite_error_code()),
            Some(
                ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::DatabaseCorrupt
                    | ErrorCode::NotADatabase
                    | ErrorCode::ReadOnly
                    | ErrorCode::PermissionDenied
                    | ErrorCode::OutOfMemory
            )
        )
    })
}

/// True when the error chain says `sensor_data` does not exist.
pub(crate) fn is_missing_table(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| match cause.downcast_ref::<rusqlite::Error>() {
        Some(rusqlite::Error::SqliteFailure(_, Some(msg))) => msg.contains("no such table"),
        _ => false,
    })
}

/// Cloneable handle to the sensor database. All access is serialized through
/// one worker thread that owns the SQLite connection.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("sensedash-db".into())
            .spawn(move || {
                let mut slot = ConnectionSlot {
                    path: path_for_thread,
                    busy_timeout,
                    conn: None,
                };

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut slot);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        info!("Database handle created for {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    /// Runs `task` on the worker thread against a live connection.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |slot: &mut ConnectionSlot| {
            let result = slot.acquire().and_then(task);
            if let Err(err) = &result {
                if is_connection_fault(err) {
                    slot.reset();
                }
            }
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        self.execute(schema::ensure_schema).await
    }
}
