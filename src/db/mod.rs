use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{error, info};
use rusqlite::{params, Connection, Row};
use tokio::sync::oneshot;

mod migrations;
pub mod models;

use migrations::run_migrations;
use models::{AttendanceRecord, RegisteredFace};

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

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

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| anyhow!("invalid datetime '{value}': {err}"))
}

fn parse_descriptor(value: &str) -> Result<Vec<f32>> {
    serde_json::from_str(value).map_err(|err| anyhow!("invalid descriptor json: {err}"))
}

fn attendance_from_row(row: &Row<'_>) -> Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        id: row.get::<_, String>(0)?,
        name: row.get::<_, String>(1)?,
        marked_at: parse_datetime(&row.get::<_, String>(2)?)?,
        distance: row.get::<_, f64>(3)?,
    })
}

/// Handle to the SQLite store. All statements run on one dedicated worker
/// thread; callers hand it closures over an mpsc channel and await the reply
/// on a oneshot, so writes are naturally serialized.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("rollcall-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!("Failed to enable foreign keys: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database initialized at {}", db_path.as_path().display());

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

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
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

    /// Registers a face, replacing the stored descriptor when the name is
    /// already taken. Re-registering never creates a duplicate row.
    pub async fn upsert_face(&self, face: &RegisteredFace) -> Result<()> {
        let record = face.clone();
        self.execute(move |conn| {
            let descriptor_json = serde_json::to_string(&record.descriptor)
                .context("failed to encode descriptor")?;
            conn.execute(
                "INSERT INTO registered_faces (name, descriptor, created_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET
                     descriptor = excluded.descriptor,
                     created_at = excluded.created_at",
                params![record.name, descriptor_json, record.created_at.to_rfc3339()],
            )
            .with_context(|| "failed to upsert registered face")?;
            Ok(())
        })
        .await
    }

    pub async fn list_faces(&self) -> Result<Vec<RegisteredFace>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, descriptor, created_at
                 FROM registered_faces
                 ORDER BY name ASC",
            )?;

            let mut rows = stmt.query([])?;
            let mut faces = Vec::new();
            while let Some(row) = rows.next()? {
                faces.push(RegisteredFace {
                    name: row.get::<_, String>(0)?,
                    descriptor: parse_descriptor(&row.get::<_, String>(1)?)?,
                    created_at: parse_datetime(&row.get::<_, String>(2)?)?,
                });
            }

            Ok(faces)
        })
        .await
    }

    pub async fn registered_names(&self) -> Result<Vec<String>> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT name FROM registered_faces ORDER BY name ASC")?;
            let mut rows = stmt.query([])?;
            let mut names = Vec::new();
            while let Some(row) = rows.next()? {
                names.push(row.get::<_, String>(0)?);
            }
            Ok(names)
        })
        .await
    }

    /// Returns whether a row was actually removed.
    pub async fn delete_face(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.execute(move |conn| {
            let affected = conn
                .execute("DELETE FROM registered_faces WHERE name = ?1", params![name])
                .with_context(|| "failed to delete registered face")?;
            Ok(affected > 0)
        })
        .await
    }

    pub async fn insert_attendance(&self, record: &AttendanceRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO attendance_records (id, name, marked_at, distance)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id,
                    record.name,
                    record.marked_at.to_rfc3339(),
                    record.distance,
                ],
            )
            .with_context(|| "failed to insert attendance record")?;
            Ok(())
        })
        .await
    }

    pub async fn recent_attendance(&self, limit: u32) -> Result<Vec<AttendanceRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, marked_at, distance
                 FROM attendance_records
                 ORDER BY marked_at DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(attendance_from_row(row)?);
            }

            Ok(records)
        })
        .await
    }

    /// Records with `start <= marked_at < end`, oldest first.
    pub async fn attendance_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AttendanceRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, marked_at, distance
                 FROM attendance_records
                 WHERE marked_at >= ?1 AND marked_at < ?2
                 ORDER BY marked_at ASC",
            )?;

            let mut rows = stmt.query(params![start.to_rfc3339(), end.to_rfc3339()])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(attendance_from_row(row)?);
            }

            Ok(records)
        })
        .await
    }
}
