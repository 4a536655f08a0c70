use std::{
    path::PathBuf,
    str::FromStr,
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{error, info};
use rusqlite::{params, Connection, Row};
use tokio::sync::oneshot;

mod migrations;

use crate::models::{Cabin, CabinStatus, DetectionMethod, SessionRecord};
use crate::tracker::state_machine::StatusUpdate;
use migrations::run_migrations;

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

fn status_from_str(value: &str) -> Result<CabinStatus> {
    match value {
        "active" => Ok(CabinStatus::Active),
        "idle" => Ok(CabinStatus::Idle),
        "long_break" => Ok(CabinStatus::LongBreak),
        "empty" => Ok(CabinStatus::Empty),
        _ => Err(anyhow!("unknown cabin status '{value}'")),
    }
}

const CABIN_COLUMNS: &str = "cabin_no, camera_url, student_id, student_name, status, \
     current_session_start, current_session_duration, last_activity, created_at, updated_at";

fn cabin_from_row(row: &Row<'_>) -> Result<Cabin> {
    Ok(Cabin {
        cabin_no: row.get(0)?,
        camera_url: row.get(1)?,
        student_id: row.get(2)?,
        student_name: row.get(3)?,
        status: status_from_str(&row.get::<_, String>(4)?)?,
        current_session_start: row
            .get::<_, Option<String>>(5)?
            .map(|s| parse_datetime(&s))
            .transpose()?,
        current_session_duration: row.get(6)?,
        last_activity: row
            .get::<_, Option<String>>(7)?
            .map(|s| parse_datetime(&s))
            .transpose()?,
        created_at: parse_datetime(&row.get::<_, String>(8)?)?,
        updated_at: parse_datetime(&row.get::<_, String>(9)?)?,
    })
}

fn session_from_row(row: &Row<'_>) -> Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        cabin_no: row.get(1)?,
        student_id: row.get(2)?,
        student_name: row.get(3)?,
        start_time: parse_datetime(&row.get::<_, String>(4)?)?,
        end_time: parse_datetime(&row.get::<_, String>(5)?)?,
        duration: row.get(6)?,
        detection_method: DetectionMethod::from_str(&row.get::<_, String>(7)?)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?)?,
    })
}

fn get_cabin_row(conn: &Connection, cabin_no: i64) -> Result<Option<Cabin>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CABIN_COLUMNS} FROM cabins WHERE cabin_no = ?1"
    ))?;
    let mut rows = stmt.query(params![cabin_no])?;
    match rows.next()? {
        Some(row) => Ok(Some(cabin_from_row(row)?)),
        None => Ok(None),
    }
}

fn insert_session_row(conn: &Connection, record: &SessionRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (id, cabin_no, student_id, student_name, start_time, end_time, duration, detection_method, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.id,
            record.cabin_no,
            record.student_id,
            record.student_name,
            record.start_time.to_rfc3339(),
            record.end_time.to_rfc3339(),
            record.duration,
            record.detection_method.as_str(),
            record.created_at.to_rfc3339(),
        ],
    )
    .with_context(|| "failed to insert session record")?;
    Ok(())
}

/// Result of applying a status update to a cabin: the persisted record and
/// the session that was closed, if any.
#[derive(Debug)]
pub struct AppliedUpdate {
    pub cabin: Cabin,
    pub closed_session: Option<SessionRecord>,
}

/// Handle to the SQLite store. All access runs on a dedicated worker thread;
/// each submitted closure executes alone, so a read-modify-write inside one
/// closure is atomic with respect to every other caller.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
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
            .name("cabinwatch-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(
                            Err(anyhow::Error::new(err).context("failed to open SQLite database")),
                        );
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

        info!("Database initialized at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
        })
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

    pub async fn create_cabin(&self, cabin_no: i64, camera_url: String) -> Result<Cabin> {
        self.execute(move |conn| {
            let cabin = Cabin::new(cabin_no, camera_url, Utc::now());
            conn.execute(
                "INSERT INTO cabins (cabin_no, camera_url, status, current_session_duration, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    cabin.cabin_no,
                    cabin.camera_url,
                    cabin.status.as_str(),
                    cabin.current_session_duration,
                    cabin.created_at.to_rfc3339(),
                    cabin.updated_at.to_rfc3339(),
                ],
            )
            .with_context(|| format!("failed to create cabin {cabin_no}"))?;
            Ok(cabin)
        })
        .await
    }

    pub async fn delete_cabin(&self, cabin_no: i64) -> Result<bool> {
        self.execute(move |conn| {
            let deleted = conn
                .execute("DELETE FROM cabins WHERE cabin_no = ?1", params![cabin_no])
                .with_context(|| format!("failed to delete cabin {cabin_no}"))?;
            Ok(deleted > 0)
        })
        .await
    }

    pub async fn get_cabin(&self, cabin_no: i64) -> Result<Option<Cabin>> {
        self.execute(move |conn| get_cabin_row(conn, cabin_no)).await
    }

    pub async fn list_cabins(&self) -> Result<Vec<Cabin>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CABIN_COLUMNS} FROM cabins ORDER BY cabin_no"
            ))?;
            let mut rows = stmt.query([])?;
            let mut cabins = Vec::new();
            while let Some(row) = rows.next()? {
                cabins.push(cabin_from_row(row)?);
            }
            Ok(cabins)
        })
        .await
    }

    /// Cabins the scheduler should inspect: an occupant is assigned and a
    /// camera endpoint is configured.
    pub async fn list_monitored_cabins(&self) -> Result<Vec<Cabin>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CABIN_COLUMNS} FROM cabins
                 WHERE student_id IS NOT NULL AND camera_url != ''
                 ORDER BY cabin_no"
            ))?;
            let mut rows = stmt.query([])?;
            let mut cabins = Vec::new();
            while let Some(row) = rows.next()? {
                cabins.push(cabin_from_row(row)?);
            }
            Ok(cabins)
        })
        .await
    }

    pub async fn assign_student(
        &self,
        cabin_no: i64,
        student_id: String,
        student_name: String,
    ) -> Result<Option<Cabin>> {
        self.execute(move |conn| {
            let now = Utc::now();
            conn.execute(
                "UPDATE cabins
                 SET student_id = ?1,
                     student_name = ?2,
                     status = 'empty',
                     current_session_start = NULL,
                     current_session_duration = 0,
                     updated_at = ?3
                 WHERE cabin_no = ?4",
                params![student_id, student_name, now.to_rfc3339(), cabin_no],
            )
            .with_context(|| format!("failed to assign student to cabin {cabin_no}"))?;
            get_cabin_row(conn, cabin_no)
        })
        .await
    }

    /// Clears the occupant and resets status and session fields directly,
    /// bypassing the state-machine policy.
    pub async fn unassign_student(&self, cabin_no: i64) -> Result<Option<Cabin>> {
        self.execute(move |conn| {
            let now = Utc::now();
            conn.execute(
                "UPDATE cabins
                 SET student_id = NULL,
                     student_name = NULL,
                     status = 'empty',
                     current_session_start = NULL,
                     current_session_duration = 0,
                     updated_at = ?1
                 WHERE cabin_no = ?2",
                params![now.to_rfc3339(), cabin_no],
            )
            .with_context(|| format!("failed to unassign student from cabin {cabin_no}"))?;
            get_cabin_row(conn, cabin_no)
        })
        .await
    }

    /// Load the cabin, evaluate the update against its current record, and
    /// persist status, session fields, and the closed session in one
    /// transaction. The whole read-modify-write runs as a single task on the
    /// worker thread, serialized against the ingestion path and everything
    /// else.
    pub async fn apply_cabin_update<F>(
        &self,
        cabin_no: i64,
        evaluate: F,
    ) -> Result<Option<AppliedUpdate>>
    where
        F: FnOnce(&Cabin) -> StatusUpdate + Send + 'static,
    {
        self.execute(move |conn| {
            let Some(cabin) = get_cabin_row(conn, cabin_no)? else {
                return Ok(None);
            };

            let update = evaluate(&cabin);
            let now = update.last_activity;

            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE cabins
                 SET status = ?1,
                     current_session_start = ?2,
                     current_session_duration = ?3,
                     last_activity = ?4,
                     updated_at = ?5
                 WHERE cabin_no = ?6",
                params![
                    update.status.as_str(),
                    update.session_start.map(|dt| dt.to_rfc3339()),
                    update.session_duration,
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                    cabin_no,
                ],
            )
            .with_context(|| format!("failed to update cabin {cabin_no}"))?;

            if let Some(record) = &update.closed_session {
                insert_session_row(&tx, record)?;
            }
            tx.commit()
                .with_context(|| format!("failed to commit update for cabin {cabin_no}"))?;

            let applied = AppliedUpdate {
                cabin: Cabin {
                    status: update.status,
                    current_session_start: update.session_start,
                    current_session_duration: update.session_duration,
                    last_activity: Some(now),
                    updated_at: now,
                    ..cabin
                },
                closed_session: update.closed_session,
            };
            Ok(Some(applied))
        })
        .await
    }

    pub async fn list_sessions(&self, cabin_no: Option<i64>) -> Result<Vec<SessionRecord>> {
        self.execute(move |conn| {
            let base = "SELECT id, cabin_no, student_id, student_name, start_time, end_time, duration, detection_method, created_at
                 FROM sessions";
            let mut records = Vec::new();

            match cabin_no {
                Some(cabin_no) => {
                    let mut stmt = conn.prepare(&format!(
                        "{base} WHERE cabin_no = ?1 ORDER BY start_time DESC"
                    ))?;
                    let mut rows = stmt.query(params![cabin_no])?;
                    while let Some(row) = rows.next()? {
                        records.push(session_from_row(row)?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!("{base} ORDER BY start_time DESC"))?;
                    let mut rows = stmt.query([])?;
                    while let Some(row) = rows.next()? {
                        records.push(session_from_row(row)?);
                    }
                }
            }

            Ok(records)
        })
        .await
    }

    /// Close sessions left open by a previous run: record the ones above the
    /// minimum duration, then reset each affected cabin to `empty`.
    pub async fn recover_open_sessions(
        &self,
        now: DateTime<Utc>,
        min_session_secs: i64,
    ) -> Result<Vec<SessionRecord>> {
        self.execute(move |conn| {
            let open: Vec<Cabin> = {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CABIN_COLUMNS} FROM cabins WHERE current_session_start IS NOT NULL"
                ))?;
                let mut rows = stmt.query([])?;
                let mut cabins = Vec::new();
                while let Some(row) = rows.next()? {
                    cabins.push(cabin_from_row(row)?);
                }
                cabins
            };

            let tx = conn.transaction()?;
            let mut recovered = Vec::new();

            for cabin in open {
                if cabin.current_session_duration > min_session_secs {
                    if let Some(start) = cabin.current_session_start {
                        let record = SessionRecord::close(
                            cabin.cabin_no,
                            cabin.student_id.clone(),
                            cabin.student_name.clone(),
                            start,
                            now,
                            cabin.current_session_duration,
                            DetectionMethod::Tracking,
                        );
                        insert_session_row(&tx, &record)?;
                        recovered.push(record);
                    }
                }

                tx.execute(
                    "UPDATE cabins
                     SET status = 'empty',
                         current_session_start = NULL,
                         current_session_duration = 0,
                         updated_at = ?1
                     WHERE cabin_no = ?2",
                    params![now.to_rfc3339(), cabin.cabin_no],
                )
                .with_context(|| format!("failed to reset cabin {}", cabin.cabin_no))?;
            }

            tx.commit().context("failed to commit session recovery")?;
            Ok(recovered)
        })
        .await
    }
}
