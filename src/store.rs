//! Durable project records and the append-only project log.
//!
//! One SQLite file holds every project:
//!
//! ```text
//! projects(id, project_name, prompt, status, asset_directory, plan_json, created_at, updated_at)
//! logs(id, project_id, timestamp, level, message, details)
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{Error, Result};
use crate::model::ContentPlan;
use crate::phase::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProjectId(pub i64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub name: String,
    pub prompt: String,
    pub phase: Phase,
    pub asset_dir: PathBuf,
    pub plan: Option<ContentPlan>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectRecord {
    pub fn require_plan(&self) -> Result<&ContentPlan> {
        self.plan
            .as_ref()
            .ok_or_else(|| Error::PlanMissing(self.name.clone()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub project_id: ProjectId,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS projects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_name TEXT UNIQUE NOT NULL,
        prompt TEXT NOT NULL,
        status TEXT NOT NULL,
        asset_directory TEXT NOT NULL,
        plan_json TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL,
        timestamp TEXT NOT NULL,
        level TEXT NOT NULL,
        message TEXT NOT NULL,
        details TEXT,
        FOREIGN KEY (project_id) REFERENCES projects (id)
    );
";

const PROJECT_COLUMNS: &str =
    "id, project_name, prompt, status, asset_directory, plan_json, created_at, updated_at";

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (or creates) the database file, creating its parent directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Projects ──

    /// Inserts a project under a temporary name in the `Initialized` phase.
    pub fn create_preliminary_project(&self, prompt: &str) -> Result<ProjectId> {
        let now = Utc::now();
        let temp_name = format!("temp_{}", now.format("%Y%m%d%H%M%S%6f"));
        let conn = self.conn();
        conn.execute(
            "INSERT INTO projects (project_name, prompt, status, asset_directory, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                temp_name,
                prompt,
                Phase::Initialized.as_str(),
                "temp",
                timestamp(now)
            ],
        )?;
        Ok(ProjectId(conn.last_insert_rowid()))
    }

    /// Attaches the plan and final name. Allowed exactly once per project.
    pub fn finalize_project(
        &self,
        id: ProjectId,
        name: &str,
        asset_dir: &Path,
        plan: &ContentPlan,
    ) -> Result<()> {
        let plan_json = serde_json::to_string(plan)?;
        let conn = self.conn();
        let rows = conn.execute(
            "UPDATE projects
             SET project_name = ?1, asset_directory = ?2, plan_json = ?3, updated_at = ?4
             WHERE id = ?5 AND plan_json IS NULL",
            params![
                name,
                asset_dir.to_string_lossy().into_owned(),
                plan_json,
                timestamp(Utc::now()),
                id.0
            ],
        )?;
        if rows == 0 {
            drop(conn);
            // Distinguish a missing row from one that was already finalized.
            self.load_project(id)?;
            return Err(Error::AlreadyFinalized(id));
        }
        Ok(())
    }

    pub fn set_phase(&self, id: ProjectId, phase: Phase) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE projects SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![phase.as_str(), timestamp(Utc::now()), id.0],
        )?;
        if rows == 0 {
            return Err(Error::ProjectNotFound(format!("id {id}")));
        }
        Ok(())
    }

    pub fn phase(&self, id: ProjectId) -> Result<Phase> {
        let status: Option<String> = self
            .conn()
            .query_row(
                "SELECT status FROM projects WHERE id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .optional()?;
        let status = status.ok_or_else(|| Error::ProjectNotFound(format!("id {id}")))?;
        parse_phase(&status)
    }

    pub fn load_project(&self, id: ProjectId) -> Result<ProjectRecord> {
        self.query_project(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
            params![id.0],
        )?
        .ok_or_else(|| Error::ProjectNotFound(format!("id {id}")))
    }

    pub fn find_by_name(&self, name: &str) -> Result<ProjectRecord> {
        self.query_project(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE project_name = ?1"),
            params![name],
        )?
        .ok_or_else(|| Error::ProjectNotFound(format!("'{name}'")))
    }

    /// The most recently updated project that has a plan and ended in `Failed`.
    pub fn last_failed_project(&self) -> Result<ProjectRecord> {
        self.query_project(
            &format!(
                "SELECT {PROJECT_COLUMNS} FROM projects
                 WHERE status = ?1 AND plan_json IS NOT NULL
                 ORDER BY updated_at DESC, id DESC LIMIT 1"
            ),
            params![Phase::Failed.as_str()],
        )?
        .ok_or_else(|| Error::ProjectNotFound("no failed projects to resume".into()))
    }

    /// The most recently updated project that has a plan, regardless of phase.
    pub fn last_project(&self) -> Result<ProjectRecord> {
        self.query_project(
            &format!(
                "SELECT {PROJECT_COLUMNS} FROM projects
                 WHERE plan_json IS NOT NULL
                 ORDER BY updated_at DESC, id DESC LIMIT 1"
            ),
            [],
        )?
        .ok_or_else(|| Error::ProjectNotFound("no projects in the database".into()))
    }

    fn query_project(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Option<ProjectRecord>> {
        let conn = self.conn();
        let raw = conn.query_row(sql, params, RawProject::from_row).optional()?;
        raw.map(RawProject::into_record).transpose()
    }

    // ── Logs ──

    pub fn append_log(&self, record: &LogRecord) -> Result<()> {
        let details = record
            .details
            .as_ref()
            .map(serde_json::to_string_pretty)
            .transpose()?;
        self.conn().execute(
            "INSERT INTO logs (project_id, timestamp, level, message, details)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.project_id.0,
                timestamp(record.timestamp),
                record.level,
                record.message,
                details
            ],
        )?;
        Ok(())
    }

    pub fn logs(&self, id: ProjectId) -> Result<Vec<LogRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT timestamp, level, message, details FROM logs WHERE project_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![id.0], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (ts, level, message, details) = row?;
            out.push(LogRecord {
                project_id: id,
                timestamp: parse_timestamp(&ts)?,
                level,
                message,
                details: details.map(|d| serde_json::from_str(&d)).transpose()?,
            });
        }
        Ok(out)
    }
}

struct RawProject {
    id: i64,
    name: String,
    prompt: String,
    status: String,
    asset_dir: String,
    plan_json: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawProject {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            prompt: row.get(2)?,
            status: row.get(3)?,
            asset_dir: row.get(4)?,
            plan_json: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_record(self) -> Result<ProjectRecord> {
        Ok(ProjectRecord {
            id: ProjectId(self.id),
            phase: parse_phase(&self.status)?,
            plan: self
                .plan_json
                .as_deref()
                .map(ContentPlan::from_json)
                .transpose()?,
            asset_dir: PathBuf::from(self.asset_dir),
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            name: self.name,
            prompt: self.prompt,
        })
    }
}

// Fixed-width UTC so that ORDER BY on the text column is chronological.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(format!("invalid timestamp '{text}': {e}")))
}

fn parse_phase(text: &str) -> Result<Phase> {
    text.parse().map_err(corrupt)
}

fn corrupt(message: String) -> Error {
    Error::Storage(rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        message.into(),
    ))
}
