use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::phase::Phase;
use crate::store::{LogRecord, ProjectId, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Success => "SUCCESS",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        }
    }
}

/// Console plus database log, created once per process and handed to every component.
///
/// Records only reach the `logs` table after [`ProjectLog::bind`] names the
/// project they belong to.
pub struct ProjectLog {
    store: Option<Arc<Store>>,
    project: OnceCell<ProjectId>,
}

impl ProjectLog {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store: Some(store),
            project: OnceCell::new(),
        }
    }

    /// Console-only log, never written to a database.
    pub fn detached() -> Self {
        Self {
            store: None,
            project: OnceCell::new(),
        }
    }

    /// Sets the project context. Later calls with a different id are ignored.
    pub fn bind(&self, id: ProjectId) {
        if self.project.set(id).is_err() && self.project() != Some(id) {
            warn!("log already bound to another project, ignoring {id}");
        }
    }

    pub fn project(&self) -> Option<ProjectId> {
        self.project.get().copied()
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.record(Level::Info, message.as_ref(), None);
    }

    pub fn info_with(&self, message: impl AsRef<str>, details: Value) {
        self.record(Level::Info, message.as_ref(), Some(details));
    }

    pub fn ok(&self, message: impl AsRef<str>) {
        self.record(Level::Success, message.as_ref(), None);
    }

    pub fn ok_with(&self, message: impl AsRef<str>, details: Value) {
        self.record(Level::Success, message.as_ref(), Some(details));
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.record(Level::Warning, message.as_ref(), None);
    }

    pub fn warn_with(&self, message: impl AsRef<str>, details: Value) {
        self.record(Level::Warning, message.as_ref(), Some(details));
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.record(Level::Error, message.as_ref(), None);
    }

    pub fn error_with(&self, message: impl AsRef<str>, details: Value) {
        self.record(Level::Error, message.as_ref(), Some(details));
    }

    pub fn status(&self, phase: Phase) {
        info!("--- {phase} ---");
        self.persist(Level::Info, &format!("Project status changed to: {phase}"), None);
    }

    fn record(&self, level: Level, message: &str, details: Option<Value>) {
        match level {
            Level::Info => info!("{message}"),
            Level::Success => info!("[OK] {message}"),
            Level::Warning => warn!("{message}"),
            Level::Error => error!("{message}"),
        }
        self.persist(level, message, details);
    }

    fn persist(&self, level: Level, message: &str, details: Option<Value>) {
        let (Some(store), Some(project_id)) = (&self.store, self.project()) else {
            return;
        };
        let record = LogRecord {
            project_id,
            timestamp: Utc::now(),
            level: level.as_str().to_string(),
            message: message.to_string(),
            details,
        };
        if let Err(err) = store.append_log(&record) {
            error!("DB logging failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_reach_the_database_only_after_binding() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let id = store.create_preliminary_project("prompt").unwrap();
        let log = ProjectLog::new(store.clone());

        log.info("before binding");
        log.bind(id);
        log.warn_with("after binding", serde_json::json!({ "attempt": 1 }));
        log.status(Phase::Planning);

        let logs = store.logs(id).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].level, "WARNING");
        assert_eq!(logs[0].details, Some(serde_json::json!({ "attempt": 1 })));
        assert_eq!(logs[1].message, "Project status changed to: Planning");
    }

    #[test]
    fn binding_is_set_once() {
        let log = ProjectLog::detached();
        log.bind(ProjectId(3));
        log.bind(ProjectId(4));
        assert_eq!(log.project(), Some(ProjectId(3)));
    }
}
