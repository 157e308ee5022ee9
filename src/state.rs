use std::sync::Arc;

use crate::error::{Error, Result};
use crate::log::ProjectLog;
use crate::phase::Phase;
use crate::store::{ProjectId, Store};

/// Guards every phase change of a project.
///
/// A transition is written to the database before the caller starts the work
/// it announces, so a crash always leaves the project in the phase that was
/// running.
pub struct ProjectStateMachine {
    store: Arc<Store>,
    log: Arc<ProjectLog>,
}

impl ProjectStateMachine {
    pub fn new(store: Arc<Store>, log: Arc<ProjectLog>) -> Self {
        Self { store, log }
    }

    pub fn transition(&self, id: ProjectId, next: Phase) -> Result<()> {
        let current = self.store.phase(id)?;
        if !current.permits(next) {
            return Err(Error::InvalidTransition {
                id,
                from: current,
                to: next,
            });
        }
        self.store.set_phase(id, next)?;
        self.log.status(next);
        Ok(())
    }

    /// Marks the project failed. A completed project keeps its phase.
    pub fn fail(&self, id: ProjectId) -> Result<()> {
        match self.store.phase(id)? {
            Phase::Completed => Ok(()),
            _ => self.transition(id, Phase::Failed),
        }
    }

    pub fn phase(&self, id: ProjectId) -> Result<Phase> {
        self.store.phase(id)
    }
}
