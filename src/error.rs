use std::path::PathBuf;

use thiserror::Error;

use crate::phase::Phase;
use crate::store::ProjectId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no API credentials configured")]
    NoCredentials,

    #[error("all {total} API credentials have been exhausted")]
    PoolExhausted { total: usize },

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("service returned no usable content: {0}")]
    EmptyContent(String),

    #[error("{role} language '{language}' is not supported for speech. Please choose from: {}", .supported.join(", "))]
    UnsupportedLanguage {
        role: &'static str,
        language: String,
        supported: Vec<&'static str>,
    },

    #[error("content plan has no word pairs")]
    EmptyWordList,

    #[error("cannot read audio asset {}: {reason}", .path.display())]
    MissingAsset { path: PathBuf, reason: String },

    #[error("video composition failed: {0}")]
    RenderFailure(String),

    #[error("music generation timed out after {secs:.0} seconds")]
    MusicTimeout { secs: f64 },

    #[error("music generation failed: {0}")]
    MusicFailure(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("project '{0}' has no content plan yet. Cannot proceed.")]
    PlanMissing(String),

    #[error("project {id} cannot move from '{from}' to '{to}'")]
    InvalidTransition { id: ProjectId, from: Phase, to: Phase },

    #[error("project {0} has already been finalized")]
    AlreadyFinalized(ProjectId),

    #[error("project has no word at index {index} (it has {count})")]
    NoWordAtIndex { index: usize, count: usize },

    #[error("project '{name}' (id {id}) failed: {source}. {next_step}")]
    ProjectFailed {
        name: String,
        id: ProjectId,
        next_step: String,
        #[source]
        source: Box<Error>,
    },

    #[error("service error: {0:#}")]
    Service(anyhow::Error),

    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
