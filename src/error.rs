use thiserror::Error;

use crate::models::SubjectKind;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("subject not found: {0}")]
    SubjectNotFound(i64),

    #[error("{kind} not found: {id}")]
    KindNotFound { kind: SubjectKind, id: i64 },

    #[error("checklist item not found: {0}")]
    ChecklistItemNotFound(i64),

    #[error("invalid subject kind '{0}': use hack, routine, or level")]
    InvalidKind(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("prerequisites must share a kind: {subject} is a {subject_kind}, {required} is a {required_kind}")]
    KindMismatch {
        subject: i64,
        subject_kind: SubjectKind,
        required: i64,
        required_kind: SubjectKind,
    },

    #[error("a subject cannot require itself: {0}")]
    SelfPrerequisite(i64),

    #[error("'{name}' is locked: complete {missing:?} first")]
    Locked { name: String, missing: Vec<i64> },

    #[error("{store} storage cannot hold progress for {actor}")]
    ActorMismatch {
        store: &'static str,
        actor: String,
    },

    #[error("this needs a signed-in user: pass --user or set NRGHAX_USER")]
    AccountRequired,

    #[error("timestamp parse error: {0}")]
    Timestamp(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProgressError>;
