use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read or write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("train {train} has an empty schedule")]
    EmptySchedule { train: String },

    #[error("train {train} refers to unknown station {station}")]
    UnknownStation { train: String, station: String },

    #[error("conflict {conflict} refers to unknown train {train}")]
    UnknownTrain { conflict: String, train: String },

    #[error("conflict {conflict} must name exactly two distinct trains (got {count})")]
    ConflictArity { conflict: String, count: usize },

    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: String },

    #[error("train {train} has malformed scheduled arrival {value:?} (expected HH:MM)")]
    InvalidTime { train: String, value: String },

    #[error("train {train} has invalid speed {speed} km/h")]
    InvalidSpeed { train: String, speed: f64 },

    #[error("{kind} {id} has non-finite position {position} km")]
    InvalidPosition { kind: &'static str, id: String, position: f64 },

    #[error("state has {got} trains but the scenario was loaded with {expected}")]
    StateMismatch { expected: usize, got: usize },

    #[error("plan has {got} decisions but {expected} conflicts are registered")]
    PlanMismatch { expected: usize, got: usize },

    #[error("plan gives priority at {conflict} to train {train}, which is not part of that conflict")]
    InvalidDecision { conflict: String, train: String },

    #[error("plan has no decision for conflict {conflict}")]
    MissingDecision { conflict: String },

    #[error("invalid optimizer configuration: {0}")]
    InvalidConfig(String),

    #[error("could not start evaluation workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("live simulation state is unavailable: a previous operation panicked while holding it")]
    Poisoned,
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Error {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
