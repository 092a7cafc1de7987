use crate::types::{EntityId, Step};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AggError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Blob encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Blob decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Entity '{entity}' not found in event table")]
    UnknownEntity { entity: EntityId },

    #[error("Entity '{entity}' has no events")]
    EmptyGroup { entity: EntityId },

    #[error("Entity '{entity}': missing value for '{column}' at step {step}")]
    MissingValue {
        entity: EntityId,
        column: &'static str,
        step: Step,
    },

    #[error("Task for entity '{entity}' panicked: {message}")]
    TaskPanicked { entity: EntityId, message: String },

    #[error("Worker pool could not be created: {0}")]
    WorkerPool(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AggError {
    /// True for failures raised while computing one entity's features.
    /// These mark the entity failed for the current run only.
    pub fn is_entity_failure(&self) -> bool {
        matches!(
            self,
            AggError::UnknownEntity { .. }
                | AggError::EmptyGroup { .. }
                | AggError::MissingValue { .. }
                | AggError::TaskPanicked { .. }
        )
    }
}

pub type AggResult<T> = Result<T, AggError>;
