use config::ConfigError;
use thiserror::Error;

use crate::value::Value;

pub type Result<T> = std::result::Result<T, TreeError>;

#[derive(Debug, Error)]
pub enum TreeError {

    #[error("Entity {0} has no tree parent relation")]
    MissingParentRelation(String),

    #[error("Entity {0} has no tree children relation")]
    MissingChildrenRelation(String),

    #[error("Tree parent relation of entity {0} has no join column")]
    MissingJoinColumn(String),

    #[error("Entity {0} has no primary column")]
    MissingPrimaryColumn(String),

    #[error("Cycle detected in {entity} tree at id {id}")]
    CycleDetected { entity: String, id: Value },

    #[error("Tree is deeper than the configured limit of {limit} levels")]
    DepthLimitExceeded { limit: usize },

    #[error("Invalid rows: {0}")]
    InvalidRows(String),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("serde error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TreeError {
    /// Configuration errors mean the entity type is not tree capable at all.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TreeError::MissingParentRelation(_)
                | TreeError::MissingChildrenRelation(_)
                | TreeError::MissingJoinColumn(_)
                | TreeError::MissingPrimaryColumn(_)
        )
    }
}
