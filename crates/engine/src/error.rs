//! Engine-wide error taxonomy.
//!
//! Services return `EngineError`; the HTTP layer maps each variant to a
//! status code. Anything a service cannot meaningfully handle bubbles up.

use thiserror::Error;

use lorekeeper_domain::{DomainError, GraphError};

use crate::generator::GeneratorError;
use crate::prompts::PromptError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Schema or range violation in caller-supplied data (400)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Referenced entity missing (404)
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Operation not allowed in the entity's current state (400)
    #[error("State violation: {0}")]
    StateViolation(String),

    /// Graph invariant broken: unknown type or missing endpoint (400 when
    /// user-triggered)
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Per-campaign lock contention beyond the deadline (409)
    #[error("Concurrency conflict: {0}")]
    Conflict(String),

    /// Generator retries exhausted (503)
    #[error("Generator unavailable: {0}")]
    GeneratorUnavailable(String),

    /// Non-transient generator failure (500)
    #[error(transparent)]
    Generator(GeneratorError),

    /// Prompt catalog failure - always a programming error (500)
    #[error(transparent)]
    Prompt(#[from] PromptError),

    /// Store failure (500)
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn state_violation(msg: impl Into<String>) -> Self {
        Self::StateViolation(msg.into())
    }
}

impl From<GeneratorError> for EngineError {
    fn from(err: GeneratorError) -> Self {
        match err {
            GeneratorError::Unavailable(msg) => Self::GeneratorUnavailable(msg),
            other => Self::Generator(other),
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { entity_type, id } => Self::NotFound {
                entity: entity_type,
                id,
            },
            DomainError::InvalidStateTransition(msg) => Self::StateViolation(msg),
            other => Self::InvalidInput(other.to_string()),
        }
    }
}
