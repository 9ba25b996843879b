//! Unified error type for domain operations.

use thiserror::Error;

use crate::graph::GraphError;
use crate::value_objects::dice::DiceParseError;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone)]
pub enum DomainError {
    /// Validation failed (e.g., invalid field values)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Invalid ID format
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Operation not allowed in the entity's current state
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Parse error (for value objects)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    pub fn invalid_state_transition(msg: impl Into<String>) -> Self {
        Self::InvalidStateTransition(msg.into())
    }
}

impl From<DiceParseError> for DomainError {
    fn from(err: DiceParseError) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<GraphError> for DomainError {
    fn from(err: GraphError) -> Self {
        Self::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_carries_entity_and_id() {
        let err = DomainError::not_found("Campaign", "abc-123");
        assert!(err.to_string().contains("Campaign"));
        assert!(err.to_string().contains("abc-123"));
    }

    #[test]
    fn dice_parse_error_converts() {
        let err: DomainError = DiceParseError::Empty.into();
        assert!(matches!(err, DomainError::Parse(_)));
    }
}
