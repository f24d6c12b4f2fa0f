use ulid::Ulid;

use crate::model::ResourceId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed request: non-positive duration, missing owner, start too far in the past.
    Validation(String),
    InvalidResource(ResourceId),
    /// Overlaps the reservation with this id.
    Conflict(Ulid),
    NotConfigured,
    /// Registry failure on a lookup that is not about one room.
    Registry(String),
    AlreadyExists(Ulid),
    LimitExceeded(&'static str),
    /// The release scheduler no longer accepts work.
    ShutDown,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::InvalidResource(id) => write!(f, "invalid room id: {id}"),
            EngineError::Conflict(id) => write!(f, "conflicts with reservation: {id}"),
            EngineError::NotConfigured => write!(f, "office not configured"),
            EngineError::Registry(msg) => write!(f, "room registry: {msg}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::ShutDown => write!(f, "reservation manager is shut down"),
        }
    }
}

impl std::error::Error for EngineError {}
