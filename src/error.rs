use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    DatabaseError(String),
    QueueError(String),
    StateTransitionError(String),
    HandlerError(String),
    EventError(String),
    ConfigurationError(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            PipelineError::QueueError(msg) => write!(f, "Queue error: {msg}"),
            PipelineError::StateTransitionError(msg) => {
                write!(f, "State transition error: {msg}")
            }
            PipelineError::HandlerError(msg) => write!(f, "Handler error: {msg}"),
            PipelineError::EventError(msg) => write!(f, "Event error: {msg}"),
            PipelineError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::EventError(err.to_string())
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::ConfigurationError(err.to_string())
    }
}

impl From<crate::queue::QueueError> for PipelineError {
    fn from(err: crate::queue::QueueError) -> Self {
        PipelineError::QueueError(err.to_string())
    }
}

impl From<crate::persistence::StoreError> for PipelineError {
    fn from(err: crate::persistence::StoreError) -> Self {
        PipelineError::DatabaseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
