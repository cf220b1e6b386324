use thiserror::Error;

pub type WaymarkResult<T> = Result<T, WaymarkError>;

#[derive(Error, Debug)]
pub enum WaymarkError {
    #[error("Invalid waypoint id: {0}")]
    InvalidWaypoint(String),

    #[error("Invalid route name: {0} (expected \"next\" or \"prev\")")]
    InvalidRouteName(String),

    #[error("Cannot create a route back from exit node {0}")]
    ExitNodeReverseRoute(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown waypoint: {0}")]
    UnknownWaypoint(String),

    #[error("Invalid context id: {0}")]
    InvalidContextId(String),

    #[error("Unsafe key: {0}")]
    UnsafeKey(String),

    #[error("Journey context has no identity id")]
    MissingIdentity,

    #[error("Invalid session: {0}")]
    InvalidSession(String),

    #[error("Invalid validation errors for {waypoint}: {message}")]
    InvalidValidationErrors { waypoint: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl WaymarkError {
    /// Wrong shape or type of argument handed to the engine.
    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidWaypoint(_)
                | Self::InvalidArgument(_)
                | Self::InvalidSession(_)
                | Self::InvalidValidationErrors { .. }
                | Self::ExitNodeReverseRoute(_)
        )
    }

    /// Reference to something that does not exist, or is missing.
    pub fn is_reference_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownWaypoint(_) | Self::MissingIdentity | Self::UnsafeKey(_)
        )
    }

    /// Malformed literal, such as a context id that is neither the default id
    /// nor a UUID.
    pub fn is_syntax_error(&self) -> bool {
        matches!(self, Self::InvalidContextId(_) | Self::InvalidRouteName(_))
    }
}
