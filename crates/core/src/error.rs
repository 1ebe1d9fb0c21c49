//! Error taxonomy for geometry and indexing operations

/// Errors raised by the pure geometry, token and relationship layers.
///
/// None of these are user-facing: callers recover locally (skip, no-op or
/// fall back) instead of letting them abort page rendering.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    /// Programming error, e.g. a non-positive zoom factor
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A token id, annotation id or relation id that does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// An operation that needs at least one input received none
    #[error("empty input: {0}")]
    EmptyInput(&'static str),
}

impl CoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound { kind, id: id.to_string() }
    }

    /// Whether callers should treat this error as a no-op rather than a failure
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CoreError::InvalidArgument(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
