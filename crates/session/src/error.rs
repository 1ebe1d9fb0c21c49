use crate::api::RemoteError;
use crate::config::ConfigError;
use annotator_core::CoreError;
use thiserror::Error;
use viewer_core::{RenderError, SelectionError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("missing {0} permission")]
    NotPermitted(&'static str),

    #[error("page {0} is not mounted")]
    PageNotMounted(u32),

    #[error("no document is open")]
    NoDocument,

    /// The document was closed or reopened while the operation was in flight
    #[error("document closed before the operation completed")]
    DocumentClosed,
}

pub type SessionResult<T> = Result<T, SessionError>;
