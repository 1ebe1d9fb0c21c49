use annotator_core::CoreError;
use thiserror::Error;

/// Why a pointer event could not advance the selection machine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectionError {
    #[error("current user cannot annotate this document")]
    NotPermitted,

    #[error("no active label selected")]
    NoActiveLabel,

    #[error("no drag in progress")]
    NotDragging,

    #[error("drag started on page {started} but ended on page {ended}")]
    PageMismatch { started: u32, ended: u32 },

    #[error("previous selection is still being committed")]
    Busy,

    #[error(transparent)]
    Core(#[from] CoreError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("render cancelled")]
    Cancelled,

    #[error("page {0} is not mounted")]
    NotMounted(u32),

    #[error("renderer failed: {0}")]
    Backend(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}
