//! Viewer core: everything between pointer events and annotation geometry
//!
//! - [`ZoomLevel`]: the document's shared zoom factor
//! - [`PageCoordinateMapper`]: screen ⇄ document conversion and token resolution per page
//! - [`PageRegistry`]: mappers of the currently mounted pages
//! - [`SelectionMachine`]: multi-page drag selection
//! - [`PageRenderCoordinator`]: mount, unmount and rescale page renders

mod error;
mod mapper;
mod registry;
mod render;
mod selection;
mod zoom;

pub use error::{RenderError, SelectionError};
pub use mapper::{CanvasOffset, PageCoordinateMapper};
pub use registry::PageRegistry;
pub use render::{
    FitWidth, PageRenderCoordinator, PageRenderer, RenderOutcome, RenderRequest, RenderTarget,
    RenderedPage,
};
pub use selection::{PointerUp, QueuedSelection, SelectionMachine, SelectionPhase};
pub use zoom::{fit_width_zoom, ZoomBounds, ZoomLevel};
