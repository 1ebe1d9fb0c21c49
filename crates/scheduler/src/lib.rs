//! Annotator Scheduler Library
//!
//! Coordination primitives for the asynchronous parts of an open document:
//!
//! - [`CancellationToken`] / [`CancellationRegistry`]: cancel superseded work,
//!   such as a page render overtaken by a zoom change
//! - [`OperationQueue`]: run relationship-affecting mutations one at a time
//! - [`DocumentGeneration`]: drop completions that outlive the document
//!
//! # Example
//!
//! ```
//! use annotator_scheduler::{CancellationRegistry, DocumentGeneration};
//!
//! let renders = CancellationRegistry::new();
//! let generation = DocumentGeneration::new();
//!
//! // Page 0 starts rendering at 100%
//! let ticket = generation.ticket();
//! let first = renders.replace(0_u32);
//!
//! // Zoom changes before it finishes: the old render is cancelled
//! let second = renders.replace(0_u32);
//! assert!(first.is_cancelled());
//! assert!(!second.is_cancelled());
//!
//! // Closing the document invalidates every outstanding ticket
//! generation.advance();
//! assert!(!ticket.is_current());
//! ```

mod cancel;
mod generation;
mod queue;

pub use cancel::{CancellationRegistry, CancellationToken};
pub use generation::{DocumentGeneration, GenerationTicket};
pub use queue::OperationQueue;
