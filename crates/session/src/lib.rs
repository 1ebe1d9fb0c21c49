//! Document session: the async side of the annotator
//!
//! - [`AnnotationStore`]: optimistic annotation, relation and document-type
//!   mutations against the remote [`AnnotationApi`]
//! - [`DocumentSession`]: one open document with its token layers, mounted
//!   pages, zoom and pointer selection
//! - [`ViewerConfig`]: zoom bounds and fit-to-width settings
//!
//! Remote failures are rolled back locally and reported through a
//! [`NotificationSink`].

pub mod api;
pub mod config;
mod error;
pub mod notify;
mod session;
mod store;

#[cfg(test)]
mod testing;

pub use api::{AnnotationApi, DocumentInfo, RemoteError, TokenLoader};
pub use config::{ConfigError, ViewerConfig};
pub use error::{SessionError, SessionResult};
pub use notify::{ChannelSink, LogSink, Notification, NotificationLevel, NotificationSink};
pub use session::{DocumentSession, OpenSummary, SettingsSnapshot};
pub use store::{AnnotationStore, SelectionState};
