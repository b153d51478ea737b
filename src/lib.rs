// Warn on redundant path prefixes (e.g., std::path::Path when Path is imported)
#![warn(unused_qualifications)]
// Use log::* macros instead of println!/eprintln! for proper log level control
#![deny(clippy::print_stdout, clippy::print_stderr)]

//! MTP document provider core.
//!
//! Exposes USB-attached MTP devices (cameras, phones) as a virtual
//! filesystem of roots, documents, and directories. The hard part this
//! crate owns is the translation between a transient, handle-based,
//! session-scoped hardware protocol and a stable, path-independent,
//! notification-driven document tree:
//!
//! - a persistent mapping from ephemeral object handles to stable document
//!   identifiers ([`store`]),
//! - a per-device session registry with lazy, serialized opens
//!   ([`provider`]),
//! - a background scanner mirroring device/storage state into the root
//!   listing with coalesced change notifications ([`DocumentProvider`]'s
//!   scanner),
//! - a seekable content stream with short-read recovery ([`ObjectStream`]).
//!
//! The USB/MTP wire protocol itself stays behind the [`DeviceTransport`]
//! trait; an [`InMemoryTransport`] ships for tests and offline development.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use mtpdocs::{DocumentProvider, InMemoryTransport, NullNotifier};
//!
//! let transport = Arc::new(InMemoryTransport::new());
//! let provider = DocumentProvider::new(transport, Arc::new(NullNotifier));
//! provider.resume_root_scanner();
//! assert!(provider.query_roots().is_empty());
//! provider.shutdown();
//! ```

mod error;
pub mod notifications;
pub mod provider;
mod scanner;
pub mod store;
mod streamer;
pub mod transport;

pub use error::ProviderError;
pub use notifications::{ChangeNotifier, ChangeResource, NullNotifier, RecordingNotifier};
pub use provider::{
    DocumentProvider, DocumentRow, MIME_TYPE_DIRECTORY, ProviderConfig, ROOT_ICON_ID, RootRow, SessionState, flags,
    mime_type_for_format,
};
pub use store::{DocumentId, DocumentKind, DocumentRecord, DocumentStore};
pub use streamer::ObjectStream;
pub use transport::{
    DeviceId, DeviceRecord, DeviceTransport, InMemoryTransport, ObjectHandle, ObjectInfo, ProtectionStatus,
    ROOT_CHILDREN, StorageId, StorageRecord, TransportError,
};
