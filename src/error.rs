//! Error types for document-tree operations.

use crate::store::DocumentId;
use crate::transport::{DeviceId, TransportError};

/// Error types surfaced by [`crate::DocumentProvider`] operations.
///
/// `NotFound` and `Connection` propagate directly to the caller of the
/// failing operation without side effects on unrelated devices. Transport
/// timeouts are reported as `TransportIo`.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ProviderError {
    /// The document identifier (or its parent) is unknown to the store.
    NotFound { document_id: DocumentId },
    /// The device could not be opened or became unreachable.
    Connection { device_id: DeviceId, message: String },
    /// A listing/read/delete call failed against an open session.
    TransportIo { device_id: DeviceId, message: String },
}

impl ProviderError {
    /// Returns true for a stale-identifier failure, as opposed to a
    /// device-unreachable failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the device itself was unreachable.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Maps a transport failure against an open session to a provider error.
    pub(crate) fn transport_io(device_id: DeviceId, error: &TransportError) -> Self {
        Self::TransportIo {
            device_id,
            message: error.to_string(),
        }
    }

    /// Maps a session-open failure to a provider error.
    pub(crate) fn connection(device_id: DeviceId, error: &TransportError) -> Self {
        Self::Connection {
            device_id,
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { document_id } => {
                write!(f, "Document not found: {document_id}")
            }
            Self::Connection { device_id, message } => {
                write!(f, "Device {device_id} unreachable: {message}")
            }
            Self::TransportIo { device_id, message } => {
                write!(f, "Transport I/O error for device {device_id}: {message}")
            }
        }
    }
}

impl std::error::Error for ProviderError {}
