//! Transport capability consumed by the provider core.
//!
//! The low-level USB/MTP plumbing lives behind [`DeviceTransport`]: a
//! session-oriented, blocking interface the core calls into for device
//! enumeration, object listing, content reads, and deletion. Everything the
//! transport hands out is ephemeral (object handles are only valid within
//! one open session), which is why the store layer exists on top.

mod in_memory;

pub use in_memory::InMemoryTransport;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Transport-scoped device identifier.
pub type DeviceId = u32;
/// Storage identifier, scoped to one device.
pub type StorageId = u32;
/// Object handle, scoped to one open device session. Not durable.
pub type ObjectHandle = u32;

/// Sentinel parent handle denoting the objects at a storage root.
pub const ROOT_CHILDREN: ObjectHandle = 0xFFFF_FFFF;

/// MTP object format codes the provider cares about.
pub mod format {
    /// The directory format.
    pub const ASSOCIATION: u16 = 0x3001;
    pub const TEXT: u16 = 0x3004;
    pub const HTML: u16 = 0x3005;
    pub const WAV: u16 = 0x3008;
    pub const MP3: u16 = 0x3009;
    pub const AVI: u16 = 0x300A;
    pub const MPEG: u16 = 0x300B;
    pub const EXIF_JPEG: u16 = 0x3801;
    pub const BMP: u16 = 0x3804;
    pub const GIF: u16 = 0x3807;
    pub const JFIF: u16 = 0x3808;
    pub const PNG: u16 = 0x380B;
    pub const TIFF: u16 = 0x380D;
    pub const WMA: u16 = 0xB901;
    pub const OGG: u16 = 0xB902;
    pub const AAC: u16 = 0xB903;
    pub const MP4_CONTAINER: u16 = 0xB982;
    pub const MP2: u16 = 0xB983;
    pub const THREE_GP_CONTAINER: u16 = 0xB984;
}

/// Write/delete protection reported per object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionStatus {
    None,
    ReadOnly,
    ReadOnlyData,
    NonTransferable,
}

impl ProtectionStatus {
    /// Returns true when the object must not be written or deleted.
    pub fn is_read_only(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// A storage area on a device: "Internal shared storage", "SD Card", etc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageRecord {
    /// Storage identifier, scoped to the owning device.
    pub storage_id: StorageId,
    /// Volume description, for example "Internal shared storage".
    pub description: String,
    /// In bytes.
    pub free_space: u64,
    /// In bytes.
    pub total_space: u64,
    /// Optional volume identifier; when non-empty it keys identifier
    /// stability across reattachment (storage ids may be reassigned).
    pub volume_identifier: String,
}

/// A device as reported by one enumeration pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    /// Human-readable name, for example "Pixel 8".
    pub name: String,
    /// Whether a session is currently open for this device.
    pub opened: bool,
    pub storages: Vec<StorageRecord>,
    /// Per-device enumeration errors. A device that reports errors must not
    /// advertise its storages as if live.
    pub errors: Vec<String>,
}

/// Metadata for a single object (file or directory) on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    pub handle: ObjectHandle,
    pub storage_id: StorageId,
    /// Parent object handle; [`ROOT_CHILDREN`] for objects at the storage root.
    pub parent: ObjectHandle,
    /// MTP format code; [`format::ASSOCIATION`] denotes a directory.
    pub format: u16,
    pub name: String,
    /// Last-modified time in milliseconds since the epoch, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<i64>,
    /// Compressed object size in bytes.
    pub size: u64,
    pub protection: ProtectionStatus,
    /// Compressed thumbnail size; nonzero means a thumbnail is available.
    pub thumb_compressed_size: u32,
}

impl ObjectInfo {
    /// Returns true for the directory format.
    pub fn is_directory(&self) -> bool {
        self.format == format::ASSOCIATION
    }
}

/// Error types for transport operations.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum TransportError {
    /// Device not found (may have been unplugged, or never existed).
    DeviceNotFound { device_id: DeviceId },
    /// No session is open for the device.
    SessionNotOpen { device_id: DeviceId },
    /// Object handle is unknown to the device.
    ObjectNotFound { device_id: DeviceId, handle: ObjectHandle },
    /// Operation timed out.
    Timeout { device_id: DeviceId },
    /// Device vanished mid-session. Fatal: the session is gone.
    Disconnected { device_id: DeviceId },
    /// Protocol-level rejection from the device.
    Protocol { device_id: DeviceId, message: String },
    /// Other I/O failure.
    Io { device_id: DeviceId, message: String },
}

impl TransportError {
    /// Returns true when the session is unrecoverable and the device's
    /// cached state must be discarded.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeviceNotFound { device_id } => {
                write!(f, "Device not found: {device_id}")
            }
            Self::SessionNotOpen { device_id } => {
                write!(f, "No open session for device: {device_id}")
            }
            Self::ObjectNotFound { device_id, handle } => {
                write!(f, "Object {handle} not found on device {device_id}")
            }
            Self::Timeout { device_id } => {
                write!(f, "Operation timed out for device: {device_id}")
            }
            Self::Disconnected { device_id } => {
                write!(f, "Device disconnected: {device_id}")
            }
            Self::Protocol { device_id, message } => {
                write!(f, "Protocol error for device {device_id}: {message}")
            }
            Self::Io { device_id, message } => {
                write!(f, "I/O error for device {device_id}: {message}")
            }
        }
    }
}

impl std::error::Error for TransportError {}

/// Blocking capability interface to the MTP transport layer.
///
/// Implementations must be safe to call from multiple threads; the provider
/// invokes this from caller threads and from the root scanner thread.
pub trait DeviceTransport: Send + Sync {
    /// Enumerates currently attached devices with their storages.
    fn list_devices(&self) -> Result<Vec<DeviceRecord>, TransportError>;

    /// Opens a session for the device. At most one session per device.
    fn open_session(&self, device_id: DeviceId) -> Result<(), TransportError>;

    /// Closes the device's session. Closing a closed device is a no-op.
    fn close_session(&self, device_id: DeviceId) -> Result<(), TransportError>;

    /// Lists the object handles under a parent. Use [`ROOT_CHILDREN`] for
    /// the storage root.
    fn object_handles(
        &self,
        device_id: DeviceId,
        storage_id: StorageId,
        parent: ObjectHandle,
    ) -> Result<Vec<ObjectHandle>, TransportError>;

    /// Fetches metadata for a single object.
    fn object_info(&self, device_id: DeviceId, handle: ObjectHandle) -> Result<ObjectInfo, TransportError>;

    /// Reads up to `length` bytes of object content starting at `offset`.
    ///
    /// May return fewer bytes than requested for reasons unrelated to
    /// end-of-stream; an empty result means true end-of-stream.
    fn read_object(
        &self,
        device_id: DeviceId,
        handle: ObjectHandle,
        offset: u64,
        length: usize,
    ) -> Result<Bytes, TransportError>;

    /// Deletes an object (directories recursively, device permitting).
    fn delete_object(&self, device_id: DeviceId, handle: ObjectHandle) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protection_status_read_only() {
        assert!(!ProtectionStatus::None.is_read_only());
        assert!(ProtectionStatus::ReadOnly.is_read_only());
        assert!(ProtectionStatus::ReadOnlyData.is_read_only());
        assert!(ProtectionStatus::NonTransferable.is_read_only());
    }

    #[test]
    fn test_object_info_is_directory() {
        let info = ObjectInfo {
            handle: 2,
            storage_id: 1,
            parent: ROOT_CHILDREN,
            format: format::ASSOCIATION,
            name: "DCIM".to_string(),
            modified_at: None,
            size: 0,
            protection: ProtectionStatus::None,
            thumb_compressed_size: 0,
        };
        assert!(info.is_directory());

        let info = ObjectInfo {
            format: format::EXIF_JPEG,
            ..info
        };
        assert!(!info.is_directory());
    }

    #[test]
    fn test_storage_record_serialization() {
        let storage = StorageRecord {
            storage_id: 0x10001,
            description: "Internal shared storage".to_string(),
            free_space: 64_000_000_000,
            total_space: 128_000_000_000,
            volume_identifier: String::new(),
        };
        let json = serde_json::to_string(&storage).unwrap();
        assert!(json.contains("\"storageId\":65537"));
        assert!(json.contains("\"freeSpace\":64000000000"));
        assert!(json.contains("\"totalSpace\":128000000000"));
    }

    #[test]
    fn test_device_record_serialization() {
        let device = DeviceRecord {
            device_id: 0,
            name: "Device A".to_string(),
            opened: false,
            storages: Vec::new(),
            errors: vec!["busy".to_string()],
        };
        let json = serde_json::to_string(&device).unwrap();
        assert!(json.contains("\"deviceId\":0"));
        assert!(json.contains("\"opened\":false"));
        assert!(json.contains("\"errors\":[\"busy\"]"));
    }

    #[test]
    fn test_transport_error_fatal() {
        assert!(TransportError::Disconnected { device_id: 0 }.is_fatal());
        assert!(!TransportError::Timeout { device_id: 0 }.is_fatal());
        assert!(
            !TransportError::Io {
                device_id: 0,
                message: "short write".to_string()
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::DeviceNotFound { device_id: 5 };
        assert_eq!(err.to_string(), "Device not found: 5");

        let err = TransportError::ObjectNotFound {
            device_id: 0,
            handle: 100,
        };
        assert_eq!(err.to_string(), "Object 100 not found on device 0");
    }
}
