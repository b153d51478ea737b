//! Row assembly: MIME types, capability flags, and listing rows.
//!
//! Every query-returning operation yields rows with a fixed column order:
//! document id, MIME type, display name, last-modified (nullable),
//! capability flag bitmask, size.

use serde::Serialize;

use crate::store::DocumentId;
use crate::transport::{ObjectInfo, StorageRecord, format};

/// MIME type reported for directories and roots.
pub const MIME_TYPE_DIRECTORY: &str = "inode/directory";

/// Icon reference carried by every root listing row.
pub const ROOT_ICON_ID: &str = "device-mtp";

/// Capability flag bitmasks for document and root rows.
pub mod flags {
    /// A thumbnail can be fetched for this document.
    pub const SUPPORTS_THUMBNAIL: u32 = 1;
    /// The document accepts writes.
    pub const SUPPORTS_WRITE: u32 = 1 << 1;
    /// The document can be deleted.
    pub const SUPPORTS_DELETE: u32 = 1 << 2;
    /// New children can be created under this directory.
    pub const DIR_SUPPORTS_CREATE: u32 = 1 << 3;

    /// Documents can be created under this root.
    pub const ROOT_SUPPORTS_CREATE: u32 = 1;
    /// The root supports child-containment queries.
    pub const ROOT_SUPPORTS_IS_CHILD: u32 = 1 << 4;
}

/// One row of the root listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootRow {
    pub root_id: DocumentId,
    pub flags: u32,
    pub icon: &'static str,
    /// Composed title: device name plus storage description, or the device
    /// name alone when the description is empty or storages are unknown.
    pub title: String,
    pub document_id: DocumentId,
    pub available_bytes: u64,
}

/// One row of a document or child-listing query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRow {
    pub document_id: DocumentId,
    pub mime_type: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    pub flags: u32,
    pub size: u64,
}

/// Maps an MTP format code to a MIME type.
pub fn mime_type_for_format(code: u16) -> &'static str {
    match code {
        format::ASSOCIATION => MIME_TYPE_DIRECTORY,
        format::TEXT => "text/plain",
        format::HTML => "text/html",
        format::WAV => "audio/x-wav",
        format::MP3 => "audio/mpeg",
        format::AVI => "video/avi",
        format::MPEG => "video/mpeg",
        format::EXIF_JPEG | format::JFIF => "image/jpeg",
        format::BMP => "image/x-ms-bmp",
        format::GIF => "image/gif",
        format::PNG => "image/png",
        format::TIFF => "image/tiff",
        format::WMA => "audio/x-ms-wma",
        format::OGG => "audio/ogg",
        format::AAC => "audio/aac",
        format::MP4_CONTAINER => "video/mp4",
        format::MP2 => "video/mpeg",
        format::THREE_GP_CONTAINER => "video/3gpp",
        _ => "application/octet-stream",
    }
}

/// Builds the row for a file or directory object from cached metadata.
///
/// Directories report zero size. Read-only protection suppresses the
/// write/delete flags; a nonzero compressed thumbnail size advertises
/// thumbnail support.
pub fn object_row(document_id: DocumentId, info: &ObjectInfo) -> DocumentRow {
    let mut row_flags = 0;
    if !info.protection.is_read_only() {
        row_flags |= flags::SUPPORTS_DELETE | flags::SUPPORTS_WRITE;
    }
    if info.is_directory() {
        row_flags |= flags::DIR_SUPPORTS_CREATE;
    } else if info.thumb_compressed_size > 0 {
        row_flags |= flags::SUPPORTS_THUMBNAIL;
    }

    DocumentRow {
        document_id,
        mime_type: mime_type_for_format(info.format).to_string(),
        display_name: info.name.clone(),
        last_modified: info.modified_at,
        flags: row_flags,
        size: if info.is_directory() { 0 } else { info.size },
    }
}

/// Builds the document row for a storage root. Root-level directories
/// report the storage's free space as their size.
pub fn storage_root_row(document_id: DocumentId, storage: &StorageRecord) -> DocumentRow {
    DocumentRow {
        document_id,
        mime_type: MIME_TYPE_DIRECTORY.to_string(),
        display_name: storage.description.clone(),
        last_modified: None,
        flags: 0,
        size: storage.free_space,
    }
}

/// Builds the document row for a storage-less device's placeholder root.
pub fn device_root_row(document_id: DocumentId, name: &str) -> DocumentRow {
    DocumentRow {
        document_id,
        mime_type: MIME_TYPE_DIRECTORY.to_string(),
        display_name: name.to_string(),
        last_modified: None,
        flags: 0,
        size: 0,
    }
}

/// Composes a root title from the device name and storage description.
pub fn root_title(device_name: &str, description: &str) -> String {
    if description.is_empty() {
        device_name.to_string()
    } else {
        format!("{} {}", device_name, description)
    }
}
