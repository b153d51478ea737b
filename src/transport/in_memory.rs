//! In-memory transport for tests and offline development.
//!
//! A scriptable [`DeviceTransport`] backed by plain maps: tests register
//! devices, object tables, and content bytes, then point a provider at it.
//! Failure injection knobs cover the error paths the core must survive
//! (missing metadata, rejected deletes, short reads, mid-session loss).

use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use super::{
    DeviceId, DeviceRecord, DeviceTransport, ObjectHandle, ObjectInfo, StorageId, StorageRecord, TransportError,
};

#[derive(Default)]
struct Inner {
    devices: BTreeMap<DeviceId, DeviceRecord>,
    open: HashSet<DeviceId>,
    /// (device, storage, parent) -> child handles, in listing order.
    handles: HashMap<(DeviceId, StorageId, ObjectHandle), Vec<ObjectHandle>>,
    objects: HashMap<(DeviceId, ObjectHandle), ObjectInfo>,
    content: HashMap<(DeviceId, ObjectHandle), Bytes>,
    /// Caps every read_object result, simulating a short-reading transport.
    max_read_chunk: Option<usize>,
    fail_object_info: HashSet<(DeviceId, ObjectHandle)>,
    fail_delete: HashSet<(DeviceId, ObjectHandle)>,
    /// Devices that report Disconnected on their next session operation.
    lost: HashSet<DeviceId>,
    open_calls: HashMap<DeviceId, usize>,
}

/// Scriptable in-memory [`DeviceTransport`].
#[derive(Default)]
pub struct InMemoryTransport {
    inner: Mutex<Inner>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a device. The `opened` field of the record is
    /// ignored; the transport tracks session state itself.
    pub fn add_device(&self, record: DeviceRecord) {
        let mut inner = self.inner.lock().unwrap();
        inner.devices.insert(record.device_id, record);
    }

    /// Unplugs a device: it disappears from enumeration and an open session
    /// starts reporting Disconnected.
    pub fn remove_device(&self, device_id: DeviceId) {
        let mut inner = self.inner.lock().unwrap();
        if inner.devices.remove(&device_id).is_some() && inner.open.contains(&device_id) {
            inner.lost.insert(device_id);
        }
    }

    /// Replaces the storages a device reports on the next enumeration.
    pub fn set_storages(&self, device_id: DeviceId, storages: Vec<StorageRecord>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(record) = inner.devices.get_mut(&device_id) {
            record.storages = storages;
        }
    }

    /// Sets the per-device enumeration errors reported by `list_devices`.
    pub fn set_device_errors(&self, device_id: DeviceId, errors: Vec<String>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(record) = inner.devices.get_mut(&device_id) {
            record.errors = errors;
        }
    }

    /// Scripts the child handles under a parent.
    pub fn set_object_handles(
        &self,
        device_id: DeviceId,
        storage_id: StorageId,
        parent: ObjectHandle,
        handles: &[ObjectHandle],
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.handles.insert((device_id, storage_id, parent), handles.to_vec());
    }

    /// Scripts metadata for one object.
    pub fn set_object_info(&self, device_id: DeviceId, info: ObjectInfo) {
        let mut inner = self.inner.lock().unwrap();
        inner.objects.insert((device_id, info.handle), info);
    }

    /// Scripts the content bytes behind an object handle.
    pub fn set_object_bytes(&self, device_id: DeviceId, handle: ObjectHandle, bytes: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.content.insert((device_id, handle), Bytes::copy_from_slice(bytes));
    }

    /// Caps every `read_object` result at `limit` bytes.
    pub fn set_max_read_chunk(&self, limit: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.max_read_chunk = Some(limit);
    }

    /// Makes `object_info` fail for one object.
    pub fn fail_object_info(&self, device_id: DeviceId, handle: ObjectHandle) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_object_info.insert((device_id, handle));
    }

    /// Makes `delete_object` fail for one object.
    pub fn fail_delete(&self, device_id: DeviceId, handle: ObjectHandle) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_delete.insert((device_id, handle));
    }

    /// Number of `open_session` calls issued for a device so far.
    pub fn open_call_count(&self, device_id: DeviceId) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.open_calls.get(&device_id).copied().unwrap_or(0)
    }
}

impl Inner {
    fn check_session(&self, device_id: DeviceId) -> Result<(), TransportError> {
        if self.lost.contains(&device_id) {
            return Err(TransportError::Disconnected { device_id });
        }
        if !self.open.contains(&device_id) {
            return Err(TransportError::SessionNotOpen { device_id });
        }
        Ok(())
    }
}

impl DeviceTransport for InMemoryTransport {
    fn list_devices(&self) -> Result<Vec<DeviceRecord>, TransportError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .devices
            .values()
            .map(|record| DeviceRecord {
                opened: inner.open.contains(&record.device_id),
                ..record.clone()
            })
            .collect())
    }

    fn open_session(&self, device_id: DeviceId) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        *inner.open_calls.entry(device_id).or_insert(0) += 1;
        if !inner.devices.contains_key(&device_id) {
            return Err(TransportError::DeviceNotFound { device_id });
        }
        inner.open.insert(device_id);
        Ok(())
    }

    fn close_session(&self, device_id: DeviceId) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.open.remove(&device_id);
        inner.lost.remove(&device_id);
        Ok(())
    }

    fn object_handles(
        &self,
        device_id: DeviceId,
        storage_id: StorageId,
        parent: ObjectHandle,
    ) -> Result<Vec<ObjectHandle>, TransportError> {
        let inner = self.inner.lock().unwrap();
        inner.check_session(device_id)?;
        Ok(inner
            .handles
            .get(&(device_id, storage_id, parent))
            .cloned()
            .unwrap_or_default())
    }

    fn object_info(&self, device_id: DeviceId, handle: ObjectHandle) -> Result<ObjectInfo, TransportError> {
        let inner = self.inner.lock().unwrap();
        inner.check_session(device_id)?;
        if inner.fail_object_info.contains(&(device_id, handle)) {
            return Err(TransportError::Io {
                device_id,
                message: format!("metadata fetch failed for object {handle}"),
            });
        }
        inner
            .objects
            .get(&(device_id, handle))
            .cloned()
            .ok_or(TransportError::ObjectNotFound { device_id, handle })
    }

    fn read_object(
        &self,
        device_id: DeviceId,
        handle: ObjectHandle,
        offset: u64,
        length: usize,
    ) -> Result<Bytes, TransportError> {
        let inner = self.inner.lock().unwrap();
        inner.check_session(device_id)?;
        let content = inner
            .content
            .get(&(device_id, handle))
            .ok_or(TransportError::ObjectNotFound { device_id, handle })?;
        if offset >= content.len() as u64 {
            return Ok(Bytes::new());
        }
        let start = offset as usize;
        let mut len = length.min(content.len() - start);
        if let Some(limit) = inner.max_read_chunk {
            len = len.min(limit);
        }
        Ok(content.slice(start..start + len))
    }

    fn delete_object(&self, device_id: DeviceId, handle: ObjectHandle) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_session(device_id)?;
        if inner.fail_delete.contains(&(device_id, handle)) {
            return Err(TransportError::Io {
                device_id,
                message: format!("device rejected delete of object {handle}"),
            });
        }
        if inner.objects.remove(&(device_id, handle)).is_none() {
            return Err(TransportError::ObjectNotFound { device_id, handle });
        }
        inner.content.remove(&(device_id, handle));
        for children in inner.handles.values_mut() {
            children.retain(|&h| h != handle);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ProtectionStatus, ROOT_CHILDREN, format};

    fn test_device(device_id: DeviceId) -> DeviceRecord {
        DeviceRecord {
            device_id,
            name: format!("Device {device_id}"),
            opened: false,
            storages: vec![StorageRecord {
                storage_id: 1,
                description: "Storage".to_string(),
                free_space: 1024,
                total_space: 2048,
                volume_identifier: String::new(),
            }],
            errors: Vec::new(),
        }
    }

    fn test_object(handle: ObjectHandle, name: &str) -> ObjectInfo {
        ObjectInfo {
            handle,
            storage_id: 1,
            parent: ROOT_CHILDREN,
            format: format::TEXT,
            name: name.to_string(),
            modified_at: None,
            size: 0,
            protection: ProtectionStatus::None,
            thumb_compressed_size: 0,
        }
    }

    #[test]
    fn test_open_unknown_device_fails() {
        let transport = InMemoryTransport::new();
        let err = transport.open_session(1).unwrap_err();
        assert!(matches!(err, TransportError::DeviceNotFound { device_id: 1 }));
        assert_eq!(transport.open_call_count(1), 1);
    }

    #[test]
    fn test_list_devices_reflects_session_state() {
        let transport = InMemoryTransport::new();
        transport.add_device(test_device(0));

        let devices = transport.list_devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert!(!devices[0].opened);

        transport.open_session(0).unwrap();
        assert!(transport.list_devices().unwrap()[0].opened);

        transport.close_session(0).unwrap();
        assert!(!transport.list_devices().unwrap()[0].opened);
    }

    #[test]
    fn test_operations_require_open_session() {
        let transport = InMemoryTransport::new();
        transport.add_device(test_device(0));

        let err = transport.object_handles(0, 1, ROOT_CHILDREN).unwrap_err();
        assert!(matches!(err, TransportError::SessionNotOpen { .. }));
    }

    #[test]
    fn test_object_listing_and_info() {
        let transport = InMemoryTransport::new();
        transport.add_device(test_device(0));
        transport.open_session(0).unwrap();
        transport.set_object_handles(0, 1, ROOT_CHILDREN, &[100, 101]);
        transport.set_object_info(0, test_object(100, "a.txt"));
        transport.set_object_info(0, test_object(101, "b.txt"));

        let handles = transport.object_handles(0, 1, ROOT_CHILDREN).unwrap();
        assert_eq!(handles, vec![100, 101]);
        assert_eq!(transport.object_info(0, 100).unwrap().name, "a.txt");

        let err = transport.object_info(0, 999).unwrap_err();
        assert!(matches!(err, TransportError::ObjectNotFound { handle: 999, .. }));
    }

    #[test]
    fn test_read_object_short_chunks() {
        let transport = InMemoryTransport::new();
        transport.add_device(test_device(0));
        transport.open_session(0).unwrap();
        transport.set_object_info(0, test_object(100, "a.txt"));
        transport.set_object_bytes(0, 100, b"Hello world");
        transport.set_max_read_chunk(4);

        let chunk = transport.read_object(0, 100, 0, 64).unwrap();
        assert_eq!(&chunk[..], b"Hell");
        let chunk = transport.read_object(0, 100, 4, 64).unwrap();
        assert_eq!(&chunk[..], b"o wo");
        // Past end of content: true end-of-stream.
        let chunk = transport.read_object(0, 100, 11, 64).unwrap();
        assert!(chunk.is_empty());
    }

    #[test]
    fn test_delete_object_removes_from_listings() {
        let transport = InMemoryTransport::new();
        transport.add_device(test_device(0));
        transport.open_session(0).unwrap();
        transport.set_object_handles(0, 1, ROOT_CHILDREN, &[100, 101]);
        transport.set_object_info(0, test_object(100, "a.txt"));
        transport.set_object_info(0, test_object(101, "b.txt"));

        transport.delete_object(0, 100).unwrap();
        assert_eq!(transport.object_handles(0, 1, ROOT_CHILDREN).unwrap(), vec![101]);

        let err = transport.delete_object(0, 100).unwrap_err();
        assert!(matches!(err, TransportError::ObjectNotFound { .. }));
    }

    #[test]
    fn test_removed_device_reports_disconnected() {
        let transport = InMemoryTransport::new();
        transport.add_device(test_device(0));
        transport.open_session(0).unwrap();
        transport.remove_device(0);

        assert!(transport.list_devices().unwrap().is_empty());
        let err = transport.object_handles(0, 1, ROOT_CHILDREN).unwrap_err();
        assert!(matches!(err, TransportError::Disconnected { .. }));
    }
}
