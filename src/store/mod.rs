//! Identifier store: stable document identifiers over ephemeral handles.
//!
//! Object handles are only valid within one open device session, so they
//! can never be handed out as document identifiers. The store assigns an
//! opaque sequential id the first time a storage or object is observed,
//! keyed by where it was observed: (device, storage) for roots, (parent
//! document, handle) for objects. Every re-observation gets the same id
//! back, across device close/reopen and across rescans. Ids are only
//! retired when the thing they name is no longer observed.

use log::debug;
use std::collections::{HashMap, HashSet};

use crate::transport::{DeviceId, ObjectInfo, StorageId, StorageRecord};

/// Stable, externally visible document identifier. Never a raw handle.
pub type DocumentId = u64;

/// What a stored document identifier points at.
#[derive(Debug, Clone)]
pub enum DocumentKind {
    /// Placeholder root for a device with no enumerable storages.
    DeviceRoot { name: String },
    /// A storage exposed as a top-level browsable root.
    StorageRoot { storage: StorageRecord },
    /// A file or directory on a storage.
    Object { info: ObjectInfo },
}

/// One identifier record.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub document_id: DocumentId,
    pub device_id: DeviceId,
    /// `None` for the root of a device.
    pub parent: Option<DocumentId>,
    pub kind: DocumentKind,
}

/// In-memory identifier table. All access goes through the provider's
/// single synchronization boundary; the store itself is not thread-safe.
pub struct DocumentStore {
    next_id: DocumentId,
    documents: HashMap<DocumentId, DocumentRecord>,
    /// Object children per parent document, in last-listing order.
    children: HashMap<DocumentId, Vec<DocumentId>>,
    /// Placeholder root per storage-less device.
    device_roots: HashMap<DeviceId, DocumentId>,
    /// Storage roots per device, in last-reported order.
    storage_roots: HashMap<DeviceId, Vec<DocumentId>>,
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            documents: HashMap::new(),
            children: HashMap::new(),
            device_roots: HashMap::new(),
            storage_roots: HashMap::new(),
        }
    }

    fn allocate(&mut self) -> DocumentId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Records the storages a device currently reports.
    ///
    /// Assigns or reuses one stable identifier per storage and returns them
    /// in argument order. Storages absent from `roots` are pruned together
    /// with their subtrees. Free/total space and descriptions are updated in
    /// place without reassigning identifiers. A device with no storages
    /// keeps a single placeholder root so it stays browsable.
    ///
    /// Reuse is keyed by the volume identifier when the storage carries one
    /// (stable across reattachment), by the storage id otherwise.
    pub fn put_roots(&mut self, device_id: DeviceId, device_name: &str, roots: &[StorageRecord]) -> Vec<DocumentId> {
        let previous = self.storage_roots.remove(&device_id).unwrap_or_default();
        let mut assigned = Vec::with_capacity(roots.len());
        let mut reused: HashSet<DocumentId> = HashSet::new();

        for root in roots {
            let existing = previous.iter().copied().find(|id| {
                if reused.contains(id) {
                    return false;
                }
                match self.documents.get(id).map(|record| &record.kind) {
                    Some(DocumentKind::StorageRoot { storage }) => {
                        if root.volume_identifier.is_empty() {
                            storage.storage_id == root.storage_id
                        } else {
                            storage.volume_identifier == root.volume_identifier
                        }
                    }
                    _ => false,
                }
            });

            let id = match existing {
                Some(id) => {
                    if let Some(record) = self.documents.get_mut(&id)
                        && let DocumentKind::StorageRoot { storage } = &mut record.kind
                    {
                        *storage = root.clone();
                    }
                    id
                }
                None => {
                    let id = self.allocate();
                    debug!(
                        "store: new root document {} for device {} storage {}",
                        id, device_id, root.storage_id
                    );
                    self.documents.insert(
                        id,
                        DocumentRecord {
                            document_id: id,
                            device_id,
                            parent: None,
                            kind: DocumentKind::StorageRoot { storage: root.clone() },
                        },
                    );
                    id
                }
            };
            reused.insert(id);
            assigned.push(id);
        }

        for id in previous {
            if !reused.contains(&id) {
                debug!("store: pruning vanished root document {} of device {}", id, device_id);
                self.remove_subtree(id);
            }
        }

        if roots.is_empty() {
            match self.device_roots.get(&device_id).copied() {
                Some(id) => {
                    if let Some(record) = self.documents.get_mut(&id)
                        && let DocumentKind::DeviceRoot { name } = &mut record.kind
                    {
                        *name = device_name.to_string();
                    }
                }
                None => {
                    let id = self.allocate();
                    debug!("store: placeholder root document {} for device {}", id, device_id);
                    self.documents.insert(
                        id,
                        DocumentRecord {
                            document_id: id,
                            device_id,
                            parent: None,
                            kind: DocumentKind::DeviceRoot {
                                name: device_name.to_string(),
                            },
                        },
                    );
                    self.device_roots.insert(device_id, id);
                }
            }
        } else if let Some(placeholder) = self.device_roots.remove(&device_id) {
            self.remove_subtree(placeholder);
        }

        self.storage_roots.insert(device_id, assigned.clone());
        assigned
    }

    /// Records the objects observed under one parent.
    ///
    /// Assigns or reuses one identifier per object, keyed by the object's
    /// handle within this parent, and returns them in argument order.
    /// Objects absent from the new listing are pruned with their subtrees.
    /// Returns `None` when the parent identifier is no longer in the store.
    pub fn put_child_documents(
        &mut self,
        device_id: DeviceId,
        storage_id: StorageId,
        parent: DocumentId,
        objects: &[ObjectInfo],
    ) -> Option<Vec<DocumentId>> {
        if !self.documents.contains_key(&parent) {
            return None;
        }

        let previous = self.children.remove(&parent).unwrap_or_default();
        let mut assigned = Vec::with_capacity(objects.len());
        let mut reused: HashSet<DocumentId> = HashSet::new();

        for object in objects {
            let existing = previous.iter().copied().find(|id| {
                if reused.contains(id) {
                    return false;
                }
                matches!(
                    self.documents.get(id).map(|record| &record.kind),
                    Some(DocumentKind::Object { info }) if info.handle == object.handle
                )
            });

            let normalized = ObjectInfo {
                storage_id,
                ..object.clone()
            };
            let id = match existing {
                Some(id) => {
                    if let Some(record) = self.documents.get_mut(&id)
                        && let DocumentKind::Object { info } = &mut record.kind
                    {
                        *info = normalized;
                    }
                    id
                }
                None => {
                    let id = self.allocate();
                    debug!(
                        "store: new document {} for object handle {} under parent {}",
                        id, object.handle, parent
                    );
                    self.documents.insert(
                        id,
                        DocumentRecord {
                            document_id: id,
                            device_id,
                            parent: Some(parent),
                            kind: DocumentKind::Object { info: normalized },
                        },
                    );
                    id
                }
            };
            reused.insert(id);
            assigned.push(id);
        }

        for id in previous {
            if !reused.contains(&id) {
                debug!("store: pruning vanished document {} under parent {}", id, parent);
                self.remove_subtree(id);
            }
        }

        self.children.insert(parent, assigned.clone());
        Some(assigned)
    }

    /// Looks up one identifier record.
    pub fn document(&self, id: DocumentId) -> Option<&DocumentRecord> {
        self.documents.get(&id)
    }

    /// Returns the parent identifier, `None` for roots and unknown ids.
    pub fn parent_of(&self, id: DocumentId) -> Option<DocumentId> {
        self.documents.get(&id).and_then(|record| record.parent)
    }

    /// Placeholder root of a storage-less device, if one exists.
    pub fn device_root(&self, device_id: DeviceId) -> Option<DocumentId> {
        self.device_roots.get(&device_id).copied()
    }

    /// Storage root identifiers of a device, in last-reported order.
    pub fn storage_root_ids(&self, device_id: DeviceId) -> &[DocumentId] {
        self.storage_roots.get(&device_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Removes one identifier and its subtree. Unknown ids are a no-op.
    pub fn remove_document(&mut self, id: DocumentId) {
        let Some(record) = self.documents.get(&id) else {
            return;
        };
        let parent = record.parent;
        let device_id = record.device_id;
        self.remove_subtree(id);
        match parent {
            Some(parent) => {
                if let Some(siblings) = self.children.get_mut(&parent) {
                    siblings.retain(|&child| child != id);
                }
            }
            None => {
                if self.device_roots.get(&device_id) == Some(&id) {
                    self.device_roots.remove(&device_id);
                }
                if let Some(roots) = self.storage_roots.get_mut(&device_id) {
                    roots.retain(|&child| child != id);
                }
            }
        }
    }

    /// Drops every identifier and cached record belonging to a device.
    pub fn clear_device(&mut self, device_id: DeviceId) {
        let ids: Vec<DocumentId> = self
            .documents
            .values()
            .filter(|record| record.device_id == device_id)
            .map(|record| record.document_id)
            .collect();
        debug!("store: clearing {} documents of device {}", ids.len(), device_id);
        for id in ids {
            self.documents.remove(&id);
            self.children.remove(&id);
        }
        self.device_roots.remove(&device_id);
        self.storage_roots.remove(&device_id);
    }

    /// Number of identifier records currently held.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn remove_subtree(&mut self, id: DocumentId) {
        if let Some(child_ids) = self.children.remove(&id) {
            for child in child_ids {
                self.remove_subtree(child);
            }
        }
        self.documents.remove(&id);
    }
}

#[cfg(test)]
mod store_test;
