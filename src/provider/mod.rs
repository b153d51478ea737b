//! Document provider: session registry and document-tree operations.
//!
//! [`DocumentProvider`] is the externally consumed surface. It owns the
//! identifier store and the per-device session registry behind a single
//! mutex domain, shares them with the root scanner thread, and answers
//! document-tree operations on caller threads. Operations that need live
//! device data (child listing, delete, content open) block on transport I/O
//! and open the owning device on demand; metadata queries answer from the
//! committed snapshot so cursors stay consistent.

mod rows;

pub use rows::{DocumentRow, MIME_TYPE_DIRECTORY, ROOT_ICON_ID, RootRow, flags, mime_type_for_format};
use rows::{device_root_row, object_row, root_title, storage_root_row};

use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::ProviderError;
use crate::notifications::{ChangeNotifier, ChangeResource};
use crate::scanner::RootScanner;
use crate::store::{DocumentId, DocumentKind, DocumentStore};
use crate::streamer::ObjectStream;
use crate::transport::{DeviceId, DeviceTransport, ROOT_CHILDREN, StorageRecord, TransportError};

/// Tuning knobs for a provider instance.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// How often the root scanner re-enumerates devices while resumed.
    pub scan_interval: Duration,
    /// Consecutive failing scan cycles before a previously healthy device's
    /// roots are cleared instead of kept stale.
    pub scan_failure_limit: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(2),
            scan_failure_limit: 3,
        }
    }
}

/// Session lifecycle of one known device.
///
/// Unknown devices have no entry at all; a fatal transport error drops the
/// entry again (Open → Unknown) and clears the device's identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// Observed by a scan, no session yet.
    Scanned,
    /// Session live.
    Open,
    /// Session released; roots and identifiers retained.
    Closed,
}

/// Registry entry for one known device.
pub(crate) struct DeviceEntry {
    pub(crate) name: String,
    pub(crate) state: SessionState,
    /// Effective storages as of the last committed scan. Kept stale for a
    /// bounded number of failing cycles.
    pub(crate) storages: Vec<StorageRecord>,
    /// Open flag the transport reported last; scan diff basis only.
    pub(crate) observed_open: bool,
    pub(crate) errors: Vec<String>,
    pub(crate) scan_failures: u32,
}

impl DeviceEntry {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            state: SessionState::Scanned,
            storages: Vec::new(),
            observed_open: false,
            errors: Vec::new(),
            scan_failures: 0,
        }
    }
}

/// Registry and identifier tables, one mutex domain.
///
/// Both the scanner thread and caller threads mutate this; holding the one
/// lock across a whole commit guarantees no caller ever observes a
/// half-updated root set.
pub(crate) struct ProviderState {
    pub(crate) devices: BTreeMap<DeviceId, DeviceEntry>,
    pub(crate) store: DocumentStore,
}

/// State shared between the provider facade and the scanner thread.
pub(crate) struct Shared {
    pub(crate) state: Mutex<ProviderState>,
    /// Per-device open serialization: a second open request for a device
    /// with an open attempt in flight waits for that attempt instead of
    /// issuing a duplicate transport open.
    open_locks: Mutex<HashMap<DeviceId, Arc<Mutex<()>>>>,
    pub(crate) transport: Arc<dyn DeviceTransport>,
    pub(crate) notifier: Arc<dyn ChangeNotifier>,
    pub(crate) config: ProviderConfig,
}

impl Shared {
    /// Maps a transport failure against an open session to a provider
    /// error. A fatal failure (device gone mid-session) demotes the device
    /// to unknown, clears its identifiers, and notifies the root listing.
    fn transport_failure(&self, device_id: DeviceId, error: TransportError) -> ProviderError {
        if error.is_fatal() {
            warn!("device {} lost mid-session: {}", device_id, error);
            {
                let mut state = self.state.lock().unwrap();
                state.devices.remove(&device_id);
                state.store.clear_device(device_id);
            }
            self.notifier.notify(&ChangeResource::Roots);
            ProviderError::connection(device_id, &error)
        } else {
            ProviderError::transport_io(device_id, &error)
        }
    }
}

/// The MTP document provider core.
pub struct DocumentProvider {
    shared: Arc<Shared>,
    scanner: RootScanner,
}

impl DocumentProvider {
    /// Creates a provider with default tuning. The root scanner thread is
    /// spawned paused; call [`resume_root_scanner`](Self::resume_root_scanner)
    /// to start enumeration.
    pub fn new(transport: Arc<dyn DeviceTransport>, notifier: Arc<dyn ChangeNotifier>) -> Self {
        Self::with_config(transport, notifier, ProviderConfig::default())
    }

    pub fn with_config(
        transport: Arc<dyn DeviceTransport>,
        notifier: Arc<dyn ChangeNotifier>,
        config: ProviderConfig,
    ) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(ProviderState {
                devices: BTreeMap::new(),
                store: DocumentStore::new(),
            }),
            open_locks: Mutex::new(HashMap::new()),
            transport,
            notifier,
            config,
        });
        let scanner = RootScanner::spawn(Arc::clone(&shared));
        Self { shared, scanner }
    }

    /// Opens a session for the device, serialized per device.
    ///
    /// Fails with a connection error when the transport rejects the device;
    /// on failure no session is recorded and cached identifiers are left
    /// untouched. A successful open nudges the scanner so the root listing
    /// reflects the new session state.
    pub fn open_device(&self, device_id: DeviceId) -> Result<(), ProviderError> {
        let open_lock = {
            let mut locks = self.shared.open_locks.lock().unwrap();
            Arc::clone(locks.entry(device_id).or_insert_with(|| Arc::new(Mutex::new(()))))
        };
        let _open_guard = open_lock.lock().unwrap();

        {
            let state = self.shared.state.lock().unwrap();
            if let Some(entry) = state.devices.get(&device_id)
                && entry.state == SessionState::Open
            {
                debug!("open_device: {} already open", device_id);
                return Ok(());
            }
        }

        info!("Opening MTP session for device {}", device_id);
        self.shared.transport.open_session(device_id).map_err(|error| {
            warn!("open_device: transport rejected device {}: {}", device_id, error);
            ProviderError::connection(device_id, &error)
        })?;

        {
            let mut state = self.shared.state.lock().unwrap();
            let entry = state
                .devices
                .entry(device_id)
                .or_insert_with(|| DeviceEntry::new(String::new()));
            entry.state = SessionState::Open;
        }

        // Prompt re-enumeration so the root listing reflects the session.
        self.scanner.resume();
        Ok(())
    }

    /// Closes the device's session. Idempotent: closing a closed or unknown
    /// device is a no-op. Identifiers are retained for reopen stability.
    pub fn close_device(&self, device_id: DeviceId) -> Result<(), ProviderError> {
        let was_open = {
            let mut state = self.shared.state.lock().unwrap();
            match state.devices.get_mut(&device_id) {
                Some(entry) if entry.state == SessionState::Open => {
                    entry.state = SessionState::Closed;
                    true
                }
                _ => false,
            }
        };
        if !was_open {
            debug!("close_device: {} not open, nothing to do", device_id);
            return Ok(());
        }

        info!("Closing MTP session for device {}", device_id);
        if let Err(error) = self.shared.transport.close_session(device_id) {
            warn!("close_device: transport close failed for {}: {}", device_id, error);
        }

        // The released session shows up as a root listing change on the
        // next pass, which this triggers immediately.
        self.scanner.resume();
        Ok(())
    }

    /// Device ids with a live session, ascending.
    pub fn opened_device_ids(&self) -> Vec<DeviceId> {
        let state = self.shared.state.lock().unwrap();
        state
            .devices
            .iter()
            .filter(|(_, entry)| entry.state == SessionState::Open)
            .map(|(&device_id, _)| device_id)
            .collect()
    }

    /// Enumeration errors the device reported in the last scan cycle.
    ///
    /// Non-empty while the device's roots are being served stale; lets a
    /// presentation layer flag the device instead of showing its storages
    /// as if live.
    pub fn device_errors(&self, device_id: DeviceId) -> Vec<String> {
        let state = self.shared.state.lock().unwrap();
        state
            .devices
            .get(&device_id)
            .map(|entry| entry.errors.clone())
            .unwrap_or_default()
    }

    /// Suspends enumeration and cancels any in-flight scan cycle.
    pub fn pause_root_scanner(&self) {
        self.scanner.pause();
    }

    /// Resumes enumeration and triggers one immediate pass.
    pub fn resume_root_scanner(&self) {
        self.scanner.resume();
    }

    /// One row per currently known root, across devices, in device order.
    pub fn query_roots(&self) -> Vec<RootRow> {
        let state = self.shared.state.lock().unwrap();
        let mut result = Vec::new();
        for (&device_id, entry) in &state.devices {
            let root_flags = flags::ROOT_SUPPORTS_IS_CHILD | flags::ROOT_SUPPORTS_CREATE;
            if entry.storages.is_empty() {
                // Device with no enumerable storages: one placeholder row so
                // it stays visible and openable.
                let Some(document_id) = state.store.device_root(device_id) else {
                    continue;
                };
                result.push(RootRow {
                    root_id: document_id,
                    flags: root_flags,
                    icon: ROOT_ICON_ID,
                    title: root_title(&entry.name, ""),
                    document_id,
                    available_bytes: 0,
                });
            } else {
                for (storage, &document_id) in entry.storages.iter().zip(state.store.storage_root_ids(device_id)) {
                    result.push(RootRow {
                        root_id: document_id,
                        flags: root_flags,
                        icon: ROOT_ICON_ID,
                        title: root_title(&entry.name, &storage.description),
                        document_id,
                        available_bytes: storage.free_space,
                    });
                }
            }
        }
        result
    }

    /// Metadata row for one document, answered from the committed snapshot.
    pub fn query_document(&self, document_id: DocumentId) -> Result<DocumentRow, ProviderError> {
        let state = self.shared.state.lock().unwrap();
        let record = state
            .store
            .document(document_id)
            .ok_or(ProviderError::NotFound { document_id })?;
        Ok(match &record.kind {
            DocumentKind::DeviceRoot { name } => device_root_row(document_id, name),
            DocumentKind::StorageRoot { storage } => storage_root_row(document_id, storage),
            DocumentKind::Object { info } => object_row(document_id, info),
        })
    }

    /// Live child listing for one parent document.
    ///
    /// Opens the owning device on demand, fetches the current handles and
    /// metadata from the transport, and maps them through the identifier
    /// store so the returned identifiers are stable. A transport failure
    /// leaves previously assigned identifiers for this parent untouched.
    pub fn query_child_documents(&self, parent_document_id: DocumentId) -> Result<Vec<DocumentRow>, ProviderError> {
        let (device_id, storage_id, parent_handle) = {
            let state = self.shared.state.lock().unwrap();
            let record = state.store.document(parent_document_id).ok_or(ProviderError::NotFound {
                document_id: parent_document_id,
            })?;
            match &record.kind {
                // No enumerable storages behind a placeholder root.
                DocumentKind::DeviceRoot { .. } => return Ok(Vec::new()),
                DocumentKind::StorageRoot { storage } => (record.device_id, storage.storage_id, ROOT_CHILDREN),
                DocumentKind::Object { info } => (record.device_id, info.storage_id, info.handle),
            }
        };

        self.ensure_open(device_id)?;

        let handles = self
            .shared
            .transport
            .object_handles(device_id, storage_id, parent_handle)
            .map_err(|error| self.shared.transport_failure(device_id, error))?;
        debug!(
            "query_child_documents: {} handles under parent {} (device {})",
            handles.len(),
            parent_document_id,
            device_id
        );

        let mut objects = Vec::with_capacity(handles.len());
        for handle in handles {
            let info = self
                .shared
                .transport
                .object_info(device_id, handle)
                .map_err(|error| self.shared.transport_failure(device_id, error))?;
            objects.push(info);
        }

        let mut state = self.shared.state.lock().unwrap();
        let ids = state
            .store
            .put_child_documents(device_id, storage_id, parent_document_id, &objects)
            .ok_or(ProviderError::NotFound {
                document_id: parent_document_id,
            })?;
        Ok(ids
            .iter()
            .zip(&objects)
            .map(|(&id, info)| object_row(id, info))
            .collect())
    }

    /// Deletes a document on the device.
    ///
    /// On success the identifier (and its subtree) is removed and the
    /// parent's child listing receives exactly one change notification. On
    /// transport failure identifiers and notification state are untouched.
    pub fn delete_document(&self, document_id: DocumentId) -> Result<(), ProviderError> {
        let (device_id, handle, parent) = {
            let state = self.shared.state.lock().unwrap();
            let record = state
                .store
                .document(document_id)
                .ok_or(ProviderError::NotFound { document_id })?;
            match &record.kind {
                DocumentKind::Object { info } => {
                    let parent = record.parent.ok_or(ProviderError::NotFound { document_id })?;
                    (record.device_id, info.handle, parent)
                }
                _ => {
                    return Err(ProviderError::TransportIo {
                        device_id: record.device_id,
                        message: "roots cannot be deleted".to_string(),
                    });
                }
            }
        };

        self.ensure_open(device_id)?;
        self.shared
            .transport
            .delete_object(device_id, handle)
            .map_err(|error| self.shared.transport_failure(device_id, error))?;

        {
            let mut state = self.shared.state.lock().unwrap();
            state.store.remove_document(document_id);
        }
        info!(
            "deleted document {} (device {}, handle {})",
            document_id, device_id, handle
        );
        self.shared.notifier.notify(&ChangeResource::Children { parent });
        Ok(())
    }

    /// Opens a readable, seekable stream over a file document's content.
    ///
    /// The stream declares the size cached at listing time; see
    /// [`ObjectStream`] for short-read and end-of-stream behavior.
    pub fn open_document(&self, document_id: DocumentId) -> Result<ObjectStream, ProviderError> {
        let (device_id, handle, size) = {
            let state = self.shared.state.lock().unwrap();
            let record = state
                .store
                .document(document_id)
                .ok_or(ProviderError::NotFound { document_id })?;
            match &record.kind {
                DocumentKind::Object { info } if !info.is_directory() => (record.device_id, info.handle, info.size),
                DocumentKind::Object { .. } => {
                    return Err(ProviderError::TransportIo {
                        device_id: record.device_id,
                        message: "directories have no byte content".to_string(),
                    });
                }
                _ => {
                    return Err(ProviderError::TransportIo {
                        device_id: record.device_id,
                        message: "roots have no byte content".to_string(),
                    });
                }
            }
        };

        self.ensure_open(device_id)?;
        Ok(ObjectStream::new(
            Arc::clone(&self.shared.transport),
            device_id,
            handle,
            size,
        ))
    }

    /// Stops the scanner and releases every open session. Idempotent.
    pub fn shutdown(&self) {
        self.scanner.stop();
        let open: Vec<DeviceId> = {
            let mut state = self.shared.state.lock().unwrap();
            let open: Vec<DeviceId> = state
                .devices
                .iter()
                .filter(|(_, entry)| entry.state == SessionState::Open)
                .map(|(&device_id, _)| device_id)
                .collect();
            for device_id in &open {
                if let Some(entry) = state.devices.get_mut(device_id) {
                    entry.state = SessionState::Closed;
                }
            }
            open
        };
        for device_id in open {
            if let Err(error) = self.shared.transport.close_session(device_id) {
                warn!("shutdown: closing session for device {}: {}", device_id, error);
            }
        }
    }

    /// Opens the device if it has no live session yet.
    fn ensure_open(&self, device_id: DeviceId) -> Result<(), ProviderError> {
        {
            let state = self.shared.state.lock().unwrap();
            if let Some(entry) = state.devices.get(&device_id)
                && entry.state == SessionState::Open
            {
                return Ok(());
            }
        }
        debug!("lazily opening device {}", device_id);
        self.open_device(device_id)
    }
}

impl Drop for DocumentProvider {
    fn drop(&mut self) {
        self.shutdown();
    }
}
